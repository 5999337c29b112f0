//! Feature manifests from OCI registries
//!
//! Features are published as OCI artifacts whose single layer is a tarball
//! containing `install.sh` and `devcontainer-feature.json`. Only the
//! manifest is needed for resolution, so the layer is read in memory and
//! just that file is kept in the on-disk cache.

use super::lookup::{LookupError, ManifestLookup};
use super::manifest::{FeatureManifest, MANIFEST_FILE};
use super::reference::{FeatureReference, DEFAULT_REGISTRY};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

const FEATURE_LAYER_MEDIA_TYPE: &str = "application/vnd.devcontainers.layer.v1+tar";
const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Registry-backed manifest lookup with a disk cache
#[derive(Debug, Clone)]
pub struct OciLookup {
    cache_dir: PathBuf,
    client: reqwest::Client,
}

impl OciLookup {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            client: reqwest::Client::new(),
        }
    }

    /// `<cache>/<registry>/<namespace>/<name>/<tag>/devcontainer-feature.json`
    pub fn cache_path(&self, reference: &FeatureReference) -> PathBuf {
        self.cache_dir
            .join(reference.registry().unwrap_or(DEFAULT_REGISTRY))
            .join(reference.repository())
            .join(reference.tag())
            .join(MANIFEST_FILE)
    }

    async fn fetch(&self, reference: &FeatureReference) -> Result<String, LookupError> {
        let registry = reference.registry().unwrap_or(DEFAULT_REGISTRY);
        let repo = reference.repository();
        let base_url = registry_base_url(registry);

        // Step 1: Get auth token
        let token = get_auth_token(&self.client, &base_url, &repo, registry)
            .await
            .map_err(|e| LookupError::Failed(format!("auth failed: {}", e)))?;

        // Step 2: Get manifest
        let manifest_url = format!("{}/v2/{}/manifests/{}", base_url, repo, reference.tag());
        let mut request = self
            .client
            .get(&manifest_url)
            .header("Accept", OCI_MANIFEST_MEDIA_TYPE);
        if !token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let manifest_resp = request
            .send()
            .await
            .map_err(|e| LookupError::Failed(format!("manifest request failed: {}", e)))?;

        if manifest_resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::NotFound);
        }
        if !manifest_resp.status().is_success() {
            return Err(LookupError::Failed(format!(
                "manifest fetch returned {}",
                manifest_resp.status()
            )));
        }

        let manifest: OciManifest = manifest_resp
            .json()
            .await
            .map_err(|e| LookupError::Failed(format!("failed to parse OCI manifest: {}", e)))?;

        // Step 3: Find the feature layer
        let layer = manifest
            .layers
            .iter()
            .find(|l| l.media_type == FEATURE_LAYER_MEDIA_TYPE)
            .ok_or_else(|| LookupError::Failed("no feature layer in OCI manifest".to_string()))?;

        // Step 4: Download the layer blob.
        //
        // ghcr.io answers blob requests with a redirect to blob storage, which
        // rejects our bearer token, so redirects are followed by hand without it.
        let blob_url = format!("{}/v2/{}/blobs/{}", base_url, repo, layer.digest);
        let no_redirect_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut request = no_redirect_client.get(&blob_url);
        if !token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let blob_resp = request
            .send()
            .await
            .map_err(|e| LookupError::Failed(format!("blob download failed: {}", e)))?;

        let blob_resp = if blob_resp.status().is_redirection() {
            let redirect_url = blob_resp
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    LookupError::Failed("blob redirect missing Location header".to_string())
                })?
                .to_string();

            self.client
                .get(&redirect_url)
                .send()
                .await
                .map_err(|e| LookupError::Failed(format!("blob redirect failed: {}", e)))?
        } else {
            blob_resp
        };

        if !blob_resp.status().is_success() {
            return Err(LookupError::Failed(format!(
                "blob download returned {}",
                blob_resp.status()
            )));
        }

        let blob_bytes = blob_resp
            .bytes()
            .await
            .map_err(|e| LookupError::Failed(format!("failed to read blob: {}", e)))?;

        // Step 5: Pull the manifest out of the layer tarball
        read_manifest_from_layer(&blob_bytes)
            .map_err(|e| LookupError::Failed(format!("bad feature layer: {}", e)))?
            .ok_or_else(|| {
                LookupError::Failed(format!("feature layer does not contain {}", MANIFEST_FILE))
            })
    }
}

#[async_trait]
impl ManifestLookup for OciLookup {
    async fn lookup(&self, reference: &FeatureReference) -> Result<FeatureManifest, LookupError> {
        let cache_path = self.cache_path(reference);

        if let Ok(content) = tokio::fs::read_to_string(&cache_path).await {
            match FeatureManifest::parse(&content) {
                Ok(manifest) => {
                    tracing::debug!("Feature {}: cached", reference);
                    return Ok(manifest);
                }
                Err(e) => {
                    tracing::debug!("Ignoring unreadable cache entry {:?}: {}", cache_path, e);
                }
            }
        }

        tracing::debug!("Fetching manifest for {}", reference);
        let content = self.fetch(reference).await?;
        let manifest = FeatureManifest::parse(&content)
            .map_err(|e| LookupError::Failed(format!("invalid {}: {}", MANIFEST_FILE, e)))?;

        // A cache write failure only costs a refetch next time
        if let Some(parent) = cache_path.parent() {
            let written = match tokio::fs::create_dir_all(parent).await {
                Ok(()) => tokio::fs::write(&cache_path, &content).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                tracing::debug!("Could not cache manifest at {:?}: {}", cache_path, e);
            }
        }

        Ok(manifest)
    }
}

fn registry_base_url(registry: &str) -> String {
    // Local registries are usually plain HTTP
    if registry.starts_with("localhost") || registry.starts_with("127.0.0.1") {
        format!("http://{}", registry)
    } else {
        format!("https://{}", registry)
    }
}

/// Returns true if the given bytes start with the gzip magic number (0x1f 0x8b).
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Find `devcontainer-feature.json` at the root of a (possibly gzipped) tarball.
///
/// Entries with absolute paths or `..` components are rejected outright.
fn read_manifest_from_layer(bytes: &[u8]) -> Result<Option<String>, String> {
    if is_gzip(bytes) {
        let decoder = flate2::read::GzDecoder::new(std::io::Cursor::new(bytes));
        find_manifest_entry(tar::Archive::new(decoder))
    } else {
        find_manifest_entry(tar::Archive::new(std::io::Cursor::new(bytes)))
    }
}

fn find_manifest_entry<R: Read>(mut archive: tar::Archive<R>) -> Result<Option<String>, String> {
    for entry in archive.entries().map_err(|e| e.to_string())? {
        let mut entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path().map_err(|e| e.to_string())?.into_owned();

        if path.is_absolute() {
            return Err(format!("tar contains absolute path: {}", path.display()));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!("tar contains path traversal: {}", path.display()));
        }

        let normal: Vec<_> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        if normal.len() == 1 && normal[0].as_os_str() == MANIFEST_FILE {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| format!("failed to read {}: {}", MANIFEST_FILE, e))?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}

/// Get an authentication token from the OCI registry.
///
/// Follows the Docker v2 token auth flow:
/// 1. GET /v2/ → 401 with WWW-Authenticate header
/// 2. Parse realm, service from WWW-Authenticate
/// 3. GET <realm>?service=<service>&scope=repository:<repo>:pull
///
/// Returns an empty token when the registry does not require auth.
async fn get_auth_token(
    client: &reqwest::Client,
    base_url: &str,
    repo: &str,
    registry: &str,
) -> Result<String, String> {
    let v2_url = format!("{}/v2/", base_url);
    let resp = client
        .get(&v2_url)
        .send()
        .await
        .map_err(|e| format!("failed to reach registry: {}", e))?;

    if resp.status().is_success() {
        return Ok(String::new());
    }

    let www_auth = resp
        .headers()
        .get("www-authenticate")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| "no WWW-Authenticate header in 401 response".to_string())?
        .to_string();

    let (realm, service) = parse_www_authenticate(&www_auth)?;

    let scope = format!("repository:{}:pull", repo);
    let mut token_req = client
        .get(&realm)
        .query(&[("service", &service), ("scope", &scope)]);

    if let Some((user, pass)) = read_docker_credentials(registry) {
        token_req = token_req.basic_auth(user, Some(pass));
    }

    let token_resp = token_req
        .send()
        .await
        .map_err(|e| format!("token request failed: {}", e))?;

    if !token_resp.status().is_success() {
        return Err(format!("token endpoint returned {}", token_resp.status()));
    }

    let token_json: serde_json::Value = token_resp
        .json()
        .await
        .map_err(|e| format!("failed to parse token response: {}", e))?;

    token_json
        .get("token")
        .or_else(|| token_json.get("access_token"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| "no token field in response".to_string())
}

/// Parse the WWW-Authenticate header to extract realm and service.
///
/// Format: `Bearer realm="<url>",service="<svc>",...`
fn parse_www_authenticate(header: &str) -> Result<(String, String), String> {
    let params = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| format!("unexpected auth scheme: {}", header))?;

    let parsed: HashMap<String, String> = params
        .split(',')
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect();

    let realm = parsed
        .get("realm")
        .ok_or("missing realm in WWW-Authenticate")?
        .clone();
    let service = parsed
        .get("service")
        .cloned()
        .unwrap_or_default();

    Ok((realm, service))
}

/// Read credentials from ~/.docker/config.json for a given registry.
fn read_docker_credentials(registry: &str) -> Option<(String, String)> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    read_docker_credentials_from(&home.join(".docker/config.json"), registry)
}

fn read_docker_credentials_from(config_path: &Path, registry: &str) -> Option<(String, String)> {
    let content = std::fs::read_to_string(config_path).ok()?;
    let config: serde_json::Value = serde_json::from_str(&content).ok()?;

    let auth_str = config.get("auths")?.get(registry)?.get("auth")?.as_str()?;

    let decoded =
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth_str).ok()?;
    let decoded_str = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded_str.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// OCI manifest types (minimal, just what we need)
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OciManifest {
    layers: Vec<OciLayer>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct OciLayer {
    media_type: String,
    digest: String,
}
