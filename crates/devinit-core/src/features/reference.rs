//! Feature reference parsing and `dependsOn` key normalization
//!
//! A reference has the string form `<origin>/<name>:<tag>`. The origin is
//! everything up to the last `/` and may itself contain slashes
//! (`ghcr.io/devcontainers/features`) or a registry port (`localhost:5000/acme`).
//! Names and tags never contain `/` or `:`, which keeps the string form
//! unambiguous.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tag used when a reference does not carry one
pub const DEFAULT_TAG: &str = "latest";

/// Registry assumed when an origin does not start with a hostname
pub const DEFAULT_REGISTRY: &str = "ghcr.io";

const MAX_TAG_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("empty feature reference")]
    Empty,

    #[error("'{0}' has no origin, expected <origin>/<name>[:<tag>]")]
    MissingOrigin(String),

    #[error("invalid origin '{origin}' in '{input}'")]
    InvalidOrigin { input: String, origin: String },

    #[error("invalid feature name '{name}' in '{input}'")]
    InvalidName { input: String, name: String },

    #[error("invalid tag '{tag}' in '{input}'")]
    InvalidTag { input: String, tag: String },
}

/// Fully-qualified, normalized feature identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureReference {
    origin: String,
    name: String,
    tag: String,
}

impl FeatureReference {
    /// Build a reference from parts, validating each one.
    ///
    /// `None` for the tag means [`DEFAULT_TAG`].
    pub fn new(origin: &str, name: &str, tag: Option<&str>) -> Result<Self, ReferenceError> {
        let input = match tag {
            Some(tag) => format!("{}/{}:{}", origin, name, tag),
            None => format!("{}/{}", origin, name),
        };
        Self::from_parts(&input, origin, name, tag)
    }

    /// Parse a fully-qualified `<origin>/<name>[:<tag>]` string
    pub fn parse(input: &str) -> Result<Self, ReferenceError> {
        if input.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let (path, tag) = split_tag(input);
        let (origin, name) = path
            .rsplit_once('/')
            .ok_or_else(|| ReferenceError::MissingOrigin(input.to_string()))?;
        Self::from_parts(input, origin, name, tag)
    }

    /// Parse a reference that may be a short id such as `docker` or `docker:2`.
    ///
    /// Short ids (no `/`) are placed under `default_origin`; anything with a
    /// `/` is parsed as fully-qualified.
    pub fn parse_with_default_origin(
        input: &str,
        default_origin: &str,
    ) -> Result<Self, ReferenceError> {
        if input.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let (path, tag) = split_tag(input);
        if path.contains('/') {
            return Self::parse(input);
        }
        Self::new(default_origin, path, tag)
    }

    fn from_parts(
        input: &str,
        origin: &str,
        name: &str,
        tag: Option<&str>,
    ) -> Result<Self, ReferenceError> {
        if !is_valid_origin(origin) {
            return Err(ReferenceError::InvalidOrigin {
                input: input.to_string(),
                origin: origin.to_string(),
            });
        }
        if !is_valid_name(name) {
            return Err(ReferenceError::InvalidName {
                input: input.to_string(),
                name: name.to_string(),
            });
        }
        let tag = tag.unwrap_or(DEFAULT_TAG);
        if !is_valid_tag(tag) {
            return Err(ReferenceError::InvalidTag {
                input: input.to_string(),
                tag: tag.to_string(),
            });
        }
        Ok(Self {
            origin: origin.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Registry hostname, if the origin starts with one.
    ///
    /// A host-only origin such as `localhost:5000` is a registry too.
    pub fn registry(&self) -> Option<&str> {
        let first = self.origin.split('/').next()?;
        if first.contains('.') || first.contains(':') || first == "localhost" {
            Some(first)
        } else {
            None
        }
    }

    /// Origin with the registry hostname removed; empty for a host-only origin
    pub fn namespace(&self) -> &str {
        match self.registry() {
            Some(registry) => self.origin[registry.len()..].trim_start_matches('/'),
            None => &self.origin,
        }
    }

    /// Repository path inside the registry: `<namespace>/<name>`, or just the name
    pub fn repository(&self) -> String {
        match self.namespace() {
            "" => self.name.clone(),
            namespace => format!("{}/{}", namespace, self.name),
        }
    }

    fn sort_key(&self) -> impl Iterator<Item = u8> + '_ {
        self.origin
            .bytes()
            .chain(std::iter::once(b'/'))
            .chain(self.name.bytes())
            .chain(std::iter::once(b':'))
            .chain(self.tag.bytes())
    }
}

/// Ordered lexicographically by string form, without allocating it
impl Ord for FeatureReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(other.sort_key())
    }
}

impl PartialOrd for FeatureReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FeatureReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.origin, self.name, self.tag)
    }
}

impl FromStr for FeatureReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FeatureReference {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FeatureReference> for String {
    fn from(reference: FeatureReference) -> Self {
        reference.to_string()
    }
}

/// Turn a `dependsOn` key into a reference, relative to the feature declaring it.
///
/// Rules, in order:
/// 1. strip a local feature directory prefix (`./<dir>/` or `<dir>/`)
/// 2. strip a leading `./`
/// 3. a bare name inherits the referrer's origin
/// 4. a missing tag becomes [`DEFAULT_TAG`]
pub fn normalize_dependency_key<S: AsRef<str>>(
    key: &str,
    referrer: &FeatureReference,
    local_dirs: &[S],
) -> Result<FeatureReference, ReferenceError> {
    let mut bare = key;
    for dir in local_dirs {
        let dir = dir.as_ref().trim_end_matches('/');
        if dir.is_empty() {
            continue;
        }
        let stripped = bare
            .strip_prefix("./")
            .unwrap_or(bare)
            .strip_prefix(dir)
            .and_then(|rest| rest.strip_prefix('/'));
        if let Some(rest) = stripped {
            bare = rest;
            break;
        }
    }
    let bare = bare.strip_prefix("./").unwrap_or(bare);

    FeatureReference::parse_with_default_origin(bare, referrer.origin())
}

/// Split a trailing `:tag`, ignoring colons that belong to a registry port
fn split_tag(input: &str) -> (&str, Option<&str>) {
    match input.rsplit_once(':') {
        Some((path, tag)) if !tag.contains('/') => (path, Some(tag)),
        _ => (input, None),
    }
}

fn is_valid_origin(origin: &str) -> bool {
    if origin.is_empty() {
        return false;
    }
    origin.split('/').enumerate().all(|(i, segment)| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') || (i == 0 && c == ':')
            })
    })
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() || first == '_' => {}
        _ => return false,
    }
    tag.len() <= MAX_TAG_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
