//! devinit - Dev Container project scaffolding CLI

mod commands;
mod selector;

use clap::{Args, Parser, Subcommand};
use devinit_config::GlobalConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "devinit")]
#[command(author, version, about = "Dev Container project scaffolding", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where feature manifests are looked up
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Directory of local features (`<dir>/<name>/devcontainer-feature.json`)
    #[arg(long, value_name = "DIR")]
    pub features_dir: Option<PathBuf>,

    /// Never contact a registry; only local features are used
    #[arg(long)]
    pub offline: bool,

    /// Per-manifest lookup timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve features and their dependencies
    Resolve {
        /// Features to resolve (short ids like `docker` use the default origin)
        features: Vec<String>,
        /// Also take the enabled features from this project's devcontainer.json
        #[arg(long, value_name = "DIR")]
        from: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Show a feature's manifest
    Show {
        /// Feature reference or short id
        feature: String,
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Create .devcontainer/devcontainer.json with resolved features
    Init {
        /// Features to include (interactive selection if omitted)
        features: Vec<String>,
        /// Project directory
        #[arg(long, short = 'd', default_value = ".")]
        dir: PathBuf,
        /// Base image for the container
        #[arg(long)]
        image: Option<String>,
        /// Container name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,
        /// Overwrite an existing devcontainer.json
        #[arg(long)]
        force: bool,
        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Show global configuration
    Config {
        /// Only print the config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Resolution warnings are printed by the commands themselves
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => GlobalConfig::config_path()?,
    };
    let config = GlobalConfig::load_from(&config_path)?;

    match cli.command {
        Commands::Resolve {
            features,
            from,
            json,
            sources,
        } => {
            commands::resolve(&config, features, from, json, &sources).await?;
        }
        Commands::Show { feature, sources } => {
            commands::show(&config, &feature, &sources).await?;
        }
        Commands::Init {
            features,
            dir,
            image,
            name,
            force,
            yes,
            sources,
        } => {
            let options = commands::InitOptions {
                dir,
                image,
                name,
                force,
                yes,
            };
            commands::init(&config, features, options, &sources).await?;
        }
        Commands::Config { path } => {
            commands::config(&config, &config_path, path)?;
        }
    }

    Ok(())
}
