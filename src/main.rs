//! # Studio Gateway CLI (`studio`)
//!
//! The `studio` binary starts the local gateway and offers a few maintenance
//! commands around it.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `studio serve` | Start all services and the HTTP gateway |
//! | `studio init` | Create directories, config, and the document store |
//! | `studio models` | List models reported by the backend |
//! | `studio config show` | Print resolved config values and their origin |
//! | `studio config set <KEY> <VALUE>` | Persist a value in the config file |
//! | `studio config reset` | Restore the config file to defaults |
//!
//! ## Examples
//!
//! ```bash
//! # Start the gateway for a frontend build
//! studio serve --port 5000 --frontend ./frontend/dist
//!
//! # Point the gateway at a backend on another port
//! studio config set OLLAMA_PORT 11500
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use studio_gateway::config::{coerce_env_value, KNOWN_KEYS};
use studio_gateway::gateway::ModelGateway;
use studio_gateway::server::{self, ServerOptions};
use studio_gateway::services::{self, AppPaths, Services};

/// Local gateway between a model backend, a document store and a browser
/// frontend.
#[derive(Parser)]
#[command(
    name = "studio",
    about = "Local model gateway with persistent conversations",
    version
)]
struct Cli {
    /// Application directory holding `config.json` and `data/`.
    ///
    /// Defaults to `~/.studio-gateway`.
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    /// Log at debug level regardless of `LOG_LEVEL`.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start all services and serve the HTTP API.
    ///
    /// Startup order: directories, configuration, document store, model
    /// backend. Any failure aborts before the server binds.
    Serve {
        /// Host to bind the API server.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind the API server.
        #[arg(long, default_value_t = 5000)]
        port: u16,

        /// Directory with the built frontend to serve at `/`.
        #[arg(long)]
        frontend: Option<PathBuf>,
    },

    /// Create directories, configuration, and the document store.
    ///
    /// Idempotent. Does not contact the model backend.
    Init,

    /// List models available on the backend.
    Models,

    /// Inspect or change the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print every known key with its resolved value and origin.
    Show,
    /// Set a key in the config file. Values are typed like environment
    /// variables (`true`, `42`, `3.5`, or a string).
    Set { key: String, value: String },
    /// Replace the config file with the built-in defaults.
    Reset,
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_ascii_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.app_dir {
        Some(dir) => AppPaths::under(dir),
        None => AppPaths::default_location(),
    };

    let level = if cli.debug {
        "debug".to_string()
    } else {
        services::peek_log_level(&paths).unwrap_or_else(|| "info".to_string())
    };
    init_tracing(&level);

    let command = cli.command.unwrap_or(Commands::Serve {
        host: "127.0.0.1".to_string(),
        port: 5000,
        frontend: None,
    });

    match command {
        Commands::Serve {
            host,
            port,
            frontend,
        } => {
            let services = Services::start(&paths)
                .await
                .context("failed to start services")?;
            let options = ServerOptions {
                bind: format!("{}:{}", host, port),
                frontend,
            };
            server::run_server(Arc::new(services), options).await?;
        }
        Commands::Init => {
            let (_, store) = services::provision(&paths)
                .await
                .context("failed to initialize")?;
            store.close().await;
            println!("Studio initialized at {}", paths.app_dir.display());
        }
        Commands::Models => {
            paths.ensure_directories()?;
            let config = services::load_config(&paths)?;
            let gateway = ModelGateway::new(&config);
            gateway
                .initialize()
                .await
                .context("failed to reach the model backend")?;
            let models = gateway.cached_models();
            if models.is_empty() {
                println!("No models found.");
            }
            for model in models.iter() {
                println!("{}", model);
            }
        }
        Commands::Config { action } => {
            let mut config = services::load_config(&paths)?;
            match action {
                ConfigAction::Show => {
                    println!("config file: {}", config.path().display());
                    println!("{:<16} {:<12} VALUE", "KEY", "ORIGIN");
                    for key in KNOWN_KEYS {
                        if let Some(entry) = config.entry(key) {
                            println!("{:<16} {:<12} {}", entry.key, entry.origin, entry.value);
                        }
                    }
                }
                ConfigAction::Set { key, value } => {
                    let typed = coerce_env_value(&value);
                    println!("{} = {}", key, typed);
                    config.update(BTreeMap::from([(key, typed)]))?;
                }
                ConfigAction::Reset => {
                    config.reset()?;
                    println!("Configuration reset to defaults.");
                }
            }
        }
    }

    Ok(())
}
