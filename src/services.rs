//! Startup and shutdown sequencing.
//!
//! [`Services`] owns the configuration, the document store, and the model
//! gateway. It is built once by [`Services::start`] and handed by reference
//! to everything that needs it.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{self, built_in_defaults, ConfigResolver};
use crate::error::{Error, Result};
use crate::gateway::ModelGateway;
use crate::store::DocumentStore;

/// Model every startup pins as the default.
pub const PINNED_DEFAULT_MODEL: &str = "llama3.2:latest";

const APP_DIR_NAME: &str = ".studio-gateway";

/// Filesystem layout of the application directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub app_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
}

impl AppPaths {
    pub fn under(app_dir: impl Into<PathBuf>) -> Self {
        let app_dir = app_dir.into();
        Self {
            data_dir: app_dir.join("data"),
            config_path: app_dir.join("config.json"),
            app_dir,
        }
    }

    /// `~/.studio-gateway`, or `./.studio-gateway` when there is no home directory.
    pub fn default_location() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::under(home.join(APP_DIR_NAME))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.app_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
            info!(path = %dir.display(), "directory ensured");
        }
        Ok(())
    }

    /// A resolver bound to this layout's config file and defaults.
    pub fn resolver(&self) -> ConfigResolver {
        ConfigResolver::new(&self.config_path, built_in_defaults(&self.data_dir))
    }
}

pub struct Services {
    pub config: ConfigResolver,
    pub store: DocumentStore,
    pub gateway: ModelGateway,
}

impl Services {
    /// Run the full startup sequence. Any failure stops the remaining steps.
    pub async fn start(paths: &AppPaths) -> Result<Self> {
        let (config, store) = provision(paths).await?;

        let gateway = ModelGateway::new(&config);
        if let Err(e) = gateway.initialize().await {
            store.close().await;
            return Err(e);
        }

        info!("all services initialized");
        Ok(Self {
            config,
            store,
            gateway,
        })
    }

    /// Close the store. Idempotent and infallible.
    pub async fn shutdown(&self) {
        info!("shutting down services");
        self.store.close().await;
        info!("all services shut down");
    }
}

/// Directories, configuration, and store, without contacting the backend.
pub async fn provision(paths: &AppPaths) -> Result<(ConfigResolver, DocumentStore)> {
    paths.ensure_directories()?;

    let mut config = load_config(paths)?;
    config.set(config::DEFAULT_MODEL, PINNED_DEFAULT_MODEL);
    config.save()?;

    let store = DocumentStore::new(&config);
    store.initialize().await?;
    Ok((config, store))
}

/// Load the config file, creating it from defaults when missing or unreadable.
pub fn load_config(paths: &AppPaths) -> Result<ConfigResolver> {
    let mut config = paths.resolver();
    config.load_or_create_default()?;
    Ok(config)
}

/// Read-only look at the configured log level, used before logging is set up.
pub fn peek_log_level(paths: &AppPaths) -> Option<String> {
    let mut config = paths.resolver();
    if let Err(e) = config.load() {
        if !e.is_not_found() {
            warn!(error = %e, "could not read configuration for log level");
        }
    }
    config.get_string(config::LOG_LEVEL)
}
