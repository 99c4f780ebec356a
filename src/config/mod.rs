// src/config/mod.rs
mod schema;

use std::path::{Path, PathBuf};
use config::{Config as ConfigLoader, FileFormat};
use tracing::{info, warn};

pub use schema::{Settings, SinkKind};

use crate::error::{FlowError, FlowResult};

const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// Centralized configuration handling
impl Settings {
    /// Load settings: built-in defaults, then the user file, then `CLOUDFLOW_*` variables
    pub fn load(config_path: Option<&Path>) -> FlowResult<Self> {
        info!("Loading configuration");

        let mut config_builder = ConfigLoader::builder();

        // Default configuration
        config_builder = config_builder.add_source(
            config::File::from_str(DEFAULT_CONFIG, FileFormat::Toml)
        );

        // User-provided configuration
        if let Some(path) = config_path {
            if path.exists() {
                config_builder = config_builder.add_source(config::File::from(path));
                info!("Loading user configuration from: {}", path.display());
            } else {
                warn!("Specified configuration file not found: {}", path.display());
            }
        } else {
            let default_path = Self::default_config_path();
            if default_path.exists() {
                config_builder = config_builder.add_source(config::File::from(default_path.as_path()));
                info!("Loading default configuration from: {}", default_path.display());
            } else {
                info!("No existing configuration found, using built-in defaults");
            }
        }

        // Environment variables
        config_builder = config_builder.add_source(
            config::Environment::with_prefix("CLOUDFLOW").try_parsing(true)
        );

        config_builder
            .build()
            .map_err(|e| FlowError::Config(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| FlowError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Get the default configuration path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cloudflow/config.toml")
    }

    /// Write default settings to the default location
    pub fn init(force: bool) -> FlowResult<PathBuf> {
        let config_path = Self::default_config_path();
        Self::init_at(&config_path, force)?;
        Ok(config_path)
    }

    /// Write default settings to `config_path`
    pub fn init_at(config_path: &Path, force: bool) -> FlowResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| FlowError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        if config_path.exists() && !force {
            return Err(FlowError::Config(
                format!("Configuration already exists at {}. Use --force to overwrite.", config_path.display())
            ));
        }

        Settings::default().save(config_path)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> FlowResult<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| FlowError::Config(format!("Failed to serialize configuration: {}", e)))?;

        std::fs::write(path, config_str)
            .map_err(|source| FlowError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Configuration saved to {}", path.display());

        Ok(())
    }
}
