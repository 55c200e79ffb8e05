//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers, lowest precedence first:
//! serde defaults, `config/toolplan.toml`, `config/toolplan.{environment}.toml`,
//! then `TOOLPLAN__SECTION__KEY` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::ToolplanConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const ENV_PREFIX: &str = "TOOLPLAN";
const ENV_SEPARATOR: &str = "__";
const BASE_FILE_STEM: &str = "toolplan";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ToolplanConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration from `./config` with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory_with_env(PathBuf::from("config"), &Self::detect_environment())
    }

    /// Load configuration from a directory with an explicit environment name
    pub fn load_from_directory_with_env(
        config_directory: PathBuf,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let base = config_directory.join(format!("{BASE_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.toml"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading toolplan configuration"
        );

        let config = Self::build(&[base.as_path(), overlay.as_path()])?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load configuration from a single file (plus environment variables)
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::load_failed(
                path.display().to_string(),
                "file does not exist",
            ));
        }

        let config = Self::build(&[path])?;
        let config_directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory,
        }))
    }

    fn build(files: &[&Path]) -> ConfigResult<ToolplanConfig> {
        let mut builder = Config::builder();
        for file in files {
            builder = builder.add_source(
                File::from(file.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config = builder
            .build()
            .and_then(|built| built.try_deserialize::<ToolplanConfig>())
            .map_err(|e| ConfigurationError::load_failed("toolplan configuration", e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &ToolplanConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn detect_environment() -> String {
        env::var("TOOLPLAN_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
