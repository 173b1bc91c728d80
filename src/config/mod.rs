use crate::models::AppConfig;
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the configuration file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "QRScan Config.yaml";

/// Prefix of environment overrides, e.g. `QRSCAN__SCANNER__HOLE_SIDE=300`
pub const ENV_PREFIX: &str = "QRSCAN";

/// Configuration manager for loading and saving the YAML configuration file.
///
/// Values are layered: built-in defaults, then `QRScan Config.yaml` (if
/// present), then `QRSCAN__*` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load the configuration with environment overrides from the process
    /// environment.
    pub fn load_config(&self) -> Result<AppConfig> {
        self.load_config_with_env(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Load the configuration using `env` as the environment layer.
    pub fn load_config_with_env(&self, env: Environment) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let layered = Config::builder()
            .add_source(
                File::from(self.config_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        validate(&config)?;

        tracing::info!(
            "Loaded config: hole_side={}, device={:?}, symbologies={:?}",
            config.scanner.hole_side,
            config.scanner.device,
            config.scanner.symbologies
        );
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        validate(config)?;

        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the configuration file path.
    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}

/// Reject settings the scanner cannot work with.
pub fn validate(config: &AppConfig) -> Result<()> {
    let scanner = &config.scanner;

    if !(scanner.hole_side > 0.0) {
        bail!("scanner.hole_side must be positive, got {}", scanner.hole_side);
    }
    if !(scanner.corner_radius >= 0.0) {
        bail!(
            "scanner.corner_radius must not be negative, got {}",
            scanner.corner_radius
        );
    }
    if !(0.0..=1.0).contains(&scanner.mask_opacity) {
        bail!(
            "scanner.mask_opacity must be within 0..=1, got {}",
            scanner.mask_opacity
        );
    }
    if scanner.symbologies.is_empty() {
        bail!("scanner.symbologies must name at least one symbology");
    }

    Ok(())
}
