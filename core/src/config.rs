//! Configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`cadence.toml`, `CADENCE_CONFIG_PATH`, or an explicit path), then
//! `CADENCE_*` environment variables using `__` between section and key
//! (for example `CADENCE_LOOPS__MAX_WHILE_ITERATIONS=500`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "cadence.toml";
const CONFIG_PATH_ENV: &str = "CADENCE_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loops: LoopsConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Safety ceilings and cancellation cadence of the loop engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopsConfig {
    pub max_while_iterations: usize,
    pub max_for_iterations: usize,
    pub cancel_poll_interval: usize,
}

impl Default for LoopsConfig {
    fn default() -> Self {
        Self {
            max_while_iterations: 100_000,
            max_for_iterations: 50_000_000,
            cancel_poll_interval: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seed for `uniform()`/`normal()`; drawn from the OS when absent
    pub random_seed: Option<u64>,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            max_call_depth: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default locations and the environment
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.loops.cancel_poll_interval == 0 {
            anyhow::bail!("loops.cancel_poll_interval must be at least 1");
        }
        if self.loops.max_while_iterations == 0 || self.loops.max_for_iterations == 0 {
            anyhow::bail!("loop iteration ceilings must be positive");
        }
        Ok(())
    }
}

/* ===================== Builder ===================== */

/// Explicit overrides win over every other layer
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    max_while_iterations: Option<usize>,
    random_seed: Option<u64>,
    log_level: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn max_while_iterations(mut self, n: Option<usize>) -> Self {
        self.max_while_iterations = n;
        self
    }

    pub fn random_seed(mut self, seed: Option<u64>) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        self.log_level = level;
        self
    }

    pub fn build(self) -> Result<Config> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        // Unset keys fall back to the serde defaults above
        let mut builder = config::Config::builder();

        let explicit = self
            .config_path
            .clone()
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));
        match &explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                builder = builder.add_source(config::File::from(path.as_path()));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(config::File::from(Path::new(DEFAULT_CONFIG_FILE)));
                }
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Failed to load configuration")?;

        if let Some(n) = self.max_while_iterations {
            config.loops.max_while_iterations = n;
        }
        if self.random_seed.is_some() {
            config.runtime.random_seed = self.random_seed;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.loops.max_while_iterations, 100_000);
        assert_eq!(config.loops.max_for_iterations, 50_000_000);
        assert_eq!(config.loops.cancel_poll_interval, 10);
        assert_eq!(config.runtime.random_seed, None);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_file_and_overrides() {
        let path = std::env::temp_dir().join(format!("cadence_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[loops]\nmax_while_iterations = 250\ncancel_poll_interval = 1\n").unwrap();

        let config = Config::builder().config_path(Some(path.clone())).build().unwrap();
        assert_eq!(config.loops.max_while_iterations, 250);
        assert_eq!(config.loops.cancel_poll_interval, 1);
        assert_eq!(config.loops.max_for_iterations, 50_000_000);

        let config = Config::builder()
            .config_path(Some(path.clone()))
            .max_while_iterations(Some(9))
            .random_seed(Some(5))
            .build()
            .unwrap();
        assert_eq!(config.loops.max_while_iterations, 9);
        assert_eq!(config.runtime.random_seed, Some(5));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::builder()
            .config_path(Some(PathBuf::from("/nonexistent/cadence.toml")))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let text = Config::default().to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
