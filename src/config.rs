//! Configuration loading
//!
//! Layers, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file: explicit path, `REBOUND_CONFIG_PATH`, or `./rebound.toml` if present
//! 3. Environment variables, `REBOUND_` prefix and `__` between sections
//!    (e.g. `REBOUND_VM__MAX_FRAMES=64`)
//!
//! A `.env` file in the working directory is loaded before anything else.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ENV_PREFIX: &str = "REBOUND";
const CONFIG_PATH_VAR: &str = "REBOUND_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "rebound.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub vm: VmConfig,
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Frames beyond this depth are loaded already faulted
    pub max_frames: usize,
    /// Abort `run` after this many steps
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_frames: 256,
            max_steps: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Record bridge events in the journal
    pub journal: bool,
}

impl Config {
    /// Load with default search rules
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Builder for loading [`Config`] with overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    journal: Option<bool>,
}

impl ConfigBuilder {
    /// Use this file instead of the default search
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Override `bridge.journal`
    pub fn journal(mut self, journal: Option<bool>) -> Self {
        self.journal = journal;
        self
    }

    pub fn build(self) -> Result<Config> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();

        let explicit = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));
        match explicit {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.as_path()).required(true));
            }
            None => {
                builder = builder.add_source(
                    config::File::with_name(DEFAULT_CONFIG_FILE)
                        .format(config::FileFormat::Toml)
                        .required(false),
                );
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if let Some(journal) = self.journal {
            config.bridge.journal = journal;
        }
        if config.vm.max_frames == 0 {
            anyhow::bail!("vm.max_frames must be at least 1");
        }

        Ok(config)
    }
}
