use std::path::Path;

use anyhow::{Context, ensure};
use serde::Deserialize;

use crate::http::copier::DEFAULT_BUFFER_SIZE;
use crate::http::parser::ParserLimits;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Size of each read from a client socket.
    pub read_buffer_size: usize,
    /// Buffer capacity used when streaming a response body.
    pub copy_buffer_size: usize,
    pub max_head_size: usize,
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = ParserLimits::default();
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            read_buffer_size: 1024,
            copy_buffer_size: DEFAULT_BUFFER_SIZE,
            max_head_size: limits.max_head_size,
            max_body_size: limits.max_body_size,
        }
    }
}

impl ServerConfig {
    pub fn limits(&self) -> ParserLimits {
        ParserLimits {
            max_head_size: self.max_head_size,
            max_body_size: self.max_body_size,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// The YAML file named by `WICKET_CONFIG` is read if the variable is set,
    /// otherwise defaults are used. `LISTEN` overrides the listen address.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("WICKET_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            config.server.listen_addr = listen_addr;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml).context("failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let server = &self.server;
        ensure!(!server.listen_addr.is_empty(), "server.listen_addr must not be empty");
        ensure!(server.read_buffer_size > 0, "server.read_buffer_size must be positive");
        ensure!(server.copy_buffer_size > 0, "server.copy_buffer_size must be positive");
        ensure!(server.max_head_size > 0, "server.max_head_size must be positive");
        Ok(())
    }
}
