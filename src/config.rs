use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::binary::stanza::DEFAULT_INFLATE_CAPACITY;
use crate::media::DEFAULT_BUFFER_SIZE;

/// Errors raised while loading or saving a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables shared by the codec, the media pipelines and app-state sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WireConfig {
    /// Chunk size of the media download and upload pipelines.
    pub media_buffer_size: usize,
    /// Initial scratch size of the stanza inflater.
    pub inflate_initial_capacity: usize,
    /// Verify snapshot and patch MACs during app-state sync.
    pub check_patch_macs: bool,
    /// Host serving media direct paths.
    pub media_host: String,
    /// User agent sent with media downloads.
    pub user_agent: String,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            media_buffer_size: DEFAULT_BUFFER_SIZE,
            inflate_initial_capacity: DEFAULT_INFLATE_CAPACITY,
            check_patch_macs: true,
            media_host: "mmg.whatsapp.net".into(),
            user_agent: concat!("wa-wire/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl WireConfig {
    /// Override the media chunk size.
    pub fn with_media_buffer_size(mut self, size: usize) -> Self {
        self.media_buffer_size = size;
        self
    }

    /// Override the initial stanza inflate capacity.
    pub fn with_inflate_initial_capacity(mut self, capacity: usize) -> Self {
        self.inflate_initial_capacity = capacity;
        self
    }

    /// Enable or disable snapshot and patch MAC checks.
    pub fn with_check_patch_macs(mut self, check: bool) -> Self {
        self.check_patch_macs = check;
        self
    }

    /// Override the media host.
    pub fn with_media_host(mut self, host: impl Into<String>) -> Self {
        self.media_host = host.into();
        self
    }

    /// Override the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.media_buffer_size == 0 {
            return Err(ConfigError::Invalid("media_buffer_size must be positive".into()));
        }
        if self.inflate_initial_capacity == 0 {
            return Err(ConfigError::Invalid("inflate_initial_capacity must be positive".into()));
        }
        if self.media_host.is_empty() {
            return Err(ConfigError::Invalid("media_host must not be empty".into()));
        }
        Ok(())
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: WireConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        self.validate()?;
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
