//! Decoder configuration.
//!
//! Run-level policy shared read-only by every decode pass. Loaded from TOML:
//!
//! ```toml
//! version = "coda3"
//! allow_low_subbank_ids = false
//! ts_roc_number = 0
//! max_bank_depth = 16
//! ```

use crate::constants::{DEFAULT_MAX_BANK_DEPTH, MAX_BANK_DEPTH_LIMIT};
use crate::types::CodaVersion;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Wire format of the stream.
    pub version: CodaVersion,
    /// Treat tags 0-31 on non-bank banks as ordinary subbank tags.
    pub allow_low_subbank_ids: bool,
    /// ROC number of the Trigger Supervisor (CODA3).
    pub ts_roc_number: u32,
    /// Deepest bank nesting accepted before an event is rejected.
    pub max_bank_depth: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            version: CodaVersion::Coda3,
            allow_low_subbank_ids: false,
            ts_roc_number: 0,
            max_bank_depth: DEFAULT_MAX_BANK_DEPTH,
        }
    }
}

impl DecoderConfig {
    pub fn new(version: CodaVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bank_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_bank_depth must be at least 1".to_string(),
            ));
        }
        if self.max_bank_depth > MAX_BANK_DEPTH_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_bank_depth {} exceeds the limit of {}",
                self.max_bank_depth, MAX_BANK_DEPTH_LIMIT
            )));
        }
        if self.ts_roc_number > 0xFF {
            return Err(ConfigError::Invalid(format!(
                "ts_roc_number {} does not fit a segment tag",
                self.ts_roc_number
            )));
        }
        Ok(())
    }
}
