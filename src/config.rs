// src/config.rs

//! Configuration file support
//!
//! ```toml
//! [solver]
//! concurrency = 4
//! resolver = "greedy"
//!
//! [logging]
//! filter = "arbor=debug"
//! ```
//!
//! Every key is optional. Missing keys take their defaults.

use crate::error::{Error, Result};
use crate::solver::SolverOptions;
use serde::{Deserialize, Serialize};

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub solver: SolverOptions,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        if self.logging.filter.trim().is_empty() {
            return Err(Error::Config("logging filter must not be empty".to_string()));
        }
        Ok(())
    }
}
