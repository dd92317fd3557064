//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! source = "broker_confirmed"
//! volume_scale = 10000.0
//!
//! [session]
//! login = 1001
//! source_tag = "desk"
//!
//! [account]
//! title = "Demo"
//! initial_balance = 100000.0
//! ```

use crate::error::{EngineError, Result};
use crate::execution::SourceKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_VOLUME_SCALE: f64 = 10_000.0;

fn default_volume_scale() -> f64 {
    DEFAULT_VOLUME_SCALE
}

/// Trading session identity, stamped onto every broker payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub login: u64,
    #[serde(default = "Session::default_source_tag")]
    pub source_tag: String,
}

impl Session {
    pub fn new(login: u64, source_tag: impl Into<String>) -> Self {
        Self {
            login,
            source_tag: source_tag.into(),
        }
    }

    fn default_source_tag() -> String {
        "tickdesk".into()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(0, Self::default_source_tag())
    }
}

/// Account summary settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "AccountConfig::default_title")]
    pub title: String,
    #[serde(default = "AccountConfig::default_balance")]
    pub initial_balance: f64,
}

impl AccountConfig {
    fn default_title() -> String {
        "Simulated Account".into()
    }

    fn default_balance() -> f64 {
        10_000_000.0
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            initial_balance: Self::default_balance(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub source: SourceKind,
    /// Lots to wire units for broker payloads.
    #[serde(default = "default_volume_scale")]
    pub volume_scale: f64,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub account: AccountConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            volume_scale: DEFAULT_VOLUME_SCALE,
            session: Session::default(),
            account: AccountConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("parse engine TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.volume_scale.is_finite() || self.volume_scale <= 0.0 {
            return Err(EngineError::Config(format!(
                "volume_scale must be positive, got {}",
                self.volume_scale
            )));
        }
        if !self.account.initial_balance.is_finite() {
            return Err(EngineError::Config("initial_balance must be finite".into()));
        }
        if self.source == SourceKind::BrokerConfirmed && self.session.login == 0 {
            return Err(EngineError::Config(
                "broker_confirmed source needs a session login".into(),
            ));
        }
        Ok(())
    }
}
