//! Net configuration loaded from JSON.
//!
//! ```json
//! { "log_level": "debug", "local_domain": { "id": "studio-a" } }
//! ```

use crate::core::domain::{Domain, DOMAIN_ID_LENGTH};
use crate::observability::LogLevel;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Log level given either by name (`"warn"`) or by index (`2`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelSetting {
    Index(u64),
    Name(String),
}

impl LevelSetting {
    pub fn resolve(&self) -> Result<LogLevel> {
        match self {
            LevelSetting::Index(index) => LogLevel::from_index(*index)
                .ok_or_else(|| anyhow!("log level index {} is out of range 0..=4", index)),
            LevelSetting::Name(name) => {
                LogLevel::from_name(name).ok_or_else(|| anyhow!("unknown log level {:?}", name))
            }
        }
    }
}

/// Identity of the local domain. `id` and `random_id_length` are mutually
/// exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalDomainConfig {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub random_id_length: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetConfig {
    #[serde(default)]
    pub log_level: Option<LevelSetting>,
    /// Turns every diagnostic off. Cannot be combined with `log_level`.
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub local_domain: Option<LocalDomainConfig>,
}

impl NetConfig {
    pub fn from_json(value: Value) -> Result<Self> {
        let config: NetConfig = serde_json::from_value(value).context("Invalid net configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Self::from_json(value)
    }

    pub fn validate(&self) -> Result<()> {
        if self.silent && self.log_level.is_some() {
            bail!("\"silent\" and \"log_level\" are mutually exclusive");
        }
        if let Some(level) = &self.log_level {
            level.resolve()?;
        }
        if let Some(domain) = &self.local_domain {
            match (&domain.id, domain.random_id_length) {
                (Some(_), Some(_)) => {
                    bail!("\"local_domain.id\" and \"local_domain.random_id_length\" are mutually exclusive")
                }
                (Some(id), None) if !DOMAIN_ID_LENGTH.contains(&id.chars().count()) => {
                    bail!("local domain id {:?} must be 2 to 127 characters long", id)
                }
                (None, Some(length)) if !DOMAIN_ID_LENGTH.contains(&length) => {
                    bail!("random id length {} must be within 2..=127", length)
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Level the net's diagnostics should start at.
    pub fn effective_level(&self) -> LogLevel {
        if self.silent {
            return LogLevel::Off;
        }
        self.log_level
            .as_ref()
            .and_then(|level| level.resolve().ok())
            .unwrap_or_default()
    }

    pub fn build_domain(&self) -> Result<Domain> {
        let domain = match &self.local_domain {
            Some(LocalDomainConfig { id: Some(id), .. }) => Domain::with_id(id.clone())?,
            Some(LocalDomainConfig {
                random_id_length: Some(length),
                ..
            }) => Domain::with_random_id(*length)?,
            _ => Domain::new(),
        };
        Ok(domain)
    }
}
