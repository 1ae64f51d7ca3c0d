//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::TicketPolicy;
use crate::sla::SlaThresholds;
use crate::{Result, SupportError};

/// Support engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    /// SLA thresholds applied on every read
    pub sla: SlaThresholds,
    /// Upper bound for `limit` on list operations
    pub max_page_size: i64,
    /// Page size used when the caller omits `limit`
    pub default_page_size: i64,
    /// Bound on every store call
    pub store_timeout_ms: u64,
    /// Whether a reply reopens a resolved ticket
    pub allow_reopen: bool,
    /// Maximum message body length in characters
    pub max_body_len: usize,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            sla: SlaThresholds::default(),
            max_page_size: 100,
            default_page_size: 20,
            store_timeout_ms: 5_000,
            allow_reopen: true,
            max_body_len: 10_000,
        }
    }
}

impl SupportConfig {
    /// Parse from JSON; missing keys fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SupportError::Config(format!("invalid support config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SupportError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.sla.validate()?;
        if self.max_page_size < 1 {
            return Err(SupportError::Config("max_page_size must be >= 1".into()));
        }
        if self.default_page_size < 1 || self.default_page_size > self.max_page_size {
            return Err(SupportError::Config(format!(
                "default_page_size must be between 1 and {}",
                self.max_page_size
            )));
        }
        if self.store_timeout_ms == 0 {
            return Err(SupportError::Config("store_timeout_ms must be > 0".into()));
        }
        if self.max_body_len == 0 {
            return Err(SupportError::Config("max_body_len must be > 0".into()));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn ticket_policy(&self) -> TicketPolicy {
        TicketPolicy { allow_reopen: self.allow_reopen, max_body_len: self.max_body_len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            SupportConfig::from_json(r#"{"max_page_size": 50, "sla": {"at_risk_minutes": 60, "breach_minutes": 120}}"#)
                .unwrap();
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.sla.breach_minutes, 120);
        assert_eq!(config.default_page_size, 20);
        assert!(config.allow_reopen);
    }

    #[test]
    fn rejects_inconsistent_values() {
        assert!(SupportConfig::from_json(r#"{"default_page_size": 500}"#).is_err());
        assert!(SupportConfig::from_json(r#"{"store_timeout_ms": 0}"#).is_err());
        assert!(SupportConfig::from_json(r#"{"sla": {"at_risk_minutes": 60, "breach_minutes": 30}}"#).is_err());
        assert!(SupportConfig::from_json("not json").is_err());
    }

    #[test]
    fn rejects_oversized_sla_thresholds() {
        let err = SupportConfig::from_json(
            r#"{"sla": {"at_risk_minutes": 9000000000000000, "breach_minutes": 9000000000000000}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SupportError::Config(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = SupportConfig::load("/nonexistent/support.json").unwrap_err();
        assert!(matches!(err, SupportError::Config(_)));
    }
}
