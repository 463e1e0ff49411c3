//! Engine configuration.
//!
//! Everything here has a sensible default; embedders typically only touch
//! [`IntegrityConfig::owner_change`]. Configuration can be loaded from JSON:
//!
//! ```
//! use typegraph::{EngineConfig, Severity};
//!
//! let cfg = EngineConfig::from_json(r#"{ "integrity": { "owner_change": "fail" } }"#).unwrap();
//! assert_eq!(cfg.integrity.owner_change, Severity::Fail);
//! assert!(cfg.traversal.depth_first);
//! ```

use serde::{Deserialize, Serialize};

use crate::visitor::VisitOptions;
use crate::Result;

/// How a detected integrity anomaly is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Log through `tracing::warn!` and carry on.
    #[default]
    Warn,
    /// Reject the mutation with an error.
    Fail,
}

/// Rules applied by the integrity layer when attributes are mutated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Reassigning a populated owner reference to a node that is not
    /// key-equal to the previous owner.
    pub owner_change: Severity,
}

/// Top-level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub integrity: IntegrityConfig,
    /// Defaults for visitors built by [`ObjectGraph::visitor`](crate::ObjectGraph::visitor).
    pub traversal: VisitOptions,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.integrity.owner_change, Severity::Warn);
        assert!(cfg.traversal.depth_first);
        assert!(!cfg.traversal.prune_cycles);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut cfg = EngineConfig::default();
        cfg.integrity.owner_change = Severity::Fail;
        cfg.traversal.prune_cycles = true;
        cfg.traversal.verbose = true;
        let json = cfg.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), cfg);
    }

    #[test]
    fn test_bad_json() {
        let err = EngineConfig::from_json(r#"{ "integrity": { "owner_change": "explode" } }"#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
