//! Tunables for normalization and list reconciliation
use crate::errors::ReconcilerError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const DEFAULT_BAIL_OUT_RATIO: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Deepest description level the normalizer descends into.
    pub max_depth: usize,
    /// A child list is replaced wholesale when its length changes by more
    /// than this fraction of the longer list.
    pub bail_out_ratio: f64,
    /// Diff a moved keyed child against its old counterpart right after the `Move`.
    pub rediff_moved: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            bail_out_ratio: DEFAULT_BAIL_OUT_RATIO,
            rediff_moved: true,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ReconcilerError> {
        let config: ReconcilerConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconcilerError> {
        if self.max_depth == 0 {
            return Err(ReconcilerError::ConfigError {
                details: "max_depth must be at least 1".into(),
            });
        }
        if !self.bail_out_ratio.is_finite() || !(0.0..=1.0).contains(&self.bail_out_ratio) {
            return Err(ReconcilerError::ConfigError {
                details: format!("bail_out_ratio must be within [0, 1], got {}", self.bail_out_ratio),
            });
        }
        Ok(())
    }
}
