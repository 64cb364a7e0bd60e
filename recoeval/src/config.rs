use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use recocore::algorithm::matching::{MatchParams, MatchingMode};
use recocore::error::RecoResult;
use serde::{Deserialize, Serialize};

use crate::error::EvalResult;

/// Matching settings for one object kind.
///
/// # Example
///
/// ```rust
/// # use recoeval::config::MatchConfig;
/// let config: MatchConfig = serde_json::from_str(r#"{"matching_mode": "both", "min_overlap": 0.25}"#).unwrap();
/// assert_eq!(config.matching_mode.to_string(), "both");
/// assert_eq!(config.params.overlap_mode.to_string(), "iou");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(default)]
    pub matching_mode: MatchingMode,
    #[serde(flatten)]
    pub params: MatchParams,
}

impl MatchConfig {
    /// Builds a configuration from its textual form, as it appears in configuration files.
    ///
    /// # Arguments
    ///
    /// * `matching_mode` - One of `pred_to_true`, `true_to_pred`, `both`.
    /// * `min_overlap` - Strict overlap threshold, finite and non-negative.
    /// * `overlap_mode` - One of `iou`, `chamfer`.
    /// * `weight` - Score with deposition weighted overlaps.
    pub fn new(matching_mode: &str, min_overlap: f64, overlap_mode: &str, weight: bool) -> RecoResult<Self> {
        let config = MatchConfig {
            matching_mode: matching_mode.parse()?,
            params: MatchParams {
                min_overlap,
                overlap_mode: overlap_mode.parse()?,
                weight,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecoResult<()> {
        self.params.validate()
    }
}

fn default_hierarchical() -> bool {
    false
}

/// Settings of a full evaluation run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub interactions: MatchConfig,
    #[serde(default)]
    pub particles: MatchConfig,
    /// Restrict particle matching to the members of matched interaction pairs.
    #[serde(default = "default_hierarchical")]
    pub hierarchical: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            interactions: MatchConfig::default(),
            particles: MatchConfig::default(),
            hierarchical: default_hierarchical(),
        }
    }
}

impl EvalConfig {
    pub fn from_json_str(s: &str) -> EvalResult<Self> {
        let config: EvalConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> EvalResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: EvalConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RecoResult<()> {
        self.interactions.validate()?;
        self.particles.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recocore::algorithm::overlap::OverlapMode;
    use recocore::error::{ErrorKind, RecoError};

    #[test]
    fn test_defaults() {
        let config = EvalConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EvalConfig::default());
        assert_eq!(config.particles.matching_mode, MatchingMode::TrueToPred);
        assert_eq!(config.particles.params.min_overlap, 0.0);
        assert_eq!(config.particles.params.overlap_mode, OverlapMode::Iou);
        assert!(!config.particles.params.weight);
        assert!(!config.hierarchical);
    }

    #[test]
    fn test_nested_sections() {
        let config = EvalConfig::from_json_str(
            r#"{
                "interactions": {"matching_mode": "pred_to_true", "min_overlap": 0.1},
                "particles": {"matching_mode": "both", "overlap_mode": "chamfer", "weight": true},
                "hierarchical": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.interactions.matching_mode, MatchingMode::PredToTrue);
        assert!((config.interactions.params.min_overlap - 0.1).abs() < 1e-12);
        assert_eq!(config.particles.params.overlap_mode, OverlapMode::Chamfer);
        assert!(config.particles.params.weight);
        assert!(config.hierarchical);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = MatchConfig::new("sideways", 0.0, "iou", false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert!(EvalConfig::from_json_str(r#"{"particles": {"matching_mode": "sideways"}}"#).is_err());
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let err = MatchConfig::new("both", -0.5, "iou", false).unwrap_err();
        assert_eq!(err, RecoError::InvalidThreshold(-0.5));
        assert!(EvalConfig::from_json_str(r#"{"interactions": {"min_overlap": -1.0}}"#).is_err());
    }
}
