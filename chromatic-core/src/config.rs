//! # Configuration Module
//!
//! Tunable parameters for a tuner session. A config is validated as a whole
//! before it replaces the active one, so an invalid update never leaves the
//! session half-configured.

use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};

/// Default in-tune band in cents.
pub const DEFAULT_DETECTION_THRESHOLD_CENTS: f64 = 10.0;
/// Default minimum detector confidence for a sample to count as voiced.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
/// Default length of the stability window (about five 2048-sample frames at 44.1 kHz).
pub const DEFAULT_SMOOTHING_WINDOW_MS: u64 = 250;
/// Default time without voiced input before the readout goes silent.
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 500;
/// Default share of the window a note must hold to be displayed.
pub const DEFAULT_MAJORITY_RATIO: f64 = 0.6;

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Half-width of the in-tune band, in cents, within `(0, 50]`.
    pub detection_threshold_cents: f64,
    /// Samples with a lower confidence are treated as unvoiced.
    pub min_confidence: f64,
    /// Length of the stability filter's rolling window.
    pub smoothing_window_ms: u64,
    /// How long the window must stay empty before `Silent` is reported.
    pub silence_timeout_ms: u64,
    /// Fraction of the window a note name must hold to be accepted.
    pub majority_ratio: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            detection_threshold_cents: DEFAULT_DETECTION_THRESHOLD_CENTS,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            smoothing_window_ms: DEFAULT_SMOOTHING_WINDOW_MS,
            silence_timeout_ms: DEFAULT_SILENCE_TIMEOUT_MS,
            majority_ratio: DEFAULT_MAJORITY_RATIO,
        }
    }
}

impl TunerConfig {
    /// Checks every field against its documented domain.
    pub fn validate(&self) -> Result<()> {
        let t = self.detection_threshold_cents;
        if !(t > 0.0 && t <= 50.0) {
            return Err(TunerError::invalid(
                "detection_threshold_cents",
                format!("must be within (0, 50], got {t}"),
            ));
        }
        let c = self.min_confidence;
        if !(0.0..=1.0).contains(&c) {
            return Err(TunerError::invalid(
                "min_confidence",
                format!("must be within [0, 1], got {c}"),
            ));
        }
        if self.smoothing_window_ms == 0 {
            return Err(TunerError::invalid(
                "smoothing_window_ms",
                "must be greater than zero",
            ));
        }
        let r = self.majority_ratio;
        if !(r > 0.5 && r <= 1.0) {
            return Err(TunerError::invalid(
                "majority_ratio",
                format!("must be within (0.5, 1], got {r}"),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TunerConfig = serde_json::from_str(json)
            .map_err(|e| TunerError::invalid("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config as pretty-printed JSON.
    pub fn to_json(&self) -> String {
        // A struct of plain numbers always serializes.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = TunerConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.detection_threshold_cents, 10.0);
    }

    #[test]
    fn rejects_negative_threshold() {
        let c = TunerConfig {
            detection_threshold_cents: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            c.validate(),
            Err(TunerError::InvalidConfig { field: "detection_threshold_cents", .. })
        ));
    }

    #[test]
    fn rejects_zero_threshold() {
        let zero = TunerConfig {
            detection_threshold_cents: 0.0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let widest = TunerConfig {
            detection_threshold_cents: 50.0,
            ..Default::default()
        };
        assert!(widest.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let bad = [
            TunerConfig { min_confidence: 1.5, ..Default::default() },
            TunerConfig { min_confidence: f64::NAN, ..Default::default() },
            TunerConfig { smoothing_window_ms: 0, ..Default::default() },
            TunerConfig { majority_ratio: 0.5, ..Default::default() },
            TunerConfig { detection_threshold_cents: f64::INFINITY, ..Default::default() },
            TunerConfig { detection_threshold_cents: f64::NAN, ..Default::default() },
            TunerConfig { detection_threshold_cents: 50.5, ..Default::default() },
        ];
        for c in bad {
            assert!(c.validate().is_err(), "{c:?}");
        }
    }

    #[test]
    fn json_partial_fields_use_defaults() {
        let c = TunerConfig::from_json(r#"{ "detection_threshold_cents": 5.0 }"#).unwrap();
        assert_eq!(c.detection_threshold_cents, 5.0);
        assert_eq!(c.smoothing_window_ms, DEFAULT_SMOOTHING_WINDOW_MS);

        let back = TunerConfig::from_json(&c.to_json()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn json_errors_are_invalid_config() {
        assert!(TunerConfig::from_json("not json").is_err());
        assert!(TunerConfig::from_json(r#"{ "majority_ratio": 2.0 }"#).is_err());
    }
}
