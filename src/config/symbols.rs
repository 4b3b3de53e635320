//! Numeric defaults shared by every function symbol.

use serde::Deserialize;

use crate::error::ConfigError;

/// Defaults applied when a symbol is constructed without explicit numeric
/// parameters.
///
/// # Example
///
/// ```
/// use mipform::config::SymbolConfig;
///
/// let config = SymbolConfig::default();
/// assert_eq!(config.epsilon, 1e-6);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SymbolConfig {
    /// Separation between "> 0" and "≥ 0" in strict-inequality encodings.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Epsilon at or above which continuous indicator extraction switches to
    /// the piecewise ramp encoding.
    #[serde(default = "default_piecewise_threshold")]
    pub piecewise_threshold: f64,

    /// Whether logic symbols link their indicator in both directions.
    #[serde(default = "default_extract")]
    pub extract: bool,
}

fn default_epsilon() -> f64 {
    1e-6
}

fn default_piecewise_threshold() -> f64 {
    1e-5
}

fn default_extract() -> bool {
    true
}

impl Default for SymbolConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            piecewise_threshold: default_piecewise_threshold(),
            extract: default_extract(),
        }
    }
}

impl SymbolConfig {
    /// Check the numeric defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when epsilon is outside `(0, 1)` or the
    /// piecewise threshold is not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "epsilon",
                reason: format!("must be in (0, 1), got {}", self.epsilon),
            });
        }
        if !(self.piecewise_threshold > 0.0) || !self.piecewise_threshold.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "piecewise_threshold",
                reason: format!("must be positive, got {}", self.piecewise_threshold),
            });
        }
        Ok(())
    }

    /// True when an extraction with this config's epsilon picks the
    /// piecewise ramp.
    #[must_use]
    pub fn prefers_piecewise(&self) -> bool {
        self.epsilon >= self.piecewise_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SymbolConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.prefers_piecewise());
    }

    #[test]
    fn test_rejects_zero_epsilon() {
        let config = SymbolConfig {
            epsilon: 0.0,
            ..SymbolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "epsilon", .. })
        ));
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let config = SymbolConfig {
            piecewise_threshold: -1.0,
            ..SymbolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "piecewise_threshold",
                ..
            })
        ));
    }

    #[test]
    fn test_large_epsilon_prefers_piecewise() {
        let config = SymbolConfig {
            epsilon: 1e-3,
            ..SymbolConfig::default()
        };
        assert!(config.prefers_piecewise());
    }
}
