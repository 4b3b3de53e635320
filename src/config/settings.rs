//! Crate configuration loading and validation.
//!
//! Provides the [`Config`] struct that aggregates logging and symbol
//! defaults. Configuration is loaded from a TOML file.
//!
//! # Example
//!
//! ```no_run
//! use mipform::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("mipform.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::logging::LoggingConfig;
use super::symbols::SymbolConfig;
use crate::error::{ConfigError, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Numeric defaults for symbol construction.
    #[serde(default)]
    pub symbols: SymbolConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or fails
    /// validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not parse or fails validation.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "level" }.into());
        }
        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "format",
                    reason: format!("expected 'json' or 'pretty', got '{other}'"),
                }
                .into())
            }
        }
        self.symbols.validate()?;
        Ok(())
    }

    /// Initialize tracing with the configured logging settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.symbols, SymbolConfig::default());
    }

    #[test]
    fn test_parse_symbol_section() {
        let config = Config::parse_toml(
            r#"
[symbols]
epsilon = 0.001
extract = false
"#,
        )
        .unwrap();
        assert_eq!(config.symbols.epsilon, 0.001);
        assert!(!config.symbols.extract);
        assert_eq!(config.symbols.piecewise_threshold, 1e-5);
    }

    #[test]
    fn test_rejects_unknown_format() {
        let result = Config::parse_toml(
            r#"
[logging]
level = "debug"
format = "xml"
"#,
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidValue { field: "format", .. }))
        ));
    }

    #[test]
    fn test_rejects_blank_level() {
        let result = Config::parse_toml(
            r#"
[logging]
level = " "
"#,
        );
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingField { field: "level" }))
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result = Config::parse_toml("[symbols\nepsilon = ");
        assert!(matches!(result, Err(Error::Config(ConfigError::Parse(_)))));
    }
}
