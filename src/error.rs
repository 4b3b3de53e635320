use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Failures raised while a function symbol is registered.
///
/// Registration is the only fallible step of a symbol's lifecycle. Evaluation
/// never fails; it reports an unknown value instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    /// A domain precondition of the symbol does not hold for the current
    /// operand bounds (negative operand of a logic symbol, mask outside
    /// `[0, 1]`, unsupported `≠` comparison, unbounded big-M operand, ...).
    #[error("application failed for {symbol}: {reason}")]
    ApplicationFailed {
        /// Name of the symbol that rejected its operands.
        symbol: String,
        /// Diagnostic naming the offending operand.
        reason: String,
    },
}

/// Errors reported by the token table and the linear model.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("variable name '{name}' is already registered by another variable")]
    DuplicateVariable { name: String },

    #[error("constraint '{constraint}' references unregistered variable '{variable}'")]
    UnknownVariable { variable: String, constraint: String },

    #[error("constraint '{constraint}' has a non-finite coefficient or right-hand side")]
    NonFinite { constraint: String },

    #[error("constraint '{constraint}' uses an unsupported sign: {sign}")]
    UnsupportedSign {
        constraint: String,
        sign: &'static str,
    },
}

/// Errors from solver backends.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("model is infeasible")]
    Infeasible,

    #[error("objective is unbounded")]
    Unbounded,

    #[error("solver backend failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl Error {
    /// True when this is a symbol's `ApplicationFailed` rejection.
    #[must_use]
    pub fn is_application_failed(&self) -> bool {
        matches!(self, Error::Symbol(SymbolError::ApplicationFailed { .. }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_failed_display_names_symbol() {
        let err: Error = SymbolError::ApplicationFailed {
            symbol: "and_1".into(),
            reason: "operand x may be negative".into(),
        }
        .into();

        assert!(err.is_application_failed());
        assert_eq!(
            err.to_string(),
            "application failed for and_1: operand x may be negative"
        );
    }

    #[test]
    fn test_model_error_is_not_application_failed() {
        let err: Error = ModelError::DuplicateVariable { name: "x".into() }.into();
        assert!(!err.is_application_failed());
    }
}
