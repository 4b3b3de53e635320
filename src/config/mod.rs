//! Configuration: logging setup and numeric symbol defaults.

pub mod logging;
pub mod settings;
pub mod symbols;

pub use logging::LoggingConfig;
pub use settings::Config;
pub use symbols::SymbolConfig;
