use thiserror::Error;

/// Common error type for infrastructure operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The logging subsystem could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// Error with additional context attached
    #[error("{0}")]
    Custom(String),
}

/// Result alias for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;
