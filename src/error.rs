//! Error types and handling for hive, descriptor and correlation operations.

use std::fmt;

/// Custom error type for rbin operations
#[derive(Debug)]
pub enum Error {
    /// I/O related errors
    Io(std::io::Error),
    /// JSON serialization errors
    Json(serde_json::Error),
    /// CSV writing errors
    Csv(csv::Error),
    /// Generic error with message
    Generic(String),
    /// Invalid input format
    InvalidInput(String),
    /// Registry hive container could not be parsed
    MalformedHive(String),
    /// A key path segment does not exist under its parent
    KeyNotFound(String),
    /// A computed byte span runs past the end of its buffer
    TruncatedRecord {
        /// Start of the requested span
        offset: i64,
        /// Length of the requested span
        length: i64,
        /// Bytes actually available
        available: usize,
    },
    /// The RID -> username table could not be built for a hive
    AccountTableUnavailable(String),
}

impl Error {
    /// Shorthand for a span that does not fit inside `available` bytes
    pub fn truncated(offset: i64, length: i64, available: usize) -> Self {
        Error::TruncatedRecord {
            offset,
            length,
            available,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Csv(err) => write!(f, "CSV error: {}", err),
            Error::Generic(msg) => write!(f, "{}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::MalformedHive(msg) => write!(f, "Malformed hive: {}", msg),
            Error::KeyNotFound(segment) => write!(f, "Registry key not found: {}", segment),
            Error::TruncatedRecord {
                offset,
                length,
                available,
            } => write!(
                f,
                "Truncated record: span {}+{} exceeds {} available bytes",
                offset, length, available
            ),
            Error::AccountTableUnavailable(msg) => {
                write!(f, "Account table unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Csv(err) => Some(err),
            _ => None,
        }
    }
}

// Convenient conversion traits
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Generic(format!("{:#}", err))
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_display() {
        let err = Error::truncated(204, 10, 100);
        assert_eq!(
            err.to_string(),
            "Truncated record: span 204+10 exceeds 100 available bytes"
        );
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: Error = anyhow::anyhow!("inner").context("reading SAM").into();
        match err {
            Error::Generic(msg) => assert_eq!(msg, "reading SAM: inner"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
