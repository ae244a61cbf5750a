//! Error type for the logging subsystem.

use std::fmt;

#[derive(Debug, Clone)]
pub enum LoggingError {
    InitializationFailed(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::InitializationFailed(msg) => {
                write!(f, "failed to initialize logging: {}", msg)
            }
        }
    }
}

impl std::error::Error for LoggingError {}
