//! Error types for the ticket registry

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Malformed input from the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store or scheduler unavailable; requests keep working
    #[error("Operational failure: {0}")]
    Operational(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
