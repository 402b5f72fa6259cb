//! Error types for the ticket model

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("Ticket expired: {0}")]
    Expired(String),
}

/// Result type for ticket model operations
pub type Result<T> = std::result::Result<T, TicketError>;
