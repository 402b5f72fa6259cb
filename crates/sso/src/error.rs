//! Error types for the central ticket service

use authn::AuthenticationException;
use registry::RegistryError;
use thiserror::Error;
use ticket::TicketError;

#[derive(Error, Debug)]
pub enum SsoError {
    /// No ticket of the expected kind under this id
    #[error("Ticket [{0}] not found")]
    InvalidTicket(String),

    #[error("Ticket [{0}] has expired")]
    TicketExpired(String),

    #[error("Service [{presented}] does not match the service of ticket [{ticket_id}]")]
    UnrecognizedService { ticket_id: String, presented: String },

    #[error("Authentication failed: {0}")]
    UnsatisfiedAuthentication(Box<AuthenticationException>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Ticket(#[from] TicketError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<AuthenticationException> for SsoError {
    fn from(e: AuthenticationException) -> Self {
        SsoError::UnsatisfiedAuthentication(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, SsoError>;
