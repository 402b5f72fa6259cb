//! Credential authentication for the SSO server
//!
//! - [`AuthenticationHandler`] implementations turn one credential into a
//!   principal or a [`HandlerError`] of a known [`FailureKind`]
//! - [`X509CredentialsAuthenticationHandler`] validates client certificate
//!   chains; [`HttpBasedServiceCredentialsHandler`] accepts proxy callbacks
//! - [`AuthenticationManager`] runs the handlers over the offered credentials
//! - [`AuthenticationExceptionHandler`] maps a failed attempt to a single
//!   outcome and publishes an [`AuditEvent`]

pub mod audit;
pub mod error;
pub mod handler;
pub mod manager;
pub mod outcome;
pub mod proxy;
pub mod revocation;
pub mod x509;

pub use audit::{AuditEvent, EventPublisher, EventResult, EventType, LoggingEventPublisher, PublishError};
pub use error::{
    AuthenticationException, AuthnError, CertificateError, FailureKind, HandlerError, Result,
};
pub use handler::AuthenticationHandler;
pub use manager::{AuthenticationManager, AuthenticationPolicy};
pub use outcome::{
    AuthenticationExceptionHandler, AuthenticationOutcome, OutcomeOptions, RequestContext, UNKNOWN,
};
pub use proxy::HttpBasedServiceCredentialsHandler;
pub use revocation::{NoOpRevocationChecker, RevocationChecker, SerialRevocationChecker};
pub use x509::{X509CredentialsAuthenticationHandler, X509Options};
