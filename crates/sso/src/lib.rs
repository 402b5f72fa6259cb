//! Central ticket service for the SSO server
//!
//! [`CentralAuthenticationService`] is the surface the web layer calls:
//! it logs users in, issues service and proxy tickets, validates them for
//! relying services and ends sessions.
//!
//! # Example
//!
//! ```no_run
//! use authn::{AuthenticationExceptionHandler, AuthenticationManager, LoggingEventPublisher};
//! use registry::{DefaultTicketRegistry, LoggingLogoutManager};
//! use sso::{CentralAuthenticationService, ServiceConfig};
//! use std::sync::Arc;
//!
//! let cas = CentralAuthenticationService::new(
//!     ServiceConfig::default(),
//!     Arc::new(DefaultTicketRegistry::new()),
//!     AuthenticationManager::new(Vec::new()),
//!     AuthenticationExceptionHandler::new(Arc::new(LoggingEventPublisher)),
//!     Arc::new(LoggingLogoutManager),
//! );
//! assert_eq!(cas.get_tickets(|_| true).len(), 0);
//! ```

pub mod assertion;
pub mod error;
pub mod service;

pub use assertion::{Assertion, LoginOutcome};
pub use error::{Result, SsoError};
pub use service::{CentralAuthenticationService, ServiceConfig};
