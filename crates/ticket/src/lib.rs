//! Ticket model for the SSO server
//!
//! This crate holds the value types shared by every other layer: offered
//! credentials and the X.509 certificate model, resolved principals,
//! relying services and redirect matching, authentication results, the
//! four ticket variants with their expiration policies, and ticket id
//! generation.
//!
//! # Example
//!
//! ```
//! use ticket::{Authentication, ExpirationPolicy, GrantingTicket, Principal, Service, Ticket, TicketKind};
//!
//! let tgt = GrantingTicket::new(
//!     "TGT-1-abc",
//!     Authentication::new(Principal::new("alice")),
//!     ExpirationPolicy::Never,
//! );
//! let st = tgt.grant_service_ticket("ST-1-abc", Service::new("https://app/"), ExpirationPolicy::Never, true);
//!
//! assert_eq!(Ticket::from(st).kind(), TicketKind::Service);
//! assert!(tgt.services().contains_key("ST-1-abc"));
//! ```

pub mod authentication;
pub mod credential;
pub mod error;
pub mod expiration;
pub mod id;
pub mod options;
pub mod principal;
pub mod service;
pub mod ticket;

pub use authentication::{Authentication, CredentialMetaData, HandlerResult};
pub use credential::{
    BasicConstraints, CertificateValidity, Credential, HttpBasedServiceCredential, KeyUsage,
    X509Certificate, X509CertificateBuilder, X509CertificateCredential, KEY_USAGE_OID,
};
pub use error::{Result, TicketError};
pub use expiration::{ExpirationPolicy, TicketState};
pub use id::UniqueTicketIdGenerator;
pub use options::ExpirationOptions;
pub use principal::{AttributeValue, Principal};
pub use service::Service;
pub use ticket::{GrantingTicket, ServiceTicket, Ticket, TicketKind, MAX_PROXY_CHAIN_DEPTH};
