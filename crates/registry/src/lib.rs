//! Ticket registry for the SSO server
//!
//! [`DefaultTicketRegistry`] is the concurrent in-memory store behind the
//! [`TicketRegistry`] contract. Deleting a granting ticket removes every
//! ticket it issued, so no service or proxy ticket outlives its TGT.
//! [`TicketRegistryCleaner`] sweeps expired tickets on a fixed interval,
//! calling a [`LogoutManager`] for each granting ticket before it goes.
//!
//! # Example
//!
//! ```
//! use registry::{DefaultTicketRegistry, TicketRegistry};
//! use ticket::{Authentication, ExpirationPolicy, GrantingTicket, Principal, Service};
//!
//! let registry = DefaultTicketRegistry::new();
//! let tgt = GrantingTicket::new("TGT-1-x", Authentication::new(Principal::new("alice")), ExpirationPolicy::Never);
//! let st = tgt.grant_service_ticket("ST-1-x", Service::new("https://app/"), ExpirationPolicy::Never, true);
//!
//! registry.add_ticket(tgt.into()).unwrap();
//! registry.add_ticket(st.into()).unwrap();
//! assert!(registry.delete_ticket("TGT-1-x"));
//! assert!(registry.get_ticket("ST-1-x").is_none());
//! ```

pub mod cleaner;
pub mod error;
pub mod logout;
pub mod options;
pub mod registry;

pub use cleaner::{CleanerConfig, CleanerHandle, CleanupReport, TicketRegistryCleaner};
pub use error::{RegistryError, Result};
pub use logout::{
    CleanerEligibility, LoggingLogoutManager, LogoutManager, LogoutRequest, LogoutRequestStatus,
    StaticEligibility,
};
pub use options::{RegistryOptions, MAX_INITIAL_CAPACITY};
pub use registry::{DefaultTicketRegistry, TicketRegistry};
