//! Results handed back to relying services and login callers

use authn::AuthenticationOutcome;
use std::sync::Arc;
use ticket::{Authentication, GrantingTicket, Principal, Service};

/// Outcome of a successful service or proxy ticket validation
#[derive(Debug, Clone)]
pub struct Assertion {
    principal: Arc<Principal>,
    service: Service,
    from_new_login: bool,
    chained_authentications: Vec<Arc<Authentication>>,
}

impl Assertion {
    pub(crate) fn new(
        service: Service,
        from_new_login: bool,
        chained_authentications: Vec<Arc<Authentication>>,
    ) -> Option<Self> {
        let principal = chained_authentications.first()?.principal().clone();
        Some(Self {
            principal,
            service,
            from_new_login,
            chained_authentications,
        })
    }

    /// Principal of the root ticket-granting ticket
    pub fn principal(&self) -> &Arc<Principal> {
        &self.principal
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    /// Authentications from the root TGT down to the issuing granting ticket
    pub fn chained_authentications(&self) -> &[Arc<Authentication>] {
        &self.chained_authentications
    }

    pub fn primary_authentication(&self) -> &Arc<Authentication> {
        // never empty, see `new`
        &self.chained_authentications[0]
    }

    /// Number of proxies between the root TGT and the validated ticket
    pub fn proxy_depth(&self) -> usize {
        self.chained_authentications.len().saturating_sub(1)
    }
}

/// Result of [`login`](crate::CentralAuthenticationService::login)
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(Arc<GrantingTicket>),
    Failed(AuthenticationOutcome),
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated(_))
    }

    pub fn ticket_granting_ticket(&self) -> Option<&Arc<GrantingTicket>> {
        match self {
            LoginOutcome::Authenticated(tgt) => Some(tgt),
            LoginOutcome::Failed(_) => None,
        }
    }

    /// Flow state: `success`, a failure kind name, or `UNKNOWN`
    pub fn state(&self) -> &str {
        match self {
            LoginOutcome::Authenticated(_) => "success",
            LoginOutcome::Failed(outcome) => &outcome.state,
        }
    }
}
