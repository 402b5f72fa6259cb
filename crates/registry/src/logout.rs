//! Single-logout and cleaner eligibility collaborators

use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use ticket::{GrantingTicket, Service};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutRequestStatus {
    NotAttempted,
    Success,
    Failure,
}

/// Notification owed to one relying service when a session ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutRequest {
    pub ticket_id: String,
    pub service: Service,
    pub status: LogoutRequestStatus,
}

/// Performs single logout for a granting ticket that is going away
///
/// Called once per expiring or destroyed granting ticket, before it is
/// deleted from the registry. Callers bound the call with a timeout and
/// treat errors as non-fatal.
#[async_trait]
pub trait LogoutManager: Send + Sync + Debug {
    async fn perform_logout(&self, ticket: &Arc<GrantingTicket>) -> Result<Vec<LogoutRequest>>;
}

/// Builds one request per issued child ticket and logs it
///
/// Delivery of the logout message is left to the transport layer.
#[derive(Debug, Default, Clone)]
pub struct LoggingLogoutManager;

#[async_trait]
impl LogoutManager for LoggingLogoutManager {
    async fn perform_logout(&self, ticket: &Arc<GrantingTicket>) -> Result<Vec<LogoutRequest>> {
        let mut requests: Vec<LogoutRequest> = ticket
            .services()
            .into_iter()
            .map(|(ticket_id, service)| LogoutRequest {
                ticket_id,
                service,
                status: LogoutRequestStatus::NotAttempted,
            })
            .collect();
        requests.sort_by(|a, b| a.ticket_id.cmp(&b.ticket_id));

        for request in &requests {
            info!(
                "Logout request for service [{}] of session [{}] (ticket [{}])",
                request.service,
                ticket.id(),
                request.ticket_id
            );
        }
        Ok(requests)
    }
}

/// Whether this process is the registry instance that runs the cleaner
pub trait CleanerEligibility: Send + Sync {
    fn is_active(&self) -> bool;
}

impl<F> CleanerEligibility for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_active(&self) -> bool {
        self()
    }
}

/// Fixed eligibility, typically from `cleaner_enabled`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticEligibility(pub bool);

impl CleanerEligibility for StaticEligibility {
    fn is_active(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticket::{Authentication, ExpirationPolicy, Principal};

    #[tokio::test]
    async fn test_one_request_per_child() {
        let tgt = GrantingTicket::new(
            "TGT-1-a",
            Authentication::new(Principal::new("alice")),
            ExpirationPolicy::Never,
        );
        tgt.grant_service_ticket("ST-2-a", Service::new("https://b/"), ExpirationPolicy::Never, false);
        tgt.grant_service_ticket("ST-1-a", Service::new("https://a/"), ExpirationPolicy::Never, false);

        let requests = LoggingLogoutManager.perform_logout(&tgt).await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].ticket_id, "ST-1-a");
        assert_eq!(requests[0].service, Service::new("https://a/"));
        assert!(requests
            .iter()
            .all(|r| r.status == LogoutRequestStatus::NotAttempted));
    }

    #[test]
    fn test_eligibility() {
        assert!(StaticEligibility(true).is_active());
        assert!(!StaticEligibility(false).is_active());

        let leader = || false;
        assert!(!leader.is_active());
    }
}
