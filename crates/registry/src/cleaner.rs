//! Periodic removal of expired tickets
//!
//! One sweep snapshots the registry, keeps the expired tickets and deletes
//! them: granting tickets get single logout first, then a cascading delete;
//! service and proxy tickets are deleted directly. Failures on individual
//! tickets are logged and never abort the sweep. No lock is held over the
//! registry as a whole, so request threads keep adding and reading tickets
//! while a sweep runs.

use crate::error::{RegistryError, Result};
use crate::logout::{CleanerEligibility, LogoutManager};
use crate::options::RegistryOptions;
use crate::registry::TicketRegistry;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use ticket::{Ticket, TicketKind};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// What one sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Tickets in the snapshot the sweep started from
    pub total_tickets: usize,
    pub expired_found: usize,
    pub ticket_granting_tickets: usize,
    pub proxy_granting_tickets: usize,
    pub service_tickets: usize,
    pub proxy_tickets: usize,
    pub logout_failures: usize,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.ticket_granting_tickets
            + self.proxy_granting_tickets
            + self.service_tickets
            + self.proxy_tickets
    }

    fn count(&mut self, kind: TicketKind) {
        match kind {
            TicketKind::TicketGranting => self.ticket_granting_tickets += 1,
            TicketKind::ProxyGranting => self.proxy_granting_tickets += 1,
            TicketKind::Service => self.service_tickets += 1,
            TicketKind::Proxy => self.proxy_tickets += 1,
        }
    }
}

/// Cleaner timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanerConfig {
    pub start_delay: Duration,
    pub repeat_interval: Duration,
    pub logout_timeout: Duration,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(20),
            repeat_interval: Duration::from_secs(120),
            logout_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&RegistryOptions> for CleanerConfig {
    fn from(options: &RegistryOptions) -> Self {
        Self {
            start_delay: options.cleaner_start_delay.0,
            repeat_interval: options.cleaner_repeat_interval.0,
            logout_timeout: options.cleaner_logout_timeout.0,
        }
    }
}

pub struct TicketRegistryCleaner {
    registry: Arc<dyn TicketRegistry>,
    logout_manager: Arc<dyn LogoutManager>,
    eligibility: Arc<dyn CleanerEligibility>,
    config: CleanerConfig,
}

impl std::fmt::Debug for TicketRegistryCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketRegistryCleaner")
            .field("registry", &self.registry)
            .field("logout_manager", &self.logout_manager)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TicketRegistryCleaner {
    pub fn new(
        registry: Arc<dyn TicketRegistry>,
        logout_manager: Arc<dyn LogoutManager>,
        eligibility: Arc<dyn CleanerEligibility>,
        config: CleanerConfig,
    ) -> Self {
        Self {
            registry,
            logout_manager,
            eligibility,
            config,
        }
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Run one sweep to completion
    pub async fn clean(&self) -> CleanupReport {
        let all_tickets = self.registry.tickets();
        let mut report = CleanupReport {
            total_tickets: all_tickets.len(),
            ..Default::default()
        };
        info!("total tickets in the registry {} ", all_tickets.len());
        info!("Beginning ticket cleanup...");

        let now = SystemTime::now();
        let expired: Vec<Ticket> = all_tickets
            .into_iter()
            .filter(|t| t.is_expired_at(now))
            .collect();
        report.expired_found = expired.len();
        debug!("{} expired tickets found.", expired.len());

        for ticket in expired {
            let kind = ticket.kind();
            match &ticket {
                Ticket::TicketGranting(granting) | Ticket::ProxyGranting(granting) => {
                    debug!("Cleaning up expired ticket-granting ticket [{}]", ticket);
                    match tokio::time::timeout(
                        self.config.logout_timeout,
                        self.logout_manager.perform_logout(granting),
                    )
                    .await
                    {
                        Ok(Ok(requests)) => {
                            trace!("{} logout requests for [{}]", requests.len(), ticket)
                        }
                        Ok(Err(e)) => {
                            warn!("Single logout for [{}] failed: {}", ticket, e);
                            report.logout_failures += 1;
                        }
                        Err(_) => {
                            warn!(
                                "Single logout for [{}] timed out after {:?}",
                                ticket, self.config.logout_timeout
                            );
                            report.logout_failures += 1;
                        }
                    }
                }
                Ticket::Service(_) | Ticket::Proxy(_) => {
                    debug!("Cleaning up expired service ticket [{}]", ticket);
                }
            }

            if self.registry.delete_ticket(ticket.id()) {
                report.count(kind);
            } else {
                trace!("Ticket [{}] was already gone", ticket);
            }
        }

        trace!(
            "ticket removed ServiceTickets: {}, ProxyTickets: {}, TicketGrantingTicket: {}, ProxyGrantingTickets: {} ",
            report.service_tickets,
            report.proxy_tickets,
            report.ticket_granting_tickets,
            report.proxy_granting_tickets
        );
        info!("{} expired tickets found and removed.", report.removed());
        report
    }

    /// Whether [`schedule`](Self::schedule) would start the periodic task
    pub fn should_schedule(&self) -> bool {
        if self.config.start_delay.is_zero() {
            debug!("Cleaner start delay is zero, not scheduling");
            return false;
        }
        if !self.eligibility.is_active() {
            debug!("This instance is not the active ticket registry, not scheduling");
            return false;
        }
        true
    }

    /// Start sweeping on the current tokio runtime
    ///
    /// Returns `Ok(None)` when scheduling is disabled for this instance.
    /// Without a runtime, or with a zero repeat interval, fails with
    /// [`RegistryError::Operational`]; the registry itself keeps serving.
    pub fn schedule(self: Arc<Self>) -> Result<Option<CleanerHandle>> {
        if !self.should_schedule() {
            return Ok(None);
        }

        let result = self.spawn();
        if let Err(e) = &result {
            error!("Failed to schedule ticket cleaner: {}", e);
        }
        result.map(Some)
    }

    fn spawn(self: Arc<Self>) -> Result<CleanerHandle> {
        let repeat_interval = self.config.repeat_interval;
        if repeat_interval.is_zero() {
            return Err(RegistryError::Operational(
                "cleaner repeat interval must be positive".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RegistryError::Operational(format!("no tokio runtime: {}", e)))?;

        info!("Preparing to schedule job to clean up after tickets...");
        let start_delay = self.config.start_delay;
        let cleaner = Arc::clone(&self);
        let task = runtime.spawn(async move {
            tokio::time::sleep(start_delay).await;
            let mut ticker = tokio::time::interval(repeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                cleaner.clean().await;
            }
        });

        info!(
            "TicketRegistryCleaner will clean tickets every {} minutes",
            repeat_interval.as_secs() / 60
        );
        Ok(CleanerHandle { task })
    }
}

/// Running cleaner task
#[derive(Debug)]
pub struct CleanerHandle {
    task: JoinHandle<()>,
}

impl CleanerHandle {
    /// Stop the periodic task; a sweep in progress is abandoned
    pub fn shutdown(&self) {
        self.task.abort();
        info!("Ticket cleaner stopped");
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logout::{LoggingLogoutManager, LogoutRequest, StaticEligibility};
    use crate::registry::DefaultTicketRegistry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ticket::{Authentication, ExpirationPolicy, GrantingTicket, Principal, Service};

    #[derive(Debug, Default)]
    struct RecordingLogoutManager {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl LogoutManager for RecordingLogoutManager {
        async fn perform_logout(&self, ticket: &Arc<GrantingTicket>) -> Result<Vec<LogoutRequest>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RegistryError::Operational(format!("unreachable endpoint for {}", ticket)));
            }
            Ok(Vec::new())
        }
    }

    #[derive(Debug)]
    struct StalledLogoutManager;

    #[async_trait]
    impl LogoutManager for StalledLogoutManager {
        async fn perform_logout(&self, _ticket: &Arc<GrantingTicket>) -> Result<Vec<LogoutRequest>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    fn tgt(id: &str) -> Arc<GrantingTicket> {
        GrantingTicket::new(id, Authentication::new(Principal::new("alice")), ExpirationPolicy::Never)
    }

    fn cleaner(
        registry: Arc<DefaultTicketRegistry>,
        logout_manager: Arc<dyn LogoutManager>,
        config: CleanerConfig,
    ) -> TicketRegistryCleaner {
        TicketRegistryCleaner::new(registry, logout_manager, Arc::new(StaticEligibility(true)), config)
    }

    #[tokio::test]
    async fn test_clean_removes_only_expired() {
        let registry = Arc::new(DefaultTicketRegistry::new());
        let live = tgt("TGT-1-a");
        let dead = tgt("TGT-2-a");
        let dead_st = dead.grant_service_ticket("ST-1-a", Service::new("https://app/"), ExpirationPolicy::Never, false);
        let live_st = live.grant_service_ticket(
            "ST-2-a",
            Service::new("https://app/"),
            ExpirationPolicy::HardTimeout { time_to_kill: Duration::ZERO },
            false,
        );

        registry.add_ticket(Arc::clone(&live).into()).unwrap();
        registry.add_ticket(Arc::clone(&dead).into()).unwrap();
        registry.add_ticket(dead_st.into()).unwrap();
        registry.add_ticket(live_st.into()).unwrap();
        dead.mark_expired();

        let logout = Arc::new(RecordingLogoutManager::default());
        let report = cleaner(Arc::clone(&registry), logout.clone(), CleanerConfig::default())
            .clean()
            .await;

        assert_eq!(report.total_tickets, 4);
        assert_eq!(report.ticket_granting_tickets, 1);
        assert_eq!(logout.calls.load(Ordering::SeqCst), 1);
        // ST-1-a goes with its parent, either through the cascade or on its own
        assert!(registry.get_ticket("ST-1-a").is_none());
        assert!(registry.get_ticket("ST-2-a").is_none());
        assert_eq!(registry.tickets().len(), 1);
        assert!(registry.get_ticket("TGT-1-a").is_some());
        assert_eq!(report.expired_found, 3);
        assert!(report.removed() >= 2);
    }

    #[tokio::test]
    async fn test_logout_failure_does_not_abort_sweep() {
        let registry = Arc::new(DefaultTicketRegistry::new());
        for i in 0..3 {
            let t = tgt(&format!("TGT-{}-b", i));
            registry.add_ticket(Arc::clone(&t).into()).unwrap();
            t.mark_expired();
        }

        let logout = Arc::new(RecordingLogoutManager {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let report = cleaner(Arc::clone(&registry), logout.clone(), CleanerConfig::default())
            .clean()
            .await;

        assert_eq!(report.logout_failures, 3);
        assert_eq!(report.ticket_granting_tickets, 3);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_timeout() {
        let registry = Arc::new(DefaultTicketRegistry::new());
        let t = tgt("TGT-1-c");
        registry.add_ticket(Arc::clone(&t).into()).unwrap();
        t.mark_expired();

        let config = CleanerConfig {
            logout_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let report = cleaner(Arc::clone(&registry), Arc::new(StalledLogoutManager), config)
            .clean()
            .await;

        assert_eq!(report.logout_failures, 1);
        assert_eq!(report.ticket_granting_tickets, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_not_scheduled_when_ineligible_or_no_delay() {
        let registry: Arc<DefaultTicketRegistry> = Arc::new(DefaultTicketRegistry::new());

        let ineligible = Arc::new(TicketRegistryCleaner::new(
            registry.clone(),
            Arc::new(LoggingLogoutManager),
            Arc::new(StaticEligibility(false)),
            CleanerConfig::default(),
        ));
        assert!(ineligible.schedule().unwrap().is_none());

        let no_delay = Arc::new(cleaner(
            registry,
            Arc::new(LoggingLogoutManager),
            CleanerConfig {
                start_delay: Duration::ZERO,
                ..Default::default()
            },
        ));
        assert!(no_delay.schedule().unwrap().is_none());
    }

    #[test]
    fn test_schedule_without_runtime() {
        let cleaner = Arc::new(cleaner(
            Arc::new(DefaultTicketRegistry::new()),
            Arc::new(LoggingLogoutManager),
            CleanerConfig::default(),
        ));
        assert!(matches!(cleaner.schedule(), Err(RegistryError::Operational(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sweeps() {
        let registry = Arc::new(DefaultTicketRegistry::new());
        let config = CleanerConfig {
            start_delay: Duration::from_secs(20),
            repeat_interval: Duration::from_secs(120),
            logout_timeout: Duration::from_secs(1),
        };
        let handle = Arc::new(cleaner(Arc::clone(&registry), Arc::new(LoggingLogoutManager), config))
            .schedule()
            .unwrap()
            .unwrap();

        let t = tgt("TGT-1-d");
        registry.add_ticket(Arc::clone(&t).into()).unwrap();
        t.mark_expired();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(registry.get_ticket("TGT-1-d").is_some());

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(registry.get_ticket("TGT-1-d").is_none());

        handle.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_finished());
    }
}
