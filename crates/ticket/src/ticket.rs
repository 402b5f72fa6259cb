//! Ticket variants and their parent/child relations
//!
//! Granting tickets (TGT, PGT) hold the authentication and a child index of
//! issued ticket id -> service. Service and proxy tickets point back at the
//! granting ticket that issued them. Every back-reference is a [`Weak`]: the
//! registry is the only long-lived owner, and a ticket whose parent is no
//! longer alive counts as expired.

use crate::authentication::Authentication;
use crate::error::{Result, TicketError};
use crate::expiration::{ExpirationPolicy, TicketState};
use crate::service::Service;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;

/// Longest parent chain followed from a granting ticket towards its root
pub const MAX_PROXY_CHAIN_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TicketKind {
    TicketGranting,
    ProxyGranting,
    Service,
    Proxy,
}

impl TicketKind {
    /// Id prefix emitted for this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            TicketKind::TicketGranting => "TGT",
            TicketKind::ProxyGranting => "PGT",
            TicketKind::Service => "ST",
            TicketKind::Proxy => "PT",
        }
    }

    /// Kind encoded in a ticket id, `None` for an unknown or missing prefix
    pub fn from_id(id: &str) -> Option<Self> {
        let (prefix, rest) = id.split_once('-')?;
        if rest.is_empty() {
            return None;
        }
        match prefix {
            "TGT" => Some(TicketKind::TicketGranting),
            "PGT" => Some(TicketKind::ProxyGranting),
            "ST" => Some(TicketKind::Service),
            "PT" => Some(TicketKind::Proxy),
            _ => None,
        }
    }

    pub fn is_granting(&self) -> bool {
        matches!(self, TicketKind::TicketGranting | TicketKind::ProxyGranting)
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct GrantingState {
    usage: TicketState,
    expired: bool,
    services: HashMap<String, Service>,
}

/// Ticket-granting or proxy-granting ticket
#[derive(Debug)]
pub struct GrantingTicket {
    id: String,
    kind: TicketKind,
    authentication: Arc<Authentication>,
    parent: Option<Weak<GrantingTicket>>,
    proxied_by: Option<Service>,
    policy: ExpirationPolicy,
    state: Mutex<GrantingState>,
}

impl GrantingTicket {
    /// A root ticket-granting ticket issued at primary login
    pub fn new(
        id: impl Into<String>,
        authentication: Authentication,
        policy: ExpirationPolicy,
    ) -> Arc<Self> {
        Arc::new(Self::build(
            id.into(),
            TicketKind::TicketGranting,
            Arc::new(authentication),
            None,
            None,
            policy,
        ))
    }

    fn build(
        id: String,
        kind: TicketKind,
        authentication: Arc<Authentication>,
        parent: Option<Weak<GrantingTicket>>,
        proxied_by: Option<Service>,
        policy: ExpirationPolicy,
    ) -> Self {
        Self {
            id,
            kind,
            authentication,
            parent,
            proxied_by,
            policy,
            state: Mutex::new(GrantingState {
                usage: TicketState::new(SystemTime::now()),
                expired: false,
                services: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TicketKind {
        self.kind
    }

    pub fn authentication(&self) -> &Arc<Authentication> {
        &self.authentication
    }

    /// Service that obtained this ticket by proxying, for PGTs
    pub fn proxied_by(&self) -> Option<&Service> {
        self.proxied_by.as_ref()
    }

    pub fn expiration_policy(&self) -> ExpirationPolicy {
        self.policy
    }

    /// The granting ticket this one was delegated from, if it is still alive
    pub fn parent(&self) -> Option<Arc<GrantingTicket>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn state(&self) -> TicketState {
        lock(&self.state).usage
    }

    pub fn update_state(&self) {
        lock(&self.state).usage.update(SystemTime::now());
    }

    /// Force expiration regardless of policy (logout, destroy)
    pub fn mark_expired(&self) {
        lock(&self.state).expired = true;
    }

    /// Snapshot of issued child ticket ids and their services
    pub fn services(&self) -> HashMap<String, Service> {
        lock(&self.state).services.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    /// Expired by flag or policy, or any ancestor is expired or gone
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        if self.expired_locally(now) {
            return true;
        }

        let mut next = self.parent.clone();
        for _ in 0..MAX_PROXY_CHAIN_DEPTH {
            let Some(weak) = next else {
                return false;
            };
            let Some(parent) = weak.upgrade() else {
                return true;
            };
            if parent.expired_locally(now) {
                return true;
            }
            next = parent.parent.clone();
        }
        next.is_some()
    }

    fn expired_locally(&self, now: SystemTime) -> bool {
        let state = lock(&self.state);
        state.expired || self.policy.is_expired(&state.usage, now)
    }

    /// Granting tickets from the root TGT down to `self`
    ///
    /// `None` when an ancestor is gone or the chain is longer than
    /// [`MAX_PROXY_CHAIN_DEPTH`].
    pub fn chain(self: &Arc<Self>) -> Option<Vec<Arc<GrantingTicket>>> {
        let mut chain = vec![Arc::clone(self)];
        loop {
            let current = chain.last()?;
            let Some(weak) = current.parent.clone() else {
                break;
            };
            if chain.len() > MAX_PROXY_CHAIN_DEPTH {
                return None;
            }
            chain.push(weak.upgrade()?);
        }
        chain.reverse();
        Some(chain)
    }

    /// The root ticket-granting ticket
    pub fn root(self: &Arc<Self>) -> Option<Arc<GrantingTicket>> {
        self.chain().and_then(|chain| chain.into_iter().next())
    }

    /// Kind of ticket this granting ticket issues for a service
    pub fn issued_kind(&self) -> TicketKind {
        match self.kind {
            TicketKind::ProxyGranting => TicketKind::Proxy,
            _ => TicketKind::Service,
        }
    }

    /// Issue a service ticket (or a proxy ticket, from a PGT)
    ///
    /// The new id is recorded in the child index before the ticket is
    /// returned, so a cascade delete of `self` always reaches it.
    pub fn grant_service_ticket(
        self: &Arc<Self>,
        id: impl Into<String>,
        service: Service,
        policy: ExpirationPolicy,
        credentials_provided: bool,
    ) -> Arc<ServiceTicket> {
        let id = id.into();
        let from_new_login = {
            let mut state = lock(&self.state);
            let first_use = state.usage.count_of_uses == 0;
            state.usage.update(SystemTime::now());
            state.services.insert(id.clone(), service.clone());
            credentials_provided || first_use
        };

        Arc::new(ServiceTicket {
            id,
            kind: self.issued_kind(),
            granting_ticket: Arc::downgrade(self),
            service,
            from_new_login,
            policy,
            state: Mutex::new(ServiceState {
                usage: TicketState::new(SystemTime::now()),
                granted_proxy_granting_ticket: false,
            }),
        })
    }

    fn record_child(&self, id: &str, service: Service) {
        lock(&self.state).services.insert(id.to_string(), service);
    }
}

impl fmt::Display for GrantingTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug)]
struct ServiceState {
    usage: TicketState,
    granted_proxy_granting_ticket: bool,
}

/// Service ticket or proxy ticket
#[derive(Debug)]
pub struct ServiceTicket {
    id: String,
    kind: TicketKind,
    granting_ticket: Weak<GrantingTicket>,
    service: Service,
    from_new_login: bool,
    policy: ExpirationPolicy,
    state: Mutex<ServiceState>,
}

impl ServiceTicket {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TicketKind {
        self.kind
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Whether the ticket was issued right after credentials were presented
    pub fn is_from_new_login(&self) -> bool {
        self.from_new_login
    }

    pub fn granting_ticket(&self) -> Option<Arc<GrantingTicket>> {
        self.granting_ticket.upgrade()
    }

    pub fn state(&self) -> TicketState {
        lock(&self.state).usage
    }

    pub fn update_state(&self) {
        lock(&self.state).usage.update(SystemTime::now());
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        let own = {
            let state = lock(&self.state);
            self.policy.is_expired(&state.usage, now)
        };
        own || match self.granting_ticket.upgrade() {
            Some(parent) => parent.is_expired_at(now),
            None => true,
        }
    }

    /// Redeem the ticket for `service`
    ///
    /// The expiry check and the recorded use happen under one lock, so a
    /// single-use ticket is redeemed at most once however many callers race.
    /// Returns whether the presented service matches the stored one; a
    /// mismatch still counts as a use.
    pub fn consume_for(&self, service: &Service) -> Result<bool> {
        let now = SystemTime::now();
        let mut state = lock(&self.state);
        let parent_expired = match self.granting_ticket.upgrade() {
            Some(parent) => parent.is_expired_at(now),
            None => true,
        };
        if parent_expired || self.policy.is_expired(&state.usage, now) {
            return Err(TicketError::Expired(self.id.clone()));
        }
        state.usage.update(now);
        Ok(self.service.matches(service))
    }

    /// Delegate a proxy-granting ticket to this ticket's service
    ///
    /// The PGT hangs off this ticket's granting ticket and is recorded in
    /// its child index. A service ticket delegates at most once.
    pub fn grant_proxy_granting_ticket(
        &self,
        id: impl Into<String>,
        authentication: Authentication,
        policy: ExpirationPolicy,
    ) -> Result<Arc<GrantingTicket>> {
        let id = id.into();
        let mut state = lock(&self.state);
        if state.granted_proxy_granting_ticket {
            return Err(TicketError::InvalidArgument(format!(
                "service ticket {} already granted a proxy-granting ticket",
                self.id
            )));
        }
        let parent = self.granting_ticket.upgrade().ok_or_else(|| {
            TicketError::InvalidArgument(format!(
                "granting ticket of {} no longer exists",
                self.id
            ))
        })?;

        let pgt = Arc::new(GrantingTicket::build(
            id,
            TicketKind::ProxyGranting,
            Arc::new(authentication),
            Some(Arc::downgrade(&parent)),
            Some(self.service.clone()),
            policy,
        ));
        parent.record_child(pgt.id(), self.service.clone());
        state.granted_proxy_granting_ticket = true;
        Ok(pgt)
    }
}

impl fmt::Display for ServiceTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Any ticket held by the registry
#[derive(Debug, Clone)]
pub enum Ticket {
    TicketGranting(Arc<GrantingTicket>),
    ProxyGranting(Arc<GrantingTicket>),
    Service(Arc<ServiceTicket>),
    Proxy(Arc<ServiceTicket>),
}

impl Ticket {
    pub fn id(&self) -> &str {
        match self {
            Ticket::TicketGranting(t) | Ticket::ProxyGranting(t) => t.id(),
            Ticket::Service(t) | Ticket::Proxy(t) => t.id(),
        }
    }

    pub fn kind(&self) -> TicketKind {
        match self {
            Ticket::TicketGranting(_) => TicketKind::TicketGranting,
            Ticket::ProxyGranting(_) => TicketKind::ProxyGranting,
            Ticket::Service(_) => TicketKind::Service,
            Ticket::Proxy(_) => TicketKind::Proxy,
        }
    }

    pub fn state(&self) -> TicketState {
        match self {
            Ticket::TicketGranting(t) | Ticket::ProxyGranting(t) => t.state(),
            Ticket::Service(t) | Ticket::Proxy(t) => t.state(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self {
            Ticket::TicketGranting(t) | Ticket::ProxyGranting(t) => t.is_expired_at(now),
            Ticket::Service(t) | Ticket::Proxy(t) => t.is_expired_at(now),
        }
    }

    pub fn as_granting(&self) -> Option<&Arc<GrantingTicket>> {
        match self {
            Ticket::TicketGranting(t) | Ticket::ProxyGranting(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Arc<ServiceTicket>> {
        match self {
            Ticket::Service(t) | Ticket::Proxy(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Arc<GrantingTicket>> for Ticket {
    fn from(ticket: Arc<GrantingTicket>) -> Self {
        match ticket.kind() {
            TicketKind::ProxyGranting => Ticket::ProxyGranting(ticket),
            _ => Ticket::TicketGranting(ticket),
        }
    }
}

impl From<Arc<ServiceTicket>> for Ticket {
    fn from(ticket: Arc<ServiceTicket>) -> Self {
        match ticket.kind() {
            TicketKind::Proxy => Ticket::Proxy(ticket),
            _ => Ticket::Service(ticket),
        }
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::Principal;
    use std::time::Duration;

    fn tgt(id: &str) -> Arc<GrantingTicket> {
        GrantingTicket::new(id, Authentication::new(Principal::new("alice")), ExpirationPolicy::Never)
    }

    fn st_policy() -> ExpirationPolicy {
        ExpirationPolicy::MultiTimeUseOrTimeout {
            number_of_uses: 1,
            time_to_kill: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_kind_from_id() {
        assert_eq!(TicketKind::from_id("TGT-1-abc"), Some(TicketKind::TicketGranting));
        assert_eq!(TicketKind::from_id("PGT-1-abc"), Some(TicketKind::ProxyGranting));
        assert_eq!(TicketKind::from_id("ST-1-abc"), Some(TicketKind::Service));
        assert_eq!(TicketKind::from_id("PT-1-abc"), Some(TicketKind::Proxy));
        assert_eq!(TicketKind::from_id("XYZ-1"), None);
        assert_eq!(TicketKind::from_id("TGT-"), None);
        assert_eq!(TicketKind::from_id("TGT"), None);
    }

    #[test]
    fn test_grant_service_ticket_records_child() {
        let tgt = tgt("TGT-1-a");
        let st = tgt.grant_service_ticket("ST-1-a", Service::new("https://app/"), st_policy(), false);

        assert_eq!(st.kind(), TicketKind::Service);
        assert!(st.is_from_new_login());
        assert_eq!(tgt.services().get("ST-1-a"), Some(&Service::new("https://app/")));
        assert_eq!(tgt.state().count_of_uses, 1);

        let second = tgt.grant_service_ticket("ST-2-a", Service::new("https://app/"), st_policy(), false);
        assert!(!second.is_from_new_login());
        let renewed = tgt.grant_service_ticket("ST-3-a", Service::new("https://app/"), st_policy(), true);
        assert!(renewed.is_from_new_login());
    }

    #[test]
    fn test_service_ticket_expires_with_parent() {
        let tgt = tgt("TGT-1-b");
        let st = tgt.grant_service_ticket("ST-1-b", Service::new("https://app/"), ExpirationPolicy::Never, false);
        assert!(!st.is_expired());

        tgt.mark_expired();
        assert!(st.is_expired());
    }

    #[test]
    fn test_service_ticket_expires_when_parent_dropped() {
        let tgt = tgt("TGT-1-c");
        let st = tgt.grant_service_ticket("ST-1-c", Service::new("https://app/"), ExpirationPolicy::Never, false);
        drop(tgt);

        assert!(st.granting_ticket().is_none());
        assert!(st.is_expired());
    }

    #[test]
    fn test_single_use_service_ticket() {
        let tgt = tgt("TGT-1-d");
        let st = tgt.grant_service_ticket("ST-1-d", Service::new("https://app/"), st_policy(), false);

        assert_eq!(st.consume_for(&Service::new("https://APP/")), Ok(true));
        assert!(st.is_expired());
        assert_eq!(
            st.consume_for(&Service::new("https://app/")),
            Err(TicketError::Expired("ST-1-d".to_string()))
        );
    }

    #[test]
    fn test_consume_for_other_service_counts_as_use() {
        let tgt = tgt("TGT-1-h");
        let st = tgt.grant_service_ticket("ST-1-h", Service::new("https://app/"), st_policy(), false);

        assert_eq!(st.consume_for(&Service::new("https://other/")), Ok(false));
        assert_eq!(st.state().count_of_uses, 1);
        assert!(st.is_expired());
    }

    #[test]
    fn test_single_use_ticket_redeemed_once_across_threads() {
        let tgt = tgt("TGT-1-i");
        for round in 0..200 {
            let st = tgt.grant_service_ticket(
                format!("ST-{}-i", round),
                Service::new("https://app/"),
                st_policy(),
                false,
            );
            let barrier = std::sync::Barrier::new(4);
            let (barrier, st) = (&barrier, &st);
            let redeemed = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| {
                        scope.spawn(move || {
                            barrier.wait();
                            st.consume_for(&Service::new("https://app/")) == Ok(true)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(false))
                    .filter(|redeemed| *redeemed)
                    .count()
            });
            assert_eq!(redeemed, 1, "round {}", round);
        }
    }

    #[test]
    fn test_proxy_granting_ticket_chain() {
        let root = tgt("TGT-1-e");
        let st = root.grant_service_ticket("ST-1-e", Service::new("https://proxy/"), st_policy(), false);
        let pgt = st
            .grant_proxy_granting_ticket(
                "PGT-1-e",
                Authentication::new(Principal::new("https://proxy/cb")),
                ExpirationPolicy::Never,
            )
            .unwrap();

        assert_eq!(pgt.kind(), TicketKind::ProxyGranting);
        assert_eq!(pgt.proxied_by(), Some(&Service::new("https://proxy/")));
        assert!(root.services().contains_key("PGT-1-e"));
        assert_eq!(pgt.root().unwrap().id(), "TGT-1-e");

        let pt = pgt.grant_service_ticket("PT-1-e", Service::new("https://backend/"), st_policy(), false);
        assert_eq!(pt.kind(), TicketKind::Proxy);
        assert!(matches!(Ticket::from(pt), Ticket::Proxy(_)));

        let again = st.grant_proxy_granting_ticket(
            "PGT-2-e",
            Authentication::new(Principal::new("https://proxy/cb")),
            ExpirationPolicy::Never,
        );
        assert!(matches!(again, Err(TicketError::InvalidArgument(_))));
    }

    #[test]
    fn test_parent_walk_is_bounded() {
        let root = tgt("TGT-1-f");
        let mut current = Arc::clone(&root);
        let mut keep_alive = vec![Arc::clone(&root)];

        for depth in 0..=MAX_PROXY_CHAIN_DEPTH {
            let st = current.grant_service_ticket(
                format!("ST-{}-f", depth),
                Service::new("https://proxy/"),
                ExpirationPolicy::Never,
                false,
            );
            let pgt = st
                .grant_proxy_granting_ticket(
                    format!("PGT-{}-f", depth),
                    Authentication::new(Principal::new("https://proxy/cb")),
                    ExpirationPolicy::Never,
                )
                .unwrap();

            let within_bound = depth + 1 <= MAX_PROXY_CHAIN_DEPTH;
            assert_eq!(pgt.root().is_some(), within_bound, "depth {}", depth + 1);
            assert_eq!(pgt.is_expired(), !within_bound, "depth {}", depth + 1);

            keep_alive.push(Arc::clone(&pgt));
            current = pgt;
        }
    }

    #[test]
    fn test_ticket_enum_dispatch() {
        let granting = Ticket::from(tgt("TGT-1-g"));
        assert_eq!(granting.kind(), TicketKind::TicketGranting);
        assert_eq!(granting.id(), "TGT-1-g");
        assert!(granting.as_granting().is_some());
        assert!(granting.as_service().is_none());
        assert!(!granting.is_expired());
    }
}
