//! The ticket registry contract and its concurrent in-memory implementation

use crate::error::{RegistryError, Result};
use crate::options::RegistryOptions;
use dashmap::DashMap;
use std::fmt::Debug;
use ticket::{GrantingTicket, Ticket, TicketKind};
use tracing::{debug, trace};

/// Store of every live ticket
///
/// Implementations must allow concurrent calls from any thread without
/// external locking. Per-id operations are linearizable: once
/// `delete_ticket` returns true, `get_ticket` no longer sees the ticket.
pub trait TicketRegistry: Send + Sync + Debug {
    /// Insert or overwrite a ticket by id
    fn add_ticket(&self, ticket: Ticket) -> Result<()>;

    fn get_ticket(&self, ticket_id: &str) -> Option<Ticket>;

    /// Remove a ticket, cascading to every descendant of a granting ticket
    ///
    /// Returns whether `ticket_id` itself was removed by this call.
    fn delete_ticket(&self, ticket_id: &str) -> bool;

    /// Point-in-time snapshot of all tickets
    fn tickets(&self) -> Vec<Ticket>;

    /// Number of granting tickets (TGT and PGT)
    fn session_count(&self) -> usize {
        self.tickets()
            .iter()
            .filter(|t| t.kind().is_granting())
            .count()
    }

    /// Number of service and proxy tickets
    fn service_ticket_count(&self) -> usize {
        self.tickets()
            .iter()
            .filter(|t| !t.kind().is_granting())
            .count()
    }
}

/// Lock-striped in-memory registry
#[derive(Debug)]
pub struct DefaultTicketRegistry {
    cache: DashMap<String, Ticket>,
}

impl DefaultTicketRegistry {
    pub fn new() -> Self {
        Self::with_options(&RegistryOptions::default())
    }

    pub fn with_options(options: &RegistryOptions) -> Self {
        debug!(
            "Creating ticket registry (capacity: {}, shards: {})",
            options.capacity(),
            options.shard_amount()
        );
        Self {
            cache: DashMap::with_capacity_and_shard_amount(
                options.capacity(),
                options.shard_amount(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Remove every descendant recorded under `ticket`, depth first
    ///
    /// Missing children are expected (already used or reaped) and only
    /// traced. A removed child that is itself a granting ticket has its own
    /// descendants removed as well.
    fn delete_children(&self, ticket: &GrantingTicket) {
        let mut pending: Vec<String> = ticket.services().into_keys().collect();
        while let Some(child_id) = pending.pop() {
            match self.cache.remove(&child_id) {
                Some((_, child)) => {
                    trace!("Removed service ticket [{}]", child_id);
                    if let Some(granting) = child.as_granting() {
                        pending.extend(granting.services().into_keys());
                    }
                }
                None => trace!("Unable to remove service ticket [{}]", child_id),
            }
        }
    }
}

impl Default for DefaultTicketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketRegistry for DefaultTicketRegistry {
    fn add_ticket(&self, ticket: Ticket) -> Result<()> {
        let id = ticket.id();
        if id.is_empty() {
            return Err(RegistryError::InvalidArgument(
                "ticket id cannot be empty".to_string(),
            ));
        }
        if TicketKind::from_id(id) != Some(ticket.kind()) {
            return Err(RegistryError::InvalidArgument(format!(
                "ticket id {} does not carry the {} prefix",
                id,
                ticket.kind()
            )));
        }

        debug!("Added ticket [{}] to registry.", id);
        self.cache.insert(id.to_string(), ticket);
        Ok(())
    }

    fn get_ticket(&self, ticket_id: &str) -> Option<Ticket> {
        if ticket_id.is_empty() {
            return None;
        }
        debug!("Attempting to retrieve ticket [{}]", ticket_id);
        let ticket = self.cache.get(ticket_id).map(|entry| entry.value().clone());
        if ticket.is_some() {
            debug!("Ticket [{}] found in registry.", ticket_id);
        }
        ticket
    }

    fn delete_ticket(&self, ticket_id: &str) -> bool {
        if ticket_id.is_empty() {
            return false;
        }
        // parent first: a child stored after this point sees no parent
        let Some((_, ticket)) = self.cache.remove(ticket_id) else {
            return false;
        };
        debug!("Removed ticket [{}] from the registry.", ticket);

        if let Some(granting) = ticket.as_granting() {
            debug!("Removing children of ticket [{}] from the registry.", ticket);
            self.delete_children(granting);
        }
        true
    }

    fn tickets(&self) -> Vec<Ticket> {
        self.cache
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn session_count(&self) -> usize {
        self.cache
            .iter()
            .filter(|entry| entry.value().kind().is_granting())
            .count()
    }

    fn service_ticket_count(&self) -> usize {
        self.cache
            .iter()
            .filter(|entry| !entry.value().kind().is_granting())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ticket::{Authentication, ExpirationPolicy, Principal, Service};

    fn tgt(id: &str) -> Arc<GrantingTicket> {
        GrantingTicket::new(id, Authentication::new(Principal::new("alice")), ExpirationPolicy::Never)
    }

    #[test]
    fn test_add_get_delete() {
        let registry = DefaultTicketRegistry::new();
        registry.add_ticket(tgt("TGT-1-a").into()).unwrap();

        assert_eq!(registry.get_ticket("TGT-1-a").unwrap().id(), "TGT-1-a");
        assert!(registry.delete_ticket("TGT-1-a"));
        assert!(registry.get_ticket("TGT-1-a").is_none());
    }

    #[test]
    fn test_delete_twice() {
        let registry = DefaultTicketRegistry::new();
        registry.add_ticket(tgt("TGT-1-b").into()).unwrap();

        assert!(registry.delete_ticket("TGT-1-b"));
        assert!(!registry.delete_ticket("TGT-1-b"));
    }

    #[test]
    fn test_empty_id_is_absent() {
        let registry = DefaultTicketRegistry::new();
        assert!(registry.get_ticket("").is_none());
        assert!(!registry.delete_ticket(""));
        assert!(!registry.delete_ticket("TGT-unknown"));
    }

    #[test]
    fn test_add_rejects_mismatched_prefix() {
        let registry = DefaultTicketRegistry::new();
        assert!(matches!(
            registry.add_ticket(tgt("ST-1-c").into()),
            Err(RegistryError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.add_ticket(tgt("").into()),
            Err(RegistryError::InvalidArgument(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_overwrites() {
        let registry = DefaultTicketRegistry::new();
        let first = tgt("TGT-1-d");
        let second = tgt("TGT-1-d");
        registry.add_ticket(first.into()).unwrap();
        registry.add_ticket(Arc::clone(&second).into()).unwrap();

        assert_eq!(registry.len(), 1);
        let stored = registry.get_ticket("TGT-1-d").unwrap();
        assert!(Arc::ptr_eq(stored.as_granting().unwrap(), &second));
    }

    #[test]
    fn test_cascade_delete() {
        let registry = DefaultTicketRegistry::new();
        let parent = tgt("TGT-1-e");
        registry.add_ticket(Arc::clone(&parent).into()).unwrap();

        for i in 0..3 {
            let st = parent.grant_service_ticket(
                format!("ST-{}-e", i),
                Service::new("https://app/"),
                ExpirationPolicy::Never,
                false,
            );
            registry.add_ticket(st.into()).unwrap();
        }
        // a child that was already consumed
        parent.grant_service_ticket("ST-9-e", Service::new("https://app/"), ExpirationPolicy::Never, false);

        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.service_ticket_count(), 3);

        assert!(registry.delete_ticket("ST-0-e"));
        assert!(registry.get_ticket("TGT-1-e").is_some());

        assert!(registry.delete_ticket("TGT-1-e"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cascade_reaches_proxy_descendants() {
        let registry = DefaultTicketRegistry::new();
        let root = tgt("TGT-1-f");
        let st = root.grant_service_ticket("ST-1-f", Service::new("https://proxy/"), ExpirationPolicy::Never, false);
        let pgt = st
            .grant_proxy_granting_ticket(
                "PGT-1-f",
                Authentication::new(Principal::new("https://proxy/cb")),
                ExpirationPolicy::Never,
            )
            .unwrap();
        let pt = pgt.grant_service_ticket("PT-1-f", Service::new("https://backend/"), ExpirationPolicy::Never, false);

        registry.add_ticket(Arc::clone(&root).into()).unwrap();
        registry.add_ticket(st.into()).unwrap();
        registry.add_ticket(pgt.into()).unwrap();
        registry.add_ticket(pt.into()).unwrap();
        assert_eq!(registry.session_count(), 2);
        assert_eq!(registry.service_ticket_count(), 2);

        assert!(registry.delete_ticket("TGT-1-f"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = DefaultTicketRegistry::new();
        registry.add_ticket(tgt("TGT-1-g").into()).unwrap();
        let snapshot = registry.tickets();

        registry.delete_ticket("TGT-1-g");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), "TGT-1-g");
    }
}
