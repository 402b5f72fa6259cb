//! Ticket id generation

use crate::ticket::TicketKind;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};

const RANDOM_BYTES: usize = 20;

/// Generates ids of the form `<PREFIX>-<counter>-<random>[-<suffix>]`
///
/// The random part is 20 bytes from the thread RNG, base64url without
/// padding. The optional suffix identifies the issuing node.
#[derive(Debug, Default)]
pub struct UniqueTicketIdGenerator {
    counter: AtomicU64,
    suffix: Option<String>,
}

impl UniqueTicketIdGenerator {
    pub fn new(suffix: Option<String>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            suffix: suffix.filter(|s| !s.is_empty()),
        }
    }

    pub fn new_ticket_id(&self, kind: TicketKind) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut random = [0u8; RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut random);

        let mut id = format!("{}-{}-{}", kind.prefix(), n, URL_SAFE_NO_PAD.encode(random));
        if let Some(suffix) = &self.suffix {
            id.push('-');
            id.push_str(suffix);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_prefix_matches_kind() {
        let generator = UniqueTicketIdGenerator::default();
        for kind in [
            TicketKind::TicketGranting,
            TicketKind::ProxyGranting,
            TicketKind::Service,
            TicketKind::Proxy,
        ] {
            let id = generator.new_ticket_id(kind);
            assert_eq!(TicketKind::from_id(&id), Some(kind), "{}", id);
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let generator = UniqueTicketIdGenerator::new(None);
        let ids: HashSet<_> = (0..1000)
            .map(|_| generator.new_ticket_id(TicketKind::Service))
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_suffix() {
        let generator = UniqueTicketIdGenerator::new(Some("node1".to_string()));
        let id = generator.new_ticket_id(TicketKind::TicketGranting);
        assert!(id.starts_with("TGT-1-"));
        assert!(id.ends_with("-node1"));

        let bare = UniqueTicketIdGenerator::new(Some(String::new()));
        // 20 random bytes encode to 27 unpadded characters
        assert_eq!(bare.new_ticket_id(TicketKind::Service).len(), "ST-1-".len() + 27);
    }
}
