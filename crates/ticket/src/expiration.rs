//! Expiration policies
//!
//! A policy is a pure function of a ticket's usage state and the current
//! time. Nothing here caches an expired flag; callers re-evaluate on every
//! check.

use std::time::{Duration, SystemTime};

/// Usage bookkeeping shared by every ticket kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketState {
    pub created: SystemTime,
    pub last_used: SystemTime,
    pub previous_last_used: SystemTime,
    pub count_of_uses: u32,
}

impl TicketState {
    pub fn new(created: SystemTime) -> Self {
        Self {
            created,
            last_used: created,
            previous_last_used: created,
            count_of_uses: 0,
        }
    }

    /// Record one use at `now`
    pub fn update(&mut self, now: SystemTime) {
        self.previous_last_used = self.last_used;
        self.last_used = now;
        self.count_of_uses = self.count_of_uses.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationPolicy {
    /// Never expires on its own
    Never,
    /// Fixed lifetime measured from creation
    HardTimeout { time_to_kill: Duration },
    /// Sliding lifetime measured from the last use
    Timeout { time_to_kill: Duration },
    /// Expires after `number_of_uses` uses or `time_to_kill` idle
    MultiTimeUseOrTimeout {
        number_of_uses: u32,
        time_to_kill: Duration,
    },
    /// Absolute ceiling plus an idle timeout
    TicketGrantingTicket {
        max_time_to_live: Duration,
        time_to_kill: Duration,
    },
}

impl ExpirationPolicy {
    pub fn is_expired(&self, state: &TicketState, now: SystemTime) -> bool {
        match *self {
            ExpirationPolicy::Never => false,
            ExpirationPolicy::HardTimeout { time_to_kill } => elapsed(state.created, now) >= time_to_kill,
            ExpirationPolicy::Timeout { time_to_kill } => elapsed(state.last_used, now) >= time_to_kill,
            ExpirationPolicy::MultiTimeUseOrTimeout {
                number_of_uses,
                time_to_kill,
            } => {
                state.count_of_uses >= number_of_uses
                    || elapsed(state.last_used, now) >= time_to_kill
            }
            ExpirationPolicy::TicketGrantingTicket {
                max_time_to_live,
                time_to_kill,
            } => {
                elapsed(state.created, now) >= max_time_to_live
                    || elapsed(state.last_used, now) >= time_to_kill
            }
        }
    }
}

/// Time since `since`; a clock that moved backwards counts as no time
fn elapsed(since: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or(Duration::ZERO)
}
