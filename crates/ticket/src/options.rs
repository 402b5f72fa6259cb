//! Ticket lifetime settings from the `[ticket]` section

use crate::expiration::ExpirationPolicy;
use ssoconfig::{define_options, Count, Duration};
use std::time::Duration as StdDuration;

define_options! {
    /// Lifetimes and use limits for issued tickets
    pub struct ExpirationOptions {
        /// Absolute lifetime of a ticket-granting ticket
        tgt_max_time_to_live: Duration = Duration(StdDuration::from_secs(8 * 3600)),
        /// Idle timeout of a ticket-granting ticket
        tgt_time_to_kill: Duration = Duration(StdDuration::from_secs(2 * 3600)),
        st_time_to_kill: Duration = Duration(StdDuration::from_secs(10)),
        st_number_of_uses: Count = Count(1),
        pt_time_to_kill: Duration = Duration(StdDuration::from_secs(10)),
        pt_number_of_uses: Count = Count(1),
        /// Appended to every generated ticket id
        ticket_id_suffix: String = String::new(),
    }
}

impl ExpirationOptions {
    pub fn ticket_granting_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::TicketGrantingTicket {
            max_time_to_live: self.tgt_max_time_to_live.0,
            time_to_kill: self.tgt_time_to_kill.0,
        }
    }

    pub fn service_ticket_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::MultiTimeUseOrTimeout {
            number_of_uses: clamp_uses(self.st_number_of_uses),
            time_to_kill: self.st_time_to_kill.0,
        }
    }

    pub fn proxy_ticket_policy(&self) -> ExpirationPolicy {
        ExpirationPolicy::MultiTimeUseOrTimeout {
            number_of_uses: clamp_uses(self.pt_number_of_uses),
            time_to_kill: self.pt_time_to_kill.0,
        }
    }

    pub fn ticket_id_suffix(&self) -> Option<String> {
        Some(self.ticket_id_suffix.trim().to_string()).filter(|s| !s.is_empty())
    }
}

fn clamp_uses(count: Count) -> u32 {
    u32::try_from(count.0).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssoconfig::SsoConfig;

    #[test]
    fn test_defaults() {
        let opts = ExpirationOptions::default();
        assert_eq!(
            opts.ticket_granting_policy(),
            ExpirationPolicy::TicketGrantingTicket {
                max_time_to_live: StdDuration::from_secs(28800),
                time_to_kill: StdDuration::from_secs(7200),
            }
        );
        assert_eq!(
            opts.service_ticket_policy(),
            ExpirationPolicy::MultiTimeUseOrTimeout {
                number_of_uses: 1,
                time_to_kill: StdDuration::from_secs(10),
            }
        );
        assert_eq!(opts.ticket_id_suffix(), None);
    }

    #[test]
    fn test_from_config() {
        let config = SsoConfig::parse(
            "[ticket]\ntgt_time_to_kill = 30m\npt_number_of_uses = 3\nticket_id_suffix = node-a\n",
        )
        .unwrap();
        let opts = ExpirationOptions::from_config(&config, &["ticket", "global"]);

        assert_eq!(opts.tgt_time_to_kill.0, StdDuration::from_secs(1800));
        assert!(matches!(
            opts.proxy_ticket_policy(),
            ExpirationPolicy::MultiTimeUseOrTimeout { number_of_uses: 3, .. }
        ));
        assert_eq!(opts.ticket_id_suffix().as_deref(), Some("node-a"));
    }
}
