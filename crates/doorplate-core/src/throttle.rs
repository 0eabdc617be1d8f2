//! # Guest Message Throttle Rules
//!
//! Threshold evaluation for the public guest message page. Counting the log
//! entries inside the trailing window is the caller's job; this module only
//! decides.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   now - window ◄──────────── trailing window ────────────► now          │
//! │                                                                         │
//! │   count(source_ip)           >= max_per_ip         → reject (Ip)        │
//! │   count(device_id)           >= max_per_device     → reject (Device)    │
//! │   count(ip + "_" + device)   >= max_per_ip_device  → reject (IpDevice)  │
//! │                                                                         │
//! │   all three below their limit → allow                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Per-window limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestLimits {
    pub max_per_ip: u32,
    pub max_per_device: u32,
    pub max_per_ip_device: u32,
}

impl Default for GuestLimits {
    fn default() -> Self {
        GuestLimits {
            max_per_ip: 3,
            max_per_device: 5,
            max_per_ip_device: 5,
        }
    }
}

/// Log entries found inside the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestCounts {
    pub by_ip: u32,
    pub by_device: u32,
    pub by_ip_device: u32,
}

/// Which limit tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleScope {
    Ip,
    Device,
    IpDevice,
}

impl std::fmt::Display for ThrottleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ThrottleScope::Ip => "source ip",
            ThrottleScope::Device => "device",
            ThrottleScope::IpDevice => "source ip and device",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleVerdict {
    Allowed,
    Rejected {
        scope: ThrottleScope,
        count: u32,
        limit: u32,
    },
}

impl ThrottleVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleVerdict::Allowed)
    }
}

impl GuestLimits {
    /// Checks the counts in IP, device, composite order.
    pub fn evaluate(&self, counts: &GuestCounts) -> ThrottleVerdict {
        let checks = [
            (ThrottleScope::Ip, counts.by_ip, self.max_per_ip),
            (ThrottleScope::Device, counts.by_device, self.max_per_device),
            (ThrottleScope::IpDevice, counts.by_ip_device, self.max_per_ip_device),
        ];

        checks
            .into_iter()
            .find(|(_, count, limit)| count >= limit)
            .map_or(ThrottleVerdict::Allowed, |(scope, count, limit)| {
                ThrottleVerdict::Rejected { scope, count, limit }
            })
    }
}

/// Start of the trailing window ending at `now`. Entries strictly after it count.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now - window
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let limits = GuestLimits::default();
        assert_eq!(limits.max_per_ip, 3);
        assert_eq!(limits.max_per_device, 5);
        assert_eq!(limits.max_per_ip_device, 5);
    }

    #[test]
    fn test_limit_is_inclusive() {
        let limits = GuestLimits::default();
        let under = GuestCounts {
            by_ip: 2,
            by_device: 4,
            by_ip_device: 2,
        };
        assert!(limits.evaluate(&under).is_allowed());

        let at_ip_limit = GuestCounts { by_ip: 3, ..under };
        assert_eq!(
            limits.evaluate(&at_ip_limit),
            ThrottleVerdict::Rejected {
                scope: ThrottleScope::Ip,
                count: 3,
                limit: 3
            }
        );
    }

    #[test]
    fn test_each_scope_rejects_independently() {
        let limits = GuestLimits {
            max_per_ip: 10,
            max_per_device: 5,
            max_per_ip_device: 2,
        };

        let device_full = GuestCounts {
            by_ip: 0,
            by_device: 5,
            by_ip_device: 0,
        };
        assert!(matches!(
            limits.evaluate(&device_full),
            ThrottleVerdict::Rejected {
                scope: ThrottleScope::Device,
                ..
            }
        ));

        let pair_full = GuestCounts {
            by_ip: 2,
            by_device: 2,
            by_ip_device: 2,
        };
        assert!(matches!(
            limits.evaluate(&pair_full),
            ThrottleVerdict::Rejected {
                scope: ThrottleScope::IpDevice,
                ..
            }
        ));
    }

    #[test]
    fn test_window_start() {
        let now = Utc::now();
        assert_eq!(window_start(now, Duration::hours(1)), now - Duration::seconds(3600));
    }
}
