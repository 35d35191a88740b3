//! ---
//! fleet_section: "02-device-engine"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Minimum-interval gate for outbound pushes."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::Instant;

/// Lets an action through at most once per `min_interval`.
#[derive(Debug, Clone)]
pub struct PushThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl PushThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Forget the last firing so the next check passes.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_opens_after_interval() {
        let start = Instant::now();
        let mut throttle = PushThrottle::new(Duration::from_secs(15));
        assert!(throttle.ready(start));
        throttle.mark(start);
        assert!(!throttle.ready(start + Duration::from_secs(14)));
        assert!(throttle.ready(start + Duration::from_secs(15)));
        throttle.reset();
        assert!(throttle.ready(start));
    }
}
