use std::time::Duration;

/// Every timeout governing pool lifecycle, with its default value.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub init_timeout: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub broadcast_put_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(20),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(60),
            broadcast_put_timeout: Duration::from_secs(5),
        }
    }
}

impl Timeouts {
    /// `start()`'s first handshake wait: `init_timeout - 5s`.
    pub fn initial_handshake_wait(&self) -> Duration {
        self.init_timeout.saturating_sub(Duration::from_secs(5))
    }

    /// `start()`'s single retry window after the first wait expires.
    pub fn handshake_retry_wait(&self) -> Duration {
        Duration::from_secs(5)
    }

    /// The Work Loop's wait for the handshake event: `keepalive_timeout + 1s`.
    pub fn work_loop_handshake_wait(&self) -> Duration {
        self.keepalive_timeout + Duration::from_secs(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let t = Timeouts::default();
        assert_eq!(t.init_timeout, Duration::from_secs(20));
        assert_eq!(t.keepalive_interval, Duration::from_secs(30));
        assert_eq!(t.keepalive_timeout, Duration::from_secs(60));
        assert_eq!(t.broadcast_put_timeout, Duration::from_secs(5));
    }

    #[test]
    fn keepalive_timeout_is_twice_the_interval() {
        let t = Timeouts::default();
        assert_eq!(t.keepalive_timeout, t.keepalive_interval * 2);
    }

    #[test]
    fn derived_waits_match_expected_arithmetic() {
        let t = Timeouts::default();
        assert_eq!(t.initial_handshake_wait(), Duration::from_secs(15));
        assert_eq!(t.work_loop_handshake_wait(), Duration::from_secs(61));
    }
}
