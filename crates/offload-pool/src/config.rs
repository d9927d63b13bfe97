use offload_primitives::Timeouts;

/// Every tunable governing pool lifecycle, constructed once before
/// `start_workers` and never hot-reloaded (no dynamic worker scaling is an
/// explicit non-goal).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub requested_worker_count: usize,
    pub timeouts: Timeouts,
    pub fail_open: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            requested_worker_count: 0,
            timeouts: Timeouts::default(),
            fail_open: true,
        }
    }
}

impl EngineConfig {
    /// Queue bounds are derived from the effective worker count `n`, never
    /// independently configured: submission queue = n+2, work
    /// channel = n+2, control queue = n+1.
    pub fn submission_queue_bound(n: usize) -> usize {
        n + 2
    }

    pub fn work_channel_bound(n: usize) -> usize {
        n + 2
    }

    pub fn control_queue_bound(n: usize) -> usize {
        n + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_bounds_follow_n_plus_constant() {
        assert_eq!(EngineConfig::submission_queue_bound(3), 5);
        assert_eq!(EngineConfig::work_channel_bound(3), 5);
        assert_eq!(EngineConfig::control_queue_bound(3), 4);
    }

    #[test]
    fn defaults_enable_fail_open() {
        assert!(EngineConfig::default().fail_open);
    }
}
