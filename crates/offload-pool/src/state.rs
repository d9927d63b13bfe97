use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::broadcast;

use offload_protocol::ControlMessage;

/// The per-process mutable go/no-go flag, mirrored into every worker
/// by a `STATECHANGE` control broadcast.
///
/// Broadcasts are idempotent: setting the same value twice neither mutates
/// the flag nor emits a second message.
#[derive(Clone)]
pub struct StateProxy {
    go: Arc<AtomicBool>,
    control_tx: broadcast::Sender<ControlMessage>,
}

impl StateProxy {
    pub fn new(control_tx: broadcast::Sender<ControlMessage>) -> Self {
        Self {
            go: Arc::new(AtomicBool::new(true)),
            control_tx,
        }
    }

    pub fn is_go(&self) -> bool {
        self.go.load(Ordering::SeqCst)
    }

    pub fn is_no_go(&self) -> bool {
        !self.is_go()
    }

    pub fn go_flag(&self) -> Arc<AtomicBool> {
        self.go.clone()
    }

    /// Subscribe a fresh receiver to the control broadcast (used by the
    /// Control Dispatcher task at startup).
    pub fn go_flag_control_receiver(&self) -> broadcast::Receiver<ControlMessage> {
        self.control_tx.subscribe()
    }

    /// Send a message that did not originate from [`Self::update`] (e.g. the
    /// shutdown sentinel `stop()` issues directly).
    pub fn broadcast_raw(&self, message: ControlMessage) -> Result<usize, broadcast::error::SendError<ControlMessage>> {
        self.control_tx.send(message)
    }

    /// Update the value, broadcasting `STATECHANGE` only if it actually
    /// changed. Returns `true` if a broadcast was emitted.
    pub fn update(&self, new_value: bool) -> bool {
        let previous = self.go.swap(new_value, Ordering::SeqCst);
        if previous == new_value {
            // No-op: restore the value we just (harmlessly) swapped in, and
            // skip the broadcast. swap already wrote `new_value`, which
            // equals `previous`, so there is nothing to undo.
            return false;
        }
        // `send` only fails if there are no subscribers; that's not an
        // error for a broadcast with no workers connected yet.
        let _ = self.control_tx.send(ControlMessage::StateChange(new_value));
        true
    }
}

/// Effective worker count rules:
/// - total cpus == 1 → 1
/// - requested == 0 or requested >= total → total - 1 (reserve one core)
/// - otherwise → requested
pub fn effective_worker_count(requested: usize, total_cpus: usize) -> usize {
    if total_cpus <= 1 {
        return 1;
    }
    if requested == 0 || requested >= total_cpus {
        total_cpus - 1
    } else {
        requested
    }
}
