//! The Control Dispatcher: the single task that owns fan-out of control
//! notifications to every worker, plus the periodic keepalive.
//!
//! Runs for the lifetime of the pool as one activity; a worker connecting
//! or dropping out never blocks another worker's delivery, since each send
//! is bounded by `broadcast_put_timeout` and a slow/dead worker only logs a
//! warning rather than stalling the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio::time::interval;

use offload_protocol::ControlMessage;
use offload_protocol::ShutdownKind;
use offload_protocol::TestKind;

use crate::worker_handle::WorkerHandle;

/// Drives control fan-out until a `Shutdown` message is observed, at which
/// point every worker has already received it and the task returns.
pub async fn run(
    workers: Arc<Vec<WorkerHandle>>,
    mut control_rx: broadcast::Receiver<ControlMessage>,
    keepalive_interval: Duration,
    broadcast_put_timeout: Duration,
) {
    let mut ticker = interval(keepalive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            received = control_rx.recv() => {
                match received {
                    Ok(message) => {
                        let is_shutdown = matches!(message, ControlMessage::Shutdown(_));
                        fan_out(&workers, message, broadcast_put_timeout).await;
                        if is_shutdown {
                            tracing::info!("control dispatcher exiting after shutdown fan-out");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("control channel closed, control dispatcher exiting");
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "control dispatcher lagged behind broadcast sender");
                    }
                }
            }
            _ = ticker.tick() => {
                fan_out(&workers, ControlMessage::Test(TestKind::Keepalive), broadcast_put_timeout).await;
            }
        }
    }
}

async fn fan_out(workers: &[WorkerHandle], message: ControlMessage, per_send_timeout: Duration) {
    for worker in workers {
        let result = tokio::time::timeout(per_send_timeout, worker.send_control(message.clone())).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::warn!(worker_id = worker.id, "worker control pipe closed");
            }
            Err(_) => {
                tracing::warn!(worker_id = worker.id, ?per_send_timeout, "control fan-out timed out for worker");
            }
        }
    }
}

/// Broadcasts the initial handshake test every worker must see first,
/// before any keepalives or submissions follow.
pub async fn send_initial_test(workers: &[WorkerHandle], per_send_timeout: Duration) {
    fan_out(workers, ControlMessage::Test(TestKind::Initial), per_send_timeout).await;
}

/// Used by `stop()` to initiate the fan-out/exit sequence without waiting
/// for a caller-driven `update_state_value`-style broadcast.
pub fn shutdown_message(kind: ShutdownKind) -> ControlMessage {
    ControlMessage::Shutdown(kind)
}
