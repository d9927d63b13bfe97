//! The worker-side control activity: applies every [`ControlMessage`] this
//! process receives (go/no-go, log level, shutdown) without touching the
//! work loop's state beyond the shared go flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::atomic::Ordering::SeqCst;

use tokio::sync::Mutex;

use offload_protocol::ControlMessage;
use offload_protocol::Severity;
use offload_protocol::ShutdownKind;

use crate::entrypoint::NotificationHandler;

#[derive(Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    Continue,
    Shutdown(ShutdownKind),
}

pub struct ControlMonitor {
    go: Arc<AtomicBool>,
    log_level: Arc<Mutex<Severity>>,
    custom_handlers: Arc<HashMap<i32, NotificationHandler>>,
}

impl ControlMonitor {
    pub fn new(
        go: Arc<AtomicBool>,
        log_level: Arc<Mutex<Severity>>,
        custom_handlers: Arc<HashMap<i32, NotificationHandler>>,
    ) -> Self {
        Self {
            go,
            log_level,
            custom_handlers,
        }
    }

    pub async fn handle(&self, message: ControlMessage) -> ControlOutcome {
        match message {
            ControlMessage::Test(kind) => {
                tracing::trace!(?kind, "control test received");
                ControlOutcome::Continue
            }
            ControlMessage::StateChange(value) => {
                self.go.store(value, SeqCst);
                tracing::debug!(go = value, "state change applied");
                ControlOutcome::Continue
            }
            ControlMessage::LogLevel(level) => {
                *self.log_level.lock().await = level;
                tracing::debug!(?level, "log level updated");
                ControlOutcome::Continue
            }
            ControlMessage::Custom { kind } => {
                self.dispatch_custom(kind);
                ControlOutcome::Continue
            }
            ControlMessage::Shutdown(kind) => {
                tracing::info!(?kind, "shutdown requested");
                ControlOutcome::Shutdown(kind)
            }
        }
    }

    pub fn is_no_go(&self) -> bool {
        !self.go.load(Ordering::SeqCst)
    }

    /// Dispatch rule: built-ins are matched first by
    /// [`Self::handle`]'s own match arms, so by the time we get here `kind`
    /// is either a registered custom kind or unmatched. A handler that
    /// panics is caught and logged, never propagated across the process's
    /// control loop.
    fn dispatch_custom(&self, kind: i32) {
        let Some(handler) = self.custom_handlers.get(&kind) else {
            tracing::error!(kind, "unmatched control notification kind");
            return;
        };
        let handler = handler.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || handler(kind)));
        if let Err(payload) = outcome {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(kind, %message, "custom notification handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ControlMonitor {
        monitor_with_handlers(HashMap::new())
    }

    fn monitor_with_handlers(handlers: HashMap<i32, NotificationHandler>) -> ControlMonitor {
        ControlMonitor::new(
            Arc::new(AtomicBool::new(true)),
            Arc::new(Mutex::new(Severity::Info)),
            Arc::new(handlers),
        )
    }

    #[tokio::test]
    async fn state_change_flips_the_go_flag() {
        let monitor = monitor();
        assert!(!monitor.is_no_go());
        monitor.handle(ControlMessage::StateChange(false)).await;
        assert!(monitor.is_no_go());
    }

    #[tokio::test]
    async fn shutdown_message_yields_shutdown_outcome() {
        let monitor = monitor();
        let outcome = monitor.handle(ControlMessage::Shutdown(ShutdownKind::Safe)).await;
        assert_eq!(outcome, ControlOutcome::Shutdown(ShutdownKind::Safe));
    }

    #[tokio::test]
    async fn test_and_unmatched_custom_messages_continue() {
        let monitor = monitor();
        assert_eq!(
            monitor.handle(ControlMessage::Test(offload_protocol::TestKind::Keepalive)).await,
            ControlOutcome::Continue
        );
        assert_eq!(
            monitor.handle(ControlMessage::Custom { kind: 3 }).await,
            ControlOutcome::Continue
        );
    }

    #[tokio::test]
    async fn registered_custom_kind_invokes_its_handler() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_for_handler = seen.clone();
        let mut handlers: HashMap<i32, NotificationHandler> = HashMap::new();
        handlers.insert(
            1,
            Arc::new(move |kind| {
                seen_for_handler.lock().unwrap().push(kind);
            }),
        );
        let monitor = monitor_with_handlers(handlers);

        monitor.handle(ControlMessage::Custom { kind: 1 }).await;
        monitor.handle(ControlMessage::Custom { kind: 2 }).await;

        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn a_panicking_custom_handler_is_caught_and_does_not_propagate() {
        let mut handlers: HashMap<i32, NotificationHandler> = HashMap::new();
        handlers.insert(9, Arc::new(|_kind| panic!("boom")));
        let monitor = monitor_with_handlers(handlers);

        let outcome = monitor.handle(ControlMessage::Custom { kind: 9 }).await;
        assert_eq!(outcome, ControlOutcome::Continue);
    }
}
