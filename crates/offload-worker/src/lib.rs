//! The worker side of the engine: re-exec dispatch into worker mode, the
//! control monitor, and the work loop that runs dispatched requests against
//! the shared [`offload_protocol::TaskRegistry`].

mod control_monitor;
mod entrypoint;
mod work_loop;

pub use control_monitor::ControlMonitor;
pub use control_monitor::ControlOutcome;
pub use entrypoint::InitFn;
pub use entrypoint::NotificationHandler;
pub use entrypoint::WORKER_ID_ENV;
pub use entrypoint::is_worker_process;
pub use entrypoint::maybe_enter_worker_mode;
