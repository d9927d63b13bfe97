//! The work-offload engine's public facade: construct an [`Engine`],
//! register tasks and init callbacks, `start_workers`, then `submit` work
//! and await the [`WorkFuture`] it returns.

mod engine;
mod work_future;

pub use engine::Engine;
pub use work_future::WorkFuture;

pub use offload_pool::EngineConfig;
pub use offload_primitives::CrossProcessLock;
pub use offload_primitives::Timeouts;
pub use offload_protocol::Task;
pub use offload_protocol::TaskControl;
pub use offload_protocol::TaskOutcome;
pub use offload_protocol::TaskRegistry;
pub use offload_request::FlatteningHandler;
pub use offload_request::Handler;
pub use offload_request::ResultHandler;
pub use offload_worker::InitFn;
pub use offload_worker::NotificationHandler;
pub use offload_worker::is_worker_process;
pub use offload_worker::maybe_enter_worker_mode;
