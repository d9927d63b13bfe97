//! The worker pool: process lifecycle, the Control Dispatcher, the Work
//! Dispatcher, and the go/no-go [`StateProxy`] they all share.

mod config;
mod control_dispatcher;
mod state;
mod supervisor;
mod work_dispatcher;
mod worker_handle;

pub use config::EngineConfig;
pub use state::StateProxy;
pub use state::effective_worker_count;
pub use supervisor::PoolSupervisor;
pub use work_dispatcher::Submission;
pub use worker_handle::ResultRouter;
pub use worker_handle::WorkerHandle;
