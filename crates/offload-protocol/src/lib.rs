//! Wire types shared between the parent process and worker processes: the
//! control-message taxonomy, the work/result envelopes, request ids, and the
//! task registry that stands in for cross-process callables.

pub mod codec;
mod control;
mod request_id;
mod severity;
mod task;
mod wire;
mod work;

pub use control::ControlMessage;
pub use control::ShutdownKind;
pub use control::TestKind;
pub use control::is_reserved_kind;
pub use request_id::RequestId;
pub use request_id::RequestIdGenerator;
pub use severity::Severity;
pub use task::Task;
pub use task::TaskControl;
pub use task::TaskOutcome;
pub use task::TaskRegistry;
pub use wire::ParentToWorker;
pub use wire::WorkerToParent;
pub use work::ResultFrame;
pub use work::WorkEnvelope;
