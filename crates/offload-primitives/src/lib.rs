//! Cross-process primitives used by the pool and worker crates: a real
//! advisory file lock for mutual exclusion, and the shared timeout table.

mod lock;
mod timeouts;

pub use lock::CrossProcessLock;
pub use timeouts::Timeouts;
