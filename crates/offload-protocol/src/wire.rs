//! The outermost message types that travel over a worker's stdio pipe.
//!
//! Each worker is a re-exec'd copy of the parent binary, connected to the
//! parent by its own stdin/stdout pair. The two logically independent
//! channels — control notifications and work dispatch/results — are
//! multiplexed onto that one pipe as a tagged union, framed by
//! [`crate::codec`]; nothing downstream (the Control Dispatcher, the Work
//! Dispatcher, a worker's two concurrently-polled loops) needs to know they
//! share a transport.

use serde::Deserialize;
use serde::Serialize;

use crate::control::ControlMessage;
use crate::request_id::RequestId;
use crate::work::ResultFrame;
use crate::work::WorkEnvelope;

/// Parent -> worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ParentToWorker {
    Notify(ControlMessage),
    Dispatch(WorkEnvelope),
    /// Sentinel that ends the worker's dequeue loop.
    Shutdown,
}

/// Worker -> parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerToParent {
    /// Doubles as the parent's "a process actually started" signal:
    /// there is no separate shared-dict primitive, the ack rides the
    /// channel that already exists.
    HandshakeAck { worker_id: u32, pid: u32 },
    Result { id: RequestId, frame: ResultFrame },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::TestKind;

    #[test]
    fn parent_to_worker_round_trips() {
        let msg = ParentToWorker::Notify(ControlMessage::Test(TestKind::Keepalive));
        let json = serde_json::to_string(&msg).unwrap();
        let _parsed: ParentToWorker = serde_json::from_str(&json).unwrap();
    }

    #[test]
    fn worker_to_parent_result_round_trips() {
        let gen = crate::request_id::RequestIdGenerator::new();
        let id = gen.next();
        let msg = WorkerToParent::Result {
            id,
            frame: ResultFrame::Completed,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: WorkerToParent = serde_json::from_str(&json).unwrap();
        match parsed {
            WorkerToParent::Result { id: parsed_id, .. } => assert_eq!(parsed_id, id),
            _ => panic!("wrong variant"),
        }
    }
}
