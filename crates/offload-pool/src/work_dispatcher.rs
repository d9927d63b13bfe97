//! The Work Dispatcher: the single task that drains the local submission
//! queue and hands each request to exactly one worker.
//!
//! A literal cross-process many-consumer queue has no simple Rust
//! equivalent; picking the least-loaded worker's own duplex connection
//! gives the same single-producer, single-delivery semantics without one,
//! and keeps each worker close to the "at most one concurrent work unit"
//! invariant whenever there are at least as many workers as
//! requests in flight.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use offload_protocol::ResultFrame;
use offload_protocol::WorkEnvelope;

use crate::state::StateProxy;
use crate::worker_handle::ResultRouter;
use crate::worker_handle::WorkerHandle;

/// One request travelling from `submit()` to the dispatcher: the wire
/// envelope plus the channel its [`crate::worker_handle::ResultRouter`]
/// entry will forward frames into.
pub struct Submission {
    pub envelope: WorkEnvelope,
    pub result_tx: mpsc::Sender<ResultFrame>,
}

/// Drains `submission_rx` until the sender side is dropped (the pool's
/// `stop()` path), round-robining live requests across `workers` and
/// immediately cancelling anything submitted while the engine is no-go.
pub async fn run(
    mut submission_rx: mpsc::Receiver<Submission>,
    workers: Arc<Vec<WorkerHandle>>,
    router: ResultRouter,
    state: StateProxy,
) {
    while let Some(Submission { envelope, result_tx }) = submission_rx.recv().await {
        if workers.is_empty() {
            let _ = result_tx.send(ResultFrame::Cancelled).await;
            continue;
        }
        if state.is_no_go() {
            let _ = result_tx.send(ResultFrame::Cancelled).await;
            continue;
        }

        router.lock().await.insert(envelope.id, result_tx);

        let worker = least_loaded(&workers);
        if worker.send_work(envelope.clone()).await.is_err() {
            tracing::warn!(worker_id = worker.id, request_id = %envelope.id, "worker pipe closed, dropping dispatch");
            if let Some(result_tx) = router.lock().await.remove(&envelope.id) {
                let _ = result_tx.send(ResultFrame::Cancelled).await;
            }
        }
    }

    tracing::info!("work dispatcher exiting: submission queue closed");
}

fn least_loaded(workers: &[WorkerHandle]) -> &WorkerHandle {
    workers
        .iter()
        .min_by_key(|worker| worker.outstanding.load(Ordering::SeqCst))
        .expect("workers is non-empty, checked by caller")
}
