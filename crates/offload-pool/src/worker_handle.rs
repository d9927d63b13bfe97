//! The parent-side handle to one worker process.
//!
//! Each worker is a re-exec'd copy of the parent binary with its stdin and
//! stdout piped back to us. A writer task owns the
//! child's stdin and serializes [`ParentToWorker`] frames onto it; a reader
//! task owns stdout and routes incoming [`WorkerToParent`] frames either to
//! the one-shot handshake signal or into the shared [`ResultRouter`] keyed
//! by request id.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use offload_protocol::ControlMessage;
use offload_protocol::ParentToWorker;
use offload_protocol::RequestId;
use offload_protocol::ResultFrame;
use offload_protocol::WorkEnvelope;
use offload_protocol::WorkerToParent;
use offload_protocol::codec;

/// Shared table routing a worker's result frames back to the submission
/// that is waiting on them. One table is shared by every [`WorkerHandle`]
/// in a pool, since a `RequestId` is unique across the whole parent process,
/// not per worker.
pub type ResultRouter = Arc<Mutex<HashMap<RequestId, mpsc::Sender<ResultFrame>>>>;

pub fn new_result_router() -> ResultRouter {
    Arc::new(Mutex::new(HashMap::new()))
}

/// A running worker process and the plumbing to talk to it.
pub struct WorkerHandle {
    pub id: u32,
    child: Child,
    outbound_tx: mpsc::Sender<ParentToWorker>,
    /// Requests currently dispatched to this worker and awaiting a terminal
    /// frame; used by the Work Dispatcher's load-aware round robin.
    pub outstanding: Arc<AtomicUsize>,
}

/// Spawns a worker, returning its handle plus a one-shot that resolves with
/// the worker's pid once its handshake ack arrives.
pub fn spawn_worker(
    id: u32,
    worker_binary: &std::path::Path,
    router: ResultRouter,
) -> std::io::Result<(WorkerHandle, oneshot::Receiver<u32>)> {
    let mut command = Command::new(worker_binary);
    command
        .env("OFFLOAD_WORKER_ID", id.to_string())
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let stdin = child.stdin.take().expect("piped stdin");
    let stdout = child.stdout.take().expect("piped stdout");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ParentToWorker>(32);
    let (handshake_tx, handshake_rx) = oneshot::channel::<u32>();
    let outstanding = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        let mut stdin = stdin;
        while let Some(frame) = outbound_rx.recv().await {
            if codec::write_frame(&mut stdin, &frame).await.is_err() {
                tracing::warn!(worker_id = id, "write to worker stdin failed, stopping writer");
                break;
            }
        }
    });

    let reader_outstanding = outstanding.clone();
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut handshake_tx = Some(handshake_tx);
        loop {
            match codec::read_frame::<_, WorkerToParent>(&mut reader).await {
                Ok(Some(WorkerToParent::HandshakeAck { pid, .. })) => {
                    if let Some(tx) = handshake_tx.take() {
                        let _ = tx.send(pid);
                    }
                }
                Ok(Some(WorkerToParent::Result { id: req_id, frame })) => {
                    let sender = if frame.is_terminal() {
                        reader_outstanding.fetch_sub(1, Ordering::SeqCst);
                        router.lock().await.remove(&req_id)
                    } else {
                        router.lock().await.get(&req_id).cloned()
                    };
                    match sender {
                        Some(sender) => {
                            if sender.send(frame).await.is_err() {
                                tracing::debug!(worker_id = id, request_id = %req_id, "result receiver already dropped");
                            }
                        }
                        None => {
                            tracing::warn!(worker_id = id, request_id = %req_id, "result frame for unknown request");
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!(worker_id = id, "worker stdout closed");
                    break;
                }
                Err(error) => {
                    tracing::warn!(worker_id = id, %error, "error reading worker stdout");
                    break;
                }
            }
        }
    });

    let handle = WorkerHandle {
        id,
        child,
        outbound_tx,
        outstanding,
    };
    Ok((handle, handshake_rx))
}

impl WorkerHandle {
    pub async fn send_control(&self, message: ControlMessage) -> Result<(), mpsc::error::SendError<ParentToWorker>> {
        self.outbound_tx.send(ParentToWorker::Notify(message)).await
    }

    pub async fn send_work(&self, envelope: WorkEnvelope) -> Result<(), mpsc::error::SendError<ParentToWorker>> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.outbound_tx.send(ParentToWorker::Dispatch(envelope)).await
    }

    pub async fn send_shutdown(&self) -> Result<(), mpsc::error::SendError<ParentToWorker>> {
        self.outbound_tx.send(ParentToWorker::Shutdown).await
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }
}
