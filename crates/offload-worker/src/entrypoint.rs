//! Re-exec dispatch: the same compiled binary that drives the parent
//! engine also serves as every worker process, distinguished by an
//! environment variable set when the parent spawns it — closures cannot
//! cross an OS process boundary, so there is no separate
//! worker binary to build).

use std::collections::HashMap;
use std::process;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::io::BufReader;
use tokio::io::Stdin;
use tokio::io::Stdout;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use offload_primitives::CrossProcessLock;
use offload_primitives::Timeouts;
use offload_protocol::ControlMessage;
use offload_protocol::ParentToWorker;
use offload_protocol::Severity;
use offload_protocol::TaskRegistry;
use offload_protocol::TestKind;
use offload_protocol::WorkEnvelope;
use offload_protocol::WorkerToParent;
use offload_protocol::codec;

use crate::control_monitor::ControlMonitor;
use crate::control_monitor::ControlOutcome;
use crate::work_loop;

/// The environment variable that marks a re-exec'd process as a worker and
/// carries its numeric id.
pub const WORKER_ID_ENV: &str = "OFFLOAD_WORKER_ID";

/// A callback run once by each worker before it accepts its first dispatch,
/// serialized across every worker by the shared [`CrossProcessLock`] (the
/// Rust stand-in for a shared cross-process init lock.
pub type InitFn = Arc<dyn Fn() -> Result<(), String> + Send + Sync>;

/// A user-registered handler for one custom control-notification kind.
/// Takes the member value; must not panic across the control
/// loop's boundary — [`crate::control_monitor::ControlMonitor`] catches and
/// logs a panic instead of propagating it.
pub type NotificationHandler = Arc<dyn Fn(i32) + Send + Sync>;

pub fn is_worker_process() -> bool {
    std::env::var(WORKER_ID_ENV).is_ok()
}

fn worker_id() -> Option<u32> {
    std::env::var(WORKER_ID_ENV).ok().and_then(|raw| raw.parse().ok())
}

/// Call this first in `main()`, before touching any application state. If
/// this process is a re-exec'd worker it runs the worker loop to
/// completion and exits the process; otherwise it returns immediately and
/// the caller proceeds as the parent.
pub async fn maybe_enter_worker_mode(
    registry: Arc<TaskRegistry>,
    lock: CrossProcessLock,
    init_funcs: Vec<InitFn>,
    custom_handlers: HashMap<i32, NotificationHandler>,
    timeouts: Timeouts,
) {
    let Some(id) = worker_id() else {
        return;
    };

    tracing::info!(worker_id = id, pid = process::id(), "entering worker mode");
    run_worker(id, registry, lock, init_funcs, custom_handlers, timeouts).await;
    process::exit(0);
}

/// Runs the Control Monitor's handshake step then the merged
/// control/work read loop to completion, in that order: any message other
/// than the initial handshake test, or a timeout waiting for it, is fatal
/// and this returns without ever touching the task registry.
async fn run_worker(
    id: u32,
    registry: Arc<TaskRegistry>,
    lock: CrossProcessLock,
    init_funcs: Vec<InitFn>,
    custom_handlers: HashMap<i32, NotificationHandler>,
    timeouts: Timeouts,
) {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let (out_tx, out_rx) = mpsc::channel::<WorkerToParent>(32);

    let writer = tokio::spawn(run_writer(stdout, out_rx));

    if !await_initial_handshake(&mut stdin, timeouts.init_timeout).await {
        tracing::error!(worker_id = id, "did not receive the initial handshake test in time; exiting");
        drop(out_tx);
        let _ = writer.await;
        return;
    }

    send_handshake_ack(&out_tx, id).await;
    run_init_funcs(&lock, init_funcs).await;

    let go = Arc::new(AtomicBool::new(true));
    let log_level = Arc::new(Mutex::new(Severity::Info));
    let monitor = ControlMonitor::new(go.clone(), log_level, Arc::new(custom_handlers));

    read_loop(stdin, registry, go, monitor, out_tx, timeouts.keepalive_timeout).await;

    let _ = writer.await;
}

/// Reads exactly one frame within `init_timeout`. It must be the
/// `TEST(Initial)` message; anything else, or a timeout, is fatal.
async fn await_initial_handshake(stdin: &mut BufReader<Stdin>, init_timeout: std::time::Duration) -> bool {
    match tokio::time::timeout(init_timeout, codec::read_frame::<_, ParentToWorker>(stdin)).await {
        Ok(Ok(Some(ParentToWorker::Notify(ControlMessage::Test(TestKind::Initial))))) => true,
        Ok(Ok(other)) => {
            tracing::error!(?other, "expected the initial handshake test as the first message");
            false
        }
        Ok(Err(error)) => {
            tracing::error!(%error, "error reading the initial handshake test");
            false
        }
        Err(_elapsed) => false,
    }
}

async fn run_writer(mut stdout: Stdout, mut rx: mpsc::Receiver<WorkerToParent>) {
    while let Some(message) = rx.recv().await {
        if codec::write_frame(&mut stdout, &message).await.is_err() {
            tracing::warn!(worker_pid = process::id(), "failed to write to parent, stopping writer");
            break;
        }
    }
}

async fn send_handshake_ack(out_tx: &mpsc::Sender<WorkerToParent>, worker_id: u32) {
    let _ = out_tx
        .send(WorkerToParent::HandshakeAck { worker_id, pid: process::id() })
        .await;
}

async fn run_init_funcs(lock: &CrossProcessLock, init_funcs: Vec<InitFn>) {
    if init_funcs.is_empty() {
        return;
    }
    let lock = lock.clone();
    let result = tokio::task::spawn_blocking(move || {
        lock.with_lock(|| {
            for init_fn in &init_funcs {
                if let Err(message) = init_fn() {
                    tracing::error!(%message, "init callback failed");
                }
            }
        })
    })
    .await;
    if result.is_err() {
        tracing::error!("init callback execution panicked or the lock could not be acquired");
    }
}

/// After the handshake, every read is bounded by `keepalive_timeout` (2x
/// the keepalive interval): silence that long means the parent is
/// gone, so the worker stops dequeuing (the merged transport makes a
/// separate "wake the Work Loop with a sentinel" push unnecessary — the one
/// loop that reads dispatches is the one that times out).
///
/// Dispatched envelopes are handed off to a single-consumer work task rather
/// than run here directly: a worker runs at most one work unit at a time, but
/// this loop still needs to keep reading so a `Shutdown` or a keepalive lapse
/// is noticed while that unit is in flight.
async fn read_loop(
    mut stdin: BufReader<Stdin>,
    registry: Arc<TaskRegistry>,
    go: Arc<AtomicBool>,
    monitor: ControlMonitor,
    out_tx: mpsc::Sender<WorkerToParent>,
    keepalive_timeout: std::time::Duration,
) {
    let (work_tx, work_rx) = mpsc::channel(1);
    let worker = tokio::spawn(run_work_queue(work_rx, registry, go, out_tx));

    loop {
        let frame = match tokio::time::timeout(keepalive_timeout, codec::read_frame::<_, ParentToWorker>(&mut stdin)).await {
            Ok(frame) => frame,
            Err(_elapsed) => {
                tracing::warn!(?keepalive_timeout, "no message from parent within the keepalive timeout, exiting");
                break;
            }
        };

        match frame {
            Ok(Some(ParentToWorker::Notify(message))) => {
                if matches!(monitor.handle(message).await, ControlOutcome::Shutdown(_)) {
                    break;
                }
            }
            Ok(Some(ParentToWorker::Dispatch(envelope))) => {
                if work_tx.send(envelope).await.is_err() {
                    tracing::warn!("work queue closed, exiting worker loop");
                    break;
                }
            }
            Ok(Some(ParentToWorker::Shutdown)) => {
                tracing::info!("shutdown sentinel received on work channel");
                break;
            }
            Ok(None) => {
                tracing::info!("parent pipe closed, exiting worker loop");
                break;
            }
            Err(error) => {
                tracing::warn!(%error, "error reading from parent, exiting worker loop");
                break;
            }
        }
    }

    drop(work_tx);
    let _ = worker.await;
}

/// Runs each dispatched envelope to completion before pulling the next one
/// off the queue, so only one work unit is ever running on this worker.
async fn run_work_queue(
    mut work_rx: mpsc::Receiver<WorkEnvelope>,
    registry: Arc<TaskRegistry>,
    go: Arc<AtomicBool>,
    out_tx: mpsc::Sender<WorkerToParent>,
) {
    while let Some(envelope) = work_rx.recv().await {
        work_loop::run(envelope, registry.clone(), go.clone(), out_tx.clone()).await;
    }
}
