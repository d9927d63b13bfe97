//! [`PoolSupervisor`]: owns the worker processes' lifecycle end to end —
//! spawn, handshake wait, running dispatchers, and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use offload_error::EngineError;
use offload_error::EngineResult;
use offload_primitives::CrossProcessLock;
use offload_protocol::ControlMessage;
use offload_protocol::ShutdownKind;

use crate::config::EngineConfig;
use crate::control_dispatcher;
use crate::state::StateProxy;
use crate::state::effective_worker_count;
use crate::work_dispatcher;
use crate::work_dispatcher::Submission;
use crate::worker_handle::ResultRouter;
use crate::worker_handle::WorkerHandle;
use crate::worker_handle::new_result_router;

/// Everything the supervisor needs to spawn a worker: the path to re-exec
/// (almost always `std::env::current_exe()`) and the init lock every
/// worker serializes its init callbacks through.
pub struct PoolSupervisor {
    config: EngineConfig,
    worker_binary: std::path::PathBuf,
    lock: CrossProcessLock,
    state: StateProxy,
    router: ResultRouter,
    workers: Option<Arc<Vec<WorkerHandle>>>,
    submission_tx: Option<mpsc::Sender<Submission>>,
    control_dispatcher_task: Option<JoinHandle<()>>,
    work_dispatcher_task: Option<JoinHandle<()>>,
    started: bool,
    stopped: bool,
    loaded: bool,
}

impl PoolSupervisor {
    pub fn new(
        config: EngineConfig,
        worker_binary: std::path::PathBuf,
        lock_path: std::path::PathBuf,
        control_tx: broadcast::Sender<ControlMessage>,
    ) -> Self {
        Self {
            config,
            worker_binary,
            lock: CrossProcessLock::new(lock_path),
            state: StateProxy::new(control_tx),
            router: new_result_router(),
            workers: None,
            submission_tx: None,
            control_dispatcher_task: None,
            work_dispatcher_task: None,
            started: false,
            stopped: false,
            loaded: false,
        }
    }

    pub fn state(&self) -> &StateProxy {
        &self.state
    }

    /// Set once the handshake window confirms at least one live worker
    /// ("marks loaded"); used by `enqueue_notification`'s "pool not
    /// yet loaded" check.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// `true` once `stop()` has run; `submit` must reject after this rather
    /// than silently falling back to the fail-open inline path.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn lock(&self) -> &CrossProcessLock {
        &self.lock
    }

    pub fn current_process_count(&self) -> usize {
        self.workers.as_ref().map_or(0, |w| w.len())
    }

    /// Spawns the effective worker count, waits for every one of them to
    /// complete the initial handshake (with one retry window), and starts
    /// the Control and Work Dispatcher tasks.
    pub async fn start(&mut self) -> EngineResult<()> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.started = true;

        let total_cpus = num_cpus::get();
        let count = effective_worker_count(self.config.requested_worker_count, total_cpus);
        tracing::info!(count, total_cpus, "starting worker pool");

        let mut workers = Vec::with_capacity(count);
        let mut handshake_waits = Vec::with_capacity(count);
        for id in 0..count as u32 {
            let (handle, handshake_rx) =
                crate::worker_handle::spawn_worker(id, &self.worker_binary, self.router.clone())
                    .map_err(|error| EngineError::InvalidArguments(format!("failed to spawn worker {id}: {error}")))?;
            workers.push(handle);
            handshake_waits.push(handshake_rx);
        }

        send_initial_test_under_lock(&self.lock, &workers, self.config.timeouts.broadcast_put_timeout).await;

        let acked = await_handshakes(
            handshake_waits,
            self.config.timeouts.initial_handshake_wait(),
            self.config.timeouts.handshake_retry_wait(),
        )
        .await;
        tracing::info!(acked, count, "worker handshake window complete");

        if acked == 0 && !self.config.fail_open {
            return Err(EngineError::BrokenPool);
        }
        self.loaded = acked > 0;

        let workers = Arc::new(workers);
        let (submission_tx, submission_rx) =
            mpsc::channel::<Submission>(EngineConfig::submission_queue_bound(count));

        let control_rx = self.state.go_flag_control_receiver();
        let control_task = tokio::spawn(control_dispatcher::run(
            workers.clone(),
            control_rx,
            self.config.timeouts.keepalive_interval,
            self.config.timeouts.broadcast_put_timeout,
        ));
        let work_task = tokio::spawn(work_dispatcher::run(
            submission_rx,
            workers.clone(),
            self.router.clone(),
            self.state.clone(),
        ));

        self.workers = Some(workers);
        self.submission_tx = Some(submission_tx);
        self.control_dispatcher_task = Some(control_task);
        self.work_dispatcher_task = Some(work_task);
        Ok(())
    }

    pub fn submission_sender(&self) -> EngineResult<mpsc::Sender<Submission>> {
        self.submission_tx.clone().ok_or(EngineError::NotStarted)
    }

    pub fn result_router(&self) -> ResultRouter {
        self.router.clone()
    }

    /// Broadcasts `Shutdown`, drops the submission sender so the Work
    /// Dispatcher drains and exits, then waits for every worker process.
    pub async fn stop(&mut self) -> EngineResult<()> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        if self.stopped {
            return Err(EngineError::Stopped);
        }
        self.stopped = true;

        let _ = self.state.broadcast_raw(control_dispatcher::shutdown_message(ShutdownKind::Safe));
        self.submission_tx.take();

        if let Some(task) = self.work_dispatcher_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.control_dispatcher_task.take() {
            let _ = task.await;
        }
        if let Some(workers) = self.workers.take() {
            if let Ok(mut workers) = Arc::try_unwrap(workers).map_err(|_| ()) {
                for worker in &mut workers {
                    let _ = worker.wait().await;
                }
            }
        }
        Ok(())
    }
}

async fn send_initial_test_under_lock(lock: &CrossProcessLock, workers: &[WorkerHandle], timeout: Duration) {
    // The lock's only cross-process contender is a worker's own init
    // callback; holding it here just establishes a consistent "nobody else
    // touches shared init state while the handshake test goes out" window.
    let lock = lock.clone();
    let result = tokio::task::spawn_blocking(move || lock.with_lock(|| ())).await;
    if result.is_err() {
        tracing::warn!("init lock acquisition for initial handshake failed");
    }
    control_dispatcher::send_initial_test(workers, timeout).await;
}

/// Waits up to `first_wait + retry_wait` (the handshake window plus
/// its single retry, collapsed into one combined deadline: a receiver that
/// resolves during the retry portion counts exactly as it would have under
/// a literal two-phase wait) for every worker's handshake ack to arrive.
async fn await_handshakes(
    waits: Vec<tokio::sync::oneshot::Receiver<u32>>,
    first_wait: Duration,
    retry_wait: Duration,
) -> usize {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    let acked = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::with_capacity(waits.len());
    for rx in waits {
        let acked = acked.clone();
        tasks.push(tokio::spawn(async move {
            if rx.await.is_ok() {
                acked.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }

    tokio::time::sleep(first_wait + retry_wait).await;
    for task in &tasks {
        task.abort();
    }
    acked.load(Ordering::SeqCst)
}
