//! [`Engine`]: the top-level facade wiring the task registry, the init
//! lock, the worker pool, and the request/handler machinery into the
//! public surface the embedding application sees.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::broadcast;

use offload_error::EngineError;
use offload_error::EngineResult;
use offload_error::WorkResult;
use offload_pool::EngineConfig;
use offload_pool::PoolSupervisor;
use offload_pool::Submission;
use offload_primitives::CrossProcessLock;
use offload_protocol::ControlMessage;
use offload_protocol::RequestIdGenerator;
use offload_protocol::Severity;
use offload_protocol::Task;
use offload_protocol::TaskControl;
use offload_protocol::TaskOutcome;
use offload_protocol::TaskRegistry;
use offload_protocol::WorkEnvelope;
use offload_protocol::is_reserved_kind;
use offload_worker::InitFn;
use offload_worker::NotificationHandler;

use crate::work_future::WorkFuture;

/// The engine's single entry point. Construct one per application, register
/// tasks and init callbacks on it, then call [`Engine::start_workers`].
pub struct Engine {
    registry: Mutex<TaskRegistry>,
    init_funcs: Mutex<Vec<InitFn>>,
    custom_handlers: Mutex<std::collections::HashMap<i32, NotificationHandler>>,
    control_tx: broadcast::Sender<ControlMessage>,
    supervisor: Mutex<Option<PoolSupervisor>>,
    request_ids: RequestIdGenerator,
    fail_open: AtomicBool,
    /// The Offload policy bit, separate from the go/no-go State Proxy.
    /// Gates whether `submit` routes to a worker at all; sampled only after
    /// the pool has confirmed `is_loaded()`.
    offload_enabled: AtomicBool,
    /// Set by `disable_offload(sticky = true)`; keeps offload off across a
    /// later `start_workers` success until `enable_offload(force = true)`
    /// clears it.
    offload_force_disabled: AtomicBool,
    config: EngineConfig,
    lock_path: PathBuf,
    prepared: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig, lock_path: impl Into<PathBuf>) -> Self {
        let (control_tx, _rx) = broadcast::channel(64);
        let fail_open = config.fail_open;
        Self {
            registry: Mutex::new(TaskRegistry::new()),
            init_funcs: Mutex::new(Vec::new()),
            custom_handlers: Mutex::new(std::collections::HashMap::new()),
            control_tx,
            supervisor: Mutex::new(None),
            request_ids: RequestIdGenerator::new(),
            fail_open: AtomicBool::new(fail_open),
            offload_enabled: AtomicBool::new(false),
            offload_force_disabled: AtomicBool::new(false),
            config,
            lock_path: lock_path.into(),
            prepared: AtomicBool::new(false),
        }
    }

    /// Touches the init lock file and caches the effective worker count,
    /// the pre-fork preparation step. Idempotent;
    /// `start_workers` calls it if the caller did not.
    pub async fn prepare_globals(&self) -> EngineResult<()> {
        if self.prepared.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let lock = CrossProcessLock::new(self.lock_path.clone());
        let result = tokio::task::spawn_blocking(move || lock.with_lock(|| ())).await;
        if result.is_err() {
            tracing::warn!("prepare_globals: init lock could not be touched");
        }
        Ok(())
    }

    /// Returns a registry handle the embedding binary's `main()` should also
    /// pass to [`offload_worker::maybe_enter_worker_mode`] — both the parent
    /// and every re-exec'd worker run the identical registration sequence,
    /// so this snapshot is what a worker process will see, too.
    pub async fn task_registry_snapshot(&self) -> Arc<TaskRegistry> {
        Arc::new(self.registry.lock().await.snapshot())
    }

    pub async fn init_funcs_snapshot(&self) -> Vec<InitFn> {
        self.init_funcs.lock().await.clone()
    }

    /// Hand to [`offload_worker::maybe_enter_worker_mode`] alongside the
    /// task registry and init funcs: every re-exec'd worker reconstructs
    /// this identically by running the same registration sequence in its
    /// own `main()` before checking `is_worker_process`.
    pub async fn custom_handlers_snapshot(&self) -> std::collections::HashMap<i32, NotificationHandler> {
        self.custom_handlers.lock().await.clone()
    }

    /// The same init lock every worker process serializes its init
    /// callbacks through; hand this to
    /// [`offload_worker::maybe_enter_worker_mode`] alongside
    /// [`Engine::task_registry_snapshot`] and [`Engine::init_funcs_snapshot`].
    pub fn init_lock(&self) -> CrossProcessLock {
        CrossProcessLock::new(self.lock_path.clone())
    }

    /// The timeout table every re-exec'd worker process needs at hand
    /// before it can run its own handshake and keepalive waits; hand
    /// this to [`offload_worker::maybe_enter_worker_mode`] too.
    pub fn timeouts(&self) -> offload_primitives::Timeouts {
        self.config.timeouts
    }

    pub async fn register_task(&self, name: impl Into<String>, task: Arc<dyn Task>) -> EngineResult<()> {
        let name = name.into();
        if self.supervisor.lock().await.is_some() {
            return Err(EngineError::RegisteredAfterStart(name));
        }
        self.registry.lock().await.register(name, task)
    }

    pub async fn add_init_func(&self, init_fn: InitFn) -> EngineResult<()> {
        if self.supervisor.lock().await.is_some() {
            return Err(EngineError::RegisteredAfterStart("init_func".to_string()));
        }
        self.init_funcs.lock().await.push(init_fn);
        Ok(())
    }

    /// Registration is pre-start only, matching every other registration
    /// call; the handler itself runs inside each worker process,
    /// not the parent, so it must not capture anything that can't cross a
    /// re-exec (see the entrypoint's re-registration pattern).
    pub async fn add_custom_notification(&self, kind: i32, handler: NotificationHandler) -> EngineResult<()> {
        if self.supervisor.lock().await.is_some() {
            return Err(EngineError::RegisteredAfterStart(format!("custom notification kind {kind}")));
        }
        if is_reserved_kind(kind) {
            return Err(EngineError::NonDisjointNotificationKind(kind));
        }
        let mut handlers = self.custom_handlers.lock().await;
        if handlers.contains_key(&kind) {
            return Err(EngineError::NonDisjointNotificationKind(kind));
        }
        handlers.insert(kind, handler);
        Ok(())
    }

    /// Returns `false` if the pool is not yet loaded.
    pub async fn enqueue_notification(&self, kind: i32) -> EngineResult<bool> {
        if !self.custom_handlers.lock().await.contains_key(&kind) {
            return Err(EngineError::InvalidArguments(format!(
                "notification kind {kind} was never registered via add_custom_notification"
            )));
        }
        let supervisor = self.supervisor.lock().await;
        let is_loaded = supervisor.as_ref().is_some_and(|s| s.is_loaded());
        if !is_loaded {
            return Ok(false);
        }
        let _ = self.control_tx.send(ControlMessage::Custom { kind });
        Ok(true)
    }

    pub async fn update_state_value(&self, go: bool) -> EngineResult<()> {
        let supervisor = self.supervisor.lock().await;
        let supervisor = supervisor.as_ref().ok_or(EngineError::NotStarted)?;
        supervisor.state().update(go);
        Ok(())
    }

    /// Turns the Offload policy bit off: subsequent `submit` calls take the
    /// fail-open/broken-pool path instead of reaching a worker, independent
    /// of the go/no-go State Proxy. `sticky` keeps it off across a later
    /// `start_workers` success (which would otherwise re-enable it once the
    /// pool confirms loaded).
    pub fn disable_offload(&self, sticky: bool) {
        self.offload_enabled.store(false, Ordering::SeqCst);
        if sticky {
            self.offload_force_disabled.store(true, Ordering::SeqCst);
        }
    }

    /// Turns the Offload policy bit on. `force` also clears a prior sticky
    /// disable, overriding it; without `force`, a sticky disable keeps
    /// offload off even though this call asked to enable it.
    pub fn enable_offload(&self, force: bool) {
        if force {
            self.offload_force_disabled.store(false, Ordering::SeqCst);
        }
        if force || !self.offload_force_disabled.load(Ordering::SeqCst) {
            self.offload_enabled.store(true, Ordering::SeqCst);
        }
    }

    pub fn disable_fail_open(&self) {
        self.fail_open.store(false, Ordering::SeqCst);
    }

    pub async fn update_log_level(&self, level: Severity) -> EngineResult<()> {
        let supervisor = self.supervisor.lock().await;
        supervisor.as_ref().ok_or(EngineError::NotStarted)?;
        let _ = self.control_tx.send(ControlMessage::LogLevel(level));
        Ok(())
    }

    pub async fn current_state(&self) -> EngineResult<bool> {
        let supervisor = self.supervisor.lock().await;
        let supervisor = supervisor.as_ref().ok_or(EngineError::NotStarted)?;
        Ok(supervisor.state().is_go())
    }

    pub async fn processes_started(&self) -> bool {
        self.supervisor
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.current_process_count() > 0)
    }

    pub async fn current_process_count(&self) -> usize {
        self.supervisor.lock().await.as_ref().map_or(0, |s| s.current_process_count())
    }

    pub async fn wait_for_process_start(&self, timeout: Duration) -> EngineResult<()> {
        self.poll_until(timeout, || async { self.processes_started().await }).await
    }

    /// Waits for at least one worker to have come up. A literal "every
    /// worker acked" signal isn't separately tracked past `start_workers`'s
    /// own handshake window, so this and [`Engine::wait_for_process_start`]
    /// share an implementation; see the design ledger.
    pub async fn wait_for_complete_load(&self, timeout: Duration) -> EngineResult<()> {
        self.wait_for_process_start(timeout).await
    }

    async fn poll_until<F, Fut>(&self, timeout: Duration, mut condition: F) -> EngineResult<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::NotStarted);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Spawns the worker pool, re-execing `worker_binary` (almost always
    /// `std::env::current_exe()`) once per effective worker.
    pub async fn start_workers(&self, worker_binary: impl AsRef<Path>) -> EngineResult<()> {
        self.prepare_globals().await?;
        let mut supervisor_slot = self.supervisor.lock().await;
        if supervisor_slot.is_some() {
            return Err(EngineError::AlreadyStarted);
        }
        let mut supervisor = PoolSupervisor::new(
            self.config.clone(),
            worker_binary.as_ref().to_path_buf(),
            self.lock_path.clone(),
            self.control_tx.clone(),
        );
        supervisor.start().await?;
        // Marks offload loaded-and-enabled on success, unless a caller
        // force-disabled it first; on failure to load, offload stays off
        // and submissions take the fail-open/broken-pool path.
        if supervisor.is_loaded() && !self.offload_force_disabled.load(Ordering::SeqCst) {
            self.offload_enabled.store(true, Ordering::SeqCst);
        } else {
            self.offload_enabled.store(false, Ordering::SeqCst);
        }
        *supervisor_slot = Some(supervisor);
        Ok(())
    }

    pub async fn stop(&self) -> EngineResult<()> {
        let mut supervisor_slot = self.supervisor.lock().await;
        let supervisor = supervisor_slot.as_mut().ok_or(EngineError::NotStarted)?;
        supervisor.stop().await
    }

    /// Submits one unit of work, returning a [`WorkFuture`] immediately.
    /// Rejects if the pool has not started, has been stopped, or is no-go.
    /// Otherwise routes to a worker when the pool is loaded and the Offload
    /// policy bit is enabled; falls back to running the task inline (never
    /// touching a worker process) when fail-open is on, or raises
    /// `BrokenPool` otherwise.
    pub async fn submit(
        &self,
        task_name: impl Into<String>,
        args: Value,
        kwargs: Value,
        is_streamed: bool,
        handler: Box<dyn offload_request::ResultHandler>,
    ) -> EngineResult<WorkFuture> {
        let task_name = task_name.into();
        let id = self.request_ids.next();
        let supervisor_slot = self.supervisor.lock().await;
        let supervisor = supervisor_slot.as_ref().ok_or(EngineError::NotStarted)?;

        if supervisor.is_stopped() {
            return Err(EngineError::Stopped);
        }
        if supervisor.state().is_no_go() {
            return Err(EngineError::NoGo);
        }

        let can_offload = supervisor.is_loaded()
            && supervisor.current_process_count() > 0
            && self.offload_enabled.load(Ordering::SeqCst);

        if !can_offload {
            if self.fail_open.load(Ordering::SeqCst) {
                drop(supervisor_slot);
                return Ok(self.run_inline(id, task_name, args, kwargs, handler).await);
            }
            return Err(EngineError::BrokenPool);
        }

        let (result_tx, result_rx) = tokio::sync::mpsc::channel(8);
        let envelope = WorkEnvelope {
            id,
            task_name,
            args,
            kwargs,
            is_streamed,
        };
        let submission_tx = supervisor.submission_sender()?;
        let router = supervisor.result_router();
        drop(supervisor_slot);

        submission_tx
            .send(Submission { envelope, result_tx })
            .await
            .map_err(|_| EngineError::BrokenPool)?;

        let join = tokio::spawn(offload_request::run_handler(result_rx, handler));
        Ok(WorkFuture {
            id,
            router: Some(router),
            join,
        })
    }

    async fn run_inline(
        &self,
        id: offload_protocol::RequestId,
        task_name: String,
        args: Value,
        kwargs: Value,
        handler: Box<dyn offload_request::ResultHandler>,
    ) -> WorkFuture {
        let registry = self.task_registry_snapshot().await;
        let join = tokio::spawn(async move {
            let task = registry
                .get(&task_name)
                .ok_or_else(|| offload_error::WorkError::internal(format!("unknown task: {task_name}")))?;
            let ctl = TaskControl::new(Arc::new(AtomicBool::new(true)));
            let outcome = tokio::task::spawn_blocking(move || task.call(args, kwargs, &ctl))
                .await
                .map_err(|e| offload_error::WorkError::internal(format!("task panicked: {e}")))??;
            finalize_inline(outcome, handler)
        });
        WorkFuture { id, router: None, join }
    }
}

fn finalize_inline(outcome: TaskOutcome, mut handler: Box<dyn offload_request::ResultHandler>) -> WorkResult<Value> {
    match outcome {
        TaskOutcome::Single(value) => {
            handler.on_value(value);
        }
        TaskOutcome::Stream(items) => {
            for value in items {
                handler.on_value(value);
            }
        }
    }
    Ok(handler.finalize())
}
