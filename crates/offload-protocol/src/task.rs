//! The task registry: the Rust-native realization of
//! "callable descriptor."
//!
//! Worker processes are separate OS processes re-executing the same binary,
//! so a submission cannot carry an in-memory function
//! pointer across the boundary. Instead every offloadable unit of work is
//! registered once, by name, before `start_workers()`, and a submission
//! references it by that name plus JSON-serializable positional/keyword
//! arguments.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde_json::Value;

use offload_error::EngineError;
use offload_error::WorkError;

/// Read-only view of the engine-wide go/no-go state, handed to a running
/// task so a streamed callable can cooperatively cancel itself between
/// yields.
#[derive(Clone)]
pub struct TaskControl {
    go: Arc<AtomicBool>,
}

impl TaskControl {
    pub fn new(go: Arc<AtomicBool>) -> Self {
        Self { go }
    }

    /// `true` once the engine has gone no-go; a streamed task should cancel
    /// itself at the next yield boundary when this returns `true`.
    pub fn is_no_go(&self) -> bool {
        !self.go.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl TaskControl {
    pub fn for_test(go: bool) -> Self {
        Self::new(Arc::new(AtomicBool::new(go)))
    }
}

/// The outcome of calling a registered task.
pub enum TaskOutcome {
    /// A single, immediately-available value.
    Single(Value),
    /// A finite lazy sequence of values, pulled and emitted one at a time.
    Stream(Box<dyn Iterator<Item = Value> + Send>),
}

/// A registered unit of work.
///
/// Implementors should be stateless or internally synchronized: the same
/// `Task` instance is shared (via `Arc`) across every worker process that
/// loads the registry, and within a worker across sequential invocations.
pub trait Task: Send + Sync {
    fn call(&self, args: Value, kwargs: Value, ctl: &TaskControl) -> Result<TaskOutcome, WorkError>;
}

impl<F> Task for F
where
    F: Fn(Value, Value, &TaskControl) -> Result<TaskOutcome, WorkError> + Send + Sync,
{
    fn call(&self, args: Value, kwargs: Value, ctl: &TaskControl) -> Result<TaskOutcome, WorkError> {
        self(args, kwargs, ctl)
    }
}

/// The process-wide name → callable mapping.
///
/// Registration is only valid before `start_workers()`; the engine enforces
/// that by taking a `&mut TaskRegistry` during the pre-start configuration
/// phase and handing out only a read-only `Arc<TaskRegistry>` afterwards.
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under `name`. Rejects duplicate names.
    pub fn register(&mut self, name: impl Into<String>, task: Arc<dyn Task>) -> Result<(), EngineError> {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(EngineError::DuplicateRegistration(name));
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// A cheap clone (each value is an `Arc` bump) used to hand an
    /// identical registry to a re-exec'd worker process's entrypoint.
    pub fn snapshot(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling_task() -> Arc<dyn Task> {
        Arc::new(|args: Value, _kwargs: Value, _ctl: &TaskControl| {
            let n = args.get(0).and_then(Value::as_i64).unwrap_or_default();
            Ok(TaskOutcome::Single(Value::from(n * 2)))
        })
    }

    #[test]
    fn register_and_look_up_a_task() {
        let mut registry = TaskRegistry::new();
        registry.register("double", doubling_task()).unwrap();
        assert!(registry.contains("double"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register("double", doubling_task()).unwrap();
        let err = registry.register("double", doubling_task()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRegistration(name) if name == "double"));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let registry = TaskRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn task_control_reflects_go_no_go() {
        let ctl = TaskControl::for_test(true);
        assert!(!ctl.is_no_go());
        let ctl = TaskControl::for_test(false);
        assert!(ctl.is_no_go());
    }
}
