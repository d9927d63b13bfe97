//! The worker-side half of the Work Request / Result Handler protocol:
//! runs one dispatched [`WorkEnvelope`] against the [`TaskRegistry`]
//! and emits the exact `Started` / `Value`* / terminal frame sequence.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use offload_protocol::RequestId;
use offload_protocol::ResultFrame;
use offload_protocol::TaskControl;
use offload_protocol::TaskOutcome;
use offload_protocol::TaskRegistry;
use offload_protocol::WorkEnvelope;
use offload_protocol::WorkerToParent;

/// Runs `envelope` to completion, sending every frame it produces (tagged
/// with its request id) into `out`. Never panics on a missing task or a
/// task-level failure: both become an `Error` frame so the worker process
/// stays alive for the next dispatch.
pub async fn run(envelope: WorkEnvelope, registry: Arc<TaskRegistry>, go: Arc<AtomicBool>, out: mpsc::Sender<WorkerToParent>) {
    let id = envelope.id;
    let task = match registry.get(&envelope.task_name) {
        Some(task) => task,
        None => {
            send(&out, id, ResultFrame::Error(format!("unknown task: {}", envelope.task_name))).await;
            return;
        }
    };

    if !go.load(Ordering::SeqCst) {
        send(&out, id, ResultFrame::Cancelled).await;
        return;
    }

    send(&out, id, ResultFrame::Started).await;

    let ctl = TaskControl::new(go.clone());
    let args = envelope.args;
    let kwargs = envelope.kwargs;
    let outcome = tokio::task::spawn_blocking(move || task.call(args, kwargs, &ctl)).await;

    let outcome = match outcome {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(work_error)) => {
            send(&out, id, ResultFrame::Error(work_error.message)).await;
            return;
        }
        Err(join_error) => {
            send(&out, id, ResultFrame::Error(format!("task panicked: {join_error}"))).await;
            return;
        }
    };

    match outcome {
        TaskOutcome::Single(value) => {
            send(&out, id, ResultFrame::Value(value)).await;
            send(&out, id, ResultFrame::Completed).await;
        }
        TaskOutcome::Stream(mut items) => {
            loop {
                if !go.load(Ordering::SeqCst) {
                    send(&out, id, ResultFrame::Cancelled).await;
                    return;
                }
                match items.next() {
                    Some(value) => send(&out, id, ResultFrame::Value(value)).await,
                    None => break,
                }
            }
            send(&out, id, ResultFrame::Completed).await;
        }
    }
}

async fn send(out: &mpsc::Sender<WorkerToParent>, id: RequestId, frame: ResultFrame) {
    if out.send(WorkerToParent::Result { id, frame }).await.is_err() {
        tracing::warn!(request_id = %id, "parent pipe closed mid-result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use serde_json::json;

    fn registry_with_doubling_task() -> Arc<TaskRegistry> {
        let mut registry = TaskRegistry::new();
        registry
            .register(
                "double",
                Arc::new(|args: Value, _kwargs: Value, _ctl: &TaskControl| {
                    let n = args.get(0).and_then(Value::as_i64).unwrap_or_default();
                    Ok(TaskOutcome::Single(Value::from(n * 2)))
                }),
            )
            .unwrap();
        Arc::new(registry)
    }

    async fn drain(mut rx: mpsc::Receiver<WorkerToParent>) -> Vec<ResultFrame> {
        let mut frames = Vec::new();
        while let Some(WorkerToParent::Result { frame, .. }) = rx.recv().await {
            frames.push(frame);
        }
        frames
    }

    fn envelope(task_name: &str, is_streamed: bool) -> WorkEnvelope {
        WorkEnvelope {
            id: offload_protocol::RequestIdGenerator::new().next(),
            task_name: task_name.into(),
            args: json!([21]),
            kwargs: json!({}),
            is_streamed,
        }
    }

    #[tokio::test]
    async fn runs_a_registered_task_to_completion() {
        let (tx, rx) = mpsc::channel(8);
        let go = Arc::new(AtomicBool::new(true));
        run(envelope("double", false), registry_with_doubling_task(), go, tx).await;
        let frames = drain(rx).await;
        assert!(matches!(frames[0], ResultFrame::Started));
        assert!(matches!(&frames[1], ResultFrame::Value(v) if *v == Value::from(42)));
        assert!(matches!(frames[2], ResultFrame::Completed));
    }

    #[tokio::test]
    async fn unknown_task_emits_an_error_frame_with_no_started() {
        let (tx, rx) = mpsc::channel(8);
        let go = Arc::new(AtomicBool::new(true));
        run(envelope("missing", false), registry_with_doubling_task(), go, tx).await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], ResultFrame::Error(msg) if msg.contains("missing")));
    }

    #[tokio::test]
    async fn no_go_before_dispatch_short_circuits_to_cancelled() {
        let (tx, rx) = mpsc::channel(8);
        let go = Arc::new(AtomicBool::new(false));
        run(envelope("double", false), registry_with_doubling_task(), go, tx).await;
        let frames = drain(rx).await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], ResultFrame::Cancelled));
    }
}
