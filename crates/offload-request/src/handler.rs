use serde_json::Value;

use offload_error::CancelledError;
use offload_error::StatusCode;
use offload_error::WorkError;
use offload_error::WorkResult;
use offload_protocol::ResultFrame;
use tokio::sync::mpsc;

/// The "override `handle_result` / `finalize`" extension point.
/// The default implementation ([`Handler`]) stores a single value or
/// an ordered sequence; [`FlatteningHandler`] is the streamed-merge example
/// common in streaming use (flatten list-of-lists into one list).
pub trait ResultHandler: Send {
    /// Called once per non-state value received on the pipe, in
    /// worker-emission order.
    fn on_value(&mut self, value: Value);

    /// Called exactly once, after a `Completed` frame, to produce the
    /// future's final value. Must guarantee a streamed request that
    /// produced zero values yields an empty sequence, never null.
    fn finalize(self: Box<Self>) -> Value;
}

/// The default handler: single-valued requests keep the last value seen
/// (there should only ever be one); streamed requests accumulate every
/// value into an ordered array.
pub struct Handler {
    is_streamed: bool,
    accumulator: Option<Value>,
    sequence: Vec<Value>,
}

impl Handler {
    pub fn new(is_streamed: bool) -> Self {
        Self {
            is_streamed,
            accumulator: None,
            sequence: Vec::new(),
        }
    }
}

impl ResultHandler for Handler {
    fn on_value(&mut self, value: Value) {
        if self.is_streamed {
            self.sequence.push(value);
        } else {
            self.accumulator = Some(value);
        }
    }

    fn finalize(self: Box<Self>) -> Value {
        if self.is_streamed {
            Value::Array(self.sequence)
        } else {
            self.accumulator.unwrap_or(Value::Null)
        }
    }
}

/// A streamed-merge handler: each emitted value is itself expected to be a
/// JSON array, and the final accumulator is the concatenation of all of
/// them in emission order (the "flatten list-of-lists" use case).
pub struct FlatteningHandler {
    flattened: Vec<Value>,
}

impl FlatteningHandler {
    pub fn new() -> Self {
        Self {
            flattened: Vec::new(),
        }
    }
}

impl Default for FlatteningHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultHandler for FlatteningHandler {
    fn on_value(&mut self, value: Value) {
        match value {
            Value::Array(items) => self.flattened.extend(items),
            other => self.flattened.push(other),
        }
    }

    fn finalize(self: Box<Self>) -> Value {
        Value::Array(self.flattened)
    }
}

/// Drive the parent side of the Work Request / Result Handler protocol
/// to completion, reading frames from `rx` until a terminal state
/// arrives.
pub async fn run_handler(
    mut rx: mpsc::Receiver<ResultFrame>,
    mut handler: Box<dyn ResultHandler>,
) -> WorkResult<Value> {
    match rx.recv().await {
        Some(ResultFrame::Started) => {}
        Some(ResultFrame::Cancelled) => return Err(CancelledError.into()),
        Some(ResultFrame::Error(message)) => {
            return Err(WorkError::new(message, StatusCode::WorkFailed));
        }
        Some(other) => {
            return Err(WorkError::internal(format!(
                "unexpected initial data: {other:?}"
            )));
        }
        None => return Err(CancelledError.into()),
    }

    loop {
        match rx.recv().await {
            Some(ResultFrame::Value(value)) => handler.on_value(value),
            Some(ResultFrame::Completed) => return Ok(handler.finalize()),
            Some(ResultFrame::Cancelled) => return Err(CancelledError.into()),
            Some(ResultFrame::Error(message)) => {
                return Err(WorkError::new(message, StatusCode::WorkFailed));
            }
            Some(ResultFrame::Started) => {
                return Err(WorkError::internal("duplicate Started frame"));
            }
            None => return Err(CancelledError.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn drive(frames: Vec<ResultFrame>, handler: Box<dyn ResultHandler>) -> WorkResult<Value> {
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            tx.send(frame).await.unwrap();
        }
        drop(tx);
        run_handler(rx, handler).await
    }

    #[tokio::test]
    async fn single_value_happy_path() {
        let result = drive(
            vec![
                ResultFrame::Started,
                ResultFrame::Value(Value::from(42)),
                ResultFrame::Completed,
            ],
            Box::new(Handler::new(false)),
        )
        .await
        .unwrap();
        assert_eq!(result, Value::from(42));
    }

    #[tokio::test]
    async fn streamed_values_accumulate_in_order() {
        let result = drive(
            vec![
                ResultFrame::Started,
                ResultFrame::Value(serde_json::json!([1, 2])),
                ResultFrame::Value(serde_json::json!([3])),
                ResultFrame::Completed,
            ],
            Box::new(FlatteningHandler::new()),
        )
        .await
        .unwrap();
        assert_eq!(result, serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn empty_stream_finalizes_to_empty_array_never_null() {
        let result = drive(
            vec![ResultFrame::Started, ResultFrame::Completed],
            Box::new(Handler::new(true)),
        )
        .await
        .unwrap();
        assert_eq!(result, Value::Array(vec![]));
    }

    #[tokio::test]
    async fn cancelled_mid_stream_surfaces_cancelled_error() {
        let err = drive(
            vec![
                ResultFrame::Started,
                ResultFrame::Value(Value::from(1)),
                ResultFrame::Cancelled,
            ],
            Box::new(Handler::new(true)),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn error_frame_surfaces_as_work_error() {
        let err = drive(
            vec![ResultFrame::Started, ResultFrame::Error("boom".into())],
            Box::new(Handler::new(false)),
        )
        .await
        .unwrap_err();
        assert!(!err.is_cancelled());
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn broken_pipe_before_started_maps_to_cancelled() {
        let err = drive(vec![], Box::new(Handler::new(false))).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn broken_pipe_mid_stream_maps_to_cancelled() {
        let err = drive(
            vec![ResultFrame::Started, ResultFrame::Value(Value::from(1))],
            Box::new(Handler::new(true)),
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn unexpected_initial_frame_is_a_work_error() {
        let err = drive(vec![ResultFrame::Completed], Box::new(Handler::new(false)))
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());
    }
}
