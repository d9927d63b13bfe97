use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::request_id::RequestId;

/// A work unit as it travels from the parent's Work Dispatcher to a worker's
/// Work Loop over that worker's duplex connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkEnvelope {
    pub id: RequestId,
    pub task_name: String,
    pub args: Value,
    pub kwargs: Value,
    pub is_streamed: bool,
}

/// One frame of the typed tagged-union carried by the result pipe.
/// Never an in-band sentinel inside `Value` —
/// the state is its own discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResultFrame {
    Started,
    Value(Value),
    Completed,
    Cancelled,
    Error(String),
}

impl ResultFrame {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultFrame::Completed | ResultFrame::Cancelled | ResultFrame::Error(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_id::RequestIdGenerator;

    #[test]
    fn terminal_frames_are_identified() {
        assert!(ResultFrame::Completed.is_terminal());
        assert!(ResultFrame::Cancelled.is_terminal());
        assert!(ResultFrame::Error("boom".into()).is_terminal());
        assert!(!ResultFrame::Started.is_terminal());
        assert!(!ResultFrame::Value(Value::Null).is_terminal());
    }

    #[test]
    fn work_envelope_round_trips_through_json() {
        let gen = RequestIdGenerator::new();
        let envelope = WorkEnvelope {
            id: gen.next(),
            task_name: "double".into(),
            args: serde_json::json!([21]),
            kwargs: serde_json::json!({}),
            is_streamed: false,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: WorkEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_name, "double");
        assert_eq!(parsed.args, serde_json::json!([21]));
    }
}
