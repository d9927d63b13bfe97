use offload_error::StatusCode;
use offload_error::WorkError;
use offload_protocol::RequestId;

/// The state machine a [`WorkRequest`] moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Initial,
    Started,
    Cancelled,
    Completed,
    Error,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Cancelled | RequestState::Completed | RequestState::Error
        )
    }

    /// Whether `self -> next` is an allowed transition.
    fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Initial, Started) | (Initial, Cancelled) | (Started, Cancelled) | (Started, Completed) | (Started, Error)
        )
    }
}

/// One unit of work and its state machine.
///
/// The send endpoint of the result pipe (here, a channel sender) is owned by
/// this value for the life of the request; `cancel()` closes it, which is
/// how a worker observes a broken pipe and self-cancels.
pub struct WorkRequest {
    pub id: RequestId,
    pub task_name: String,
    pub is_streamed: bool,
    state: RequestState,
}

impl WorkRequest {
    pub fn new(id: RequestId, task_name: impl Into<String>, is_streamed: bool) -> Self {
        Self {
            id,
            task_name: task_name.into(),
            is_streamed,
            state: RequestState::Initial,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == RequestState::Cancelled
    }

    /// Attempt a transition, enforcing the terminal-states table.
    ///
    /// Any attempt to re-transition a terminal state, or to take a
    /// transition absent from the table, is a work error.
    pub fn transition(&mut self, next: RequestState) -> Result<(), WorkError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            Ok(())
        } else if self.state.is_terminal() {
            Err(WorkError::new(
                format!(
                    "request {} is already terminal ({:?}); cannot transition to {:?}",
                    self.id, self.state, next
                ),
                StatusCode::Internal,
            ))
        } else {
            Err(WorkError::new(
                format!(
                    "request {} cannot transition from {:?} to {:?}",
                    self.id, self.state, next
                ),
                StatusCode::Internal,
            ))
        }
    }

    /// `cancel()` before run, or a no-go state observed at dispatch.
    pub fn cancel(&mut self) -> Result<(), WorkError> {
        self.transition(RequestState::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_protocol::RequestIdGenerator;

    fn new_request() -> WorkRequest {
        let gen = RequestIdGenerator::new();
        WorkRequest::new(gen.next(), "double", false)
    }

    #[test]
    fn starts_at_initial() {
        let req = new_request();
        assert_eq!(req.state(), RequestState::Initial);
    }

    #[test]
    fn initial_to_started_to_completed_is_allowed() {
        let mut req = new_request();
        req.transition(RequestState::Started).unwrap();
        req.transition(RequestState::Completed).unwrap();
        assert_eq!(req.state(), RequestState::Completed);
        assert!(req.state().is_terminal());
    }

    #[test]
    fn initial_to_cancelled_is_allowed() {
        let mut req = new_request();
        req.cancel().unwrap();
        assert_eq!(req.state(), RequestState::Cancelled);
        assert!(req.is_cancelled());
    }

    #[test]
    fn re_entering_a_terminal_state_is_an_error() {
        let mut req = new_request();
        req.transition(RequestState::Started).unwrap();
        req.transition(RequestState::Completed).unwrap();
        let err = req.transition(RequestState::Error).unwrap_err();
        assert_eq!(err.status_code, StatusCode::Internal);
    }

    #[test]
    fn started_cannot_go_back_to_initial() {
        let mut req = new_request();
        req.transition(RequestState::Started).unwrap();
        assert!(req.transition(RequestState::Initial).is_err());
    }

    #[test]
    fn started_can_transition_to_error_on_callable_failure() {
        let mut req = new_request();
        req.transition(RequestState::Started).unwrap();
        req.transition(RequestState::Error).unwrap();
        assert_eq!(req.state(), RequestState::Error);
    }
}
