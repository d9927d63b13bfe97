use serde::Deserialize;
use serde::Serialize;

use crate::severity::Severity;

/// The two members of the built-in `TEST` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    /// The handshake probe every worker must see first.
    Initial,
    /// Periodic heartbeat from the Control Dispatcher.
    Keepalive,
}

/// The two members of the built-in `SHUTDOWN` kind.
///
/// `Safe` and `Immediate` are
/// behaviourally identical in this implementation until a design decision
/// distinguishes "let current work finish" from "interrupt in-flight work."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownKind {
    Safe,
    Immediate,
}

/// A built-in or user-registered control notification, fanned out to every
/// worker by the Control Dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage {
    Test(TestKind),
    Shutdown(ShutdownKind),
    /// `true` = go, `false` = no-go.
    StateChange(bool),
    LogLevel(Severity),
    /// A user-registered notification. `kind` must be disjoint from every
    /// built-in discriminant space (see [`is_reserved_kind`]).
    Custom { kind: i32 },
}

impl ControlMessage {
    pub fn is_custom(&self) -> bool {
        matches!(self, ControlMessage::Custom { .. })
    }
}

/// Built-in kinds occupy no integer space of their own today (they are a
/// distinct Rust enum variant, not an `i32`), so any `i32` a caller proposes
/// for a custom kind is automatically disjoint from them. This check exists
/// so that future built-ins can reserve a range without silently breaking
/// existing custom registrations, and so registration can fail the same way
/// disjoint from the four built-in kinds above.
pub fn is_reserved_kind(_kind: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_message_round_trips_through_json() {
        let msg = ControlMessage::Custom { kind: 7 };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, msg);
        assert!(parsed.is_custom());
    }

    #[test]
    fn built_in_kinds_are_not_custom() {
        assert!(!ControlMessage::Test(TestKind::Initial).is_custom());
        assert!(!ControlMessage::Shutdown(ShutdownKind::Safe).is_custom());
        assert!(!ControlMessage::StateChange(true).is_custom());
    }

    #[test]
    fn no_kind_is_reserved_today() {
        assert!(!is_reserved_kind(0));
        assert!(!is_reserved_kind(i32::MAX));
    }
}
