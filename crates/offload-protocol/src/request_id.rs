use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;

/// A monotonically increasing request identity that wraps at 1,000,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u32);

impl RequestId {
    pub const WRAP_AT: u32 = 1_000_000;

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates [`RequestId`] values for one parent process.
///
/// Not `Clone`: a generator is a single-writer counter; share it behind an
/// `Arc` if multiple tasks need to mint ids.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicU32,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    /// Mint the next id, wrapping back to 0 after 999,999.
    pub fn next(&self) -> RequestId {
        let id = self.next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(if current + 1 >= RequestId::WRAP_AT {
                0
            } else {
                current + 1
            })
        });
        // fetch_update always succeeds for this closure; the returned value
        // is the id *before* the update, which is the one we hand out.
        RequestId(id.expect("closure never returns None"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_before_wrap() {
        let gen = RequestIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        let c = gen.next();
        assert_eq!(a.value(), 0);
        assert_eq!(b.value(), 1);
        assert_eq!(c.value(), 2);
    }

    #[test]
    fn ids_wrap_from_999_999_to_0() {
        let gen = RequestIdGenerator {
            next: AtomicU32::new(RequestId::WRAP_AT - 1),
        };
        let last_before_wrap = gen.next();
        let wrapped = gen.next();
        assert_eq!(last_before_wrap.value(), RequestId::WRAP_AT - 1);
        assert_eq!(wrapped.value(), 0);
    }

    #[test]
    fn ids_are_never_negative_by_construction() {
        // RequestId wraps a u32, so negative values are unrepresentable.
        let gen = RequestIdGenerator::new();
        for _ in 0..10 {
            let _ = gen.next();
        }
    }
}
