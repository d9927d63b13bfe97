//! Unified status codes for error classification.
//!
//! Status code format: XX_YYY (5-digit)
//! - XX = Category (00-99)
//! - YYY = Code within category (000-999)

use strum::AsRefStr;
use strum::EnumIter;
use strum::FromRepr;

/// Status code metadata.
#[derive(Debug, Clone, Copy)]
pub struct StatusMeta {
    pub retryable: bool,
    pub log_error: bool,
    pub category: StatusCategory,
}

/// Status code category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// Success (00_xxx)
    Success,
    /// Common/internal errors (01_xxx)
    Common,
    /// Parameter/validation errors (02_xxx)
    Input,
    /// Lifecycle/pool errors (03_xxx)
    Lifecycle,
    /// Resource limits (04_xxx)
    Resource,
}

macro_rules! define_status_codes {
    ($(
        $(#[$attr:meta])*
        $name:ident = $value:expr => {
            retryable: $retry:expr,
            log_error: $log:expr,
            category: $cat:ident $(,)?
        }
    ),* $(,)?) => {
        /// Status codes for error classification.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, EnumIter, FromRepr)]
        #[repr(i32)]
        pub enum StatusCode {
            $($(#[$attr])* $name = $value,)*
        }

        impl StatusCode {
            /// Returns the metadata for this status code.
            pub const fn meta(&self) -> StatusMeta {
                match self {
                    $(Self::$name => StatusMeta {
                        retryable: $retry,
                        log_error: $log,
                        category: StatusCategory::$cat,
                    },)*
                }
            }

            /// Returns the string name of this status code.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }
        }

        const _: () = {
            const CODES: &[i32] = &[$($value),*];
            const fn check_unique() {
                let mut i = 0;
                while i < CODES.len() {
                    let mut j = i + 1;
                    while j < CODES.len() {
                        if CODES[i] == CODES[j] {
                            panic!("duplicate status code value");
                        }
                        j += 1;
                    }
                    i += 1;
                }
            }
            check_unique();
        };
    };
}

define_status_codes! {
    // ====== Success (00_xxx) ======
    Success = 00_000 => { retryable: false, log_error: false, category: Success },

    // ====== Common errors (01_xxx) ======
    /// Unknown/unclassified failure.
    Unknown = 01_000 => { retryable: false, log_error: true, category: Common },
    /// Internal invariant violation (e.g. illegal state transition).
    Internal = 01_001 => { retryable: false, log_error: true, category: Common },
    /// Cooperative cancellation, from either side of the pipe.
    Cancelled = 01_002 => { retryable: false, log_error: false, category: Common },
    /// The callable itself raised/returned an error.
    WorkFailed = 01_003 => { retryable: false, log_error: true, category: Common },

    // ====== Input/validation errors (02_xxx) ======
    InvalidArguments = 02_000 => { retryable: false, log_error: false, category: Input },
    /// A name, kind, or handler was registered twice.
    DuplicateRegistration = 02_001 => { retryable: false, log_error: false, category: Input },
    /// A user notification kind collided with a built-in kind.
    NonDisjointNotificationKind = 02_002 => { retryable: false, log_error: false, category: Input },

    // ====== Lifecycle/pool errors (03_xxx) ======
    /// `start_workers` called more than once.
    AlreadyStarted = 03_000 => { retryable: false, log_error: false, category: Lifecycle },
    /// An operation requires `start_workers` to have run first.
    NotStarted = 03_001 => { retryable: false, log_error: false, category: Lifecycle },
    /// `stop` has already been called; the pool is shutting down or gone.
    Stopped = 03_002 => { retryable: false, log_error: false, category: Lifecycle },
    /// A registration call happened after `start_workers`.
    RegisteredAfterStart = 03_003 => { retryable: false, log_error: false, category: Lifecycle },
    /// No healthy worker pool and fail-open is disabled.
    BrokenPool = 03_004 => { retryable: true, log_error: true, category: Lifecycle },
    /// The engine-wide state is no-go.
    NoGo = 03_005 => { retryable: false, log_error: false, category: Lifecycle },

    // ====== Resource/timeout errors (04_xxx) ======
    Timeout = 04_000 => { retryable: true, log_error: false, category: Resource },
    /// A bounded queue could not accept a submission in time.
    QueueFull = 04_001 => { retryable: true, log_error: false, category: Resource },
}

impl StatusCode {
    pub fn is_success(code: i32) -> bool {
        Self::Success as i32 == code
    }

    pub const fn is_retryable(&self) -> bool {
        self.meta().retryable
    }

    pub const fn should_log_error(&self) -> bool {
        self.meta().log_error
    }

    pub const fn category(&self) -> StatusCategory {
        self.meta().category
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        Self::from_repr(value)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn status_code_values_follow_the_category_prefix() {
        assert_eq!(StatusCode::Success as i32, 00_000);
        assert_eq!(StatusCode::Unknown as i32, 01_000);
        assert_eq!(StatusCode::InvalidArguments as i32, 02_000);
        assert_eq!(StatusCode::AlreadyStarted as i32, 03_000);
        assert_eq!(StatusCode::Timeout as i32, 04_000);
    }

    #[test]
    fn is_success_only_matches_the_success_code() {
        assert!(StatusCode::is_success(0));
        assert!(!StatusCode::is_success(01_000));
    }

    #[test]
    fn retryable_rules_match_the_spec() {
        assert!(StatusCode::Timeout.is_retryable());
        assert!(StatusCode::QueueFull.is_retryable());
        assert!(StatusCode::BrokenPool.is_retryable());
        assert!(!StatusCode::Cancelled.is_retryable());
        assert!(!StatusCode::InvalidArguments.is_retryable());
        assert!(!StatusCode::NoGo.is_retryable());
    }

    #[test]
    fn log_error_rules_match_the_spec() {
        assert!(StatusCode::Unknown.should_log_error());
        assert!(StatusCode::Internal.should_log_error());
        assert!(StatusCode::WorkFailed.should_log_error());
        assert!(StatusCode::BrokenPool.should_log_error());
        assert!(!StatusCode::InvalidArguments.should_log_error());
        assert!(!StatusCode::Cancelled.should_log_error());
    }

    #[test]
    fn display_and_name_agree() {
        assert_eq!(format!("{}", StatusCode::Success), "Success");
        assert_eq!(format!("{}", StatusCode::NoGo), "NoGo");
        assert_eq!(StatusCode::Success.name(), "Success");
        assert_eq!(StatusCode::NotStarted.name(), "NotStarted");
    }

    #[test]
    fn category_matches_the_code_prefix() {
        assert_eq!(StatusCode::Success.category(), StatusCategory::Success);
        assert_eq!(StatusCode::Unknown.category(), StatusCategory::Common);
        assert_eq!(StatusCode::InvalidArguments.category(), StatusCategory::Input);
        assert_eq!(StatusCode::AlreadyStarted.category(), StatusCategory::Lifecycle);
        assert_eq!(StatusCode::Timeout.category(), StatusCategory::Resource);
    }

    #[test]
    fn every_code_s_category_matches_its_numeric_prefix() {
        for code in StatusCode::iter() {
            let meta = code.meta();
            let value = code as i32;
            match meta.category {
                StatusCategory::Success => assert_eq!(value, 0),
                StatusCategory::Common => assert!((01_000..02_000).contains(&value)),
                StatusCategory::Input => assert!((02_000..03_000).contains(&value)),
                StatusCategory::Lifecycle => assert!((03_000..04_000).contains(&value)),
                StatusCategory::Resource => assert!((04_000..05_000).contains(&value)),
            }
        }
    }
}
