//! Helper macros used internally by the bridge.

/// Returns early with an error when a condition does not hold.
///
/// Works like `assert!` but yields `Err($error)` instead of panicking.
///
/// ```ignore
/// ensure!(content_length <= limit, RequestError::content_length_exceeds_limit(content_length, limit));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
