//! Logging helpers for results whose failure must not abort the caller.
//!
//! Notifications and executor handoffs are best-effort: a failure is
//! logged with its call site and then swallowed. `ResultExt` keeps that
//! pattern to a single method call at the use site.

use std::fmt::Display;

/// Extension trait for logging errors with context.
pub trait ResultExt<T, E> {
    /// Log the error with context if this is an `Err` variant.
    ///
    /// Returns the original `Result` unchanged.
    ///
    /// ```ignore
    /// use sqlgate_control_plane::result_ext::ResultExt;
    ///
    /// let _ = notifier.notify(&event).await.log("notifying reviewers");
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;

    /// Log the error as a warning and discard it.
    fn swallow<S: ToString>(self, context: S) -> Option<T>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            tracing::error!(
                target: "sqlgate_control_plane",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }

    #[track_caller]
    fn swallow<S: ToString>(self, context: S) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                let caller_location = std::panic::Location::caller();
                tracing::warn!(
                    target: "sqlgate_control_plane",
                    error = %e,
                    file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                    context = %context.to_string(),
                    "Best-effort operation failed, continuing"
                );
                None
            }
        }
    }
}

/// Extension trait for logging missing values.
pub trait OptionResultExt<T> {
    /// Log a warning if this is a `None` variant; returns the option unchanged.
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            let caller_location = std::panic::Location::caller();
            tracing::warn!(
                target: "sqlgate_control_plane",
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Expected value was None"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_keeps_ok() {
        let result: Result<u32, &str> = Ok(7);
        assert_eq!(result.log("dispatching task"), Ok(7));
    }

    #[test]
    fn test_log_keeps_err() {
        let result: Result<u32, &str> = Err("nats unavailable");
        assert!(result.log("notifying reviewers").is_err());
    }

    #[test]
    fn test_swallow_discards_err() {
        let result: Result<u32, &str> = Err("nats unavailable");
        assert_eq!(result.swallow("notifying reviewers"), None);
    }

    #[test]
    fn test_log_none_passthrough() {
        let opt: Option<&str> = Some("u1");
        assert_eq!(opt.log_none("scheduling user"), Some("u1"));
        let missing: Option<&str> = None;
        assert!(missing.log_none("scheduling user").is_none());
    }
}
