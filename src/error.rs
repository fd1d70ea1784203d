//! Error types used by the hostvisor runtime, hosted capabilities and tasks.
//!
//! This module defines three error enums:
//!
//! - [`TaskError`]: errors raised by tasks, capabilities and lifecycle transitions.
//! - [`RuntimeError`]: errors raised by the process bootstrap.
//! - [`ConfigError`]: errors raised while reading configuration.
//!
//! [`TaskError`] and [`RuntimeError`] provide helper methods (`as_label`, `as_message`)
//! for logging.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the process bootstrap.
///
/// A bootstrap failure always names the service it was driving and carries the
/// [`TaskError`] returned by the lifecycle transition, untouched.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The hosted service failed to start (or did not start within the startup budget).
    #[error("server {server:?} failed to start: {source}")]
    StartFailure {
        /// Name of the hosted capability.
        server: String,
        /// Error returned by the start transition.
        #[source]
        source: TaskError,
    },

    /// The hosted service failed to stop (or did not stop within the shutdown budget).
    #[error("server {server:?} failed to stop: {source}")]
    StopFailure {
        /// Name of the hosted capability.
        server: String,
        /// Error returned by the stop transition.
        #[source]
        source: TaskError,
    },

    /// Registering OS signal listeners failed.
    #[error("failed to listen for shutdown signals: {source}")]
    Signal {
        /// Error returned by the signal listener.
        #[source]
        source: std::io::Error,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use hostvisor::{RuntimeError, TaskError};
    ///
    /// let err = RuntimeError::StartFailure { server: "api".into(), source: TaskError::Canceled };
    /// assert_eq!(err.as_label(), "runtime_start_failure");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::StartFailure { .. } => "runtime_start_failure",
            RuntimeError::StopFailure { .. } => "runtime_stop_failure",
            RuntimeError::Signal { .. } => "runtime_signal",
        }
    }

    /// Returns the underlying task error, if any.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            RuntimeError::StartFailure { source, .. }
            | RuntimeError::StopFailure { source, .. } => Some(source),
            RuntimeError::Signal { .. } => None,
        }
    }
}

/// # Errors produced by tasks and hosted capabilities.
///
/// `Timeout` is reported by the task runner itself and is never a wrapped
/// version of an error returned by the task.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The runner's wait window expired before the task completed.
    ///
    /// Advisory: the task may still be running.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout window that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable error (panics, invalid lifecycle transitions).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The task itself returned a domain error.
    #[error("{error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task was cancelled before producing an outcome.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        TaskError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use hostvisor::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            TaskError::Fatal { error } => format!("fatal: {error}"),
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }

    /// Returns `true` for [`TaskError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// Nothing in hostvisor retries automatically; this is a hint for callers.
    ///
    /// ```
    /// use hostvisor::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Fail { .. } | TaskError::Timeout { .. })
    }
}

/// # Errors produced while reading configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment tag is not one of `local`, `test`, `prod`.
    #[error("unknown environment {0:?} (expected local, test or prod)")]
    UnknownEnv(String),

    /// A numeric setting could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_displays_message_verbatim() {
        let err = TaskError::fail("example error");
        assert_eq!(err.to_string(), "example error");
        assert_eq!(err.as_label(), "task_failed");
    }

    #[test]
    fn timeout_is_distinct_kind() {
        let err = TaskError::Timeout {
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert!(!TaskError::fail("timeout").is_timeout());
    }

    #[test]
    fn messages_and_retry_hints_follow_the_kind() {
        let timeout = TaskError::Timeout {
            timeout: Duration::from_secs(2),
        };
        assert_eq!(timeout.as_message(), "timeout: 2s");
        assert!(timeout.is_retryable());

        assert_eq!(TaskError::fail("busy").as_message(), "error: busy");
        assert_eq!(TaskError::fatal("bad config").as_message(), "fatal: bad config");
        assert!(!TaskError::fatal("bad config").is_retryable());
        assert!(!TaskError::Canceled.is_retryable());
    }

    #[test]
    fn runtime_error_exposes_source() {
        let err = RuntimeError::StopFailure {
            server: "queue".into(),
            source: TaskError::fail("broken pipe"),
        };
        assert_eq!(err.task_error(), Some(&TaskError::fail("broken pipe")));
        assert_eq!(
            err.to_string(),
            "server \"queue\" failed to stop: broken pipe"
        );
    }
}
