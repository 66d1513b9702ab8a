//! Error types for the synchronization core.
//!
//! A single `thiserror` enum covers the whole crate. Two variants carry the
//! diagnostic weight: [`SyncError::ConditionTimeout`] describes one condition
//! that failed to reach its target, and [`SyncError::WaitFailed`] aggregates
//! every failure from a wait sweep together with the success log, since in
//! this domain the error message *is* the user-visible test diagnostic.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors raised by the wait/synchronization core.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A single condition failed to reach its target within its budget.
    #[error(
        "timed out after {elapsed:?} waiting on {device}/{attribute}: \
         previous {previous}, desired {desired}, current {current}"
    )]
    ConditionTimeout {
        /// Device name
        device: String,
        /// Attribute name
        attribute: String,
        /// Value captured when the condition was set up
        previous: String,
        /// Target value, or "any change" when none was set
        desired: String,
        /// Last value observed before the timeout
        current: String,
        /// Time spent waiting
        elapsed: Duration,
    },

    /// One or more conditions in a wait set timed out.
    ///
    /// Carries both logs so partial convergence across devices stays visible.
    #[error("{}", format_wait_failure(.failures, .successes))]
    WaitFailed {
        /// Per-condition failure lines
        failures: Vec<String>,
        /// Per-condition success lines
        successes: Vec<String>,
    },

    /// A query was made for an attribute that was never subscribed.
    #[error("attribute '{attribute}' on device '{device}' is not subscribed")]
    NotSubscribed {
        /// Device name
        device: String,
        /// Attribute name
        attribute: String,
    },

    /// The device could not be reached or refused the operation.
    #[error("device '{device}' unavailable: {reason}")]
    DeviceUnavailable {
        /// Device name
        device: String,
        /// Transport-level detail
        reason: String,
    },

    /// A raw attribute reading could not be normalized.
    #[error("cannot decode attribute '{attribute}': {reason}")]
    AttributeDecode {
        /// Attribute name
        attribute: String,
        /// Decode detail
        reason: String,
    },

    /// The event channel closed before the wait completed.
    #[error("event channel closed before the wait completed")]
    ChannelClosed,

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
}

fn format_wait_failure(failures: &[String], successes: &[String]) -> String {
    let met = if successes.is_empty() {
        "(none)".to_string()
    } else {
        successes.join("\n")
    };
    format!(
        "wait failed, {} condition(s) timed out:\n{}\nconditions met:\n{}",
        failures.len(),
        failures.join("\n"),
        met
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_timeout_names_device_attribute_and_target() {
        let err = SyncError::ConditionTimeout {
            device: "low-csp/subarray/01".into(),
            attribute: "obsState".into(),
            previous: "EMPTY".into(),
            desired: "IDLE".into(),
            current: "EMPTY".into(),
            elapsed: Duration::from_secs(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("low-csp/subarray/01"));
        assert!(msg.contains("obsState"));
        assert!(msg.contains("IDLE"));
    }

    #[test]
    fn wait_failed_lists_both_logs() {
        let err = SyncError::WaitFailed {
            failures: vec!["a timed out".into(), "b timed out".into()],
            successes: vec!["c met".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 condition(s)"));
        assert!(msg.contains("a timed out"));
        assert!(msg.contains("c met"));
    }
}
