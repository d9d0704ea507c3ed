//! # Check verdicts
//!
//! An observer answers the check broadcast with a [`Verdict`]; the broadcaster
//! stamps it with the observer's identity and returns a [`CheckResult`].
//!
//! [`CheckStatus::Unknown`] is the sentinel used when an observer does not
//! implement checking.

use std::fmt;

/// Outcome of a single observer check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckStatus {
    /// Observer judged the run healthy.
    Success,
    /// Observer judged the run failed, or checking itself failed.
    Failure,
    /// No real check implemented.
    #[default]
    Unknown,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Success => f.write_str("SUCCESS"),
            CheckStatus::Failure => f.write_str("FAILURE"),
            CheckStatus::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// What an observer returns from [`Observer::check`](crate::Observer::check).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    /// Pass/fail status.
    pub status: CheckStatus,
    /// Free-form explanation.
    pub message: String,
}

impl Verdict {
    /// Healthy run.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Success,
            message: message.into(),
        }
    }

    /// Failed run.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Failure,
            message: message.into(),
        }
    }

    /// No opinion.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Unknown,
            message: message.into(),
        }
    }
}

/// Verdict of one observer, as returned by the check broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Observer name.
    pub observer_id: String,
    /// Observer implementation kind.
    pub observer_kind: String,
    /// Pass/fail status.
    pub status: CheckStatus,
    /// Explanation, or the failure cause for synthesized results.
    pub message: String,
}

impl CheckResult {
    pub(crate) fn from_verdict(id: &str, kind: &str, verdict: Verdict) -> Self {
        Self {
            observer_id: id.to_string(),
            observer_kind: kind.to_string(),
            status: verdict.status,
            message: verdict.message,
        }
    }

    pub(crate) fn failed(id: &str, kind: &str, cause: impl fmt::Display) -> Self {
        Self::from_verdict(id, kind, Verdict::failure(cause.to_string()))
    }

    /// True if the observer reported a failure.
    pub fn is_failure(&self) -> bool {
        self.status == CheckStatus::Failure
    }
}

/// True when no result in `results` is a failure.
///
/// `Unknown` results do not fail a run.
pub fn all_passed(results: &[CheckResult]) -> bool {
    !results.iter().any(CheckResult::is_failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_default() {
        assert_eq!(Verdict::default().status, CheckStatus::Unknown);
    }

    #[test]
    fn unknown_does_not_fail_run() {
        let results = vec![
            CheckResult::from_verdict("a", "A", Verdict::success("ok")),
            CheckResult::from_verdict("b", "B", Verdict::unknown("no check")),
        ];
        assert!(all_passed(&results));

        let mut failing = results;
        failing.push(CheckResult::failed("c", "C", "boom"));
        assert!(!all_passed(&failing));
        assert_eq!(failing[2].message, "boom");
    }
}
