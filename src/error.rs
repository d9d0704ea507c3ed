//! Error types used by the eventvisor runtime and its observers.
//!
//! This module defines the failure taxonomy of a session:
//!
//! - [`EscapeSignal`] — control signal raised *by* an observer (KILL / ABORT).
//! - [`ObserverError`] — what an observer hook returns on failure.
//! - [`BroadcastError`] — errors raised by the [`Broadcaster`](crate::Broadcaster).
//! - [`ScheduleError`] — caller errors of the [`Scheduler`](crate::Scheduler).
//! - [`SessionError`] — invalid transitions and setup errors of a [`Session`](crate::Session).
//! - [`TimelineError`] — malformed timeline lines.
//! - [`RegistryError`] — observer registry lookups.
//!
//! All types provide `as_label` for logs/metrics.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::core::SessionState;

/// Boxed error returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Kind of an [`EscapeSignal`].
///
/// `Abort` has priority over `Kill` when both are raised in the same heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Halt the session immediately, no further hooks.
    Kill,
    /// Run the full abort sequence, including the abort broadcast.
    Abort,
}

impl SignalKind {
    /// Priority used when several signals are captured at once (higher wins).
    pub(crate) fn priority(self) -> u8 {
        match self {
            SignalKind::Kill => 1,
            SignalKind::Abort => 2,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Kill => f.write_str("KILL"),
            SignalKind::Abort => f.write_str("ABORT"),
        }
    }
}

/// # Control signal raised by an observer.
///
/// Not an ordinary failure: an escape signal raised from a heartbeat hook
/// crosses the per-observer sandbox and reaches the caller of
/// [`Broadcaster::broadcast_heartbeat`](crate::Broadcaster::broadcast_heartbeat).
/// Everywhere else it is logged like any other failure.
///
/// # Example
/// ```
/// use eventvisor::{EscapeSignal, SignalKind};
///
/// let sig = EscapeSignal::abort("error budget exhausted");
/// assert_eq!(sig.kind(), SignalKind::Abort);
/// assert_eq!(sig.as_label(), "escape_abort");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} requested: {reason}")]
pub struct EscapeSignal {
    kind: SignalKind,
    reason: String,
}

impl EscapeSignal {
    /// Creates a signal of the given kind.
    pub fn new(kind: SignalKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Requests an immediate halt.
    pub fn kill(reason: impl Into<String>) -> Self {
        Self::new(SignalKind::Kill, reason)
    }

    /// Requests the abort sequence.
    pub fn abort(reason: impl Into<String>) -> Self {
        Self::new(SignalKind::Abort, reason)
    }

    /// Returns the signal kind.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Returns the reason given by the observer.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.kind {
            SignalKind::Kill => "escape_kill",
            SignalKind::Abort => "escape_abort",
        }
    }
}

/// # Errors returned by observer hooks.
///
/// `Failed` is caught at the per-observer boundary and logged; `Escape` is a
/// control signal (see [`EscapeSignal`]).
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum ObserverError {
    /// Ordinary failure, isolated to the observer that raised it.
    #[error("observer failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// Escape signal raised from inside the hook.
    #[error(transparent)]
    Escape(#[from] EscapeSignal),
}

impl ObserverError {
    /// Builds an ordinary failure from any displayable cause.
    pub fn fail(error: impl fmt::Display) -> Self {
        ObserverError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ObserverError::Failed { .. } => "observer_failed",
            ObserverError::Escape(sig) => sig.as_label(),
        }
    }
}

/// # Errors produced by the broadcaster.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// An observer was registered with an empty name.
    #[error("observer #{index} has an empty name")]
    EmptyName {
        /// Registration index of the offending observer.
        index: usize,
    },

    /// Two observers share the same name.
    #[error("duplicate observer name {name:?}")]
    DuplicateName {
        /// The clashing name.
        name: String,
    },

    /// The check pass did not complete within the fan-out ceiling.
    #[error("check broadcast exceeded the fan-out ceiling of {ceiling:?}")]
    CheckTimedOut {
        /// The configured ceiling.
        ceiling: Duration,
    },

    /// The broadcaster's task pool was already shut down.
    #[error("broadcaster is shut down")]
    ShutDown,
}

impl BroadcastError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BroadcastError::EmptyName { .. } => "broadcast_empty_name",
            BroadcastError::DuplicateName { .. } => "broadcast_duplicate_name",
            BroadcastError::CheckTimedOut { .. } => "broadcast_check_timed_out",
            BroadcastError::ShutDown => "broadcast_shut_down",
        }
    }
}

/// Timer facility of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Fixed-rate heartbeat.
    Heartbeat,
    /// One-shot custom event timeline.
    Timeline,
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timer::Heartbeat => f.write_str("heartbeat"),
            Timer::Timeline => f.write_str("timeline"),
        }
    }
}

/// # Errors produced by the scheduler.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// The timer was started twice without an intervening `shutdown_now`.
    #[error("{timer} timer already started")]
    AlreadyStarted {
        /// Which timer.
        timer: Timer,
    },
}

impl ScheduleError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ScheduleError::AlreadyStarted { .. } => "schedule_already_started",
        }
    }
}

/// # Errors produced by the session controller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SessionError {
    /// Requested transition is not in the allowed-edge table.
    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },

    /// Broadcaster setup or check pass failed.
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// Scheduler refused to start a timer.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    /// Observer resolution failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::InvalidTransition { .. } => "session_invalid_transition",
            SessionError::Broadcast(e) => e.as_label(),
            SessionError::Schedule(e) => e.as_label(),
            SessionError::Registry(e) => e.as_label(),
        }
    }
}

/// # Errors produced while parsing a timeline.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// A line does not follow `duration|name(description)|settings`.
    #[error("malformed timeline line {line} ({content:?}): {reason}")]
    Format {
        /// 1-based line number.
        line: usize,
        /// The trimmed line.
        content: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl TimelineError {
    pub(crate) fn format(line: usize, content: &str, reason: impl Into<String>) -> Self {
        TimelineError::Format {
            line,
            content: content.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TimelineError::Format { .. } => "timeline_format",
        }
    }
}

/// # Errors produced by the observer registry.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No factory registered under that name.
    #[error("unknown observer {name:?}")]
    Unknown {
        /// Requested name.
        name: String,
    },

    /// A factory was already registered under that name.
    #[error("observer {name:?} already registered")]
    Duplicate {
        /// Clashing name.
        name: String,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Unknown { .. } => "registry_unknown",
            RegistryError::Duplicate { .. } => "registry_duplicate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_converts_into_observer_error() {
        let err: ObserverError = EscapeSignal::kill("stop").into();
        assert_eq!(err.as_label(), "escape_kill");
        assert_eq!(err.to_string(), "KILL requested: stop");
    }

    #[test]
    fn abort_outranks_kill() {
        assert!(SignalKind::Abort.priority() > SignalKind::Kill.priority());
    }

    #[test]
    fn fail_keeps_message() {
        let err = ObserverError::fail("disk full");
        assert_eq!(err.to_string(), "observer failed: disk full");
        assert_eq!(err.as_label(), "observer_failed");
    }
}
