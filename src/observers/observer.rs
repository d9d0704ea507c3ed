//! # Core observer trait
//!
//! `Observer` is the extension point for plugging session observers into the
//! runtime. Every hook is invoked from its own task spawned by the
//! [`Broadcaster`](crate::Broadcaster), concurrently with the other observers.
//!
//! ## Contract
//! - Hooks may be slow (I/O, polling) — they do **not** block other observers,
//!   but a broadcast waits for them up to the fan-out ceiling.
//! - Returning [`ObserverError::Failed`] (or panicking) is logged and isolated.
//! - Returning [`ObserverError::Escape`] from [`Observer::heartbeat`] halts the
//!   session; from any other hook it is only logged.
//! - [`Observer::name`] must be stable, unique and non-empty.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use eventvisor::{EscapeSignal, Observer, ObserverError, Verdict};
//!
//! struct ErrorBudget;
//!
//! #[async_trait]
//! impl Observer for ErrorBudget {
//!     fn name(&self) -> &str { "error-budget" }
//!
//!     async fn heartbeat(&self) -> Result<(), ObserverError> {
//!         let exhausted = false; // poll the system under test...
//!         if exhausted {
//!             return Err(EscapeSignal::abort("error budget exhausted").into());
//!         }
//!         Ok(())
//!     }
//!
//!     async fn check(&self) -> Result<Verdict, ObserverError> {
//!         Ok(Verdict::success("budget intact"))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ObserverError;
use crate::observers::check::Verdict;
use crate::timeline::TimelineEntry;

/// Contract for session observers.
///
/// All hooks default to a no-op so implementations override only what they need.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Stable, unique, non-empty name (used in logs and check results).
    fn name(&self) -> &str;

    /// Implementation kind reported in check results.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once before the run starts.
    async fn before_run(&self) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called once after the run stopped normally.
    async fn after_run(&self) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called on every heartbeat tick. The designated channel for escape signals.
    async fn heartbeat(&self) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called when the run is aborted (instead of [`after_run`](Observer::after_run)).
    async fn abort(&self) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Called when a timeline entry fires.
    async fn custom_event(&self, _entry: &TimelineEntry) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Judges the run. Defaults to [`CheckStatus::Unknown`](crate::CheckStatus::Unknown).
    async fn check(&self) -> Result<Verdict, ObserverError> {
        Ok(Verdict::unknown("check not implemented"))
    }
}
