//! # Session observers.
//!
//! This module provides the [`Observer`] trait, check verdict types, the
//! [`ObserverRegistry`] factory map and built-in implementations.
//!
//! ## Architecture
//! ```text
//! Session ──► Broadcaster ──► one task per observer
//!                                   │
//!                              ┌────┴────┬─────────┬───────┐
//!                              ▼         ▼         ▼       ▼
//!                         LogObserver  Latency  Custom    ...
//! ```
//!
//! ## Observer kinds
//! - **Passive observers** — log or export lifecycle moments
//! - **Judging observers** — answer the check broadcast with a [`Verdict`]
//! - **Controlling observers** — raise an [`EscapeSignal`](crate::EscapeSignal)
//!   from their heartbeat to halt or abort the session

mod check;
#[cfg(feature = "logging")]
mod log;
mod observer;
mod registry;

pub use check::{all_passed, CheckResult, CheckStatus, Verdict};
#[cfg(feature = "logging")]
pub use log::LogObserver;
pub use observer::Observer;
pub use registry::{ObserverRef, ObserverRegistry};
