//! Runtime core: fan-out, scheduling and session lifecycle.
//!
//! Public API from this module is [`Broadcaster`], [`Scheduler`], [`Session`]
//! and [`Config`].
//!
//! Internal modules:
//! - [`dispatch`]: per-observer sandbox and the fan-out task pool;
//! - [`broadcaster`]: concurrent, bounded-time broadcasts and escape signal policy;
//! - [`scheduler`]: heartbeat timer and custom event timeline;
//! - [`session`]: lifecycle state machine;
//! - [`shutdown`]: dropped-task reporting.

mod broadcaster;
mod config;
mod dispatch;
mod scheduler;
mod session;
mod shutdown;

pub use broadcaster::{Broadcaster, BroadcasterBuilder};
pub use config::{Config, DEFAULT_FANOUT_CEILING, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_TIMELINE_WORKERS};
pub use scheduler::Scheduler;
pub use session::{Session, SessionBuilder, SessionState};
