//! # Custom event timeline.
//!
//! - [`TimelineEntry`] — one scheduled custom event (immutable)
//! - [`Timeline`] — the parsed schedule handed to the [`Scheduler`](crate::Scheduler)
//! - [`parse_iso8601`] — the duration syntax used by the text format

mod entry;
mod parse;

pub use entry::{sanitize, TimelineEntry};
pub use parse::{parse_iso8601, Timeline};
