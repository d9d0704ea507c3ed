//! # Timeline entry
//!
//! One scheduled custom event: when it fires (offset from timeline start),
//! what it is called, and an opaque settings string handed to observers.
//!
//! Names and descriptions are sanitized on construction: every character
//! outside `[A-Za-z0-9\- %+=:]` is replaced with `_`.

use std::time::Duration;

/// Immutable description of one scheduled custom event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    offset: Duration,
    name: String,
    description: String,
    settings: Option<String>,
}

impl TimelineEntry {
    /// Creates an entry; `description` defaults to `{name}-{offset}` with the
    /// offset rendered as an ISO-8601 duration.
    pub fn new(
        offset: Duration,
        name: &str,
        description: Option<&str>,
        settings: Option<&str>,
    ) -> Self {
        Self::with_offset_text(offset, &format_iso8601(offset), name, description, settings)
    }

    /// Same as [`new`](Self::new) but defaults the description with the offset
    /// text as it was written (e.g. `PT13S`).
    pub(crate) fn with_offset_text(
        offset: Duration,
        offset_text: &str,
        name: &str,
        description: Option<&str>,
        settings: Option<&str>,
    ) -> Self {
        let name = sanitize(name);
        let description = match description {
            Some(d) => sanitize(d),
            None => sanitize(&format!("{name}-{offset_text}")),
        };
        Self {
            offset,
            name,
            description,
            settings: settings.map(str::to_string),
        }
    }

    /// Offset from timeline start at which the entry fires.
    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Sanitized event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sanitized description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Opaque settings string, if any.
    pub fn settings(&self) -> Option<&str> {
        self.settings.as_deref()
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | ' ' | '%' | '+' | '=' | ':')
}

/// Replaces every character outside `[A-Za-z0-9\- %+=:]` with `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_allowed(c) { c } else { '_' })
        .collect()
}

/// Renders a duration as ISO-8601 (`PT1H2M3.5S`, `PT0S`).
pub(crate) fn format_iso8601(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let nanos = d.subsec_nanos();

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 || nanos > 0 || (hours == 0 && minutes == 0) {
        if nanos > 0 {
            let frac = format!("{nanos:09}");
            out.push_str(&format!("{seconds}.{}S", frac.trim_end_matches('0')));
        } else {
            out.push_str(&format!("{seconds}S"));
        }
    }
    out
}
