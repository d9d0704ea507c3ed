//! # Timeline text format.
//!
//! One entry per line:
//! ```text
//! duration|name(description)|settings
//! ```
//! - `duration` — ISO-8601 duration (`PT13S`, `PT1M30S`, `P1DT2H`, `PT0.5S`)
//! - `(description)` and `|settings` are optional
//! - lines are trimmed; blank lines are skipped
//!
//! Malformed lines fail with [`TimelineError::Format`] carrying the line number.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::TimelineError;
use crate::timeline::entry::TimelineEntry;

const NANOS_PER_SEC: i128 = 1_000_000_000;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^([-+]?)P(?:([-+]?[0-9]+)D)?(T(?:([-+]?[0-9]+)H)?(?:([-+]?[0-9]+)M)?(?:([-+]?[0-9]+)(?:[.,]([0-9]{0,9}))?S)?)?$",
        )
        .expect("duration regex is valid")
    })
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^(]*)(?:\((.*)\))?$").expect("name regex is valid"))
}

/// Parses an ISO-8601 duration (`PnDTnHnMn.nS`) into a non-negative [`Duration`].
///
/// Returns a human-readable reason on failure.
pub fn parse_iso8601(text: &str) -> Result<Duration, String> {
    let caps = duration_re()
        .captures(text)
        .ok_or_else(|| format!("invalid ISO-8601 duration {text:?}"))?;

    let t_part = caps.get(3).map(|m| m.as_str());
    if matches!(t_part, Some(t) if t.len() == 1) {
        return Err(format!("duration {text:?} has no time component after 'T'"));
    }
    if caps.get(2).is_none() && t_part.is_none() {
        return Err(format!("duration {text:?} has no components"));
    }

    let num = |idx: usize| -> Result<i128, String> {
        caps.get(idx)
            .map(|m| {
                m.as_str()
                    .parse::<i128>()
                    .map_err(|e| format!("duration {text:?}: {e}"))
            })
            .transpose()
            .map(|v| v.unwrap_or(0))
    };

    let days = num(2)?;
    let hours = num(4)?;
    let minutes = num(5)?;
    let seconds = num(6)?;

    let mut frac: i128 = 0;
    if let Some(m) = caps.get(7) {
        let digits = m.as_str();
        if !digits.is_empty() {
            let padded = format!("{digits:0<9}");
            frac = padded
                .parse::<i128>()
                .map_err(|e| format!("duration {text:?}: {e}"))?;
            if caps.get(6).is_some_and(|s| s.as_str().starts_with('-')) {
                frac = -frac;
            }
        }
    }

    let too_large = || format!("duration {text:?} is too large");
    let mut total = [(days, 86_400), (hours, 3_600), (minutes, 60), (seconds, 1)]
        .into_iter()
        .try_fold(0i128, |acc, (n, unit): (i128, i128)| {
            n.checked_mul(unit)?.checked_add(acc)
        })
        .and_then(|secs| secs.checked_mul(NANOS_PER_SEC)?.checked_add(frac))
        .ok_or_else(too_large)?;
    if caps.get(1).is_some_and(|s| s.as_str() == "-") {
        total = total.checked_neg().ok_or_else(too_large)?;
    }
    if total < 0 {
        return Err(format!("duration {text:?} is negative"));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| too_large())?;
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}

/// Parses one trimmed, non-empty line. `line` is the 1-based line number used in errors.
pub(crate) fn parse_line(line: usize, raw: &str) -> Result<TimelineEntry, TimelineError> {
    let content = raw.trim();
    let segments: Vec<&str> = content.split('|').map(str::trim).collect();

    if segments.len() < 2 {
        return Err(TimelineError::format(
            line,
            content,
            "expected `duration|name(description)|settings`",
        ));
    }
    if segments.len() > 3 {
        return Err(TimelineError::format(
            line,
            content,
            format!("expected at most 3 segments, found {}", segments.len()),
        ));
    }

    let offset_text = segments[0];
    let offset =
        parse_iso8601(offset_text).map_err(|reason| TimelineError::format(line, content, reason))?;

    let caps = name_re().captures(segments[1]).ok_or_else(|| {
        TimelineError::format(line, content, "unbalanced parentheses in event name")
    })?;
    let name = caps.get(1).map_or("", |m| m.as_str()).trim();
    let description = caps.get(2).map(|m| m.as_str().trim());

    let settings = segments.get(2).copied().filter(|s| !s.is_empty());

    Ok(TimelineEntry::with_offset_text(
        offset,
        offset_text,
        name,
        description,
        settings,
    ))
}

impl FromStr for TimelineEntry {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(1, s)
    }
}

/// Pre-computed schedule of custom events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Creates an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a multi-line schedule; blank lines are skipped.
    pub fn parse(text: &str) -> Result<Self, TimelineError> {
        let entries = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(idx, l)| parse_line(idx + 1, l))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Entries in schedule order.
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the timeline.
    pub fn into_entries(self) -> Vec<TimelineEntry> {
        self.entries
    }
}

impl From<Vec<TimelineEntry>> for Timeline {
    fn from(entries: Vec<TimelineEntry>) -> Self {
        Self { entries }
    }
}

impl FromStr for Timeline {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl IntoIterator for Timeline {
    type Item = TimelineEntry;
    type IntoIter = std::vec::IntoIter<TimelineEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a TimelineEntry;
    type IntoIter = std::slice::Iter<'a, TimelineEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line() {
        let e: TimelineEntry = "PT13S|eventname(desc)|k=v".parse().unwrap();
        assert_eq!(e.name(), "eventname");
        assert_eq!(e.offset(), Duration::from_secs(13));
        assert_eq!(e.description(), "desc");
        assert_eq!(e.settings(), Some("k=v"));
    }

    #[test]
    fn test_minimal_line_defaults_description() {
        let e: TimelineEntry = "PT13S|eventname".parse().unwrap();
        assert_eq!(e.description(), "eventname-PT13S");
        assert_eq!(e.settings(), None);
    }

    #[test]
    fn test_line_is_trimmed_and_name_sanitized() {
        let e: TimelineEntry = "  PT1M | ramp/up (to 50%) | rps=200  ".parse().unwrap();
        assert_eq!(e.offset(), Duration::from_secs(60));
        assert_eq!(e.name(), "ramp_up");
        assert_eq!(e.description(), "to 50%");
        assert_eq!(e.settings(), Some("rps=200"));
    }

    #[test]
    fn test_missing_separator_is_error() {
        let err = "PT13S eventname".parse::<TimelineEntry>().unwrap_err();
        assert_eq!(err.as_label(), "timeline_format");
    }

    #[test]
    fn test_too_many_segments_is_error() {
        assert!("PT1S|a|b|c".parse::<TimelineEntry>().is_err());
    }

    #[test]
    fn test_bad_duration_is_error() {
        assert!("13s|a".parse::<TimelineEntry>().is_err());
        assert!("PT|a".parse::<TimelineEntry>().is_err());
        assert!("-PT5S|a".parse::<TimelineEntry>().is_err());
    }

    #[test]
    fn test_iso8601_variants() {
        assert_eq!(parse_iso8601("PT0S").unwrap(), Duration::ZERO);
        assert_eq!(parse_iso8601("pt1.25s").unwrap(), Duration::from_millis(1250));
        assert_eq!(parse_iso8601("PT2H3M").unwrap(), Duration::from_secs(7380));
        assert_eq!(parse_iso8601("P1D").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_iso8601("PT1M-30S").unwrap(), Duration::from_secs(30));
        assert!(parse_iso8601("P").is_err());
    }

    #[test]
    fn test_oversized_duration_is_error_not_panic() {
        let err = parse_iso8601("P99999999999999999999999999999999999D").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_iso8601("PT99999999999999999999999999999999999S").is_err());
        assert!(parse_iso8601("PT170141183460469231731687303715884105727H").is_err());

        let err = "P99999999999999999999999999999999999D|x"
            .parse::<TimelineEntry>()
            .unwrap_err();
        match err {
            TimelineError::Format { line, reason, .. } => {
                assert_eq!(line, 1);
                assert!(reason.contains("too large"), "{reason}");
            }
        }
    }

    #[test]
    fn test_timeline_reports_offending_line() {
        let text = "PT1S|warmup\n\nPT5S|spike(peak)|rps=900\nnonsense\n";
        let err = Timeline::parse(text).unwrap_err();
        match err {
            TimelineError::Format { line, content, .. } => {
                assert_eq!(line, 4);
                assert_eq!(content, "nonsense");
            }
        }
    }

    #[test]
    fn test_timeline_skips_blank_lines() {
        let tl = Timeline::parse("PT1S|warmup\n   \nPT5S|spike(peak)|rps=900\n").unwrap();
        assert_eq!(tl.len(), 2);
        let names: Vec<&str> = tl.entries().iter().map(TimelineEntry::name).collect();
        assert_eq!(names, vec!["warmup", "spike"]);
    }
}
