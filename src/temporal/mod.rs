//! Time axes and query bounds
//!
//! Both axes are int64 microseconds since the Unix epoch, half-open.
//! `i64::MAX` is the reserved "unbounded" end and `i64::MIN` the unbounded
//! start.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ChronoError, ChronoResult};

/// Microseconds since the Unix epoch
pub type InstantMicros = i64;

/// Start of time
pub const MIN_INSTANT: InstantMicros = i64::MIN;

/// End of time; also the sentinel for an open `valid_to` / `system_to`
pub const MAX_INSTANT: InstantMicros = i64::MAX;

/// A half-open range `[lower, upper)` along one time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalDimension {
    pub lower: InstantMicros,
    pub upper: InstantMicros,
}

impl TemporalDimension {
    /// The whole axis
    pub const fn unbounded() -> Self {
        Self {
            lower: MIN_INSTANT,
            upper: MAX_INSTANT,
        }
    }

    pub fn new(lower: InstantMicros, upper: InstantMicros) -> Self {
        Self { lower, upper }
    }

    /// The single instant `at`, i.e. `[at, at + 1)`
    pub fn at(at: InstantMicros) -> Self {
        Self {
            lower: at,
            upper: at.saturating_add(1),
        }
    }

    /// Whether `[from, to)` overlaps this range
    #[inline]
    pub fn intersects(&self, from: InstantMicros, to: InstantMicros) -> bool {
        from < self.upper && to > self.lower
    }

    /// Clips `[from, to)` to this range. Callers check `intersects` first.
    #[inline]
    pub fn clip(&self, from: InstantMicros, to: InstantMicros) -> (InstantMicros, InstantMicros) {
        (from.max(self.lower), to.min(self.upper))
    }

    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }
}

impl Default for TemporalDimension {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Query bounds on both axes.
///
/// A fact-version whose `system_from` is at or beyond `system_time.upper` had
/// not been recorded yet as of the query, and takes no part in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemporalBounds {
    pub valid_time: TemporalDimension,
    pub system_time: TemporalDimension,
}

impl TemporalBounds {
    /// Everything ever recorded, across all valid time
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The database as it stood at system time `as_of`
    pub fn as_of(as_of: InstantMicros) -> Self {
        Self {
            valid_time: TemporalDimension::unbounded(),
            system_time: TemporalDimension::at(as_of),
        }
    }

    /// Restrict to the single valid-time instant `valid_at`
    pub fn with_valid_at(mut self, valid_at: InstantMicros) -> Self {
        self.valid_time = TemporalDimension::at(valid_at);
        self
    }

    pub fn with_valid_time(mut self, valid_time: TemporalDimension) -> Self {
        self.valid_time = valid_time;
        self
    }

    pub fn with_system_time(mut self, system_time: TemporalDimension) -> Self {
        self.system_time = system_time;
        self
    }

    /// Whether a version recorded at `system_from` is known as of these bounds
    #[inline]
    pub fn knows(&self, system_from: InstantMicros) -> bool {
        system_from < self.system_time.upper
    }

    /// Whether the rectangle `[valid_from, valid_to) x [system_from, system_to)`
    /// overlaps the bounds on both axes
    #[inline]
    pub fn intersects(
        &self,
        valid_from: InstantMicros,
        valid_to: InstantMicros,
        system_from: InstantMicros,
        system_to: InstantMicros,
    ) -> bool {
        self.valid_time.intersects(valid_from, valid_to)
            && self.system_time.intersects(system_from, system_to)
    }
}

/// Parses an instant given as integer microseconds, an RFC 3339 timestamp, or
/// a plain `YYYY-MM-DD` date (midnight UTC).
pub fn parse_instant(s: &str) -> ChronoResult<InstantMicros> {
    let trimmed = s.trim();

    if let Ok(micros) = trimmed.parse::<i64>() {
        return Ok(micros);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).timestamp_micros());
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_micros());
        }
    }

    Err(ChronoError::malformed(format!("unparseable instant: '{}'", s)))
}

/// Renders an instant as RFC 3339, or `None` for the unbounded sentinels
pub fn format_instant(micros: InstantMicros) -> Option<String> {
    if micros == MAX_INSTANT || micros == MIN_INSTANT {
        return None;
    }
    DateTime::<Utc>::from_timestamp_micros(micros).map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_intersects_half_open() {
        let dim = TemporalDimension::new(10, 20);
        assert!(dim.intersects(5, 11));
        assert!(dim.intersects(19, 30));
        assert!(!dim.intersects(20, 30));
        assert!(!dim.intersects(0, 10));
    }

    #[test]
    fn test_clip() {
        let dim = TemporalDimension::new(10, 20);
        assert_eq!(dim.clip(5, 15), (10, 15));
        assert_eq!(dim.clip(12, MAX_INSTANT), (12, 20));
        assert_eq!(TemporalDimension::unbounded().clip(3, 4), (3, 4));
    }

    #[test]
    fn test_as_of_knows() {
        let bounds = TemporalBounds::as_of(100);
        assert!(bounds.knows(100));
        assert!(bounds.knows(-5));
        assert!(!bounds.knows(101));
        assert!(TemporalBounds::unbounded().knows(MAX_INSTANT - 1));
    }

    #[test]
    fn test_at_saturates() {
        let dim = TemporalDimension::at(MAX_INSTANT);
        assert_eq!(dim.upper, MAX_INSTANT);
    }

    #[test]
    fn test_parse_instant_forms() {
        assert_eq!(parse_instant("42").unwrap(), 42);
        assert_eq!(parse_instant("1970-01-01T00:00:01Z").unwrap(), 1_000_000);
        assert_eq!(parse_instant("1970-01-02").unwrap(), 86_400_000_000);
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_format_instant() {
        assert_eq!(format_instant(MAX_INSTANT), None);
        assert_eq!(
            format_instant(0).as_deref(),
            Some("1970-01-01T00:00:00+00:00")
        );
    }
}
