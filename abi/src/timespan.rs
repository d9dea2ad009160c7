//! Pure time-range arithmetic shared by the scheduler and the report.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ReservationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timespan {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Timespan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Timespan) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// The part of this span falling within [start, end], if any.
    pub fn clamped(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Timespan> {
        let s = self.start.max(start);
        let e = self.end.min(end);
        (s < e).then_some(Timespan::new(s, e))
    }
}

/// True when the two ranges share at least one instant. Endpoints are
/// inclusive: a range ending at 08:00 overlaps one starting at 08:00. This
/// is the single conflict rule of the engine; the merge tolerance below is
/// display-side only.
pub fn overlaps<T: PartialOrd>(start: T, end: T, other_start: T, other_end: T) -> bool {
    if other_start <= start && start <= other_end {
        return true;
    }

    if start <= other_start && other_start <= end {
        return true;
    }

    false
}

pub fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ReservationError> {
    if start >= end {
        return Err(ReservationError::InvalidRange);
    }

    Ok(())
}

/// Fuses adjacent spans into maximal contiguous ones, in start order.
///
/// Minute-granularity slot generation leaves sub-second gaps between
/// neighbouring slots (08:00-08:14:59, 08:15-08:29:59); a gap of up to one
/// second is therefore treated as contiguous. Idempotent.
pub fn merge_adjacent(spans: &[Timespan]) -> Vec<Timespan> {
    if spans.is_empty() {
        return Vec::new();
    }

    let mut sorted = spans.to_vec();
    sorted.sort_by_key(|s| s.start);

    let mut merged = Vec::with_capacity(sorted.len());
    let mut current = sorted[0];

    for span in &sorted[1..] {
        if span.start - current.end <= Duration::seconds(1) {
            if span.end > current.end {
                current.end = span.end;
            }
        } else {
            merged.push(current);
            current = *span;
        }
    }

    merged.push(current);
    merged
}

/// Combines a day with a start and an end time. Since callers pick one date
/// with two separate times, an end before the start is meant for the
/// following day.
pub fn date_range(day: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Timespan {
    let start = day.and_time(start_time).and_utc();
    let mut end = day.and_time(end_time).and_utc();

    if end < start {
        end = end + Duration::days(1);
    }

    Timespan::new(start, end)
}
