//! The monthly report: a day-by-resource matrix of approved and pending
//! reservations, with group reservations expanded across every allocation of
//! their group.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use abi::{Allocation, Reservation, ReservationError, ReservationStatus, Target};

use crate::directory::ResourceDirectory;
use crate::store::Store;

/// The view whose exposure decides whether a resource shows up in a user's
/// report.
pub const REPORT_VIEW: &str = "monthly_report";

/// One reservation span inside a day bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSpan {
    pub reservation: Uuid,
    pub token: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub data: Value,
}

/// Span list kept sorted by start at all times, so partially built reports
/// can already be displayed incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SortedSpans(Vec<ReportSpan>);

impl SortedSpans {
    pub fn insert(&mut self, span: ReportSpan) {
        let at = self.0.partition_point(|s| s.start <= span.start);
        self.0.insert(at, span);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReportSpan> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A resource's bucket for one day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayEntry {
    pub title: String,
    pub approved: SortedSpans,
    pub pending: SortedSpans,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    /// Column order of the report, sorted by resource title.
    pub resources: Vec<(Uuid, String)>,
    pub days: BTreeMap<u32, HashMap<Uuid, DayEntry>>,
}

/// Builds the report for one calendar month.
///
/// Resources the directory cannot resolve are omitted rather than failing
/// the whole report, as are resources whose report view is not exposed to
/// the user.
pub async fn monthly_report<S: Store>(
    store: &S,
    directory: &dyn ResourceDirectory,
    year: i32,
    month: u32,
    resource_ids: &[Uuid],
    user: &str,
) -> Result<MonthlyReport, ReservationError> {
    let mut resources = Vec::new();
    for id in resource_ids {
        if !directory.is_view_exposed(*id, REPORT_VIEW, user) {
            continue;
        }
        match directory.resolve_resource_title(*id) {
            Ok(title) => resources.push((*id, title)),
            Err(ReservationError::ResourceNotFound(_)) => {
                debug!(resource = %id, "omitting unresolved resource from report");
            }
            Err(e) => return Err(e),
        }
    }
    resources.sort_by(|a, b| a.1.cmp(&b.1));

    // the calendar grid may show up to 31 cells; seed them all, then trim to
    // the month's real last day
    let last_day = (28..=31u32)
        .rev()
        .find(|d| NaiveDate::from_ymd_opt(year, month, *d).is_some())
        .ok_or(ReservationError::InvalidRange)?;

    let mut days: BTreeMap<u32, HashMap<Uuid, DayEntry>> = BTreeMap::new();
    for day in 1..=31u32 {
        let row = days.entry(day).or_default();
        for (id, title) in &resources {
            row.insert(
                *id,
                DayEntry {
                    title: title.clone(),
                    ..DayEntry::default()
                },
            );
        }
    }
    days.retain(|day, _| *day <= last_day);

    // gather the reservations with as much bulk loading as possible
    let period_start = first_instant(year, month, 1)?;
    let period_end = last_instant(year, month, last_day)?;

    let ids: Vec<Uuid> = resources.iter().map(|r| r.0).collect();
    let allocations = store
        .master_allocations_starting_between(&ids, period_start, period_end)
        .await?;

    // store by group, it is needed multiple times over later
    let mut groups: HashMap<Uuid, Vec<Allocation>> = HashMap::new();
    for allocation in allocations {
        groups.entry(allocation.group).or_default().push(allocation);
    }

    // reservations may target any mirror of those groups, not just masters
    let group_ids: Vec<Uuid> = groups.keys().copied().collect();
    let members: HashMap<Uuid, Allocation> = store
        .allocations_in_groups(&group_ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    let mut targets: Vec<Uuid> = group_ids;
    targets.extend(members.keys().copied());
    let reservations = store.reservations_for_targets(&targets).await?;

    let mut report = MonthlyReport {
        year,
        month,
        resources,
        days,
    };

    for reservation in &reservations {
        match reservation.target {
            Target::Allocation(allocation_id) => {
                let Some(allocation) = members.get(&allocation_id) else {
                    continue;
                };
                let start = reservation.start.unwrap_or(allocation.start);
                let end = reservation.end.unwrap_or(allocation.end);
                add_span(&mut report.days, allocation.mirror_of, start, end, reservation);
            }
            Target::Group(group) => {
                for allocation in groups.get(&group).into_iter().flatten() {
                    add_span(
                        &mut report.days,
                        allocation.mirror_of,
                        allocation.start,
                        allocation.end,
                        reservation,
                    );
                }
            }
        }
    }

    Ok(report)
}

fn add_span(
    days: &mut BTreeMap<u32, HashMap<Uuid, DayEntry>>,
    resource: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    reservation: &Reservation,
) {
    let Some(row) = days.get_mut(&start.day()) else {
        return;
    };
    let Some(entry) = row.get_mut(&resource) else {
        return;
    };

    let bucket = match reservation.status {
        ReservationStatus::Confirmed => &mut entry.approved,
        ReservationStatus::Pending => &mut entry.pending,
    };

    bucket.insert(ReportSpan {
        reservation: reservation.id,
        token: reservation.token,
        start,
        end,
        data: reservation.data.clone(),
    });
}

fn first_instant(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, ReservationError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or(ReservationError::InvalidRange)
}

fn last_instant(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, ReservationError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|d| d.and_utc())
        .ok_or(ReservationError::InvalidRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn span(start: &str) -> ReportSpan {
        ReportSpan {
            reservation: Uuid::new_v4(),
            token: Uuid::new_v4(),
            start: start.parse().unwrap(),
            end: "2023-03-04T23:00:00Z".parse().unwrap(),
            data: json!(null),
        }
    }

    #[test]
    fn sorted_spans_should_insert_in_start_order() {
        let mut spans = SortedSpans::default();
        spans.insert(span("2023-03-04T10:00:00Z"));
        spans.insert(span("2023-03-04T08:00:00Z"));
        spans.insert(span("2023-03-04T09:00:00Z"));

        let starts: Vec<_> = spans.iter().map(|s| s.start).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }
}
