use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{validate_range, Allocation, ReservationError, ReservationStatus, Timespan, Validator};

/// What a reservation claims: one allocation, or every allocation of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
    Allocation(Uuid),
    Group(Uuid),
}

impl Target {
    pub fn id(&self) -> Uuid {
        match self {
            Target::Allocation(id) | Target::Group(id) => *id,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Target::Group(_))
    }
}

/// A pending or confirmed claim against one allocation or allocation group.
/// The set of pending reservations of an allocation is its waiting list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    /// Groups all reservations created in a single user request.
    pub token: Uuid,
    pub target: Target,
    /// The effective reserved sub-range. Both set for range bookings; both
    /// absent for group bookings, whose span is the member allocations'.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: ReservationStatus,
    /// Opaque payload captured by the booking form, carried through unread.
    pub data: Value,
    pub created: DateTime<Utc>,
}

impl Reservation {
    pub fn new_pending(target: Target, span: Option<Timespan>, data: Value) -> Self {
        Self::new(ReservationStatus::Pending, target, span, data)
    }

    pub fn new_confirmed(target: Target, span: Option<Timespan>, data: Value) -> Self {
        Self::new(ReservationStatus::Confirmed, target, span, data)
    }

    fn new(status: ReservationStatus, target: Target, span: Option<Timespan>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            token: Uuid::new_v4(),
            target,
            start: span.map(|s| s.start),
            end: span.map(|s| s.end),
            status,
            data,
            created: Utc::now(),
        }
    }

    pub fn timespan(&self) -> Option<Timespan> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(Timespan::new(start, end)),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }

    /// Whether this reservation spans the whole of the given allocation.
    /// Group reservations always do; range reservations do when their span
    /// encloses the allocation's.
    pub fn covers_whole_allocation(&self, allocation: &Allocation) -> bool {
        match self.target {
            Target::Group(_) => true,
            Target::Allocation(_) => match self.timespan() {
                Some(span) => span.start <= allocation.start && allocation.end <= span.end,
                None => true,
            },
        }
    }
}

impl Validator for Reservation {
    fn validate(&self) -> Result<(), ReservationError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => validate_range(start, end),
            (None, None) => Ok(()),
            // a half-open pair is always a caller bug
            _ => Err(ReservationError::InvalidRange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn allocation() -> Allocation {
        let resource = Uuid::new_v4();
        Allocation {
            id: Uuid::new_v4(),
            resource,
            mirror_of: resource,
            start: "2023-03-04T08:00:00Z".parse().unwrap(),
            end: "2023-03-04T17:00:00Z".parse().unwrap(),
            group: Uuid::new_v4(),
            quota: 1,
            partly_available: true,
            approve: false,
            waitinglist_spots: 0,
        }
    }

    #[test]
    fn group_reservation_covers_whole_allocation() {
        let a = allocation();
        let r = Reservation::new_confirmed(Target::Group(a.group), None, Value::Null);
        assert!(r.covers_whole_allocation(&a));
    }

    #[test]
    fn subrange_reservation_does_not_cover_whole_allocation() {
        let a = allocation();
        let span = Timespan::new(
            "2023-03-04T08:00:00Z".parse().unwrap(),
            "2023-03-04T09:00:00Z".parse().unwrap(),
        );
        let r = Reservation::new_confirmed(Target::Allocation(a.id), Some(span), Value::Null);
        assert!(!r.covers_whole_allocation(&a));

        let whole = Reservation::new_confirmed(
            Target::Allocation(a.id),
            Some(a.timespan()),
            Value::Null,
        );
        assert!(whole.covers_whole_allocation(&a));
    }

    #[test]
    fn validate_should_reject_half_open_spans() {
        let mut r = Reservation::new_confirmed(Target::Group(Uuid::new_v4()), None, Value::Null);
        assert!(r.validate().is_ok());

        r.start = Some("2023-03-04T08:00:00Z".parse().unwrap());
        assert_eq!(r.validate(), Err(ReservationError::InvalidRange));
    }

    #[test]
    fn reservation_should_round_trip_through_serde() {
        let span = Timespan::new(
            "2023-03-04T08:00:00Z".parse().unwrap(),
            "2023-03-04T09:00:00Z".parse().unwrap(),
        );
        let r = Reservation::new_confirmed(
            Target::Allocation(Uuid::new_v4()),
            Some(span),
            json!({"name": "Ms Example", "seats": 2}),
        );

        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: Reservation = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, r);
    }
}
