use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{overlaps, validate_range, ReservationError, Timespan, Validator};

/// The bookable time unit of one concrete (possibly mirrored) resource.
///
/// Mirrors of the same logical slot share everything except `id` and
/// `resource`; the master mirror is the one whose `resource` equals
/// `mirror_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Uuid,
    pub resource: Uuid,
    pub mirror_of: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Shared by allocations created together and reserved as one unit.
    /// An allocation created alone still carries its own singleton group.
    pub group: Uuid,
    pub quota: i32,
    /// Sub-ranges within [start, end] may be reserved independently.
    pub partly_available: bool,
    /// Reservations require explicit confirmation; excess demand queues on
    /// the waiting list.
    pub approve: bool,
    pub waitinglist_spots: i32,
}

impl Allocation {
    pub fn timespan(&self) -> Timespan {
        Timespan::new(self.start, self.end)
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        overlaps(self.start, self.end, start, end)
    }

    /// Whether [start, end] lies entirely within this allocation.
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }

    pub fn is_master(&self) -> bool {
        self.resource == self.mirror_of
    }
}

impl Validator for Allocation {
    fn validate(&self) -> Result<(), ReservationError> {
        validate_range(self.start, self.end)?;

        if self.quota < 1 {
            return Err(ReservationError::InvalidQuota(self.quota));
        }

        if self.waitinglist_spots < 0 {
            return Err(ReservationError::InvalidQuota(self.waitinglist_spots));
        }

        Ok(())
    }
}
