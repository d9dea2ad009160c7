use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use abi::{Allocation, Reservation, ReservationError, ReservationStatus};

/// Storage seam between the scheduler and its backing store.
///
/// Mutating scheduler operations hold the resource's mutation gate across
/// their whole read-then-write sequence, so individual store calls only need
/// to be atomic on their own. A store whose transactions provide serializable
/// isolation still hands out gates; they then merely serialize the writers of
/// one resource within this process. Gates are per logical resource: writers
/// of different resources never wait on each other.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_allocation(&self, allocation: Allocation)
        -> Result<Allocation, ReservationError>;

    async fn allocation(&self, id: Uuid) -> Result<Allocation, ReservationError>;

    async fn delete_allocations(&self, ids: &[Uuid]) -> Result<(), ReservationError>;

    /// Allocations of all mirrors of the given logical resource overlapping
    /// [start, end], endpoints inclusive.
    async fn allocations_overlapping(
        &self,
        mirror_of: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, ReservationError>;

    /// Every allocation, mirrors included, of any of the given groups.
    async fn allocations_in_groups(
        &self,
        groups: &[Uuid],
    ) -> Result<Vec<Allocation>, ReservationError>;

    /// Master allocations (resource == mirror_of) of the given resources
    /// whose start falls within [start, end].
    async fn master_allocations_starting_between(
        &self,
        resources: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, ReservationError>;

    /// Number of same-resource allocations sharing the given group. Mirrors
    /// carry their own resource identity and do not count towards it.
    async fn group_size(&self, resource: Uuid, group: Uuid) -> Result<usize, ReservationError>;

    async fn insert_reservation(
        &self,
        reservation: Reservation,
    ) -> Result<Reservation, ReservationError>;

    async fn reservation(&self, id: Uuid) -> Result<Reservation, ReservationError>;

    async fn update_reservation_status(
        &self,
        id: Uuid,
        status: ReservationStatus,
    ) -> Result<Reservation, ReservationError>;

    /// Removes and returns the reservation.
    async fn delete_reservation(&self, id: Uuid) -> Result<Reservation, ReservationError>;

    /// Reservations whose target id is any of the given allocation or group
    /// ids, confirmed before pending, then by creation time.
    async fn reservations_for_targets(
        &self,
        targets: &[Uuid],
    ) -> Result<Vec<Reservation>, ReservationError>;

    /// Per-logical-resource gate serializing mutating operations in-process.
    fn mutation_gate(&self, resource: Uuid) -> Arc<Mutex<()>>;
}
