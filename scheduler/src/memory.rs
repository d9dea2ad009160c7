use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use abi::{Allocation, Reservation, ReservationError, ReservationStatus};

use crate::store::Store;

/// In-memory store, primarily for tests and single-process embedding.
///
/// Individual operations are atomic behind the state lock; the compound
/// read-then-write sequences of the scheduler rely on the per-resource
/// mutation gates for isolation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    gates: DashMap<Uuid, Arc<Mutex<()>>>,
}

#[derive(Debug, Default)]
struct State {
    allocations: HashMap<Uuid, Allocation>,
    reservations: HashMap<Uuid, Reservation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_allocation(
        &self,
        allocation: Allocation,
    ) -> Result<Allocation, ReservationError> {
        let mut state = self.state.write().await;
        state.allocations.insert(allocation.id, allocation.clone());
        Ok(allocation)
    }

    async fn allocation(&self, id: Uuid) -> Result<Allocation, ReservationError> {
        let state = self.state.read().await;
        state
            .allocations
            .get(&id)
            .cloned()
            .ok_or(ReservationError::AllocationNotFound(id))
    }

    async fn delete_allocations(&self, ids: &[Uuid]) -> Result<(), ReservationError> {
        let mut state = self.state.write().await;
        for id in ids {
            state.allocations.remove(id);
        }
        Ok(())
    }

    async fn allocations_overlapping(
        &self,
        mirror_of: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, ReservationError> {
        let state = self.state.read().await;
        let mut found: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| a.mirror_of == mirror_of && a.overlaps(start, end))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.start, a.resource));
        Ok(found)
    }

    async fn allocations_in_groups(
        &self,
        groups: &[Uuid],
    ) -> Result<Vec<Allocation>, ReservationError> {
        let state = self.state.read().await;
        let mut found: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| groups.contains(&a.group))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.start, a.resource));
        Ok(found)
    }

    async fn master_allocations_starting_between(
        &self,
        resources: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, ReservationError> {
        let state = self.state.read().await;
        let mut found: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| {
                a.is_master()
                    && resources.contains(&a.resource)
                    && start <= a.start
                    && a.start <= end
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.start, a.resource));
        Ok(found)
    }

    async fn group_size(&self, resource: Uuid, group: Uuid) -> Result<usize, ReservationError> {
        let state = self.state.read().await;
        Ok(state
            .allocations
            .values()
            .filter(|a| a.resource == resource && a.group == group)
            .count())
    }

    async fn insert_reservation(
        &self,
        reservation: Reservation,
    ) -> Result<Reservation, ReservationError> {
        let mut state = self.state.write().await;
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let state = self.state.read().await;
        state
            .reservations
            .get(&id)
            .cloned()
            .ok_or(ReservationError::ReservationNotFound(id))
    }

    async fn update_reservation_status(
        &self,
        id: Uuid,
        status: ReservationStatus,
    ) -> Result<Reservation, ReservationError> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or(ReservationError::ReservationNotFound(id))?;
        reservation.status = status;
        Ok(reservation.clone())
    }

    async fn delete_reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let mut state = self.state.write().await;
        state
            .reservations
            .remove(&id)
            .ok_or(ReservationError::ReservationNotFound(id))
    }

    async fn reservations_for_targets(
        &self,
        targets: &[Uuid],
    ) -> Result<Vec<Reservation>, ReservationError> {
        let state = self.state.read().await;
        let mut found: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| targets.contains(&r.target.id()))
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.status.report_rank(), r.created, r.id));
        Ok(found)
    }

    fn mutation_gate(&self, resource: Uuid) -> Arc<Mutex<()>> {
        self.gates
            .entry(resource)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
