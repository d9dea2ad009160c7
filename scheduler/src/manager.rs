use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use abi::{
    merge_adjacent, validate_range, Allocation, MirrorCache, Reservation, ReservationError,
    ReservationStatus, Target, Timespan, Validator,
};

use crate::store::Store;

/// Transient serialization conflicts are retried this many times before they
/// surface to the caller.
const CONFLICT_RETRIES: usize = 3;

/// Parameters of a new allocation. The quota determines how many mirror
/// allocations are materialized for the slot.
#[derive(Debug, Clone)]
pub struct AllocationSpec {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub quota: i32,
    pub partly_available: bool,
    pub approve: bool,
    pub waitinglist_spots: i32,
    /// Allocations sharing a group are reserved as one unit. None gets the
    /// slot a fresh singleton group.
    pub group: Option<Uuid>,
}

impl Default for AllocationSpec {
    fn default() -> Self {
        Self {
            start: Utc::now(),
            end: Utc::now(),
            quota: 1,
            partly_available: false,
            approve: false,
            waitinglist_spots: 0,
            group: None,
        }
    }
}

/// The operational facade, scoped to one logical resource.
///
/// All mutating operations serialize behind the store's per-resource gate and
/// retry transient conflicts a bounded number of times; operations on other
/// resources are never blocked by it.
pub struct Scheduler<S> {
    store: Arc<S>,
    resource: Uuid,
    mirrors: MirrorCache,
}

/// Reservations held against the mirrors of one logical slot.
#[derive(Debug, Default)]
struct SlotOccupancy {
    /// Confirmed group bookings; each occupies one mirror of every slot of
    /// its group without being pinned to a particular one.
    group_confirmed: usize,
    /// Confirmed spans per mirror allocation id.
    direct_confirmed: HashMap<Uuid, Vec<Timespan>>,
    /// Waiting-list entries, group and direct alike.
    pending: usize,
}

impl SlotOccupancy {
    /// First mirror with room for the span, group bookings accounted for by
    /// skipping one otherwise-free mirror each.
    fn free_mirror<'a>(&self, slot: &'a [Allocation], span: Timespan) -> Option<&'a Allocation> {
        let partly_available = slot[0].partly_available;

        let mut free = slot.iter().filter(|a| match self.direct_confirmed.get(&a.id) {
            None => true,
            Some(spans) if partly_available => !spans.iter().any(|s| s.overlaps(&span)),
            Some(spans) => spans.is_empty(),
        });

        free.nth(self.group_confirmed)
    }

    fn open_waitinglist_spots(&self, master: &Allocation) -> i32 {
        (master.waitinglist_spots - self.pending as i32).max(0)
    }

    /// Availability of the slot as a percentage of its capacity within the
    /// requested range.
    fn availability(&self, slot: &[Allocation], start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let master = &slot[0];
        let quota = master.quota.max(1) as f64;

        if !master.partly_available {
            let confirmed = self.group_confirmed
                + slot
                    .iter()
                    .filter(|a| {
                        self.direct_confirmed
                            .get(&a.id)
                            .is_some_and(|spans| !spans.is_empty())
                    })
                    .count();
            return ((quota - confirmed as f64).max(0.0) / quota) * 100.0;
        }

        // partly available: interval subtraction over the requested range
        let Some(requested) = master.timespan().clamped(start, end) else {
            return 100.0;
        };
        let capacity = requested.duration().num_seconds() as f64 * quota;
        if capacity <= 0.0 {
            return 100.0;
        }

        let mut reserved = requested.duration().num_seconds() as f64 * self.group_confirmed as f64;
        for spans in self.direct_confirmed.values() {
            for span in spans {
                if let Some(hit) = span.clamped(requested.start, requested.end) {
                    reserved += hit.duration().num_seconds() as f64;
                }
            }
        }

        ((capacity - reserved).max(0.0) / capacity) * 100.0
    }
}

impl<S: Store> Scheduler<S> {
    pub fn new(store: Arc<S>, resource: Uuid) -> Self {
        Self {
            store,
            resource,
            mirrors: MirrorCache::new(),
        }
    }

    pub fn resource(&self) -> Uuid {
        self.resource
    }

    /// Materializes a new slot: one allocation per quota mirror, all sharing
    /// start, end and group. Rejects slots overlapping an existing one of
    /// this resource.
    pub async fn allocate(&self, spec: AllocationSpec) -> Result<Vec<Allocation>, ReservationError> {
        validate_range(spec.start, spec.end)?;
        if spec.quota < 1 {
            return Err(ReservationError::InvalidQuota(spec.quota));
        }

        let gate = self.store.mutation_gate(self.resource);
        let _guard = gate.lock().await;

        let existing = self
            .store
            .allocations_overlapping(self.resource, spec.start, spec.end)
            .await?;
        if !existing.is_empty() {
            return Err(ReservationError::OverlappingAllocation);
        }

        let group = spec.group.unwrap_or_else(Uuid::new_v4);
        let identities = self.mirrors.mirrors(self.resource, spec.quota);

        let mut created = Vec::with_capacity(identities.len());
        for identity in identities.iter() {
            let allocation = Allocation {
                id: Uuid::new_v4(),
                resource: *identity,
                mirror_of: self.resource,
                start: spec.start,
                end: spec.end,
                group,
                quota: spec.quota,
                partly_available: spec.partly_available,
                approve: spec.approve,
                waitinglist_spots: spec.waitinglist_spots,
            };
            allocation.validate()?;
            created.push(self.store.insert_allocation(allocation).await?);
        }

        info!(resource = %self.resource, group = %group, quota = spec.quota, "slot allocated");
        Ok(created)
    }

    /// Removes a slot and all its mirrors. Refuses while reservations exist
    /// unless `cascade` is set, in which case they are removed with it.
    pub async fn remove_allocation(&self, id: Uuid, cascade: bool) -> Result<(), ReservationError> {
        let gate = self.store.mutation_gate(self.resource);
        let _guard = gate.lock().await;

        let allocation = self.store.allocation(id).await?;
        let slot = self.slot_of(&allocation).await?;

        let mut targets: Vec<Uuid> = slot.iter().map(|a| a.id).collect();
        targets.push(allocation.group);
        let reservations = self.store.reservations_for_targets(&targets).await?;

        if !reservations.is_empty() {
            if !cascade {
                return Err(ReservationError::AllocationInUse(id));
            }
            for reservation in &reservations {
                self.store.delete_reservation(reservation.id).await?;
            }
        }

        let ids: Vec<Uuid> = slot.iter().map(|a| a.id).collect();
        self.store.delete_allocations(&ids).await?;

        info!(resource = %self.resource, allocation = %id, cascade, "slot removed");
        Ok(())
    }

    /// Unreserved fraction of capacity across all mirrors overlapping
    /// [start, end], as a percentage. Not rounded; presentation rounds.
    pub async fn availability(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<f64, ReservationError> {
        validate_range(start, end)?;

        let allocations = self
            .store
            .allocations_overlapping(self.resource, start, end)
            .await?;
        if allocations.is_empty() {
            return Ok(100.0);
        }

        let slots = slots(allocations);
        let mut total = 0.0;
        for slot in &slots {
            let occupancy = self.slot_occupancy(slot).await?;
            total += occupancy.availability(slot, start, end);
        }

        Ok(total / slots.len() as f64)
    }

    /// Books [start, end]. Non-approve slots confirm immediately while
    /// capacity remains; approve slots queue the reservation as pending
    /// against the waiting list.
    pub async fn reserve(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        data: Value,
    ) -> Result<Reservation, ReservationError> {
        validate_range(start, end)?;

        let gate = self.store.mutation_gate(self.resource);
        let _guard = gate.lock().await;

        let mut attempt = 0;
        loop {
            match self.try_reserve(start, end, &data).await {
                Err(ReservationError::Conflict) if attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                    debug!(resource = %self.resource, attempt, "retrying reservation after conflict");
                }
                Ok(reservation) => {
                    info!(
                        resource = %self.resource,
                        reservation = %reservation.id,
                        status = %reservation.status,
                        "reservation created"
                    );
                    return Ok(reservation);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_reserve(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        data: &Value,
    ) -> Result<Reservation, ReservationError> {
        let allocations = self
            .store
            .allocations_overlapping(self.resource, start, end)
            .await?;

        // the request must lie within a slot of this resource
        let covering: Vec<Allocation> = allocations
            .into_iter()
            .filter(|a| a.contains(start, end))
            .collect();
        if covering.is_empty() {
            return Err(ReservationError::InvalidRange);
        }

        let slots = slots(covering);
        let slot = &slots[0];
        let master = &slot[0];

        let span = if master.partly_available {
            Timespan::new(start, end)
        } else {
            master.timespan()
        };

        let occupancy = self.slot_occupancy(slot).await?;
        let chosen = occupancy.free_mirror(slot, span);

        if master.approve {
            if chosen.is_none() && occupancy.open_waitinglist_spots(master) == 0 {
                return Err(ReservationError::CapacityExceeded);
            }
            let target = Target::Allocation(chosen.unwrap_or(master).id);
            let reservation = Reservation::new_pending(target, Some(span), data.clone());
            reservation.validate()?;
            return self.store.insert_reservation(reservation).await;
        }

        let Some(allocation) = chosen else {
            return Err(ReservationError::CapacityExceeded);
        };
        let reservation =
            Reservation::new_confirmed(Target::Allocation(allocation.id), Some(span), data.clone());
        reservation.validate()?;
        self.store.insert_reservation(reservation).await
    }

    /// Books every allocation of a group as one unit. The reservation spans
    /// all slots; each must have a mirror unit left.
    pub async fn reserve_group(
        &self,
        group: Uuid,
        data: Value,
    ) -> Result<Reservation, ReservationError> {
        let gate = self.store.mutation_gate(self.resource);
        let _guard = gate.lock().await;

        let mut attempt = 0;
        loop {
            match self.try_reserve_group(group, &data).await {
                Err(ReservationError::Conflict) if attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                    debug!(resource = %self.resource, attempt, "retrying group reservation after conflict");
                }
                Ok(reservation) => {
                    info!(
                        resource = %self.resource,
                        group = %group,
                        reservation = %reservation.id,
                        status = %reservation.status,
                        "group reservation created"
                    );
                    return Ok(reservation);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_reserve_group(
        &self,
        group: Uuid,
        data: &Value,
    ) -> Result<Reservation, ReservationError> {
        let allocations = self.store.allocations_in_groups(&[group]).await?;
        if allocations.is_empty() {
            return Err(ReservationError::AllocationNotFound(group));
        }

        let slots = slots(allocations);
        let master = slots[0][0].clone();

        let mut full = false;
        for slot in &slots {
            let occupancy = self.slot_occupancy(slot).await?;
            if occupancy.free_mirror(slot, slot[0].timespan()).is_none() {
                full = true;
                break;
            }
        }

        if master.approve {
            if full && self.open_waitinglist_spots(&master).await? == 0 {
                return Err(ReservationError::CapacityExceeded);
            }
            let reservation = Reservation::new_pending(Target::Group(group), None, data.clone());
            reservation.validate()?;
            return self.store.insert_reservation(reservation).await;
        }

        if full {
            return Err(ReservationError::CapacityExceeded);
        }
        let reservation = Reservation::new_confirmed(Target::Group(group), None, data.clone());
        reservation.validate()?;
        self.store.insert_reservation(reservation).await
    }

    /// Transitions a pending reservation to confirmed. Double confirmation
    /// is reported, not ignored.
    pub async fn confirm(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let gate = self.store.mutation_gate(self.resource);
        let _guard = gate.lock().await;

        let reservation = self.store.reservation(id).await?;
        if reservation.is_confirmed() {
            return Err(ReservationError::AlreadyConfirmed(id));
        }

        let confirmed = self
            .store
            .update_reservation_status(id, ReservationStatus::Confirmed)
            .await?;

        info!(resource = %self.resource, reservation = %id, "reservation confirmed");
        Ok(confirmed)
    }

    /// Removes a reservation. When a confirmed one is removed and pending
    /// reservations wait on the freed capacity, the earliest-created of them
    /// is returned as promotion-eligible; promotion itself is the caller's
    /// decision.
    pub async fn cancel(&self, id: Uuid) -> Result<Option<Reservation>, ReservationError> {
        let gate = self.store.mutation_gate(self.resource);
        let _guard = gate.lock().await;

        let removed = self.store.delete_reservation(id).await?;
        info!(
            resource = %self.resource,
            reservation = %id,
            status = %removed.status,
            "reservation cancelled"
        );

        if !removed.is_confirmed() {
            return Ok(None);
        }

        let targets = match removed.target {
            Target::Allocation(allocation_id) => {
                let allocation = self.store.allocation(allocation_id).await?;
                let slot = self.slot_of(&allocation).await?;
                let mut targets: Vec<Uuid> = slot.iter().map(|a| a.id).collect();
                targets.push(allocation.group);
                targets
            }
            Target::Group(group) => {
                let mut targets: Vec<Uuid> = self
                    .store
                    .allocations_in_groups(&[group])
                    .await?
                    .iter()
                    .map(|a| a.id)
                    .collect();
                targets.push(group);
                targets
            }
        };

        let eligible = self
            .store
            .reservations_for_targets(&targets)
            .await?
            .into_iter()
            .filter(Reservation::is_pending)
            .min_by_key(|r| (r.created, r.id));

        Ok(eligible)
    }

    /// Remaining waiting-list capacity of the allocation's slot.
    pub async fn open_waitinglist_spots(
        &self,
        allocation: &Allocation,
    ) -> Result<i32, ReservationError> {
        let slot = self.slot_of(allocation).await?;
        let occupancy = self.slot_occupancy(&slot).await?;
        Ok(occupancy.open_waitinglist_spots(&slot[0]))
    }

    /// True when further allocations of the same resource share the
    /// allocation's group. Mirrors carry their own resource identity and do
    /// not make a slot a group allocation.
    pub async fn is_group_allocation(
        &self,
        allocation: &Allocation,
    ) -> Result<bool, ReservationError> {
        Ok(self
            .store
            .group_size(allocation.resource, allocation.group)
            .await?
            > 1)
    }

    /// Confirmed occupancy of one allocation as maximal contiguous spans,
    /// for calendar display of partly booked slots.
    pub async fn reserved_spans(
        &self,
        allocation: &Allocation,
    ) -> Result<Vec<Timespan>, ReservationError> {
        let reservations = self
            .store
            .reservations_for_targets(&[allocation.id, allocation.group])
            .await?;

        let spans: Vec<Timespan> = reservations
            .iter()
            .filter(|r| r.is_confirmed())
            .map(|r| r.timespan().unwrap_or_else(|| allocation.timespan()))
            .collect();

        Ok(merge_adjacent(&spans))
    }

    /// All mirrors of the allocation's slot, master first.
    async fn slot_of(&self, allocation: &Allocation) -> Result<Vec<Allocation>, ReservationError> {
        let overlapping = self
            .store
            .allocations_overlapping(allocation.mirror_of, allocation.start, allocation.end)
            .await?;

        let mut slot: Vec<Allocation> = overlapping
            .into_iter()
            .filter(|a| {
                a.group == allocation.group
                    && a.start == allocation.start
                    && a.end == allocation.end
            })
            .collect();
        if slot.is_empty() {
            return Err(ReservationError::AllocationNotFound(allocation.id));
        }

        slot.sort_by_key(|a| (!a.is_master(), a.resource));
        Ok(slot)
    }

    async fn slot_occupancy(&self, slot: &[Allocation]) -> Result<SlotOccupancy, ReservationError> {
        let mut targets: Vec<Uuid> = slot.iter().map(|a| a.id).collect();
        targets.push(slot[0].group);

        let reservations = self.store.reservations_for_targets(&targets).await?;

        let mut occupancy = SlotOccupancy::default();
        for reservation in &reservations {
            if reservation.is_pending() {
                occupancy.pending += 1;
                continue;
            }

            match reservation.target {
                Target::Group(_) => occupancy.group_confirmed += 1,
                Target::Allocation(id) => {
                    // a direct reservation without a span claims the whole slot
                    let span = reservation
                        .timespan()
                        .unwrap_or_else(|| slot[0].timespan());
                    occupancy.direct_confirmed.entry(id).or_default().push(span);
                }
            }
        }

        Ok(occupancy)
    }
}

/// Splits a mixed list of allocations into logical slots, each the mirrors
/// of one (group, start, end), master first, in start order.
fn slots(allocations: Vec<Allocation>) -> Vec<Vec<Allocation>> {
    let mut by_slot: HashMap<(Uuid, DateTime<Utc>, DateTime<Utc>), Vec<Allocation>> =
        HashMap::new();
    for allocation in allocations {
        by_slot
            .entry((allocation.group, allocation.start, allocation.end))
            .or_default()
            .push(allocation);
    }

    let mut slots: Vec<Vec<Allocation>> = by_slot.into_values().collect();
    for slot in &mut slots {
        slot.sort_by_key(|a| (!a.is_master(), a.resource));
    }
    slots.sort_by_key(|slot| slot[0].start);
    slots
}
