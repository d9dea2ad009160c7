use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use abi::{Allocation, DbConfig, Reservation, ReservationError, ReservationStatus, Target};

use crate::store::Store;

/// Postgres-backed store.
///
/// Every mutating call runs in its own SERIALIZABLE transaction; the
/// allocation table additionally carries an exclusion constraint on
/// (resource, timespan) as a backstop, so a lost race always surfaces as the
/// retryable `Conflict` rather than as corrupt state.
pub struct PgStore {
    pool: PgPool,
    gates: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            gates: DashMap::new(),
        }
    }

    pub async fn from_config(config: &DbConfig) -> Result<Self, ReservationError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.to_url())
            .await?;
        Ok(Self::new(pool))
    }

    async fn serializable_tx(&self) -> Result<Transaction<'_, Postgres>, ReservationError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

fn allocation_from_row(row: &PgRow) -> Result<Allocation, ReservationError> {
    Ok(Allocation {
        id: row.try_get("id")?,
        resource: row.try_get("resource")?,
        mirror_of: row.try_get("mirror_of")?,
        start: row.try_get("start")?,
        end: row.try_get("end")?,
        group: row.try_get("group")?,
        quota: row.try_get("quota")?,
        partly_available: row.try_get("partly_available")?,
        approve: row.try_get("approve")?,
        waitinglist_spots: row.try_get("waitinglist_spots")?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, ReservationError> {
    let target_id: Uuid = row.try_get("target")?;
    let target_type: String = row.try_get("target_type")?;
    let target = if target_type == "group" {
        Target::Group(target_id)
    } else {
        Target::Allocation(target_id)
    };

    Ok(Reservation {
        id: row.try_get("id")?,
        token: row.try_get("token")?,
        target,
        start: row.try_get("start")?,
        end: row.try_get("end")?,
        status: row.try_get("status")?,
        data: row
            .try_get::<Option<Value>, _>("data")?
            .unwrap_or(Value::Null),
        created: row.try_get("created")?,
    })
}

fn target_columns(target: Target) -> (&'static str, Uuid) {
    match target {
        Target::Allocation(id) => ("allocation", id),
        Target::Group(id) => ("group", id),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_allocation(
        &self,
        allocation: Allocation,
    ) -> Result<Allocation, ReservationError> {
        let mut tx = self.serializable_tx().await?;
        sqlx::query(
            r#"INSERT INTO booking.allocations
               (id, resource, mirror_of, "start", "end", "group", quota, partly_available, approve, waitinglist_spots)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(allocation.id)
        .bind(allocation.resource)
        .bind(allocation.mirror_of)
        .bind(allocation.start)
        .bind(allocation.end)
        .bind(allocation.group)
        .bind(allocation.quota)
        .bind(allocation.partly_available)
        .bind(allocation.approve)
        .bind(allocation.waitinglist_spots)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(allocation)
    }

    async fn allocation(&self, id: Uuid) -> Result<Allocation, ReservationError> {
        let row = sqlx::query(r#"SELECT * FROM booking.allocations WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ReservationError::AllocationNotFound(id))?;

        allocation_from_row(&row)
    }

    async fn delete_allocations(&self, ids: &[Uuid]) -> Result<(), ReservationError> {
        let mut tx = self.serializable_tx().await?;
        sqlx::query(r#"DELETE FROM booking.allocations WHERE id = ANY($1)"#)
            .bind(ids.to_vec())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn allocations_overlapping(
        &self,
        mirror_of: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, ReservationError> {
        let rows = sqlx::query(
            r#"SELECT * FROM booking.allocations
               WHERE mirror_of = $1 AND "start" <= $3 AND "end" >= $2
               ORDER BY "start", resource"#,
        )
        .bind(mirror_of)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(allocation_from_row).collect()
    }

    async fn allocations_in_groups(
        &self,
        groups: &[Uuid],
    ) -> Result<Vec<Allocation>, ReservationError> {
        let rows = sqlx::query(
            r#"SELECT * FROM booking.allocations
               WHERE "group" = ANY($1)
               ORDER BY "start", resource"#,
        )
        .bind(groups.to_vec())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(allocation_from_row).collect()
    }

    async fn master_allocations_starting_between(
        &self,
        resources: &[Uuid],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Allocation>, ReservationError> {
        let rows = sqlx::query(
            r#"SELECT * FROM booking.allocations
               WHERE resource = mirror_of
                 AND resource = ANY($1)
                 AND "start" BETWEEN $2 AND $3
               ORDER BY "start", resource"#,
        )
        .bind(resources.to_vec())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(allocation_from_row).collect()
    }

    async fn group_size(&self, resource: Uuid, group: Uuid) -> Result<usize, ReservationError> {
        let count: i64 = sqlx::query(
            r#"SELECT count(*) FROM booking.allocations WHERE resource = $1 AND "group" = $2"#,
        )
        .bind(resource)
        .bind(group)
        .fetch_one(&self.pool)
        .await?
        .try_get(0)?;

        Ok(count as usize)
    }

    async fn insert_reservation(
        &self,
        reservation: Reservation,
    ) -> Result<Reservation, ReservationError> {
        let (target_type, target_id) = target_columns(reservation.target);

        let mut tx = self.serializable_tx().await?;
        sqlx::query(
            r#"INSERT INTO booking.reservations
               (id, token, target_type, target, "start", "end", status, data, created)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(reservation.id)
        .bind(reservation.token)
        .bind(target_type)
        .bind(target_id)
        .bind(reservation.start)
        .bind(reservation.end)
        .bind(reservation.status)
        .bind(reservation.data.clone())
        .bind(reservation.created)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(reservation)
    }

    async fn reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let row = sqlx::query(r#"SELECT * FROM booking.reservations WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ReservationError::ReservationNotFound(id))?;

        reservation_from_row(&row)
    }

    async fn update_reservation_status(
        &self,
        id: Uuid,
        status: ReservationStatus,
    ) -> Result<Reservation, ReservationError> {
        let mut tx = self.serializable_tx().await?;
        let row = sqlx::query(
            r#"UPDATE booking.reservations SET status = $2 WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReservationError::ReservationNotFound(id))?;
        tx.commit().await?;

        reservation_from_row(&row)
    }

    async fn delete_reservation(&self, id: Uuid) -> Result<Reservation, ReservationError> {
        let mut tx = self.serializable_tx().await?;
        let row = sqlx::query(r#"DELETE FROM booking.reservations WHERE id = $1 RETURNING *"#)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ReservationError::ReservationNotFound(id))?;
        tx.commit().await?;

        reservation_from_row(&row)
    }

    async fn reservations_for_targets(
        &self,
        targets: &[Uuid],
    ) -> Result<Vec<Reservation>, ReservationError> {
        let rows = sqlx::query(
            r#"SELECT * FROM booking.reservations
               WHERE target = ANY($1)
               ORDER BY status::text, created, id"#,
        )
        .bind(targets.to_vec())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reservation_from_row).collect()
    }

    fn mutation_gate(&self, resource: Uuid) -> Arc<Mutex<()>> {
        self.gates
            .entry(resource)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
