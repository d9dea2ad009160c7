use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ReservationError {
    #[error("invalid time range")]
    InvalidRange,

    #[error("invalid quota: {0}")]
    InvalidQuota(i32),

    #[error("allocation overlaps an existing allocation of this resource")]
    OverlappingAllocation,

    #[error("no capacity left for the requested range")]
    CapacityExceeded,

    #[error("allocation not found: {0}")]
    AllocationNotFound(Uuid),

    #[error("reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("resource not found: {0}")]
    ResourceNotFound(Uuid),

    #[error("reservation already confirmed: {0}")]
    AlreadyConfirmed(Uuid),

    #[error("allocation still has reservations: {0}")]
    AllocationInUse(Uuid),

    #[error("transient conflict, try again")]
    Conflict,

    #[error("db error: {0}")]
    Db(sqlx::Error),
}

impl PartialEq for ReservationError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // db errors compare equal by kind only
            (Self::Db(_), Self::Db(_)) => true,
            (Self::InvalidRange, Self::InvalidRange) => true,
            (Self::InvalidQuota(v1), Self::InvalidQuota(v2)) => v1 == v2,
            (Self::OverlappingAllocation, Self::OverlappingAllocation) => true,
            (Self::CapacityExceeded, Self::CapacityExceeded) => true,
            (Self::AllocationNotFound(v1), Self::AllocationNotFound(v2)) => v1 == v2,
            (Self::ReservationNotFound(v1), Self::ReservationNotFound(v2)) => v1 == v2,
            (Self::ResourceNotFound(v1), Self::ResourceNotFound(v2)) => v1 == v2,
            (Self::AlreadyConfirmed(v1), Self::AlreadyConfirmed(v2)) => v1 == v2,
            (Self::AllocationInUse(v1), Self::AllocationInUse(v2)) => v1 == v2,
            (Self::Conflict, Self::Conflict) => true,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for ReservationError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(e) => {
                let err = e.downcast_ref::<sqlx::postgres::PgDatabaseError>();
                match err.code() {
                    // serialization_failure and exclusion_violation both mean
                    // another writer got there first
                    "40001" | "23P01" => Self::Conflict,
                    _ => Self::Db(sqlx::Error::Database(e)),
                }
            }
            _ => Self::Db(e),
        }
    }
}
