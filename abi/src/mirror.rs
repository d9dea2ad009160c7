//! Deterministic derivation of the quota mirrors of a logical resource.
//!
//! A resource with quota N is bookable N times in parallel for the same time
//! slot. This is realized through N resource identities: the primary one plus
//! N-1 mirrors, derived from the primary by a name-based uuid so the mapping
//! never needs to be persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

/// The quota-1 additional identities of a logical resource, in mirror order.
/// The same (logical, index) pair always yields the same identifier.
pub fn derive_mirrors(logical: Uuid, quota: i32) -> Vec<Uuid> {
    (1..quota.max(1))
        .map(|n| Uuid::new_v5(&logical, n.to_string().as_bytes()))
        .collect()
}

/// Per-scheduler cache of derived mirror sets, keyed by (logical, quota).
/// Owned by the scheduler instance, dropped with it.
#[derive(Debug, Default)]
pub struct MirrorCache {
    cache: Mutex<HashMap<(Uuid, i32), Arc<[Uuid]>>>,
}

impl MirrorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full identity set of a logical slot, primary first.
    pub fn mirrors(&self, logical: Uuid, quota: i32) -> Arc<[Uuid]> {
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        cache
            .entry((logical, quota))
            .or_insert_with(|| {
                let mut set = Vec::with_capacity(quota.max(1) as usize);
                set.push(logical);
                set.extend(derive_mirrors(logical, quota));
                set.into()
            })
            .clone()
    }
}
