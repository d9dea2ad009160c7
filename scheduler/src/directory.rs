use uuid::Uuid;

use abi::ReservationError;

use crate::timeframe::Timeframe;

/// Contract the surrounding content layer fulfills for the engine. The
/// engine only ever consumes titles, permissions, containment and
/// timeframes through this seam; it never reaches into the content layer
/// itself.
pub trait ResourceDirectory: Send + Sync {
    /// Human-readable title of a resource; `ResourceNotFound` for stale
    /// identifiers.
    fn resolve_resource_title(&self, resource: Uuid) -> Result<String, ReservationError>;

    /// Whether the named view of the resource is exposed to the user.
    /// Never mutates.
    fn is_view_exposed(&self, resource: Uuid, view: &str, user: &str) -> bool;

    /// The immediate container of a resource or container, None at the root.
    fn parent_of(&self, id: Uuid) -> Option<Uuid>;

    /// Timeframes defined directly inside the given container.
    fn timeframes_in(&self, id: Uuid) -> Vec<Timeframe>;
}

/// Maps a message key to localized text.
pub trait Translate {
    /// The localized text, or the key itself when untranslated.
    fn translate(&self, key: &str) -> String;
}

/// Fallback translator returning every key unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Untranslated;

impl Translate for Untranslated {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}
