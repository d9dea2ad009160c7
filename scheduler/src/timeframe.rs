//! Timeframes restrict when a resource is open for reservations. They are
//! defined on containers and inherited by everything below, the nearest
//! container wins.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use abi::overlaps;

use crate::directory::ResourceDirectory;

/// Walking up the containment chain stops here even if the directory never
/// reports a root.
const MAX_DEPTH: usize = 32;

/// A whole-day span during which reservations are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub id: Uuid,
    pub title: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Timeframe {
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        overlaps(self.start, self.end, start, end)
    }
}

/// The timeframes in effect for a resource: those of the nearest container
/// defining any, found by walking the parent chain to the root.
pub fn timeframes_for(directory: &dyn ResourceDirectory, resource: Uuid) -> Vec<Timeframe> {
    let mut context = Some(resource);

    for _ in 0..MAX_DEPTH {
        let Some(id) = context else { break };

        let mut frames = directory.timeframes_in(id);
        if !frames.is_empty() {
            frames.sort_by_key(|f| f.start);
            return frames;
        }

        context = directory.parent_of(id);
    }

    Vec::new()
}

/// The first frame overlapping [start, end], endpoints inclusive. A frame
/// being edited excludes itself from the check.
pub fn overlapping_timeframe<'a>(
    frames: &'a [Timeframe],
    start: NaiveDate,
    end: NaiveDate,
    exclude: Option<Uuid>,
) -> Option<&'a Timeframe> {
    frames
        .iter()
        .filter(|f| Some(f.id) != exclude)
        .find(|f| f.overlaps(start, end))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use abi::ReservationError;

    struct Tree {
        parents: HashMap<Uuid, Uuid>,
        frames: HashMap<Uuid, Vec<Timeframe>>,
    }

    impl ResourceDirectory for Tree {
        fn resolve_resource_title(&self, resource: Uuid) -> Result<String, ReservationError> {
            Err(ReservationError::ResourceNotFound(resource))
        }

        fn is_view_exposed(&self, _resource: Uuid, _view: &str, _user: &str) -> bool {
            true
        }

        fn parent_of(&self, id: Uuid) -> Option<Uuid> {
            self.parents.get(&id).copied()
        }

        fn timeframes_in(&self, id: Uuid) -> Vec<Timeframe> {
            self.frames.get(&id).cloned().unwrap_or_default()
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn frame(title: &str, start: &str, end: &str) -> Timeframe {
        Timeframe {
            id: Uuid::new_v4(),
            title: title.to_string(),
            start: day(start),
            end: day(end),
        }
    }

    #[test]
    fn nearest_container_should_win() {
        let resource = Uuid::new_v4();
        let folder = Uuid::new_v4();
        let site = Uuid::new_v4();

        let tree = Tree {
            parents: HashMap::from([(resource, folder), (folder, site)]),
            frames: HashMap::from([
                (folder, vec![frame("summer", "2023-06-01", "2023-08-31")]),
                (site, vec![frame("year", "2023-01-01", "2023-12-31")]),
            ]),
        };

        let frames = timeframes_for(&tree, resource);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].title, "summer");
    }

    #[test]
    fn frames_should_come_back_start_sorted() {
        let resource = Uuid::new_v4();
        let tree = Tree {
            parents: HashMap::new(),
            frames: HashMap::from([(
                resource,
                vec![
                    frame("autumn", "2023-09-01", "2023-11-30"),
                    frame("spring", "2023-03-01", "2023-05-31"),
                ],
            )]),
        };

        let frames = timeframes_for(&tree, resource);
        assert_eq!(frames[0].title, "spring");
        assert_eq!(frames[1].title, "autumn");
    }

    #[test]
    fn cyclic_parents_should_terminate() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let tree = Tree {
            parents: HashMap::from([(a, b), (b, a)]),
            frames: HashMap::new(),
        };

        assert!(timeframes_for(&tree, a).is_empty());
    }

    #[test]
    fn overlapping_timeframe_should_respect_exclusion() {
        let frames = vec![
            frame("spring", "2023-03-01", "2023-05-31"),
            frame("summer", "2023-06-01", "2023-08-31"),
        ];

        let hit = overlapping_timeframe(&frames, day("2023-05-01"), day("2023-05-20"), None);
        assert_eq!(hit.map(|f| f.title.as_str()), Some("spring"));

        // a frame does not conflict with itself while being edited
        let excluded =
            overlapping_timeframe(&frames, day("2023-05-01"), day("2023-05-20"), Some(frames[0].id));
        assert!(excluded.is_none());

        // touching endpoints conflict
        let touch = overlapping_timeframe(&frames, day("2023-01-01"), day("2023-03-01"), None);
        assert_eq!(touch.map(|f| f.title.as_str()), Some("spring"));
    }
}
