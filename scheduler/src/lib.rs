//! Resource-booking engine.
//!
//! Manages time-bounded allocations of bookable resources, tracks confirmed
//! bookings and waiting-list entries against them, answers availability
//! queries and aggregates booking history into monthly reports. Embeddable;
//! the surrounding content layer supplies resource titles, permissions and
//! translations through the [`ResourceDirectory`] and [`Translate`] traits.

mod directory;
mod display;
mod manager;
mod memory;
mod pg;
mod report;
mod store;
mod timeframe;

pub use directory::{ResourceDirectory, Translate, Untranslated};
pub use display::{event_class, AvailabilityInfo};
pub use manager::{AllocationSpec, Scheduler};
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use report::{monthly_report, DayEntry, MonthlyReport, ReportSpan, SortedSpans, REPORT_VIEW};
pub use store::Store;
pub use timeframe::{overlapping_timeframe, timeframes_for, Timeframe};
