//! Human-readable availability, for the calendar event rendering of the
//! excluded presentation layer.

use serde::Serialize;

use abi::{Allocation, ReservationError};

use crate::directory::Translate;
use crate::manager::Scheduler;
use crate::store::Store;

/// Status text plus CSS classification of one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityInfo {
    pub text: String,
    pub class: String,
}

/// The event class for a raw availability percentage.
pub fn event_class(availability: f64) -> &'static str {
    if availability == 0.0 {
        "event-unavailable"
    } else if availability == 100.0 {
        "event-available"
    } else {
        "event-partly-available"
    }
}

/// Round half up, uniformly; spot counts never go negative.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

impl<S: Store> Scheduler<S> {
    /// Availability of one allocation as status text and CSS classes.
    /// Message keys go through the translator with `%i` substituted after.
    pub async fn describe_availability(
        &self,
        allocation: &Allocation,
        translator: &dyn Translate,
    ) -> Result<AvailabilityInfo, ReservationError> {
        let availability = self.availability(allocation.start, allocation.end).await?;

        let text = if allocation.partly_available {
            if availability == 0.0 {
                translator.translate("Occupied")
            } else if availability == 100.0 {
                translator.translate("Free")
            } else {
                substitute(
                    &translator.translate("%i%% Free"),
                    round_half_up(availability),
                )
            }
        } else {
            let spots = round_half_up(allocation.quota as f64 * availability / 100.0);
            match spots {
                0 => translator.translate("No spots available"),
                1 => translator.translate("1 Spot Available"),
                n => substitute(&translator.translate("%i Spots Available"), n),
            }
        };

        let mut class = String::new();
        if availability == 0.0 {
            class = "event-fully-booked".to_string();
        }

        let mut text = text;
        let hint_availability = if allocation.approve {
            let open_spots = self.open_waitinglist_spots(allocation).await?;
            match open_spots {
                0 => {
                    text.push('\n');
                    text.push_str(&translator.translate("Full Waitinglist"));
                    class = format!("event-full-waitinglist {}", class)
                        .trim()
                        .to_string();
                }
                1 => {
                    text.push('\n');
                    text.push_str(&translator.translate("1 Waitinglist Spot"));
                }
                n => {
                    text.push('\n');
                    text.push_str(&substitute(
                        &translator.translate("%i Waitinglist Spots"),
                        n as i64,
                    ));
                }
            }

            if allocation.waitinglist_spots > 0 {
                open_spots as f64 / allocation.waitinglist_spots as f64 * 100.0
            } else {
                0.0
            }
        } else {
            availability
        };

        let class = format!("{} {}", class, event_class(hint_availability))
            .trim()
            .to_string();

        Ok(AvailabilityInfo { text, class })
    }
}

fn substitute(pattern: &str, value: i64) -> String {
    pattern
        .replace("%i", &value.to_string())
        .replace("%%", "%")
}
