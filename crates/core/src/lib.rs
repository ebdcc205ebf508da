pub mod activity;
pub mod bucket;
pub mod calendar;
pub mod push;

pub use activity::{newest_first, Activity, EventKind, EventSummary, UnknownEventKind};
pub use bucket::{activity_count, group_by_day, DayBucket};
pub use calendar::{CalendarZone, CalendarZoneError};
pub use push::{PushError, PushNotification};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
