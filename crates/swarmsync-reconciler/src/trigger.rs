//! Sweep triggers.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Timelike};
use swarmsync_core::Schedule;

/// Decides when the driver starts a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Evaluate a schedule once per wall-clock minute.
    Schedule(Schedule),

    /// Sweep at a fixed interval.
    Interval(Duration),
}

impl Trigger {
    /// Uses `schedule` when present, otherwise `interval`.
    pub fn new(schedule: Option<Schedule>, interval: Duration) -> Self {
        schedule.map_or(Self::Interval(interval), Self::Schedule)
    }

    /// Returns how long to wait before the next evaluation.
    ///
    /// Schedules are evaluated at the start of each minute.
    ///
    /// ```
    /// use std::time::Duration;
    /// use chrono::{TimeZone, Utc};
    /// use swarmsync_core::Schedule;
    /// use swarmsync_reconciler::Trigger;
    ///
    /// let trigger = Trigger::Schedule(Schedule::parse(["* * * * *"]));
    /// let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 15, 45).unwrap();
    /// assert_eq!(trigger.next_wait(&now), Duration::from_secs(15));
    /// ```
    pub fn next_wait<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Duration {
        match self {
            Self::Interval(interval) => *interval,
            Self::Schedule(_) => {
                let elapsed = Duration::new(
                    u64::from(now.second()),
                    now.nanosecond().min(999_999_999),
                );
                Duration::from_secs(60).saturating_sub(elapsed)
            }
        }
    }

    /// Returns true if a sweep should start at `now`.
    ///
    /// An invalid schedule is logged and never due.
    pub fn is_due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        match self {
            Self::Interval(_) => true,
            Self::Schedule(schedule) => match schedule.due_now(now) {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!(schedule = %schedule, error = %e, "invalid schedule, not sweeping");
                    false
                }
            },
        }
    }

    /// Returns the minute `now` falls in, for schedule de-duplication.
    pub(crate) fn minute_of<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        now.with_second(0).and_then(|t| t.with_nanosecond(0))
    }
}
