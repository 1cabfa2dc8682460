//! Schedule evaluation at minute granularity.
//!
//! The pure checks ([`is_due`], [`is_in_break`], [`next_due_time`]) work on
//! local wall-clock time. [`ScheduleEvaluator`] adds the per-slot dedup so a
//! due minute yields at most one [`ScheduledAction`].

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};
use chrono_tz::Tz;
use lockwarden_core::schedule::{ConfigWarning, DEFAULT_TIMEZONE, Schedule, validate_timezone};
use lockwarden_core::types::ScheduledAction;

/// Resolve the schedule's timezone, falling back to the default.
pub fn resolve_timezone(name: &str) -> (Tz, Option<ConfigWarning>) {
    match validate_timezone(name) {
        Ok(tz) => (tz, None),
        Err(e) => (
            chrono_tz::Asia::Novosibirsk,
            Some(ConfigWarning::new(
                "timezone",
                format!("{e}, using {DEFAULT_TIMEZONE}"),
            )),
        ),
    }
}

/// Convert a UTC instant into the schedule's local wall-clock time.
pub fn local_time(schedule: &Schedule, now: DateTime<Utc>) -> (NaiveDateTime, Option<ConfigWarning>) {
    let (tz, warning) = resolve_timezone(&schedule.timezone);
    (now.with_timezone(&tz).naive_local(), warning)
}

fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// True when `now` lies inside any break of its weekday.
pub fn is_in_break(schedule: &Schedule, now: NaiveDateTime) -> bool {
    schedule.day(now.weekday()).in_break(now.time())
}

/// True during the minute of the weekday's open time, when the schedule is
/// enabled and that minute is not inside a break.
pub fn is_due(schedule: &Schedule, now: NaiveDateTime) -> bool {
    if !schedule.enabled {
        return false;
    }
    let day = schedule.day(now.weekday());
    let Some(open) = day.open_time else {
        return false;
    };
    let minute = truncate_to_minute(now);
    minute.time() == open && !day.in_break(minute.time())
}

/// The next minute after the current one at which [`is_due`] holds, looking
/// at most one week ahead.
pub fn next_due_time(schedule: &Schedule, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if !schedule.enabled {
        return None;
    }
    let current = truncate_to_minute(now);
    (0..=7)
        .filter_map(|offset| {
            let date = current.date() + Duration::days(offset);
            let open = schedule.day(date.weekday()).open_time?;
            Some(date.and_time(open))
        })
        .find(|candidate| *candidate > current && is_due(schedule, *candidate))
}

/// Stateful wrapper that hands out each due slot once.
#[derive(Debug, Default)]
pub struct ScheduleEvaluator {
    last_dispatched: Option<NaiveDateTime>,
}

impl ScheduleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the last dispatched slot (from the journal's `slot_key` format).
    pub fn with_last_slot(slot: Option<&str>) -> Self {
        let last_dispatched =
            slot.and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").ok());
        Self { last_dispatched }
    }

    pub fn last_dispatched(&self) -> Option<NaiveDateTime> {
        self.last_dispatched
    }

    /// [`is_due`], minus slots already dispatched.
    pub fn is_due(&self, schedule: &Schedule, now: NaiveDateTime) -> bool {
        is_due(schedule, now) && self.last_dispatched != Some(truncate_to_minute(now))
    }

    /// Claim the current slot if it is due and not yet dispatched.
    pub fn poll(
        &mut self,
        schedule: &Schedule,
        now: NaiveDateTime,
        schedule_version: u64,
    ) -> Option<ScheduledAction> {
        if !self.is_due(schedule, now) {
            return None;
        }
        let slot = truncate_to_minute(now);
        self.last_dispatched = Some(slot);
        Some(ScheduledAction::scheduled(slot.weekday(), slot, schedule_version))
    }
}
