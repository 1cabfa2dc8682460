//! Weekly schedule: per-weekday open time plus break windows.
//!
//! Persisted as JSON:
//! ```json
//! {
//!   "timezone": "Asia/Novosibirsk",
//!   "schedule_enabled": true,
//!   "open_times": { "mon": "09:00", "tue": "09:00" },
//!   "breaks": { "mon": ["12:00-13:00"] }
//! }
//! ```
//! Loading is tolerant: every field falls back on its own, and each fallback
//! is reported as a [`ConfigWarning`] instead of failing the load.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timezone used when the configured one is missing or unknown.
pub const DEFAULT_TIMEZONE: &str = "Asia/Novosibirsk";

/// Open time applied Monday to Friday when `open_times` is absent.
pub const DEFAULT_OPEN_TIME: &str = "09:00";

/// Monday-first week order, matching `Weekday::num_days_from_monday`.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Errors from schedule edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid break '{0}', expected HH:MM-HH:MM")]
    InvalidBreak(String),

    #[error("unknown weekday '{0}'")]
    InvalidWeekday(String),

    #[error("break start {start} must be before end {end}")]
    EmptyBreak { start: String, end: String },

    #[error("break {new} overlaps existing break {existing}")]
    Overlap { new: String, existing: String },

    #[error("no break #{index} on {day} ({len} configured)")]
    BreakIndexOutOfRange { day: String, index: usize, len: usize },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

/// A configuration field that fell back to its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Canonical persisted key for a weekday.
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Parse a weekday from English short/full names (any case) or the Russian
/// two-letter abbreviations written by older deployments.
pub fn parse_weekday(input: &str) -> Option<Weekday> {
    let trimmed = input.trim();
    match trimmed {
        "Пн" | "пн" => return Some(Weekday::Mon),
        "Вт" | "вт" => return Some(Weekday::Tue),
        "Ср" | "ср" => return Some(Weekday::Wed),
        "Чт" | "чт" => return Some(Weekday::Thu),
        "Пт" | "пт" => return Some(Weekday::Fri),
        "Сб" | "сб" => return Some(Weekday::Sat),
        "Вс" | "вс" => return Some(Weekday::Sun),
        _ => {}
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parse `HH:MM` (24h). Seconds are not accepted.
pub fn parse_hhmm(input: &str) -> Option<NaiveTime> {
    let (h, m) = input.trim().split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Validate an IANA timezone name.
pub fn validate_timezone(name: &str) -> Result<chrono_tz::Tz, ScheduleError> {
    name.trim()
        .parse::<chrono_tz::Tz>()
        .map_err(|_| ScheduleError::UnknownTimezone(name.to_string()))
}

/// A half-open break interval `[start, end)` in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BreakWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ScheduleError> {
        if start >= end {
            return Err(ScheduleError::EmptyBreak {
                start: format_hhmm(start),
                end: format_hhmm(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse `HH:MM-HH:MM`.
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let (start, end) = input
            .split_once('-')
            .ok_or_else(|| ScheduleError::InvalidBreak(input.to_string()))?;
        let start = parse_hhmm(start).ok_or_else(|| ScheduleError::InvalidBreak(input.to_string()))?;
        let end = parse_hhmm(end).ok_or_else(|| ScheduleError::InvalidBreak(input.to_string()))?;
        Self::new(start, end)
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    pub fn overlaps(&self, other: &BreakWindow) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl std::fmt::Display for BreakWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", format_hhmm(self.start), format_hhmm(self.end))
    }
}

/// One weekday's plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySchedule {
    /// `None` means no scheduled action on this day.
    pub open_time: Option<NaiveTime>,
    /// Non-overlapping, sorted by start.
    pub breaks: Vec<BreakWindow>,
}

impl DaySchedule {
    pub fn in_break(&self, time: NaiveTime) -> bool {
        self.breaks.iter().any(|b| b.contains(time))
    }
}

/// The weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub timezone: String,
    pub enabled: bool,
    days: [DaySchedule; 7],
}

impl Default for Schedule {
    fn default() -> Self {
        let mut days: [DaySchedule; 7] = Default::default();
        let open = parse_hhmm(DEFAULT_OPEN_TIME);
        for day in days.iter_mut().take(5) {
            day.open_time = open;
        }
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            enabled: true,
            days,
        }
    }
}

impl Schedule {
    /// A schedule with no open times and no breaks.
    pub fn empty(timezone: &str) -> Self {
        Self {
            timezone: timezone.to_string(),
            enabled: true,
            days: Default::default(),
        }
    }

    pub fn day(&self, weekday: Weekday) -> &DaySchedule {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    fn day_mut(&mut self, weekday: Weekday) -> &mut DaySchedule {
        &mut self.days[weekday.num_days_from_monday() as usize]
    }

    /// Days in Monday-first order.
    pub fn days(&self) -> impl Iterator<Item = (Weekday, &DaySchedule)> {
        WEEKDAYS.iter().map(move |d| (*d, self.day(*d)))
    }

    pub fn open_time(&self, weekday: Weekday) -> Option<NaiveTime> {
        self.day(weekday).open_time
    }

    pub fn set_open_time(&mut self, weekday: Weekday, time: NaiveTime) {
        self.day_mut(weekday).open_time = Some(time);
    }

    pub fn clear_open_time(&mut self, weekday: Weekday) {
        self.day_mut(weekday).open_time = None;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_timezone(&mut self, name: &str) -> Result<(), ScheduleError> {
        let tz = validate_timezone(name)?;
        self.timezone = tz.name().to_string();
        Ok(())
    }

    /// Insert a break keeping the day's list sorted; overlapping breaks are refused.
    pub fn add_break(&mut self, weekday: Weekday, window: BreakWindow) -> Result<(), ScheduleError> {
        let day = self.day_mut(weekday);
        if let Some(existing) = day.breaks.iter().find(|b| b.overlaps(&window)) {
            return Err(ScheduleError::Overlap {
                new: window.to_string(),
                existing: existing.to_string(),
            });
        }
        let pos = day
            .breaks
            .iter()
            .position(|b| b.start > window.start)
            .unwrap_or(day.breaks.len());
        day.breaks.insert(pos, window);
        Ok(())
    }

    /// Remove the break at a zero-based `index`.
    pub fn remove_break(&mut self, weekday: Weekday, index: usize) -> Result<BreakWindow, ScheduleError> {
        let day = self.day_mut(weekday);
        if index >= day.breaks.len() {
            return Err(ScheduleError::BreakIndexOutOfRange {
                day: weekday_key(weekday).to_string(),
                index: index + 1,
                len: day.breaks.len(),
            });
        }
        Ok(day.breaks.remove(index))
    }

    /// Merge a raw (possibly malformed) file with defaults, field by field.
    pub fn from_raw(raw: RawSchedule) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();
        let defaults = Schedule::default();

        let timezone = match raw.timezone {
            None => defaults.timezone.clone(),
            Some(Value::String(name)) => match validate_timezone(&name) {
                Ok(tz) => tz.name().to_string(),
                Err(e) => {
                    warnings.push(ConfigWarning::new(
                        "timezone",
                        format!("{e}, using {DEFAULT_TIMEZONE}"),
                    ));
                    defaults.timezone.clone()
                }
            },
            Some(other) => {
                warnings.push(ConfigWarning::new(
                    "timezone",
                    format!("expected a string, got {other}, using {DEFAULT_TIMEZONE}"),
                ));
                defaults.timezone.clone()
            }
        };

        let enabled = match raw.schedule_enabled {
            None => defaults.enabled,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                warnings.push(ConfigWarning::new(
                    "schedule_enabled",
                    format!("expected true/false, got {other}, using {}", defaults.enabled),
                ));
                defaults.enabled
            }
        };

        let mut schedule = Schedule::empty(&timezone);
        schedule.enabled = enabled;

        match raw.open_times {
            None => {
                for (day, plan) in defaults.days() {
                    schedule.day_mut(day).open_time = plan.open_time;
                }
            }
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    let Some(day) = parse_weekday(&key) else {
                        warnings.push(ConfigWarning::new(
                            format!("open_times.{key}"),
                            "unknown weekday, entry ignored",
                        ));
                        continue;
                    };
                    match value {
                        Value::Null => {}
                        Value::String(s) => match parse_hhmm(&s) {
                            Some(t) => schedule.set_open_time(day, t),
                            None => warnings.push(ConfigWarning::new(
                                format!("open_times.{key}"),
                                format!("invalid time '{s}', no scheduled action that day"),
                            )),
                        },
                        other => warnings.push(ConfigWarning::new(
                            format!("open_times.{key}"),
                            format!("expected \"HH:MM\", got {other}, no scheduled action that day"),
                        )),
                    }
                }
            }
            Some(other) => {
                warnings.push(ConfigWarning::new(
                    "open_times",
                    format!("expected an object, got {other}, using defaults"),
                ));
                for (day, plan) in defaults.days() {
                    schedule.day_mut(day).open_time = plan.open_time;
                }
            }
        }

        match raw.breaks {
            None => {}
            Some(Value::Object(map)) => {
                for (key, value) in map {
                    let Some(day) = parse_weekday(&key) else {
                        warnings.push(ConfigWarning::new(
                            format!("breaks.{key}"),
                            "unknown weekday, entry ignored",
                        ));
                        continue;
                    };
                    let Value::Array(items) = value else {
                        warnings.push(ConfigWarning::new(
                            format!("breaks.{key}"),
                            "expected a list of \"HH:MM-HH:MM\", entry ignored",
                        ));
                        continue;
                    };
                    for item in items {
                        let parsed = match &item {
                            Value::String(s) => BreakWindow::parse(s),
                            Value::Array(pair) if pair.len() == 2 => {
                                match (pair[0].as_str(), pair[1].as_str()) {
                                    (Some(s), Some(e)) => BreakWindow::parse(&format!("{s}-{e}")),
                                    _ => Err(ScheduleError::InvalidBreak(item.to_string())),
                                }
                            }
                            _ => Err(ScheduleError::InvalidBreak(item.to_string())),
                        };
                        if let Err(e) = parsed.and_then(|w| schedule.add_break(day, w)) {
                            warnings.push(ConfigWarning::new(
                                format!("breaks.{key}"),
                                format!("{e}, break ignored"),
                            ));
                        }
                    }
                }
            }
            Some(other) => warnings.push(ConfigWarning::new(
                "breaks",
                format!("expected an object, got {other}, no breaks applied"),
            )),
        }

        (schedule, warnings)
    }

    /// Parse file contents; unreadable JSON yields the default schedule.
    pub fn from_json_str(content: &str) -> (Self, Vec<ConfigWarning>) {
        match serde_json::from_str::<RawSchedule>(content) {
            Ok(raw) => Self::from_raw(raw),
            Err(e) => (
                Self::default(),
                vec![ConfigWarning::new(
                    "schedule",
                    format!("unreadable schedule file ({e}), using defaults"),
                )],
            ),
        }
    }

    /// The persisted representation.
    pub fn to_file(&self) -> ScheduleFile {
        let mut open_times = WeekTable::default();
        let mut breaks = WeekTable::default();
        for (day, plan) in self.days() {
            if let Some(t) = plan.open_time {
                *open_times.slot_mut(day) = Some(format_hhmm(t));
            }
            if !plan.breaks.is_empty() {
                *breaks.slot_mut(day) = Some(plan.breaks.iter().map(|b| b.to_string()).collect());
            }
        }
        ScheduleFile {
            timezone: self.timezone.clone(),
            schedule_enabled: self.enabled,
            open_times,
            breaks,
        }
    }

    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_file())?)
    }
}

/// Schedule file as read from disk, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawSchedule {
    #[serde(default)]
    pub timezone: Option<Value>,
    #[serde(default)]
    pub schedule_enabled: Option<Value>,
    #[serde(default)]
    pub open_times: Option<Value>,
    #[serde(default)]
    pub breaks: Option<Value>,
}

/// Schedule file as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleFile {
    pub timezone: String,
    pub schedule_enabled: bool,
    pub open_times: WeekTable<String>,
    pub breaks: WeekTable<Vec<String>>,
}

/// Monday-first map with one optional slot per weekday.
#[derive(Debug, Clone, Serialize)]
pub struct WeekTable<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mon: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tue: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wed: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thu: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fri: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sun: Option<T>,
}

impl<T> Default for WeekTable<T> {
    fn default() -> Self {
        Self {
            mon: None,
            tue: None,
            wed: None,
            thu: None,
            fri: None,
            sat: None,
            sun: None,
        }
    }
}

impl<T> WeekTable<T> {
    fn slot_mut(&mut self, day: Weekday) -> &mut Option<T> {
        match day {
            Weekday::Mon => &mut self.mon,
            Weekday::Tue => &mut self.tue,
            Weekday::Wed => &mut self.wed,
            Weekday::Thu => &mut self.thu,
            Weekday::Fri => &mut self.fri,
            Weekday::Sat => &mut self.sat,
            Weekday::Sun => &mut self.sun,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    #[test]
    fn test_default_schedule() {
        let s = Schedule::default();
        assert_eq!(s.timezone, DEFAULT_TIMEZONE);
        assert!(s.enabled);
        assert_eq!(s.open_time(Weekday::Mon), Some(t("09:00")));
        assert_eq!(s.open_time(Weekday::Fri), Some(t("09:00")));
        assert_eq!(s.open_time(Weekday::Sat), None);
        assert_eq!(s.open_time(Weekday::Sun), None);
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("9:05"), Some(t("09:05")));
        assert_eq!(parse_hhmm(" 23:59 "), Some(t("23:59")));
        assert!(parse_hhmm("24:00").is_none());
        assert!(parse_hhmm("12:60").is_none());
        assert!(parse_hhmm("1200").is_none());
        assert!(parse_hhmm("12:5").is_none());
    }

    #[test]
    fn test_parse_weekday_aliases() {
        assert_eq!(parse_weekday("mon"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("Thursday"), Some(Weekday::Thu));
        assert_eq!(parse_weekday("Пн"), Some(Weekday::Mon));
        assert_eq!(parse_weekday("Вс"), Some(Weekday::Sun));
        assert_eq!(parse_weekday("someday"), None);
    }

    #[test]
    fn test_break_window_half_open() {
        let b = BreakWindow::parse("12:00-13:00").unwrap();
        assert!(b.contains(t("12:00")));
        assert!(b.contains(t("12:59")));
        assert!(!b.contains(t("13:00")));
        assert!(!b.contains(t("11:59")));
        assert!(BreakWindow::parse("13:00-12:00").is_err());
        assert!(BreakWindow::parse("13:00-13:00").is_err());
        assert!(BreakWindow::parse("noon").is_err());
    }

    #[test]
    fn test_add_break_sorted_and_rejects_overlap() {
        let mut s = Schedule::default();
        s.add_break(Weekday::Tue, BreakWindow::parse("15:00-16:00").unwrap())
            .unwrap();
        s.add_break(Weekday::Tue, BreakWindow::parse("12:00-13:00").unwrap())
            .unwrap();
        // Adjacent intervals do not overlap.
        s.add_break(Weekday::Tue, BreakWindow::parse("13:00-14:00").unwrap())
            .unwrap();
        let err = s
            .add_break(Weekday::Tue, BreakWindow::parse("12:30-12:45").unwrap())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::Overlap { .. }));

        let listed: Vec<String> = s.day(Weekday::Tue).breaks.iter().map(|b| b.to_string()).collect();
        assert_eq!(listed, vec!["12:00-13:00", "13:00-14:00", "15:00-16:00"]);
    }

    #[test]
    fn test_remove_break() {
        let mut s = Schedule::default();
        s.add_break(Weekday::Wed, BreakWindow::parse("12:00-13:00").unwrap())
            .unwrap();
        let err = s.remove_break(Weekday::Wed, 3).unwrap_err();
        assert!(matches!(err, ScheduleError::BreakIndexOutOfRange { len: 1, .. }));
        let removed = s.remove_break(Weekday::Wed, 0).unwrap();
        assert_eq!(removed.to_string(), "12:00-13:00");
        assert!(s.day(Weekday::Wed).breaks.is_empty());
    }

    #[test]
    fn test_set_timezone_validates() {
        let mut s = Schedule::default();
        s.set_timezone("Europe/Moscow").unwrap();
        assert_eq!(s.timezone, "Europe/Moscow");
        assert!(s.set_timezone("Invalid/Timezone").is_err());
        assert_eq!(s.timezone, "Europe/Moscow");
    }

    #[test]
    fn test_from_raw_falls_back_per_field() {
        let json = r#"{
            "timezone": "Mars/Olympus",
            "schedule_enabled": "yes",
            "open_times": {"Пн": "08:30", "tue": "25:00", "funday": "10:00", "sat": "11:00"},
            "breaks": {"mon": ["12:00-13:00", "12:30-12:40", "bad"], "wed": "oops"}
        }"#;
        let (s, warnings) = Schedule::from_json_str(json);
        assert_eq!(s.timezone, DEFAULT_TIMEZONE);
        assert!(s.enabled);
        assert_eq!(s.open_time(Weekday::Mon), Some(t("08:30")));
        // Malformed day → no scheduled action that day, others unaffected.
        assert_eq!(s.open_time(Weekday::Tue), None);
        assert_eq!(s.open_time(Weekday::Sat), Some(t("11:00")));
        assert_eq!(s.open_time(Weekday::Fri), None);
        assert_eq!(s.day(Weekday::Mon).breaks.len(), 1);

        let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert!(fields.contains(&"timezone"));
        assert!(fields.contains(&"schedule_enabled"));
        assert!(fields.contains(&"open_times.tue"));
        assert!(fields.contains(&"open_times.funday"));
        assert!(fields.contains(&"breaks.mon"));
        assert!(fields.contains(&"breaks.wed"));
    }

    #[test]
    fn test_missing_fields_use_defaults_silently() {
        let (s, warnings) = Schedule::from_json_str("{}");
        assert_eq!(s, Schedule::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unreadable_file_uses_defaults() {
        let (s, warnings) = Schedule::from_json_str("{ not json");
        assert_eq!(s, Schedule::default());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "schedule");
    }

    #[test]
    fn test_json_round_trip() {
        let mut s = Schedule::empty("Asia/Tomsk");
        s.set_enabled(false);
        s.set_open_time(Weekday::Mon, t("09:00"));
        s.set_open_time(Weekday::Sun, t("11:15"));
        s.add_break(Weekday::Mon, BreakWindow::parse("14:00-15:00").unwrap())
            .unwrap();
        s.add_break(Weekday::Mon, BreakWindow::parse("10:00-10:30").unwrap())
            .unwrap();
        s.add_break(Weekday::Thu, BreakWindow::parse("12:00-13:00").unwrap())
            .unwrap();

        let json = s.to_json_string().unwrap();
        let (back, warnings) = Schedule::from_json_str(&json);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(back, s);
        assert!(json.contains("\"mon\": \"09:00\""));
        assert!(!json.contains("\"tue\""));
    }
}
