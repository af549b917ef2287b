use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Where a point in time falls relative to a work schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    OffHours,
    OnBreak,
    Working,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleState::OffHours => "off_hours",
            ScheduleState::OnBreak => "on_break",
            ScheduleState::Working => "working",
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSchedule {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub breaks: Vec<BreakWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    pub duration_minutes: u32,
}

impl BreakWindow {
    /// End of the break on `date`, reduced to a time of day.
    ///
    /// A break running past midnight wraps around, so its end sorts before
    /// its start and [`BreakWindow::contains`] never matches it.
    pub fn end_on(&self, date: NaiveDate) -> Option<NaiveTime> {
        date.and_time(self.start)
            .checked_add_signed(TimeDelta::minutes(i64::from(self.duration_minutes)))
            .map(|end| end.time())
    }

    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let time = now.time();
        match self.end_on(now.date()) {
            Some(end) => self.start <= time && time <= end,
            None => false,
        }
    }
}

impl WorkSchedule {
    pub fn is_work_time(&self, now: NaiveDateTime) -> bool {
        let time = now.time();
        self.start_time <= time && time <= self.end_time
    }

    pub fn is_break_time(&self, now: NaiveDateTime) -> bool {
        self.breaks.iter().any(|b| b.contains(now))
    }
}

/// Classify `now` against `schedule`.
///
/// Off-hours wins over everything: breaks are only consulted once `now` is
/// inside the work window. Both window ends are inclusive.
pub fn classify(now: NaiveDateTime, schedule: &WorkSchedule) -> ScheduleState {
    if !schedule.is_work_time(now) {
        return ScheduleState::OffHours;
    }
    if schedule.is_break_time(now) {
        return ScheduleState::OnBreak;
    }
    ScheduleState::Working
}

/// Parse `HH:MM` (or `HH:MM:SS`) into a time of day.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M").or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
}

mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        let formatted = if time.second() == 0 {
            time.format("%H:%M").to_string()
        } else {
            time.format("%H:%M:%S").to_string()
        };
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw)
            .map_err(|e| serde::de::Error::custom(format!("invalid time of day '{raw}': {e}")))
    }
}
