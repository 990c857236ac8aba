use crate::error::{NotifyError, Result};
use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Wall-clock time of day with minute resolution.
///
/// Parses and renders as zero-padded 24-hour "HH:MM", the format carried on
/// the control channel. Ordering follows the clock, so window containment is
/// a plain range check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(NotifyError::InvalidTimeOfDay(format!(
                "{:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };
    pub const END_OF_DAY: TimeOfDay = TimeOfDay {
        hour: 23,
        minute: 59,
    };

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl FromStr for TimeOfDay {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || NotifyError::InvalidTimeOfDay(s.to_string());
        let (hour, minute) = s.split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = NotifyError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Same-day allow window for one weekday, start and end inclusive.
///
/// A window whose start is after its end cannot be constructed or
/// deserialized; rejection happens at ingestion so the containment check
/// never sees an inverted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WindowRepr")]
pub struct ScheduleWindow {
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

#[derive(Deserialize)]
struct WindowRepr {
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

impl TryFrom<WindowRepr> for ScheduleWindow {
    type Error = NotifyError;

    fn try_from(repr: WindowRepr) -> Result<Self> {
        Self::new(repr.start_time, repr.end_time)
    }
}

impl ScheduleWindow {
    pub fn new(start_time: TimeOfDay, end_time: TimeOfDay) -> Result<Self> {
        if start_time > end_time {
            return Err(NotifyError::InvalidWindow {
                start: start_time.to_string(),
                end: end_time.to_string(),
            });
        }
        Ok(Self {
            start_time,
            end_time,
        })
    }

    /// 00:00–23:59, the default for any weekday without an explicit window.
    pub fn full_day() -> Self {
        Self {
            start_time: TimeOfDay::MIDNIGHT,
            end_time: TimeOfDay::END_OF_DAY,
        }
    }

    /// Boundary-inclusive containment: a time equal to start or end is inside.
    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start_time <= time && time <= self.end_time
    }

    pub fn start_time(&self) -> TimeOfDay {
        self.start_time
    }

    pub fn end_time(&self) -> TimeOfDay {
        self.end_time
    }
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        Self::full_day()
    }
}

/// Weekly map of allow windows keyed by weekday.
///
/// Weekdays absent from the map default to the full-day window. A schedule
/// delta merges by weekday: only the weekdays present in the delta are
/// replaced, all others keep their current window. On the wire, keys are
/// lowercase full English weekday names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekSchedule {
    windows: HashMap<Weekday, ScheduleWindow>,
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    WEEKDAYS.into_iter().find(|day| weekday_name(*day) == name)
}

impl WeekSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, day: Weekday, window: ScheduleWindow) {
        self.windows.insert(day, window);
    }

    /// Effective window for a weekday, full-day when unset.
    pub fn window_for(&self, day: Weekday) -> ScheduleWindow {
        self.windows
            .get(&day)
            .copied()
            .unwrap_or_else(ScheduleWindow::full_day)
    }

    /// Merge a delta by weekday. Weekdays absent from the delta are untouched.
    pub fn merge(&mut self, delta: &WeekSchedule) {
        for (day, window) in &delta.windows {
            self.windows.insert(*day, *window);
        }
    }

    /// True when the instant's time of day falls inside the window for the
    /// instant's weekday. Date and timezone play no part beyond resolving the
    /// host-local weekday and time of day.
    pub fn is_within_window(&self, now: NaiveDateTime) -> bool {
        let time = TimeOfDay {
            hour: now.time().hour() as u8,
            minute: now.time().minute() as u8,
        };
        self.window_for(now.weekday()).contains(time)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }
}

impl Serialize for WeekSchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.windows.len()))?;
        for day in WEEKDAYS {
            if let Some(window) = self.windows.get(&day) {
                map.serialize_entry(weekday_name(day), window)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WeekSchedule {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let named: HashMap<String, ScheduleWindow> = HashMap::deserialize(deserializer)?;
        let mut windows = HashMap::with_capacity(named.len());
        for (name, window) in named {
            let day = weekday_from_name(&name)
                .ok_or_else(|| D::Error::custom(format!("unknown weekday '{}'", name)))?;
            windows.insert(day, window);
        }
        Ok(Self { windows })
    }
}
