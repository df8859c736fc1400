/// Pure slot rules evaluated against an explicit "now"
use crate::error::{AppError, AppResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// First bookable second of the day (08:00)
pub const OPENING_SECS: u32 = 8 * 3600;
/// End of the bookable window, exclusive (20:00)
pub const CLOSING_SECS: u32 = 20 * 3600;

pub const UNNAMED: &str = "Unnamed";

/// Accept only `08:00 <= time < 20:00`
pub fn check_time_window(time: NaiveTime) -> AppResult<()> {
    let secs = time.num_seconds_from_midnight();
    if (OPENING_SECS..CLOSING_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(AppError::InvalidTimeWindow)
    }
}

/// Upcoming: later day, or today with a time strictly after now
pub fn is_upcoming(date: NaiveDate, time: NaiveTime, now: NaiveDateTime) -> bool {
    date > now.date() || (date == now.date() && time > now.time())
}

/// Booker-side rule: the slot must lie strictly after now
pub fn check_not_past(date: NaiveDate, time: NaiveTime, now: NaiveDateTime) -> AppResult<()> {
    if is_upcoming(date, time, now) {
        Ok(())
    } else {
        Err(AppError::PastDateOrTime)
    }
}

/// Scheduler-side rule: a linked booker or a non-empty free-text name
pub fn require_booker_identity(booker: Option<i64>, booker_name: Option<&str>) -> AppResult<()> {
    let named = booker_name.is_some_and(|n| !n.trim().is_empty());
    if booker.is_some() || named {
        Ok(())
    } else {
        Err(AppError::MissingBookerIdentity)
    }
}

/// Name shown to schedulers for an appointment
pub fn display_name(linked: Option<(&str, &str)>, booker_name: &str) -> String {
    match linked {
        Some((name, family)) => format!("{} {}", name, family),
        None if !booker_name.is_empty() => booker_name.to_string(),
        None => UNNAMED.to_string(),
    }
}

/// Slots are whole seconds
pub fn normalize_time(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Accept `HH:MM` and `HH:MM:SS`
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
        .map(normalize_time)
}

/// serde helpers for time-of-day payload fields
pub mod time_format {
    use super::parse_time;
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_time(&raw).ok_or_else(|| de::Error::custom(format!("invalid time: {}", raw)))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_time(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time: {}", raw))),
            None => Ok(None),
        }
    }
}

/// Distinguishes an absent field from an explicit `null`
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}
