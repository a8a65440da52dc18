use crate::error::{ScheduleError, ScheduleResult};
use crate::model::{self, LUNCH_PERIOD, PERIOD_COUNT};

pub fn required_str(params: &serde_json::Value, key: &str) -> ScheduleResult<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScheduleError::validation(format!("missing {}", key)))
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Canonical `YYYY-MM-DD` date parameter.
pub fn required_date(params: &serde_json::Value, key: &str) -> ScheduleResult<String> {
    model::canonical_date(&required_str(params, key)?)
}

/// Period index for an edit path: in range and never the lunch slot.
pub fn assignable_period(params: &serde_json::Value, key: &str) -> ScheduleResult<usize> {
    let period = any_period(params, key)?;
    if period == LUNCH_PERIOD {
        return Err(ScheduleError::validation(format!(
            "period {} is the lunch slot and cannot be assigned",
            LUNCH_PERIOD
        )));
    }
    Ok(period)
}

/// Period index for a query path: in range, lunch allowed.
pub fn any_period(params: &serde_json::Value, key: &str) -> ScheduleResult<usize> {
    let raw = params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ScheduleError::validation(format!("missing {}", key)))?;
    let period = raw as usize;
    if period >= PERIOD_COUNT {
        return Err(ScheduleError::validation(format!(
            "period index out of range: {}",
            period
        )));
    }
    Ok(period)
}

/// Explicit school-day name parameter.
pub fn required_day(params: &serde_json::Value, key: &str) -> ScheduleResult<String> {
    let day = required_str(params, key)?;
    if !model::is_school_day(&day) {
        return Err(ScheduleError::validation(format!(
            "not a school day: {}",
            day
        )));
    }
    Ok(day)
}

/// Day name for a dated query: the explicit `dayName` param when given,
/// otherwise derived from the date. Sundays are rejected either way.
pub fn day_for_date(params: &serde_json::Value, date: &str) -> ScheduleResult<String> {
    let day = match optional_str(params, "dayName") {
        Some(day) => day,
        None => model::day_name_for(date)?,
    };
    if !model::is_school_day(&day) {
        return Err(ScheduleError::validation(format!(
            "not a school day: {}",
            day
        )));
    }
    Ok(day)
}
