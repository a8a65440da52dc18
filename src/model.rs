use crate::error::{ScheduleError, ScheduleResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const PERIOD_COUNT: usize = 7;
/// Slot 3 is the lunch break. It is never assignable; edit paths reject it.
pub const LUNCH_PERIOD: usize = 3;

pub const SCHOOL_DAYS: [&str; 6] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub fn is_school_day(name: &str) -> bool {
    SCHOOL_DAYS.contains(&name)
}

/// Canonicalize a `YYYY-MM-DD` date string, rejecting anything unparsable.
pub fn canonical_date(raw: &str) -> ScheduleResult<String> {
    let parsed = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ScheduleError::validation(format!("invalid date: {}", raw)))?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

/// Weekday name ("Monday".."Sunday") for a canonical date string.
pub fn day_name_for(date: &str) -> ScheduleResult<String> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| ScheduleError::validation(format!("invalid date: {}", date)))?;
    Ok(match parsed.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
    .to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Section {
    #[serde(rename = "SECONDARY")]
    Secondary,
    #[serde(rename = "SENIOR_SECONDARY")]
    SeniorSecondary,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Secondary => "SECONDARY",
            Self::SeniorSecondary => "SENIOR_SECONDARY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SECONDARY" => Some(Self::Secondary),
            "SENIOR_SECONDARY" => Some(Self::SeniorSecondary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSection {
    pub id: String,
    pub name: String,
    pub section: Section,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Principal,
    Staff,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Principal => "principal",
            Self::Staff => "staff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "principal" => Some(Self::Principal),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

/// Composite key of a schedule cell. Serializes as `"{classId}_{periodIndex}"`,
/// the encoding shared with clients; class ids may themselves contain `_`, so
/// decoding splits on the last separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub class_id: String,
    pub period: usize,
}

impl SlotKey {
    pub fn new(class_id: impl Into<String>, period: usize) -> Self {
        Self {
            class_id: class_id.into(),
            period,
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.class_id, self.period)
    }
}

impl FromStr for SlotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((class_id, period)) = s.rsplit_once('_') else {
            return Err(format!("malformed slot key: {}", s));
        };
        let period: usize = period
            .parse()
            .map_err(|_| format!("malformed slot key: {}", s))?;
        if class_id.is_empty() || period >= PERIOD_COUNT {
            return Err(format!("malformed slot key: {}", s));
        }
        Ok(Self::new(class_id, period))
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseScheduleEntry {
    pub teacher_id: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// One-day deviation from the base plan. At most one per slot; presence always
/// wins over the base entry when resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DailyOverride {
    #[serde(rename = "SUBSTITUTION", rename_all = "camelCase")]
    Substitution {
        sub_teacher_id: String,
        sub_subject: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_teacher_id: Option<String>,
    },
    #[serde(rename = "VACANT", rename_all = "camelCase")]
    Vacant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_teacher_id: Option<String>,
    },
    #[serde(rename = "MERGED", rename_all = "camelCase")]
    Merged {
        merged_class_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_teacher_id: Option<String>,
    },
}

impl DailyOverride {
    pub fn kind(&self) -> OverrideKind {
        match self {
            Self::Substitution { .. } => OverrideKind::Substitution,
            Self::Vacant { .. } => OverrideKind::Vacant,
            Self::Merged { .. } => OverrideKind::Merged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverrideKind {
    #[serde(rename = "SUBSTITUTION")]
    Substitution,
    #[serde(rename = "VACANT")]
    Vacant,
    #[serde(rename = "MERGED")]
    Merged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    HalfDayBefore,
    HalfDayAfter,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::HalfDayBefore => "half_day_before",
            Self::HalfDayAfter => "half_day_after",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "half_day_before" => Some(Self::HalfDayBefore),
            "half_day_after" => Some(Self::HalfDayAfter),
            _ => None,
        }
    }

    pub fn is_leave(self) -> bool {
        !matches!(self, Self::Present)
    }

    /// Whether this leave keeps the teacher out of the given period.
    /// Half days split around the lunch slot.
    pub fn covers_period(self, period: usize) -> bool {
        match self {
            Self::Present => false,
            Self::Absent => true,
            Self::HalfDayBefore => period < LUNCH_PERIOD,
            Self::HalfDayAfter => period > LUNCH_PERIOD,
        }
    }
}

/// Derived view of one schedule cell for a concrete date. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub is_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_kind: Option<OverrideKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_teacher_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub merged_class_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_round_trips_through_encoding() {
        let key = SlotKey::new("6A", 0);
        assert_eq!(key.to_string(), "6A_0");
        assert_eq!("6A_0".parse::<SlotKey>().unwrap(), key);
    }

    #[test]
    fn slot_key_decodes_class_ids_containing_separators() {
        let key: SlotKey = "sen_sec_11B_6".parse().unwrap();
        assert_eq!(key.class_id, "sen_sec_11B");
        assert_eq!(key.period, 6);
    }

    #[test]
    fn slot_key_rejects_garbage() {
        assert!("6A".parse::<SlotKey>().is_err());
        assert!("6A_x".parse::<SlotKey>().is_err());
        assert!("6A_9".parse::<SlotKey>().is_err());
        assert!("_2".parse::<SlotKey>().is_err());
    }

    #[test]
    fn override_wire_tags_are_stable() {
        let ov = DailyOverride::Substitution {
            sub_teacher_id: "T2".into(),
            sub_subject: "Math".into(),
            note: None,
            original_teacher_id: Some("T1".into()),
        };
        let v = serde_json::to_value(&ov).unwrap();
        assert_eq!(v["type"], "SUBSTITUTION");
        assert_eq!(v["subTeacherId"], "T2");
        assert_eq!(v["originalTeacherId"], "T1");
    }

    #[test]
    fn half_day_windows_split_around_lunch() {
        assert!(AttendanceStatus::HalfDayBefore.covers_period(2));
        assert!(!AttendanceStatus::HalfDayBefore.covers_period(5));
        assert!(!AttendanceStatus::HalfDayAfter.covers_period(2));
        assert!(AttendanceStatus::HalfDayAfter.covers_period(5));
        assert!(!AttendanceStatus::HalfDayBefore.covers_period(LUNCH_PERIOD));
        assert!(!AttendanceStatus::HalfDayAfter.covers_period(LUNCH_PERIOD));
    }

    #[test]
    fn day_name_derivation_matches_calendar() {
        assert_eq!(day_name_for("2024-05-06").unwrap(), "Monday");
        assert_eq!(day_name_for("2024-05-11").unwrap(), "Saturday");
        assert_eq!(day_name_for("2024-05-12").unwrap(), "Sunday");
        assert!(day_name_for("2024-13-40").is_err());
    }
}
