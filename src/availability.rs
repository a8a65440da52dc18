use crate::error::ScheduleResult;
use crate::model::{AttendanceStatus, EffectiveEntry, SlotKey, LUNCH_PERIOD};
use crate::resolve;
use crate::store::ScheduleStore;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeacherStatus {
    Absent,
    MorningLeave,
    AfternoonLeave,
    Busy { class_name: String },
    Free,
}

impl TeacherStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Absent => "ABSENT",
            Self::MorningLeave => "MORNING_LEAVE",
            Self::AfternoonLeave => "AFTERNOON_LEAVE",
            Self::Busy { .. } => "BUSY",
            Self::Free => "FREE",
        }
    }
}

/// One fetch of everything availability questions need for a (date, day)
/// pair: the effective schedule, the day's attendance marks, and class
/// display names. Candidate searches ask about every teacher at every
/// period, so the fetch happens once, not per question.
pub struct DaySnapshot {
    effective: HashMap<SlotKey, EffectiveEntry>,
    attendance: HashMap<String, AttendanceStatus>,
    class_names: HashMap<String, String>,
}

impl DaySnapshot {
    pub fn load(store: &dyn ScheduleStore, date: &str, day: &str) -> ScheduleResult<Self> {
        let effective = resolve::resolve(store, date, day)?;
        let attendance = store.attendance_for(date)?;
        let class_names = store
            .classes()?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        Ok(Self {
            effective,
            attendance,
            class_names,
        })
    }

    /// First match wins, in precedence order: full-day absence, the matching
    /// half-day window, a schedule cell naming this teacher, then free.
    pub fn status(&self, teacher_id: &str, period: usize) -> TeacherStatus {
        self.status_excluding(teacher_id, period, &HashSet::new())
    }

    /// Busy/free check for substitute searches. Classes in `exclude` are
    /// skipped so the vacated class itself never reads as a conflict.
    pub fn is_free(&self, teacher_id: &str, period: usize, exclude: &HashSet<String>) -> bool {
        matches!(
            self.status_excluding(teacher_id, period, exclude),
            TeacherStatus::Free
        )
    }

    fn status_excluding(
        &self,
        teacher_id: &str,
        period: usize,
        exclude: &HashSet<String>,
    ) -> TeacherStatus {
        match self.attendance.get(teacher_id) {
            Some(AttendanceStatus::Absent) => return TeacherStatus::Absent,
            Some(AttendanceStatus::HalfDayBefore) if period < LUNCH_PERIOD => {
                return TeacherStatus::MorningLeave;
            }
            Some(AttendanceStatus::HalfDayAfter) if period > LUNCH_PERIOD => {
                return TeacherStatus::AfternoonLeave;
            }
            _ => {}
        }

        // A teacher in two classes at once is a data anomaly; report the
        // smallest key so the answer is at least deterministic.
        let busy_class = self
            .effective
            .iter()
            .filter(|(key, entry)| {
                key.period == period
                    && !exclude.contains(&key.class_id)
                    && entry.teacher_id.as_deref() == Some(teacher_id)
            })
            .map(|(key, _)| key)
            .min();

        match busy_class {
            Some(key) => TeacherStatus::Busy {
                class_name: self
                    .class_names
                    .get(&key.class_id)
                    .cloned()
                    .unwrap_or_else(|| key.class_id.clone()),
            },
            None => TeacherStatus::Free,
        }
    }
}

/// Convenience wrapper for one-off status questions over the store.
pub fn status(
    store: &dyn ScheduleStore,
    teacher_id: &str,
    date: &str,
    day: &str,
    period: usize,
) -> ScheduleResult<TeacherStatus> {
    Ok(DaySnapshot::load(store, date, day)?.status(teacher_id, period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BaseScheduleEntry, ClassSection, DailyOverride, Section, Teacher};
    use crate::store::{MemoryStore, ScheduleStore, Snapshot};

    fn school() -> MemoryStore {
        let store = MemoryStore::from_snapshot(Snapshot {
            classes: vec![
                ClassSection {
                    id: "6A".into(),
                    name: "Class 6-A".into(),
                    section: Section::Secondary,
                },
                ClassSection {
                    id: "11S".into(),
                    name: "Class 11-Science".into(),
                    section: Section::SeniorSecondary,
                },
            ],
            teachers: vec![
                Teacher {
                    id: "T1".into(),
                    name: "A. Verma".into(),
                    subject: Some("Math".into()),
                },
                Teacher {
                    id: "T2".into(),
                    name: "B. Rao".into(),
                    subject: Some("English".into()),
                },
            ],
            ..Snapshot::default()
        });
        for period in [0usize, 2, 4] {
            store
                .save_base_entry(
                    "Monday",
                    "6A",
                    period,
                    Some(&BaseScheduleEntry {
                        teacher_id: "T1".into(),
                        subject: "Math".into(),
                        note: None,
                    }),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn absent_wins_for_every_period_regardless_of_schedule() {
        let store = school();
        store
            .mark_attendance("2024-05-06", "T1", AttendanceStatus::Absent)
            .unwrap();
        let snap = DaySnapshot::load(&store, "2024-05-06", "Monday").unwrap();
        for period in 0..7 {
            assert_eq!(snap.status("T1", period), TeacherStatus::Absent);
        }
    }

    #[test]
    fn morning_leave_only_applies_before_lunch() {
        let store = school();
        store
            .save_base_entry(
                "Monday",
                "6A",
                5,
                Some(&BaseScheduleEntry {
                    teacher_id: "T1".into(),
                    subject: "Math".into(),
                    note: None,
                }),
            )
            .unwrap();
        store
            .mark_attendance("2024-05-06", "T1", AttendanceStatus::HalfDayBefore)
            .unwrap();
        let snap = DaySnapshot::load(&store, "2024-05-06", "Monday").unwrap();

        assert_eq!(snap.status("T1", 2), TeacherStatus::MorningLeave);
        // Past lunch the schedule decides, not the half-day mark.
        assert_eq!(
            snap.status("T1", 5),
            TeacherStatus::Busy {
                class_name: "Class 6-A".into()
            }
        );
        assert_eq!(snap.status("T1", 6), TeacherStatus::Free);
    }

    #[test]
    fn afternoon_leave_only_applies_after_lunch() {
        let store = school();
        store
            .mark_attendance("2024-05-06", "T1", AttendanceStatus::HalfDayAfter)
            .unwrap();
        let snap = DaySnapshot::load(&store, "2024-05-06", "Monday").unwrap();
        assert_eq!(
            snap.status("T1", 0),
            TeacherStatus::Busy {
                class_name: "Class 6-A".into()
            }
        );
        assert_eq!(snap.status("T1", 4), TeacherStatus::AfternoonLeave);
    }

    #[test]
    fn substitutes_count_as_busy_in_the_covering_class() {
        let store = school();
        store
            .save_override(
                "2024-05-06",
                "6A",
                0,
                Some(&DailyOverride::Substitution {
                    sub_teacher_id: "T2".into(),
                    sub_subject: "Math".into(),
                    note: None,
                    original_teacher_id: Some("T1".into()),
                }),
            )
            .unwrap();
        let snap = DaySnapshot::load(&store, "2024-05-06", "Monday").unwrap();
        assert_eq!(
            snap.status("T2", 0),
            TeacherStatus::Busy {
                class_name: "Class 6-A".into()
            }
        );
        // The replaced teacher is no longer what the effective cell names.
        assert_eq!(snap.status("T1", 0), TeacherStatus::Free);
    }

    #[test]
    fn exclude_set_hides_the_vacated_class() {
        let store = school();
        let snap = DaySnapshot::load(&store, "2024-05-06", "Monday").unwrap();
        let exclude: HashSet<String> = ["6A".to_string()].into_iter().collect();
        assert!(!snap.is_free("T1", 0, &HashSet::new()));
        assert!(snap.is_free("T1", 0, &exclude));
    }

    #[test]
    fn leave_blocks_the_boolean_check_too() {
        let store = school();
        store
            .mark_attendance("2024-05-06", "T2", AttendanceStatus::Absent)
            .unwrap();
        let snap = DaySnapshot::load(&store, "2024-05-06", "Monday").unwrap();
        assert!(!snap.is_free("T2", 1, &HashSet::new()));
    }
}
