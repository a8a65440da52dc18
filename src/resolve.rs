use crate::error::ScheduleResult;
use crate::model::{BaseScheduleEntry, DailyOverride, EffectiveEntry, SlotKey};
use crate::store::ScheduleStore;
use std::collections::HashMap;

/// Merge the recurring base plan for `day` with the overrides recorded for
/// `date` into the effective schedule.
///
/// Either fetch failing fails the whole resolve. A base-only fallback after a
/// failed override read would silently drop substitutions from the view, so
/// callers get an error instead of stale data.
pub fn resolve(
    store: &dyn ScheduleStore,
    date: &str,
    day: &str,
) -> ScheduleResult<HashMap<SlotKey, EffectiveEntry>> {
    let base = store.base_schedule(day)?;
    let overrides = store.overrides_for(date)?;

    let mut out: HashMap<SlotKey, EffectiveEntry> = base
        .iter()
        .map(|(key, entry)| (key.clone(), effective_from_base(entry)))
        .collect();

    for (key, ov) in &overrides {
        let entry = effective_from_override(ov, base.get(key));
        out.insert(key.clone(), entry);
    }

    Ok(out)
}

fn effective_from_base(entry: &BaseScheduleEntry) -> EffectiveEntry {
    EffectiveEntry {
        teacher_id: Some(entry.teacher_id.clone()),
        subject: Some(entry.subject.clone()),
        note: entry.note.clone(),
        is_override: false,
        override_kind: None,
        original_teacher_id: None,
        merged_class_ids: Vec::new(),
    }
}

/// Override fields replace the base cell; only fields the override leaves
/// blank fall back to the base entry.
fn effective_from_override(ov: &DailyOverride, base: Option<&BaseScheduleEntry>) -> EffectiveEntry {
    let base_subject = base.map(|b| b.subject.clone());
    let base_note = base.and_then(|b| b.note.clone());
    let base_teacher = base.map(|b| b.teacher_id.clone());

    match ov {
        DailyOverride::Substitution {
            sub_teacher_id,
            sub_subject,
            note,
            original_teacher_id,
        } => EffectiveEntry {
            teacher_id: Some(sub_teacher_id.clone()),
            subject: if sub_subject.is_empty() {
                base_subject
            } else {
                Some(sub_subject.clone())
            },
            note: note.clone().or(base_note),
            is_override: true,
            override_kind: Some(ov.kind()),
            original_teacher_id: original_teacher_id.clone().or(base_teacher),
            merged_class_ids: Vec::new(),
        },
        DailyOverride::Vacant {
            note,
            original_teacher_id,
        } => EffectiveEntry {
            teacher_id: None,
            subject: base_subject,
            note: note.clone().or(base_note),
            is_override: true,
            override_kind: Some(ov.kind()),
            original_teacher_id: original_teacher_id.clone().or(base_teacher),
            merged_class_ids: Vec::new(),
        },
        DailyOverride::Merged {
            merged_class_ids,
            original_teacher_id,
        } => EffectiveEntry {
            teacher_id: None,
            subject: base_subject,
            note: base_note,
            is_override: true,
            override_kind: Some(ov.kind()),
            original_teacher_id: original_teacher_id.clone().or(base_teacher),
            merged_class_ids: merged_class_ids.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScheduleError;
    use crate::model::{AttendanceStatus, ClassSection, Teacher};
    use crate::store::{MemoryStore, Snapshot};

    fn base_entry(teacher: &str, subject: &str) -> BaseScheduleEntry {
        BaseScheduleEntry {
            teacher_id: teacher.into(),
            subject: subject.into(),
            note: None,
        }
    }

    fn monday_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .save_base_entry("Monday", "6A", 0, Some(&base_entry("T1", "Math")))
            .unwrap();
        store
            .save_base_entry("Monday", "6A", 2, Some(&base_entry("T1", "Math")))
            .unwrap();
        store
            .save_base_entry("Monday", "7B", 0, Some(&base_entry("T2", "English")))
            .unwrap();
        store
    }

    #[test]
    fn no_overrides_reproduces_the_base_exactly() {
        let store = monday_store();
        let effective = resolve(&store, "2024-05-06", "Monday").unwrap();
        assert_eq!(effective.len(), 3);
        let cell = &effective[&SlotKey::new("6A", 0)];
        assert_eq!(cell.teacher_id.as_deref(), Some("T1"));
        assert_eq!(cell.subject.as_deref(), Some("Math"));
        assert!(!cell.is_override);
    }

    #[test]
    fn substitution_replaces_the_base_cell() {
        let store = monday_store();
        let ov = DailyOverride::Substitution {
            sub_teacher_id: "T2".into(),
            sub_subject: "Math".into(),
            note: None,
            original_teacher_id: Some("T1".into()),
        };
        store.save_override("2024-05-06", "6A", 0, Some(&ov)).unwrap();

        let effective = resolve(&store, "2024-05-06", "Monday").unwrap();
        let cell = &effective[&SlotKey::new("6A", 0)];
        assert!(cell.is_override);
        assert_eq!(cell.teacher_id.as_deref(), Some("T2"));
        assert_eq!(cell.subject.as_deref(), Some("Math"));
        assert_eq!(cell.original_teacher_id.as_deref(), Some("T1"));
        // Other dates stay untouched by the override.
        let other = resolve(&store, "2024-05-13", "Monday").unwrap();
        assert!(!other[&SlotKey::new("6A", 0)].is_override);
    }

    #[test]
    fn override_on_an_empty_slot_still_produces_an_entry() {
        let store = monday_store();
        let ov = DailyOverride::Substitution {
            sub_teacher_id: "T3".into(),
            sub_subject: "PT".into(),
            note: None,
            original_teacher_id: None,
        };
        store.save_override("2024-05-06", "8C", 5, Some(&ov)).unwrap();

        let effective = resolve(&store, "2024-05-06", "Monday").unwrap();
        let cell = &effective[&SlotKey::new("8C", 5)];
        assert!(cell.is_override);
        assert_eq!(cell.teacher_id.as_deref(), Some("T3"));
        assert_eq!(cell.original_teacher_id, None);
    }

    #[test]
    fn blank_override_fields_fall_back_to_the_base_cell() {
        let store = MemoryStore::new();
        store
            .save_base_entry(
                "Monday",
                "6A",
                1,
                Some(&BaseScheduleEntry {
                    teacher_id: "T1".into(),
                    subject: "Science".into(),
                    note: Some("lab block".into()),
                }),
            )
            .unwrap();
        let ov = DailyOverride::Substitution {
            sub_teacher_id: "T2".into(),
            sub_subject: String::new(),
            note: None,
            original_teacher_id: None,
        };
        store.save_override("2024-05-06", "6A", 1, Some(&ov)).unwrap();

        let effective = resolve(&store, "2024-05-06", "Monday").unwrap();
        let cell = &effective[&SlotKey::new("6A", 1)];
        assert_eq!(cell.subject.as_deref(), Some("Science"));
        assert_eq!(cell.note.as_deref(), Some("lab block"));
        assert_eq!(cell.original_teacher_id.as_deref(), Some("T1"));
    }

    #[test]
    fn vacant_and_merged_clear_the_teacher() {
        let store = monday_store();
        store
            .save_override(
                "2024-05-06",
                "6A",
                0,
                Some(&DailyOverride::Vacant {
                    note: Some("self study".into()),
                    original_teacher_id: None,
                }),
            )
            .unwrap();
        store
            .save_override(
                "2024-05-06",
                "6A",
                2,
                Some(&DailyOverride::Merged {
                    merged_class_ids: vec!["7B".into()],
                    original_teacher_id: None,
                }),
            )
            .unwrap();

        let effective = resolve(&store, "2024-05-06", "Monday").unwrap();
        let vacant = &effective[&SlotKey::new("6A", 0)];
        assert_eq!(vacant.teacher_id, None);
        assert_eq!(vacant.note.as_deref(), Some("self study"));
        assert_eq!(vacant.original_teacher_id.as_deref(), Some("T1"));

        let merged = &effective[&SlotKey::new("6A", 2)];
        assert_eq!(merged.teacher_id, None);
        assert_eq!(merged.merged_class_ids, vec!["7B".to_string()]);
    }

    #[test]
    fn saving_the_same_override_twice_is_idempotent() {
        let store = monday_store();
        let ov = DailyOverride::Vacant {
            note: None,
            original_teacher_id: Some("T1".into()),
        };
        store.save_override("2024-05-06", "6A", 0, Some(&ov)).unwrap();
        let once = resolve(&store, "2024-05-06", "Monday").unwrap();
        store.save_override("2024-05-06", "6A", 0, Some(&ov)).unwrap();
        let twice = resolve(&store, "2024-05-06", "Monday").unwrap();
        assert_eq!(once, twice);
    }

    /// Store double whose override reads fail, as after losing the backing
    /// database mid-session.
    struct BrokenOverrides(MemoryStore);

    impl ScheduleStore for BrokenOverrides {
        fn base_schedule(
            &self,
            day: &str,
        ) -> ScheduleResult<HashMap<SlotKey, BaseScheduleEntry>> {
            self.0.base_schedule(day)
        }
        fn save_base_entry(
            &self,
            day: &str,
            class_id: &str,
            period: usize,
            entry: Option<&BaseScheduleEntry>,
        ) -> ScheduleResult<()> {
            self.0.save_base_entry(day, class_id, period, entry)
        }
        fn overrides_for(&self, _date: &str) -> ScheduleResult<HashMap<SlotKey, DailyOverride>> {
            Err(ScheduleError::unavailable("override table unreachable"))
        }
        fn save_override(
            &self,
            date: &str,
            class_id: &str,
            period: usize,
            ov: Option<&DailyOverride>,
        ) -> ScheduleResult<()> {
            self.0.save_override(date, class_id, period, ov)
        }
        fn attendance_for(&self, date: &str) -> ScheduleResult<HashMap<String, AttendanceStatus>> {
            self.0.attendance_for(date)
        }
        fn mark_attendance(
            &self,
            date: &str,
            teacher_id: &str,
            status: AttendanceStatus,
        ) -> ScheduleResult<()> {
            self.0.mark_attendance(date, teacher_id, status)
        }
        fn classes(&self) -> ScheduleResult<Vec<ClassSection>> {
            self.0.classes()
        }
        fn teachers(&self) -> ScheduleResult<Vec<Teacher>> {
            self.0.teachers()
        }
    }

    #[test]
    fn failed_override_read_fails_the_whole_resolve() {
        let broken = BrokenOverrides(monday_store());
        let result = resolve(&broken, "2024-05-06", "Monday");
        assert!(matches!(result, Err(ScheduleError::StoreUnavailable(_))));
    }

    #[test]
    fn snapshot_round_trip_preserves_resolution() {
        let store = monday_store();
        store
            .save_override(
                "2024-05-06",
                "6A",
                0,
                Some(&DailyOverride::Vacant {
                    note: None,
                    original_teacher_id: None,
                }),
            )
            .unwrap();
        let before = resolve(&store, "2024-05-06", "Monday").unwrap();

        let snap: Snapshot = {
            let text = serde_json::to_string(&Snapshot {
                base: [(
                    "Monday".to_string(),
                    store.base_schedule("Monday").unwrap(),
                )]
                .into_iter()
                .collect(),
                overrides: [(
                    "2024-05-06".to_string(),
                    store.overrides_for("2024-05-06").unwrap(),
                )]
                .into_iter()
                .collect(),
                ..Snapshot::default()
            })
            .unwrap();
            serde_json::from_str(&text).unwrap()
        };
        let reloaded = MemoryStore::from_snapshot(snap);
        let after = resolve(&reloaded, "2024-05-06", "Monday").unwrap();
        assert_eq!(before, after);
    }
}
