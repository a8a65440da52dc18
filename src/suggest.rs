use crate::model::{ClassSection, Teacher, LUNCH_PERIOD, PERIOD_COUNT};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedEntry {
    pub class_id: String,
    pub period: usize,
    pub teacher_id: String,
    pub subject: String,
}

/// Optional draft-timetable provider. Suggestions are advisory only: the
/// daemon returns them to the caller and never writes them itself.
pub trait SuggestionProvider {
    fn suggest_base_schedule(
        &self,
        teachers: &[Teacher],
        classes: &[ClassSection],
    ) -> Vec<SuggestedEntry>;
}

/// Deterministic fallback provider: rotates the staff list across classes
/// and periods so every class sees a spread of teachers. Within a period,
/// assignments stay distinct whenever the staff list is at least as long as
/// the class list.
pub struct RotationSuggester;

impl SuggestionProvider for RotationSuggester {
    fn suggest_base_schedule(
        &self,
        teachers: &[Teacher],
        classes: &[ClassSection],
    ) -> Vec<SuggestedEntry> {
        if teachers.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for (class_idx, class) in classes.iter().enumerate() {
            for period in 0..PERIOD_COUNT {
                if period == LUNCH_PERIOD {
                    continue;
                }
                let teacher = &teachers[(class_idx + period) % teachers.len()];
                out.push(SuggestedEntry {
                    class_id: class.id.clone(),
                    period,
                    teacher_id: teacher.id.clone(),
                    subject: teacher
                        .subject
                        .clone()
                        .unwrap_or_else(|| "General".to_string()),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;
    use std::collections::HashSet;

    #[test]
    fn rotation_skips_lunch_and_avoids_double_booking() {
        let teachers = vec![
            Teacher {
                id: "T1".into(),
                name: "A".into(),
                subject: Some("Math".into()),
            },
            Teacher {
                id: "T2".into(),
                name: "B".into(),
                subject: None,
            },
        ];
        let classes = vec![
            ClassSection {
                id: "6A".into(),
                name: "6-A".into(),
                section: Section::Secondary,
            },
            ClassSection {
                id: "7B".into(),
                name: "7-B".into(),
                section: Section::Secondary,
            },
        ];
        let entries = RotationSuggester.suggest_base_schedule(&teachers, &classes);
        assert_eq!(entries.len(), 2 * (PERIOD_COUNT - 1));
        assert!(entries.iter().all(|e| e.period != LUNCH_PERIOD));

        for period in 0..PERIOD_COUNT {
            let assigned: Vec<&str> = entries
                .iter()
                .filter(|e| e.period == period)
                .map(|e| e.teacher_id.as_str())
                .collect();
            let unique: HashSet<&str> = assigned.iter().copied().collect();
            assert_eq!(assigned.len(), unique.len());
        }
        assert!(entries.iter().any(|e| e.subject == "General"));
    }

    #[test]
    fn no_teachers_means_no_suggestions() {
        let classes = vec![ClassSection {
            id: "6A".into(),
            name: "6-A".into(),
            section: Section::Secondary,
        }];
        assert!(RotationSuggester
            .suggest_base_schedule(&[], &classes)
            .is_empty());
    }
}
