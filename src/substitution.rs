use crate::availability::DaySnapshot;
use crate::error::{ScheduleError, ScheduleResult};
use crate::model::{self, AttendanceStatus, DailyOverride, SlotKey, Teacher, LUNCH_PERIOD};
use crate::store::ScheduleStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    LeaveMarked,
    PeriodsIdentified,
    ActionsProposed,
    ActionApplied(usize),
    Resolved,
}

impl WorkflowState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LeaveMarked => "leave_marked",
            Self::PeriodsIdentified => "periods_identified",
            Self::ActionsProposed => "actions_proposed",
            Self::ActionApplied(_) => "action_applied",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedPeriod {
    pub period: usize,
    pub class_id: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodProposal {
    pub period: usize,
    pub class_id: String,
    pub class_name: String,
    pub subject: String,
    pub candidates: Vec<Teacher>,
}

/// Operator decision for one pending period.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PeriodAction {
    #[serde(rename = "ASSIGN", rename_all = "camelCase")]
    Assign { substitute_id: String },
    #[serde(rename = "VACANT")]
    Vacant {
        #[serde(default)]
        note: Option<String>,
    },
    #[serde(rename = "MERGE", rename_all = "camelCase")]
    Merge {
        #[serde(default)]
        into_class_id: Option<String>,
    },
}

/// How a merge target is chosen when the operator does not name one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// First class in the registry other than the vacated one.
    #[default]
    FirstOther,
    /// Prefer a class from the same section; fall back to any other.
    SameSection,
}

impl MergePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first_other" => Some(Self::FirstOther),
            "same_section" => Some(Self::SameSection),
            _ => None,
        }
    }
}

/// Per-(teacher, date) leave event. Walks
/// LeaveMarked -> PeriodsIdentified -> ActionsProposed -> ActionApplied(n)
/// -> Resolved; each period's override write is independent, so one failure
/// never blocks or rolls back the others.
#[derive(Debug)]
pub struct SubstitutionWorkflow {
    teacher_id: String,
    date: String,
    day: String,
    leave: AttendanceStatus,
    merge_policy: MergePolicy,
    state: WorkflowState,
    pending: BTreeMap<usize, AffectedPeriod>,
    applied: usize,
}

impl SubstitutionWorkflow {
    /// Entry transition: requires a leave mark for the teacher on that date.
    pub fn begin(
        store: &dyn ScheduleStore,
        teacher_id: &str,
        date: &str,
        merge_policy: MergePolicy,
    ) -> ScheduleResult<Self> {
        let day = model::day_name_for(date)?;
        if !model::is_school_day(&day) {
            return Err(ScheduleError::validation(format!(
                "{} is a {}, not a school day",
                date, day
            )));
        }
        let attendance = store.attendance_for(date)?;
        let leave = attendance
            .get(teacher_id)
            .copied()
            .filter(|s| s.is_leave())
            .ok_or_else(|| {
                ScheduleError::validation(format!(
                    "no leave marked for {} on {}",
                    teacher_id, date
                ))
            })?;

        Ok(Self {
            teacher_id: teacher_id.to_string(),
            date: date.to_string(),
            day,
            leave,
            merge_policy,
            state: WorkflowState::LeaveMarked,
            pending: BTreeMap::new(),
            applied: 0,
        })
    }

    /// Base-schedule periods the leave touches, filtered by the leave window.
    /// An empty set resolves the workflow on the spot.
    pub fn identify_periods(
        &mut self,
        store: &dyn ScheduleStore,
    ) -> ScheduleResult<Vec<AffectedPeriod>> {
        if self.state != WorkflowState::LeaveMarked {
            return Err(ScheduleError::validation("periods already identified"));
        }
        self.pending = affected_periods(store, &self.teacher_id, &self.day, self.leave)?
            .into_iter()
            .map(|p| (p.period, p))
            .collect();
        self.state = if self.pending.is_empty() {
            WorkflowState::Resolved
        } else {
            WorkflowState::PeriodsIdentified
        };
        Ok(self.pending.values().cloned().collect())
    }

    /// Candidate substitutes per pending period: every other teacher the
    /// availability check reports free, the vacated class excluded.
    pub fn propose(&mut self, store: &dyn ScheduleStore) -> ScheduleResult<Vec<PeriodProposal>> {
        if self.state == WorkflowState::Resolved {
            return Err(ScheduleError::validation("workflow already resolved"));
        }
        if self.state == WorkflowState::LeaveMarked {
            return Err(ScheduleError::validation("periods not identified yet"));
        }

        let snapshot = DaySnapshot::load(store, &self.date, &self.day)?;
        let teachers = store.teachers()?;
        let class_names: std::collections::HashMap<String, String> = store
            .classes()?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut proposals = Vec::with_capacity(self.pending.len());
        for affected in self.pending.values() {
            let exclude: HashSet<String> = [affected.class_id.clone()].into_iter().collect();
            let candidates = teachers
                .iter()
                .filter(|t| t.id != self.teacher_id)
                .filter(|t| snapshot.is_free(&t.id, affected.period, &exclude))
                .cloned()
                .collect();
            proposals.push(PeriodProposal {
                period: affected.period,
                class_id: affected.class_id.clone(),
                class_name: class_names
                    .get(&affected.class_id)
                    .cloned()
                    .unwrap_or_else(|| affected.class_id.clone()),
                subject: affected.subject.clone(),
                candidates,
            });
        }
        self.state = WorkflowState::ActionsProposed;
        Ok(proposals)
    }

    /// Apply one period's action. On a write failure the period stays
    /// pending and every other period is untouched; the caller may retry
    /// just this one.
    pub fn apply(
        &mut self,
        store: &dyn ScheduleStore,
        period: usize,
        action: &PeriodAction,
    ) -> ScheduleResult<DailyOverride> {
        match self.state {
            WorkflowState::ActionsProposed | WorkflowState::ActionApplied(_) => {}
            WorkflowState::Resolved => {
                return Err(ScheduleError::validation("workflow already resolved"));
            }
            _ => {
                return Err(ScheduleError::validation("no actions proposed yet"));
            }
        }
        let affected = self.pending.get(&period).cloned().ok_or_else(|| {
            ScheduleError::validation(format!("period {} is not pending", period))
        })?;

        let ov = self.build_override(store, &affected, action)?;
        store.save_override(&self.date, &affected.class_id, period, Some(&ov))?;

        self.pending.remove(&period);
        self.applied += 1;
        self.state = if self.pending.is_empty() {
            WorkflowState::Resolved
        } else {
            WorkflowState::ActionApplied(self.applied)
        };
        Ok(ov)
    }

    /// Early dismissal: remaining periods stay unresolved; the base entry
    /// keeps showing the absent teacher until an override is added later.
    pub fn dismiss(&mut self) {
        self.pending.clear();
        self.state = WorkflowState::Resolved;
    }

    fn build_override(
        &self,
        store: &dyn ScheduleStore,
        affected: &AffectedPeriod,
        action: &PeriodAction,
    ) -> ScheduleResult<DailyOverride> {
        match action {
            PeriodAction::Assign { substitute_id } => {
                if substitute_id == &self.teacher_id {
                    return Err(ScheduleError::validation(
                        "substitute cannot be the teacher on leave",
                    ));
                }
                let known = store.teachers()?.iter().any(|t| &t.id == substitute_id);
                if !known {
                    return Err(ScheduleError::NotFound("substitute teacher"));
                }
                Ok(DailyOverride::Substitution {
                    sub_teacher_id: substitute_id.clone(),
                    sub_subject: affected.subject.clone(),
                    note: None,
                    original_teacher_id: Some(self.teacher_id.clone()),
                })
            }
            PeriodAction::Vacant { note } => Ok(DailyOverride::Vacant {
                note: note.clone(),
                original_teacher_id: Some(self.teacher_id.clone()),
            }),
            PeriodAction::Merge { into_class_id } => {
                let target = match into_class_id {
                    Some(id) => {
                        if id == &affected.class_id {
                            return Err(ScheduleError::validation(
                                "cannot merge a class into itself",
                            ));
                        }
                        let known = store.classes()?.iter().any(|c| &c.id == id);
                        if !known {
                            return Err(ScheduleError::NotFound("merge target class"));
                        }
                        id.clone()
                    }
                    None => self.pick_merge_target(store, &affected.class_id)?,
                };
                Ok(DailyOverride::Merged {
                    merged_class_ids: vec![target],
                    original_teacher_id: Some(self.teacher_id.clone()),
                })
            }
        }
    }

    fn pick_merge_target(
        &self,
        store: &dyn ScheduleStore,
        vacated: &str,
    ) -> ScheduleResult<String> {
        let classes = store.classes()?;
        let own_section = classes
            .iter()
            .find(|c| c.id == vacated)
            .map(|c| c.section);

        let picked = match (self.merge_policy, own_section) {
            (MergePolicy::SameSection, Some(section)) => classes
                .iter()
                .find(|c| c.id != vacated && c.section == section)
                .or_else(|| classes.iter().find(|c| c.id != vacated)),
            _ => classes.iter().find(|c| c.id != vacated),
        };
        picked.map(|c| c.id.clone()).ok_or_else(|| {
            ScheduleError::validation("no other class available to merge into")
        })
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn pending(&self) -> Vec<AffectedPeriod> {
        self.pending.values().cloned().collect()
    }

    pub fn leave(&self) -> AttendanceStatus {
        self.leave
    }

    pub fn day(&self) -> &str {
        &self.day
    }
}

/// The teacher's base-schedule periods for the date's weekday, narrowed to
/// the leave window. Shared with the attendance handler so a leave mark can
/// report how many periods it touches.
pub fn affected_periods(
    store: &dyn ScheduleStore,
    teacher_id: &str,
    day: &str,
    leave: AttendanceStatus,
) -> ScheduleResult<Vec<AffectedPeriod>> {
    let base = store.base_schedule(day)?;
    let mut keys: Vec<&SlotKey> = base
        .iter()
        .filter(|(key, entry)| {
            entry.teacher_id == teacher_id
                && key.period != LUNCH_PERIOD
                && leave.covers_period(key.period)
        })
        .map(|(key, _)| key)
        .collect();
    keys.sort();

    let mut out: Vec<AffectedPeriod> = Vec::with_capacity(keys.len());
    for key in keys {
        if out.last().map(|p| p.period) == Some(key.period) {
            // Same teacher in two classes at one period is a data anomaly;
            // keep the first class and leave the rest to validation tooling.
            continue;
        }
        out.push(AffectedPeriod {
            period: key.period,
            class_id: key.class_id.clone(),
            subject: base[key].subject.clone(),
        });
    }
    Ok(out)
}
