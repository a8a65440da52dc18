use crate::error::{ScheduleError, ScheduleResult};
use crate::model::Role;
use crate::store::{MemoryStore, ScheduleStore, SqliteStore};
use crate::substitution::SubstitutionWorkflow;
use crate::sync::SyncCursor;
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Offline fallback, populated when the workspace database cannot be
    /// opened but a snapshot can. Mutations are rejected while this is the
    /// active backend.
    pub offline: Option<MemoryStore>,
    pub session_role: Option<Role>,
    /// Live substitution workflows, keyed by (teacherId, date).
    pub workflows: HashMap<(String, String), SubstitutionWorkflow>,
    /// Sequence guard behind `timetable.poll`; stale polls are flagged so
    /// a slow older request cannot overwrite a fresher view client-side.
    pub poll_cursor: SyncCursor,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            offline: None,
            session_role: None,
            workflows: HashMap::new(),
            poll_cursor: SyncCursor::new(),
        }
    }

    /// Read access to whichever backend is active.
    pub fn store(&self) -> ScheduleResult<StoreRef<'_>> {
        if let Some(conn) = &self.db {
            return Ok(StoreRef::Sqlite(SqliteStore::new(conn)));
        }
        if let Some(mem) = &self.offline {
            return Ok(StoreRef::Memory(mem));
        }
        Err(ScheduleError::unavailable("select a workspace first"))
    }

    /// Write access; refused in offline mode.
    pub fn writable_store(&self) -> ScheduleResult<StoreRef<'_>> {
        if let Some(conn) = &self.db {
            return Ok(StoreRef::Sqlite(SqliteStore::new(conn)));
        }
        if self.offline.is_some() {
            return Err(ScheduleError::unavailable("offline mode is read-only"));
        }
        Err(ScheduleError::unavailable("select a workspace first"))
    }

    /// Raw connection for registry tables outside the schedule-store
    /// interface; also refused in offline mode.
    pub fn conn(&self) -> ScheduleResult<&Connection> {
        if let Some(conn) = &self.db {
            return Ok(conn);
        }
        if self.offline.is_some() {
            return Err(ScheduleError::unavailable("offline mode is read-only"));
        }
        Err(ScheduleError::unavailable("select a workspace first"))
    }

    pub fn require_login(&self) -> ScheduleResult<Role> {
        self.session_role
            .ok_or_else(|| ScheduleError::Unauthorized("login required".into()))
    }

    pub fn require_principal(&self) -> ScheduleResult<()> {
        match self.require_login()? {
            Role::Principal => Ok(()),
            Role::Staff => Err(ScheduleError::Unauthorized(
                "principal role required".into(),
            )),
        }
    }
}

pub enum StoreRef<'a> {
    Sqlite(SqliteStore<'a>),
    Memory(&'a MemoryStore),
}

impl ScheduleStore for StoreRef<'_> {
    fn base_schedule(
        &self,
        day: &str,
    ) -> ScheduleResult<HashMap<crate::model::SlotKey, crate::model::BaseScheduleEntry>> {
        match self {
            Self::Sqlite(s) => s.base_schedule(day),
            Self::Memory(m) => m.base_schedule(day),
        }
    }

    fn save_base_entry(
        &self,
        day: &str,
        class_id: &str,
        period: usize,
        entry: Option<&crate::model::BaseScheduleEntry>,
    ) -> ScheduleResult<()> {
        match self {
            Self::Sqlite(s) => s.save_base_entry(day, class_id, period, entry),
            Self::Memory(m) => m.save_base_entry(day, class_id, period, entry),
        }
    }

    fn overrides_for(
        &self,
        date: &str,
    ) -> ScheduleResult<HashMap<crate::model::SlotKey, crate::model::DailyOverride>> {
        match self {
            Self::Sqlite(s) => s.overrides_for(date),
            Self::Memory(m) => m.overrides_for(date),
        }
    }

    fn save_override(
        &self,
        date: &str,
        class_id: &str,
        period: usize,
        ov: Option<&crate::model::DailyOverride>,
    ) -> ScheduleResult<()> {
        match self {
            Self::Sqlite(s) => s.save_override(date, class_id, period, ov),
            Self::Memory(m) => m.save_override(date, class_id, period, ov),
        }
    }

    fn attendance_for(
        &self,
        date: &str,
    ) -> ScheduleResult<HashMap<String, crate::model::AttendanceStatus>> {
        match self {
            Self::Sqlite(s) => s.attendance_for(date),
            Self::Memory(m) => m.attendance_for(date),
        }
    }

    fn mark_attendance(
        &self,
        date: &str,
        teacher_id: &str,
        status: crate::model::AttendanceStatus,
    ) -> ScheduleResult<()> {
        match self {
            Self::Sqlite(s) => s.mark_attendance(date, teacher_id, status),
            Self::Memory(m) => m.mark_attendance(date, teacher_id, status),
        }
    }

    fn classes(&self) -> ScheduleResult<Vec<crate::model::ClassSection>> {
        match self {
            Self::Sqlite(s) => s.classes(),
            Self::Memory(m) => m.classes(),
        }
    }

    fn teachers(&self) -> ScheduleResult<Vec<crate::model::Teacher>> {
        match self {
            Self::Sqlite(s) => s.teachers(),
            Self::Memory(m) => m.teachers(),
        }
    }
}
