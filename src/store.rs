use crate::error::{ScheduleError, ScheduleResult};
use crate::model::{
    AttendanceStatus, BaseScheduleEntry, ClassSection, DailyOverride, Section, SlotKey, Teacher,
};
use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub const SNAPSHOT_FILE: &str = "offline-cache.json";

/// CRUD surface the resolver, availability checker and substitution workflow
/// are written against. The SQLite workspace is the primary implementation;
/// `MemoryStore` backs the offline fallback and tests.
pub trait ScheduleStore {
    fn base_schedule(&self, day: &str) -> ScheduleResult<HashMap<SlotKey, BaseScheduleEntry>>;
    fn save_base_entry(
        &self,
        day: &str,
        class_id: &str,
        period: usize,
        entry: Option<&BaseScheduleEntry>,
    ) -> ScheduleResult<()>;
    fn overrides_for(&self, date: &str) -> ScheduleResult<HashMap<SlotKey, DailyOverride>>;
    fn save_override(
        &self,
        date: &str,
        class_id: &str,
        period: usize,
        ov: Option<&DailyOverride>,
    ) -> ScheduleResult<()>;
    fn attendance_for(&self, date: &str) -> ScheduleResult<HashMap<String, AttendanceStatus>>;
    fn mark_attendance(
        &self,
        date: &str,
        teacher_id: &str,
        status: AttendanceStatus,
    ) -> ScheduleResult<()>;
    fn classes(&self) -> ScheduleResult<Vec<ClassSection>>;
    fn teachers(&self) -> ScheduleResult<Vec<Teacher>>;
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ScheduleStore for SqliteStore<'_> {
    fn base_schedule(&self, day: &str) -> ScheduleResult<HashMap<SlotKey, BaseScheduleEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT class_id, period_index, teacher_id, subject, note
             FROM base_schedule
             WHERE day_name = ?",
        )?;
        let rows = stmt
            .query_map([day], |r| {
                let class_id: String = r.get(0)?;
                let period: i64 = r.get(1)?;
                Ok((
                    SlotKey::new(class_id, period as usize),
                    BaseScheduleEntry {
                        teacher_id: r.get(2)?,
                        subject: r.get(3)?,
                        note: r.get(4)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().collect())
    }

    fn save_base_entry(
        &self,
        day: &str,
        class_id: &str,
        period: usize,
        entry: Option<&BaseScheduleEntry>,
    ) -> ScheduleResult<()> {
        match entry {
            Some(e) => {
                self.conn.execute(
                    "INSERT INTO base_schedule(day_name, class_id, period_index, teacher_id, subject, note)
                     VALUES(?, ?, ?, ?, ?, ?)
                     ON CONFLICT(day_name, class_id, period_index) DO UPDATE SET
                       teacher_id = excluded.teacher_id,
                       subject = excluded.subject,
                       note = excluded.note",
                    (day, class_id, period as i64, &e.teacher_id, &e.subject, &e.note),
                )?;
            }
            None => {
                // Deleting a missing cell is a no-op, not an error.
                self.conn.execute(
                    "DELETE FROM base_schedule WHERE day_name = ? AND class_id = ? AND period_index = ?",
                    (day, class_id, period as i64),
                )?;
            }
        }
        Ok(())
    }

    fn overrides_for(&self, date: &str) -> ScheduleResult<HashMap<SlotKey, DailyOverride>> {
        let mut stmt = self.conn.prepare(
            "SELECT class_id, period_index, payload FROM daily_overrides WHERE date = ?",
        )?;
        let rows = stmt
            .query_map([date], |r| {
                let class_id: String = r.get(0)?;
                let period: i64 = r.get(1)?;
                let payload: String = r.get(2)?;
                Ok((SlotKey::new(class_id, period as usize), payload))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = HashMap::with_capacity(rows.len());
        for (key, payload) in rows {
            let ov: DailyOverride = serde_json::from_str(&payload)
                .map_err(|e| ScheduleError::Query(format!("corrupt override at {}: {}", key, e)))?;
            out.insert(key, ov);
        }
        Ok(out)
    }

    fn save_override(
        &self,
        date: &str,
        class_id: &str,
        period: usize,
        ov: Option<&DailyOverride>,
    ) -> ScheduleResult<()> {
        match ov {
            Some(ov) => {
                let payload = serde_json::to_string(ov)?;
                self.conn.execute(
                    "INSERT INTO daily_overrides(date, class_id, period_index, payload)
                     VALUES(?, ?, ?, ?)
                     ON CONFLICT(date, class_id, period_index) DO UPDATE SET
                       payload = excluded.payload",
                    (date, class_id, period as i64, &payload),
                )?;
            }
            None => {
                self.conn.execute(
                    "DELETE FROM daily_overrides WHERE date = ? AND class_id = ? AND period_index = ?",
                    (date, class_id, period as i64),
                )?;
            }
        }
        Ok(())
    }

    fn attendance_for(&self, date: &str) -> ScheduleResult<HashMap<String, AttendanceStatus>> {
        let mut stmt = self
            .conn
            .prepare("SELECT teacher_id, status FROM attendance WHERE date = ?")?;
        let rows = stmt
            .query_map([date], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = HashMap::with_capacity(rows.len());
        for (teacher_id, raw) in rows {
            let status = AttendanceStatus::parse(&raw).ok_or_else(|| {
                ScheduleError::Query(format!("corrupt attendance status: {}", raw))
            })?;
            out.insert(teacher_id, status);
        }
        Ok(out)
    }

    fn mark_attendance(
        &self,
        date: &str,
        teacher_id: &str,
        status: AttendanceStatus,
    ) -> ScheduleResult<()> {
        if status.is_leave() {
            self.conn.execute(
                "INSERT INTO attendance(date, teacher_id, status)
                 VALUES(?, ?, ?)
                 ON CONFLICT(date, teacher_id) DO UPDATE SET
                   status = excluded.status",
                (date, teacher_id, status.as_str()),
            )?;
        } else {
            // Present is the absence of a record.
            self.conn.execute(
                "DELETE FROM attendance WHERE date = ? AND teacher_id = ?",
                (date, teacher_id),
            )?;
        }
        Ok(())
    }

    fn classes(&self) -> ScheduleResult<Vec<ClassSection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, section FROM classes ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, name, raw) in rows {
            let section = Section::parse(&raw)
                .ok_or_else(|| ScheduleError::Query(format!("corrupt section tag: {}", raw)))?;
            out.push(ClassSection { id, name, section });
        }
        Ok(out)
    }

    fn teachers(&self) -> ScheduleResult<Vec<Teacher>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, subject FROM teachers ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(Teacher {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    subject: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Serializable image of the schedule tables, written next to the workspace
/// database after each successful open and read back when SQLite cannot be
/// opened (offline fallback).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub classes: Vec<ClassSection>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub base: HashMap<String, HashMap<SlotKey, BaseScheduleEntry>>,
    #[serde(default)]
    pub overrides: HashMap<String, HashMap<SlotKey, DailyOverride>>,
    #[serde(default)]
    pub attendance: HashMap<String, HashMap<String, AttendanceStatus>>,
}

pub fn snapshot_of(conn: &Connection) -> ScheduleResult<Snapshot> {
    let store = SqliteStore::new(conn);
    let mut snap = Snapshot {
        classes: store.classes()?,
        teachers: store.teachers()?,
        ..Snapshot::default()
    };

    let mut stmt = conn.prepare("SELECT DISTINCT day_name FROM base_schedule")?;
    let days = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for day in days {
        let cells = store.base_schedule(&day)?;
        snap.base.insert(day, cells);
    }

    let mut stmt = conn.prepare("SELECT DISTINCT date FROM daily_overrides")?;
    let dates = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for date in dates {
        let cells = store.overrides_for(&date)?;
        snap.overrides.insert(date, cells);
    }

    let mut stmt = conn.prepare("SELECT DISTINCT date FROM attendance")?;
    let dates = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for date in dates {
        let marks = store.attendance_for(&date)?;
        snap.attendance.insert(date, marks);
    }

    Ok(snap)
}

pub fn write_snapshot(conn: &Connection, path: &Path) -> anyhow::Result<()> {
    let snap = snapshot_of(conn).map_err(|e| anyhow::anyhow!("{}", e))?;
    let text = serde_json::to_string(&snap).context("serialize offline snapshot")?;
    std::fs::write(path, text)
        .with_context(|| format!("write offline snapshot {}", path.to_string_lossy()))?;
    Ok(())
}

/// In-memory store. Backs read-only offline mode when the workspace database
/// cannot be opened, and serves as the store double in unit tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snap: Snapshot) -> Self {
        Self {
            inner: Mutex::new(snap),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read offline snapshot {}", path.to_string_lossy()))?;
        let snap: Snapshot = serde_json::from_str(&text).context("parse offline snapshot")?;
        Ok(Self::from_snapshot(snap))
    }

    fn lock(&self) -> ScheduleResult<std::sync::MutexGuard<'_, Snapshot>> {
        self.inner
            .lock()
            .map_err(|_| ScheduleError::unavailable("offline cache poisoned"))
    }
}

impl ScheduleStore for MemoryStore {
    fn base_schedule(&self, day: &str) -> ScheduleResult<HashMap<SlotKey, BaseScheduleEntry>> {
        Ok(self.lock()?.base.get(day).cloned().unwrap_or_default())
    }

    fn save_base_entry(
        &self,
        day: &str,
        class_id: &str,
        period: usize,
        entry: Option<&BaseScheduleEntry>,
    ) -> ScheduleResult<()> {
        let mut inner = self.lock()?;
        let key = SlotKey::new(class_id, period);
        match entry {
            Some(e) => {
                inner
                    .base
                    .entry(day.to_string())
                    .or_default()
                    .insert(key, e.clone());
            }
            None => {
                if let Some(cells) = inner.base.get_mut(day) {
                    cells.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn overrides_for(&self, date: &str) -> ScheduleResult<HashMap<SlotKey, DailyOverride>> {
        Ok(self.lock()?.overrides.get(date).cloned().unwrap_or_default())
    }

    fn save_override(
        &self,
        date: &str,
        class_id: &str,
        period: usize,
        ov: Option<&DailyOverride>,
    ) -> ScheduleResult<()> {
        let mut inner = self.lock()?;
        let key = SlotKey::new(class_id, period);
        match ov {
            Some(ov) => {
                inner
                    .overrides
                    .entry(date.to_string())
                    .or_default()
                    .insert(key, ov.clone());
            }
            None => {
                if let Some(cells) = inner.overrides.get_mut(date) {
                    cells.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn attendance_for(&self, date: &str) -> ScheduleResult<HashMap<String, AttendanceStatus>> {
        Ok(self
            .lock()?
            .attendance
            .get(date)
            .cloned()
            .unwrap_or_default())
    }

    fn mark_attendance(
        &self,
        date: &str,
        teacher_id: &str,
        status: AttendanceStatus,
    ) -> ScheduleResult<()> {
        let mut inner = self.lock()?;
        if status.is_leave() {
            inner
                .attendance
                .entry(date.to_string())
                .or_default()
                .insert(teacher_id.to_string(), status);
        } else if let Some(marks) = inner.attendance.get_mut(date) {
            marks.remove(teacher_id);
        }
        Ok(())
    }

    fn classes(&self) -> ScheduleResult<Vec<ClassSection>> {
        Ok(self.lock()?.classes.clone())
    }

    fn teachers(&self) -> ScheduleResult<Vec<Teacher>> {
        Ok(self.lock()?.teachers.clone())
    }
}
