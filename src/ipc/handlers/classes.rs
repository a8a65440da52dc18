use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::Section;
use crate::store::ScheduleStore;
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn list(state: &AppState, _params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let classes = state.store()?.classes()?;

    // Per-class counts come straight from SQL; offline snapshots serve the
    // bare registry without them.
    let mut counts: HashMap<String, (i64, i64)> = HashMap::new();
    if let Some(conn) = &state.db {
        let mut stmt = conn.prepare(
            "SELECT
               c.id,
               (SELECT COUNT(*) FROM base_schedule b WHERE b.class_id = c.id) AS scheduled,
               (SELECT COUNT(*) FROM exams e WHERE e.class_id = c.id) AS exams
             FROM classes c",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, String>(0)?, (r.get::<_, i64>(1)?, r.get::<_, i64>(2)?)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        counts = rows.into_iter().collect();
    }

    let classes_json: Vec<serde_json::Value> = classes
        .iter()
        .map(|c| {
            let mut v = json!({
                "id": c.id,
                "name": c.name,
                "section": c.section.as_str(),
            });
            if let Some((scheduled, exams)) = counts.get(&c.id) {
                v["scheduledPeriodCount"] = json!(scheduled);
                v["examCount"] = json!(exams);
            }
            v
        })
        .collect();
    Ok(json!({ "classes": classes_json }))
}

fn create(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let name = required_str(params, "name")?;
    let section = Section::parse(&required_str(params, "section")?)
        .ok_or_else(|| ScheduleError::validation("section must be SECONDARY or SENIOR_SECONDARY"))?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, section) VALUES(?, ?, ?)",
        (&class_id, &name, section.as_str()),
    )?;
    Ok(json!({ "classId": class_id, "name": name, "section": section.as_str() }))
}

fn update(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let class_id = required_str(params, "classId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::NotFound("class"));
    }

    if let Some(name) = optional_str(params, "name") {
        conn.execute("UPDATE classes SET name = ? WHERE id = ?", (&name, &class_id))?;
    }
    if let Some(raw) = optional_str(params, "section") {
        let section = Section::parse(&raw).ok_or_else(|| {
            ScheduleError::validation("section must be SECONDARY or SENIOR_SECONDARY")
        })?;
        conn.execute(
            "UPDATE classes SET section = ? WHERE id = ?",
            (section.as_str(), &class_id),
        )?;
    }
    Ok(json!({ "classId": class_id }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let conn = state.conn()?;
    let class_id = required_str(params, "classId")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(ScheduleError::NotFound("class"));
    }

    let tx = conn.unchecked_transaction()?;
    // Explicitly delete in dependency order (no ON DELETE CASCADE). Every
    // schedule row keyed by this class must go, or a later resolve would
    // resurrect it.
    let result: Result<(), rusqlite::Error> = (|| {
        tx.execute("DELETE FROM daily_overrides WHERE class_id = ?", [&class_id])?;
        tx.execute("DELETE FROM base_schedule WHERE class_id = ?", [&class_id])?;
        tx.execute("DELETE FROM exams WHERE class_id = ?", [&class_id])?;
        tx.execute("DELETE FROM classes WHERE id = ?", [&class_id])?;
        Ok(())
    })();
    match result {
        Ok(()) => {
            tx.commit()?;
            tracing::info!(class_id = %class_id, "class deleted with schedule cascade");
            Ok(json!({ "deleted": true }))
        }
        Err(e) => {
            let _ = tx.rollback();
            Err(e.into())
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "classes.list" => list(state, &req.params),
        "classes.create" => create(state, &req.params),
        "classes.update" => update(state, &req.params),
        "classes.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
