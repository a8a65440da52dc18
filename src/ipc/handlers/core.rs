use crate::db;
use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{err, fail, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, MemoryStore};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let mode = if state.db.is_some() {
        "online"
    } else if state.offline.is_some() {
        "offline"
    } else {
        "none"
    };
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "mode": mode,
            "role": state.session_role.map(|r| r.as_str()),
        }),
    )
}

fn select_workspace(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let path = PathBuf::from(required_str(params, "path")?);
    let force_offline = optional_str(params, "mode").as_deref() == Some("offline");
    let snapshot_path = path.join(store::SNAPSHOT_FILE);

    // A workspace switch invalidates any in-flight substitution workflows.
    state.workflows.clear();

    if !force_offline {
        match db::open_db(&path) {
            Ok(conn) => {
                // Refresh the offline snapshot so a later failed open can
                // still serve reads. Never blocks the workspace from opening.
                if let Err(e) = store::write_snapshot(&conn, &snapshot_path) {
                    tracing::warn!(error = %e, "could not refresh offline snapshot");
                }
                state.workspace = Some(path.clone());
                state.db = Some(conn);
                state.offline = None;
                return Ok(json!({
                    "workspacePath": path.to_string_lossy(),
                    "mode": "online",
                }));
            }
            Err(open_err) => {
                tracing::warn!(error = %open_err, "workspace open failed; trying offline snapshot");
                let Ok(mem) = MemoryStore::load(&snapshot_path) else {
                    return Err(ScheduleError::unavailable(format!(
                        "cannot open workspace and no offline snapshot: {:?}",
                        open_err
                    )));
                };
                state.workspace = Some(path.clone());
                state.db = None;
                state.offline = Some(mem);
                return Ok(json!({
                    "workspacePath": path.to_string_lossy(),
                    "mode": "offline",
                    "warning": "workspace database unavailable; serving read-only snapshot",
                }));
            }
        }
    }

    let mem = MemoryStore::load(&snapshot_path).map_err(|e| {
        ScheduleError::unavailable(format!("no offline snapshot to load: {}", e))
    })?;
    state.workspace = Some(path.clone());
    state.db = None;
    state.offline = Some(mem);
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "mode": "offline",
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    match select_workspace(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(ScheduleError::StoreUnavailable(msg)) => err(&req.id, "db_open_failed", msg, None),
        Err(e) => fail(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
