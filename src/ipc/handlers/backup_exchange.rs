use crate::backup;
use crate::db;
use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::store;
use serde_json::json;
use std::path::PathBuf;

fn export(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    state.conn()?;
    let workspace = state
        .workspace
        .clone()
        .ok_or_else(|| ScheduleError::unavailable("select a workspace first"))?;
    let out_path = PathBuf::from(required_str(params, "outPath")?);

    let summary = backup::export_workspace_bundle(&workspace, &out_path)
        .map_err(|e| ScheduleError::Query(format!("{:?}", e)))?;
    Ok(json!({
        "outPath": out_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "dbSha256": summary.db_sha256,
    }))
}

fn import(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let workspace = state
        .workspace
        .clone()
        .ok_or_else(|| ScheduleError::unavailable("select a workspace first"))?;
    let in_path = PathBuf::from(required_str(params, "inPath")?);

    // The open connection would race the file swap; close it first and
    // reopen whatever the import leaves behind.
    state.db = None;
    state.workflows.clear();

    let summary = backup::import_workspace_bundle(&in_path, &workspace)
        .map_err(|e| ScheduleError::Query(format!("{:?}", e)));
    let reopened = db::open_db(&workspace)
        .map_err(|e| ScheduleError::unavailable(format!("reopen after import: {:?}", e)));

    match (summary, reopened) {
        (Ok(summary), Ok(conn)) => {
            let snapshot_path = workspace.join(store::SNAPSHOT_FILE);
            if let Err(e) = store::write_snapshot(&conn, &snapshot_path) {
                tracing::warn!(error = %e, "could not refresh offline snapshot");
            }
            state.db = Some(conn);
            Ok(json!({ "bundleFormat": summary.bundle_format_detected }))
        }
        (Err(e), Ok(conn)) => {
            // Import failed but the previous database is intact; stay online.
            state.db = Some(conn);
            Err(e)
        }
        (_, Err(e)) => Err(e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "backup.export" => export(state, &req.params),
        "backup.import" => import(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
