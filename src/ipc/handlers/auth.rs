use crate::db;
use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;

fn digest_key(role: Role) -> &'static str {
    match role {
        Role::Principal => "auth.principal_sha256",
        Role::Staff => "auth.staff_sha256",
    }
}

fn check_password(state: &AppState, role: Role, password: &str) -> ScheduleResult<bool> {
    let conn = state.conn()?;
    let stored = db::settings_get(conn, digest_key(role))
        .map_err(|e| ScheduleError::Query(e.to_string()))?
        .ok_or_else(|| ScheduleError::Query("auth settings missing".into()))?;
    Ok(db::sha256_hex(password) == stored)
}

fn login(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let role = Role::parse(&required_str(params, "role")?)
        .ok_or_else(|| ScheduleError::validation("role must be principal or staff"))?;
    let password = required_str(params, "password")?;

    if !check_password(state, role, &password)? {
        return Err(ScheduleError::Unauthorized("incorrect password".into()));
    }
    state.session_role = Some(role);
    tracing::info!(role = role.as_str(), "login");
    Ok(json!({ "role": role.as_str() }))
}

fn set_password(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_principal()?;
    let role = Role::parse(&required_str(params, "role")?)
        .ok_or_else(|| ScheduleError::validation("role must be principal or staff"))?;
    let current = required_str(params, "current")?;
    let new = required_str(params, "new")?;
    if new.len() < 6 {
        return Err(ScheduleError::validation(
            "new password must be at least 6 characters",
        ));
    }

    // The principal confirms with their own password, whichever role is
    // being changed.
    if !check_password(state, Role::Principal, &current)? {
        return Err(ScheduleError::Unauthorized("incorrect password".into()));
    }
    let conn = state.conn()?;
    db::settings_set(conn, digest_key(role), &db::sha256_hex(&new))
        .map_err(|e| ScheduleError::Query(e.to_string()))?;
    Ok(json!({ "role": role.as_str(), "changed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "auth.login" => login(state, &req.params),
        "auth.setPassword" => set_password(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
