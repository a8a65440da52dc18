use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::classes::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::teachers::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::timetable::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::overrides::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::substitution::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::exams::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::remarks::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::meetings::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup_exchange::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
