use crate::db;
use crate::error::{ScheduleError, ScheduleResult};
use crate::ipc::error::{fail, ok};
use crate::ipc::helpers::{any_period, required_date, required_str};
use crate::ipc::types::{AppState, Request};
use crate::substitution::{MergePolicy, PeriodAction, SubstitutionWorkflow, WorkflowState};
use serde_json::json;

fn merge_policy(state: &AppState) -> MergePolicy {
    let Ok(conn) = state.conn() else {
        return MergePolicy::default();
    };
    db::settings_get(conn, "substitution.merge_policy")
        .ok()
        .flatten()
        .and_then(|raw| MergePolicy::parse(&raw))
        .unwrap_or_default()
}

fn workflow_json(wf: &SubstitutionWorkflow) -> serde_json::Value {
    let mut v = json!({
        "state": wf.state().label(),
        "leave": wf.leave().as_str(),
        "dayName": wf.day(),
        "appliedCount": wf.applied(),
        "pendingPeriods": serde_json::to_value(wf.pending()).unwrap_or_default(),
    });
    if let WorkflowState::ActionApplied(n) = wf.state() {
        v["appliedCount"] = json!(n);
    }
    v
}

fn start(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;
    let policy = merge_policy(state);

    let wf = {
        let store = state.store()?;
        let mut wf = SubstitutionWorkflow::begin(&store, &teacher_id, &date, policy)?;
        wf.identify_periods(&store)?;
        wf
    };
    let result = workflow_json(&wf);
    // A restart for the same leave event replaces the previous instance.
    state.workflows.insert((teacher_id, date), wf);
    Ok(result)
}

fn proposals(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;
    let key = (teacher_id, date);

    let mut wf = state
        .workflows
        .remove(&key)
        .ok_or(ScheduleError::NotFound("substitution workflow"))?;
    let proposed = (|| {
        let store = state.store()?;
        wf.propose(&store)
    })();
    let snapshot = workflow_json(&wf);
    state.workflows.insert(key, wf);

    let proposed = proposed?;
    let mut result = snapshot;
    result["proposals"] = serde_json::to_value(&proposed)?;
    Ok(result)
}

fn apply(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;
    let period = any_period(params, "periodIndex")?;
    let action: PeriodAction = serde_json::from_value(
        params.get("action").cloned().unwrap_or(serde_json::Value::Null),
    )
    .map_err(|e| ScheduleError::validation(format!("bad action payload: {}", e)))?;
    let key = (teacher_id, date);

    let mut wf = state
        .workflows
        .remove(&key)
        .ok_or(ScheduleError::NotFound("substitution workflow"))?;
    let applied = (|| {
        let store = state.writable_store()?;
        wf.apply(&store, period, &action)
    })();
    let snapshot = workflow_json(&wf);
    state.workflows.insert(key, wf);

    let written = applied?;
    let mut result = snapshot;
    result["written"] = serde_json::to_value(&written)?;
    Ok(result)
}

fn dismiss(state: &mut AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    state.require_login()?;
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;

    let wf = state
        .workflows
        .get_mut(&(teacher_id, date))
        .ok_or(ScheduleError::NotFound("substitution workflow"))?;
    wf.dismiss();
    Ok(workflow_json(wf))
}

fn status(state: &AppState, params: &serde_json::Value) -> ScheduleResult<serde_json::Value> {
    let teacher_id = required_str(params, "teacherId")?;
    let date = required_date(params, "date")?;

    match state.workflows.get(&(teacher_id, date)) {
        Some(wf) => Ok(workflow_json(wf)),
        None => Ok(json!({ "state": WorkflowState::Idle.label() })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let resp = match req.method.as_str() {
        "substitution.start" => start(state, &req.params),
        "substitution.proposals" => proposals(state, &req.params),
        "substitution.apply" => apply(state, &req.params),
        "substitution.dismiss" => dismiss(state, &req.params),
        "substitution.status" => status(state, &req.params),
        _ => return None,
    };
    Some(match resp {
        Ok(result) => ok(&req.id, result),
        Err(e) => fail(&req.id, &e),
    })
}
