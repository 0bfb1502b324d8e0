use crate::care_plan::{self, NewCarePlan};
use crate::error::{ExamError, ExamResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{i64_param, opt_str_param, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn care_plans_create(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let plan = NewCarePlan {
        examiner_id: str_param(req, "userId")?,
        student_id: str_param(req, "studentId")?,
        program_id: str_param(req, "programId")?,
        score: i64_param(req, "score")?,
        comments: opt_str_param(req, "comments"),
    };
    let created = care_plan::create_care_plan(conn, plan)?;
    Ok(json!({ "carePlan": created }))
}

fn care_plans_get(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let student_id = str_param(req, "studentId")?;
    let program_id = str_param(req, "programId")?;
    let plan = care_plan::load_care_plan(conn, student_id, program_id)?
        .ok_or(ExamError::not_found("care plan"))?;
    Ok(json!({ "carePlan": plan }))
}

fn care_plans_list(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "carePlans": [] }));
    };
    let plans = care_plan::list_care_plans(conn, opt_str_param(req, "programId"))?;
    Ok(json!({ "carePlans": plans }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "carePlans.create" => care_plans_create(state, req),
        "carePlans.get" => care_plans_get(state, req),
        "carePlans.list" => care_plans_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
