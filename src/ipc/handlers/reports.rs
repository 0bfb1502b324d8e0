use crate::error::ExamResult;
use crate::grades::{self, GradeQuery, SortKey, SortOrder};
use crate::ipc::error::respond;
use crate::ipc::helpers::opt_str_param;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn grades_list(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let query = GradeQuery {
        program_id: opt_str_param(req, "programId"),
        search: opt_str_param(req, "search"),
        sort_by: opt_str_param(req, "sortBy")
            .map(str::parse::<SortKey>)
            .transpose()?
            .unwrap_or_default(),
        order: opt_str_param(req, "order")
            .map(str::parse::<SortOrder>)
            .transpose()?
            .unwrap_or_default(),
    };
    let rows = grades::list_grades(conn, &query)?;
    Ok(json!({ "students": rows }))
}

fn dashboard_stats(state: &AppState, _req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    Ok(json!(grades::dashboard_stats(conn)?))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.list" => grades_list(state, req),
        "dashboard.stats" => dashboard_stats(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
