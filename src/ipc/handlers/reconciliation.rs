use crate::error::ExamResult;
use crate::ipc::error::respond;
use crate::ipc::helpers::str_param;
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, percentage, round_2};
use crate::store;
use chrono::Utc;
use serde_json::json;

/// Side-by-side scoring view. Opening it as the eligible examiner of a scored
/// assessment locks reconciliation rights to that examiner.
fn reconciliation_get(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let user = str_param(req, "userId")?;
    let student_id = str_param(req, "studentId")?;
    let procedure_id = str_param(req, "procedureId")?;
    store::require_active_examiner(conn, user)?;
    let student = store::load_student(conn, student_id)?;
    let procedure = store::load_procedure(conn, procedure_id)?;

    let mut snapshot = store::get_or_create_assessment(conn, student_id, procedure_id, user)?;
    if snapshot.should_assign_reconciler(user) {
        store::assign_reconciler(conn, &snapshot.id, user)?;
        snapshot = store::load_snapshot(conn, &snapshot.id)?;
    }

    let assigned = store::examiner_name(conn, snapshot.assigned_reconciler.as_deref())?;
    let steps = reconcile::step_rows(conn, &snapshot)?;
    let total = reconcile::reconciled_total(conn, &snapshot.id)?;
    Ok(json!({
        "assessmentId": snapshot.id,
        "student": student,
        "procedure": procedure,
        "status": snapshot.status,
        "examinerA": store::examiner_name(conn, snapshot.slots.examiner_a())?,
        "examinerB": store::examiner_name(conn, snapshot.slots.examiner_b())?,
        "reconciledByName": store::examiner_name(conn, snapshot.reconciled_by.as_deref())?,
        "reconciledAt": snapshot.reconciled_at,
        "isAlreadyReconciled": snapshot.reconciled_by.is_some(),
        "canUserReconcile": snapshot.can_user_reconcile(user),
        "assignedReconcilerName": assigned,
        "steps": steps,
        "reconciledTotal": total,
        "percentage": round_2(percentage(total, procedure.total_score)),
    }))
}

fn reconciliation_save(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let user = str_param(req, "userId")?;
    let assessment_id = str_param(req, "assessmentId")?;
    let entries = reconcile::parse_entries(req.params.get("reconciledScores"))?;
    store::require_active_examiner(conn, user)?;

    let outcome = reconcile::save_reconciliation(conn, assessment_id, user, &entries, Utc::now())?;
    let snapshot = store::load_snapshot(conn, assessment_id)?;
    let procedure = store::load_procedure(conn, &snapshot.procedure_id)?;
    Ok(json!({
        "detail": "Reconciliation saved successfully",
        "status": outcome.status,
        "reconciledBy": store::examiner_name(conn, Some(outcome.reconciled_by.as_str()))?,
        "reconciledAt": outcome.reconciled_at,
        "reconciledTotal": outcome.reconciled_total,
        "percentage": round_2(percentage(outcome.reconciled_total, procedure.total_score)),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reconciliation.get" => reconciliation_get(state, req),
        "reconciliation.save" => reconciliation_save(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
