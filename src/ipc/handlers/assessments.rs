use crate::assessment::{AssessmentSnapshot, ExaminerSlots, SlotClaim};
use crate::error::{ExamError, ExamResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{i64_param, opt_str_param, str_param};
use crate::ipc::types::{AppState, Request};
use crate::{ledger, store};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;

fn examiner_names(conn: &Connection, slots: &ExaminerSlots) -> ExamResult<serde_json::Value> {
    Ok(json!({
        "examinerA": store::examiner_name(conn, slots.examiner_a())?,
        "examinerB": store::examiner_name(conn, slots.examiner_b())?,
    }))
}

/// Claims an examiner seat for `user`, or refuses with both examiners' names
/// when the seats are taken.
fn claim_seat(
    conn: &Connection,
    snapshot: AssessmentSnapshot,
    user: &str,
) -> ExamResult<AssessmentSnapshot> {
    match snapshot.slots.claim(user) {
        SlotClaim::Unchanged => Ok(snapshot),
        SlotClaim::Claimed(slots) => {
            store::save_slots(conn, &snapshot.id, &slots)?;
            tracing::info!(assessment = %snapshot.id, examiner = user, "examiner seat claimed");
            store::load_snapshot(conn, &snapshot.id)
        }
        SlotClaim::Refused => Err(ExamError::Forbidden {
            message: "you are not assigned as an examiner for this procedure".to_string(),
            details: Some(examiner_names(conn, &snapshot.slots)?),
        }),
    }
}

fn assessment_open(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let user = str_param(req, "userId")?;
    let student_id = str_param(req, "studentId")?;
    let procedure_id = str_param(req, "procedureId")?;
    store::require_active_examiner(conn, user)?;
    let procedure = store::load_procedure(conn, procedure_id)?;

    let snapshot = store::get_or_create_assessment(conn, student_id, procedure_id, user)?;
    let snapshot = claim_seat(conn, snapshot, user)?;

    let steps = store::load_steps(conn, procedure_id)?;
    let scores = ledger::examiner_scores(conn, &snapshot.id, user)?;
    Ok(json!({
        "id": procedure.id,
        "name": procedure.name,
        "totalScore": procedure.total_score,
        "steps": steps,
        "assessmentId": snapshot.id,
        "studentId": snapshot.student_id,
        "status": snapshot.status,
        "scores": scores,
        "isExaminer": snapshot.slots.holds(user),
        "examinerRole": snapshot.examiner_role(user),
        "bothExaminersAssigned": snapshot.slots.both_assigned(),
        "canModifyScores": snapshot.can_modify_scores(user),
        "isLocked": snapshot.is_locked(),
        "displayStatus": snapshot.display_status(user),
    }))
}

/// Explicitly seats one or two examiners. Examiners who already scored the
/// assessment cannot be swapped out, and locked assessments are left alone.
fn assessment_assign(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let student_id = str_param(req, "studentId")?;
    let procedure_id = str_param(req, "procedureId")?;
    let examiner_a = str_param(req, "examinerAId")?;
    let examiner_b = opt_str_param(req, "examinerBId");
    store::load_student(conn, student_id)?;
    store::load_procedure(conn, procedure_id)?;
    store::require_active_examiner(conn, examiner_a)?;

    let slots = match examiner_b {
        Some(b) if b == examiner_a => {
            return Err(ExamError::validation(
                "examinerAId and examinerBId must be different examiners",
            ));
        }
        Some(b) => {
            store::require_active_examiner(conn, b)?;
            ExaminerSlots::TwoExaminers(examiner_a.to_string(), b.to_string())
        }
        None => ExaminerSlots::SingleExaminer(examiner_a.to_string()),
    };

    let existing = store::find_assessment_id(conn, student_id, procedure_id)?;
    let (assessment_id, created) = match existing {
        Some(id) => {
            let current = store::load_snapshot(conn, &id)?;
            if current.is_locked() {
                return Err(ExamError::conflict("assessment is locked"));
            }
            for holder in [current.slots.examiner_a(), current.slots.examiner_b()]
                .into_iter()
                .flatten()
            {
                if !slots.holds(holder) && ledger::has_scores_from(conn, &id, holder)? {
                    return Err(ExamError::conflict(
                        "an examiner with recorded scores cannot be replaced",
                    ));
                }
            }
            store::save_slots(conn, &id, &slots)?;
            (id, false)
        }
        None => (
            store::create_assessment(conn, student_id, procedure_id, &slots)?,
            true,
        ),
    };
    tracing::info!(assessment = %assessment_id, created, "examiners assigned");

    let names = examiner_names(conn, &slots)?;
    Ok(json!({
        "assessmentId": assessment_id,
        "created": created,
        "examinerA": names["examinerA"],
        "examinerB": names["examinerB"],
    }))
}

fn scores_autosave(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let user = str_param(req, "userId")?;
    let assessment_id = str_param(req, "assessmentId")?;
    let step_id = str_param(req, "stepId")?;
    let score = ledger::validate_step_score(i64_param(req, "score")?)?;
    store::require_active_examiner(conn, user)?;

    let tx = conn.unchecked_transaction()?;
    let snapshot = store::load_snapshot(&tx, assessment_id)?;
    store::load_step_in_procedure(&tx, step_id, &snapshot.procedure_id)?;
    if !snapshot.slots.holds(user) {
        return Err(ExamError::forbidden("you are not authorized to score this procedure"));
    }
    if !snapshot.can_modify_scores(user) {
        return Err(ExamError::forbidden("scores are locked for this procedure"));
    }

    let created = ledger::upsert_step_score(&tx, assessment_id, step_id, user, score, Utc::now())?;
    let snapshot = store::load_snapshot(&tx, assessment_id)?;
    let next = snapshot.next_status();
    if next != snapshot.status {
        store::save_status(&tx, assessment_id, next)?;
        tracing::info!(
            assessment = assessment_id,
            from = %snapshot.status,
            to = %next,
            "status advanced"
        );
    }
    tx.commit()?;

    let (a_complete, b_complete) = snapshot.completion();
    Ok(json!({
        "step": step_id,
        "score": score,
        "created": created,
        "status": next,
        "examinerAComplete": a_complete,
        "examinerBComplete": b_complete,
        "bothExaminersAssigned": snapshot.slots.both_assigned(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assessment.open" => assessment_open(state, req),
        "assessment.assign" => assessment_assign(state, req),
        "scores.autosave" => scores_autosave(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
