//! Minimal management of the records the scoring workflow hangs off:
//! examiners, programs, students, procedures and their steps.

use crate::assessment::{AssessmentStatus, DisplayStatus};
use crate::error::{conflict_on_unique, ExamError, ExamResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{i64_param, opt_str_param, str_param};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, new_id, STUDENT_LEVELS};
use serde_json::json;

const EXAMINER_ROLES: [&str; 2] = ["examiner", "admin"];

fn examiners_create(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let full_name = str_param(req, "fullName")?;
    let role = opt_str_param(req, "role").unwrap_or("examiner");
    if !EXAMINER_ROLES.contains(&role) {
        return Err(ExamError::validation("role must be one of: examiner, admin"));
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO examiners(id, full_name, role, is_active) VALUES(?, ?, ?, 1)",
        (&id, full_name, role),
    )?;
    Ok(json!({ "examinerId": id, "fullName": full_name, "role": role }))
}

fn examiners_list(state: &AppState, _req: &Request) -> ExamResult<serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "examiners": [] }));
    };
    let mut stmt = conn.prepare(
        "SELECT id, full_name, role, is_active FROM examiners
         WHERE role = 'examiner' ORDER BY full_name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "role": r.get::<_, String>(2)?,
                "isActive": r.get::<_, i64>(3)? != 0,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "examiners": rows }))
}

fn examiners_toggle_active(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let examiner = store::load_examiner(conn, str_param(req, "examinerId")?)?;
    let is_active = !examiner.is_active;
    conn.execute(
        "UPDATE examiners SET is_active = ? WHERE id = ?",
        (is_active as i64, &examiner.id),
    )?;
    Ok(json!({ "isActive": is_active }))
}

fn programs_create(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let name = str_param(req, "name")?;
    let abbreviation = opt_str_param(req, "abbreviation");

    let id = new_id();
    conn.execute(
        "INSERT INTO programs(id, name, abbreviation) VALUES(?, ?, ?)",
        (&id, name, abbreviation),
    )
    .map_err(|e| conflict_on_unique(e, "program name or abbreviation already exists"))?;
    Ok(json!({ "programId": id, "name": name, "abbreviation": abbreviation }))
}

fn programs_list(state: &AppState, _req: &Request) -> ExamResult<serde_json::Value> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "programs": [] }));
    };
    let mut stmt = conn.prepare("SELECT id, name, abbreviation FROM programs ORDER BY name")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(store::Program {
                id: r.get(0)?,
                name: r.get(1)?,
                abbreviation: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "programs": rows }))
}

fn parse_level(req: &Request) -> ExamResult<Option<&str>> {
    match opt_str_param(req, "level") {
        None | Some("all") => Ok(None),
        Some(level) if STUDENT_LEVELS.contains(&level) => Ok(Some(level)),
        Some(other) => Err(ExamError::validation(format!(
            "level must be one of: 100, 200, 300, 400 (got {other})"
        ))),
    }
}

fn students_create(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let index_number = str_param(req, "indexNumber")?;
    let full_name = str_param(req, "fullName")?;
    let program_id = str_param(req, "programId")?;
    let level = parse_level(req)?.unwrap_or("100");
    store::load_program(conn, program_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO students(id, index_number, full_name, program_id, level, is_active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (&id, index_number, full_name, program_id, level),
    )
    .map_err(|e| conflict_on_unique(e, "index number already exists"))?;
    Ok(json!({ "student": store::load_student(conn, &id)? }))
}

fn students_get(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let student = store::load_student(conn, str_param(req, "studentId")?)?;
    Ok(json!({ "student": student }))
}

fn students_list_by_program(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let program_id = str_param(req, "programId")?;
    let level = parse_level(req)?;
    store::load_program(conn, program_id)?;
    let students = store::list_students(conn, program_id, level)?;
    Ok(json!({ "students": students }))
}

fn students_toggle_active(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let student = store::load_student(conn, str_param(req, "studentId")?)?;
    let is_active = !student.is_active;
    conn.execute(
        "UPDATE students SET is_active = ? WHERE id = ?",
        (is_active as i64, &student.id),
    )?;
    Ok(json!({ "isActive": is_active }))
}

fn procedures_create(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let program_id = str_param(req, "programId")?;
    let name = str_param(req, "name")?;
    let total_score = i64_param(req, "totalScore")?;
    if total_score <= 0 {
        return Err(ExamError::validation("totalScore must be a positive integer"));
    }
    store::load_program(conn, program_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO procedures(id, program_id, name, total_score) VALUES(?, ?, ?, ?)",
        (&id, program_id, name, total_score),
    )
    .map_err(|e| conflict_on_unique(e, "procedure name already exists in this program"))?;
    Ok(json!({ "procedureId": id, "name": name, "totalScore": total_score }))
}

fn steps_create(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let procedure_id = str_param(req, "procedureId")?;
    let description = str_param(req, "description")?;
    let step_order = i64_param(req, "stepOrder")?;
    if step_order < 0 {
        return Err(ExamError::validation("stepOrder must be >= 0"));
    }
    store::load_procedure(conn, procedure_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO procedure_steps(id, procedure_id, description, step_order) VALUES(?, ?, ?, ?)",
        (&id, procedure_id, description, step_order),
    )
    .map_err(|e| conflict_on_unique(e, "stepOrder already used in this procedure"))?;
    Ok(json!({ "stepId": id, "stepOrder": step_order }))
}

/// Procedures of a program, with the per-student workflow state when a
/// student (and the viewing examiner) are given.
fn procedures_list_by_program(state: &AppState, req: &Request) -> ExamResult<serde_json::Value> {
    let conn = state.conn()?;
    let program = store::load_program(conn, str_param(req, "programId")?)?;
    let student_id = opt_str_param(req, "studentId");
    let user = opt_str_param(req, "userId").unwrap_or("");

    let mut stmt = conn.prepare(
        "SELECT id, name, total_score FROM procedures WHERE program_id = ? ORDER BY name",
    )?;
    let procedures = stmt
        .query_map([&program.id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(procedures.len());
    for (procedure_id, name, total_score) in procedures {
        let snapshot = match student_id {
            Some(sid) => match store::find_assessment_id(conn, sid, &procedure_id)? {
                Some(aid) => Some(store::load_snapshot(conn, &aid)?),
                None => None,
            },
            None => None,
        };
        let (status, can_reconcile, display_status) = match &snapshot {
            Some(s) => (
                s.listed_status(),
                s.can_user_reconcile(user),
                s.display_status(user),
            ),
            None => (AssessmentStatus::Pending, false, DisplayStatus::Pending),
        };
        rows.push(json!({
            "id": procedure_id,
            "name": name,
            "totalScore": total_score,
            "programId": program.id,
            "programName": program.name,
            "programAbbreviation": program.abbreviation,
            "stepCount": store::step_count(conn, &procedure_id)?,
            "status": status,
            "canReconcile": can_reconcile,
            "displayStatus": display_status,
        }));
    }
    Ok(json!({ "procedures": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "examiners.create" => examiners_create(state, req),
        "examiners.list" => examiners_list(state, req),
        "examiners.toggleActive" => examiners_toggle_active(state, req),
        "programs.create" => programs_create(state, req),
        "programs.list" => programs_list(state, req),
        "students.create" => students_create(state, req),
        "students.get" => students_get(state, req),
        "students.listByProgram" => students_list_by_program(state, req),
        "students.toggleActive" => students_toggle_active(state, req),
        "procedures.create" => procedures_create(state, req),
        "procedures.listByProgram" => procedures_list_by_program(state, req),
        "steps.create" => steps_create(state, req),
        _ => return None,
    };
    Some(respond(&req.id, &req.method, result))
}
