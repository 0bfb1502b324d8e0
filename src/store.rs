use crate::assessment::{AssessmentSnapshot, AssessmentStatus, ExaminerCoverage, ExaminerSlots};
use crate::error::{ExamError, ExamResult};
use crate::ledger;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

pub const STUDENT_LEVELS: [&str; 4] = ["100", "200", "300", "400"];

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Examiner {
    pub id: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    pub id: String,
    pub name: String,
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub index_number: String,
    pub full_name: String,
    pub program: Program,
    pub level: String,
    pub level_display: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    pub id: String,
    pub program_id: String,
    pub name: String,
    pub total_score: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureStep {
    pub id: String,
    pub description: String,
    pub step_order: i64,
}

pub fn load_examiner(conn: &Connection, examiner_id: &str) -> ExamResult<Examiner> {
    conn.query_row(
        "SELECT id, full_name, role, is_active FROM examiners WHERE id = ?",
        [examiner_id],
        |r| {
            Ok(Examiner {
                id: r.get(0)?,
                full_name: r.get(1)?,
                role: r.get(2)?,
                is_active: r.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()?
    .ok_or(ExamError::not_found("examiner"))
}

/// Resolves the acting user. Inactive accounts may not act.
pub fn require_active_examiner(conn: &Connection, examiner_id: &str) -> ExamResult<Examiner> {
    let examiner = load_examiner(conn, examiner_id)?;
    if !examiner.is_active {
        return Err(ExamError::forbidden("examiner account is inactive"));
    }
    Ok(examiner)
}

pub fn examiner_name(conn: &Connection, examiner_id: Option<&str>) -> ExamResult<Option<String>> {
    let Some(id) = examiner_id else {
        return Ok(None);
    };
    Ok(conn
        .query_row(
            "SELECT full_name FROM examiners WHERE id = ?",
            [id],
            |r| r.get(0),
        )
        .optional()?)
}

pub fn load_program(conn: &Connection, program_id: &str) -> ExamResult<Program> {
    conn.query_row(
        "SELECT id, name, abbreviation FROM programs WHERE id = ?",
        [program_id],
        |r| {
            Ok(Program {
                id: r.get(0)?,
                name: r.get(1)?,
                abbreviation: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(ExamError::not_found("program"))
}

pub fn level_display(level: &str) -> String {
    format!("Level {level}")
}

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    let level: String = r.get(3)?;
    Ok(Student {
        id: r.get(0)?,
        index_number: r.get(1)?,
        full_name: r.get(2)?,
        level_display: level_display(&level),
        level,
        is_active: r.get::<_, i64>(4)? != 0,
        program: Program {
            id: r.get(5)?,
            name: r.get(6)?,
            abbreviation: r.get(7)?,
        },
    })
}

const STUDENT_SELECT: &str = "SELECT s.id, s.index_number, s.full_name, s.level, s.is_active,
        p.id, p.name, p.abbreviation
   FROM students s
   JOIN programs p ON p.id = s.program_id";

pub fn load_student(conn: &Connection, student_id: &str) -> ExamResult<Student> {
    let sql = format!("{STUDENT_SELECT} WHERE s.id = ?");
    conn.query_row(&sql, [student_id], student_from_row)
        .optional()?
        .ok_or(ExamError::not_found("student"))
}

/// Active students of a program ordered by level then index number.
pub fn list_students(
    conn: &Connection,
    program_id: &str,
    level: Option<&str>,
) -> ExamResult<Vec<Student>> {
    let sql = format!(
        "{STUDENT_SELECT}
         WHERE s.program_id = ?1 AND s.is_active = 1 AND (?2 IS NULL OR s.level = ?2)
         ORDER BY s.level, s.index_number"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((program_id, level), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_procedure(conn: &Connection, procedure_id: &str) -> ExamResult<Procedure> {
    conn.query_row(
        "SELECT id, program_id, name, total_score FROM procedures WHERE id = ?",
        [procedure_id],
        |r| {
            Ok(Procedure {
                id: r.get(0)?,
                program_id: r.get(1)?,
                name: r.get(2)?,
                total_score: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or(ExamError::not_found("procedure"))
}

pub fn load_steps(conn: &Connection, procedure_id: &str) -> ExamResult<Vec<ProcedureStep>> {
    let mut stmt = conn.prepare(
        "SELECT id, description, step_order FROM procedure_steps
         WHERE procedure_id = ? ORDER BY step_order",
    )?;
    let steps = stmt
        .query_map([procedure_id], |r| {
            Ok(ProcedureStep {
                id: r.get(0)?,
                description: r.get(1)?,
                step_order: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(steps)
}

/// Looks up a step and checks it belongs to `procedure_id`.
pub fn load_step_in_procedure(
    conn: &Connection,
    step_id: &str,
    procedure_id: &str,
) -> ExamResult<ProcedureStep> {
    conn.query_row(
        "SELECT id, description, step_order FROM procedure_steps
         WHERE id = ? AND procedure_id = ?",
        (step_id, procedure_id),
        |r| {
            Ok(ProcedureStep {
                id: r.get(0)?,
                description: r.get(1)?,
                step_order: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(ExamError::not_found("step"))
}

pub fn step_count(conn: &Connection, procedure_id: &str) -> ExamResult<usize> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM procedure_steps WHERE procedure_id = ?",
        [procedure_id],
        |r| r.get(0),
    )?;
    Ok(n as usize)
}

pub fn find_assessment_id(
    conn: &Connection,
    student_id: &str,
    procedure_id: &str,
) -> ExamResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM assessments WHERE student_id = ? AND procedure_id = ?",
            (student_id, procedure_id),
            |r| r.get(0),
        )
        .optional()?)
}

struct AssessmentRow {
    id: String,
    student_id: String,
    procedure_id: String,
    examiner_a: Option<String>,
    examiner_b: Option<String>,
    status: String,
    assigned_reconciler: Option<String>,
    reconciled_by: Option<String>,
    reconciled_at: Option<DateTime<Utc>>,
}

pub fn load_snapshot(conn: &Connection, assessment_id: &str) -> ExamResult<AssessmentSnapshot> {
    let row = conn
        .query_row(
            "SELECT id, student_id, procedure_id, examiner_a, examiner_b, status,
                    assigned_reconciler, reconciled_by, reconciled_at
             FROM assessments WHERE id = ?",
            [assessment_id],
            |r| {
                Ok(AssessmentRow {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    procedure_id: r.get(2)?,
                    examiner_a: r.get(3)?,
                    examiner_b: r.get(4)?,
                    status: r.get(5)?,
                    assigned_reconciler: r.get(6)?,
                    reconciled_by: r.get(7)?,
                    reconciled_at: r.get(8)?,
                })
            },
        )
        .optional()?
        .ok_or(ExamError::not_found("assessment"))?;

    let status: AssessmentStatus = row.status.parse().map_err(ExamError::Validation)?;
    let slots = ExaminerSlots::from_columns(row.examiner_a, row.examiner_b);
    let step_count = step_count(conn, &row.procedure_id)?;
    let coverage = ledger::load_coverage(conn, &row.id, &row.procedure_id)?;
    let coverage_of = |who: Option<&str>| -> ExaminerCoverage {
        who.and_then(|id| coverage.get(id).copied())
            .unwrap_or_default()
    };
    let coverage_a = coverage_of(slots.examiner_a());
    let coverage_b = coverage_of(slots.examiner_b());

    Ok(AssessmentSnapshot {
        id: row.id,
        student_id: row.student_id,
        procedure_id: row.procedure_id,
        slots,
        status,
        assigned_reconciler: row.assigned_reconciler,
        reconciled_by: row.reconciled_by,
        reconciled_at: row.reconciled_at,
        step_count,
        coverage_a,
        coverage_b,
    })
}

pub fn create_assessment(
    conn: &Connection,
    student_id: &str,
    procedure_id: &str,
    slots: &ExaminerSlots,
) -> ExamResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO assessments(id, student_id, procedure_id, examiner_a, examiner_b, status, assessed_at)
         VALUES(?, ?, ?, ?, ?, 'pending', ?)",
        (
            &id,
            student_id,
            procedure_id,
            slots.examiner_a(),
            slots.examiner_b(),
            Utc::now(),
        ),
    )?;
    tracing::info!(
        assessment = %id,
        student = student_id,
        procedure = procedure_id,
        "assessment created"
    );
    Ok(id)
}

/// Returns the assessment for (student, procedure), creating it with `user`
/// in the first examiner seat when it does not exist yet.
pub fn get_or_create_assessment(
    conn: &Connection,
    student_id: &str,
    procedure_id: &str,
    user: &str,
) -> ExamResult<AssessmentSnapshot> {
    load_student(conn, student_id)?;
    load_procedure(conn, procedure_id)?;
    let id = match find_assessment_id(conn, student_id, procedure_id)? {
        Some(id) => id,
        None => create_assessment(
            conn,
            student_id,
            procedure_id,
            &ExaminerSlots::SingleExaminer(user.to_string()),
        )?,
    };
    load_snapshot(conn, &id)
}

pub fn save_slots(conn: &Connection, assessment_id: &str, slots: &ExaminerSlots) -> ExamResult<()> {
    conn.execute(
        "UPDATE assessments SET examiner_a = ?, examiner_b = ? WHERE id = ?",
        (slots.examiner_a(), slots.examiner_b(), assessment_id),
    )?;
    Ok(())
}

pub fn save_status(
    conn: &Connection,
    assessment_id: &str,
    status: AssessmentStatus,
) -> ExamResult<()> {
    conn.execute(
        "UPDATE assessments SET status = ? WHERE id = ?",
        (status.as_str(), assessment_id),
    )?;
    Ok(())
}

/// Locks reconciliation rights to `user`. A reconciler that is already set is
/// never replaced; returns whether this call set it.
pub fn assign_reconciler(conn: &Connection, assessment_id: &str, user: &str) -> ExamResult<bool> {
    let changed = conn.execute(
        "UPDATE assessments SET assigned_reconciler = ?
         WHERE id = ? AND assigned_reconciler IS NULL",
        (user, assessment_id),
    )?;
    if changed > 0 {
        tracing::info!(assessment = assessment_id, reconciler = user, "reconciler assigned");
    }
    Ok(changed > 0)
}
