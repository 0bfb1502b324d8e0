//! Care-plan assessments: a single examiner, a single score out of 20, no
//! reconciliation. Plans are locked as soon as they are written.

use crate::error::{conflict_on_unique, ExamError, ExamResult};
use crate::reconcile::{percentage, round_2};
use crate::store::{self, new_id};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::ops::RangeInclusive;

pub const CARE_PLAN_MAX_SCORE: i64 = 20;
pub const CARE_PLAN_SCORE_RANGE: RangeInclusive<i64> = 0..=CARE_PLAN_MAX_SCORE;

pub fn validate_care_plan_score(score: i64) -> ExamResult<i64> {
    if !CARE_PLAN_SCORE_RANGE.contains(&score) {
        return Err(ExamError::validation(format!(
            "score must be between 0 and {CARE_PLAN_MAX_SCORE}, got {score}"
        )));
    }
    Ok(score)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlan {
    pub id: String,
    pub student_id: String,
    pub program_id: String,
    pub examiner_id: String,
    pub examiner_name: String,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub comments: Option<String>,
    pub assessed_at: DateTime<Utc>,
    pub is_locked: bool,
}

pub struct NewCarePlan<'a> {
    pub student_id: &'a str,
    pub program_id: &'a str,
    pub examiner_id: &'a str,
    pub score: i64,
    pub comments: Option<&'a str>,
}

pub fn create_care_plan(conn: &Connection, plan: NewCarePlan<'_>) -> ExamResult<CarePlan> {
    let score = validate_care_plan_score(plan.score)?;
    store::load_student(conn, plan.student_id)?;
    store::load_program(conn, plan.program_id)?;
    store::require_active_examiner(conn, plan.examiner_id)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO care_plans(id, student_id, program_id, examiner_id, score, max_score, comments, assessed_at, is_locked)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1)",
        (
            &id,
            plan.student_id,
            plan.program_id,
            plan.examiner_id,
            score,
            CARE_PLAN_MAX_SCORE,
            plan.comments,
            Utc::now(),
        ),
    )
    .map_err(|e| conflict_on_unique(e, "care plan already exists for this student"))?;

    tracing::info!(care_plan = %id, student = plan.student_id, score, "care plan recorded");
    load_care_plan(conn, plan.student_id, plan.program_id)?.ok_or(ExamError::not_found("care plan"))
}

const CARE_PLAN_SELECT: &str = "SELECT cp.id, cp.student_id, cp.program_id, cp.examiner_id, e.full_name,
        cp.score, cp.max_score, cp.comments, cp.assessed_at, cp.is_locked
   FROM care_plans cp
   JOIN examiners e ON e.id = cp.examiner_id";

fn care_plan_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<CarePlan> {
    let score: i64 = r.get(5)?;
    let max_score: i64 = r.get(6)?;
    Ok(CarePlan {
        id: r.get(0)?,
        student_id: r.get(1)?,
        program_id: r.get(2)?,
        examiner_id: r.get(3)?,
        examiner_name: r.get(4)?,
        score,
        max_score,
        percentage: round_2(percentage(score, max_score)),
        comments: r.get(7)?,
        assessed_at: r.get(8)?,
        is_locked: r.get::<_, i64>(9)? != 0,
    })
}

pub fn load_care_plan(
    conn: &Connection,
    student_id: &str,
    program_id: &str,
) -> ExamResult<Option<CarePlan>> {
    let sql = format!("{CARE_PLAN_SELECT} WHERE cp.student_id = ? AND cp.program_id = ?");
    Ok(conn
        .query_row(&sql, (student_id, program_id), care_plan_from_row)
        .optional()?)
}

/// Newest first.
pub fn list_care_plans(conn: &Connection, program_id: Option<&str>) -> ExamResult<Vec<CarePlan>> {
    let sql = format!(
        "{CARE_PLAN_SELECT} WHERE (?1 IS NULL OR cp.program_id = ?1) ORDER BY cp.assessed_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let plans = stmt
        .query_map([program_id], care_plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(plans)
}
