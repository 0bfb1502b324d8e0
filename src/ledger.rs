//! Scoring ledger: one score per (assessment, step, examiner), overwritten in
//! place on every autosave.

use crate::assessment::ExaminerCoverage;
use crate::error::{ExamError, ExamResult};
use crate::store::new_id;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::RangeInclusive;

pub const STEP_SCORE_RANGE: RangeInclusive<i64> = 0..=4;

/// Checks a procedure-step score before anything touches the database.
pub fn validate_step_score(score: i64) -> ExamResult<u8> {
    if !STEP_SCORE_RANGE.contains(&score) {
        return Err(ExamError::validation(format!(
            "score must be between {} and {}, got {}",
            STEP_SCORE_RANGE.start(),
            STEP_SCORE_RANGE.end(),
            score
        )));
    }
    Ok(score as u8)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScore {
    pub step: String,
    pub score: u8,
}

/// Inserts or overwrites the examiner's score for a step. Returns `true` when
/// a new row was created.
pub fn upsert_step_score(
    conn: &Connection,
    assessment_id: &str,
    step_id: &str,
    examiner_id: &str,
    score: u8,
    now: DateTime<Utc>,
) -> ExamResult<bool> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM step_scores
             WHERE assessment_id = ? AND step_id = ? AND examiner_id = ? AND is_reconciled = 0",
            (assessment_id, step_id, examiner_id),
            |r| r.get(0),
        )
        .optional()?;

    conn.execute(
        "INSERT INTO step_scores(id, assessment_id, step_id, examiner_id, score, is_reconciled, updated_at)
         VALUES(?, ?, ?, ?, ?, 0, ?)
         ON CONFLICT(assessment_id, step_id, examiner_id, is_reconciled) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (new_id(), assessment_id, step_id, examiner_id, score, now),
    )?;
    Ok(existing.is_none())
}

/// The examiner's own scores, in step order.
pub fn examiner_scores(
    conn: &Connection,
    assessment_id: &str,
    examiner_id: &str,
) -> ExamResult<Vec<StepScore>> {
    let mut stmt = conn.prepare(
        "SELECT ss.step_id, ss.score
         FROM step_scores ss
         JOIN procedure_steps ps ON ps.id = ss.step_id
         WHERE ss.assessment_id = ? AND ss.examiner_id = ? AND ss.is_reconciled = 0
         ORDER BY ps.step_order",
    )?;
    let rows = stmt
        .query_map((assessment_id, examiner_id), |r| {
            Ok(StepScore {
                step: r.get(0)?,
                score: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Raw scores keyed by step id for one examiner.
pub fn examiner_score_map(
    conn: &Connection,
    assessment_id: &str,
    examiner_id: Option<&str>,
) -> ExamResult<HashMap<String, u8>> {
    let Some(examiner_id) = examiner_id else {
        return Ok(HashMap::new());
    };
    Ok(examiner_scores(conn, assessment_id, examiner_id)?
        .into_iter()
        .map(|s| (s.step, s.score))
        .collect())
}

pub fn has_scores_from(
    conn: &Connection,
    assessment_id: &str,
    examiner_id: &str,
) -> ExamResult<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM step_scores WHERE assessment_id = ? AND examiner_id = ?",
        (assessment_id, examiner_id),
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Per-examiner coverage of the procedure's steps. Scores for steps that no
/// longer belong to the procedure are ignored.
pub fn load_coverage(
    conn: &Connection,
    assessment_id: &str,
    procedure_id: &str,
) -> ExamResult<HashMap<String, ExaminerCoverage>> {
    let mut stmt = conn.prepare(
        "SELECT ss.examiner_id, ss.updated_at
         FROM step_scores ss
         JOIN procedure_steps ps ON ps.id = ss.step_id
         WHERE ss.assessment_id = ? AND ps.procedure_id = ? AND ss.is_reconciled = 0",
    )?;
    let rows = stmt
        .query_map((assessment_id, procedure_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, DateTime<Utc>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut coverage: HashMap<String, ExaminerCoverage> = HashMap::new();
    for (examiner_id, updated_at) in rows {
        let entry = coverage.entry(examiner_id).or_default();
        entry.scored_steps += 1;
        if entry.last_updated.map(|t| updated_at > t).unwrap_or(true) {
            entry.last_updated = Some(updated_at);
        }
    }
    Ok(coverage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000, 0).unwrap()
    }

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO examiners(id, full_name) VALUES('ex-a', 'Ama Mensah'), ('ex-b', 'Kofi Boateng');
             INSERT INTO programs(id, name) VALUES('prog', 'General Nursing');
             INSERT INTO students(id, index_number, full_name, program_id) VALUES('stu', 'GN001', 'Esi Owusu', 'prog');
             INSERT INTO procedures(id, program_id, name, total_score) VALUES('proc', 'prog', 'Wound Dressing', 8);
             INSERT INTO procedure_steps(id, procedure_id, description, step_order)
               VALUES('s1', 'proc', 'Wash hands', 1), ('s2', 'proc', 'Clean wound', 2);
             INSERT INTO procedures(id, program_id, name, total_score) VALUES('other', 'prog', 'Injection', 4);
             INSERT INTO procedure_steps(id, procedure_id, description, step_order) VALUES('x1', 'other', 'Prep', 1);
             INSERT INTO assessments(id, student_id, procedure_id, examiner_a, examiner_b, status, assessed_at)
               VALUES('sp', 'stu', 'proc', 'ex-a', 'ex-b', 'pending', '2026-01-01T00:00:00Z');",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn rejects_out_of_range_scores() {
        assert_eq!(validate_step_score(0).expect("0 ok"), 0);
        assert_eq!(validate_step_score(4).expect("4 ok"), 4);
        assert_eq!(validate_step_score(5).unwrap_err().code(), "bad_params");
        assert_eq!(validate_step_score(-1).unwrap_err().code(), "bad_params");
    }

    #[test]
    fn upsert_overwrites_instead_of_duplicating() {
        let conn = seeded();
        let t0 = base();
        assert!(upsert_step_score(&conn, "sp", "s1", "ex-a", 2, t0).expect("insert"));
        let t1 = t0 + Duration::seconds(1);
        assert!(!upsert_step_score(&conn, "sp", "s1", "ex-a", 3, t1).expect("update"));

        let scores = examiner_scores(&conn, "sp", "ex-a").expect("scores");
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 3);
    }

    #[test]
    fn coverage_counts_steps_and_tracks_latest_update() {
        let conn = seeded();
        let t0 = base();
        upsert_step_score(&conn, "sp", "s2", "ex-a", 1, t0 + Duration::seconds(5)).expect("a2");
        upsert_step_score(&conn, "sp", "s1", "ex-a", 4, t0).expect("a1");
        upsert_step_score(&conn, "sp", "s1", "ex-b", 4, t0 + Duration::seconds(2)).expect("b1");
        // A step from another procedure must not count towards coverage.
        conn.execute(
            "INSERT INTO step_scores(id, assessment_id, step_id, examiner_id, score, updated_at)
             VALUES('stray', 'sp', 'x1', 'ex-b', 2, ?)",
            [t0 + Duration::seconds(9)],
        )
        .expect("stray");

        let coverage = load_coverage(&conn, "sp", "proc").expect("coverage");
        let a = coverage["ex-a"];
        assert_eq!(a.scored_steps, 2);
        assert_eq!(a.last_updated, Some(t0 + Duration::seconds(5)));
        let b = coverage["ex-b"];
        assert_eq!(b.scored_steps, 1);
        assert_eq!(b.last_updated, Some(t0 + Duration::seconds(2)));
    }
}
