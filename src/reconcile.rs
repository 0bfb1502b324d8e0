//! Reconciliation engine: turns two examiners' raw step scores into one final
//! score per step.

use crate::assessment::{AssessmentSnapshot, AssessmentStatus};
use crate::error::{ExamError, ExamResult};
use crate::ledger;
use crate::store::{self, new_id, ProcedureStep};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledEntry {
    pub step_id: String,
    pub score: i64,
}

/// Parses `reconciledScores: [{stepId, score}, ...]`.
pub fn parse_entries(raw: Option<&serde_json::Value>) -> ExamResult<Vec<ReconciledEntry>> {
    let Some(items) = raw.and_then(|v| v.as_array()) else {
        return Err(ExamError::validation("missing reconciledScores[]"));
    };
    if items.is_empty() {
        return Err(ExamError::validation("reconciledScores must not be empty"));
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let step_id = item.get("stepId").and_then(|v| v.as_str());
            let score = item.get("score").and_then(|v| v.as_i64());
            match (step_id, score) {
                (Some(step_id), Some(score)) => Ok(ReconciledEntry {
                    step_id: step_id.to_string(),
                    score,
                }),
                _ => Err(ExamError::validation(format!(
                    "entry at index {i} must have stepId and score"
                ))),
            }
        })
        .collect()
}

/// Scores a reconciler may pick between: every integer from the lower raw
/// score to the higher one. Empty until both examiners have scored the step.
pub fn valid_score_range(a: Option<u8>, b: Option<u8>) -> Vec<u8> {
    match (a, b) {
        (Some(a), Some(b)) => (a.min(b)..=a.max(b)).collect(),
        _ => Vec::new(),
    }
}

pub fn percentage(sum: i64, total_score: i64) -> f64 {
    if total_score > 0 {
        sum as f64 / total_score as f64 * 100.0
    } else {
        0.0
    }
}

pub fn round_2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn grade_band(percentage: f64) -> &'static str {
    if percentage >= 80.0 {
        "Distinction"
    } else if percentage >= 70.0 {
        "Credit"
    } else if percentage >= 60.0 {
        "Pass"
    } else {
        "Fail"
    }
}

/// Shape checks: one in-domain entry for every step of the procedure.
pub fn validate_entries(steps: &[ProcedureStep], entries: &[ReconciledEntry]) -> ExamResult<()> {
    if entries.len() != steps.len() {
        return Err(ExamError::validation(format!(
            "expected {} scores, got {}",
            steps.len(),
            entries.len()
        )));
    }
    let known: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for entry in entries {
        if !known.contains(entry.step_id.as_str()) {
            return Err(ExamError::validation(format!(
                "step {} not found in this procedure",
                entry.step_id
            )));
        }
        if !seen.insert(entry.step_id.as_str()) {
            return Err(ExamError::validation(format!(
                "step {} submitted more than once",
                entry.step_id
            )));
        }
        ledger::validate_step_score(entry.score)?;
    }
    Ok(())
}

/// Who may write reconciled scores: the eligible reconciler of a scored
/// assessment, or whoever reconciled it when re-running.
pub fn authorize(snapshot: &AssessmentSnapshot, user: &str) -> ExamResult<()> {
    match snapshot.status {
        AssessmentStatus::Pending => Err(ExamError::conflict(
            "assessment is not ready for reconciliation",
        )),
        AssessmentStatus::Scored if snapshot.can_user_reconcile(user) => Ok(()),
        AssessmentStatus::Reconciled if snapshot.reconciled_by.as_deref() == Some(user) => Ok(()),
        _ => Err(ExamError::forbidden(
            "you are not the assigned reconciler for this procedure",
        )),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationOutcome {
    pub status: AssessmentStatus,
    pub reconciled_by: String,
    pub reconciled_at: DateTime<Utc>,
    pub reconciled_total: i64,
}

/// Validates and writes a reconciliation in one transaction. Prior reconciled
/// scores are deleted and recreated, so the stored set always has exactly one
/// row per step.
pub fn save_reconciliation(
    conn: &Connection,
    assessment_id: &str,
    user: &str,
    entries: &[ReconciledEntry],
    now: DateTime<Utc>,
) -> ExamResult<ReconciliationOutcome> {
    let snapshot = store::load_snapshot(conn, assessment_id)?;
    let steps = store::load_steps(conn, &snapshot.procedure_id)?;
    validate_entries(&steps, entries)?;
    authorize(&snapshot, user)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE assessments SET assigned_reconciler = ?
         WHERE id = ? AND assigned_reconciler IS NULL",
        (user, assessment_id),
    )?;
    tx.execute(
        "DELETE FROM reconciled_scores WHERE assessment_id = ?",
        [assessment_id],
    )?;
    for entry in entries {
        tx.execute(
            "INSERT INTO reconciled_scores(id, assessment_id, step_id, score,
                                           reconciled_by, reconciled_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (new_id(), assessment_id, &entry.step_id, entry.score, user, now),
        )?;
    }
    tx.execute(
        "UPDATE assessments SET status = 'reconciled', reconciled_by = ?, reconciled_at = ?
         WHERE id = ?",
        (user, now, assessment_id),
    )?;
    tx.commit()?;

    let reconciled_total = entries.iter().map(|e| e.score).sum();
    tracing::info!(
        assessment = assessment_id,
        reconciler = user,
        total = reconciled_total,
        "reconciliation saved"
    );
    Ok(ReconciliationOutcome {
        status: AssessmentStatus::Reconciled,
        reconciled_by: user.to_string(),
        reconciled_at: now,
        reconciled_total,
    })
}

pub fn reconciled_score_map(
    conn: &Connection,
    assessment_id: &str,
) -> ExamResult<HashMap<String, u8>> {
    let mut stmt =
        conn.prepare("SELECT step_id, score FROM reconciled_scores WHERE assessment_id = ?")?;
    let rows = stmt
        .query_map([assessment_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, u8>(1)?))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn reconciled_total(conn: &Connection, assessment_id: &str) -> ExamResult<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(SUM(score), 0) FROM reconciled_scores WHERE assessment_id = ?",
        [assessment_id],
        |r| r.get(0),
    )?)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReconciliation {
    pub id: String,
    pub description: String,
    pub step_order: i64,
    pub examiner_a_score: Option<u8>,
    pub examiner_b_score: Option<u8>,
    pub reconciled_score: Option<u8>,
    pub valid_scores: Vec<u8>,
}

/// Side-by-side view of both examiners' raw scores for every step.
pub fn step_rows(
    conn: &Connection,
    snapshot: &AssessmentSnapshot,
) -> ExamResult<Vec<StepReconciliation>> {
    let steps = store::load_steps(conn, &snapshot.procedure_id)?;
    let a_scores = ledger::examiner_score_map(conn, &snapshot.id, snapshot.slots.examiner_a())?;
    let b_scores = ledger::examiner_score_map(conn, &snapshot.id, snapshot.slots.examiner_b())?;
    let reconciled = reconciled_score_map(conn, &snapshot.id)?;

    Ok(steps
        .into_iter()
        .map(|step| {
            let a = a_scores.get(&step.id).copied();
            let b = b_scores.get(&step.id).copied();
            StepReconciliation {
                reconciled_score: reconciled.get(&step.id).copied(),
                valid_scores: valid_score_range(a, b),
                examiner_a_score: a,
                examiner_b_score: b,
                id: step.id,
                description: step.description,
                step_order: step.step_order,
            }
        })
        .collect())
}
