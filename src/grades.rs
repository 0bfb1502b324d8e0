//! Read-only reporting over reconciled results: the grade sheet and the
//! dashboard counters.

use crate::error::{ExamError, ExamResult};
use crate::reconcile::{grade_band, percentage, round_2};
use rusqlite::Connection;
use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

pub const NO_GRADE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    IndexNumber,
    FullName,
    Percentage,
    TotalScore,
}

impl FromStr for SortKey {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "indexNumber" => Ok(SortKey::IndexNumber),
            "fullName" => Ok(SortKey::FullName),
            "percentage" => Ok(SortKey::Percentage),
            "totalScore" => Ok(SortKey::TotalScore),
            other => Err(ExamError::validation(format!(
                "sortBy must be one of: indexNumber, fullName, percentage, totalScore (got {other})"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(ExamError::validation("order must be asc or desc")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradeQuery<'a> {
    pub program_id: Option<&'a str>,
    pub search: Option<&'a str>,
    pub sort_by: SortKey,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub student_id: String,
    pub index_number: String,
    pub full_name: String,
    pub program_name: String,
    pub level: String,
    pub total_score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub grade: &'static str,
    pub procedures_total: i64,
    pub procedures_reconciled: i64,
}

fn compare(a: &GradeRow, b: &GradeRow, key: SortKey) -> Ordering {
    match key {
        SortKey::IndexNumber => a.index_number.cmp(&b.index_number),
        SortKey::FullName => a.full_name.to_lowercase().cmp(&b.full_name.to_lowercase()),
        SortKey::Percentage => a.percentage.total_cmp(&b.percentage),
        SortKey::TotalScore => a.total_score.cmp(&b.total_score),
    }
    .then_with(|| a.index_number.cmp(&b.index_number))
}

/// One row per active student. Only reconciled assessments count towards the
/// totals.
pub fn list_grades(conn: &Connection, query: &GradeQuery<'_>) -> ExamResult<Vec<GradeRow>> {
    let pattern = query
        .search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.to_lowercase()));

    let mut stmt = conn.prepare(
        "SELECT s.id, s.index_number, s.full_name, p.name, s.level,
                (SELECT COUNT(*) FROM procedures pr WHERE pr.program_id = s.program_id),
                (SELECT COUNT(*) FROM assessments a
                  WHERE a.student_id = s.id AND a.status = 'reconciled'),
                (SELECT COALESCE(SUM(rs.score), 0) FROM reconciled_scores rs
                   JOIN assessments a ON a.id = rs.assessment_id
                  WHERE a.student_id = s.id AND a.status = 'reconciled'),
                (SELECT COALESCE(SUM(pr.total_score), 0) FROM assessments a
                   JOIN procedures pr ON pr.id = a.procedure_id
                  WHERE a.student_id = s.id AND a.status = 'reconciled')
           FROM students s
           JOIN programs p ON p.id = s.program_id
          WHERE s.is_active = 1
            AND (?1 IS NULL OR s.program_id = ?1)
            AND (?2 IS NULL OR LOWER(s.full_name) LIKE ?2 OR LOWER(s.index_number) LIKE ?2)",
    )?;
    let mut rows = stmt
        .query_map((query.program_id, pattern.as_deref()), |r| {
            let reconciled: i64 = r.get(6)?;
            let total_score: i64 = r.get(7)?;
            let max_score: i64 = r.get(8)?;
            let pct = round_2(percentage(total_score, max_score));
            Ok(GradeRow {
                student_id: r.get(0)?,
                index_number: r.get(1)?,
                full_name: r.get(2)?,
                program_name: r.get(3)?,
                level: r.get(4)?,
                total_score,
                max_score,
                percentage: pct,
                grade: if reconciled == 0 { NO_GRADE } else { grade_band(pct) },
                procedures_total: r.get(5)?,
                procedures_reconciled: reconciled,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.sort_by(|a, b| {
        let ord = compare(a, b, query.sort_by);
        match query.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    Ok(rows)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_students: i64,
    pub active_students: i64,
    pub total_examiners: i64,
    pub total_procedures: i64,
    pub total_programs: i64,
    pub pending_assessments: i64,
    pub scored_assessments: i64,
    pub reconciled_assessments: i64,
}

pub fn dashboard_stats(conn: &Connection) -> ExamResult<DashboardStats> {
    let count = |sql: &str| -> rusqlite::Result<i64> { conn.query_row(sql, [], |r| r.get(0)) };
    let mut stats = DashboardStats {
        total_students: count("SELECT COUNT(*) FROM students")?,
        active_students: count("SELECT COUNT(*) FROM students WHERE is_active = 1")?,
        total_examiners: count(
            "SELECT COUNT(*) FROM examiners WHERE role = 'examiner' AND is_active = 1",
        )?,
        total_procedures: count("SELECT COUNT(*) FROM procedures")?,
        total_programs: count("SELECT COUNT(*) FROM programs")?,
        ..DashboardStats::default()
    };

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM assessments GROUP BY status")?;
    let per_status = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (status, n) in per_status {
        match status.as_str() {
            "pending" => stats.pending_assessments = n,
            "scored" => stats.scored_assessments = n,
            "reconciled" => stats.reconciled_assessments = n,
            _ => {}
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    // Two students in General Nursing. Esi has one reconciled procedure
    // (10 of 12), Yaw has nothing reconciled yet.
    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO examiners(id, full_name) VALUES('ex-a', 'Ama Mensah'), ('ex-b', 'Kofi Boateng');
             INSERT INTO examiners(id, full_name, is_active) VALUES('ex-c', 'Retired Examiner', 0);
             INSERT INTO programs(id, name, abbreviation) VALUES('gn', 'General Nursing', 'GN'), ('mw', 'Midwifery', 'MW');
             INSERT INTO students(id, index_number, full_name, program_id) VALUES
               ('esi', 'GN002', 'Esi Owusu', 'gn'),
               ('yaw', 'GN001', 'Yaw Asante', 'gn'),
               ('abena', 'MW001', 'Abena Darko', 'mw');
             INSERT INTO students(id, index_number, full_name, program_id, is_active)
               VALUES('gone', 'GN003', 'Withdrawn Student', 'gn', 0);
             INSERT INTO procedures(id, program_id, name, total_score) VALUES
               ('cath', 'gn', 'Catheterisation', 12), ('wound', 'gn', 'Wound Dressing', 8);
             INSERT INTO procedure_steps(id, procedure_id, description, step_order) VALUES
               ('s1', 'cath', 'Explain', 1), ('s2', 'cath', 'Setup', 2), ('s3', 'cath', 'Insert', 3);
             INSERT INTO assessments(id, student_id, procedure_id, examiner_a, examiner_b, status, assessed_at)
               VALUES('a1', 'esi', 'cath', 'ex-a', 'ex-b', 'reconciled', '2026-01-01T00:00:00Z'),
                     ('a2', 'yaw', 'cath', 'ex-a', NULL, 'pending', '2026-01-01T00:00:00Z');
             INSERT INTO reconciled_scores(id, assessment_id, step_id, score, reconciled_by, reconciled_at)
               VALUES('r1', 'a1', 's1', 4, 'ex-b', '2026-01-02T00:00:00Z'),
                     ('r2', 'a1', 's2', 3, 'ex-b', '2026-01-02T00:00:00Z'),
                     ('r3', 'a1', 's3', 3, 'ex-b', '2026-01-02T00:00:00Z');",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn grades_cover_active_students_with_bands() {
        let conn = seeded();
        let rows = list_grades(
            &conn,
            &GradeQuery {
                program_id: Some("gn"),
                ..GradeQuery::default()
            },
        )
        .expect("grades");
        let ids: Vec<_> = rows.iter().map(|r| r.index_number.as_str()).collect();
        assert_eq!(ids, vec!["GN001", "GN002"]);

        let esi = &rows[1];
        assert_eq!(esi.total_score, 10);
        assert_eq!(esi.max_score, 12);
        assert_eq!(esi.percentage, 83.33);
        assert_eq!(esi.grade, "Distinction");
        assert_eq!(esi.procedures_total, 2);
        assert_eq!(esi.procedures_reconciled, 1);

        let yaw = &rows[0];
        assert_eq!(yaw.grade, NO_GRADE);
        assert_eq!(yaw.percentage, 0.0);
    }

    #[test]
    fn search_and_sort() {
        let conn = seeded();
        let rows = list_grades(
            &conn,
            &GradeQuery {
                search: Some("owu"),
                ..GradeQuery::default()
            },
        )
        .expect("search");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, "Esi Owusu");

        let rows = list_grades(
            &conn,
            &GradeQuery {
                sort_by: SortKey::Percentage,
                order: SortOrder::Desc,
                ..GradeQuery::default()
            },
        )
        .expect("sorted");
        assert_eq!(rows[0].student_id, "esi");
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn sort_params_parse() {
        assert_eq!("fullName".parse::<SortKey>().expect("key"), SortKey::FullName);
        assert_eq!("DESC".parse::<SortOrder>().expect("order"), SortOrder::Desc);
        assert_eq!("age".parse::<SortKey>().unwrap_err().code(), "bad_params");
    }

    #[test]
    fn dashboard_counts() {
        let conn = seeded();
        let stats = dashboard_stats(&conn).expect("stats");
        assert_eq!(stats.total_students, 4);
        assert_eq!(stats.active_students, 3);
        assert_eq!(stats.total_examiners, 2);
        assert_eq!(stats.total_procedures, 2);
        assert_eq!(stats.total_programs, 2);
        assert_eq!(stats.pending_assessments, 1);
        assert_eq!(stats.scored_assessments, 0);
        assert_eq!(stats.reconciled_assessments, 1);
    }
}
