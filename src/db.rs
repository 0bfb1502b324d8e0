use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "nursexam.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS examiners(
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'examiner',
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS programs(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            abbreviation TEXT UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            index_number TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            program_id TEXT NOT NULL,
            level TEXT NOT NULL DEFAULT '100',
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(program_id) REFERENCES programs(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_program ON students(program_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS procedures(
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            name TEXT NOT NULL,
            total_score INTEGER NOT NULL CHECK(total_score > 0),
            FOREIGN KEY(program_id) REFERENCES programs(id),
            UNIQUE(program_id, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS procedure_steps(
            id TEXT PRIMARY KEY,
            procedure_id TEXT NOT NULL,
            description TEXT NOT NULL,
            step_order INTEGER NOT NULL,
            FOREIGN KEY(procedure_id) REFERENCES procedures(id),
            UNIQUE(procedure_id, step_order)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_procedure_steps_procedure ON procedure_steps(procedure_id)",
        [],
    )?;

    // examiner_b without examiner_a, or the same person twice, is not a valid slot state.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            procedure_id TEXT NOT NULL,
            examiner_a TEXT,
            examiner_b TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            assessed_at TEXT NOT NULL,
            assigned_reconciler TEXT,
            reconciled_by TEXT,
            reconciled_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(procedure_id) REFERENCES procedures(id),
            FOREIGN KEY(examiner_a) REFERENCES examiners(id),
            FOREIGN KEY(examiner_b) REFERENCES examiners(id),
            FOREIGN KEY(assigned_reconciler) REFERENCES examiners(id),
            FOREIGN KEY(reconciled_by) REFERENCES examiners(id),
            CHECK(examiner_b IS NULL OR (examiner_a IS NOT NULL AND examiner_a <> examiner_b)),
            CHECK(status IN ('pending', 'scored', 'reconciled')),
            UNIQUE(student_id, procedure_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_student ON assessments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_status ON assessments(status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS step_scores(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            step_id TEXT NOT NULL,
            examiner_id TEXT NOT NULL,
            score INTEGER NOT NULL CHECK(score BETWEEN 0 AND 4),
            is_reconciled INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            FOREIGN KEY(step_id) REFERENCES procedure_steps(id),
            FOREIGN KEY(examiner_id) REFERENCES examiners(id),
            UNIQUE(assessment_id, step_id, examiner_id, is_reconciled)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_step_scores_assessment ON step_scores(assessment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reconciled_scores(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            step_id TEXT NOT NULL,
            score INTEGER NOT NULL CHECK(score BETWEEN 0 AND 4),
            reconciled_by TEXT NOT NULL,
            reconciled_at TEXT NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            FOREIGN KEY(step_id) REFERENCES procedure_steps(id),
            FOREIGN KEY(reconciled_by) REFERENCES examiners(id),
            UNIQUE(assessment_id, step_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reconciled_scores_assessment
         ON reconciled_scores(assessment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS care_plans(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            program_id TEXT NOT NULL,
            examiner_id TEXT NOT NULL,
            score INTEGER NOT NULL CHECK(score BETWEEN 0 AND 20),
            max_score INTEGER NOT NULL DEFAULT 20,
            comments TEXT,
            assessed_at TEXT NOT NULL,
            is_locked INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(program_id) REFERENCES programs(id),
            FOREIGN KEY(examiner_id) REFERENCES examiners(id),
            UNIQUE(student_id, program_id)
        )",
        [],
    )?;

    Ok(())
}
