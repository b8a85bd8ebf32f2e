use crate::grading::STANDARD_SUBJECTS;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "reportd.sqlite3";

/// Settings and teacher rows for single-tenant mode are keyed by the empty string.
pub const SINGLE_TENANT_KEY: &str = "";

pub fn school_key(school_id: Option<&str>) -> &str {
    school_id.unwrap_or(SINGLE_TENANT_KEY)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_number TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            date_of_birth TEXT,
            grade_level INTEGER NOT NULL,
            email TEXT,
            phone TEXT,
            address TEXT,
            guardian_name TEXT,
            guardian_phone TEXT,
            guardian_email TEXT,
            status TEXT NOT NULL DEFAULT 'Active',
            school_id TEXT,
            enrolled_at TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    // Workspaces created before name edits were tracked lack updated_at.
    ensure_students_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade ON students(grade_level, status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_school ON students(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            mark INTEGER NOT NULL,
            grade TEXT NOT NULL,
            term TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            form_level INTEGER NOT NULL,
            school_id TEXT,
            recorded_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, subject, term, academic_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON student_marks(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_term ON student_marks(term, academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_teachers(
            school_key TEXT NOT NULL,
            subject TEXT NOT NULL,
            form_level INTEGER NOT NULL,
            teacher_name TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(school_key, subject, form_level)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_settings(
            school_key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    seed_subject_teachers(&conn)?;

    Ok(conn)
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn seed_subject_teachers(conn: &Connection) -> anyhow::Result<()> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subject_teachers WHERE school_key = ?",
        [SINGLE_TENANT_KEY],
        |r| r.get(0),
    )?;
    if existing > 0 {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO subject_teachers(school_key, subject, form_level, teacher_name)
             VALUES(?, ?, ?, ?)",
        )?;
        for form_level in 1..=4i64 {
            for subject in STANDARD_SUBJECTS {
                stmt.execute((
                    SINGLE_TENANT_KEY,
                    subject,
                    form_level,
                    default_teacher_name(subject, form_level),
                ))?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn default_teacher_name(subject: &str, form_level: i64) -> String {
    format!("{} Teacher F{}", subject, form_level)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
