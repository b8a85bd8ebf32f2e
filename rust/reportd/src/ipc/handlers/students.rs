use crate::calc::{self, StudentRecord};
use crate::ipc::helpers::{
    db_err, optional_bool, optional_form_level, optional_str, required_form_level, required_str,
    school_id, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Withdrawn,
}

impl Status {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Status::Active),
            "withdrawn" => Some(Status::Withdrawn),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Status::Active => "Active",
            Status::Withdrawn => "Withdrawn",
        }
    }
}

fn name_field(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = required_str(params, key)?;
    if s.chars().count() > MAX_NAME_LEN {
        return Err(HandlerErr::bad_params(format!(
            "{} length must be <= {}",
            key, MAX_NAME_LEN
        )));
    }
    Ok(s)
}

/// Zero-padded serial, one past the highest number in use.
fn next_student_number(conn: &Connection) -> Result<String, HandlerErr> {
    let max: Option<i64> = conn
        .query_row(
            "SELECT MAX(CAST(student_number AS INTEGER)) FROM students",
            [],
            |r| r.get(0),
        )
        .map_err(|e| db_err("db_query_failed", "students", e))?;
    Ok(format!("{:04}", max.unwrap_or(0) + 1))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let first_name = name_field(params, "firstName")?;
    let last_name = name_field(params, "lastName")?;
    let form_level = required_form_level(params)?;
    let date_of_birth = optional_str(params, "dateOfBirth")?;
    let email = optional_str(params, "email")?;
    let phone = optional_str(params, "phone")?;
    let address = optional_str(params, "address")?;
    let guardian_name = optional_str(params, "guardianName")?;
    let guardian_phone = optional_str(params, "guardianPhone")?;
    let guardian_email = optional_str(params, "guardianEmail")?;
    let school = school_id(params)?;

    let student_id = uuid::Uuid::new_v4().to_string();
    let student_number = next_student_number(conn)?;
    conn.execute(
        "INSERT INTO students(id, student_number, first_name, last_name, date_of_birth,
            grade_level, email, phone, address, guardian_name, guardian_phone, guardian_email,
            status, school_id, enrolled_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'Active', ?, ?)",
        rusqlite::params![
            student_id,
            student_number,
            first_name,
            last_name,
            date_of_birth,
            form_level,
            email,
            phone,
            address,
            guardian_name,
            guardian_phone,
            guardian_email,
            school,
            chrono::Local::now().to_rfc3339(),
        ],
    )
    .map_err(|e| db_err("db_insert_failed", "students", e))?;

    tracing::info!(%student_id, %student_number, form_level, "student created");
    Ok(json!({ "studentId": student_id, "studentNumber": student_number }))
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let form_level = optional_form_level(params)?;
    let school = school_id(params)?;
    let include_withdrawn = optional_bool(params, "includeWithdrawn")?.unwrap_or(false);

    let sql = format!(
        "SELECT {} FROM students
         WHERE (?1 IS NULL OR grade_level = ?1)
           AND (?2 IS NULL OR school_id = ?2)
           AND (?3 = 1 OR status = 'Active')
         ORDER BY first_name, last_name",
        calc::STUDENT_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "students", e))?;
    let students: Vec<StudentRecord> = stmt
        .query_map(
            (form_level, school.as_deref(), include_withdrawn as i64),
            calc::student_from_row,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "students", e))?;
    Ok(json!({ "students": students }))
}

fn students_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = calc::require_student(conn, &student_id)?;
    Ok(json!({ "student": student }))
}

fn not_found(student_id: &str) -> HandlerErr {
    HandlerErr::new("not_found", "student not found").with_details(json!({ "studentId": student_id }))
}

fn students_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let first_name = name_field(params, "firstName")?;
    let last_name = name_field(params, "lastName")?;
    let changed = conn
        .execute(
            "UPDATE students SET first_name = ?, last_name = ?, updated_at = ? WHERE id = ?",
            (
                &first_name,
                &last_name,
                chrono::Local::now().to_rfc3339(),
                &student_id,
            ),
        )
        .map_err(|e| db_err("db_update_failed", "students", e))?;
    if changed == 0 {
        return Err(not_found(&student_id));
    }
    tracing::info!(%student_id, "student renamed");
    Ok(json!({ "ok": true }))
}

fn students_set_status(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let raw = required_str(params, "status")?;
    let status = Status::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("status must be one of: Active, Withdrawn")
            .with_details(json!({ "status": raw }))
    })?;
    let changed = conn
        .execute(
            "UPDATE students SET status = ?, updated_at = ? WHERE id = ?",
            (status.as_str(), chrono::Local::now().to_rfc3339(), &student_id),
        )
        .map_err(|e| db_err("db_update_failed", "students", e))?;
    if changed == 0 {
        return Err(not_found(&student_id));
    }
    tracing::info!(%student_id, status = status.as_str(), "student status changed");
    Ok(json!({ "ok": true, "status": status.as_str() }))
}

/// Removes the student's marks and the student as one unit.
fn students_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| db_err("db_query_failed", "students", e))?
        .is_some();
    if !exists {
        return Err(not_found(&student_id));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let marks_deleted = match tx.execute("DELETE FROM student_marks WHERE student_id = ?", [&student_id]) {
        Ok(n) => n,
        Err(e) => {
            let _ = tx.rollback();
            return Err(db_err("db_delete_failed", "student_marks", e));
        }
    };
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return Err(db_err("db_delete_failed", "students", e));
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tracing::info!(%student_id, marks_deleted, "student deleted");
    Ok(json!({ "ok": true, "marksDeleted": marks_deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.get" => Some(with_conn(state, req, students_get)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.setStatus" => Some(with_conn(state, req, students_set_status)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        _ => None,
    }
}
