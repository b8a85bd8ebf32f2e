use crate::calc::TeacherBook;
use crate::db;
use crate::grading::{self, STANDARD_SUBJECTS};
use crate::ipc::helpers::{
    optional_form_level, required_form_level, required_str, school_id, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

const MAX_TEACHER_NAME_LEN: usize = 100;

fn form_map(book: &TeacherBook, form_level: i64) -> Map<String, Value> {
    STANDARD_SUBJECTS
        .iter()
        .map(|s| (s.to_string(), Value::String(book.name_for(s, form_level))))
        .collect()
}

/// With `formLevel`, `teachers` maps subject to name. Without it, `forms`
/// holds the same map for every form.
fn teachers_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let form_level = optional_form_level(params)?;
    let school = school_id(params)?;
    let book = TeacherBook::load(conn, school.as_deref())?;
    match form_level {
        Some(form) => Ok(json!({ "formLevel": form, "teachers": form_map(&book, form) })),
        None => {
            let forms: Map<String, Value> = (1..=4)
                .map(|form| (form.to_string(), Value::Object(form_map(&book, form))))
                .collect();
            Ok(json!({ "forms": forms }))
        }
    }
}

fn teachers_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = required_str(params, "subject")?;
    if !grading::is_standard_subject(&subject) {
        return Err(HandlerErr::bad_params(format!("unknown subject: {}", subject)));
    }
    let form_level = required_form_level(params)?;
    let teacher_name = required_str(params, "teacherName")?;
    if teacher_name.chars().count() > MAX_TEACHER_NAME_LEN {
        return Err(HandlerErr::bad_params(format!(
            "teacherName length must be <= {}",
            MAX_TEACHER_NAME_LEN
        )));
    }
    let school = school_id(params)?;

    conn.execute(
        "INSERT INTO subject_teachers(school_key, subject, form_level, teacher_name, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(school_key, subject, form_level) DO UPDATE SET
           teacher_name = excluded.teacher_name,
           updated_at = excluded.updated_at",
        (
            db::school_key(school.as_deref()),
            &subject,
            form_level,
            &teacher_name,
            chrono::Local::now().to_rfc3339(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_update_failed", e.to_string())
            .with_details(json!({ "table": "subject_teachers" }))
    })?;

    tracing::info!(%subject, form_level, %teacher_name, "subject teacher updated");
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(with_conn(state, req, teachers_list)),
        "teachers.update" => Some(with_conn(state, req, teachers_update)),
        _ => None,
    }
}
