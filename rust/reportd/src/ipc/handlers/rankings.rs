use crate::calc::{self, Category, Cohort, TermFilter};
use crate::export;
use crate::grading;
use crate::ipc::helpers::{
    export_dir, export_failed, optional_form_level, required_form_level, required_str, respond,
    term_filter, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

fn rankings_compute(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = term_filter(params, Some(required_form_level(params)?))?;
    let cohort = Cohort::load(conn, &filter)?;
    let rows = cohort.ranking();
    Ok(json!({
        "formLevel": filter.form_level,
        "term": filter.term,
        "academicYear": filter.academic_year,
        "totalStudents": rows.len(),
        "rankings": rows,
    }))
}

fn rankings_top_performers(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let raw = required_str(params, "category")?;
    let category = Category::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("category must be one of: overall, sciences, humanities, languages")
            .with_details(json!({ "category": raw }))
    })?;
    let filter = term_filter(params, Some(required_form_level(params)?))?;
    let cohort = Cohort::load(conn, &filter)?;
    let top = calc::top_performers(&cohort, category);
    Ok(json!({
        "category": raw.to_ascii_lowercase(),
        "formLevel": filter.form_level,
        "count": top.len(),
        "students": top,
    }))
}

/// Form and school default to the student's own when not given.
fn student_cohort_filter(
    params: &Value,
    student: &calc::StudentRecord,
) -> Result<TermFilter, HandlerErr> {
    let form_level = optional_form_level(params)?.unwrap_or(student.form_level);
    let mut filter = term_filter(params, Some(form_level))?;
    if filter.school_id.is_none() {
        filter.school_id = student.school_id.clone();
    }
    Ok(filter)
}

fn rankings_position(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = calc::require_student(conn, &student_id)?;
    let filter = student_cohort_filter(params, &student)?;
    let cohort = Cohort::load(conn, &filter)?;
    let marks = calc::load_student_marks(conn, &student_id, &filter.term, &filter.academic_year)?;
    let form_level = filter.form_level.unwrap_or(student.form_level);
    let position = calc::student_position(&cohort, &student_id, form_level, &marks);
    Ok(json!(position))
}

fn rankings_subject_position(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let subject = required_str(params, "subject")?;
    if !grading::is_standard_subject(&subject) {
        return Err(HandlerErr::bad_params(format!("unknown subject: {}", subject)));
    }
    let student = calc::require_student(conn, &student_id)?;
    let filter = student_cohort_filter(params, &student)?;
    let cohort = Cohort::load(conn, &filter)?;
    Ok(json!(cohort.subject_position(&student_id, &subject)))
}

fn rankings_export(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_dir = export_dir(state, params)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let filter = term_filter(params, Some(required_form_level(params)?))?;
    let cohort = Cohort::load(conn, &filter)?;
    if cohort.is_empty() {
        return Err(HandlerErr::new(
            "no_data",
            "no marks recorded for this form and term",
        ));
    }
    let rows = cohort.ranking();
    let written = export::write_rankings_csv(&rows, &filter, &out_dir).map_err(export_failed)?;
    tracing::info!(
        path = %written.rankings_path.display(),
        rows = written.rows,
        "rankings exported"
    );
    Ok(json!({
        "rankingsPath": written.rankings_path.to_string_lossy(),
        "summaryPath": written.summary_path.to_string_lossy(),
        "rows": written.rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rankings.compute" => Some(with_conn(state, req, rankings_compute)),
        "rankings.topPerformers" => Some(with_conn(state, req, rankings_top_performers)),
        "rankings.position" => Some(with_conn(state, req, rankings_position)),
        "rankings.subjectPosition" => Some(with_conn(state, req, rankings_subject_position)),
        "rankings.export" => Some(respond(req, rankings_export(state, &req.params))),
        _ => None,
    }
}
