use crate::calc::{Cohort, TeacherBook};
use crate::grading::{self, Department};
use crate::ipc::helpers::{
    optional_form_level, required_form_level, required_str, school_id, term_filter, top_n,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::performance::{self, DEFAULT_TOP_N};
use crate::settings;
use rusqlite::Connection;
use serde_json::{json, Value};

fn school_name(conn: &Connection, params: &Value) -> Result<String, HandlerErr> {
    let school = school_id(params)?;
    let current = settings::load(conn, school.as_deref()).map_err(|e| {
        HandlerErr::new("db_query_failed", format!("{e:#}"))
            .with_details(json!({ "table": "school_settings" }))
    })?;
    Ok(current.school_name_display().to_string())
}

fn performance_by_class(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let form_level = required_form_level(params)?;
    let filter = term_filter(params, Some(form_level))?;
    let n = top_n(params, DEFAULT_TOP_N)?;
    let cohort = Cohort::load(conn, &filter)?;
    let report = performance::by_class(&cohort, form_level, n, &school_name(conn, params)?);
    Ok(json!(report))
}

fn performance_by_subject(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let subject = required_str(params, "subject")?;
    if !grading::is_standard_subject(&subject) {
        return Err(HandlerErr::bad_params(format!("unknown subject: {}", subject)));
    }
    let filter = term_filter(params, optional_form_level(params)?)?;
    let n = top_n(params, DEFAULT_TOP_N)?;
    let cohort = Cohort::load(conn, &filter)?;
    let teachers = TeacherBook::load(conn, filter.school_id.as_deref())?;
    let report =
        performance::by_subject(&cohort, &subject, n, &teachers, &school_name(conn, params)?);
    Ok(json!(report))
}

fn performance_by_department(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let raw = required_str(params, "department")?;
    let department = Department::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("department must be one of: Sciences, Humanities, Languages")
            .with_details(json!({ "department": raw }))
    })?;
    let filter = term_filter(params, optional_form_level(params)?)?;
    let n = top_n(params, DEFAULT_TOP_N)?;
    let cohort = Cohort::load(conn, &filter)?;
    let report = performance::by_department(&cohort, department, n, &school_name(conn, params)?);
    Ok(json!(report))
}

fn performance_comprehensive(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let filter = term_filter(params, None)?;
    let cohort = Cohort::load(conn, &filter)?;
    let teachers = TeacherBook::load(conn, filter.school_id.as_deref())?;
    let report = performance::comprehensive(&cohort, &teachers, &school_name(conn, params)?);
    Ok(json!(report))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "performance.byClass" => Some(with_conn(state, req, performance_by_class)),
        "performance.bySubject" => Some(with_conn(state, req, performance_by_subject)),
        "performance.byDepartment" => Some(with_conn(state, req, performance_by_department)),
        "performance.comprehensive" => Some(with_conn(state, req, performance_comprehensive)),
        _ => None,
    }
}
