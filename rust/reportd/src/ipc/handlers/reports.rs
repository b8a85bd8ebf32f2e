use crate::calc::{self, Cohort, StudentRecord, TeacherBook, TermFilter};
use crate::export::{self, ExportFormat};
use crate::ipc::helpers::{
    db_err, export_dir, export_failed, optional_str, required_form_level, required_str, respond,
    school_id, term_filter, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ReportCard};
use crate::settings::{self, SchoolSettings};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

fn load_school(
    conn: &Connection,
    school: Option<&str>,
) -> Result<(SchoolSettings, TeacherBook), HandlerErr> {
    let current = settings::load(conn, school).map_err(|e| {
        HandlerErr::new("db_query_failed", format!("{e:#}"))
            .with_details(json!({ "table": "school_settings" }))
    })?;
    let teachers = TeacherBook::load(conn, school)?;
    Ok((current, teachers))
}

/// One student's card; the cohort is the student's own form and school.
fn student_card(conn: &Connection, params: &Value) -> Result<ReportCard, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = calc::require_student(conn, &student_id)?;
    let filter = TermFilter {
        term: required_str(params, "term")?,
        academic_year: required_str(params, "academicYear")?,
        form_level: Some(student.form_level),
        school_id: student.school_id.clone(),
    };
    let marks = calc::load_student_marks(conn, &student_id, &filter.term, &filter.academic_year)?;
    if marks.is_empty() {
        return Err(HandlerErr::new(
            "no_data",
            "no marks recorded for this student in the requested term",
        )
        .with_details(json!({
            "studentId": student_id,
            "term": filter.term,
            "academicYear": filter.academic_year,
        })));
    }
    let cohort = Cohort::load(conn, &filter)?;
    let (school_settings, teachers) = load_school(conn, student.school_id.as_deref())?;
    Ok(report::build_report_card(
        &student,
        &marks,
        &cohort,
        &school_settings,
        &teachers,
    )?)
}

fn reports_student_card(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let card = student_card(conn, params)?;
    Ok(json!({ "report": card }))
}

fn reports_render_text(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let card = student_card(conn, params)?;
    Ok(json!({ "text": report::render_text(&card) }))
}

fn reports_export(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_dir = export_dir(state, params)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let requested = optional_str(params, "format")?.unwrap_or_else(|| "pdf".to_string());
    let format = ExportFormat::parse(&requested).ok_or_else(|| {
        HandlerErr::bad_params("format must be one of: pdf, text")
            .with_details(json!({ "format": requested }))
    })?;
    let card = student_card(conn, params)?;
    let artifact = export::write_report(&card, format, &out_dir).map_err(export_failed)?;
    tracing::info!(
        student_id = %card.student.student_id,
        path = %artifact.path.display(),
        fallback = artifact.fallback,
        "report exported"
    );
    Ok(json!({
        "path": artifact.path.to_string_lossy(),
        "requestedFormat": requested.to_ascii_lowercase(),
        "format": artifact.format,
        "fallback": artifact.fallback,
    }))
}

fn active_students(
    conn: &Connection,
    school: Option<&str>,
) -> Result<HashMap<String, StudentRecord>, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM students
         WHERE status = 'Active' AND (?1 IS NULL OR school_id = ?1)",
        calc::STUDENT_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| db_err("db_query_failed", "students", e))?;
    stmt.query_map([school], calc::student_from_row)
        .and_then(|it| {
            it.map(|r| r.map(|s| (s.id.clone(), s)))
                .collect::<Result<HashMap<_, _>, _>>()
        })
        .map_err(|e| db_err("db_query_failed", "students", e))
}

/// Cards for every active student with marks. Each card is ranked against its
/// own form and school, the same cohort `reports.studentCard` uses.
fn reports_export_all(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_dir = export_dir(state, params)?;
    let Some(conn) = state.db.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let base = term_filter(params, None)?;
    let students = active_students(conn, base.school_id.as_deref())?;
    let mut schools: HashMap<Option<String>, (SchoolSettings, TeacherBook)> = HashMap::new();

    let mut cards = Vec::new();
    let mut by_form = serde_json::Map::new();
    for form_level in 1..=4 {
        let filter = TermFilter {
            form_level: Some(form_level),
            ..base.clone()
        };
        let cohort = Cohort::load(conn, &filter)?;
        let mut ranked_in: HashMap<Option<String>, Cohort> = HashMap::new();
        let mut generated = 0usize;
        for member in cohort.students() {
            let Some(student) = students.get(&member.id) else {
                continue;
            };
            if !ranked_in.contains_key(&student.school_id) {
                let scoped = TermFilter {
                    school_id: student.school_id.clone(),
                    ..filter.clone()
                };
                ranked_in.insert(student.school_id.clone(), Cohort::load(conn, &scoped)?);
            }
            let Some(peers) = ranked_in.get(&student.school_id) else {
                continue;
            };
            if !schools.contains_key(&student.school_id) {
                let loaded = load_school(conn, student.school_id.as_deref())?;
                schools.insert(student.school_id.clone(), loaded);
            }
            let Some((school_settings, teachers)) = schools.get(&student.school_id) else {
                continue;
            };
            cards.push(report::build_report_card(
                student,
                &member.marks,
                peers,
                school_settings,
                teachers,
            )?);
            generated += 1;
        }
        by_form.insert(form_level.to_string(), json!(generated));
    }

    if cards.is_empty() {
        return Err(HandlerErr::new(
            "no_data",
            "no reports generated: no marks recorded for this term",
        ));
    }
    let out_path = out_dir.join(export::bundle_file_name(&base.term, &base.academic_year));
    let count = export::write_report_bundle(&cards, &out_path).map_err(export_failed)?;
    tracing::info!(path = %out_path.display(), reports = count, "report bundle exported");
    Ok(json!({
        "path": out_path.to_string_lossy(),
        "reports": count,
        "byForm": by_form,
    }))
}

fn reports_class_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let form_level = required_form_level(params)?;
    let filter = term_filter(params, Some(form_level))?;
    let school = school_id(params)?;
    let enrolled: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students
             WHERE status = 'Active' AND grade_level = ?1 AND (?2 IS NULL OR school_id = ?2)",
            (form_level, school.as_deref()),
            |r| r.get(0),
        )
        .map_err(|e| db_err("db_query_failed", "students", e))?;
    let cohort = Cohort::load(conn, &filter)?;
    let summary = report::class_summary(&cohort, form_level, enrolled.max(0) as usize);
    Ok(json!({ "summary": summary }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.studentCard" => Some(with_conn(state, req, reports_student_card)),
        "reports.renderText" => Some(with_conn(state, req, reports_render_text)),
        "reports.export" => Some(respond(req, reports_export(state, &req.params))),
        "reports.exportAll" => Some(respond(req, reports_export_all(state, &req.params))),
        "reports.classSummary" => Some(with_conn(state, req, reports_class_summary)),
        _ => None,
    }
}
