use crate::calc;
use crate::grading;
use crate::ipc::helpers::{db_err, optional_form_level, required_str, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};

/// Accepts integers, integral floats and numeric strings. `None` means the
/// entry is blank and should be skipped.
fn parse_mark(subject: &str, v: &Value) -> Result<Option<i64>, HandlerErr> {
    let bad = || {
        HandlerErr::bad_params(format!("mark for {} must be a whole number", subject))
            .with_details(json!({ "subject": subject, "value": v }))
    };
    let mark = match v {
        Value::Null => return Ok(None),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => f as i64,
                _ => return Err(bad()),
            },
        },
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            match t.parse::<i64>() {
                Ok(i) => i,
                Err(_) => match t.parse::<f64>() {
                    Ok(f) if f.is_finite() && f.fract() == 0.0 => f as i64,
                    _ => return Err(bad()),
                },
            }
        }
        _ => return Err(bad()),
    };
    grading::validate_mark(mark).map(Some).map_err(|msg| {
        HandlerErr::bad_params(msg).with_details(json!({ "subject": subject }))
    })
}

fn parse_marks(raw: &Map<String, Value>) -> Result<Vec<(String, i64)>, HandlerErr> {
    let mut out = Vec::with_capacity(raw.len());
    for (subject, v) in raw {
        let subject = subject.trim();
        if !grading::is_standard_subject(subject) {
            return Err(HandlerErr::bad_params(format!("unknown subject: {}", subject))
                .with_details(json!({ "subject": subject })));
        }
        if let Some(mark) = parse_mark(subject, v)? {
            out.push((subject.to_string(), mark));
        }
    }
    Ok(out)
}

fn marks_save(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let term = required_str(params, "term")?;
    let academic_year = required_str(params, "academicYear")?;
    let raw = params
        .get("marks")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("marks must be an object of subject -> mark"))?;
    let marks = parse_marks(raw)?;

    let student = calc::require_student(conn, &student_id)?;
    let form_level = optional_form_level(params)?.unwrap_or(student.form_level);
    let recorded_at = chrono::Local::now().to_rfc3339();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for (subject, mark) in &marks {
        let grade = grading::grade_for(*mark, form_level).to_string();
        let res = tx.execute(
            "INSERT INTO student_marks(id, student_id, subject, mark, grade, term,
                academic_year, form_level, school_id, recorded_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject, term, academic_year) DO UPDATE SET
               mark = excluded.mark,
               grade = excluded.grade,
               form_level = excluded.form_level,
               recorded_at = excluded.recorded_at",
            rusqlite::params![
                uuid::Uuid::new_v4().to_string(),
                student_id,
                subject,
                mark,
                grade,
                term,
                academic_year,
                form_level,
                student.school_id,
                recorded_at,
            ],
        );
        if let Err(e) = res {
            let _ = tx.rollback();
            return Err(db_err("db_insert_failed", "student_marks", e));
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tracing::info!(%student_id, %term, %academic_year, saved = marks.len(), "marks saved");
    Ok(json!({ "saved": marks.len() }))
}

/// Marks for one term. `grade` is graded on the student's current form, the
/// same scale report cards use; `recordedGrade` is what was stored at save time
/// under the form level given then.
fn marks_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let term = required_str(params, "term")?;
    let academic_year = required_str(params, "academicYear")?;
    let student = calc::require_student(conn, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT subject, mark, grade, form_level, recorded_at FROM student_marks
             WHERE student_id = ? AND term = ? AND academic_year = ?",
        )
        .map_err(|e| db_err("db_query_failed", "student_marks", e))?;
    let rows = stmt
        .query_map((&student_id, &term, &academic_year), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, String>(4)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err("db_query_failed", "student_marks", e))?;

    let mut marks = Map::new();
    for (subject, mark, stored, recorded_form, recorded_at) in rows {
        let recorded_grade = grading::Grade::parse(&stored);
        if recorded_grade.is_none() {
            tracing::warn!(%student_id, %subject, grade = %stored, "unreadable stored grade");
        }
        marks.insert(
            subject,
            json!({
                "mark": mark,
                "grade": grading::grade_for(mark, student.form_level),
                "recordedGrade": recorded_grade,
                "recordedFormLevel": recorded_form,
                "recordedAt": recorded_at,
            }),
        );
    }
    Ok(json!({ "formLevel": student.form_level, "marks": marks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.save" => Some(with_conn(state, req, marks_save)),
        "marks.get" => Some(with_conn(state, req, marks_get)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_entries_are_skipped() {
        let raw = json!({ "English": "", "Biology": null, "Physics": " 64 " });
        let parsed = parse_marks(raw.as_object().expect("object")).expect("parse");
        assert_eq!(parsed, vec![("Physics".to_string(), 64)]);
    }

    #[test]
    fn out_of_range_and_fractional_marks_are_rejected() {
        for bad in [json!({ "English": 101 }), json!({ "English": -1 }), json!({ "English": "55.5" })] {
            let e = parse_marks(bad.as_object().expect("object")).expect_err("reject");
            assert_eq!(e.code, "bad_params");
        }
        let e = parse_marks(json!({ "Latin": 70 }).as_object().expect("object")).expect_err("reject");
        assert_eq!(e.code, "bad_params");
    }
}
