use crate::calc::{CalcError, TermFilter};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;

pub const MAX_TOP_N: usize = 100;

#[derive(Debug)]
pub struct HandlerErr {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> Value {
        err(id, &self.code, self.message, self.details)
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        Self {
            code: e.code,
            message: e.message,
            details: e.details,
        }
    }
}

pub fn db_err(code: &str, table: &str, e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new(code, e.to_string()).with_details(json!({ "table": table }))
}

/// Runs `f` against the open workspace and turns its outcome into a response.
pub fn with_conn<F>(state: &AppState, req: &Request, f: F) -> Value
where
    F: FnOnce(&Connection, &Value) -> Result<Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, f(conn, &req.params))
}

pub fn respond(req: &Request, result: Result<Value, HandlerErr>) -> Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::debug!(method = %req.method, code = %e.code, message = %e.message, "request failed");
            e.response(&req.id)
        }
    }
}

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let t = s.trim();
            Ok(if t.is_empty() { None } else { Some(t.to_string()) })
        }
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be string", key))),
    }
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be boolean", key))),
    }
}

fn parse_form_level(v: &Value) -> Result<i64, HandlerErr> {
    let n = v
        .as_i64()
        .ok_or_else(|| HandlerErr::bad_params("formLevel must be an integer"))?;
    if !(1..=4).contains(&n) {
        return Err(HandlerErr::bad_params("formLevel must be in 1..=4")
            .with_details(json!({ "formLevel": n })));
    }
    Ok(n)
}

pub fn required_form_level(params: &Value) -> Result<i64, HandlerErr> {
    let v = params
        .get("formLevel")
        .ok_or_else(|| HandlerErr::bad_params("missing formLevel"))?;
    parse_form_level(v)
}

pub fn optional_form_level(params: &Value) -> Result<Option<i64>, HandlerErr> {
    match params.get("formLevel") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_form_level(v).map(Some),
    }
}

pub fn top_n(params: &Value, default: usize) -> Result<usize, HandlerErr> {
    match params.get("topN") {
        None | Some(Value::Null) => Ok(default),
        Some(v) => {
            let n = v
                .as_u64()
                .ok_or_else(|| HandlerErr::bad_params("topN must be a positive integer"))?
                as usize;
            if n == 0 || n > MAX_TOP_N {
                return Err(HandlerErr::bad_params(format!(
                    "topN must be in 1..={}",
                    MAX_TOP_N
                )));
            }
            Ok(n)
        }
    }
}

pub fn school_id(params: &Value) -> Result<Option<String>, HandlerErr> {
    optional_str(params, "schoolId")
}

pub fn term_filter(params: &Value, form_level: Option<i64>) -> Result<TermFilter, HandlerErr> {
    Ok(TermFilter {
        term: required_str(params, "term")?,
        academic_year: required_str(params, "academicYear")?,
        form_level,
        school_id: school_id(params)?,
    })
}

/// `outDir` when given, else the configured export directory.
pub fn export_dir(state: &AppState, params: &Value) -> Result<PathBuf, HandlerErr> {
    if let Some(dir) = optional_str(params, "outDir")? {
        return Ok(PathBuf::from(dir));
    }
    let Some(workspace) = state.workspace.as_ref() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    Ok(state.config.export_dir_for(workspace))
}

pub fn export_failed(e: anyhow::Error) -> HandlerErr {
    HandlerErr::new("export_failed", format!("{e:#}"))
}
