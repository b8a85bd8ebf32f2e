use crate::ipc::helpers::{school_id, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::settings;
use rusqlite::Connection;
use serde_json::{json, Value};

fn settings_failed(code: &str, e: anyhow::Error) -> HandlerErr {
    HandlerErr::new(code, format!("{e:#}")).with_details(json!({ "table": "school_settings" }))
}

fn settings_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school = school_id(params)?;
    let current = settings::load(conn, school.as_deref())
        .map_err(|e| settings_failed("db_query_failed", e))?;
    Ok(json!({ "settings": current }))
}

fn settings_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school = school_id(params)?;
    let raw = params
        .get("settings")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("settings must be an object"))?;
    let next = settings::from_update(raw).map_err(HandlerErr::bad_params)?;
    settings::save(conn, school.as_deref(), &next)
        .map_err(|e| settings_failed("db_update_failed", e))?;
    tracing::info!(school = school.as_deref().unwrap_or("-"), "school settings updated");
    Ok(json!({ "settings": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(with_conn(state, req, settings_get)),
        "settings.update" => Some(with_conn(state, req, settings_update)),
        _ => None,
    }
}
