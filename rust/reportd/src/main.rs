mod backup;
mod calc;
mod config;
mod db;
mod export;
mod grading;
mod ipc;
mod performance;
mod report;
mod settings;
mod telemetry;

use std::io::{self, BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

fn dispatch(state: &mut ipc::AppState, req: ipc::Request) -> serde_json::Value {
    let id = req.id.clone();
    let method = req.method.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| ipc::handle_request(state, req))) {
        Ok(resp) => resp,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            tracing::error!(%method, %message, "handler panicked");
            ipc::err(
                &id,
                "internal_error",
                message,
                Some(serde_json::json!({ "method": method })),
            )
        }
    }
}

fn main() {
    let config = config::Config::from_env();
    if let Err(e) = telemetry::init(&config.log_filter) {
        eprintln!("reportd: {e:#}");
    }

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.clone() {
        if let Err(e) = ipc::select_workspace(&mut state, &path) {
            tracing::warn!(workspace = %path.display(), error = %format!("{e:#}"), "could not open configured workspace");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "reportd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => dispatch(&mut state, req),
            Err(e) => serde_json::json!({
                "id": null,
                "ok": false,
                "error": { "code": "bad_json", "message": e.to_string() },
            }),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
