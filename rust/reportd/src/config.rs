use std::env;
use std::path::PathBuf;

/// Process configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_filter: non_empty("REPORTD_LOG").unwrap_or_else(|| "info".to_string()),
            workspace: non_empty("REPORTD_WORKSPACE").map(PathBuf::from),
            export_dir: non_empty("REPORTD_EXPORT_DIR").map(PathBuf::from),
        }
    }

    /// Where exported artifacts go when a request names no directory.
    pub fn export_dir_for(&self, workspace: &std::path::Path) -> PathBuf {
        self.export_dir
            .clone()
            .unwrap_or_else(|| workspace.join("exports"))
    }
}
