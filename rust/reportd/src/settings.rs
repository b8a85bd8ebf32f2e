use crate::db;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const MAX_FIELD_LEN: usize = 200;
const MAX_LIST_LEN: usize = 50;

/// School-wide report card settings. Loaded per operation and passed down
/// explicitly; there is no process-wide copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchoolSettings {
    pub school_name: String,
    pub school_address: String,
    pub school_phone: String,
    pub school_email: String,
    pub pta_fund: String,
    pub sdf_fund: String,
    pub boarding_fee: String,
    pub next_term_begins: String,
    pub boys_uniform: String,
    pub girls_uniform: String,
    pub terms: Vec<String>,
    pub academic_years: Vec<String>,
}

impl Default for SchoolSettings {
    fn default() -> Self {
        Self {
            school_name: "DEMO SECONDARY SCHOOL".to_string(),
            school_address: "P.O. Box 123, Lilongwe, Malawi".to_string(),
            school_phone: "+265 1 234 5678".to_string(),
            school_email: "demo@school.edu.mw".to_string(),
            pta_fund: "MK 50,000".to_string(),
            sdf_fund: "MK 30,000".to_string(),
            boarding_fee: "MK 150,000".to_string(),
            next_term_begins: "To be announced".to_string(),
            boys_uniform: "White shirt, black trousers, black shoes".to_string(),
            girls_uniform: "White blouse, black skirt, black shoes".to_string(),
            terms: vec![
                "Term 1".to_string(),
                "Term 2".to_string(),
                "Term 3".to_string(),
            ],
            academic_years: (2020..2031).map(|y| format!("{}-{}", y, y + 1)).collect(),
        }
    }
}

fn or_fallback<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

impl SchoolSettings {
    pub fn next_term_display(&self) -> &str {
        or_fallback(&self.next_term_begins, "TBA")
    }

    pub fn pta_display(&self) -> &str {
        or_fallback(&self.pta_fund, "MK 50,000")
    }

    pub fn sdf_display(&self) -> &str {
        or_fallback(&self.sdf_fund, "MK 30,000")
    }

    pub fn boarding_display(&self) -> &str {
        or_fallback(&self.boarding_fee, "MK 150,000")
    }

    pub fn boys_uniform_display(&self) -> &str {
        or_fallback(&self.boys_uniform, "White shirt, black trousers, black shoes")
    }

    pub fn girls_uniform_display(&self) -> &str {
        or_fallback(&self.girls_uniform, "White blouse, black skirt, black shoes")
    }

    pub fn school_name_display(&self) -> &str {
        or_fallback(&self.school_name, "[SCHOOL NAME]")
    }

    /// Address split into printable header lines.
    pub fn address_lines(&self) -> Vec<String> {
        self.school_address
            .split(',')
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty())
            .collect()
    }
}

pub fn load(conn: &Connection, school_id: Option<&str>) -> anyhow::Result<SchoolSettings> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT data FROM school_settings WHERE school_key = ?",
            [db::school_key(school_id)],
            |r| r.get(0),
        )
        .optional()
        .context("failed to read school settings")?;
    let Some(raw) = raw else {
        return Ok(SchoolSettings::default());
    };
    serde_json::from_str(&raw).context("stored school settings are not valid JSON")
}

pub fn save(
    conn: &Connection,
    school_id: Option<&str>,
    settings: &SchoolSettings,
) -> anyhow::Result<()> {
    let data = serde_json::to_string(settings).context("failed to serialize settings")?;
    conn.execute(
        "INSERT INTO school_settings(school_key, data, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(school_key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        (
            db::school_key(school_id),
            &data,
            chrono::Local::now().to_rfc3339(),
        ),
    )
    .context("failed to write school settings")?;
    Ok(())
}

fn parse_string_max(v: &Value, key: &str) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > MAX_FIELD_LEN {
        return Err(format!("{} length must be <= {}", key, MAX_FIELD_LEN));
    }
    Ok(s.to_string())
}

fn parse_string_list(v: &Value, key: &str) -> Result<Vec<String>, String> {
    let arr = v
        .as_array()
        .ok_or_else(|| format!("{} must be an array of strings", key))?;
    if arr.is_empty() || arr.len() > MAX_LIST_LEN {
        return Err(format!("{} must contain 1..={} entries", key, MAX_LIST_LEN));
    }
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let s = parse_string_max(item, key)?;
        if s.is_empty() {
            return Err(format!("{} must not contain empty entries", key));
        }
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(out)
}

/// Builds a full settings value from an update payload. The update is
/// wholesale: fields left out take their defaults.
pub fn from_update(raw: &Map<String, Value>) -> Result<SchoolSettings, String> {
    let mut out = SchoolSettings::default();
    for (key, value) in raw {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            "schoolName" => out.school_name = parse_string_max(value, key)?,
            "schoolAddress" => out.school_address = parse_string_max(value, key)?,
            "schoolPhone" => out.school_phone = parse_string_max(value, key)?,
            "schoolEmail" => out.school_email = parse_string_max(value, key)?,
            "ptaFund" => out.pta_fund = parse_string_max(value, key)?,
            "sdfFund" => out.sdf_fund = parse_string_max(value, key)?,
            "boardingFee" => out.boarding_fee = parse_string_max(value, key)?,
            "nextTermBegins" => out.next_term_begins = parse_string_max(value, key)?,
            "boysUniform" => out.boys_uniform = parse_string_max(value, key)?,
            "girlsUniform" => out.girls_uniform = parse_string_max(value, key)?,
            "terms" => out.terms = parse_string_list(value, key)?,
            "academicYears" => out.academic_years = parse_string_list(value, key)?,
            other => return Err(format!("unknown settings field: {}", other)),
        }
    }
    if out.school_name.is_empty() {
        return Err("schoolName must not be empty".to_string());
    }
    Ok(out)
}
