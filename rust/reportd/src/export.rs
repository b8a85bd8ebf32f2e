use crate::calc::{RankingRow, TermFilter};
use crate::grading::Verdict;
use crate::report::{self, ReportCard};
use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Text,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(ExportFormat::Pdf),
            "text" | "txt" => Some(ExportFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: &'static str,
    /// Set when the requested format was unavailable and text was written instead.
    pub fallback: bool,
}

/// Keeps ASCII letters, digits, '-' and '.'; everything else becomes '_'.
pub fn safe_file_part(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn report_file_name(card: &ReportCard, extension: &str) -> String {
    format!(
        "Progress_Report_{}_{}_{}_{}.{}",
        safe_file_part(&card.student.student_number),
        safe_file_part(&card.student.name),
        safe_file_part(&card.student.term),
        safe_file_part(&card.student.academic_year),
        extension
    )
}

fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))
}

/// Writes one report card. No PDF backend ships with the sidecar, so a PDF
/// request produces the text artifact and flags the fallback.
pub fn write_report(card: &ReportCard, format: ExportFormat, out_dir: &Path) -> anyhow::Result<Artifact> {
    ensure_dir(out_dir)?;
    let fallback = format == ExportFormat::Pdf;
    if fallback {
        tracing::warn!(
            student_id = %card.student.student_id,
            "pdf backend unavailable; writing text report instead"
        );
    }
    let path = out_dir.join(report_file_name(card, "txt"));
    std::fs::write(&path, report::render_text(card))
        .with_context(|| format!("failed to write report {}", path.to_string_lossy()))?;
    Ok(Artifact {
        path,
        format: "text",
        fallback,
    })
}

/// Bundles text reports into one zip archive. Returns the entry count.
pub fn write_report_bundle(cards: &[ReportCard], out_path: &Path) -> anyhow::Result<usize> {
    if cards.is_empty() {
        return Err(anyhow!("no reports to bundle"));
    }
    if let Some(parent) = out_path.parent() {
        ensure_dir(parent)?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!("failed to create output file {}", out_path.to_string_lossy())
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for card in cards {
        let entry = format!(
            "Form_{}/{}",
            card.student.form_level,
            report_file_name(card, "txt")
        );
        zip.start_file(entry.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", entry))?;
        zip.write_all(report::render_text(card).as_bytes())
            .with_context(|| format!("failed to write entry {}", entry))?;
    }
    zip.finish().context("failed to finalize report archive")?;
    Ok(cards.len())
}

pub fn bundle_file_name(term: &str, academic_year: &str) -> String {
    format!(
        "All_Reports_{}_{}.zip",
        safe_file_part(term),
        safe_file_part(academic_year)
    )
}

#[derive(Debug, Clone)]
pub struct RankingsExport {
    pub rankings_path: PathBuf,
    pub summary_path: PathBuf,
    pub rows: usize,
}

/// Rankings sheet plus a small summary sheet, as two CSV files.
pub fn write_rankings_csv(
    rows: &[RankingRow],
    filter: &TermFilter,
    out_dir: &Path,
) -> anyhow::Result<RankingsExport> {
    ensure_dir(out_dir)?;
    let stem = format!(
        "Form_{}_Rankings_{}_{}",
        filter.form_level.unwrap_or(0),
        safe_file_part(&filter.term),
        safe_file_part(&filter.academic_year).replace('-', "_")
    );
    let rankings_path = out_dir.join(format!("{}.csv", stem));
    let summary_path = out_dir.join(format!("{}_Summary.csv", stem));

    let mut wtr = csv::Writer::from_path(&rankings_path).with_context(|| {
        format!("failed to create {}", rankings_path.to_string_lossy())
    })?;
    for row in rows {
        wtr.serialize(row).context("failed to write ranking row")?;
    }
    wtr.flush().context("failed to flush rankings csv")?;

    let passed = rows.iter().filter(|r| r.verdict == Verdict::Pass).count();
    let average = if rows.is_empty() {
        0.0
    } else {
        rows.iter().map(|r| r.average).sum::<f64>() / rows.len() as f64
    };
    let mut wtr = csv::Writer::from_path(&summary_path).with_context(|| {
        format!("failed to create {}", summary_path.to_string_lossy())
    })?;
    wtr.write_record(["Metric", "Value"])
        .context("failed to write summary header")?;
    for (metric, value) in [
        ("Total Students", rows.len().to_string()),
        ("Students Passed", passed.to_string()),
        ("Students Failed", (rows.len() - passed).to_string()),
        ("Average Mark", format!("{:.2}", average)),
    ] {
        wtr.write_record([metric, value.as_str()])
            .context("failed to write summary row")?;
    }
    wtr.flush().context("failed to flush summary csv")?;

    Ok(RankingsExport {
        rankings_path,
        summary_path,
        rows: rows.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_parts_are_sanitized() {
        assert_eq!(safe_file_part("Term 1"), "Term_1");
        assert_eq!(safe_file_part("Life Skills/SOS"), "Life_Skills_SOS");
        assert_eq!(safe_file_part("2024-2025"), "2024-2025");
    }

    #[test]
    fn export_format_accepts_txt_alias() {
        assert_eq!(ExportFormat::parse("PDF"), Some(ExportFormat::Pdf));
        assert_eq!(ExportFormat::parse("txt"), Some(ExportFormat::Text));
        assert_eq!(ExportFormat::parse("xlsx"), None);
    }
}
