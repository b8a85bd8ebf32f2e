use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_FILE: &str = "reportd.sqlite3";
const DB_ENTRY: &str = "db/reportd.sqlite3";
pub const BUNDLE_FORMAT: &str = "reportd-workspace-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle missing {}", name))?;
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(buf)
}

/// Zips the workspace database together with a manifest recording its checksum.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let db_bytes =
        std::fs::read(&db_path).with_context(|| format!("failed to read {}", db_path.display()))?;
    let manifest = Manifest {
        format: BUNDLE_FORMAT.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Local::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
    };

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = File::create(out_path)
        .with_context(|| format!("failed to create {}", out_path.display()))?;
    let mut zip = ZipWriter::new(file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let entries: [(&str, Vec<u8>); 2] = [
        (
            MANIFEST_ENTRY,
            serde_json::to_vec_pretty(&manifest).context("failed to serialize manifest")?,
        ),
        (DB_ENTRY, db_bytes),
    ];
    for (name, bytes) in &entries {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write {}", name))?;
    }
    zip.finish().context("failed to finalize bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        entry_count: entries.len(),
        db_sha256: manifest.db_sha256,
    })
}

/// Restores the database from a bundle. Any connection to the workspace
/// database must be closed before calling this.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let file =
        File::open(in_path).with_context(|| format!("failed to open {}", in_path.display()))?;
    let mut archive = ZipArchive::new(file).context("bundle is not a zip archive")?;

    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
        .context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT {
        bail!("unsupported bundle format: {}", manifest.format);
    }
    let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
    let actual = sha256_hex(&db_bytes);
    if actual != manifest.db_sha256 {
        bail!(
            "database checksum mismatch (manifest {}, bundle {})",
            manifest.db_sha256,
            actual
        );
    }

    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("failed to create {}", workspace_path.display()))?;
    let dst = workspace_path.join(DB_FILE);
    let staged = workspace_path.join(format!("{}.importing", DB_FILE));
    std::fs::write(&staged, &db_bytes)
        .with_context(|| format!("failed to stage {}", staged.display()))?;
    if dst.exists() {
        std::fs::remove_file(&dst)
            .with_context(|| format!("failed to remove {}", dst.display()))?;
    }
    std::fs::rename(&staged, &dst)
        .with_context(|| format!("failed to move database into {}", dst.display()))?;

    Ok(ImportSummary {
        bundle_format: manifest.format,
        db_sha256: actual,
    })
}
