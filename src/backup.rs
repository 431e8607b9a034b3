use crate::db::DB_FILE;
use anyhow::{anyhow, Context};
use chrono::Utc;
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/results.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "results-workspace-v1";
const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

/// Writes `manifest.json` plus the database into a zip at `out_path`.
/// `counts` is recorded in the manifest for display only.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
    counts: serde_json::Value,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": Utc::now().to_rfc3339(),
        "counts": counts,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
    })
}

/// Replaces the workspace database with the one in `in_path`, which may be a
/// bundle from `export_workspace_bundle` or a bare sqlite file. The caller
/// must have closed its connection to the workspace first.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    let detected = match sniff(in_path)? {
        Sniffed::Zip => {
            extract_bundle_db(in_path, &tmp_dst)?;
            BUNDLE_FORMAT_V1
        }
        Sniffed::Sqlite => {
            std::fs::copy(in_path, &tmp_dst).with_context(|| {
                format!(
                    "failed to copy sqlite backup from {}",
                    in_path.to_string_lossy()
                )
            })?;
            RAW_SQLITE_FORMAT
        }
        Sniffed::Unknown => {
            return Err(anyhow!(
                "not a results bundle or sqlite database: {}",
                in_path.to_string_lossy()
            ))
        }
    };

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move imported database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: detected.to_string(),
    })
}

fn extract_bundle_db(in_path: &Path, tmp_dst: &Path) -> anyhow::Result<()> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut db_out = File::create(tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    let mut db_entry = archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/results.sqlite3")?;
    std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    Ok(())
}

enum Sniffed {
    Zip,
    Sqlite,
    Unknown,
}

fn sniff(path: &Path) -> anyhow::Result<Sniffed> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 16];
    let mut read = 0usize;
    while read < sig.len() {
        let n = f
            .read(&mut sig[read..])
            .context("failed to read file signature")?;
        if n == 0 {
            break;
        }
        read += n;
    }
    if read >= 4 && sig[..4] == ZIP_MAGIC {
        return Ok(Sniffed::Zip);
    }
    if read == sig.len() && &sig == SQLITE_MAGIC {
        return Ok(Sniffed::Sqlite);
    }
    Ok(Sniffed::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn bundle_round_trip_restores_rows() {
        let src = temp_dir("results-backup-src");
        let conn = db::open_db(&src).expect("open src");
        conn.execute(
            "INSERT INTO courses(course_code, course_name, description, credits, semester)
             VALUES('CS101', 'Intro', 'd', 4, 'Fall 2024')",
            [],
        )
        .expect("insert");
        drop(conn);

        let bundle = src.join("out").join("ws.resultsbackup.zip");
        let export =
            export_workspace_bundle(&src, &bundle, json!({ "courses": 1 })).expect("export");
        assert_eq!(export.bundle_format, BUNDLE_FORMAT_V1);

        let dst = temp_dir("results-backup-dst");
        let import = import_workspace_bundle(&bundle, &dst).expect("import");
        assert_eq!(import.bundle_format_detected, BUNDLE_FORMAT_V1);

        let restored = db::open_db(&dst).expect("open dst");
        let n: i64 = restored
            .query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0))
            .expect("count");
        assert_eq!(n, 1);

        let raw = temp_dir("results-backup-raw");
        let import = import_workspace_bundle(&src.join(DB_FILE), &raw).expect("raw import");
        assert_eq!(import.bundle_format_detected, RAW_SQLITE_FORMAT);
    }

    #[test]
    fn rejects_unknown_files() {
        let dir = temp_dir("results-backup-junk");
        let junk = dir.join("junk.txt");
        std::fs::write(&junk, b"not a backup").expect("write junk");
        assert!(import_workspace_bundle(&junk, &dir.join("ws")).is_err());
    }
}
