use crate::backup;
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{req_str, require_staff, require_staff_or_empty};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_backup_export_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let out_path = req_str(req, "outPath")?;
    let workspace_path = workspace_param(state, req)?;

    let is_current = state.workspace.as_deref() == Some(workspace_path.as_path());
    let mut counts = serde_json::Value::Null;
    if let (true, Some(conn)) = (is_current, state.db.as_ref()) {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            warn!(error = %e, "wal checkpoint before export failed");
        }
        let t = db::totals(conn)?;
        counts = json!({
            "students": t.students,
            "courses": t.courses,
            "teachers": t.teachers,
            "results": t.results,
        });
    }

    let out = PathBuf::from(&out_path);
    let export = backup::export_workspace_bundle(&workspace_path, &out, counts).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
    })?;

    info!(path = %out.display(), "workspace bundle exported");
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
    }))
}

fn handle_backup_import_workspace_bundle(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff_or_empty(state)?;
    let in_path = req_str(req, "inPath")?;
    let workspace_path = workspace_param(state, req)?;

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file").with_details(json!({ "path": in_path })));
    }

    // The open handle has to go before the database file is replaced.
    let previous = state.workspace.clone();
    let session = state.session.clone();
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if let Some(prev) = previous {
                match open_workspace(state, &prev) {
                    Ok(_) => state.session = session,
                    Err(reopen) => {
                        warn!(error = %reopen.message, "failed to reopen workspace after import error")
                    }
                }
            }
            return Err(HandlerErr::new("io_failed", format!("{e:#}"))
                .with_details(json!({ "path": in_path })));
        }
    };

    let repaired = open_workspace(state, &workspace_path)?;
    info!(
        path = %src.display(),
        format = %import.bundle_format_detected,
        "workspace bundle imported"
    );
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "repairedGrades": repaired,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_backup_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_backup_import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
