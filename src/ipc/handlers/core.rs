use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::req_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "user": state.session,
    }))
}

fn handle_workspace_select(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(req_str(req, "path")?);
    let repaired = open_workspace(state, &path)?;
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "repairedGrades": repaired,
    }))
}

/// Opens (or creates) the workspace database and makes it current. Any
/// session from a previous workspace ends here.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<usize, HandlerErr> {
    let conn = db::open_db(path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    let repaired = db::repair_result_grades(&conn)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;

    info!(workspace = %path.display(), repaired, "workspace opened");
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.session = None;
    Ok(repaired)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(respond(&req.id, handle_health(state, req))),
        "workspace.select" => Some(respond(&req.id, handle_workspace_select(state, req))),
        _ => None,
    }
}
