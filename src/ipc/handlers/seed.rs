use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{opt_i64, require_db, require_staff_or_empty};
use crate::ipc::types::{AppState, Request};
use crate::seed;
use serde_json::json;
use tracing::info;

fn handle_populate(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let keep_user_id = require_staff_or_empty(state)?.map(|s| s.user_id.clone());
    let conn = require_db(state)?;
    let seed_value = match opt_i64(req, "seed")? {
        Some(v) => u64::try_from(v)
            .map_err(|_| HandlerErr::bad_params("seed must be a non-negative integer"))?,
        None => seed::random_seed(),
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let summary = seed::populate(&tx, seed_value, keep_user_id.as_deref())
        .map_err(|e| HandlerErr::new("db_write_failed", format!("{e:#}")))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(
        seed = summary.seed,
        results = summary.results,
        "sample data populated"
    );
    Ok(json!({
        "summary": summary,
        "teacherPassword": seed::TEACHER_PASSWORD,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "data.populate" => Some(respond(&req.id, handle_populate(state, req))),
        _ => None,
    }
}
