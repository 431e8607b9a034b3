use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{require_db, require_staff};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ResultFilter, ResultOrder};
use serde_json::json;

const RECENT_RESULTS: usize = 10;

fn handle_home_stats(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    // The landing page works before a workspace is chosen.
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "totalStudents": 0, "totalCourses": 0, "totalResults": 0 }));
    };
    let t = db::totals(conn)?;
    Ok(json!({
        "totalStudents": t.students,
        "totalCourses": t.courses,
        "totalResults": t.results,
    }))
}

fn handle_dashboard_open(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let user = require_staff(state)?.clone();
    let conn = require_db(state)?;
    let t = db::totals(conn)?;
    let recent = records::list_results(
        conn,
        &ResultFilter::default(),
        ResultOrder::NewestFirst(RECENT_RESULTS),
    )?;
    Ok(json!({
        "user": user,
        "totalStudents": t.students,
        "totalCourses": t.courses,
        "totalTeachers": t.teachers,
        "totalResults": t.results,
        "recentResults": recent,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "home.stats" => Some(respond(&req.id, handle_home_stats(state, req))),
        "dashboard.open" => Some(respond(&req.id, handle_dashboard_open(state, req))),
        _ => None,
    }
}
