use crate::grading::{grade_for, Grade, Mark};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    opt_str, opt_str_allow_empty, parse_date, req_str, require_db, require_staff, write_err,
    DATE_FORMAT,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ResultFilter, ResultOrder, ResultRecord};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const CONFLICT: &str = "a result for this student and course already exists";

fn load_result(conn: &Connection, result_id: &str) -> Result<ResultRecord, HandlerErr> {
    records::get_result(conn, result_id)?.ok_or_else(|| HandlerErr::not_found("result"))
}

fn marks_param(req: &Request) -> Result<Option<Mark>, HandlerErr> {
    match req.params.get("marks") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => Ok(Some(Mark::from_json(v)?)),
    }
}

fn exam_date_param(req: &Request) -> Result<Option<String>, HandlerErr> {
    match opt_str(req, "examDate") {
        None => Ok(None),
        Some(raw) => Ok(Some(
            parse_date("examDate", &raw)?.format(DATE_FORMAT).to_string(),
        )),
    }
}

fn remarks_param(req: &Request) -> Option<Option<String>> {
    opt_str_allow_empty(req, "remarks").map(|s| if s.is_empty() { None } else { Some(s) })
}

/// Both sides of the pair must exist before a result can point at them.
fn check_pair(conn: &Connection, student_no: &str, course_code: &str) -> Result<(), HandlerErr> {
    if records::get_student(conn, student_no)?.is_none() {
        return Err(HandlerErr::not_found("student"));
    }
    if records::get_course(conn, course_code)?.is_none() {
        return Err(HandlerErr::not_found("course"));
    }
    Ok(())
}

fn handle_results_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let grade = match opt_str(req, "grade") {
        Some(g) => Some(g.parse::<Grade>()?),
        None => None,
    };
    let filter = ResultFilter {
        student_no: opt_str(req, "studentNo"),
        course_code: opt_str(req, "courseCode"),
        grade,
        ..ResultFilter::default()
    };
    let results = records::list_results(conn, &filter, ResultOrder::ExamDateDesc)?;
    Ok(json!({ "results": results }))
}

fn handle_results_search(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let search = opt_str(req, "search");
    let results = match &search {
        // An empty query shows nothing rather than everything.
        None => Vec::new(),
        Some(q) => records::list_results(
            conn,
            &ResultFilter {
                search: Some(q.clone()),
                ..ResultFilter::default()
            },
            ResultOrder::ExamDateDesc,
        )?,
    };
    Ok(json!({ "results": results, "search": search.unwrap_or_default() }))
}

fn handle_results_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let created_by = require_staff(state)?.user_id.clone();
    let conn = require_db(state)?;

    let student_no = req_str(req, "studentNo")?;
    let course_code = req_str(req, "courseCode")?;
    let mark = marks_param(req)?.ok_or_else(|| HandlerErr::bad_params("missing marks"))?;
    let exam_date = exam_date_param(req)?.ok_or_else(|| HandlerErr::bad_params("missing examDate"))?;
    let remarks = remarks_param(req).flatten();
    check_pair(conn, &student_no, &course_code)?;

    // The grade is only ever derived here and in update; a caller-sent grade is ignored.
    let grade = grade_for(mark);
    let result_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO results(
           id, student_no, course_code, marks, grade, exam_date, remarks, created_by,
           created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?,
           strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &result_id,
            &student_no,
            &course_code,
            mark.hundredths(),
            grade.as_str(),
            &exam_date,
            remarks.as_deref(),
            &created_by,
        ),
    )
    .map_err(|e| write_err(e, "results", CONFLICT))?;

    let result = load_result(conn, &result_id)?;
    info!(%result_id, %student_no, %course_code, %grade, "result created");
    Ok(json!({
        "message": format!(
            "Result for {} in {} created successfully!",
            result.student_name, result.course_name
        ),
        "result": result,
    }))
}

fn handle_results_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let result_id = req_str(req, "resultId")?;
    let existing = load_result(conn, &result_id)?;

    let student_no = opt_str(req, "studentNo").unwrap_or(existing.student_no);
    let course_code = opt_str(req, "courseCode").unwrap_or(existing.course_code);
    let mark = marks_param(req)?.unwrap_or(existing.marks);
    let exam_date = exam_date_param(req)?.unwrap_or(existing.exam_date);
    let remarks = remarks_param(req).unwrap_or(existing.remarks);
    check_pair(conn, &student_no, &course_code)?;

    let grade = grade_for(mark);
    conn.execute(
        "UPDATE results
         SET student_no = ?, course_code = ?, marks = ?, grade = ?, exam_date = ?, remarks = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE id = ?",
        (
            &student_no,
            &course_code,
            mark.hundredths(),
            grade.as_str(),
            &exam_date,
            remarks.as_deref(),
            &result_id,
        ),
    )
    .map_err(|e| write_err(e, "results", CONFLICT))?;

    let result = load_result(conn, &result_id)?;
    info!(%result_id, previous = %existing.grade, %grade, "result updated");
    Ok(json!({
        "message": "Result updated successfully!",
        "result": result,
    }))
}

fn handle_results_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let result_id = req_str(req, "resultId")?;
    let existing = load_result(conn, &result_id)?;

    conn.execute("DELETE FROM results WHERE id = ?", [&result_id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "results" }))
        })?;

    info!(%result_id, "result deleted");
    Ok(json!({
        "resultId": result_id,
        "studentNo": existing.student_no,
        "message": "Result deleted successfully!",
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "results.list" => handle_results_list(state, req),
        "results.search" => handle_results_search(state, req),
        "results.create" => handle_results_create(state, req),
        "results.update" => handle_results_update(state, req),
        "results.delete" => handle_results_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
