use crate::error::ResultsError;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{check_len, opt_i64, opt_str, req_str, require_db, require_staff, write_err};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, Course};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

const CONFLICT: &str = "a course with this course code already exists";
const DEFAULT_CREDITS: i64 = 3;

fn load_course(conn: &Connection, course_code: &str) -> Result<Course, HandlerErr> {
    records::get_course(conn, course_code)?.ok_or_else(|| HandlerErr::not_found("course"))
}

fn validate(
    course_code: &str,
    course_name: &str,
    semester: &str,
    credits: i64,
) -> Result<(), ResultsError> {
    check_len("courseCode", course_code, 20)?;
    check_len("courseName", course_name, 200)?;
    check_len("semester", semester, 20)?;
    if credits <= 0 {
        return Err(ResultsError::invalid("credits", "must be a positive integer"));
    }
    Ok(())
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let search = opt_str(req, "search");
    let semester = opt_str(req, "semester");
    let courses = records::list_courses(conn, search.as_deref(), semester.as_deref())?;
    Ok(json!({ "courses": courses }))
}

fn handle_courses_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;

    let course_code = req_str(req, "courseCode")?;
    let course_name = req_str(req, "courseName")?;
    let description = req_str(req, "description")?;
    let semester = req_str(req, "semester")?;
    let credits = opt_i64(req, "credits")?.unwrap_or(DEFAULT_CREDITS);
    validate(&course_code, &course_name, &semester, credits)?;

    conn.execute(
        "INSERT INTO courses(course_code, course_name, description, credits, semester)
         VALUES(?, ?, ?, ?, ?)",
        (&course_code, &course_name, &description, credits, &semester),
    )
    .map_err(|e| write_err(e, "courses", CONFLICT))?;

    let course = load_course(conn, &course_code)?;
    info!(%course_code, "course created");
    Ok(json!({
        "message": format!("Course {} created successfully!", course.course_name),
        "course": course,
    }))
}

fn handle_courses_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let course_code = req_str(req, "courseCode")?;
    let existing = load_course(conn, &course_code)?;

    let new_code = opt_str(req, "newCourseCode").unwrap_or_else(|| existing.course_code.clone());
    let course_name = opt_str(req, "courseName").unwrap_or(existing.course_name);
    let description = opt_str(req, "description").unwrap_or(existing.description);
    let semester = opt_str(req, "semester").unwrap_or(existing.semester);
    let credits = opt_i64(req, "credits")?.unwrap_or(existing.credits);
    validate(&new_code, &course_name, &semester, credits)?;
    let renamed = new_code != course_code;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if renamed {
        tx.execute_batch("PRAGMA defer_foreign_keys = ON")?;
    }
    tx.execute(
        "UPDATE courses
         SET course_code = ?, course_name = ?, description = ?, credits = ?, semester = ?
         WHERE course_code = ?",
        (
            &new_code,
            &course_name,
            &description,
            credits,
            &semester,
            &course_code,
        ),
    )
    .map_err(|e| write_err(e, "courses", CONFLICT))?;
    if renamed {
        for table in ["results", "teacher_courses"] {
            tx.execute(
                &format!("UPDATE {} SET course_code = ? WHERE course_code = ?", table),
                (&new_code, &course_code),
            )
            .map_err(|e| write_err(e, table, CONFLICT))?;
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let course = load_course(conn, &new_code)?;
    info!(course_code = %course.course_code, renamed, "course updated");
    Ok(json!({
        "message": format!("Course {} updated successfully!", course.course_name),
        "course": course,
    }))
}

fn handle_courses_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let course_code = req_str(req, "courseCode")?;
    let course = load_course(conn, &course_code)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut deleted = serde_json::Map::new();
    for table in ["results", "teacher_courses", "courses"] {
        let n = tx
            .execute(
                &format!("DELETE FROM {} WHERE course_code = ?", table),
                [&course_code],
            )
            .map_err(|e| {
                HandlerErr::new("db_delete_failed", e.to_string())
                    .with_details(json!({ "table": table }))
            })?;
        deleted.insert(table.to_string(), json!(n));
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(%course_code, "course deleted");
    Ok(json!({
        "courseCode": course_code,
        "deleted": deleted,
        "message": format!("Course {} deleted successfully!", course.course_name),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.list" => handle_courses_list(state, req),
        "courses.create" => handle_courses_create(state, req),
        "courses.update" => handle_courses_update(state, req),
        "courses.delete" => handle_courses_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
