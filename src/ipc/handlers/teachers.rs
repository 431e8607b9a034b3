use crate::auth::{self, NewUser};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    check_email, check_len, opt_str, opt_str_list, req_str, require_db, require_staff, write_err,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, Teacher};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

const CONFLICT: &str = "username or employee id already in use";
const MIN_PASSWORD_LEN: usize = 8;

fn load_teacher(conn: &Connection, teacher_id: &str) -> Result<Teacher, HandlerErr> {
    records::get_teacher(conn, teacher_id)?.ok_or_else(|| HandlerErr::not_found("teacher"))
}

fn check_courses_exist(conn: &Connection, codes: &[String]) -> Result<(), HandlerErr> {
    let mut missing = Vec::new();
    for code in codes {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM courses WHERE course_code = ?",
                [code],
                |r| r.get(0),
            )
            .optional()?;
        if found.is_none() {
            missing.push(code.clone());
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    Err(HandlerErr::not_found("course").with_details(json!({ "courseCodes": missing })))
}

fn replace_course_links(
    conn: &Connection,
    teacher_id: &str,
    codes: &[String],
) -> Result<(), HandlerErr> {
    conn.execute(
        "DELETE FROM teacher_courses WHERE teacher_id = ?",
        [teacher_id],
    )?;
    let mut stmt =
        conn.prepare("INSERT INTO teacher_courses(teacher_id, course_code) VALUES(?, ?)")?;
    for code in codes {
        stmt.execute((teacher_id, code))?;
    }
    Ok(())
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let department = opt_str(req, "department");
    let search = opt_str(req, "search");
    let teachers = records::list_teachers(conn, department.as_deref(), search.as_deref())?;
    Ok(json!({ "teachers": teachers }))
}

fn handle_teachers_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;

    let username = req_str(req, "username")?;
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(HandlerErr::bad_params(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let first_name = opt_str(req, "firstName").unwrap_or_default();
    let last_name = opt_str(req, "lastName").unwrap_or_default();
    let email = opt_str(req, "email").unwrap_or_default();
    let employee_id = req_str(req, "employeeId")?;
    let phone = req_str(req, "phone")?;
    let department = req_str(req, "department")?;
    let course_codes = opt_str_list(req, "courseCodes")?.unwrap_or_default();

    check_len("username", &username, 150)?;
    check_len("employeeId", &employee_id, 20)?;
    check_len("phone", &phone, 15)?;
    check_len("department", &department, 100)?;
    if !email.is_empty() {
        check_email("email", &email)?;
    }
    check_courses_exist(conn, &course_codes)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let user_id = auth::create_user(
        &tx,
        &NewUser {
            username: &username,
            password: &password,
            first_name: &first_name,
            last_name: &last_name,
            email: &email,
        },
    )
    .map_err(|e| write_err(e, "users", CONFLICT))?;
    let teacher_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO teachers(id, user_id, employee_id, phone, department) VALUES(?, ?, ?, ?, ?)",
        (&teacher_id, &user_id, &employee_id, &phone, &department),
    )
    .map_err(|e| write_err(e, "teachers", CONFLICT))?;
    replace_course_links(&tx, &teacher_id, &course_codes)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let teacher = load_teacher(conn, &teacher_id)?;
    info!(%employee_id, %username, "teacher created");
    Ok(json!({ "teacher": teacher }))
}

fn handle_teachers_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let teacher_id = req_str(req, "teacherId")?;
    let existing = load_teacher(conn, &teacher_id)?;

    let phone = opt_str(req, "phone").unwrap_or(existing.phone);
    let department = opt_str(req, "department").unwrap_or(existing.department);
    let email = opt_str(req, "email").unwrap_or(existing.email);
    let course_codes = opt_str_list(req, "courseCodes")?;
    check_len("phone", &phone, 15)?;
    check_len("department", &department, 100)?;
    if !email.is_empty() {
        check_email("email", &email)?;
    }
    if let Some(codes) = &course_codes {
        check_courses_exist(conn, codes)?;
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE teachers SET phone = ?, department = ? WHERE id = ?",
        (&phone, &department, &teacher_id),
    )?;
    tx.execute(
        "UPDATE users
         SET email = ?,
             first_name = COALESCE(?, first_name),
             last_name = COALESCE(?, last_name)
         WHERE id = ?",
        (
            &email,
            opt_str(req, "firstName"),
            opt_str(req, "lastName"),
            &existing.user_id,
        ),
    )?;
    if let Some(codes) = &course_codes {
        replace_course_links(&tx, &teacher_id, codes)?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let teacher = load_teacher(conn, &teacher_id)?;
    info!(employee_id = %teacher.employee_id, "teacher updated");
    Ok(json!({ "teacher": teacher }))
}

fn handle_teachers_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let own_user_id = require_staff(state)?.user_id.clone();
    let conn = require_db(state)?;
    let teacher_id = req_str(req, "teacherId")?;
    let teacher = load_teacher(conn, &teacher_id)?;
    if teacher.user_id == own_user_id {
        return Err(HandlerErr::new(
            "conflict",
            "cannot delete the teacher you are logged in as",
        ));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let unlinked_courses = tx.execute(
        "DELETE FROM teacher_courses WHERE teacher_id = ?",
        [&teacher_id],
    )?;
    // Results outlive the account that entered them.
    let orphaned_results = tx.execute(
        "UPDATE results SET created_by = NULL WHERE created_by = ?",
        [&teacher.user_id],
    )?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id])?;
    tx.execute("DELETE FROM users WHERE id = ?", [&teacher.user_id])?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(employee_id = %teacher.employee_id, "teacher deleted");
    Ok(json!({
        "teacherId": teacher_id,
        "unlinkedCourses": unlinked_courses,
        "resultsWithoutCreator": orphaned_results,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "teachers.list" => handle_teachers_list(state, req),
        "teachers.create" => handle_teachers_create(state, req),
        "teachers.update" => handle_teachers_update(state, req),
        "teachers.delete" => handle_teachers_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
