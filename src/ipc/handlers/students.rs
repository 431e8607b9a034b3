use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    check_email, check_len, opt_str, opt_str_allow_empty, parse_date, req_str, require_db,
    require_staff, write_err, DATE_FORMAT,
};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, ResultFilter, ResultOrder, Student};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

const CONFLICT: &str = "a student with this student number or email already exists";

struct StudentFields {
    student_no: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    date_of_birth: String,
    address: String,
    photo: Option<String>,
}

impl StudentFields {
    fn from_existing(s: &Student) -> Self {
        Self {
            student_no: s.student_no.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            email: s.email.clone(),
            phone: s.phone.clone(),
            date_of_birth: s.date_of_birth.clone(),
            address: s.address.clone(),
            photo: s.photo.clone(),
        }
    }

    /// Overlays whichever params were sent.
    fn apply(&mut self, req: &Request, student_no_key: &str) {
        if let Some(v) = opt_str(req, student_no_key) {
            self.student_no = v;
        }
        if let Some(v) = opt_str(req, "firstName") {
            self.first_name = v;
        }
        if let Some(v) = opt_str(req, "lastName") {
            self.last_name = v;
        }
        if let Some(v) = opt_str(req, "email") {
            self.email = v;
        }
        if let Some(v) = opt_str(req, "phone") {
            self.phone = v;
        }
        if let Some(v) = opt_str(req, "dateOfBirth") {
            self.date_of_birth = v;
        }
        if let Some(v) = opt_str(req, "address") {
            self.address = v;
        }
        // An empty string clears the photo.
        if let Some(v) = opt_str_allow_empty(req, "photo") {
            self.photo = if v.is_empty() { None } else { Some(v) };
        }
    }

    fn validate(&mut self) -> Result<(), HandlerErr> {
        for (field, value) in [
            ("studentNo", &self.student_no),
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("dateOfBirth", &self.date_of_birth),
            ("address", &self.address),
        ] {
            if value.is_empty() {
                return Err(HandlerErr::bad_params(format!("missing {}", field))
                    .with_details(json!({ "field": field })));
            }
        }
        check_len("studentNo", &self.student_no, 20)?;
        check_len("firstName", &self.first_name, 100)?;
        check_len("lastName", &self.last_name, 100)?;
        check_len("phone", &self.phone, 15)?;
        check_email("email", &self.email)?;
        if let Some(photo) = &self.photo {
            check_len("photo", photo, 100)?;
        }
        self.date_of_birth = parse_date("dateOfBirth", &self.date_of_birth)?
            .format(DATE_FORMAT)
            .to_string();
        Ok(())
    }
}

fn load_student(conn: &Connection, student_no: &str) -> Result<Student, HandlerErr> {
    records::get_student(conn, student_no)?.ok_or_else(|| HandlerErr::not_found("student"))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let search = opt_str(req, "search");
    let students = records::list_students(conn, search.as_deref())?;
    Ok(json!({ "students": students, "search": search.unwrap_or_default() }))
}

fn handle_students_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_no = req_str(req, "studentNo")?;
    let student = load_student(conn, &student_no)?;
    let results = records::list_results(
        conn,
        &ResultFilter {
            student_no: Some(student_no.clone()),
            ..ResultFilter::default()
        },
        ResultOrder::ExamDateDesc,
    )?;
    let gpa = records::student_gpa(conn, &student_no)?;
    Ok(json!({
        "student": student,
        "results": results,
        "gpa": gpa,
        "gpaDisplay": gpa.to_string(),
    }))
}

fn handle_students_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;

    let mut fields = StudentFields {
        student_no: String::new(),
        first_name: String::new(),
        last_name: String::new(),
        email: String::new(),
        phone: String::new(),
        date_of_birth: String::new(),
        address: String::new(),
        photo: None,
    };
    fields.apply(req, "studentNo");
    fields.validate()?;

    let enrollment_date = Utc::now().date_naive().format(DATE_FORMAT).to_string();
    conn.execute(
        "INSERT INTO students(
           student_no, first_name, last_name, email, phone, date_of_birth, address, photo,
           enrollment_date, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &fields.student_no,
            &fields.first_name,
            &fields.last_name,
            &fields.email,
            &fields.phone,
            &fields.date_of_birth,
            &fields.address,
            fields.photo.as_deref(),
            &enrollment_date,
        ),
    )
    .map_err(|e| write_err(e, "students", CONFLICT))?;

    let student = load_student(conn, &fields.student_no)?;
    info!(student_no = %student.student_no, "student created");
    Ok(json!({
        "message": format!("Student {} created successfully!", student.full_name),
        "student": student,
    }))
}

fn handle_students_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let student_no = req_str(req, "studentNo")?;
    let existing = load_student(conn, &student_no)?;

    let mut fields = StudentFields::from_existing(&existing);
    fields.apply(req, "newStudentNo");
    fields.validate()?;
    let renamed = fields.student_no != student_no;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if renamed {
        // Results still point at the old number until the second UPDATE.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON")?;
    }
    tx.execute(
        "UPDATE students
         SET student_no = ?, first_name = ?, last_name = ?, email = ?, phone = ?,
             date_of_birth = ?, address = ?, photo = ?,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
         WHERE student_no = ?",
        (
            &fields.student_no,
            &fields.first_name,
            &fields.last_name,
            &fields.email,
            &fields.phone,
            &fields.date_of_birth,
            &fields.address,
            fields.photo.as_deref(),
            &student_no,
        ),
    )
    .map_err(|e| write_err(e, "students", CONFLICT))?;
    if renamed {
        tx.execute(
            "UPDATE results SET student_no = ? WHERE student_no = ?",
            (&fields.student_no, &student_no),
        )
        .map_err(|e| write_err(e, "results", CONFLICT))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let student = load_student(conn, &fields.student_no)?;
    info!(student_no = %student.student_no, renamed, "student updated");
    Ok(json!({
        "message": format!("Student {} updated successfully!", student.full_name),
        "student": student,
    }))
}

fn handle_students_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    require_staff(state)?;
    let conn = require_db(state)?;
    let student_no = req_str(req, "studentNo")?;
    let student = load_student(conn, &student_no)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    // Explicit dependency order; the schema has no ON DELETE CASCADE.
    let deleted_results = tx
        .execute("DELETE FROM results WHERE student_no = ?", [&student_no])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "results" }))
        })?;
    tx.execute("DELETE FROM students WHERE student_no = ?", [&student_no])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "students" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(%student_no, deleted_results, "student deleted");
    Ok(json!({
        "studentNo": student_no,
        "deletedResults": deleted_results,
        "message": format!("Student {} deleted successfully!", student.full_name),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.open" => handle_students_open(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
