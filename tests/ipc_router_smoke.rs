use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

/// Selects a fresh workspace, bootstraps the first account, and logs in.
fn open_as_staff(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        stdin,
        reader,
        "reg",
        "auth.register",
        json!({ "username": "admin", "password": "admin-pass-1", "firstName": "Ada", "lastName": "Admin" }),
    );
    request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        json!({ "username": "admin", "password": "admin-pass-1" }),
    );
    workspace
}

fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    student_no: &str,
    first_name: &str,
) {
    request_ok(
        stdin,
        reader,
        &format!("student-{}", student_no),
        "students.create",
        json!({
            "studentNo": student_no,
            "firstName": first_name,
            "lastName": "Tester",
            "email": format!("{}@university.edu", student_no.to_lowercase()),
            "phone": "+1-555-0199",
            "dateOfBirth": "2002-03-15",
            "address": "1 Test Street",
        }),
    );
}

fn create_course(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, code: &str) {
    request_ok(
        stdin,
        reader,
        &format!("course-{}", code),
        "courses.create",
        json!({
            "courseCode": code,
            "courseName": format!("Course {}", code),
            "description": "Test course",
            "semester": "Fall 2024",
        }),
    );
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "0", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());

    let workspace = open_as_staff(&mut stdin, &mut reader, "results-router-smoke");
    create_student(&mut stdin, &mut reader, "STU001", "Emily");
    create_course(&mut stdin, &mut reader, "CS101");

    let scale = request_ok(&mut stdin, &mut reader, "1", "grades.scale", json!({}));
    assert_eq!(
        scale.get("bands").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(10)
    );
    let gpa = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.gpa",
        json!({ "grades": ["A+", "B"] }),
    );
    assert_eq!(gpa.get("display").and_then(|v| v.as_str()), Some("3.35"));
    let bad_grade = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.gpa",
        json!({ "grades": ["Z"] }),
    );
    assert_eq!(error_code(&bad_grade), "bad_grade");

    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "teachers.create",
        json!({
            "username": "prof.test",
            "password": "teacher-pass",
            "firstName": "Terry",
            "lastName": "Test",
            "employeeId": "EMP900",
            "phone": "+1-555-0900",
            "department": "Computer Science",
            "courseCodes": ["CS101"],
        }),
    );
    let teacher_id = teacher
        .pointer("/teacher/id")
        .and_then(|v| v.as_str())
        .expect("teacher id")
        .to_string();
    let unknown_course = request(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({
            "username": "prof.other",
            "password": "teacher-pass",
            "employeeId": "EMP901",
            "phone": "+1-555-0901",
            "department": "Mathematics",
            "courseCodes": ["NOPE"],
        }),
    );
    assert_eq!(error_code(&unknown_course), "not_found");
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "teachers.update",
        json!({ "teacherId": teacher_id, "department": "Mathematics", "courseCodes": [] }),
    );
    assert_eq!(
        updated
            .pointer("/teacher/courseCodes")
            .and_then(|v| v.as_array())
            .map(|v| v.len()),
        Some(0)
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "teachers.list",
        json!({ "department": "Mathematics" }),
    );
    assert_eq!(
        listed.get("teachers").and_then(|v| v.as_array()).map(|v| v.len()),
        Some(1)
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "courses.update",
        json!({ "courseCode": "CS101", "credits": 4 }),
    );
    let bad_credits = request(
        &mut stdin,
        &mut reader,
        "10",
        "courses.update",
        json!({ "courseCode": "CS101", "credits": 0 }),
    );
    assert_eq!(error_code(&bad_credits), "bad_params");
    let bad_email = request(
        &mut stdin,
        &mut reader,
        "11",
        "students.update",
        json!({ "studentNo": "STU001", "email": "not-an-email" }),
    );
    assert_eq!(error_code(&bad_email), "bad_params");

    let unknown = request(&mut stdin, &mut reader, "12", "classes.list", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(error_code(&value), "bad_json");

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
