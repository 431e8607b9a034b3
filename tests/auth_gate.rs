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

#[test]
fn writes_require_a_logged_in_staff_member() {
    let workspace = temp_dir("results-auth-gate");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let no_ws = request(&mut stdin, &mut reader, "0", "students.list", json!({}));
    assert_eq!(error_code(&no_ws), "no_workspace");
    let stats = request_ok(&mut stdin, &mut reader, "1", "home.stats", json!({}));
    assert_eq!(stats.get("totalStudents").and_then(|v| v.as_i64()), Some(0));

    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let denied = request(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({
            "courseCode": "CS101",
            "courseName": "Intro",
            "description": "d",
            "semester": "Fall 2024",
        }),
    );
    assert_eq!(error_code(&denied), "unauthorized");
    request_ok(&mut stdin, &mut reader, "4", "courses.list", json!({}));

    let short = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.register",
        json!({ "username": "admin", "password": "short" }),
    );
    assert_eq!(error_code(&short), "bad_params");
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.register",
        json!({ "username": "admin", "password": "admin-pass-1" }),
    );
    let second = request(
        &mut stdin,
        &mut reader,
        "7",
        "auth.register",
        json!({ "username": "intruder", "password": "intruder-pass" }),
    );
    assert_eq!(error_code(&second), "unauthorized");

    let bad = request(
        &mut stdin,
        &mut reader,
        "8",
        "auth.login",
        json!({ "username": "admin", "password": "wrong-password" }),
    );
    assert_eq!(error_code(&bad), "invalid_credentials");
    let unknown = request(
        &mut stdin,
        &mut reader,
        "9",
        "auth.login",
        json!({ "username": "nobody", "password": "admin-pass-1" }),
    );
    assert_eq!(error_code(&unknown), "invalid_credentials");

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "auth.login",
        json!({ "username": "admin", "password": "admin-pass-1" }),
    );
    assert_eq!(
        login.get("message").and_then(|v| v.as_str()),
        Some("Welcome back, admin!")
    );
    let who = request_ok(&mut stdin, &mut reader, "11", "auth.whoami", json!({}));
    assert_eq!(
        who.pointer("/user/username").and_then(|v| v.as_str()),
        Some("admin")
    );
    request_ok(&mut stdin, &mut reader, "12", "dashboard.open", json!({}));
    request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "auth.register",
        json!({ "username": "second", "password": "second-pass" }),
    );

    request_ok(&mut stdin, &mut reader, "14", "auth.logout", json!({}));
    let who = request_ok(&mut stdin, &mut reader, "15", "auth.whoami", json!({}));
    assert!(who.get("user").map(|v| v.is_null()).unwrap_or(false));
    let denied = request(&mut stdin, &mut reader, "16", "dashboard.open", json!({}));
    assert_eq!(error_code(&denied), "unauthorized");

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn switching_workspace_ends_the_session() {
    let first = temp_dir("results-auth-switch-a");
    let second = temp_dir("results-auth-switch-b");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": first.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.register",
        json!({ "username": "admin", "password": "admin-pass-1" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "username": "admin", "password": "admin-pass-1" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": second.to_string_lossy() }),
    );
    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert!(health.get("user").map(|v| v.is_null()).unwrap_or(false));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(first);
    let _ = std::fs::remove_dir_all(second);
}
