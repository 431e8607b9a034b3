use crate::auth::{self, NewUser};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{
    check_email, check_len, opt_str, req_str, require_db, require_staff, require_staff_or_empty,
    write_err,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use tracing::{info, warn};

const MIN_PASSWORD_LEN: usize = 8;

fn handle_register(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let bootstrap = require_staff_or_empty(state)?.is_none();
    let conn = require_db(state)?;

    let username = req_str(req, "username")?;
    check_len("username", &username, 150)?;
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
    if !email.is_empty() {
        check_email("email", &email)?;
    }

    let user_id = auth::create_user(
        conn,
        &NewUser {
            username: &username,
            password: &password,
            first_name: &first_name,
            last_name: &last_name,
            email: &email,
        },
    )
    .map_err(|e| write_err(e, "users", "username already exists"))?;

    info!(%username, bootstrap, "user registered");
    Ok(json!({ "userId": user_id, "username": username }))
}

fn handle_login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let username = req_str(req, "username")?;
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let Some(session) = auth::authenticate(conn, &username, password)? else {
        warn!(%username, "failed login");
        return Err(HandlerErr::new(
            "invalid_credentials",
            "Invalid username or password.",
        ));
    };

    info!(username = %session.username, "logged in");
    let message = format!("Welcome back, {}!", session.display_name);
    let user = json!(session);
    state.session = Some(session);
    Ok(json!({ "user": user, "message": message }))
}

fn handle_logout(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = require_staff(state)?.username.clone();
    state.session = None;
    info!(%username, "logged out");
    Ok(json!({ "message": "You have been logged out successfully." }))
}

fn handle_whoami(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "user": state.session }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(respond(&req.id, handle_register(state, req))),
        "auth.login" => Some(respond(&req.id, handle_login(state, req))),
        "auth.logout" => Some(respond(&req.id, handle_logout(state, req))),
        "auth.whoami" => Some(respond(&req.id, handle_whoami(state, req))),
        _ => None,
    }
}
