use crate::auth::Session;
use crate::db;
use crate::error::ResultsError;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn require_staff(state: &AppState) -> Result<&Session, HandlerErr> {
    state
        .session
        .as_ref()
        .ok_or_else(|| HandlerErr::new("unauthorized", "login required"))
}

/// Staff session, or a workspace that has no users yet (first-run bootstrap).
pub fn require_staff_or_empty(state: &AppState) -> Result<Option<&Session>, HandlerErr> {
    if let Some(s) = state.session.as_ref() {
        return Ok(Some(s));
    }
    let conn = require_db(state)?;
    if db::user_count(conn)? == 0 {
        return Ok(None);
    }
    Err(HandlerErr::new("unauthorized", "login required"))
}

/// Trimmed string param; empty strings count as absent.
pub fn opt_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn req_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    opt_str(req, key).ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Like `opt_str` but keeps an explicit empty string, so callers can clear a field.
pub fn opt_str_allow_empty(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}

pub fn opt_i64(req: &Request, key: &str) -> Result<Option<i64>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an integer", key))),
    }
}

pub fn opt_str_list(req: &Request, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                let Some(s) = item.as_str() else {
                    return Err(HandlerErr::bad_params(format!(
                        "{} must be a list of strings",
                        key
                    )));
                };
                let s = s.trim();
                if !s.is_empty() && !out.iter().any(|o: &String| o == s) {
                    out.push(s.to_string());
                }
            }
            Ok(Some(out))
        }
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be a list of strings",
            key
        ))),
    }
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ResultsError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ResultsError::invalid(field, format!("expected YYYY-MM-DD, got {}", raw)))
}

pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), ResultsError> {
    if value.chars().count() > max {
        return Err(ResultsError::invalid(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(())
}

pub fn check_email(field: &str, value: &str) -> Result<(), ResultsError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ResultsError::invalid(field, "enter a valid email address"))
    }
}

/// Maps UNIQUE/PRIMARY KEY violations to `conflict`; everything else is a
/// plain write failure against `table`.
pub fn write_err(e: rusqlite::Error, table: &str, conflict_message: &str) -> HandlerErr {
    if let rusqlite::Error::SqliteFailure(ref f, _) = e {
        if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return HandlerErr::new("conflict", conflict_message)
                .with_details(json!({ "table": table }));
        }
    }
    HandlerErr::new("db_write_failed", e.to_string()).with_details(json!({ "table": table }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_check() {
        assert!(check_email("email", "emily.johnson@university.edu").is_ok());
        assert!(check_email("email", "AW@university.edu").is_ok());
        assert!(check_email("email", "no-at-sign").is_err());
        assert!(check_email("email", "a@b").is_err());
        assert!(check_email("email", "a b@c.d").is_err());
    }

    #[test]
    fn date_parse() {
        assert!(parse_date("examDate", "2024-11-01").is_ok());
        assert!(parse_date("examDate", "11/01/2024").is_err());
    }
}
