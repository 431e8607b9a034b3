use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Logged-in staff member. Lives only in process memory; a new workspace or
/// a restart ends it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    /// RFC 3339, UTC.
    pub started_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    let actual = hash_password(salt, password);
    if actual.len() != expected_hash.len() {
        return false;
    }
    actual
        .bytes()
        .zip(expected_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

pub fn display_name(username: &str, first_name: &str, last_name: &str) -> String {
    let full = format!("{} {}", first_name.trim(), last_name.trim());
    let full = full.trim();
    if full.is_empty() {
        username.to_string()
    } else {
        full.to_string()
    }
}

/// Inserts a user row and returns its id.
pub fn create_user(conn: &Connection, user: &NewUser<'_>) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    let salt = new_salt();
    let hash = hash_password(&salt, user.password);
    conn.execute(
        "INSERT INTO users(id, username, password_hash, salt, first_name, last_name, email, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &id,
            user.username,
            &hash,
            &salt,
            user.first_name,
            user.last_name,
            user.email,
        ),
    )?;
    Ok(id)
}

/// Checks credentials; `None` covers both unknown user and wrong password.
pub fn authenticate(
    conn: &Connection,
    username: &str,
    password: &str,
) -> rusqlite::Result<Option<Session>> {
    let row = conn
        .query_row(
            "SELECT id, username, password_hash, salt, first_name, last_name
             FROM users
             WHERE username = ?",
            [username],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((user_id, username, hash, salt, first_name, last_name)) = row else {
        return Ok(None);
    };
    if !verify_password(&salt, password, &hash) {
        return Ok(None);
    }

    Ok(Some(Session {
        display_name: display_name(&username, &first_name, &last_name),
        user_id,
        username,
        started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }))
}
