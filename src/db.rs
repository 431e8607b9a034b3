use crate::grading::{grade_for, Grade, Mark};
use rusqlite::Connection;
use std::path::Path;
use tracing::warn;

pub const DB_FILE: &str = "results.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates tables and indexes idempotently and adds columns missing from
/// databases written by older builds.
pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL,
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_no TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            phone TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            address TEXT NOT NULL,
            enrollment_date TEXT NOT NULL
        )",
        [],
    )?;
    ensure_column(conn, "students", "updated_at", "TEXT")?;
    ensure_column(conn, "students", "photo", "TEXT")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            course_code TEXT PRIMARY KEY,
            course_name TEXT NOT NULL,
            description TEXT NOT NULL,
            credits INTEGER NOT NULL DEFAULT 3,
            semester TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_semester ON courses(semester)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            employee_id TEXT NOT NULL UNIQUE,
            phone TEXT NOT NULL,
            department TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_department ON teachers(department)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_courses(
            teacher_id TEXT NOT NULL,
            course_code TEXT NOT NULL,
            PRIMARY KEY(teacher_id, course_code),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(course_code) REFERENCES courses(course_code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_courses_course ON teacher_courses(course_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            student_no TEXT NOT NULL,
            course_code TEXT NOT NULL,
            marks INTEGER NOT NULL,
            grade TEXT NOT NULL,
            exam_date TEXT NOT NULL,
            remarks TEXT,
            created_by TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_no) REFERENCES students(student_no),
            FOREIGN KEY(course_code) REFERENCES courses(course_code),
            FOREIGN KEY(created_by) REFERENCES users(id),
            UNIQUE(student_no, course_code)
        )",
        [],
    )?;
    ensure_column(conn, "results", "updated_at", "TEXT")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_student ON results(student_no)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_course ON results(course_code)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_exam_date ON results(exam_date)",
        [],
    )?;

    Ok(())
}

/// Rewrites any stored grade that disagrees with its marks. Rows whose marks
/// are outside [0, 100] are left untouched and reported.
pub fn repair_result_grades(conn: &Connection) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare("SELECT id, marks, grade FROM results")?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut repaired = 0usize;
    for (id, marks, stored) in rows {
        let mark = match u32::try_from(marks)
            .ok()
            .and_then(|h| Mark::from_hundredths(h).ok())
        {
            Some(m) => m,
            None => {
                warn!(result_id = %id, marks, "stored marks outside 0-100; grade left as is");
                continue;
            }
        };
        let expected = grade_for(mark);
        if stored.parse::<Grade>().ok() == Some(expected) {
            continue;
        }
        warn!(result_id = %id, stored = %stored, expected = %expected, "repairing stale grade");
        conn.execute(
            "UPDATE results SET grade = ? WHERE id = ?",
            (expected.as_str(), &id),
        )?;
        repaired += 1;
    }
    Ok(repaired)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub students: i64,
    pub courses: i64,
    pub teachers: i64,
    pub results: i64,
}

pub fn totals(conn: &Connection) -> rusqlite::Result<Totals> {
    conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM students),
           (SELECT COUNT(*) FROM courses),
           (SELECT COUNT(*) FROM teachers),
           (SELECT COUNT(*) FROM results)",
        [],
        |r| {
            Ok(Totals {
                students: r.get(0)?,
                courses: r.get(1)?,
                teachers: r.get(2)?,
                results: r.get(3)?,
            })
        },
    )
}

pub fn user_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
}

fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, column)? {
        return Ok(());
    }
    conn.execute(
        &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl),
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_init_is_idempotent() {
        let conn = Connection::open_in_memory().expect("memory db");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "results", "updated_at").expect("columns"));
        assert_eq!(totals(&conn).expect("totals").results, 0);
    }

    #[test]
    fn repair_rewrites_stale_grades_only() {
        let conn = Connection::open_in_memory().expect("memory db");
        init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO students(student_no, first_name, last_name, email, phone, date_of_birth, address, enrollment_date)
               VALUES('STU001','Emily','Johnson','e@u.edu','1','2002-03-15','x','2024-09-01');
             INSERT INTO courses VALUES('CS101','Intro','d',4,'Fall 2024');
             INSERT INTO courses VALUES('CS201','Data','d',4,'Fall 2024');
             INSERT INTO results(id, student_no, course_code, marks, grade, exam_date, created_at)
               VALUES('stale','STU001','CS101',8999,'A+','2024-11-01','2024-11-01T00:00:00Z');
             INSERT INTO results(id, student_no, course_code, marks, grade, exam_date, created_at)
               VALUES('fine','STU001','CS201',9000,'A+','2024-11-01','2024-11-01T00:00:00Z');",
        )
        .expect("rows");

        assert_eq!(repair_result_grades(&conn).expect("repair"), 1);
        let grade: String = conn
            .query_row("SELECT grade FROM results WHERE id = 'stale'", [], |r| r.get(0))
            .expect("grade");
        assert_eq!(grade, "A");
        assert_eq!(repair_result_grades(&conn).expect("second repair"), 0);
    }
}
