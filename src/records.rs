use crate::grading::{gpa_for, grade_for, Gpa, Grade, Mark};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub student_no: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub display: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: String,
    pub address: String,
    /// Path of the student's photo inside the workspace, if one was set.
    pub photo: Option<String>,
    pub enrollment_date: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_code: String,
    pub course_name: String,
    pub display: String,
    pub description: String,
    pub credits: i64,
    pub semester: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub employee_id: String,
    pub display: String,
    pub phone: String,
    pub department: String,
    pub course_codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: String,
    pub student_no: String,
    pub student_name: String,
    pub course_code: String,
    pub course_name: String,
    pub marks: Mark,
    pub grade: Grade,
    pub grade_label: &'static str,
    pub grade_point: f64,
    pub exam_date: String,
    pub remarks: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// SQL LIKE pattern for a case-insensitive substring match. `\` is the escape.
pub fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

const STUDENT_COLUMNS: &str = "student_no, first_name, last_name, email, phone, date_of_birth, address,
        enrollment_date, photo, updated_at";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<Student> {
    let student_no: String = r.get(0)?;
    let first_name: String = r.get(1)?;
    let last_name: String = r.get(2)?;
    let full_name = format!("{} {}", first_name, last_name);
    Ok(Student {
        display: format!("{} - {}", student_no, full_name),
        student_no,
        first_name,
        last_name,
        full_name,
        email: r.get(3)?,
        phone: r.get(4)?,
        date_of_birth: r.get(5)?,
        address: r.get(6)?,
        enrollment_date: r.get(7)?,
        photo: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

pub fn get_student(conn: &Connection, student_no: &str) -> rusqlite::Result<Option<Student>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM students WHERE student_no = ?",
            STUDENT_COLUMNS
        ),
        [student_no],
        student_from_row,
    )
    .optional()
}

/// Students ordered by number. `search` matches student no, first/last
/// name, or email as a case-insensitive substring.
pub fn list_students(conn: &Connection, search: Option<&str>) -> rusqlite::Result<Vec<Student>> {
    let mut sql = format!("SELECT {} FROM students", STUDENT_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(q) = search {
        sql.push_str(
            " WHERE student_no LIKE ?1 ESCAPE '\\'
                OR first_name LIKE ?1 ESCAPE '\\'
                OR last_name LIKE ?1 ESCAPE '\\'
                OR email LIKE ?1 ESCAPE '\\'",
        );
        bind.push(Value::Text(like_pattern(q)));
    }
    sql.push_str(" ORDER BY student_no");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const COURSE_COLUMNS: &str = "course_code, course_name, description, credits, semester";

fn course_from_row(r: &Row<'_>) -> rusqlite::Result<Course> {
    let course_code: String = r.get(0)?;
    let course_name: String = r.get(1)?;
    Ok(Course {
        display: format!("{} - {}", course_code, course_name),
        course_code,
        course_name,
        description: r.get(2)?,
        credits: r.get(3)?,
        semester: r.get(4)?,
    })
}

pub fn get_course(conn: &Connection, course_code: &str) -> rusqlite::Result<Option<Course>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM courses WHERE course_code = ?",
            COURSE_COLUMNS
        ),
        [course_code],
        course_from_row,
    )
    .optional()
}

pub fn list_courses(
    conn: &Connection,
    search: Option<&str>,
    semester: Option<&str>,
) -> rusqlite::Result<Vec<Course>> {
    let mut sql = format!("SELECT {} FROM courses WHERE 1 = 1", COURSE_COLUMNS);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(q) = search {
        bind.push(Value::Text(like_pattern(q)));
        sql.push_str(&format!(
            " AND (course_code LIKE ?{n} ESCAPE '\\' OR course_name LIKE ?{n} ESCAPE '\\')",
            n = bind.len()
        ));
    }
    if let Some(s) = semester {
        bind.push(Value::Text(s.to_string()));
        sql.push_str(&format!(" AND semester = ?{}", bind.len()));
    }
    sql.push_str(" ORDER BY course_code");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), course_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

const TEACHER_SELECT: &str = "SELECT t.id, t.user_id, u.username, u.first_name, u.last_name, u.email,
        t.employee_id, t.phone, t.department
 FROM teachers t
 JOIN users u ON u.id = t.user_id";

fn teacher_from_row(r: &Row<'_>) -> rusqlite::Result<Teacher> {
    let username: String = r.get(2)?;
    let first_name: String = r.get(3)?;
    let last_name: String = r.get(4)?;
    let employee_id: String = r.get(6)?;
    let full_name = crate::auth::display_name(&username, &first_name, &last_name);
    Ok(Teacher {
        id: r.get(0)?,
        user_id: r.get(1)?,
        display: format!("{} - {}", employee_id, full_name),
        username,
        full_name,
        email: r.get(5)?,
        employee_id,
        phone: r.get(7)?,
        department: r.get(8)?,
        course_codes: Vec::new(),
    })
}

fn attach_course_codes(conn: &Connection, teachers: &mut [Teacher]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT course_code FROM teacher_courses WHERE teacher_id = ? ORDER BY course_code",
    )?;
    for t in teachers.iter_mut() {
        t.course_codes = stmt
            .query_map([&t.id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
    }
    Ok(())
}

pub fn get_teacher(conn: &Connection, teacher_id: &str) -> rusqlite::Result<Option<Teacher>> {
    let found = conn
        .query_row(
            &format!("{} WHERE t.id = ?", TEACHER_SELECT),
            [teacher_id],
            teacher_from_row,
        )
        .optional()?;
    let Some(teacher) = found else {
        return Ok(None);
    };
    let mut one = [teacher];
    attach_course_codes(conn, &mut one)?;
    let [teacher] = one;
    Ok(Some(teacher))
}

/// Teachers ordered by employee id. `search` matches employee id, username,
/// or first/last name.
pub fn list_teachers(
    conn: &Connection,
    department: Option<&str>,
    search: Option<&str>,
) -> rusqlite::Result<Vec<Teacher>> {
    let mut sql = format!("{} WHERE 1 = 1", TEACHER_SELECT);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(d) = department {
        bind.push(Value::Text(d.to_string()));
        sql.push_str(&format!(" AND t.department = ?{}", bind.len()));
    }
    if let Some(q) = search {
        bind.push(Value::Text(like_pattern(q)));
        sql.push_str(&format!(
            " AND (t.employee_id LIKE ?{n} ESCAPE '\\'
                   OR u.username LIKE ?{n} ESCAPE '\\'
                   OR u.first_name LIKE ?{n} ESCAPE '\\'
                   OR u.last_name LIKE ?{n} ESCAPE '\\')",
            n = bind.len()
        ));
    }
    sql.push_str(" ORDER BY t.employee_id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(params_from_iter(bind), teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    attach_course_codes(conn, &mut rows)?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub id: Option<String>,
    pub student_no: Option<String>,
    pub course_code: Option<String>,
    pub grade: Option<Grade>,
    /// Substring of student no, first/last name, course code, or course name.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultOrder {
    /// Latest exam first.
    ExamDateDesc,
    /// Most recently entered first, capped.
    NewestFirst(usize),
}

const RESULT_SELECT: &str = "SELECT r.id, r.student_no, s.first_name, s.last_name, r.course_code, c.course_name,
        r.marks, r.grade, r.exam_date, r.remarks, u.username, r.created_at, r.updated_at
 FROM results r
 JOIN students s ON s.student_no = r.student_no
 JOIN courses c ON c.course_code = r.course_code
 LEFT JOIN users u ON u.id = r.created_by";

fn result_from_row(r: &Row<'_>) -> rusqlite::Result<ResultRecord> {
    let raw_marks: i64 = r.get(6)?;
    let marks = u32::try_from(raw_marks)
        .ok()
        .and_then(|h| Mark::from_hundredths(h).ok())
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, raw_marks))?;
    let raw_grade: String = r.get(7)?;
    let grade: Grade = raw_grade
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    let first_name: String = r.get(2)?;
    let last_name: String = r.get(3)?;
    Ok(ResultRecord {
        id: r.get(0)?,
        student_no: r.get(1)?,
        student_name: format!("{} {}", first_name, last_name),
        course_code: r.get(4)?,
        course_name: r.get(5)?,
        marks,
        grade,
        grade_label: grade.label(),
        grade_point: grade.point(),
        exam_date: r.get(8)?,
        remarks: r.get(9)?,
        created_by: r.get(10)?,
        created_at: r.get(11)?,
        updated_at: r.get(12)?,
    })
}

pub fn list_results(
    conn: &Connection,
    filter: &ResultFilter,
    order: ResultOrder,
) -> rusqlite::Result<Vec<ResultRecord>> {
    let mut sql = format!("{} WHERE 1 = 1", RESULT_SELECT);
    let mut bind: Vec<Value> = Vec::new();
    if let Some(id) = &filter.id {
        bind.push(Value::Text(id.clone()));
        sql.push_str(&format!(" AND r.id = ?{}", bind.len()));
    }
    if let Some(no) = &filter.student_no {
        bind.push(Value::Text(no.clone()));
        sql.push_str(&format!(" AND r.student_no = ?{}", bind.len()));
    }
    if let Some(code) = &filter.course_code {
        bind.push(Value::Text(code.clone()));
        sql.push_str(&format!(" AND r.course_code = ?{}", bind.len()));
    }
    if let Some(g) = filter.grade {
        bind.push(Value::Text(g.as_str().to_string()));
        sql.push_str(&format!(" AND r.grade = ?{}", bind.len()));
    }
    if let Some(q) = &filter.search {
        bind.push(Value::Text(like_pattern(q)));
        sql.push_str(&format!(
            " AND (r.student_no LIKE ?{n} ESCAPE '\\'
                   OR s.first_name LIKE ?{n} ESCAPE '\\'
                   OR s.last_name LIKE ?{n} ESCAPE '\\'
                   OR r.course_code LIKE ?{n} ESCAPE '\\'
                   OR c.course_name LIKE ?{n} ESCAPE '\\')",
            n = bind.len()
        ));
    }
    match order {
        ResultOrder::ExamDateDesc => {
            sql.push_str(" ORDER BY r.exam_date DESC, r.student_no, r.course_code")
        }
        ResultOrder::NewestFirst(limit) => {
            sql.push_str(&format!(
                " ORDER BY r.created_at DESC, r.rowid DESC LIMIT {}",
                limit
            ))
        }
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), result_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_result(conn: &Connection, result_id: &str) -> rusqlite::Result<Option<ResultRecord>> {
    let filter = ResultFilter {
        id: Some(result_id.to_string()),
        ..ResultFilter::default()
    };
    Ok(list_results(conn, &filter, ResultOrder::ExamDateDesc)?
        .into_iter()
        .next())
}

/// GPA over the student's current results, derived from stored marks on
/// every call. Points are summed latest exam first.
pub fn student_gpa(conn: &Connection, student_no: &str) -> rusqlite::Result<Gpa> {
    let mut stmt = conn.prepare(
        "SELECT marks FROM results WHERE student_no = ? ORDER BY exam_date DESC, rowid",
    )?;
    let marks = stmt
        .query_map([student_no], |r| r.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut grades = Vec::with_capacity(marks.len());
    for raw in marks {
        let mark = u32::try_from(raw)
            .ok()
            .and_then(|h| Mark::from_hundredths(h).ok())
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, raw))?;
        grades.push(grade_for(mark));
    }
    Ok(gpa_for(grades))
}
