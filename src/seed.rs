use crate::auth::{self, NewUser};
use crate::grading::{grade_for, Gpa, Mark};
use crate::records;
use anyhow::{anyhow, Context};
use chrono::{Duration as ChronoDuration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

pub const TEACHER_PASSWORD: &str = "teacher123";
const SAMPLE_GPA_STUDENTS: usize = 5;

struct CourseSeed {
    code: &'static str,
    name: &'static str,
    description: &'static str,
    credits: i64,
    semester: &'static str,
}

static COURSES: [CourseSeed; 7] = [
    CourseSeed {
        code: "CS101",
        name: "Introduction to Computer Science",
        description: "Fundamentals of programming and computer science concepts",
        credits: 4,
        semester: "Fall 2024",
    },
    CourseSeed {
        code: "CS201",
        name: "Data Structures and Algorithms",
        description: "Advanced data structures, algorithms, and complexity analysis",
        credits: 4,
        semester: "Fall 2024",
    },
    CourseSeed {
        code: "CS301",
        name: "Database Management Systems",
        description: "Relational databases, SQL, and database design principles",
        credits: 3,
        semester: "Fall 2024",
    },
    CourseSeed {
        code: "CS302",
        name: "Web Development",
        description: "Full-stack web development with modern frameworks",
        credits: 3,
        semester: "Fall 2024",
    },
    CourseSeed {
        code: "MATH201",
        name: "Discrete Mathematics",
        description: "Mathematical foundations for computer science",
        credits: 3,
        semester: "Fall 2024",
    },
    CourseSeed {
        code: "CS401",
        name: "Artificial Intelligence",
        description: "Machine learning, neural networks, and AI applications",
        credits: 4,
        semester: "Spring 2025",
    },
    CourseSeed {
        code: "CS402",
        name: "Software Engineering",
        description: "Software development lifecycle, testing, and project management",
        credits: 3,
        semester: "Spring 2025",
    },
];

// (student no, first, last, email, phone, date of birth, address)
const STUDENTS: [(&str, &str, &str, &str, &str, &str, &str); 10] = [
    ("STU001", "Emily", "Johnson", "emily.johnson@university.edu", "+1-555-0101", "2002-03-15", "123 Oak Street, Springfield, IL 62701"),
    ("STU002", "Michael", "Chen", "michael.chen@university.edu", "+1-555-0102", "2001-07-22", "456 Maple Avenue, Springfield, IL 62702"),
    ("STU003", "Sarah", "Williams", "sarah.williams@university.edu", "+1-555-0103", "2002-11-08", "789 Pine Road, Springfield, IL 62703"),
    ("STU004", "David", "Martinez", "david.martinez@university.edu", "+1-555-0104", "2001-05-30", "321 Elm Boulevard, Springfield, IL 62704"),
    ("STU005", "Jessica", "Anderson", "jessica.anderson@university.edu", "+1-555-0105", "2002-09-17", "654 Cedar Lane, Springfield, IL 62705"),
    ("STU006", "James", "Taylor", "james.taylor@university.edu", "+1-555-0106", "2001-12-03", "987 Birch Drive, Springfield, IL 62706"),
    ("STU007", "Olivia", "Brown", "olivia.brown@university.edu", "+1-555-0107", "2002-04-25", "147 Walnut Street, Springfield, IL 62707"),
    ("STU008", "Daniel", "Garcia", "daniel.garcia@university.edu", "+1-555-0108", "2001-08-14", "258 Spruce Avenue, Springfield, IL 62708"),
    ("STU009", "Soubin", "Wilson", "sw@university.edu", "8882223344", "2002-01-19", "369 Ash Road, Springfield, IL 62709"),
    ("STU010", "Aryan", "W", "AW@university.edu", "+12567349810", "2001-06-28", "741 Hickory Boulevard, Springfield, IL 62710"),
];

struct TeacherSeed {
    username: &'static str,
    email: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    employee_id: &'static str,
    phone: &'static str,
    department: &'static str,
    course_codes: &'static [&'static str],
}

const TEACHERS: [TeacherSeed; 4] = [
    TeacherSeed {
        username: "prof.smith",
        email: "robert.smith@university.edu",
        first_name: "Robert",
        last_name: "Smith",
        employee_id: "TEACH001",
        phone: "+1-555-1001",
        department: "Computer Science",
        course_codes: &["CS101", "CS201"],
    },
    TeacherSeed {
        username: "prof.davis",
        email: "jennifer.davis@university.edu",
        first_name: "Jennifer",
        last_name: "Davis",
        employee_id: "TEACH002",
        phone: "+1-555-1002",
        department: "Computer Science",
        course_codes: &["CS301", "CS302"],
    },
    TeacherSeed {
        username: "prof.thompson",
        email: "william.thompson@university.edu",
        first_name: "William",
        last_name: "Thompson",
        employee_id: "TEACH003",
        phone: "+1-555-1003",
        department: "Mathematics",
        course_codes: &["MATH201"],
    },
    TeacherSeed {
        username: "prof.rodriguez",
        email: "maria.rodriguez@university.edu",
        first_name: "Maria",
        last_name: "Rodriguez",
        employee_id: "TEACH004",
        phone: "+1-555-1004",
        department: "Computer Science",
        course_codes: &["CS401", "CS402"],
    },
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleGpa {
    pub student_no: String,
    pub full_name: String,
    pub gpa: Gpa,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub seed: u64,
    pub courses: usize,
    pub students: usize,
    pub teachers: usize,
    pub results: usize,
    pub teacher_usernames: Vec<String>,
    pub sample_gpas: Vec<SampleGpa>,
}

/// A fresh seed that can be sent back as the integer `seed` param.
pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..=i64::MAX as u64)
}

/// Wipes students, courses, teachers, results, and users (except
/// `keep_user_id`), then loads the sample data set. Callers wrap this in a
/// transaction.
pub fn populate(
    conn: &Connection,
    seed: u64,
    keep_user_id: Option<&str>,
) -> anyhow::Result<SeedSummary> {
    clear(conn, keep_user_id)?;

    for c in &COURSES {
        conn.execute(
            "INSERT INTO courses(course_code, course_name, description, credits, semester)
             VALUES(?, ?, ?, ?, ?)",
            (c.code, c.name, c.description, c.credits, c.semester),
        )
        .with_context(|| format!("failed to insert course {}", c.code))?;
    }

    for (no, first, last, email, phone, dob, address) in STUDENTS {
        conn.execute(
            "INSERT INTO students(
               student_no, first_name, last_name, email, phone, date_of_birth, address,
               enrollment_date, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, date('now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
            (no, first, last, email, phone, dob, address),
        )
        .with_context(|| format!("failed to insert student {}", no))?;
    }

    let mut teacher_user_ids: Vec<(String, &'static [&'static str])> = Vec::new();
    for t in &TEACHERS {
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM users WHERE username = ?",
                [t.username],
                |r| r.get(0),
            )
            .optional()?;
        let user_id = match existing {
            // The caller's own account survives the wipe; reuse it.
            Some(id) => id,
            None => auth::create_user(
                conn,
                &NewUser {
                    username: t.username,
                    password: TEACHER_PASSWORD,
                    first_name: t.first_name,
                    last_name: t.last_name,
                    email: t.email,
                },
            )
            .with_context(|| format!("failed to create user {}", t.username))?,
        };
        let teacher_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO teachers(id, user_id, employee_id, phone, department) VALUES(?, ?, ?, ?, ?)",
            (&teacher_id, &user_id, t.employee_id, t.phone, t.department),
        )
        .with_context(|| format!("failed to insert teacher {}", t.employee_id))?;
        for code in t.course_codes {
            conn.execute(
                "INSERT INTO teacher_courses(teacher_id, course_code) VALUES(?, ?)",
                (&teacher_id, code),
            )?;
        }
        teacher_user_ids.push((user_id, t.course_codes));
    }

    let exam_base =
        NaiveDate::from_ymd_opt(2024, 11, 1).ok_or_else(|| anyhow!("invalid exam base date"))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut result_count = 0usize;
    for (no, ..) in STUDENTS {
        let take = rng.gen_range(4..=6);
        let picks: Vec<&CourseSeed> = COURSES.choose_multiple(&mut rng, take).collect();
        for (idx, course) in picks.into_iter().enumerate() {
            // Whole base mark plus up to +/-5.00 of jitter, clamped into range.
            let base: i64 = rng.gen_range(55..=95) * 100;
            let jitter: i64 = rng.gen_range(-500..=500);
            let hundredths = (base + jitter).clamp(0, 10_000) as u32;
            let mark = Mark::from_hundredths(hundredths)?;
            let grade = grade_for(mark);

            let created_by = teacher_user_ids
                .iter()
                .find(|(_, codes)| codes.contains(&course.code))
                .or_else(|| teacher_user_ids.first())
                .map(|(id, _)| id.clone());

            let exam_date = exam_base
                .checked_add_signed(ChronoDuration::days(7 * idx as i64))
                .ok_or_else(|| anyhow!("exam date overflow"))?;
            let remarks = format!("Exam completed on {}", exam_date.format("%B %d, %Y"));

            conn.execute(
                "INSERT INTO results(
                   id, student_no, course_code, marks, grade, exam_date, remarks, created_by,
                   created_at, updated_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?,
                   strftime('%Y-%m-%dT%H:%M:%SZ','now'), strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
                (
                    Uuid::new_v4().to_string(),
                    no,
                    course.code,
                    mark.hundredths(),
                    grade.as_str(),
                    exam_date.format("%Y-%m-%d").to_string(),
                    &remarks,
                    created_by,
                ),
            )
            .with_context(|| format!("failed to insert result {} {}", no, course.code))?;
            result_count += 1;
        }
    }

    let mut sample_gpas = Vec::new();
    for (no, first, last, ..) in STUDENTS.iter().take(SAMPLE_GPA_STUDENTS) {
        sample_gpas.push(SampleGpa {
            student_no: no.to_string(),
            full_name: format!("{} {}", first, last),
            gpa: records::student_gpa(conn, no)?,
        });
    }

    Ok(SeedSummary {
        seed,
        courses: COURSES.len(),
        students: STUDENTS.len(),
        teachers: TEACHERS.len(),
        results: result_count,
        teacher_usernames: TEACHERS.iter().map(|t| t.username.to_string()).collect(),
        sample_gpas,
    })
}

fn clear(conn: &Connection, keep_user_id: Option<&str>) -> anyhow::Result<()> {
    for table in ["results", "teacher_courses", "teachers", "courses", "students"] {
        conn.execute(&format!("DELETE FROM {}", table), [])
            .with_context(|| format!("failed to clear {}", table))?;
    }
    match keep_user_id {
        Some(id) => conn.execute("DELETE FROM users WHERE id <> ?", [id]),
        None => conn.execute("DELETE FROM users", []),
    }
    .context("failed to clear users")?;
    Ok(())
}
