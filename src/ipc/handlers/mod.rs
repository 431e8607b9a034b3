pub mod auth;
pub mod backup;
pub mod core;
pub mod courses;
pub mod dashboard;
pub mod grades;
pub mod results;
pub mod seed;
pub mod students;
pub mod teachers;
