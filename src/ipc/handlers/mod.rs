pub mod attendance;
pub mod auth;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod exams;
pub mod meetings;
pub mod overrides;
pub mod remarks;
pub mod substitution;
pub mod teachers;
pub mod timetable;
