pub mod attendance;
pub mod calendar;
pub mod classes;
pub mod core;
pub mod grades;
pub mod journal;
pub mod schedule;
pub mod setup;
pub mod students;
