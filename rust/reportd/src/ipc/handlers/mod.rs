pub mod backup;
pub mod core;
pub mod marks;
pub mod performance;
pub mod rankings;
pub mod reports;
pub mod settings;
pub mod students;
pub mod teachers;
