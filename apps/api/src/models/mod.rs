pub mod education;
pub mod job;
pub mod resume;
