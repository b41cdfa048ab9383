pub mod job;
pub mod job_item;
pub mod preset;
pub mod status;
