//! Repository layer: one zero-sized struct per table with async static methods.

pub mod job_item_repo;
pub mod job_repo;
pub mod preset_repo;

pub use job_item_repo::JobItemRepo;
pub use job_repo::SampleJobRepo;
pub use preset_repo::PresetRepo;
