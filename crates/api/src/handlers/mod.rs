pub mod jobs;
pub mod presets;
