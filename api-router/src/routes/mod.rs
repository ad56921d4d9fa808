pub mod probes;
pub mod video_jobs;
