pub mod config;
pub mod job_signal;
