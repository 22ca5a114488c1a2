pub mod error;
pub mod job;
pub mod job_state;
pub mod realtime;
pub mod stage_labels;
pub mod status;
pub mod step_outcome;
pub mod types;
