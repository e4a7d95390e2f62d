pub mod cache_key;
pub mod extractors;
pub mod moderation;
pub mod models;
pub mod runner;
pub mod store;
pub mod streamer;

pub use models::{Artifact, Job, JobStatus};
pub use runner::JobRunner;
pub use store::{CreateJobOutcome, JobStore};
