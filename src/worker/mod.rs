pub mod handler;
pub mod router;
pub mod types;

pub use handler::run_job;
pub use router::worker_router;
pub use types::{JobEnvelope, JobEvent};
