//! Job records and the registry that tracks them

pub mod record;
pub mod registry;

pub use record::{JobRecord, JobStatus};
pub use registry::{BatchSummary, JobKey, JobRegistry};
