pub mod ids;
pub mod record;
pub mod events;

pub use ids::JobId;
pub use record::{JobRecord, JobStatus, JobOutcome, QueueStats};
pub use events::JobEvent;
