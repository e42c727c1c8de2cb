//! Domain models.

mod crawl_state;
mod outcome;
mod record;
mod summary;

pub use crawl_state::{CrawlState, TargetStatus};
pub use outcome::{Outcome, OutcomeKind};
pub use record::{supersedes, Record, StoredRecord};
pub use summary::{PassKind, RunSummary};
