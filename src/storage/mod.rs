//! SQLite persistence for tracked feed items.
//!
//! [`Database`] owns the pool and serves the read-only selections;
//! [`Session`] wraps one transaction and carries every write of a pipeline
//! step, committed once at the end of the step.

mod items;
mod schema;
mod types;

pub use items::Session;
pub use schema::Database;
pub use types::{
    DatabaseError, Enrichment, NewItem, ProcessFlag, PublishState, StatusCounts, TrackedItem,
    MAX_ATTEMPTS,
};
