use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Process Flag
// ============================================================================

/// Number of failed attempts after which an item is abandoned for good.
pub const MAX_ATTEMPTS: i64 = 10;

/// Retry/terminal state counter stored in `tracked_items.process_flag`.
///
/// - `0`: newly ingested, never attempted
/// - `1..=9`: consecutive failures (enrichment or publish), still retryable
/// - `10`: abandoned, excluded from every selection
/// - `-1`: published
///
/// The only ways to move a flag are [`after_failure`](Self::after_failure) and
/// [`after_success`](Self::after_success). Both are the identity on terminal
/// flags, so a flag never decreases and never leaves `-1` or `10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessFlag(i64);

/// Decoded view of a [`ProcessFlag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Pending,
    Retrying(u8),
    Done,
    Abandoned,
}

impl ProcessFlag {
    pub const PENDING: Self = Self(0);
    pub const DONE: Self = Self(-1);
    pub const ABANDONED: Self = Self(MAX_ATTEMPTS);

    /// Wrap a raw column value. Anything below zero is treated as done and
    /// anything at or above the ceiling as abandoned by [`state`](Self::state).
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn state(self) -> PublishState {
        match self.0 {
            v if v < 0 => PublishState::Done,
            0 => PublishState::Pending,
            v if v >= MAX_ATTEMPTS => PublishState::Abandoned,
            v => PublishState::Retrying(v as u8),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self.state(), PublishState::Done | PublishState::Abandoned)
    }

    /// Flag after one more failed attempt.
    pub fn after_failure(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self((self.0 + 1).min(MAX_ATTEMPTS))
        }
    }

    /// Flag after a successful publish.
    pub fn after_success(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::DONE
        }
    }
}

impl Default for ProcessFlag {
    fn default() -> Self {
        Self::PENDING
    }
}

impl fmt::Display for ProcessFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// A feed entry about to be stored for the first time.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub url: String,
}

/// Fields produced by a successful enrichment, applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub content: String,
    pub image: Vec<u8>,
    pub image_name: String,
}

/// Internal row type for item queries (used by sqlx FromRow)
/// Converts to TrackedItem via into_item()
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TrackedItemRow {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub content: String,
    pub image: Vec<u8>,
    pub image_name: String,
    pub process_flag: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub published_at: Option<i64>,
}

impl TrackedItemRow {
    pub(crate) fn into_item(self) -> TrackedItem {
        TrackedItem {
            id: self.id,
            title: self.title,
            url: self.url,
            content: self.content,
            image: self.image,
            image_name: self.image_name,
            process_flag: ProcessFlag::from_raw(self.process_flag),
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            published_at: self.published_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A feed entry tracked through enrichment and publishing.
///
/// `url` is the dedup key and never changes after insert. `content`, `image`
/// and `image_name` stay empty until enrichment succeeds.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub content: String,
    pub image: Vec<u8>,
    pub image_name: String,
    pub process_flag: ProcessFlag,
    /// Reason for the most recent failure, cleared once published.
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub published_at: Option<i64>,
}

/// Image bytes are summarized to keep log and assertion output readable.
impl fmt::Debug for TrackedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedItem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("url", &self.url)
            .field("content_len", &self.content.len())
            .field("image_len", &self.image.len())
            .field("image_name", &self.image_name)
            .field("process_flag", &self.process_flag)
            .field("last_error", &self.last_error)
            .field("published_at", &self.published_at)
            .finish()
    }
}

/// Row counts per publish state, logged at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub retrying: i64,
    pub done: i64,
    pub abandoned: i64,
}
