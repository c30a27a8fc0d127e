//! Rows returned by the state repository.

use crate::model::JobKind;
use chrono::{DateTime, Utc};

/// An outstanding "awaiting free-text reason" flag for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingComment {
    pub user_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A keyed one-shot reminder waiting to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job_key: String,
    pub kind: JobKind,
    pub chat_id: i64,
    pub run_at: DateTime<Utc>,
}
