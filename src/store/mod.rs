//! Local state module: identity, consent and one-shot job rows.
//!
//! This module is split into two submodules:
//! - `model`: typed rows returned by repository functions.
//! - `repo`: SQL-only functions over the SQLite pool; one transaction per
//!   logical operation so handlers and jobs can call them concurrently.
//!
//! External modules should import from `tg_clinicbot::store` — we re-export
//! the repository API and the row models for convenience.

pub mod model;
pub mod repo;

pub use model::{PendingComment, ScheduledJob};
pub use repo::*;
