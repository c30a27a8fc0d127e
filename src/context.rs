//! Explicit application context handed to every handler and job.

use crate::config::Config;
use crate::messenger::Messenger;
use crate::sheets::SheetsGateway;
use chrono_tz::Tz;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Collaborators constructed once at startup. Handlers receive this through
/// dispatcher dependency injection; jobs by cloned `Arc` — no ambient state.
pub struct AppContext {
    pub pool: SqlitePool,
    pub sheets: Arc<dyn SheetsGateway>,
    pub messenger: Arc<dyn Messenger>,
    pub cfg: Config,
    pub tz: Tz,
}
