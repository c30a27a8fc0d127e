use super::model::{PendingComment, ScheduledJob};
use crate::model::JobKind;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    } else {
        // Create the database file on first run.
        rebuilt.push_str("?mode=rwc");
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Normalize a spreadsheet/Telegram handle for use as a lookup key: trim,
/// prefix `@` if missing, lowercase. Empty input stays empty. Idempotent.
pub fn normalize_handle(handle: &str) -> String {
    let trimmed = handle.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('@') {
        trimmed.to_lowercase()
    } else {
        format!("@{}", trimmed).to_lowercase()
    }
}

/// Record the chat id a handle was last seen from. Last write wins; a handle
/// that normalizes to empty is ignored.
#[instrument(skip_all)]
pub async fn upsert_user(
    pool: &Pool,
    handle: &str,
    chat_id: i64,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    let normalized = normalize_handle(handle);
    if normalized.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO user_map (username, chat_id, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(username) DO UPDATE SET \
             chat_id = excluded.chat_id, \
             updated_at = excluded.updated_at",
    )
    .bind(&normalized)
    .bind(chat_id)
    .bind(updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Resolve a handle to the most recently recorded chat id, if any.
#[instrument(skip_all)]
pub async fn get_chat_id(pool: &Pool, handle: &str) -> Result<Option<i64>> {
    let normalized = normalize_handle(handle);
    if normalized.is_empty() {
        return Ok(None);
    }
    let id = sqlx::query_scalar::<_, i64>("SELECT chat_id FROM user_map WHERE username = ?")
        .bind(&normalized)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Flag a user as owing a free-text reason; replaces any prior flag.
#[instrument(skip_all)]
pub async fn set_pending(
    pool: &Pool,
    user_id: i64,
    username: &str,
    created_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO pending_comment (user_id, username, created_at) VALUES (?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             username = excluded.username, \
             created_at = excluded.created_at",
    )
    .bind(user_id)
    .bind(username)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomic read-and-clear of the pending flag. A second call returns `None`.
#[instrument(skip_all)]
pub async fn pop_pending(pool: &Pool, user_id: i64) -> Result<Option<PendingComment>> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "SELECT user_id, username, created_at FROM pending_comment WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM pending_comment WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(Some(PendingComment {
        user_id: row.get("user_id"),
        username: row.get("username"),
        created_at: row.get("created_at"),
    }))
}

/// Returns true only on the first call for a given user; later calls leave
/// the stored activation timestamp untouched.
#[instrument(skip_all)]
pub async fn mark_activated(pool: &Pool, user_id: i64, activated_at: DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let exists = sqlx::query_scalar::<_, i64>("SELECT 1 FROM user_activation WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
    if exists {
        return Ok(false);
    }
    sqlx::query("INSERT INTO user_activation (user_id, activated_at) VALUES (?, ?)")
        .bind(user_id)
        .bind(activated_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(true)
}

/// Track the roster entry for a numeric user id. Returns true iff the tracked
/// normalized handle changed (new user or renamed).
#[instrument(skip_all)]
pub async fn upsert_client(
    pool: &Pool,
    user_id: i64,
    handle: &str,
    updated_at: DateTime<Utc>,
) -> Result<bool> {
    let normalized = normalize_handle(handle);
    if normalized.is_empty() {
        return Ok(false);
    }
    let mut tx = pool.begin().await?;
    let current = sqlx::query_scalar::<_, String>("SELECT username FROM client_map WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    let changed = current.as_deref() != Some(normalized.as_str());
    sqlx::query(
        "INSERT INTO client_map (user_id, username, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             username = excluded.username, \
             updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(&normalized)
    .bind(updated_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(changed)
}

/// Drop a roster entry; true if a row was actually removed.
#[instrument(skip_all)]
pub async fn remove_client(pool: &Pool, user_id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM client_map WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn list_client_usernames(pool: &Pool) -> Result<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT username FROM client_map ORDER BY username",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Arm (or re-arm) a keyed one-shot job. Re-arming the same key replaces the
/// previous row: last arm wins, never two fires for one key.
#[instrument(skip_all)]
pub async fn schedule_job(
    pool: &Pool,
    job_key: &str,
    kind: JobKind,
    chat_id: i64,
    run_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO scheduled_jobs (job_key, kind, chat_id, run_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(job_key) DO UPDATE SET \
             kind = excluded.kind, \
             chat_id = excluded.chat_id, \
             run_at = excluded.run_at",
    )
    .bind(job_key)
    .bind(kind.as_str())
    .bind(chat_id)
    .bind(run_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn due_jobs(pool: &Pool) -> Result<Vec<ScheduledJob>> {
    let rows = sqlx::query(
        "SELECT job_key, kind, chat_id, run_at FROM scheduled_jobs \
         WHERE datetime(run_at) <= CURRENT_TIMESTAMP \
         ORDER BY datetime(run_at) ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut jobs = Vec::with_capacity(rows.len());
    for row in rows {
        let kind_str: String = row.get("kind");
        let kind = JobKind::parse_kind(&kind_str)
            .ok_or_else(|| anyhow!("scheduled job has unknown kind {}", kind_str))?;
        jobs.push(ScheduledJob {
            job_key: row.get("job_key"),
            kind,
            chat_id: row.get("chat_id"),
            run_at: row.get("run_at"),
        });
    }
    Ok(jobs)
}

#[instrument(skip_all)]
pub async fn delete_job(pool: &Pool, job_key: &str) -> Result<()> {
    sqlx::query("DELETE FROM scheduled_jobs WHERE job_key = ?")
        .bind(job_key)
        .execute(pool)
        .await?;
    Ok(())
}
