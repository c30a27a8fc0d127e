use chrono::{Duration, Utc};
use tempfile::tempdir;
use tg_clinicbot::scheduler;
use tg_clinicbot::store;

/// Identity and job state must survive a process restart: write through one
/// pool, reopen the same file, read everything back.
#[tokio::test]
async fn file_backed_state_survives_reopen() {
    let td = tempdir().unwrap();
    let url = format!("sqlite://{}/state.db", td.path().display());
    let now = Utc::now();

    let pool = store::init_pool(&url).await.unwrap();
    store::run_migrations(&pool).await.unwrap();

    store::upsert_user(&pool, "Alice", 111, now).await.unwrap();
    store::set_pending(&pool, 42, "@alice", now).await.unwrap();
    assert!(store::mark_activated(&pool, 42, now).await.unwrap());
    scheduler::arm_two_week_reminder(&pool, 111, now - Duration::days(15))
        .await
        .unwrap();
    pool.close().await;

    let pool = store::init_pool(&url).await.unwrap();
    store::run_migrations(&pool).await.unwrap();

    assert_eq!(store::get_chat_id(&pool, "@ALICE").await.unwrap(), Some(111));
    assert!(!store::mark_activated(&pool, 42, Utc::now()).await.unwrap());

    let pending = store::pop_pending(&pool, 42).await.unwrap().unwrap();
    assert_eq!(pending.username, "@alice");
    assert!(store::pop_pending(&pool, 42).await.unwrap().is_none());

    // The armed job is still there and already due.
    let due = store::due_jobs(&pool).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].job_key, "remind_2w:111");
    assert_eq!(due[0].chat_id, 111);
}

#[tokio::test]
async fn resolution_is_last_write_wins_across_handle_spellings() {
    let td = tempdir().unwrap();
    let url = format!("sqlite://{}/state.db", td.path().display());
    let pool = store::init_pool(&url).await.unwrap();
    store::run_migrations(&pool).await.unwrap();

    let now = Utc::now();
    store::upsert_user(&pool, "bob", 1, now).await.unwrap();
    store::upsert_user(&pool, "@Bob", 2, now).await.unwrap();
    store::upsert_user(&pool, " BOB ", 3, now).await.unwrap();

    // All spellings are one key; the most recent write wins.
    assert_eq!(store::get_chat_id(&pool, "bob").await.unwrap(), Some(3));
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_map")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
