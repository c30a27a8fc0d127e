//! Timer-driven side of the bot: the daily reminder loop and the durable
//! keyed one-shot reminders ("remind in 2 weeks", 3-day activation follow-up).
//!
//! One-shot reminders live as rows in `scheduled_jobs`; arming is an upsert on
//! the job key, so re-arming replaces the prior timer and rows survive process
//! restarts without double-firing. A polling worker loop fires due rows, the
//! same shape as a task-queue worker.

use crate::context::AppContext;
use crate::messages;
use crate::messenger::{Destination, Messenger};
use crate::model::JobKind;
use crate::reminders;
use crate::store;
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{error, info, instrument, warn};

pub fn two_week_job_key(chat_id: i64) -> String {
    format!("remind_2w:{}", chat_id)
}

pub fn activation_job_key(user_id: i64) -> String {
    format!("activation:{}", user_id)
}

/// Arm the "remind me in 2 weeks" reminder for a chat. Re-pressing the button
/// moves the timer instead of stacking a second one.
pub async fn arm_two_week_reminder(
    pool: &SqlitePool,
    chat_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    store::schedule_job(
        pool,
        &two_week_job_key(chat_id),
        JobKind::RemindTwoWeeks,
        chat_id,
        now + Duration::days(14),
    )
    .await
}

/// Arm the 3-day follow-up after a user's first activation. Callers gate this
/// on `store::mark_activated` returning true.
pub async fn arm_activation_follow_up(
    pool: &SqlitePool,
    user_id: i64,
    chat_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    store::schedule_job(
        pool,
        &activation_job_key(user_id),
        JobKind::ActivationFollowUp,
        chat_id,
        now + Duration::days(3),
    )
    .await
}

/// Fire every due one-shot job once. A fired job is deleted even when the
/// send fails; these reminders are best-effort and never retried.
#[instrument(skip_all)]
pub async fn process_due_jobs(pool: &SqlitePool, messenger: &dyn Messenger) -> Result<usize> {
    let due = store::due_jobs(pool).await?;
    let count = due.len();
    for job in due {
        let (text, keyboard) = match job.kind {
            JobKind::RemindTwoWeeks => (messages::MAIN_MESSAGE, messages::main_keyboard()),
            JobKind::ActivationFollowUp => (messages::START_MESSAGE, messages::main_keyboard()),
        };
        match messenger
            .send(&Destination::Chat(job.chat_id), text, Some(keyboard))
            .await
        {
            Ok(()) => info!(job_key = %job.job_key, "one-shot reminder sent"),
            Err(err) => warn!(%err, job_key = %job.job_key, "one-shot reminder failed"),
        }
        store::delete_job(pool, &job.job_key).await?;
    }
    Ok(count)
}

/// Next wall-clock occurrence of `hour:minute` strictly after `now`, in the
/// timezone `now` carries. A local time skipped by a DST gap rolls to the
/// next day.
pub fn next_daily_run(now: DateTime<Tz>, hour: u32, minute: u32) -> DateTime<Tz> {
    let tz = now.timezone();
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let mut date = now.date_naive();
    loop {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            if candidate > now {
                return candidate;
            }
        }
        date += Duration::days(1);
    }
}

/// Worker loop polling for due one-shot reminders.
pub async fn run_job_worker(pool: SqlitePool, messenger: Arc<dyn Messenger>, poll: StdDuration) {
    loop {
        if let Err(err) = process_due_jobs(&pool, messenger.as_ref()).await {
            error!(?err, "one-shot job worker error");
        }
        tokio::time::sleep(poll).await;
    }
}

/// Loop firing the daily reminder run at the configured local time.
pub async fn run_daily_loop(ctx: Arc<AppContext>) {
    loop {
        let now = Utc::now().with_timezone(&ctx.tz);
        let next = next_daily_run(now, ctx.cfg.app.daily_hour, ctx.cfg.app.daily_minute);
        info!(next = %next, "next daily reminder run scheduled");
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        let today = Utc::now().with_timezone(&ctx.tz).date_naive();
        match reminders::run_daily(
            &ctx.pool,
            ctx.sheets.as_ref(),
            ctx.messenger.as_ref(),
            &ctx.cfg.sheets.tabs,
            ctx.tz,
            today,
        )
        .await
        {
            Ok(summary) => info!(?summary, "daily run complete"),
            Err(err) => error!(?err, "daily reminder run failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Novosibirsk;

    #[test]
    fn next_run_today_when_clock_not_passed() {
        let now = Novosibirsk.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap();
        let next = next_daily_run(now, 9, 0);
        assert_eq!(
            next,
            Novosibirsk.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_run_tomorrow_when_clock_passed() {
        let now = Novosibirsk.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap();
        let next = next_daily_run(now, 9, 0);
        assert_eq!(
            next,
            Novosibirsk.with_ymd_and_hms(2026, 2, 11, 9, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn arming_twice_keeps_one_job() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let t0 = Utc::now() - Duration::days(20);
        arm_two_week_reminder(&pool, 7, t0).await.unwrap();
        arm_two_week_reminder(&pool, 7, t0 + Duration::days(1))
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let due = store::due_jobs(&pool).await.unwrap();
        assert_eq!(due.len(), 1);
        let drift = due[0].run_at - (t0 + Duration::days(15));
        assert_eq!(drift.num_seconds(), 0);
    }
}
