//! Daily reminder resolution engine.
//!
//! Once per day the engine scans the appointments tab, classifies every row
//! against "today", resolves the recipient through the identity store and
//! attempts delivery. A "chat not found" failure produces exactly one row in
//! the undelivered audit tab; no failure of one entry ever aborts the scan.

use crate::config::Tabs;
use crate::messages;
use crate::messenger::{Destination, Messenger, SendError};
use crate::model::{AppointmentEntry, ReminderKind};
use crate::sheets::{read_entries, SheetsGateway};
use crate::store;
use anyhow::Result;
use chrono::{Duration, Months, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use teloxide::types::InlineKeyboardMarkup;
use tracing::{info, instrument, warn};

/// What the daily scan decided for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    AppointmentTomorrow,
    SixMonthRecall,
    NoAction,
}

/// Classify an entry date against today. "Tomorrow" is checked first and
/// short-circuits. Six-month recall uses calendar-month arithmetic: adding 6
/// months to the entry date must land exactly on today. `checked_add_months`
/// clamps an overflowing day-of-month to the last valid day (31.08 + 6 months
/// is 28.02 or 29.02), which is the rollover rule this crate commits to.
pub fn classify(entry_date: NaiveDate, today: NaiveDate) -> Classification {
    if entry_date == today + Duration::days(1) {
        return Classification::AppointmentTomorrow;
    }
    if entry_date.checked_add_months(Months::new(6)) == Some(today) {
        return Classification::SixMonthRecall;
    }
    Classification::NoAction
}

/// Body of the "you have an appointment tomorrow" reminder.
pub fn appointment_text(when: NaiveDateTime) -> String {
    format!(
        "Здравствуйте! Вы записаны на завтра {}г в клинику «Голден Дент» на прием в {} 🕥",
        when.format("%d.%m.%Y"),
        when.format("%H:%M")
    )
}

/// Counters reported after one daily run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DailySummary {
    pub scanned: usize,
    pub sent: usize,
    pub undelivered: usize,
    pub failed: usize,
}

/// One daily run over a fresh snapshot of the appointments tab.
#[instrument(skip_all, fields(%today))]
pub async fn run_daily(
    pool: &SqlitePool,
    sheets: &dyn SheetsGateway,
    messenger: &dyn Messenger,
    tabs: &Tabs,
    tz: Tz,
    today: NaiveDate,
) -> Result<DailySummary> {
    let entries = read_entries(sheets, &tabs.appointments).await?;
    let mut summary = DailySummary {
        scanned: entries.len(),
        ..Default::default()
    };

    for entry in &entries {
        match classify(entry.when.date(), today) {
            Classification::AppointmentTomorrow => {
                send_reminder(
                    pool,
                    sheets,
                    messenger,
                    &tabs.undelivered,
                    tz,
                    entry,
                    ReminderKind::Appointment,
                    &appointment_text(entry.when),
                    messages::appointment_keyboard(),
                    &mut summary,
                )
                .await?;
            }
            Classification::SixMonthRecall => {
                send_reminder(
                    pool,
                    sheets,
                    messenger,
                    &tabs.undelivered,
                    tz,
                    entry,
                    ReminderKind::SixMonth,
                    messages::MAIN_MESSAGE,
                    messages::main_keyboard(),
                    &mut summary,
                )
                .await?;
            }
            Classification::NoAction => {}
        }
    }

    info!(
        scanned = summary.scanned,
        sent = summary.sent,
        undelivered = summary.undelivered,
        failed = summary.failed,
        "daily reminder run finished"
    );
    Ok(summary)
}

/// Resolve one recipient and attempt delivery. Store lookups propagate
/// (identity state is load-bearing); delivery failures are absorbed here.
#[allow(clippy::too_many_arguments)]
async fn send_reminder(
    pool: &SqlitePool,
    sheets: &dyn SheetsGateway,
    messenger: &dyn Messenger,
    undelivered_tab: &str,
    tz: Tz,
    entry: &AppointmentEntry,
    kind: ReminderKind,
    text: &str,
    keyboard: InlineKeyboardMarkup,
    summary: &mut DailySummary,
) -> Result<()> {
    let destination = match store::get_chat_id(pool, &entry.handle).await? {
        Some(chat_id) => Destination::Chat(chat_id),
        None => Destination::fallback(&entry.handle),
    };

    match messenger.send(&destination, text, Some(keyboard)).await {
        Ok(()) => {
            summary.sent += 1;
        }
        Err(SendError::ChatNotFound(reason)) => {
            warn!(handle = %entry.handle, kind = kind.as_str(), %reason, "recipient unknown to Telegram");
            summary.undelivered += 1;
            log_undelivered(sheets, undelivered_tab, tz, &entry.handle, kind, &reason).await;
        }
        Err(SendError::Other(reason)) => {
            warn!(handle = %entry.handle, kind = kind.as_str(), %reason, "failed to send reminder");
            summary.failed += 1;
        }
    }
    Ok(())
}

/// Append one undelivered audit row. The audit sink being unreachable must
/// never block the reminder flow, so failures are only logged.
async fn log_undelivered(
    sheets: &dyn SheetsGateway,
    undelivered_tab: &str,
    tz: Tz,
    handle: &str,
    kind: ReminderKind,
    reason: &str,
) {
    let now_str = Utc::now()
        .with_timezone(&tz)
        .format("%d.%m.%Y %H:%M")
        .to_string();
    let row = vec![
        now_str,
        handle.to_string(),
        kind.as_str().to_string(),
        reason.to_string(),
    ];
    if let Err(err) = sheets.append_row(undelivered_tab, &row).await {
        warn!(?err, handle, "failed to append undelivered audit row");
    }
}

/// Per-row classification report behind `/test_daily_debug`.
pub fn daily_debug_report(today: NaiveDate, tab: &str, entries: &[AppointmentEntry]) -> String {
    let tomorrow = today + Duration::days(1);
    let mut lines = vec![
        format!("Сегодня: {}", today.format("%d.%m.%Y")),
        format!("Завтра: {}", tomorrow.format("%d.%m.%Y")),
        format!("Лист: {}", tab),
        String::new(),
    ];

    for (i, entry) in entries.iter().enumerate() {
        let reason = match classify(entry.when.date(), today) {
            Classification::AppointmentTomorrow => "OK: напоминание на завтра",
            Classification::SixMonthRecall => "OK: 6-месячное напоминание",
            Classification::NoAction => "NO: не завтра и не 6 месяцев",
        };
        lines.push(format!(
            "{}) {} | {} | {}",
            i + 1,
            entry.when.format("%d.%m.%Y %H:%M"),
            entry.handle,
            reason
        ));
    }

    if entries.is_empty() {
        lines.push("Нет валидных строк (проверь формат даты и username).".to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn classifies_tomorrow_six_month_and_no_action() {
        let today = d(2026, 2, 10);
        assert_eq!(
            classify(d(2026, 2, 11), today),
            Classification::AppointmentTomorrow
        );
        assert_eq!(classify(d(2025, 8, 10), today), Classification::SixMonthRecall);
        assert_eq!(classify(d(2026, 2, 12), today), Classification::NoAction);
    }

    #[test]
    fn six_month_arithmetic_clamps_end_of_month() {
        // 31.08.2025 + 6 months clamps to 28.02.2026.
        assert_eq!(
            classify(d(2025, 8, 31), d(2026, 2, 28)),
            Classification::SixMonthRecall
        );
        // Jan 31 + 6 months lands on Jul 31 without clamping.
        assert_eq!(
            classify(d(2026, 1, 31), d(2026, 7, 31)),
            Classification::SixMonthRecall
        );
        assert_eq!(
            classify(d(2025, 8, 31), d(2026, 3, 1)),
            Classification::NoAction
        );
    }

    #[test]
    fn appointment_text_carries_local_date_and_time() {
        let when = d(2026, 2, 11).and_hms_opt(10, 30, 0).unwrap();
        let text = appointment_text(when);
        assert!(text.contains("11.02.2026"));
        assert!(text.contains("10:30"));
    }

    #[test]
    fn debug_report_lists_each_entry() {
        let entries = vec![
            AppointmentEntry {
                when: d(2026, 2, 11).and_hms_opt(10, 0, 0).unwrap(),
                handle: "@alice".into(),
            },
            AppointmentEntry {
                when: d(2026, 2, 20).and_hms_opt(9, 0, 0).unwrap(),
                handle: "bob".into(),
            },
        ];
        let report = daily_debug_report(d(2026, 2, 10), "Записи для бота", &entries);
        assert!(report.contains("1) 11.02.2026 10:00 | @alice | OK: напоминание на завтра"));
        assert!(report.contains("2) 20.02.2026 09:00 | bob | NO: не завтра и не 6 месяцев"));
    }

    #[test]
    fn debug_report_mentions_empty_sheet() {
        let report = daily_debug_report(d(2026, 2, 10), "Записи для бота", &[]);
        assert!(report.contains("Нет валидных строк"));
    }
}
