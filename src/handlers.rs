//! Telegram update handlers: commands, inline-keyboard callbacks and the
//! free-text path that consumes a pending "why not" comment.

use crate::context::AppContext;
use crate::messages;
use crate::reminders;
use crate::scheduler;
use crate::sheets::{self, SheetsGateway};
use crate::store;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::User;
use teloxide::utils::command::BotCommands;
use tracing::{info, instrument, warn};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case")]
pub enum Command {
    Start,
    Whoami,
    TestMain,
    TestDaily,
    TestDailyDebug,
}

/// The dispatcher tree: commands first, then plain text, then callbacks.
pub fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback))
}

#[instrument(skip_all)]
async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    ctx: Arc<AppContext>,
) -> Result<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    record_identity(&ctx, user).await?;

    match cmd {
        Command::Start => {
            let now = Utc::now();
            let user_id = user.id.0 as i64;
            // First-ever /start arms the one-time 3-day follow-up.
            if store::mark_activated(&ctx.pool, user_id, now).await? {
                scheduler::arm_activation_follow_up(&ctx.pool, user_id, msg.chat.id.0, now)
                    .await?;
                info!(user_id, "first activation, follow-up armed");
            }
            bot.send_message(msg.chat.id, messages::START_MESSAGE)
                .reply_markup(messages::main_keyboard())
                .await?;
        }
        Command::TestMain => {
            bot.send_message(msg.chat.id, messages::START_MESSAGE)
                .reply_markup(messages::main_keyboard())
                .await?;
        }
        Command::Whoami => {
            let username = user
                .username
                .as_ref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| "нет username".to_string());
            bot.send_message(msg.chat.id, format!("Ваш username: {}", username))
                .await?;
        }
        Command::TestDaily => {
            let today = Utc::now().with_timezone(&ctx.tz).date_naive();
            reminders::run_daily(
                &ctx.pool,
                ctx.sheets.as_ref(),
                ctx.messenger.as_ref(),
                &ctx.cfg.sheets.tabs,
                ctx.tz,
                today,
            )
            .await?;
        }
        Command::TestDailyDebug => {
            let tab = &ctx.cfg.sheets.tabs.appointments;
            let today = Utc::now().with_timezone(&ctx.tz).date_naive();
            let entries = sheets::read_entries(ctx.sheets.as_ref(), tab).await?;
            let report = reminders::daily_debug_report(today, tab, &entries);
            bot.send_message(msg.chat.id, report).await?;
        }
    }
    Ok(())
}

/// Free text is only meaningful when the user owes a "why not" comment; the
/// pending flag is consumed atomically so the comment lands exactly once.
#[instrument(skip_all)]
async fn handle_message(bot: Bot, msg: Message, ctx: Arc<AppContext>) -> Result<()> {
    let (Some(user), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };
    record_identity(&ctx, user).await?;

    // Slash commands are never comments.
    if text.trim_start().starts_with('/') {
        return Ok(());
    }

    let Some(pending) = store::pop_pending(&ctx.pool, user.id.0 as i64).await? else {
        return Ok(());
    };

    let now_str = Utc::now()
        .with_timezone(&ctx.tz)
        .format("%d.%m.%Y %H:%M")
        .to_string();
    let row = vec![now_str, pending.username, text.trim().to_string()];
    if let Err(err) = ctx.sheets.append_row(&ctx.cfg.sheets.tabs.comments, &row).await {
        warn!(?err, "failed to append comment row");
    }
    bot.send_message(msg.chat.id, "Спасибо, комментарий записан!")
        .await?;
    Ok(())
}

#[instrument(skip_all)]
async fn handle_callback(bot: Bot, q: CallbackQuery, ctx: Arc<AppContext>) -> Result<()> {
    record_identity(&ctx, &q.from).await?;
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(message) = q.message else {
        return Ok(());
    };
    let chat_id = message.chat.id;

    match q.data.as_deref() {
        Some(messages::CB_REMIND_2W) => {
            bot.send_message(chat_id, "Хорошо, вернёмся через 2 недели")
                .await?;
            scheduler::arm_two_week_reminder(&ctx.pool, chat_id.0, Utc::now()).await?;
        }
        Some(messages::CB_NOT_READY) => {
            bot.send_message(chat_id, "Подскажите, пожалуйста, почему не получается?")
                .await?;
            let username = q
                .from
                .username
                .as_ref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| format!("id:{}", q.from.id));
            store::set_pending(&ctx.pool, q.from.id.0 as i64, &username, Utc::now()).await?;
        }
        Some(messages::CB_CONFIRM_APPT) => {
            bot.send_message(chat_id, "Отлично, будем ждать Вас!").await?;
        }
        _ => {}
    }
    Ok(())
}

/// Remember how to reach this user and keep the roster in sync. A roster
/// change is mirrored to the clients tab; that sink being down must not block
/// the interaction.
async fn record_identity(ctx: &AppContext, user: &User) -> Result<()> {
    let now = Utc::now();
    let user_id = user.id.0 as i64;
    match &user.username {
        Some(username) => {
            store::upsert_user(&ctx.pool, username, user_id, now).await?;
            let changed = store::upsert_client(&ctx.pool, user_id, username, now).await?;
            if changed {
                let now_str = now
                    .with_timezone(&ctx.tz)
                    .format("%d.%m.%Y %H:%M")
                    .to_string();
                let row = vec![now_str, store::normalize_handle(username)];
                if let Err(err) = ctx.sheets.append_row(&ctx.cfg.sheets.tabs.clients, &row).await
                {
                    warn!(?err, "failed to sync client roster row");
                }
            }
        }
        None => {
            if store::remove_client(&ctx.pool, user_id).await? {
                info!(user_id, "dropped roster entry, username no longer known");
            }
        }
    }
    Ok(())
}
