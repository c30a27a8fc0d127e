//! Delivery seam between the reminder engine and the Telegram bot.
//!
//! Jobs and the daily engine talk to a [`Messenger`] trait object so tests can
//! record sends; the real implementation wraps a teloxide [`Bot`] and maps its
//! errors into a structured [`SendError`] so the "chat not found" class is a
//! matched variant, not a string probe at the call site.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, Recipient};
use teloxide::{ApiError, RequestError};
use thiserror::Error;

/// Delivery failure classes the engine distinguishes.
#[derive(Debug, Error)]
pub enum SendError {
    /// The messaging channel does not know the recipient; triggers one
    /// undelivered audit row.
    #[error("chat not found: {0}")]
    ChatNotFound(String),
    #[error("{0}")]
    Other(String),
}

/// Where a message goes: a resolved chat id, or a best-effort raw handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Chat(i64),
    Handle(String),
}

impl Destination {
    /// Best-effort address for a handle the store could not resolve: numeric
    /// text is used as a chat id, `@`-prefixed text as-is, anything else gets
    /// the `@` prepended.
    pub fn fallback(handle: &str) -> Self {
        let trimmed = handle.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Destination::Chat(id);
        }
        if trimmed.starts_with('@') {
            Destination::Handle(trimmed.to_string())
        } else {
            Destination::Handle(format!("@{}", trimmed))
        }
    }

    fn to_recipient(&self) -> Recipient {
        match self {
            Destination::Chat(id) => Recipient::Id(ChatId(*id)),
            Destination::Handle(handle) => Recipient::ChannelUsername(handle.clone()),
        }
    }
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(
        &self,
        to: &Destination,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), SendError>;
}

/// Production messenger backed by the bot session.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(
        &self,
        to: &Destination,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), SendError> {
        let mut req = self.bot.send_message(to.to_recipient(), text);
        if let Some(kb) = keyboard {
            req = req.reply_markup(kb);
        }
        req.await.map(|_| ()).map_err(classify_error)
    }
}

fn classify_error(err: RequestError) -> SendError {
    match &err {
        RequestError::Api(ApiError::ChatNotFound) => SendError::ChatNotFound(err.to_string()),
        _ => {
            let text = err.to_string();
            // Older/odd API strings still report the same class in prose.
            if text.to_lowercase().contains("chat not found") {
                SendError::ChatNotFound(text)
            } else {
                SendError::Other(text)
            }
        }
    }
}
