//! Message texts and inline keyboards shown to clinic clients.

use once_cell::sync::Lazy;
use reqwest::Url;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const MAIN_MESSAGE: &str = "Здравствуйте!\n\n\
Вас приветствует клиника «Голден Дент».\n\n\
С момента вашего последнего визита прошло 6 месяцев — это оптимальное время \
для профилактического осмотра и профессиональной гигиены.\n\n\
Будем рады видеть вас!";

pub const START_MESSAGE: &str = "Здравствуйте! Вас приветствует клиника Голден Дент!\n\n\
Готовы записаться?)";

pub const CB_REMIND_2W: &str = "remind_2w";
pub const CB_NOT_READY: &str = "not_ready";
pub const CB_CONFIRM_APPT: &str = "confirm_appt";

const CONTACT_TEXT: &str = "Здравствуйте! Я перешел от телеграмм-бота.";
const CLINIC_CHAT: &str = "https://t.me/GoldenDentNSK";

/// Deep link into the clinic chat with a prefilled greeting.
static CONTACT_URL: Lazy<Url> = Lazy::new(|| {
    Url::parse_with_params(CLINIC_CHAT, &[("text", CONTACT_TEXT)])
        .expect("valid clinic contact URL")
});

/// The 3-option keyboard attached to the main promotional message.
pub fn main_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::url(
            "1) Записаться сейчас",
            CONTACT_URL.clone(),
        )],
        vec![InlineKeyboardButton::callback(
            "2) Напомните через 2 недели",
            CB_REMIND_2W,
        )],
        vec![InlineKeyboardButton::callback(
            "3) Не готов записаться",
            CB_NOT_READY,
        )],
    ])
}

/// Confirm/reschedule keyboard attached to the appointment-tomorrow reminder.
pub fn appointment_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Подтвердить запись",
            CB_CONFIRM_APPT,
        )],
        vec![InlineKeyboardButton::url(
            "Перенести запись",
            Url::parse(CLINIC_CHAT).expect("valid clinic chat URL"),
        )],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_url_carries_prefilled_text() {
        let url = CONTACT_URL.clone();
        assert_eq!(url.host_str(), Some("t.me"));
        assert!(url.query().unwrap_or_default().starts_with("text="));
    }

    #[test]
    fn keyboards_have_expected_shape() {
        assert_eq!(main_keyboard().inline_keyboard.len(), 3);
        assert_eq!(appointment_keyboard().inline_keyboard.len(), 2);
    }
}
