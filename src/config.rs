//! Configuration loader and validator for the clinic reminder bot.
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub sheets: Sheets,
}

/// App-level settings: local state directory and the daily-run clock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// IANA timezone the spreadsheet dates and the daily run are interpreted in.
    pub timezone: String,
    pub daily_hour: u32,
    pub daily_minute: u32,
    /// Poll interval of the one-shot job worker, in seconds.
    pub job_poll_seconds: u64,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
}

/// Google Sheets access and tab mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sheets {
    pub spreadsheet_id: String,
    /// OAuth bearer token for the Sheets API; minting it is external.
    pub api_token: String,
    pub tabs: Tabs,
}

/// Worksheet names, independently configurable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tabs {
    pub appointments: String,
    pub undelivered: String,
    pub comments: String,
    pub clients: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Parsed timezone. `validate` guarantees this succeeds after `load`.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.app
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid("app.timezone is not a known IANA timezone"))
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    cfg.timezone()?;
    if cfg.app.daily_hour > 23 {
        return Err(ConfigError::Invalid("app.daily_hour must be 0..=23"));
    }
    if cfg.app.daily_minute > 59 {
        return Err(ConfigError::Invalid("app.daily_minute must be 0..=59"));
    }
    if cfg.app.job_poll_seconds == 0 {
        return Err(ConfigError::Invalid("app.job_poll_seconds must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }

    if cfg.sheets.spreadsheet_id.trim().is_empty() {
        return Err(ConfigError::Invalid("sheets.spreadsheet_id must be non-empty"));
    }
    if cfg.sheets.api_token.trim().is_empty() {
        return Err(ConfigError::Invalid("sheets.api_token must be non-empty"));
    }

    let tabs = &cfg.sheets.tabs;
    if tabs.appointments.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "sheets.tabs.appointments must be non-empty",
        ));
    }
    if tabs.undelivered.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "sheets.tabs.undelivered must be non-empty",
        ));
    }
    if tabs.comments.trim().is_empty() {
        return Err(ConfigError::Invalid("sheets.tabs.comments must be non-empty"));
    }
    if tabs.clients.trim().is_empty() {
        return Err(ConfigError::Invalid("sheets.tabs.clients must be non-empty"));
    }

    Ok(())
}

/// Returns the reference example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  timezone: "Asia/Novosibirsk"
  daily_hour: 9
  daily_minute: 0
  job_poll_seconds: 30

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"

sheets:
  spreadsheet_id: "YOUR_GOOGLE_SHEET_ID"
  api_token: "YOUR_SHEETS_API_BEARER_TOKEN"
  tabs:
    appointments: "Записи для бота"
    undelivered: "Не доставлено"
    comments: "Не готов записаться (комментарии)"
    clients: "БД - клиенты"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.daily_hour, 9);
        assert_eq!(cfg.sheets.tabs.undelivered, "Не доставлено");
    }

    #[test]
    fn invalid_bot_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_timezone() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.timezone = "Mars/Olympus".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_daily_clock() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.daily_hour = 24;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.daily_minute = 60;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_tab_names() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.sheets.tabs.appointments = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("appointments")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.timezone, "Asia/Novosibirsk");
        cfg.timezone().unwrap();
    }
}
