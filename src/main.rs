use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing::info;

use tg_clinicbot::config;
use tg_clinicbot::context::AppContext;
use tg_clinicbot::handlers;
use tg_clinicbot::messenger::{Messenger, TelegramMessenger};
use tg_clinicbot::scheduler;
use tg_clinicbot::sheets::{SheetsGateway, SheetsHttpClient};
use tg_clinicbot::store;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let tz = cfg.timezone()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/clinicbot.db", cfg.app.data_dir));
    let pool = store::init_pool(&database_url).await?;
    store::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let sheets: Arc<dyn SheetsGateway> = Arc::new(SheetsHttpClient::new(
        cfg.sheets.spreadsheet_id.clone(),
        cfg.sheets.api_token.clone(),
    ));

    let ctx = Arc::new(AppContext {
        pool: pool.clone(),
        sheets,
        messenger: messenger.clone(),
        cfg: cfg.clone(),
        tz,
    });

    let daily = tokio::spawn(scheduler::run_daily_loop(ctx.clone()));
    let jobs = tokio::spawn(scheduler::run_job_worker(
        pool,
        messenger,
        Duration::from_secs(cfg.app.job_poll_seconds),
    ));

    info!("starting telegram bot");
    Dispatcher::builder(bot, handlers::schema())
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Dispatch ended (ctrl-c); stop the timer loops best-effort.
    daily.abort();
    jobs.abort();
    Ok(())
}
