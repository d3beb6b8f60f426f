//! Castpod Telegram Bot
//!
//! Main application entry point

use chrono::FixedOffset;
use tracing::{info, warn};

use castpod::{
    config::Settings,
    ext::{persistence, ApplicationBuilder},
    handlers,
    types::ParseMode,
    utils::logging,
    Defaults,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("No .env file loaded: {}", e);
    }

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging, the guard flushes the log file on exit
    let _guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", castpod::info());

    let mut defaults = Defaults::default();
    if let Some(parse_mode) = &settings.bot.parse_mode {
        defaults.parse_mode = Some(
            parse_mode
                .parse::<ParseMode>()
                .map_err(anyhow::Error::msg)?,
        );
    }
    if let Some(tz) = FixedOffset::east_opt(settings.bot.tz_offset_hours * 3600) {
        defaults = defaults.with_tz(tz);
    }

    let mut builder = ApplicationBuilder::new()
        .token(settings.bot.token.clone())
        .defaults(defaults)
        .concurrent_updates(settings.application.concurrent_updates)
        .post_init(handlers::post_init);
    if let Some(base_url) = &settings.bot.base_url {
        builder = builder.base_url(base_url.clone());
    }
    if settings.bot.arbitrary_callback_data {
        builder = builder.arbitrary_callback_data(Some(settings.bot.callback_data_maxsize));
    }
    match persistence::from_config(&settings.persistence).await? {
        Some(persistence) => builder = builder.persistence(persistence),
        None => warn!("No persistence configured, data is lost on restart"),
    }

    let app = builder.build()?;
    handlers::register(&app, &settings.castpod)?;

    match settings.webhook_config() {
        Some(webhook) => {
            info!(listen = %webhook.listen, port = webhook.port, "Starting bot with webhook mode...");
            app.run_webhook(webhook).await?;
        }
        None => {
            info!("Starting bot with polling mode...");
            app.run_polling(settings.polling_config()).await?;
        }
    }

    info!("Castpod bot has been shut down.");
    Ok(())
}
