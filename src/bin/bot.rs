use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use reminder_bot::connectors::{make_connector, Connector};
use reminder_bot::core::{Clock, Config, SystemClock};
use reminder_bot::features::reminders::{ReminderScheduler, ReminderService, SchedulerConfig};
use reminder_bot::store;

/// Poll the connector and answer reminder commands until the future is dropped
async fn message_loop(connector: Arc<dyn Connector>, service: ReminderService, poll_interval: Duration) {
    let platform = connector.name();

    loop {
        match connector.get_new_messages().await {
            Ok(messages) => {
                for message in messages {
                    info!(
                        "💬 Message from {} in {}: {}",
                        message.sender_id, message.thread_id, message.text
                    );

                    let reply = match service.handle_message(platform, &message).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            error!("Failed to handle message from {}: {e:#}", message.sender_id);
                            continue;
                        }
                    };

                    if let Some(reply) = reply {
                        match connector.send_message(&message.thread_id, &reply).await {
                            Ok(()) => info!("📤 Replied in {}: {}", message.thread_id, reply),
                            Err(e) => error!("Failed to reply in {}: {e:#}", message.thread_id),
                        }
                    }
                }
            }
            Err(e) => warn!("Polling {platform} failed: {e:#}"),
        }

        tokio::time::sleep(poll_interval).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting reminder bot...");

    let store = store::from_config(&config)?;
    info!("🗄️ Using {} state store", store.name());

    let connector = make_connector(&config)?;
    if connector.health_check().await {
        info!("✅ Connector '{}' is ready", connector.name());
    } else {
        warn!(
            "⚠️ Connector '{}' is not ready yet, continuing and retrying",
            connector.name()
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Start the reminder scheduler
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        connector.clone().as_sink(),
        clock.clone(),
        SchedulerConfig::from_config(&config),
    ));
    let mut scheduler_handle = scheduler.start()?;

    // Periodic connector health check
    if let Some(every) = config.canary_interval {
        let canary = connector.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let ok = canary.health_check().await;
                info!("🔎 Health check: {}", if ok { "OK" } else { "FAIL" });
            }
        });
    }

    let service = ReminderService::new(store, clock);

    tokio::select! {
        _ = message_loop(connector, service, config.poll_interval) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutdown requested");
        }
    }

    if !scheduler_handle.stop(config.shutdown_grace).await {
        warn!("Reminder scheduler was stopped forcefully");
    }
    info!("🛑 Bot stopped");

    Ok(())
}
