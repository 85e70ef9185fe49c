mod alerts;
mod config;
mod db;
mod geo;
mod kafka;
mod location;
mod models;
mod monitor;
mod processor;
mod trigger;
mod zones;

use alerts::dispatcher::AlertDispatcher;
use alerts::LogAlertSink;
use chrono::Utc;
use config::{AppConfig, StorageKind};
use db::memory::MemoryStore;
use db::postgres::PgStore;
use db::Stores;
use kafka::KafkaAlertSink;
use monitor::JourneyMonitor;
use processor::message_processor;
use processor::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use trigger::TriggerDetector;
use zones::ZoneScorer;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting Safe Journey session for device {}", config.device_id);

    let stores = match config.storage {
        StorageKind::Postgres => {
            let pool = db::init_pool(&config.database_url).await?;
            info!("Connected to database");
            db::migrate(&pool).await?;
            Stores::from_backend(Arc::new(PgStore::new(pool)))
        }
        StorageKind::Memory => {
            warn!("Using in-memory storage, state is lost on exit");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    let zones = Arc::new(ZoneScorer::new(stores.zones.clone(), config.zone_search_radius_km));
    let mut dispatcher = AlertDispatcher::new(
        &config.device_id,
        stores.contacts.clone(),
        stores.events.clone(),
        zones.clone(),
    );
    dispatcher.add_sink(Arc::new(LogAlertSink));
    match KafkaAlertSink::new(&config) {
        Ok(sink) => dispatcher.add_sink(Arc::new(sink)),
        Err(e) => warn!("Kafka alert producer unavailable, alerts go to the log only: {}", e),
    }

    match zones.dangerous_zones().await {
        Ok(known) => info!("{} dangerous zones on record", known.len()),
        Err(e) => warn!("Could not load dangerous zones: {}", e),
    }

    let trigger_config = config.trigger_config();
    let poll_interval = trigger_config.poll_interval;
    let mut session = Session::new(
        JourneyMonitor::new(&config.device_id, config.monitor_config()),
        TriggerDetector::new(trigger_config),
        zones,
        dispatcher,
        stores.journeys.clone(),
        &config.device_id,
        config.session_settings(),
    );
    if let Some(journey_id) = session.restore().await? {
        info!("Resumed journey {}", journey_id);
    }

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(EVENT_CHANNEL_CAPACITY);
    let kafka_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = kafka::start_kafka_consumer(kafka_config, tx).await {
            error!("Kafka consumer stopped: {}", e);
        }
    });

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(payload) => {
                    if let Err(e) = message_processor::process_message(&mut session, &payload).await {
                        error!("Error processing message: {}", e);
                    }
                }
                None => {
                    warn!("Event stream closed");
                    break;
                }
            },
            now = ticker.tick() => {
                if let Err(e) = session.tick(now.into_std(), Utc::now()).await {
                    error!("Panic trigger could not be dispatched: {}", e);
                }
            }
            _ = housekeeping.tick() => {
                if let Err(e) = session.housekeeping(Utc::now()).await {
                    warn!("Housekeeping failed: {}", e);
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    session.shutdown(Utc::now()).await?;
    Ok(())
}
