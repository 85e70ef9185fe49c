use crate::alerts::{Alert, AlertSink, SinkError};
use crate::config::AppConfig;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

fn client_config(config: &AppConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_bootstrap_servers)
        // SASL Configuration
        .set("security.protocol", &config.kafka_security_protocol);
    if config.kafka_security_protocol.starts_with("SASL") {
        client_config
            .set("sasl.mechanism", &config.kafka_sasl_mechanism)
            .set("sasl.username", &config.kafka_username)
            .set("sasl.password", &config.kafka_password);
    }
    client_config
}

/// Consumes device events and forwards raw payloads to the session, in partition order.
/// A circuit breaker pauses consumption after repeated broker errors.
pub async fn start_kafka_consumer(config: AppConfig, events: mpsc::Sender<Vec<u8>>) -> anyhow::Result<()> {
    info!("Initializing Kafka consumer for topic: {}", config.kafka_topic);

    let consumer: StreamConsumer = client_config(&config)
        .set("group.id", &config.kafka_group_id)
        .set("auto.offset.reset", &config.kafka_auto_offset_reset)
        .create()?;

    consumer.subscribe(&[&config.kafka_topic])?;
    info!("Subscribed to topic: {}", config.kafka_topic);

    let mut consecutive_failures = 0;
    let max_retries = config.kafka_max_retries;
    let cooldown_duration = Duration::from_secs(config.kafka_circuit_breaker_cooldown);

    loop {
        if consecutive_failures >= max_retries {
            warn!(
                "Circuit breaker tripped ({} consecutive failures)! Sleeping for {} seconds...",
                consecutive_failures, config.kafka_circuit_breaker_cooldown
            );
            tokio::time::sleep(cooldown_duration).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset. Resuming consumption.");
        }

        match consumer.recv().await {
            Ok(m) => {
                consecutive_failures = 0;

                let payload = match m.payload() {
                    None => {
                        warn!("Received empty payload from Kafka");
                        continue;
                    }
                    Some(p) => p,
                };

                // Session applies events one at a time; backpressure stalls the consumer.
                if events.send(payload.to_vec()).await.is_err() {
                    info!("Session closed, stopping Kafka consumer");
                    return Ok(());
                }
            }
            Err(e) => {
                error!(
                    "Kafka error: {}. Incrementing failure count ({} / {})",
                    e,
                    consecutive_failures + 1,
                    max_retries
                );
                consecutive_failures += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// Publishes alerts as protobuf envelopes keyed by device id.
pub struct KafkaAlertSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaAlertSink {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = client_config(config)
            .set("message.timeout.ms", "10000")
            .create()?;
        info!("Kafka alert producer ready for topic: {}", config.kafka_alert_topic);
        Ok(Self {
            producer,
            topic: config.kafka_alert_topic.clone(),
        })
    }
}

#[async_trait]
impl AlertSink for KafkaAlertSink {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), SinkError> {
        let payload = alert.to_envelope().to_bytes();
        let record = FutureRecord::to(&self.topic)
            .key(&alert.device_id)
            .payload(&payload);

        match self.producer.send(record, PRODUCE_TIMEOUT).await {
            Ok((partition, offset)) => {
                debug!(alert_id = %alert.alert_id, partition, offset, "Alert published");
                Ok(())
            }
            Err((e, _)) => Err(SinkError::Transport(e.to_string())),
        }
    }
}
