//! `kafka-producer` monitors: produce a test message and wait for the
//! broker acknowledgement.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

const DEFAULT_MESSAGE: &str = "pulsewatch test message";

pub struct KafkaProducerDriver;

#[async_trait]
impl ProbeDriver for KafkaProducerDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let raw_brokers = monitor
            .kafka_producer_brokers
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Brokers are not configured".to_string()))?;
        let topic = monitor
            .kafka_producer_topic
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Topic is not configured".to_string()))?;
        let message = monitor
            .kafka_producer_message
            .as_deref()
            .unwrap_or(DEFAULT_MESSAGE);

        // The column holds either a JSON array or a comma-separated list.
        let brokers: Vec<String> = serde_json::from_str(raw_brokers).unwrap_or_else(|_| {
            raw_brokers
                .split(',')
                .map(|broker| broker.trim().to_string())
                .collect()
        });

        let timeout_ms = ((ctx.timeout * 1000.0) as u64).max(1000);
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("message.timeout.ms", timeout_ms.to_string())
            .create()
            .map_err(|e| ProbeError::Config(format!("Failed to build producer: {e}")))?;

        let record = FutureRecord::<(), str>::to(topic).payload(message);
        let started = Instant::now();
        match producer
            .send(record, Duration::from_secs_f64(ctx.timeout))
            .await
        {
            Ok(_delivery) => {
                beat.ping = Some(started.elapsed().as_millis() as f64);
                beat.status = Status::Up;
                beat.msg = "Message sent successfully".to_string();
                Ok(ProbeOutcome::Beat)
            }
            Err((e, _message)) => Err(ProbeError::Network(e.to_string())),
        }
    }
}
