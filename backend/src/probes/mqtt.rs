//! `mqtt` monitors: subscribe and wait for a message on the configured
//! topic.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};

use super::{ProbeContext, ProbeDriver, ProbeError, ProbeOutcome};
use crate::db::models::{Heartbeat, Monitor};
use crate::monitor::status::Status;

pub struct MqttDriver;

#[async_trait]
impl ProbeDriver for MqttDriver {
    async fn check(
        &self,
        monitor: &Monitor,
        beat: &mut Heartbeat,
        ctx: &ProbeContext<'_>,
    ) -> Result<ProbeOutcome, ProbeError> {
        let hostname = monitor
            .hostname
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Hostname is not configured".to_string()))?;
        let port = monitor.port.unwrap_or(1883) as u16;
        let topic = monitor
            .mqtt_topic
            .as_deref()
            .ok_or_else(|| ProbeError::Config("Topic is not configured".to_string()))?;

        let mut options = MqttOptions::new(format!("pulsewatch-{}", monitor.id), hostname, port);
        options.set_keep_alive(Duration::from_secs(20));
        if let (Some(username), Some(password)) =
            (monitor.mqtt_username.as_deref(), monitor.mqtt_password.as_deref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        let started = Instant::now();
        let wait_for_message = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        return Ok(String::from_utf8_lossy(&publish.payload).to_string());
                    }
                    Ok(_) => continue,
                    Err(e) => return Err(ProbeError::Network(e.to_string())),
                }
            }
        };
        let payload = tokio::time::timeout(Duration::from_secs_f64(ctx.timeout), wait_for_message)
            .await
            .map_err(|_| {
                ProbeError::Network(format!("No message received on topic {topic}"))
            })??;
        let _ = client.disconnect().await;

        beat.ping = Some(started.elapsed().as_millis() as f64);

        if let Some(expected) = monitor.mqtt_success_message.as_deref() {
            if !expected.is_empty() && payload != expected {
                return Err(ProbeError::Predicate(format!(
                    "Message mismatch - Topic: {topic}; Message: {payload}"
                )));
            }
        }

        beat.status = Status::Up;
        beat.msg = format!("Topic: {topic}; Message: {payload}");
        Ok(ProbeOutcome::Beat)
    }
}
