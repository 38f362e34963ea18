use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Broker connection settings for the telemetry source.
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub client_id: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// First topic segment shared by every device in this deployment.
    pub topic_root: String,
    pub keep_alive: Duration,
    pub max_retry_attempts: u32,
    pub retry_delay: Duration,
}

/// One raw message off the bus, before validation.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Run the MQTT telemetry source until cancelled.
///
/// Subscribes to `{root}/+/telemetry` and forwards every publish into the
/// pipeline channel. Connection errors are retried with a fixed delay up
/// to the configured attempt limit; a successful session resets the count.
#[instrument(name = "mqtt_source", skip_all, fields(host = %config.host, port = config.port))]
pub async fn run_mqtt_source(
    config: MqttSourceConfig,
    sender: mpsc::Sender<BusMessage>,
    cancellation_token: CancellationToken,
) {
    info!(topic_root = %config.topic_root, "starting MQTT telemetry source");

    let mut retry_count = 0;

    loop {
        if cancellation_token.is_cancelled() {
            debug!("telemetry source cancelled before connection");
            break;
        }

        match run_mqtt_session(&config, &sender, &cancellation_token).await {
            Ok(()) => {
                debug!("telemetry source stopped cleanly");
                break;
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping telemetry source"
                    );
                    break;
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay) => {}
                }
            }
        }
    }

    info!("MQTT telemetry source stopped");
}

async fn run_mqtt_session(
    config: &MqttSourceConfig,
    sender: &mpsc::Sender<BusMessage>,
    cancellation_token: &CancellationToken,
) -> DomainResult<()> {
    let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
    mqtt_options.set_keep_alive(config.keep_alive);
    mqtt_options.set_clean_session(true);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        mqtt_options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    // Single-level wildcard for the device class segment
    let subscribe_topic = format!("{}/+/telemetry", config.topic_root);
    client
        .subscribe(&subscribe_topic, QoS::AtLeastOnce)
        .await
        .map_err(|e| DomainError::BusError(format!("failed to subscribe: {}", e)))?;

    info!(topic = %subscribe_topic, "subscribed to MQTT topic");

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = BusMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if sender.send(message).await.is_err() {
                            // Consumer gone; nothing left to feed
                            debug!("pipeline channel closed, stopping session");
                            let _ = client.disconnect().await;
                            return Ok(());
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        return Err(DomainError::BusError(format!(
                            "MQTT event loop error: {}",
                            e
                        )));
                    }
                }
            }
        }
    }
}
