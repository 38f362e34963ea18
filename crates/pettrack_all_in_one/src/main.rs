mod config;
mod runner;

use common::telemetry::{init_telemetry, TelemetryConfig};
use common::MemoryDocumentStore;
use config::ServiceConfig;
use ingest_worker::domain::{run_report_loop, BufferConfig, PerformanceMonitor};
use ingest_worker::mqtt::{run_mqtt_source, MqttSourceConfig};
use ingest_worker::{IngestWorker, IngestWorkerConfig};
use runner::Runner;
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_telemetry(&TelemetryConfig {
        service_name: "pettrack-ingest".to_string(),
        log_level: config.log_level.clone(),
        json_logs: config.json_logs,
    });

    info!(
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        batch_size = config.batch_size,
        "starting pettrack ingest service"
    );
    debug!("Configuration: {:?}", config);

    let monitor = Arc::new(PerformanceMonitor::new());

    // In-process store; swap for a real document-store client per deployment
    let store = Arc::new(MemoryDocumentStore::new());

    let (sender, receiver) = tokio::sync::mpsc::channel(config.channel_capacity);

    let worker = IngestWorker::new(
        store,
        monitor.clone(),
        IngestWorkerConfig {
            buffer: BufferConfig {
                batch_size: config.batch_size,
                batch_timeout: config.batch_timeout(),
            },
        },
        receiver,
    );

    let mqtt_config = MqttSourceConfig {
        client_id: "pettrack-ingest".to_string(),
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic_root: config.mqtt_topic_root.clone(),
        keep_alive: config.mqtt_keep_alive(),
        max_retry_attempts: config.mqtt_max_retry_attempts,
        retry_delay: config.mqtt_retry_delay(),
    };

    let report_interval = config.report_interval();

    let runner = Runner::new()
        .with_named_process("mqtt_source", move |ctx| async move {
            run_mqtt_source(mqtt_config, sender, ctx).await;
            Ok(())
        })
        .with_named_process("ingest_worker", move |ctx| async move {
            worker.run(ctx).await;
            Ok(())
        })
        .with_named_process("performance_report", move |ctx| {
            run_report_loop(monitor, report_interval, ctx)
        })
        .with_closer(|| async {
            info!("cleanup complete");
            Ok(())
        })
        .with_closer_timeout(config.shutdown_timeout());

    runner.run().await;
}
