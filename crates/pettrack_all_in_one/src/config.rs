use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON (disable for local runs)
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,

    // MQTT configuration
    /// MQTT broker host
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    /// MQTT broker port
    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// MQTT username (optional)
    #[serde(default)]
    pub mqtt_username: Option<String>,

    /// MQTT password (optional)
    #[serde(default)]
    pub mqtt_password: Option<String>,

    /// First topic segment shared by all devices
    #[serde(default = "default_mqtt_topic_root")]
    pub mqtt_topic_root: String,

    /// MQTT keep-alive interval in seconds
    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Connection retry attempts before giving up
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    /// Delay between connection retries in milliseconds
    #[serde(default = "default_mqtt_retry_delay_ms")]
    pub mqtt_retry_delay_ms: u64,

    // Ingest buffering
    /// Queue flush threshold and max operations per atomic commit
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush timeout for partially filled batches in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Capacity of the bus-to-pipeline channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    // Operational output
    /// Interval between performance report log lines in seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Grace period for cleanup at shutdown in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("PETTRACK"))
            .build()?
            .try_deserialize()
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }

    pub fn mqtt_retry_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt_retry_delay_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_topic_root() -> String {
    "pettrack".to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_max_retry_attempts() -> u32 {
    5
}

fn default_mqtt_retry_delay_ms() -> u64 {
    10_000
}

fn default_batch_size() -> usize {
    500
}

fn default_batch_timeout_ms() -> u64 {
    3000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_report_interval_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}
