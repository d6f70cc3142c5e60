use config::{Config, ConfigError, Environment};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// Where device records live
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStore {
    Postgres,
    /// Process-local map; records are lost on restart
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
#[garde(allow_unvalidated)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Publish through JetStream and wait for acks instead of core NATS
    #[serde(default = "default_nats_jetstream_enabled")]
    pub nats_jetstream_enabled: bool,

    /// JetStream stream capturing raw device payloads
    #[serde(default = "default_nats_raw_stream")]
    pub nats_raw_stream: String,

    /// Deadline for a single publish in seconds
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,

    /// Startup timeout for initialization operations in seconds
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    // Device store configuration
    #[serde(default = "default_device_store")]
    pub device_store: DeviceStore,

    /// Length of generated device secrets
    #[serde(default = "default_device_secret_length")]
    #[garde(range(min = 1))]
    pub device_secret_length: usize,

    /// Attempts at drawing an unused device ID
    #[serde(default = "default_device_id_max_attempts")]
    #[garde(range(min = 1))]
    pub device_id_max_attempts: u32,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_max_pool_size")]
    pub postgres_max_pool_size: usize,

    // HTTP configuration
    #[serde(default = "default_http_host")]
    pub http_host: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    // MQTT configuration
    #[serde(default = "default_mqtt_host")]
    pub mqtt_host: String,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    /// Largest accepted MQTT packet in bytes
    #[serde(default = "default_mqtt_max_packet_size")]
    pub mqtt_max_packet_size: usize,

    /// Seconds a new connection has to send CONNECT
    #[serde(default = "default_mqtt_connect_timeout_secs")]
    pub mqtt_connect_timeout_secs: u64,

    /// Include payload contents in forward logs
    #[serde(default)]
    pub log_payloads: bool,

    /// Seconds processes get to stop after a shutdown signal
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    // OpenTelemetry configuration
    #[serde(default)]
    pub otel_enabled: bool,

    /// OTLP gRPC endpoint
    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_nats_jetstream_enabled() -> bool {
    true
}

fn default_nats_raw_stream() -> String {
    "raw".to_string()
}

fn default_publish_timeout_secs() -> u64 {
    5
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_device_store() -> DeviceStore {
    DeviceStore::Postgres
}

fn default_device_secret_length() -> usize {
    16
}

fn default_device_id_max_attempts() -> u32 {
    8
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "fieldlink".to_string()
}

fn default_postgres_username() -> String {
    "fieldlink".to_string()
}

fn default_postgres_password() -> String {
    "fieldlink".to_string()
}

fn default_postgres_max_pool_size() -> usize {
    5
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    9091
}

fn default_mqtt_host() -> String {
    "0.0.0.0".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_mqtt_max_packet_size() -> usize {
    256 * 1024
}

fn default_mqtt_connect_timeout_secs() -> u64 {
    10
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "fieldlink".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("FIELDLINK"))
            .build()?
            .try_deserialize()?;

        config
            .validate()
            .map_err(|report| ConfigError::Message(format!("invalid configuration: {}", report)))?;

        Ok(config)
    }
}
