mod config;

use anyhow::Context;
use common::domain::{
    DeviceRegistry, DeviceRegistryConfig, DeviceRepository, InMemoryDeviceRepository,
    RawPayloadPublisher, RAW_SUBJECT_PREFIX,
};
use common::nats::{NatsClient, PublishMode};
use common::postgres::{PostgresClient, PostgresConfig, PostgresDeviceRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use crate::config::{DeviceStore, ServiceConfig};
use device_api::device_api::DeviceApi;
use device_api::domain::DeviceProvisioningService;
use device_api::http::HttpServerConfig;
use fieldlink_runner::Runner;
use mqtt_bridge::domain::{AuthenticationGate, ForwardingConfig, ForwardingMediator};
use mqtt_bridge::mqtt::{MqttListenerConfig, SessionConfig, SessionHooks};
use mqtt_bridge::mqtt_bridge::MqttBridge;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        device_store = ?config.device_store,
        jetstream = config.nats_jetstream_enabled,
        http_port = config.http_port,
        mqtt_port = config.mqtt_port,
        otel_enabled = config.otel_enabled,
        "Starting fieldlink service"
    );

    let repository = match create_device_repository(&config).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("Failed to initialize device store: {:#}", e);
            std::process::exit(1);
        }
    };

    let publisher = match create_publisher(&config).await {
        Ok(publisher) => publisher,
        Err(e) => {
            error!("Failed to initialize NATS publisher: {:#}", e);
            std::process::exit(1);
        }
    };

    // Root token: cancelling it stops the listeners and cuts in-flight publishes short
    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(DeviceRegistry::new(
        repository,
        DeviceRegistryConfig {
            secret_length: config.device_secret_length,
            max_id_attempts: config.device_id_max_attempts,
        },
    ));

    let device_api = DeviceApi::new(
        Arc::new(DeviceProvisioningService::new(Arc::clone(&registry))),
        HttpServerConfig {
            host: config.http_host.clone(),
            port: config.http_port,
        },
    );

    let mqtt_bridge = MqttBridge::new(
        SessionHooks {
            authenticator: Arc::new(AuthenticationGate::new(registry)),
            forwarder: Arc::new(ForwardingMediator::new(
                Arc::clone(&publisher),
                ForwardingConfig {
                    publish_timeout: Duration::from_secs(config.publish_timeout_secs),
                    log_payloads: config.log_payloads,
                },
                shutdown_token.clone(),
            )),
        },
        MqttListenerConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            session: SessionConfig {
                max_packet_size: config.mqtt_max_packet_size,
                connect_timeout: Duration::from_secs(config.mqtt_connect_timeout_secs),
            },
        },
    );

    Runner::new()
        .with_named_process("device_api", device_api.into_runner_process())
        .with_named_process("mqtt_bridge", mqtt_bridge.into_runner_process())
        .with_closer(move || async move {
            info!("Closing raw payload publisher");
            publisher
                .close()
                .await
                .context("Failed to close raw payload publisher")
        })
        .with_closer(move || async move {
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_cancellation_token(shutdown_token)
        .with_grace_period(Duration::from_secs(config.shutdown_grace_secs))
        .with_closer_timeout(Duration::from_secs(10))
        .run()
        .await;
}

async fn create_device_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<dyn DeviceRepository>> {
    match config.device_store {
        DeviceStore::Postgres => {
            info!("Initializing PostgreSQL...");
            let client = PostgresClient::new(&PostgresConfig {
                host: config.postgres_host.clone(),
                port: config.postgres_port,
                database: config.postgres_database.clone(),
                username: config.postgres_username.clone(),
                password: config.postgres_password.clone(),
                max_pool_size: config.postgres_max_pool_size,
            })?;

            tokio::time::timeout(
                Duration::from_secs(config.startup_timeout_secs),
                client.ensure_schema(),
            )
            .await
            .context("Timed out applying PostgreSQL schema")??;

            Ok(Arc::new(PostgresDeviceRepository::new(client)))
        }
        DeviceStore::Memory => {
            warn!("Using in-memory device store, devices are lost on restart");
            Ok(Arc::new(InMemoryDeviceRepository::new()))
        }
    }
}

async fn create_publisher(config: &ServiceConfig) -> anyhow::Result<Arc<dyn RawPayloadPublisher>> {
    info!("Initializing NATS...");
    let client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
        "fieldlink",
    )
    .await?;

    let mode = PublishMode::from_jetstream_enabled(config.nats_jetstream_enabled);
    if mode == PublishMode::JetStream {
        client
            .ensure_stream(
                &config.nats_raw_stream,
                vec![format!("{}.*", RAW_SUBJECT_PREFIX)],
            )
            .await?;
    }

    info!(mode = ?mode, "Raw payload publisher ready");
    Ok(client.create_publisher(mode))
}
