#![cfg(feature = "integration-tests")]

use chrono::Utc;
use common::domain::{
    CreateDeviceRepoInput, DeviceExistsRepoInput, DeviceRegistry, DeviceRegistryConfig,
    DeviceRepository, DomainError, FindDeviceByCredentialsRepoInput,
};
use common::postgres::{PostgresClient, PostgresConfig, PostgresDeviceRepository};
use std::sync::Arc;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresDeviceRepository) {
    let postgres = Postgres::default().start().await.unwrap();
    let host = postgres.get_host().await.unwrap();
    let port = postgres.get_host_port_ipv4(5432).await.unwrap();

    let client = PostgresClient::new(&PostgresConfig {
        host: host.to_string(),
        port,
        database: "postgres".to_string(),
        username: "postgres".to_string(),
        password: "postgres".to_string(),
        max_pool_size: 5,
    })
    .expect("Failed to create client");

    client.ensure_schema().await.expect("Schema setup failed");
    // Applying twice must be harmless
    client.ensure_schema().await.expect("Schema re-apply failed");

    (postgres, PostgresDeviceRepository::new(client))
}

fn create_input(id: &str, secret: &str) -> CreateDeviceRepoInput {
    CreateDeviceRepoInput {
        id: id.to_string(),
        device_type: "thermometer".to_string(),
        credential_user: id.to_string(),
        credential_secret: secret.to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_create_and_find_device_by_credentials() {
    let (_container, repo) = setup_test_db().await;

    let created = repo
        .create_device(create_input("DEVICE0000000001", "secret0000000001"))
        .await
        .unwrap();
    assert_eq!(created.id, "DEVICE0000000001");

    let found = repo
        .find_device_by_credentials(FindDeviceByCredentialsRepoInput {
            credential_user: "DEVICE0000000001".to_string(),
            credential_secret: "secret0000000001".to_string(),
        })
        .await
        .unwrap()
        .expect("device should be found");

    assert_eq!(found.id, created.id);
    assert_eq!(found.device_type, "thermometer");
    assert_eq!(found.credential_secret, "secret0000000001");
}

#[tokio::test]
async fn test_find_device_with_wrong_secret_returns_none() {
    let (_container, repo) = setup_test_db().await;

    repo.create_device(create_input("DEVICE0000000002", "secret0000000002"))
        .await
        .unwrap();

    let found = repo
        .find_device_by_credentials(FindDeviceByCredentialsRepoInput {
            credential_user: "DEVICE0000000002".to_string(),
            credential_secret: "not-the-secret".to_string(),
        })
        .await
        .unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_device_exists() {
    let (_container, repo) = setup_test_db().await;

    let missing = repo
        .device_exists(DeviceExistsRepoInput {
            id: "DEVICE0000000003".to_string(),
        })
        .await
        .unwrap();
    assert!(!missing);

    repo.create_device(create_input("DEVICE0000000003", "secret0000000003"))
        .await
        .unwrap();

    let present = repo
        .device_exists(DeviceExistsRepoInput {
            id: "DEVICE0000000003".to_string(),
        })
        .await
        .unwrap();
    assert!(present);
}

#[tokio::test]
async fn test_duplicate_id_returns_device_already_exists() {
    let (_container, repo) = setup_test_db().await;

    repo.create_device(create_input("DEVICE0000000004", "secret-a"))
        .await
        .unwrap();

    let result = repo
        .create_device(create_input("DEVICE0000000004", "secret-b"))
        .await;

    match result {
        Err(DomainError::DeviceAlreadyExists(id)) => assert_eq!(id, "DEVICE0000000004"),
        other => panic!("expected DeviceAlreadyExists, got {:?}", other),
    }
}

#[tokio::test]
async fn test_registry_round_trip_against_postgres() {
    let (_container, repo) = setup_test_db().await;
    let registry = DeviceRegistry::new(Arc::new(repo), DeviceRegistryConfig::default());

    let device = registry.create_device("thermometer").await.unwrap();

    assert!(
        registry
            .authenticate(&device.credential_user, &device.credential_secret)
            .await
    );
    assert!(!registry.authenticate(&device.credential_user, "wrong").await);
}
