//! Telemetry Client - Demo Entry Point
//!
//! Without `TELEMETRY_SERVER_URL` the demo plays both sides against an
//! in-memory record store: the app opts in, the operator approves through a
//! command, a few events are logged, and the user opts out again.
//! With a server configured it runs startup and enable against it and prints
//! the resulting state.

use std::sync::Arc;
use std::time::Duration;

use telemetry_client::constants;
use telemetry_client::logic::remote::http::HttpStoreConfig;
use telemetry_client::logic::remote::records::{CommandAction, CommandRecord, Record};
use telemetry_client::{
    Collaborators, DeviceInfo, FileKeyValueStore, HttpRecordStore, KeyValueStore,
    LifecycleService, LogLevel, MemoryKeyValueStore, MemoryPushRegistrar, MemoryRecordStore,
    RandomIdentifier, RecordStore, RemoteNotification, TelemetryConfig,
};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Telemetry client demo v{}", constants::APP_VERSION);

    let config = TelemetryConfig::from_env();
    let device = DeviceInfo::collect(&config.app_version);
    log::info!(
        "Device: {} / {} / {}",
        device.device_type,
        device.device_model,
        device.os_version
    );

    match HttpStoreConfig::from_env() {
        Some(http) => match HttpRecordStore::new(http) {
            Ok(store) => run_against_server(config, device, Arc::new(store)).await,
            Err(e) => log::error!("Cannot build HTTP record store: {}", e),
        },
        None => run_offline_walkthrough(config, device).await,
    }
}

fn print_state(service: &LifecycleService) {
    let snapshot = service.snapshot();
    log::info!("Status: {}", snapshot.status.message());
    match serde_json::to_string_pretty(&snapshot) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Failed to render snapshot: {}", e),
    }
}

async fn run_against_server(config: TelemetryConfig, device: DeviceInfo, store: Arc<dyn RecordStore>) {
    let settings: Arc<dyn KeyValueStore> = match FileKeyValueStore::open_default() {
        Ok(kv) => {
            log::info!("Settings file: {}", kv.file_path().display());
            Arc::new(kv)
        }
        Err(e) => {
            log::warn!("Settings file unavailable, keeping settings in memory: {}", e);
            Arc::new(MemoryKeyValueStore::new())
        }
    };

    let service = LifecycleService::new(
        config,
        Collaborators {
            records: store,
            settings,
            push: Arc::new(MemoryPushRegistrar::new()),
            identifiers: Arc::new(RandomIdentifier),
            device,
        },
    );

    service.startup().await;
    service.wait_until_started().await;
    service.enable_telemetry().await;
    print_state(&service);

    service.logger().shutdown().await;
}

async fn run_offline_walkthrough(mut config: TelemetryConfig, device: DeviceInfo) {
    config.logger.batch_size = 2;
    config.commands.poll_interval = None;

    let store = Arc::new(MemoryRecordStore::new());
    let service = LifecycleService::new(
        config,
        Collaborators {
            records: store.clone(),
            settings: Arc::new(MemoryKeyValueStore::new()),
            push: Arc::new(MemoryPushRegistrar::new()),
            identifiers: Arc::new(RandomIdentifier),
            device,
        },
    );

    // 1. App launch
    service.startup().await;
    service.wait_until_started().await;
    service.register_scenarios(&["network", "rendering"]).await;

    // 2. User opts in, request waits for the operator
    let settings = service.enable_telemetry().await;
    print_state(&service);

    let Some(client_id) = settings.client_identifier else {
        log::error!("Enable did not assign a client identifier");
        return;
    };

    // 3. Operator approves and turns on one scenario
    for (action, scenario) in [
        (CommandAction::Enable, None),
        (CommandAction::EnableScenario, Some("network")),
    ] {
        let command = CommandRecord::pending(&client_id, action, scenario);
        store.insert(command.to_raw());

        let push = RemoteNotification::new(format!("{}{}", constants::COMMAND_NAMESPACE, client_id))
            .with_record(command.id.clone());
        let handled = service.handle_remote_notification(&push).await;
        log::info!("Command {} handled: {}", action.as_str(), handled);
    }
    print_state(&service);

    // 4. Log a few events; the rendering scenario is still off
    service.log_event("app_launch", None, LogLevel::Info, None);
    service.log_event("request", Some("network"), LogLevel::Debug, Some("GET /status"));
    service.log_event("frame", Some("rendering"), LogLevel::Debug, None);
    service.log_event("warning", None, LogLevel::Warning, Some("low disk"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    service.logger().flush().await;
    log::info!("Logger stats: {:?}", service.logger().stats());

    // 5. User opts out, everything remote is removed
    service.disable_telemetry().await;
    print_state(&service);
}
