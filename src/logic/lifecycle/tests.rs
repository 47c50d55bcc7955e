//! Lifecycle service tests
//!
//! Every test wires the service against in-memory collaborators with a fixed
//! client identifier. Polling is off except in the command poll tests.

#[cfg(test)]
mod service_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::logic::config::{CommandConfig, LoggerConfig, TelemetryConfig};
    use crate::logic::device::DeviceInfo;
    use crate::logic::error::RecordError;
    use crate::logic::lifecycle::{
        Collaborators, FixedIdentifier, LifecycleService, LifecycleStatus, ReconciliationOutcome,
    };
    use crate::logic::logger::{Event, LogLevel};
    use crate::logic::remote::memory::{MemoryRecordStore, Operation};
    use crate::logic::remote::records::{
        ClientRecord, CommandAction, CommandRecord, CommandStatus, Query, RawRecord, Record, RecordKind,
        ScenarioRecord, SettingsBackup,
    };
    use crate::logic::remote::RecordStore;
    use crate::logic::settings::{
        KeyValueStore, MemoryKeyValueStore, ScenarioStore, Settings, SettingsStore,
    };
    use crate::logic::subscription::{MemoryPushRegistrar, RemoteNotification};

    const CLIENT: &str = "sampleid01";
    const NS: &str = "telemetry-commands-";

    struct Harness {
        service: Arc<LifecycleService>,
        store: Arc<MemoryRecordStore>,
        kv: Arc<MemoryKeyValueStore>,
        push: Arc<MemoryPushRegistrar>,
    }

    fn config() -> TelemetryConfig {
        TelemetryConfig {
            logger: LoggerConfig {
                batch_size: 1,
                flush_interval: Duration::from_secs(3600),
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            commands: CommandConfig {
                fetch_attempts: 2,
                fetch_retry_delay: Duration::from_millis(1),
                poll_interval: None,
                namespace: NS.to_string(),
            },
            app_version: "0.0.0-test".to_string(),
        }
    }

    fn device() -> DeviceInfo {
        DeviceInfo::new("Linux", "ci", "Linux x86_64", "6.1", "0.0.0-test")
    }

    fn harness_with(records: Arc<dyn RecordStore>, store: Arc<MemoryRecordStore>) -> Harness {
        harness_configured(records, store, config())
    }

    fn harness_configured(
        records: Arc<dyn RecordStore>,
        store: Arc<MemoryRecordStore>,
        config: TelemetryConfig,
    ) -> Harness {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let push = Arc::new(MemoryPushRegistrar::new());
        let service = LifecycleService::new(
            config,
            Collaborators {
                records,
                settings: kv.clone(),
                push: push.clone(),
                identifiers: Arc::new(FixedIdentifier::new(CLIENT)),
                device: device(),
            },
        );
        Harness {
            service,
            store,
            kv,
            push,
        }
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryRecordStore::new());
        harness_with(store.clone(), store)
    }

    fn polling_harness(interval: Duration) -> Harness {
        let mut config = config();
        config.commands.poll_interval = Some(interval);
        let store = Arc::new(MemoryRecordStore::new());
        harness_configured(store.clone(), store, config)
    }

    impl Harness {
        fn seed_settings(&self, requested: bool, sending: bool) {
            SettingsStore::new(self.kv.clone())
                .save(&Settings {
                    telemetry_requested: requested,
                    telemetry_sending_enabled: sending,
                    client_identifier: Some(CLIENT.to_string()),
                })
                .unwrap();
        }

        fn seed_client(&self, is_enabled: bool) {
            let mut client = ClientRecord::new(CLIENT);
            client.is_enabled = is_enabled;
            self.store.insert(client.to_raw());
        }

        fn client(&self) -> Option<ClientRecord> {
            self.store
                .get(RecordKind::Client, CLIENT)
                .map(|raw| ClientRecord::from_raw(&raw).unwrap())
        }

        fn issue(&self, action: CommandAction, scenario: Option<&str>) -> RemoteNotification {
            let command = CommandRecord::pending(CLIENT, action, scenario);
            self.store.insert(command.to_raw());
            RemoteNotification::new(format!("{}{}", NS, CLIENT)).with_record(command.id)
        }

        fn command_status(&self, push: &RemoteNotification) -> Option<CommandStatus> {
            let id = push.record_id.as_deref()?;
            self.store
                .get(RecordKind::Command, id)
                .map(|raw| CommandRecord::from_raw(&raw).unwrap().status)
        }

        fn insert_event(&self) {
            let event = Event::new(
                "seeded",
                "session",
                Some(CLIENT.to_string()),
                device(),
                None,
                LogLevel::Info,
                None,
            );
            self.store.insert(event.to_raw());
        }

        fn scenario_record(&self, name: &str) -> ScenarioRecord {
            let raw = self
                .store
                .get(RecordKind::Scenario, &format!("{}-{}", CLIENT, name))
                .unwrap();
            ScenarioRecord::from_raw(&raw).unwrap()
        }

        /// Enable against a pre-approved client record
        async fn enable_approved(&self) {
            self.seed_client(true);
            let settings = self.service.enable_telemetry().await;
            assert!(settings.telemetry_sending_enabled);
        }
    }

    async fn wait_for(cond: impl Fn() -> bool) -> bool {
        for _ in 0..300 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    /// Hides client records from the first query, as if another process
    /// registered the same client a moment earlier
    struct LaggingQueries {
        inner: Arc<MemoryRecordStore>,
        stale_client_queries: Mutex<u32>,
    }

    #[async_trait]
    impl RecordStore for LaggingQueries {
        async fn ensure_schema(&self, kind: RecordKind) -> Result<(), RecordError> {
            self.inner.ensure_schema(kind).await
        }

        async fn query(&self, kind: RecordKind, query: &Query) -> Result<Vec<RawRecord>, RecordError> {
            if kind == RecordKind::Client {
                let mut stale = self.stale_client_queries.lock();
                if *stale > 0 {
                    *stale -= 1;
                    return Ok(Vec::new());
                }
            }
            self.inner.query(kind, query).await
        }

        async fn fetch(&self, kind: RecordKind, id: &str) -> Result<Option<RawRecord>, RecordError> {
            self.inner.fetch(kind, id).await
        }

        async fn create(&self, record: RawRecord) -> Result<RawRecord, RecordError> {
            self.inner.create(record).await
        }

        async fn save(&self, record: RawRecord) -> Result<RawRecord, RecordError> {
            self.inner.save(record).await
        }

        async fn delete(&self, kind: RecordKind, id: &str) -> Result<(), RecordError> {
            self.inner.delete(kind, id).await
        }

        async fn create_batch(&self, records: Vec<RawRecord>) -> Result<(), RecordError> {
            self.inner.create_batch(records).await
        }
    }

    // ========================================================================
    // STARTUP
    // ========================================================================

    #[tokio::test]
    async fn test_concurrent_startup_runs_once() {
        let h = harness();

        let (a, b) = tokio::join!(h.service.startup(), h.service.startup());
        assert_eq!(a, b);
        h.service.wait_until_started().await;
        assert_eq!(h.service.startup().await, a);

        // One backup lookup for the whole first run
        assert_eq!(h.store.call_count(Operation::Fetch), 1);
        assert_eq!(h.service.status(), LifecycleStatus::Disabled);
        assert!(h.service.logger().is_activated());
        assert!(!h.service.logger().is_enabled());
    }

    #[tokio::test]
    async fn test_startup_restores_backup_on_fresh_install() {
        let h = harness();
        let backed_up = Settings {
            telemetry_requested: true,
            telemetry_sending_enabled: true,
            client_identifier: Some(CLIENT.to_string()),
        };
        h.store.insert(SettingsBackup::from(&backed_up).to_raw());
        h.seed_client(true);

        let loaded = h.service.startup().await;
        assert_eq!(loaded, Settings::default());

        h.service.wait_until_started().await;
        assert_eq!(h.service.settings(), backed_up);
        assert_eq!(h.service.status(), LifecycleStatus::Enabled);
        assert!(h.service.logger().is_enabled());
        assert_eq!(SettingsStore::new(h.kv.clone()).load().unwrap(), backed_up);
    }

    #[tokio::test]
    async fn test_startup_keeps_explicit_opt_out() {
        let h = harness();
        SettingsStore::new(h.kv.clone()).save(&Settings::default()).unwrap();
        h.store.insert(
            SettingsBackup::from(&Settings {
                telemetry_requested: true,
                telemetry_sending_enabled: true,
                client_identifier: Some(CLIENT.to_string()),
            })
            .to_raw(),
        );

        h.service.startup().await;
        h.service.wait_until_started().await;

        assert_eq!(h.service.settings(), Settings::default());
        assert_eq!(h.service.status(), LifecycleStatus::Disabled);
        assert_eq!(h.store.call_count(Operation::Fetch), 0);
    }

    #[tokio::test]
    async fn test_startup_reconciles_requested_install() {
        let h = harness();
        h.seed_settings(true, false);
        h.seed_client(true);

        h.service.startup().await;
        h.service.wait_until_started().await;

        assert!(h.service.settings().telemetry_sending_enabled);
        assert_eq!(h.service.status(), LifecycleStatus::Enabled);
        assert!(h.service.logger().is_enabled());
        assert_eq!(h.push.ids(), vec![format!("{}{}", NS, CLIENT)]);
    }

    // ========================================================================
    // ENABLE
    // ========================================================================

    #[tokio::test]
    async fn test_enable_creates_unapproved_client() {
        let h = harness();

        let settings = h.service.enable_telemetry().await;

        assert_eq!(
            settings,
            Settings {
                telemetry_requested: true,
                telemetry_sending_enabled: false,
                client_identifier: Some(CLIENT.to_string()),
            }
        );
        assert_eq!(h.store.count(RecordKind::Client), 1);
        assert_eq!(h.client().map(|c| c.is_enabled), Some(false));
        assert_eq!(h.service.status(), LifecycleStatus::PendingApproval);
        assert_eq!(h.push.ids(), vec![format!("{}{}", NS, CLIENT)]);
        assert!(!h.service.log_event("early", None, LogLevel::Info, None));

        // Backup mirrors the local choice
        let backup = h.store.get(RecordKind::SettingsBackup, crate::constants::SETTINGS_BACKUP_RECORD);
        assert!(backup.is_some());
    }

    #[tokio::test]
    async fn test_enable_with_preapproved_client() {
        let h = harness();
        h.enable_approved().await;

        assert_eq!(h.service.status(), LifecycleStatus::Enabled);
        assert_eq!(h.store.count(RecordKind::Client), 1);

        assert!(h.service.log_event("hello", None, LogLevel::Info, Some("x")));
        assert!(wait_for(|| h.store.count(RecordKind::Event) == 1).await);
        let event = &h.store.records(RecordKind::Event)[0];
        assert_eq!(event.get("clientId").and_then(|v| v.as_str()), Some(CLIENT));
    }

    #[tokio::test]
    async fn test_enable_recovers_from_creation_conflict() {
        let store = Arc::new(MemoryRecordStore::new());
        let lagging = Arc::new(LaggingQueries {
            inner: store.clone(),
            stale_client_queries: Mutex::new(1),
        });
        let h = harness_with(lagging, store);
        h.seed_client(true);

        let settings = h.service.enable_telemetry().await;

        assert!(settings.telemetry_sending_enabled);
        assert_eq!(h.service.status(), LifecycleStatus::Enabled);
        assert_eq!(h.store.count(RecordKind::Client), 1);
        assert_eq!(h.store.call_count(Operation::Create), 1);
    }

    #[tokio::test]
    async fn test_enable_failure_reports_error() {
        let h = harness();
        h.store.fail_always(Operation::Query, Some(RecordKind::Client));

        let settings = h.service.enable_telemetry().await;

        assert!(h.service.status().is_error());
        // Local choice was persisted before the remote step failed
        assert!(settings.telemetry_requested);
        assert!(!settings.telemetry_sending_enabled);
    }

    // ========================================================================
    // RECONCILE
    // ========================================================================

    #[tokio::test]
    async fn test_reconcile_outcome_table() {
        use ReconciliationOutcome::*;

        let cases = [
            (true, Some(true), BothEnabled),
            (false, Some(true), ServerOnLocalOff),
            (true, Some(false), ServerOffLocalOn),
            (true, None, ServerOffLocalOn),
            (false, Some(false), PendingApproval),
            (false, None, MissingClient),
        ];

        for (local, server, expected) in cases {
            let h = harness();
            h.seed_settings(true, local);
            if let Some(enabled) = server {
                h.seed_client(enabled);
            }

            let outcome = h.service.reconcile().await;
            assert_eq!(outcome, Some(expected), "local={} server={:?}", local, server);

            let settings = h.service.settings();
            match expected {
                BothEnabled | ServerOnLocalOff => {
                    assert!(settings.telemetry_sending_enabled);
                    assert_eq!(h.service.status(), LifecycleStatus::Enabled);
                    assert!(h.service.logger().is_enabled());
                }
                ServerOffLocalOn | MissingClient => {
                    assert_eq!(settings, Settings::default());
                    assert_eq!(h.service.status(), LifecycleStatus::Disabled);
                    assert_eq!(h.store.count(RecordKind::Client), 0);
                    assert!(h.push.ids().is_empty());
                }
                PendingApproval => {
                    assert!(settings.telemetry_requested);
                    assert!(!settings.telemetry_sending_enabled);
                    assert_eq!(h.service.status(), LifecycleStatus::PendingApproval);
                }
                BothDisabled => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn test_reconcile_turns_on_approved_install() {
        let h = harness();
        h.seed_settings(true, false);
        h.seed_client(true);

        assert_eq!(
            h.service.reconcile().await,
            Some(ReconciliationOutcome::ServerOnLocalOff)
        );
        assert!(SettingsStore::new(h.kv.clone())
            .load()
            .unwrap()
            .telemetry_sending_enabled);
    }

    #[tokio::test]
    async fn test_reconcile_without_request_short_circuits() {
        let h = harness();

        assert_eq!(
            h.service.reconcile().await,
            Some(ReconciliationOutcome::BothDisabled)
        );
        assert_eq!(h.service.status(), LifecycleStatus::Disabled);
        assert_eq!(h.store.call_count(Operation::Query), 0);
    }

    #[tokio::test]
    async fn test_reconcile_error_keeps_local_settings() {
        let h = harness();
        h.seed_settings(true, true);
        h.store.fail_next(Operation::Query, Some(RecordKind::Client), 1);

        assert_eq!(h.service.reconcile().await, None);
        assert!(h.service.status().is_error());
        assert!(SettingsStore::new(h.kv.clone())
            .load()
            .unwrap()
            .telemetry_sending_enabled);
    }

    // ========================================================================
    // DISABLE
    // ========================================================================

    #[tokio::test]
    async fn test_disable_twice_is_safe() {
        let h = harness();
        h.service.enable_telemetry().await;

        for _ in 0..2 {
            let settings = h.service.disable_telemetry().await;
            assert_eq!(settings, Settings::default());
            assert_eq!(h.service.status(), LifecycleStatus::Disabled);
        }
        assert_eq!(h.store.count(RecordKind::Client), 0);
        assert!(h.push.ids().is_empty());
        assert!(h.service.commands().bound_client().is_none());
    }

    #[tokio::test]
    async fn test_disable_partial_failure_still_cleans_up() {
        let h = harness();
        h.enable_approved().await;
        h.insert_event();
        h.store.fail_always(Operation::Delete, Some(RecordKind::Event));

        let settings = h.service.disable_telemetry().await;

        assert_eq!(settings, Settings::default());
        assert!(h.service.status().is_error());
        assert_eq!(h.store.count(RecordKind::Client), 0);
        assert_eq!(h.store.count(RecordKind::Event), 1);
        assert!(h.service.scenario_states().is_empty());
        assert!(!h.service.log_event("after", None, LogLevel::Info, None));
    }

    #[tokio::test]
    async fn test_disable_removes_events_logged_before_startup() {
        let h = harness();
        h.seed_settings(true, true);
        h.seed_client(true);

        assert!(h.service.log_event("launch", None, LogLevel::Info, None));
        h.service.startup().await;
        h.service.wait_until_started().await;
        assert!(wait_for(|| h.store.count(RecordKind::Event) == 1).await);

        let raw = &h.store.records(RecordKind::Event)[0];
        assert_eq!(raw.get("clientId").and_then(|v| v.as_str()), Some(CLIENT));

        h.service.disable_telemetry().await;
        assert_eq!(h.store.count(RecordKind::Event), 0);
    }

    #[tokio::test]
    async fn test_enable_after_disable_uses_fresh_logger() {
        let h = harness();
        h.enable_approved().await;
        h.service.disable_telemetry().await;

        h.enable_approved().await;
        assert!(h.service.logger().is_enabled());
        assert!(h.service.log_event("again", None, LogLevel::Info, None));
        assert!(wait_for(|| h.store.count(RecordKind::Event) == 1).await);
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    #[tokio::test]
    async fn test_disabled_scenario_never_reaches_store() {
        let h = harness();
        h.enable_approved().await;
        h.service.register_scenarios(&["net"]).await;

        assert!(!h.service.log_event("req", Some("net"), LogLevel::Debug, None));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(h.store.count(RecordKind::Event), 0);

        h.service.set_scenario_enabled("net", true).await;
        assert!(h.service.log_event("req", Some("net"), LogLevel::Debug, None));
        assert!(wait_for(|| h.store.count(RecordKind::Event) == 1).await);
        assert_eq!(h.service.logger().stats().accepted, 1);
        assert!(h.scenario_record("net").is_enabled);
    }

    #[tokio::test]
    async fn test_registration_deferred_until_client_exists() {
        let h = harness();
        ScenarioStore::new(h.kv.clone()).set("b", true).unwrap();

        let states = h.service.register_scenarios(&["a", "b"]).await;
        assert_eq!(states.get("a"), Some(&false));
        assert_eq!(states.get("b"), Some(&true));
        assert_eq!(h.store.count(RecordKind::Scenario), 0);

        h.service.enable_telemetry().await;
        assert_eq!(h.store.count(RecordKind::Scenario), 2);
        assert!(h.scenario_record("b").is_enabled);
        assert!(!h.scenario_record("a").is_enabled);
    }

    #[tokio::test]
    async fn test_registration_adopts_remote_value() {
        let h = harness();
        h.enable_approved().await;
        h.store.insert(ScenarioRecord::new(CLIENT, "ops", true).to_raw());

        let states = h.service.register_scenarios(&["ops"]).await;

        assert_eq!(states.get("ops"), Some(&true));
        assert_eq!(ScenarioStore::new(h.kv.clone()).get("ops").unwrap(), Some(true));
        assert_eq!(h.store.count(RecordKind::Scenario), 1);
    }

    #[tokio::test]
    async fn test_end_session_keeps_persisted_flags() {
        let h = harness();
        h.enable_approved().await;
        h.service.register_scenarios(&["a", "b"]).await;
        h.service.set_scenario_enabled("a", true).await;
        let before = h.service.scenario_states();
        h.insert_event();
        let old_session = h.service.logger().session_id();

        h.service.end_session().await;

        assert_eq!(h.store.count(RecordKind::Scenario), 0);
        assert_eq!(h.store.count(RecordKind::Event), 0);
        assert!(h.service.scenario_states().is_empty());
        assert_ne!(h.service.logger().session_id(), old_session);

        let after = h.service.register_scenarios(&["a", "b"]).await;
        assert_eq!(after, before);
        assert!(h.scenario_record("a").is_enabled);
        assert!(!h.scenario_record("b").is_enabled);
    }

    #[tokio::test]
    async fn test_failed_scenario_update_resynced_on_reconcile() {
        let h = harness();
        h.enable_approved().await;
        h.service.register_scenarios(&["x"]).await;

        h.store.fail_next(Operation::Save, Some(RecordKind::Scenario), 1);
        h.service.set_scenario_enabled("x", true).await;
        assert!(!h.scenario_record("x").is_enabled);
        assert_eq!(h.service.scenario_states().get("x"), Some(&true));

        assert_eq!(
            h.service.reconcile().await,
            Some(ReconciliationOutcome::BothEnabled)
        );
        assert!(h.scenario_record("x").is_enabled);
    }

    // ========================================================================
    // REMOTE COMMANDS
    // ========================================================================

    #[tokio::test]
    async fn test_enable_command_approves_and_is_not_rerun() {
        let h = harness();
        h.service.enable_telemetry().await;
        let push = h.issue(CommandAction::Enable, None);

        assert!(h.service.handle_remote_notification(&push).await);
        assert!(h.service.settings().telemetry_sending_enabled);
        assert_eq!(h.service.status(), LifecycleStatus::Enabled);
        assert_eq!(h.client().map(|c| c.is_enabled), Some(true));

        // Operator flips the record back; a re-delivered push must not undo that
        let mut client = h.client().unwrap();
        client.is_enabled = false;
        h.store.insert(client.to_raw());

        assert!(h.service.handle_remote_notification(&push).await);
        assert_eq!(h.client().map(|c| c.is_enabled), Some(false));
    }

    #[tokio::test]
    async fn test_disable_command_tears_everything_down() {
        let h = harness();
        h.enable_approved().await;
        let push = h.issue(CommandAction::Disable, None);

        h.service.handle_remote_notification(&push).await;

        assert_eq!(h.service.settings(), Settings::default());
        assert_eq!(h.service.status(), LifecycleStatus::Disabled);
        assert_eq!(h.store.count(RecordKind::Client), 0);
        assert_eq!(h.store.count(RecordKind::Command), 0);
        assert!(h.push.ids().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_command_updates_local_state() {
        let h = harness();
        h.enable_approved().await;
        h.service.register_scenarios(&["net"]).await;
        let push = h.issue(CommandAction::EnableScenario, Some("net"));

        assert!(h.service.handle_remote_notification(&push).await);

        assert_eq!(h.service.scenario_states().get("net"), Some(&true));
        assert_eq!(ScenarioStore::new(h.kv.clone()).get("net").unwrap(), Some(true));
        assert!(h.scenario_record("net").is_enabled);
    }

    #[tokio::test]
    async fn test_delete_events_command() {
        let h = harness();
        h.enable_approved().await;
        h.insert_event();
        h.insert_event();
        let push = h.issue(CommandAction::DeleteEvents, None);

        assert!(h.service.handle_remote_notification(&push).await);
        assert_eq!(h.store.count(RecordKind::Event), 0);
    }

    #[tokio::test]
    async fn test_foreign_payload_is_not_handled() {
        let h = harness();
        h.service.enable_telemetry().await;

        assert!(!h.service.handle_remote_payload(&json!({ "aps": { "alert": "hi" } })).await);
        assert!(
            h.service
                .handle_remote_payload(&json!({ "subscriptionID": format!("{}{}", NS, CLIENT) }))
                .await
        );
        assert!(h.kv.get(crate::constants::KEY_TELEMETRY_REQUESTED).unwrap().is_some());
    }

    // ========================================================================
    // COMMAND POLL
    // ========================================================================

    #[tokio::test]
    async fn test_poll_picks_up_command_without_push() {
        let h = polling_harness(Duration::from_millis(50));
        h.enable_approved().await;
        // Let the scan kicked off by enable finish first
        tokio::time::sleep(Duration::from_millis(100)).await;

        h.insert_event();
        let command = h.issue(CommandAction::DeleteEvents, None);

        assert!(wait_for(|| h.command_status(&command) == Some(CommandStatus::Executed)).await);
        assert_eq!(h.store.count(RecordKind::Event), 0);
    }

    #[tokio::test]
    async fn test_poll_stops_after_disable() {
        let h = polling_harness(Duration::from_millis(20));
        h.enable_approved().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        h.service.disable_telemetry().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let queries = h.store.call_count(Operation::Query);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.store.call_count(Operation::Query), queries);
    }

    #[tokio::test]
    async fn test_zero_poll_interval_disables_polling() {
        let h = polling_harness(Duration::ZERO);
        h.enable_approved().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let command = h.issue(CommandAction::DeleteEvents, None);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.command_status(&command), Some(CommandStatus::Pending));

        assert!(h.service.handle_remote_notification(&command).await);
        assert_eq!(h.command_status(&command), Some(CommandStatus::Executed));
    }
}
