//! Command processor tests

#[cfg(test)]
mod processor_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use crate::logic::commands::{CommandHandler, CommandProcessor};
    use crate::logic::config::CommandConfig;
    use crate::logic::error::{TelemetryError, TelemetryResult};
    use crate::logic::remote::memory::{MemoryRecordStore, Operation};
    use crate::logic::remote::records::{
        CommandAction, CommandRecord, CommandStatus, Record, RecordKind,
    };
    use crate::logic::subscription::RemoteNotification;

    const CLIENT: &str = "abc123def0";
    const NS: &str = "telemetry-commands-";

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
        fail_on: Option<CommandAction>,
    }

    impl RecordingHandler {
        fn failing(action: CommandAction) -> Self {
            Self {
                fail_on: Some(action),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn record(&self, action: CommandAction, call: String) -> TelemetryResult<()> {
            self.calls.lock().push(call);
            if self.fail_on == Some(action) {
                return Err(TelemetryError::Handler("boom".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommandHandler for RecordingHandler {
        async fn on_enable(&self) -> TelemetryResult<()> {
            self.record(CommandAction::Enable, "enable".into())
        }
        async fn on_disable(&self) -> TelemetryResult<()> {
            self.record(CommandAction::Disable, "disable".into())
        }
        async fn on_delete_events(&self) -> TelemetryResult<()> {
            self.record(CommandAction::DeleteEvents, "deleteEvents".into())
        }
        async fn on_enable_scenario(&self, name: &str) -> TelemetryResult<()> {
            self.record(CommandAction::EnableScenario, format!("enableScenario:{}", name))
        }
        async fn on_disable_scenario(&self, name: &str) -> TelemetryResult<()> {
            self.record(CommandAction::DisableScenario, format!("disableScenario:{}", name))
        }
    }

    fn config() -> CommandConfig {
        CommandConfig {
            fetch_attempts: 3,
            fetch_retry_delay: Duration::from_millis(1),
            poll_interval: None,
            namespace: NS.to_string(),
        }
    }

    fn setup(handler: RecordingHandler) -> (CommandProcessor, Arc<MemoryRecordStore>, Arc<RecordingHandler>) {
        let store = Arc::new(MemoryRecordStore::new());
        let handler = Arc::new(handler);
        let processor = CommandProcessor::new(store.clone(), config());
        processor.bind(CLIENT, handler.clone());
        (processor, store, handler)
    }

    /// Insert a pending command created `age_secs` ago
    fn issue(
        store: &MemoryRecordStore,
        client: &str,
        action: CommandAction,
        scenario: Option<&str>,
        age_secs: i64,
    ) -> String {
        let mut command = CommandRecord::pending(client, action, scenario);
        command.created = Utc::now() - chrono::Duration::seconds(age_secs);
        store.insert(command.to_raw());
        command.id
    }

    fn status_of(store: &MemoryRecordStore, id: &str) -> CommandRecord {
        let raw = store.get(RecordKind::Command, id).unwrap();
        CommandRecord::from_raw(&raw).unwrap()
    }

    fn push(record_id: Option<&str>) -> RemoteNotification {
        let notification = RemoteNotification::new(format!("{}{}", NS, CLIENT));
        match record_id {
            Some(id) => notification.with_record(id),
            None => notification,
        }
    }

    #[tokio::test]
    async fn test_commands_run_in_creation_order() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let newest = issue(&store, CLIENT, CommandAction::DeleteEvents, None, 1);
        let oldest = issue(&store, CLIENT, CommandAction::Enable, None, 30);
        let middle = issue(&store, CLIENT, CommandAction::EnableScenario, Some("net"), 10);

        let outcomes = processor.process_commands().await.unwrap();

        assert_eq!(handler.calls(), vec!["enable", "enableScenario:net", "deleteEvents"]);
        let order: Vec<_> = outcomes.iter().map(|o| o.record_id.clone()).collect();
        assert_eq!(order, vec![oldest.clone(), middle.clone(), newest.clone()]);

        for id in [oldest, middle, newest] {
            let command = status_of(&store, &id);
            assert_eq!(command.status, CommandStatus::Executed);
            assert!(command.executed_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_handler_failure_is_recorded_and_later_commands_run() {
        let (processor, store, handler) = setup(RecordingHandler::failing(CommandAction::Enable));
        let failing = issue(&store, CLIENT, CommandAction::Enable, None, 5);
        let next = issue(&store, CLIENT, CommandAction::DeleteEvents, None, 1);

        processor.process_commands().await.unwrap();

        let failed = status_of(&store, &failing);
        assert_eq!(failed.status, CommandStatus::Failed);
        assert!(failed.error_message.unwrap().contains("boom"));
        assert_eq!(status_of(&store, &next).status, CommandStatus::Executed);
        assert_eq!(handler.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_command_without_name_fails_without_handler() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let id = issue(&store, CLIENT, CommandAction::DisableScenario, None, 1);

        processor.process_commands().await.unwrap();

        let command = status_of(&store, &id);
        assert_eq!(command.status, CommandStatus::Failed);
        assert!(command.error_message.is_some());
        assert!(handler.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_write_failure_keeps_handler_outcome() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let id = issue(&store, CLIENT, CommandAction::Enable, None, 1);
        store.fail_next(Operation::Save, Some(RecordKind::Command), 1);

        let outcomes = processor.process_commands().await.unwrap();
        assert_eq!(outcomes[0].status, CommandStatus::Executed);

        // Remote copy is still pending but the handler does not run again
        assert_eq!(status_of(&store, &id).status, CommandStatus::Pending);
        processor.process_commands().await.unwrap();
        assert_eq!(handler.calls(), vec!["enable"]);
        assert!(processor.is_completed(&id));
    }

    #[tokio::test]
    async fn test_redelivered_push_does_not_rerun() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let id = issue(&store, CLIENT, CommandAction::EnableScenario, Some("ui"), 1);

        assert!(processor.handle_remote_notification(&push(Some(&id))).await);
        assert!(processor.handle_remote_notification(&push(Some(&id))).await);
        assert!(processor.handle_remote_notification(&push(None)).await);

        assert_eq!(handler.calls(), vec!["enableScenario:ui"]);
        assert_eq!(status_of(&store, &id).status, CommandStatus::Executed);
    }

    #[tokio::test]
    async fn test_push_absorbs_replication_lag() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let id = issue(&store, CLIENT, CommandAction::DeleteEvents, None, 1);
        store.hide_from_fetch(&id, 2);

        assert!(processor.handle_remote_notification(&push(Some(&id))).await);

        assert_eq!(handler.calls(), vec!["deleteEvents"]);
        assert_eq!(store.call_count(Operation::Fetch), 3);
        assert_eq!(store.call_count(Operation::Query), 0);
    }

    #[tokio::test]
    async fn test_push_falls_back_to_scan() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let id = issue(&store, CLIENT, CommandAction::Disable, None, 1);
        store.hide_from_fetch(&id, 10);

        assert!(processor.handle_remote_notification(&push(Some(&id))).await);

        assert_eq!(store.call_count(Operation::Fetch), 3);
        assert_eq!(store.call_count(Operation::Query), 1);
        assert_eq!(handler.calls(), vec!["disable"]);
    }

    #[tokio::test]
    async fn test_foreign_notifications_are_rejected() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        issue(&store, CLIENT, CommandAction::Enable, None, 1);

        let foreign = RemoteNotification::new("someone-else-abc");
        assert!(!processor.handle_remote_notification(&foreign).await);
        assert!(!processor
            .handle_remote_notification(&RemoteNotification::default())
            .await);

        assert!(handler.calls().is_empty());
        assert_eq!(store.call_count(Operation::Query), 0);
    }

    #[tokio::test]
    async fn test_unbound_processor_does_nothing() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        issue(&store, CLIENT, CommandAction::Enable, None, 1);
        processor.unbind();

        assert!(processor.process_commands().await.unwrap().is_empty());
        assert!(!processor.handle_remote_notification(&push(None)).await);
        assert!(handler.calls().is_empty());
        assert!(processor.bound_client().is_none());
    }

    #[tokio::test]
    async fn test_unbind_clears_completed_ledger() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let id = issue(&store, CLIENT, CommandAction::DeleteEvents, None, 1);

        processor.process_commands().await.unwrap();
        assert!(processor.is_completed(&id));

        processor.unbind();
        assert!(!processor.is_completed(&id));

        // Rebinding does not resurrect the executed command
        processor.bind(CLIENT, handler.clone());
        processor.process_commands().await.unwrap();
        assert_eq!(handler.calls(), vec!["deleteEvents"]);
    }

    #[tokio::test]
    async fn test_other_clients_commands_are_ignored() {
        let (processor, store, handler) = setup(RecordingHandler::default());
        let other = issue(&store, "someoneelse", CommandAction::Enable, None, 1);

        processor.process_commands().await.unwrap();
        assert!(processor.handle_remote_notification(&push(Some(&other))).await);

        assert!(handler.calls().is_empty());
        assert_eq!(status_of(&store, &other).status, CommandStatus::Pending);
    }

    #[tokio::test]
    async fn test_scan_error_surfaces() {
        let (processor, store, _handler) = setup(RecordingHandler::default());
        store.fail_next(Operation::Query, Some(RecordKind::Command), 1);

        assert!(processor.process_commands().await.is_err());
        assert!(processor.process_commands().await.is_ok());
    }
}
