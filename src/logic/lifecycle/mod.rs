//! Telemetry Lifecycle
//!
//! Root orchestrator keeping local settings, the remote client record and
//! the event logger consistent.
//!
//! ## Structure
//! - `status.rs` - status machine, reconciliation outcomes, snapshot
//! - `identifier.rs` - client identifier generation
//! - `handler.rs` - command handlers routed back into the service
//! - `mod.rs` - `LifecycleService`
//!
//! Every public entry point except `handle_remote_notification` runs under
//! one async operation lock. Command handlers re-enter the service through
//! that lock, so command scans are always started on their own task and
//! never awaited while the lock is held.

mod handler;
pub mod identifier;
pub mod status;

#[cfg(test)]
mod tests;

pub use identifier::{FixedIdentifier, IdentifierGenerator, RandomIdentifier};
pub use status::{DisableReason, LifecycleSnapshot, LifecycleStatus, ReconciliationOutcome};

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;

use crate::constants::SETTINGS_BACKUP_RECORD;
use crate::logic::commands::CommandProcessor;
use crate::logic::config::TelemetryConfig;
use crate::logic::device::DeviceInfo;
use crate::logic::error::{RecordError, TelemetryError, TelemetryResult};
use crate::logic::logger::{EventLogger, LogLevel};
use crate::logic::remote::records::{
    ClientRecord, Query, RecordKind, ScenarioRecord, SettingsBackup,
};
use crate::logic::remote::{RecordStore, Records};
use crate::logic::settings::{
    KeyValueStore, ScenarioStates, ScenarioStore, Settings, SettingsStore,
};
use crate::logic::subscription::{PushRegistrar, RemoteNotification, SubscriptionManager};
use handler::LifecycleCommandHandler;

/// External collaborators the service drives
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub settings: Arc<dyn KeyValueStore>,
    pub push: Arc<dyn PushRegistrar>,
    pub identifiers: Arc<dyn IdentifierGenerator>,
    pub device: DeviceInfo,
}

pub struct LifecycleService {
    me: Weak<LifecycleService>,
    config: TelemetryConfig,
    store: Arc<dyn RecordStore>,
    records: Records,
    settings_store: SettingsStore,
    scenario_store: ScenarioStore,
    subscriptions: SubscriptionManager,
    commands: Arc<CommandProcessor>,
    identifiers: Arc<dyn IdentifierGenerator>,
    device: DeviceInfo,

    logger: RwLock<Arc<EventLogger>>,
    op_lock: tokio::sync::Mutex<()>,
    started: OnceCell<Settings>,
    startup_done: watch::Sender<bool>,
    projection: RwLock<LifecycleSnapshot>,

    /// Names registered before a client id existed
    deferred_scenarios: Mutex<BTreeSet<String>>,
    /// Remote scenario records by name
    scenario_records: Mutex<HashMap<String, ScenarioRecord>>,
    /// Scenarios whose last remote update failed
    unsynced: Mutex<BTreeSet<String>>,
    poll_cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl LifecycleService {
    pub fn new(config: TelemetryConfig, collaborators: Collaborators) -> Arc<Self> {
        let Collaborators {
            records,
            settings,
            push,
            identifiers,
            device,
        } = collaborators;

        let logger = Arc::new(EventLogger::new(
            config.logger.clone(),
            records.clone(),
            device.clone(),
        ));
        let commands = Arc::new(CommandProcessor::new(records.clone(), config.commands.clone()));
        let subscriptions = SubscriptionManager::new(push, config.commands.namespace.clone());
        let (startup_done, _) = watch::channel(false);

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            records: Records::new(records.clone()),
            store: records,
            settings_store: SettingsStore::new(settings.clone()),
            scenario_store: ScenarioStore::new(settings),
            subscriptions,
            commands,
            identifiers,
            device,
            logger: RwLock::new(logger),
            op_lock: tokio::sync::Mutex::new(()),
            started: OnceCell::new(),
            startup_done,
            projection: RwLock::new(LifecycleSnapshot::default()),
            deferred_scenarios: Mutex::new(BTreeSet::new()),
            scenario_records: Mutex::new(HashMap::new()),
            unsynced: Mutex::new(BTreeSet::new()),
            poll_cancel: Mutex::new(None),
        })
    }

    // ========================================================================
    // PROJECTION
    // ========================================================================

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.projection.read().clone()
    }

    pub fn status(&self) -> LifecycleStatus {
        self.projection.read().status.clone()
    }

    pub fn settings(&self) -> Settings {
        self.projection.read().settings.clone()
    }

    pub fn scenario_states(&self) -> ScenarioStates {
        self.projection.read().scenario_states.clone()
    }

    /// The logger currently receiving events. Replaced after every disable.
    pub fn logger(&self) -> Arc<EventLogger> {
        self.logger.read().clone()
    }

    pub fn commands(&self) -> &Arc<CommandProcessor> {
        &self.commands
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Non-blocking event entry point
    pub fn log_event(
        &self,
        name: &str,
        scenario: Option<&str>,
        level: LogLevel,
        property1: Option<&str>,
    ) -> bool {
        self.logger.read().log_event(name, scenario, level, property1)
    }

    fn set_status(&self, status: LifecycleStatus) {
        log::info!("Telemetry status: {:?}", status);
        self.projection.write().status = status;
    }

    fn fail(&self, error: &TelemetryError) {
        log::error!("Telemetry operation failed: {}", error);
        self.set_status(LifecycleStatus::Error(error.to_string()));
    }

    fn publish_settings(&self, settings: &Settings) {
        self.projection.write().settings = settings.clone();
    }

    fn publish_scenarios(&self, states: ScenarioStates) {
        self.logger().set_scenario_states(states.clone());
        self.projection.write().scenario_states = states;
    }

    /// Save locally, then mirror to the private backup record
    async fn persist(&self, settings: &Settings) -> TelemetryResult<()> {
        self.settings_store.save(settings)?;
        self.publish_settings(settings);

        if let Err(e) = self.records.save(&SettingsBackup::from(settings)).await {
            log::warn!("Settings backup failed: {}", e);
        }
        Ok(())
    }

    // ========================================================================
    // STARTUP
    // ========================================================================

    /// Load local settings and kick off restoration and reconciliation in
    /// the background. Later callers get the same settings without
    /// triggering anything.
    pub async fn startup(&self) -> Settings {
        let mut first = false;
        let settings = self
            .started
            .get_or_init(|| {
                first = true;
                match self.settings_store.load() {
                    Ok(settings) => settings,
                    Err(e) => {
                        log::error!("Failed to load telemetry settings: {}", e);
                        Settings::default()
                    }
                }
            })
            .clone();

        if first {
            self.publish_settings(&settings);
            self.logger().set_client_id(settings.client_identifier.clone());
            self.set_status(LifecycleStatus::Loading);

            match self.me.upgrade() {
                Some(service) => {
                    tokio::spawn(async move { service.finish_startup().await });
                }
                None => log::warn!("Lifecycle service dropped during startup"),
            }
        }

        settings
    }

    /// Resolve once background startup work has finished. Never resolves if
    /// [`startup`](Self::startup) was not called.
    pub async fn wait_until_started(&self) {
        let mut rx = self.startup_done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    async fn finish_startup(&self) {
        let _op = self.op_lock.lock().await;

        match self.restore_from_backup().await {
            Ok(Some(restored)) => log::info!(
                "Telemetry settings restored from backup (requested: {})",
                restored.telemetry_requested
            ),
            Ok(None) => {}
            Err(e) => log::warn!("Settings backup restore skipped: {}", e),
        }

        let settings = match self.settings_store.load() {
            Ok(settings) => settings,
            Err(e) => {
                self.fail(&TelemetryError::from(e));
                self.settings()
            }
        };
        self.publish_settings(&settings);

        let enabled = if settings.telemetry_requested {
            match self.reconcile_locked().await {
                Ok(outcome) => outcome.sends_events(),
                Err(e) => {
                    self.fail(&e);
                    settings.telemetry_sending_enabled
                }
            }
        } else {
            self.set_status(LifecycleStatus::Disabled);
            false
        };

        self.logger().activate(enabled);
        self.flush_deferred_scenarios().await;

        let _ = self.startup_done.send(true);
        log::info!("Telemetry startup complete");
    }

    /// Restore from the private backup on a fresh install only
    async fn restore_from_backup(&self) -> TelemetryResult<Option<Settings>> {
        if !self.settings_store.is_first_run()? {
            return Ok(None);
        }

        let backup = self
            .records
            .fetch::<SettingsBackup>(SETTINGS_BACKUP_RECORD)
            .await?;

        match backup {
            Some(backup) if !backup.settings.is_default() => {
                self.settings_store.save(&backup.settings)?;
                self.publish_settings(&backup.settings);
                Ok(Some(backup.settings))
            }
            _ => Ok(None),
        }
    }

    // ========================================================================
    // ENABLE
    // ========================================================================

    pub async fn enable_telemetry(&self) -> Settings {
        let _op = self.op_lock.lock().await;

        match self.enable_locked().await {
            Ok(settings) => settings,
            Err(e) => {
                self.fail(&e);
                self.settings()
            }
        }
    }

    async fn enable_locked(&self) -> TelemetryResult<Settings> {
        self.set_status(LifecycleStatus::Syncing);

        let stored = self.settings_store.load()?;
        let client_id = stored
            .client_identifier
            .unwrap_or_else(|| self.identifiers.generate());

        let mut settings = Settings {
            telemetry_requested: true,
            telemetry_sending_enabled: false,
            client_identifier: Some(client_id.clone()),
        };
        self.persist(&settings).await?;
        self.logger().set_client_id(Some(client_id.clone()));

        let client = self.find_or_create_client(&client_id).await?;
        if client.is_enabled {
            settings.telemetry_sending_enabled = true;
            self.persist(&settings).await?;
            self.logger().set_enabled(true);
            self.set_status(LifecycleStatus::Enabled);
        } else {
            self.logger().set_enabled(false);
            self.set_status(LifecycleStatus::PendingApproval);
        }

        self.wire_commands(&client_id).await;
        self.flush_deferred_scenarios().await;

        Ok(settings)
    }

    async fn find_client(&self, client_id: &str) -> Result<Option<ClientRecord>, RecordError> {
        let mut hits = self
            .records
            .query::<ClientRecord>(&Query::client(client_id))
            .await?;
        // Approved record wins if duplicates slipped through
        hits.sort_by_key(|c| !c.is_enabled);
        Ok(hits.into_iter().next())
    }

    async fn find_or_create_client(&self, client_id: &str) -> TelemetryResult<ClientRecord> {
        if let Some(existing) = self.find_client(client_id).await? {
            return Ok(existing);
        }

        match self.records.create(&ClientRecord::new(client_id)).await {
            Ok(created) => {
                log::info!("Client record created for {}", client_id);
                Ok(created)
            }
            Err(e) if e.is_conflict() => {
                log::info!("Client record for {} already exists, re-fetching", client_id);
                self.records
                    .fetch::<ClientRecord>(client_id)
                    .await?
                    .ok_or_else(|| RecordError::NotFound(client_id.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ========================================================================
    // DISABLE
    // ========================================================================

    pub async fn disable_telemetry(&self) -> Settings {
        self.disable_with_reason(DisableReason::UserRequest).await
    }

    pub async fn disable_with_reason(&self, reason: DisableReason) -> Settings {
        let _op = self.op_lock.lock().await;
        self.disable_locked(reason).await
    }

    async fn disable_locked(&self, reason: DisableReason) -> Settings {
        log::info!("Disabling telemetry ({})", reason.as_str());
        self.set_status(LifecycleStatus::Syncing);

        let client_id = match self.settings_store.load() {
            Ok(settings) => settings.client_identifier,
            Err(e) => {
                log::warn!("Could not read settings during disable: {}", e);
                self.settings().client_identifier
            }
        };

        self.teardown_commands().await;
        self.retire_logger().await;

        let mut failures = Vec::new();
        if let Err(e) = self.reset_local().await {
            failures.push(e.to_string());
        }

        if let Some(client_id) = client_id {
            let query = Query::client(&client_id);
            for kind in [
                RecordKind::Client,
                RecordKind::Event,
                RecordKind::Command,
                RecordKind::Scenario,
            ] {
                match self.records.delete_matching(kind, &query).await {
                    Ok(n) if n > 0 => log::info!("Deleted {} {} records", n, kind),
                    Ok(_) => {}
                    Err(e) => failures.push(format!("{}: {}", kind, e)),
                }
            }
        }

        if failures.is_empty() {
            self.set_status(LifecycleStatus::Disabled);
        } else {
            let message = format!("disabled with cleanup errors: {}", failures.join("; "));
            log::error!("Telemetry {}", message);
            self.set_status(LifecycleStatus::Error(message));
        }

        self.settings()
    }

    /// Shut the current logger down and install a fresh one that drops events
    async fn retire_logger(&self) {
        let fresh = Arc::new(EventLogger::new(
            self.config.logger.clone(),
            self.store.clone(),
            self.device.clone(),
        ));
        fresh.activate(false);

        let old = std::mem::replace(&mut *self.logger.write(), fresh);
        old.shutdown().await;
    }

    /// Defaults on disk and in memory. Persisted scenario flags survive.
    async fn reset_local(&self) -> TelemetryResult<()> {
        let defaults = Settings::default();
        self.publish_settings(&defaults);
        self.clear_scenario_session();
        self.deferred_scenarios.lock().clear();
        self.unsynced.lock().clear();
        self.logger().set_client_id(None);
        self.persist(&defaults).await
    }

    fn clear_scenario_session(&self) {
        self.scenario_records.lock().clear();
        self.publish_scenarios(ScenarioStates::new());
    }

    // ========================================================================
    // RECONCILE
    // ========================================================================

    /// Compare local enablement with the remote client record and settle any
    /// difference. `None` when the comparison itself failed.
    pub async fn reconcile(&self) -> Option<ReconciliationOutcome> {
        let _op = self.op_lock.lock().await;

        match self.reconcile_locked().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.fail(&e);
                None
            }
        }
    }

    async fn reconcile_locked(&self) -> TelemetryResult<ReconciliationOutcome> {
        let mut settings = self.settings_store.load()?;
        self.publish_settings(&settings);

        if !settings.telemetry_requested {
            self.logger().set_enabled(false);
            self.set_status(LifecycleStatus::Disabled);
            return Ok(ReconciliationOutcome::BothDisabled);
        }

        self.set_status(LifecycleStatus::Syncing);

        let remote = match settings.client_identifier.as_deref() {
            Some(client_id) => self.find_client(client_id).await?,
            None => None,
        };
        let outcome = ReconciliationOutcome::classify(
            settings.telemetry_sending_enabled,
            remote.as_ref().map(|c| c.is_enabled),
        );
        log::info!("Reconciliation outcome: {:?}", outcome);

        let client_id = match (&outcome, settings.client_identifier.clone()) {
            (ReconciliationOutcome::ServerOffLocalOn, _) => {
                self.disable_locked(DisableReason::ServerOffLocalOn).await;
                return Ok(outcome);
            }
            (ReconciliationOutcome::MissingClient, _) | (_, None) => {
                log::info!("No client record for this install, resetting locally");
                self.teardown_commands().await;
                self.logger().set_enabled(false);
                self.reset_local().await?;
                self.set_status(LifecycleStatus::Disabled);
                return Ok(ReconciliationOutcome::MissingClient);
            }
            (_, Some(client_id)) => client_id,
        };

        self.logger().set_client_id(Some(client_id.clone()));

        match outcome {
            ReconciliationOutcome::ServerOnLocalOff => {
                settings.telemetry_sending_enabled = true;
                self.persist(&settings).await?;
                self.logger().set_enabled(true);
                self.set_status(LifecycleStatus::Enabled);
            }
            ReconciliationOutcome::BothEnabled => {
                self.logger().set_enabled(true);
                self.set_status(LifecycleStatus::Enabled);
            }
            _ => {
                self.logger().set_enabled(false);
                self.set_status(LifecycleStatus::PendingApproval);
            }
        }

        self.wire_commands(&client_id).await;
        self.push_unsynced_scenarios().await;

        Ok(outcome)
    }

    // ========================================================================
    // COMMAND WIRING
    // ========================================================================

    pub async fn handle_remote_notification(&self, notification: &RemoteNotification) -> bool {
        self.commands.handle_remote_notification(notification).await
    }

    /// Parse an opaque push payload and handle it
    pub async fn handle_remote_payload(&self, payload: &Value) -> bool {
        self.handle_remote_notification(&RemoteNotification::from_json(payload))
            .await
    }

    async fn wire_commands(&self, client_id: &str) {
        let handler = Arc::new(LifecycleCommandHandler::new(self.me.clone()));
        self.commands.bind(client_id, handler);

        if let Err(e) = self.subscriptions.ensure_subscribed(client_id).await {
            log::warn!("Command subscription failed, relying on polling: {}", e);
        }

        self.start_command_poll();

        let commands = self.commands.clone();
        tokio::spawn(async move {
            if let Err(e) = commands.process_commands().await {
                log::warn!("Initial command scan failed: {}", e);
            }
        });
    }

    fn start_command_poll(&self) {
        let Some(interval) = self.config.commands.poll_interval.filter(|i| !i.is_zero()) else {
            return;
        };

        let mut slot = self.poll_cancel.lock();
        if slot.is_some() {
            return;
        }

        let (cancel, mut cancelled) = watch::channel(false);
        let commands = self.commands.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = commands.process_commands().await {
                            log::warn!("Command poll failed: {}", e);
                        }
                    }
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            break;
                        }
                    }
                }
            }

            log::debug!("Command poll stopped");
        });

        *slot = Some(cancel);
    }

    async fn teardown_commands(&self) {
        self.commands.unbind();

        let cancel = self.poll_cancel.lock().take();
        if let Some(cancel) = cancel {
            let _ = cancel.send(true);
        }

        if let Err(e) = self.subscriptions.unsubscribe_all().await {
            log::warn!("Failed to remove command subscriptions: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Command effects
    // ------------------------------------------------------------------

    /// Operator approval: flip local sending and the remote flag on
    pub(crate) async fn apply_remote_enable(&self) -> TelemetryResult<()> {
        let _op = self.op_lock.lock().await;

        let mut settings = self.settings_store.load()?;
        let client_id = match (&settings.client_identifier, settings.telemetry_requested) {
            (Some(id), true) => id.clone(),
            _ => {
                return Err(TelemetryError::NotConfigured(
                    "telemetry was not requested on this install".to_string(),
                ))
            }
        };

        settings.telemetry_sending_enabled = true;
        self.persist(&settings).await?;
        self.logger().set_enabled(true);
        self.set_status(LifecycleStatus::Enabled);

        let mut client = self.find_or_create_client(&client_id).await?;
        if !client.is_enabled {
            client.is_enabled = true;
            self.records.save(&client).await?;
        }

        log::info!("Telemetry approved remotely for {}", client_id);
        Ok(())
    }

    pub(crate) async fn delete_events(&self) -> TelemetryResult<usize> {
        let _op = self.op_lock.lock().await;

        let client_id = self
            .settings()
            .client_identifier
            .ok_or_else(|| TelemetryError::NotConfigured("no client identifier".to_string()))?;

        let deleted = self
            .records
            .delete_matching(RecordKind::Event, &Query::client(&client_id))
            .await?;
        log::info!("Deleted {} telemetry events on request", deleted);
        Ok(deleted)
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// Register logging scenarios, creating missing remote records. Without a
    /// client id the names are kept until one exists.
    pub async fn register_scenarios(&self, names: &[&str]) -> ScenarioStates {
        let _op = self.op_lock.lock().await;
        let names: BTreeSet<String> = names.iter().map(|n| n.to_string()).collect();

        if let Err(e) = self.register_scenarios_locked(names).await {
            self.fail(&e);
        }
        self.scenario_states()
    }

    async fn register_scenarios_locked(&self, names: BTreeSet<String>) -> TelemetryResult<()> {
        let local = self.scenario_store.load_all(names.iter().map(String::as_str))?;
        let mut merged = self.scenario_states();
        merged.extend(local.clone());

        let Some(client_id) = self.settings_store.load()?.client_identifier else {
            log::info!("No client id yet, deferring {} scenarios", names.len());
            self.deferred_scenarios.lock().extend(names);
            self.publish_scenarios(merged);
            return Ok(());
        };

        let existing: HashMap<String, ScenarioRecord> = self
            .records
            .query::<ScenarioRecord>(&Query::client(&client_id))
            .await?
            .into_iter()
            .map(|r| (r.scenario_name.clone(), r))
            .collect();

        let unsynced = self.unsynced.lock().clone();

        for name in &names {
            let local_enabled = local.get(name).copied().unwrap_or(false);

            match existing.get(name) {
                Some(record) if unsynced.contains(name) => {
                    self.push_scenario(record.clone(), local_enabled).await;
                }
                Some(record) => {
                    if record.is_enabled != local_enabled {
                        self.scenario_store.set(name, record.is_enabled)?;
                    }
                    merged.insert(name.clone(), record.is_enabled);
                    self.scenario_records
                        .lock()
                        .insert(name.clone(), record.clone());
                }
                None => {
                    let record = ScenarioRecord::new(&client_id, name, local_enabled);
                    let created = match self.records.create(&record).await {
                        Ok(created) => created,
                        Err(e) if e.is_conflict() => self
                            .records
                            .fetch::<ScenarioRecord>(&record.id)
                            .await?
                            .unwrap_or(record),
                        Err(e) => return Err(e.into()),
                    };
                    self.scenario_records.lock().insert(name.clone(), created);
                }
            }
        }

        self.publish_scenarios(merged);
        log::info!("Registered {} scenarios for {}", names.len(), client_id);
        Ok(())
    }

    async fn flush_deferred_scenarios(&self) {
        let has_client = self.settings().client_identifier.is_some();
        if !has_client {
            return;
        }

        let names = std::mem::take(&mut *self.deferred_scenarios.lock());
        if names.is_empty() {
            return;
        }

        if let Err(e) = self.register_scenarios_locked(names.clone()).await {
            log::warn!("Deferred scenario registration failed: {}", e);
            self.deferred_scenarios.lock().extend(names);
        }
    }

    /// Toggle a scenario locally and remotely. Serves both UI toggles and
    /// inbound scenario commands.
    pub async fn set_scenario_enabled(&self, name: &str, enabled: bool) {
        if let Err(e) = self.update_scenario(name, enabled).await {
            self.fail(&e);
        }
    }

    pub(crate) async fn update_scenario(&self, name: &str, enabled: bool) -> TelemetryResult<()> {
        let _op = self.op_lock.lock().await;

        self.scenario_store.set(name, enabled)?;
        let mut states = self.scenario_states();
        states.insert(name.to_string(), enabled);
        self.publish_scenarios(states);

        let record = self.scenario_records.lock().get(name).cloned();
        if let Some(record) = record {
            self.push_scenario(record, enabled).await;
        }

        log::info!("Scenario {} set to {}", name, enabled);
        Ok(())
    }

    /// Write a scenario flag remotely, remembering failures for the next
    /// reconcile
    async fn push_scenario(&self, mut record: ScenarioRecord, enabled: bool) -> bool {
        let name = record.scenario_name.clone();
        record.is_enabled = enabled;

        match self.records.save(&record).await {
            Ok(saved) => {
                self.scenario_records.lock().insert(name.clone(), saved);
                self.unsynced.lock().remove(&name);
                true
            }
            Err(e) => {
                log::warn!("Remote update of scenario {} failed: {}", name, e);
                self.scenario_records.lock().insert(name.clone(), record);
                self.unsynced.lock().insert(name);
                false
            }
        }
    }

    async fn push_unsynced_scenarios(&self) {
        let names: Vec<String> = self.unsynced.lock().iter().cloned().collect();

        for name in names {
            let record = self.scenario_records.lock().get(&name).cloned();
            let Some(record) = record else { continue };

            let enabled = match self.scenario_store.get(&name) {
                Ok(Some(enabled)) => enabled,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Could not read scenario {}: {}", name, e);
                    continue;
                }
            };

            if self.push_scenario(record, enabled).await {
                log::info!("Scenario {} resynchronised", name);
            }
        }
    }

    // ========================================================================
    // SESSION
    // ========================================================================

    /// Delete this session's remote scenario and event records and clear the
    /// in-memory scenario state. Persisted scenario flags are kept.
    pub async fn end_session(&self) {
        let _op = self.op_lock.lock().await;

        let mut failures = Vec::new();
        if let Some(client_id) = self.settings().client_identifier {
            let query = Query::client(&client_id);
            for kind in [RecordKind::Scenario, RecordKind::Event] {
                if let Err(e) = self.records.delete_matching(kind, &query).await {
                    failures.push(format!("{}: {}", kind, e));
                }
            }
        }

        self.clear_scenario_session();
        let session_id = self.logger().start_new_session();
        log::info!("Telemetry session ended, next session {}", session_id);

        if !failures.is_empty() {
            self.set_status(LifecycleStatus::Error(format!(
                "session cleanup failed: {}",
                failures.join("; ")
            )));
        }
    }
}
