//! Remote Command Processing
//!
//! Turns operator-issued command records into ordered, at-most-once local
//! state transitions.
//!
//! ## Flow
//! 1. A push notification (or the periodic poll) wakes the processor
//! 2. Pending commands for the bound client are fetched, oldest first
//! 3. Each one runs through the [`CommandHandler`] and is written back as
//!    `executed` or `failed` before the next one starts
//!
//! Record ids that reached a terminal status in this session are kept in a
//! ledger, so a re-delivered push never runs a handler twice even when the
//! status write-back was lost.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::logic::config::CommandConfig;
use crate::logic::error::{TelemetryError, TelemetryResult};
use crate::logic::remote::records::{
    CommandAction, CommandRecord, CommandStatus, Query, FIELD_CREATED, FIELD_STATUS,
};
use crate::logic::remote::{RecordStore, Records};
use crate::logic::subscription::RemoteNotification;

/// Local effects of each command action
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn on_enable(&self) -> TelemetryResult<()>;
    async fn on_disable(&self) -> TelemetryResult<()>;
    async fn on_delete_events(&self) -> TelemetryResult<()>;
    async fn on_enable_scenario(&self, name: &str) -> TelemetryResult<()>;
    async fn on_disable_scenario(&self, name: &str) -> TelemetryResult<()>;
}

/// Result of one command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub record_id: String,
    pub action: CommandAction,
    pub status: CommandStatus,
}

pub struct CommandProcessor {
    records: Records,
    config: CommandConfig,
    client_id: RwLock<Option<String>>,
    handler: RwLock<Option<Arc<dyn CommandHandler>>>,
    /// Serializes scans so commands never interleave
    processing: tokio::sync::Mutex<()>,
    completed: Mutex<HashSet<String>>,
}

impl CommandProcessor {
    pub fn new(store: Arc<dyn RecordStore>, config: CommandConfig) -> Self {
        Self {
            records: Records::new(store),
            config,
            client_id: RwLock::new(None),
            handler: RwLock::new(None),
            processing: tokio::sync::Mutex::new(()),
            completed: Mutex::new(HashSet::new()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// Start accepting commands for `client_id`
    pub fn bind(&self, client_id: &str, handler: Arc<dyn CommandHandler>) {
        *self.handler.write() = Some(handler);
        *self.client_id.write() = Some(client_id.to_string());
        log::debug!("Command processor bound to client {}", client_id);
    }

    /// Stop accepting commands. The ledger is cleared too, since the
    /// client's command records go away with it.
    pub fn unbind(&self) {
        let previous = self.client_id.write().take();
        self.handler.write().take();
        self.completed.lock().clear();
        if let Some(client_id) = previous {
            log::debug!("Command processor unbound from client {}", client_id);
        }
    }

    pub fn bound_client(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    fn binding(&self) -> Option<(String, Arc<dyn CommandHandler>)> {
        let client_id = self.client_id.read().clone()?;
        let handler = self.handler.read().clone()?;
        Some((client_id, handler))
    }

    pub fn is_completed(&self, record_id: &str) -> bool {
        self.completed.lock().contains(record_id)
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Run every pending command for the bound client, oldest first
    pub async fn process_commands(&self) -> TelemetryResult<Vec<CommandOutcome>> {
        let _guard = self.processing.lock().await;
        self.scan().await
    }

    async fn scan(&self) -> TelemetryResult<Vec<CommandOutcome>> {
        let Some((client_id, _)) = self.binding() else {
            log::debug!("No client bound, skipping command scan");
            return Ok(Vec::new());
        };

        let query = Query::client(&client_id)
            .eq(FIELD_STATUS, CommandStatus::Pending.as_str())
            .sorted_by(FIELD_CREATED);
        let pending: Vec<CommandRecord> = self.records.query(&query).await?;

        if !pending.is_empty() {
            log::info!("Processing {} pending commands", pending.len());
        }

        let mut outcomes = Vec::new();
        for command in pending {
            // A handler may tear the binding down (disable)
            let Some((bound, handler)) = self.binding() else {
                log::info!("Client unbound mid-scan, leaving remaining commands pending");
                break;
            };
            if bound != client_id {
                break;
            }

            if let Some(outcome) = self.execute(command, handler.as_ref()).await {
                outcomes.push(outcome);
            }
        }

        Ok(outcomes)
    }

    /// Run one command and write its terminal status back
    async fn execute(
        &self,
        mut command: CommandRecord,
        handler: &dyn CommandHandler,
    ) -> Option<CommandOutcome> {
        if command.status.is_terminal() || self.is_completed(&command.id) {
            log::debug!("Command {} already handled, skipping", command.id);
            return None;
        }

        match dispatch(handler, &command).await {
            Ok(()) => {
                log::info!("Command {} ({}) executed", command.id, command.action.as_str());
                command.mark_executed();
            }
            Err(e) => {
                log::warn!(
                    "Command {} ({}) failed: {}",
                    command.id,
                    command.action.as_str(),
                    e
                );
                command.mark_failed(e.to_string());
            }
        }

        self.completed.lock().insert(command.id.clone());

        // A disable command tears the client down, records included
        let still_bound = self.bound_client().as_deref() == Some(command.client_id.as_str());
        if !still_bound {
            log::debug!("Client unbound by command {}, skipping status write", command.id);
        } else if let Err(e) = self.records.save(&command).await {
            log::error!(
                "Failed to record status {} for command {}: {}",
                command.status.as_str(),
                command.id,
                e
            );
        }

        Some(CommandOutcome {
            record_id: command.id,
            action: command.action,
            status: command.status,
        })
    }

    // ------------------------------------------------------------------
    // Push wake-up
    // ------------------------------------------------------------------

    /// Handle an inbound push. Returns false for notifications that are not
    /// ours or arrive while no client is bound.
    pub async fn handle_remote_notification(&self, notification: &RemoteNotification) -> bool {
        if !notification.matches_namespace(&self.config.namespace) {
            log::debug!("Ignoring notification outside the command namespace");
            return false;
        }

        let Some((client_id, handler)) = self.binding() else {
            log::debug!("Command notification received with no client bound");
            return false;
        };

        let _guard = self.processing.lock().await;

        if let Some(record_id) = notification.record_id.as_deref() {
            if self.is_completed(record_id) {
                log::debug!("Command {} was already handled, ignoring push", record_id);
                return true;
            }

            if let Some(command) = self.fetch_with_retry(record_id).await {
                if command.client_id != client_id {
                    log::warn!("Pushed command {} belongs to another client", record_id);
                    return true;
                }
                self.execute(command, handler.as_ref()).await;
                return true;
            }

            log::info!("Pushed command {} not visible yet, scanning instead", record_id);
        }

        if let Err(e) = self.scan().await {
            log::warn!("Command scan after push failed: {}", e);
        }
        true
    }

    /// Fetch a pushed command directly, giving the backend a few chances to
    /// make a fresh write visible
    async fn fetch_with_retry(&self, record_id: &str) -> Option<CommandRecord> {
        let attempts = self.config.fetch_attempts.max(1);

        for attempt in 1..=attempts {
            match self.records.fetch::<CommandRecord>(record_id).await {
                Ok(Some(command)) => return Some(command),
                Ok(None) => {
                    log::debug!("Command {} not found (attempt {}/{})", record_id, attempt, attempts)
                }
                Err(e) => log::warn!(
                    "Fetching command {} failed (attempt {}/{}): {}",
                    record_id,
                    attempt,
                    attempts,
                    e
                ),
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.fetch_retry_delay).await;
            }
        }

        None
    }
}

async fn dispatch(handler: &dyn CommandHandler, command: &CommandRecord) -> TelemetryResult<()> {
    let scenario = command
        .scenario_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    // Scenario actions without a name never reach the handler
    if command.action.needs_scenario() && scenario.is_none() {
        return Err(TelemetryError::Handler(format!(
            "{} requires a scenario name",
            command.action.as_str()
        )));
    }
    let scenario = scenario.unwrap_or_default();

    match command.action {
        CommandAction::Enable => handler.on_enable().await,
        CommandAction::Disable => handler.on_disable().await,
        CommandAction::DeleteEvents => handler.on_delete_events().await,
        CommandAction::EnableScenario => handler.on_enable_scenario(scenario).await,
        CommandAction::DisableScenario => handler.on_disable_scenario(scenario).await,
    }
}
