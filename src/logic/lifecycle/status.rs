//! Lifecycle status, reconciliation outcomes and the read-only projection.

use serde::{Deserialize, Serialize};

use crate::logic::settings::{ScenarioStates, Settings};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "message")]
pub enum LifecycleStatus {
    #[default]
    Idle,
    Loading,
    Syncing,
    Enabled,
    Disabled,
    PendingApproval,
    Error(String),
}

impl LifecycleStatus {
    /// Human-readable message for presentation layers
    pub fn message(&self) -> String {
        match self {
            LifecycleStatus::Idle => "Telemetry has not started".to_string(),
            LifecycleStatus::Loading => "Loading telemetry settings".to_string(),
            LifecycleStatus::Syncing => "Synchronising with the telemetry server".to_string(),
            LifecycleStatus::Enabled => "Telemetry is enabled".to_string(),
            LifecycleStatus::Disabled => "Telemetry is disabled".to_string(),
            LifecycleStatus::PendingApproval => {
                "Telemetry was requested and is waiting for approval".to_string()
            }
            LifecycleStatus::Error(msg) => format!("Telemetry error: {}", msg),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LifecycleStatus::Error(_))
    }
}

/// Result of comparing local enablement with the remote client record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationOutcome {
    BothEnabled,
    ServerOnLocalOff,
    ServerOffLocalOn,
    /// Telemetry was never requested on this install
    BothDisabled,
    MissingClient,
    PendingApproval,
}

impl ReconciliationOutcome {
    /// Classify a requested install by its local sending flag and the remote
    /// record, if one exists
    pub fn classify(local_sending: bool, server_enabled: Option<bool>) -> Self {
        match (local_sending, server_enabled) {
            (true, Some(true)) => ReconciliationOutcome::BothEnabled,
            (false, Some(true)) => ReconciliationOutcome::ServerOnLocalOff,
            (true, _) => ReconciliationOutcome::ServerOffLocalOn,
            (false, Some(false)) => ReconciliationOutcome::PendingApproval,
            (false, None) => ReconciliationOutcome::MissingClient,
        }
    }

    /// Whether events flow after this outcome is applied
    pub fn sends_events(&self) -> bool {
        matches!(
            self,
            ReconciliationOutcome::BothEnabled | ReconciliationOutcome::ServerOnLocalOff
        )
    }
}

/// Why telemetry is being turned off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisableReason {
    UserRequest,
    /// The operator revoked approval or sent a disable command
    ServerOffLocalOn,
    MissingClient,
}

impl DisableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisableReason::UserRequest => "user request",
            DisableReason::ServerOffLocalOn => "revoked by server",
            DisableReason::MissingClient => "client record missing",
        }
    }
}

/// Read-only view for presentation layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSnapshot {
    pub status: LifecycleStatus,
    pub settings: Settings,
    pub scenario_states: ScenarioStates,
}
