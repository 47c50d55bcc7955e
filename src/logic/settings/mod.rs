//! Telemetry Settings & Scenario Flags
//!
//! Local persistence of the user's telemetry choice and of per-scenario
//! enablement. Both stores sit on top of a [`KeyValueStore`] collaborator.

pub mod kv;

pub use kv::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{
    KEY_CLIENT_IDENTIFIER, KEY_TELEMETRY_REQUESTED, KEY_TELEMETRY_SENDING_ENABLED,
    SCENARIO_KEY_PREFIX,
};
use crate::logic::error::StorageError;

/// Name → enabled cache for logging scenarios
pub type ScenarioStates = BTreeMap<String, bool>;

// ============================================================================
// SETTINGS
// ============================================================================

/// The user's telemetry choice
///
/// `telemetry_sending_enabled` implies `telemetry_requested`; [`Settings::normalized`]
/// restores that invariant on anything read back from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub telemetry_requested: bool,
    pub telemetry_sending_enabled: bool,
    pub client_identifier: Option<String>,
}

impl Settings {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn normalized(mut self) -> Self {
        if !self.telemetry_requested {
            self.telemetry_sending_enabled = false;
        }
        self
    }
}

fn parse_bool(value: Option<String>) -> Option<bool> {
    match value.as_deref().map(str::trim) {
        Some("true") | Some("1") => Some(true),
        Some("false") | Some("0") => Some(false),
        _ => None,
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Settings persistence
#[derive(Clone)]
pub struct SettingsStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// True when the user has never made a choice on this install
    pub fn is_first_run(&self) -> Result<bool, StorageError> {
        Ok(self.kv.get(KEY_TELEMETRY_REQUESTED)?.is_none())
    }

    pub fn load(&self) -> Result<Settings, StorageError> {
        let requested = parse_bool(self.kv.get(KEY_TELEMETRY_REQUESTED)?).unwrap_or(false);
        let sending = parse_bool(self.kv.get(KEY_TELEMETRY_SENDING_ENABLED)?).unwrap_or(false);
        let client_identifier = self
            .kv
            .get(KEY_CLIENT_IDENTIFIER)?
            .filter(|id| !id.trim().is_empty());

        Ok(Settings {
            telemetry_requested: requested,
            telemetry_sending_enabled: sending,
            client_identifier,
        }
        .normalized())
    }

    pub fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        let settings = settings.clone().normalized();
        self.kv
            .set(KEY_TELEMETRY_REQUESTED, bool_str(settings.telemetry_requested))?;
        self.kv.set(
            KEY_TELEMETRY_SENDING_ENABLED,
            bool_str(settings.telemetry_sending_enabled),
        )?;
        match &settings.client_identifier {
            Some(id) => self.kv.set(KEY_CLIENT_IDENTIFIER, id),
            None => self.kv.remove(KEY_CLIENT_IDENTIFIER),
        }
    }
}

// ============================================================================
// SCENARIO FLAGS
// ============================================================================

/// Persisted per-scenario flags, which outlive sessions and disable cycles
#[derive(Clone)]
pub struct ScenarioStore {
    kv: Arc<dyn KeyValueStore>,
}

impl ScenarioStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn key(name: &str) -> String {
        format!("{}{}", SCENARIO_KEY_PREFIX, name)
    }

    /// Persisted flag, `None` when the scenario was never toggled
    pub fn get(&self, name: &str) -> Result<Option<bool>, StorageError> {
        Ok(parse_bool(self.kv.get(&Self::key(name))?))
    }

    pub fn set(&self, name: &str, enabled: bool) -> Result<(), StorageError> {
        self.kv.set(&Self::key(name), bool_str(enabled))
    }

    /// Load flags for `names`, defaulting to off
    pub fn load_all<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<ScenarioStates, StorageError> {
        let mut states = ScenarioStates::new();
        for name in names {
            states.insert(name.to_string(), self.get(name)?.unwrap_or(false));
        }
        Ok(states)
    }
}
