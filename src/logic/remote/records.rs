//! Remote Record Types
//!
//! Untyped [`RawRecord`]s are what the store moves around; the typed records
//! below are decoded from them at the mapping boundary. Decoding is strict:
//! a missing field, a wrong type or an unknown enum value is a
//! [`DecodeError`], never a silently defaulted value.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::SETTINGS_BACKUP_RECORD;
use crate::logic::error::DecodeError;
use crate::logic::settings::Settings;

// ============================================================================
// RECORD KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    Event,
    Client,
    Command,
    Scenario,
    /// Private per-install mirror of the local settings
    SettingsBackup,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Event => "TelemetryEvent",
            RecordKind::Client => "TelemetryClient",
            RecordKind::Command => "TelemetryCommand",
            RecordKind::Scenario => "TelemetryScenario",
            RecordKind::SettingsBackup => "TelemetrySettingsBackup",
        }
    }

    /// Private records live in the user's own database, not the shared one
    pub fn is_private(&self) -> bool {
        matches!(self, RecordKind::SettingsBackup)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RAW RECORD & QUERY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub kind: RecordKind,
    pub id: String,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Sets `field` only when `value` is present
    pub fn with_opt(self, field: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.with(field, v),
            None => self,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub(crate) fn reader(&self) -> FieldReader<'_> {
        FieldReader { record: self }
    }
}

/// Conjunction of field equalities plus an optional ascending sort
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub sort_ascending: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of the given client
    pub fn client(client_id: &str) -> Self {
        Self::new().eq(FIELD_CLIENT_ID, client_id)
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn sorted_by(mut self, field: &str) -> Self {
        self.sort_ascending = Some(field.to_string());
        self
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| record.fields.get(field) == Some(value))
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// FIELD DECODING
// ============================================================================

pub(crate) struct FieldReader<'a> {
    record: &'a RawRecord,
}

impl<'a> FieldReader<'a> {
    fn value(&self, field: &'static str) -> Result<&'a Value, DecodeError> {
        match self.record.fields.get(field) {
            Some(Value::Null) | None => Err(DecodeError::MissingField {
                record: self.record.id.clone(),
                field,
            }),
            Some(v) => Ok(v),
        }
    }

    fn wrong_type(&self, field: &'static str, expected: &'static str) -> DecodeError {
        DecodeError::WrongType {
            record: self.record.id.clone(),
            field,
            expected,
        }
    }

    pub(crate) fn string(&self, field: &'static str) -> Result<String, DecodeError> {
        self.value(field)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_type(field, "string"))
    }

    pub(crate) fn opt_string(&self, field: &'static str) -> Result<Option<String>, DecodeError> {
        match self.value(field) {
            Err(DecodeError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
            Ok(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.wrong_type(field, "string")),
        }
    }

    /// Booleans may arrive as JSON bools or as 0/1 integers
    pub(crate) fn bool(&self, field: &'static str) -> Result<bool, DecodeError> {
        match self.value(field)? {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(self.wrong_type(field, "bool")),
            },
            _ => Err(self.wrong_type(field, "bool")),
        }
    }

    pub(crate) fn datetime(&self, field: &'static str) -> Result<DateTime<Utc>, DecodeError> {
        let raw = self.string(field)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| self.wrong_type(field, "RFC 3339 timestamp"))
    }

    pub(crate) fn opt_datetime(&self, field: &'static str) -> Result<Option<DateTime<Utc>>, DecodeError> {
        match self.value(field) {
            Err(DecodeError::MissingField { .. }) => Ok(None),
            Err(e) => Err(e),
            Ok(_) => self.datetime(field).map(Some),
        }
    }

    pub(crate) fn check_kind(&self, expected: RecordKind) -> Result<(), DecodeError> {
        if self.record.kind == expected {
            Ok(())
        } else {
            Err(DecodeError::WrongKind {
                record: self.record.id.clone(),
                expected: expected.as_str(),
                actual: self.record.kind.as_str().to_string(),
            })
        }
    }
}

// ============================================================================
// TYPED RECORDS
// ============================================================================

pub const FIELD_CLIENT_ID: &str = "clientId";
pub const FIELD_CREATED: &str = "created";
pub const FIELD_IS_ENABLED: &str = "isEnabled";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_SCENARIO_NAME: &str = "scenarioName";

/// A typed view over a [`RawRecord`]
pub trait Record: Sized + Send + Sync {
    const KIND: RecordKind;

    fn record_id(&self) -> &str;
    fn to_raw(&self) -> RawRecord;
    fn from_raw(raw: &RawRecord) -> Result<Self, DecodeError>;
}

/// Remote registration of one installed app instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: String,
    pub client_id: String,
    pub created: DateTime<Utc>,
    /// Operator-owned approval flag
    pub is_enabled: bool,
}

impl ClientRecord {
    /// New, unapproved registration. The record id is the client id, so a
    /// second creation for the same client conflicts.
    pub fn new(client_id: &str) -> Self {
        Self {
            id: client_id.to_string(),
            client_id: client_id.to_string(),
            created: Utc::now(),
            is_enabled: false,
        }
    }
}

impl Record for ClientRecord {
    const KIND: RecordKind = RecordKind::Client;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn to_raw(&self) -> RawRecord {
        RawRecord::new(Self::KIND, &self.id)
            .with(FIELD_CLIENT_ID, self.client_id.as_str())
            .with(FIELD_CREATED, format_timestamp(&self.created))
            .with(FIELD_IS_ENABLED, self.is_enabled)
    }

    fn from_raw(raw: &RawRecord) -> Result<Self, DecodeError> {
        let r = raw.reader();
        r.check_kind(Self::KIND)?;
        Ok(Self {
            id: raw.id.clone(),
            client_id: r.string(FIELD_CLIENT_ID)?,
            created: r.datetime(FIELD_CREATED)?,
            is_enabled: r.bool(FIELD_IS_ENABLED)?,
        })
    }
}

/// Operator instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandAction {
    Enable,
    Disable,
    DeleteEvents,
    EnableScenario,
    DisableScenario,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::Enable => "enable",
            CommandAction::Disable => "disable",
            CommandAction::DeleteEvents => "deleteEvents",
            CommandAction::EnableScenario => "enableScenario",
            CommandAction::DisableScenario => "disableScenario",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "enable" => Some(CommandAction::Enable),
            "disable" => Some(CommandAction::Disable),
            "deleteEvents" => Some(CommandAction::DeleteEvents),
            "enableScenario" => Some(CommandAction::EnableScenario),
            "disableScenario" => Some(CommandAction::DisableScenario),
            _ => None,
        }
    }

    pub fn needs_scenario(&self) -> bool {
        matches!(
            self,
            CommandAction::EnableScenario | CommandAction::DisableScenario
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandStatus {
    Pending,
    Executed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Executed => "executed",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(CommandStatus::Pending),
            "executed" => Some(CommandStatus::Executed),
            "failed" => Some(CommandStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommandStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: String,
    pub command_id: String,
    pub client_id: String,
    pub action: CommandAction,
    pub scenario_name: Option<String>,
    pub created: DateTime<Utc>,
    pub status: CommandStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl CommandRecord {
    /// A pending command as the operator would issue it
    pub fn pending(client_id: &str, action: CommandAction, scenario_name: Option<&str>) -> Self {
        let command_id = uuid::Uuid::new_v4().to_string();
        Self {
            id: command_id.clone(),
            command_id,
            client_id: client_id.to_string(),
            action,
            scenario_name: scenario_name.map(str::to_string),
            created: Utc::now(),
            status: CommandStatus::Pending,
            executed_at: None,
            error_message: None,
        }
    }

    pub fn mark_executed(&mut self) {
        self.status = CommandStatus::Executed;
        self.executed_at = Some(Utc::now());
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = CommandStatus::Failed;
        self.executed_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }
}

impl Record for CommandRecord {
    const KIND: RecordKind = RecordKind::Command;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn to_raw(&self) -> RawRecord {
        RawRecord::new(Self::KIND, &self.id)
            .with("commandId", self.command_id.as_str())
            .with(FIELD_CLIENT_ID, self.client_id.as_str())
            .with("action", self.action.as_str())
            .with_opt(FIELD_SCENARIO_NAME, self.scenario_name.as_deref())
            .with(FIELD_CREATED, format_timestamp(&self.created))
            .with(FIELD_STATUS, self.status.as_str())
            .with_opt("executedAt", self.executed_at.as_ref().map(format_timestamp))
            .with_opt("errorMessage", self.error_message.as_deref())
    }

    fn from_raw(raw: &RawRecord) -> Result<Self, DecodeError> {
        let r = raw.reader();
        r.check_kind(Self::KIND)?;

        let action_raw = r.string("action")?;
        let action = CommandAction::parse(&action_raw).ok_or_else(|| DecodeError::InvalidEnum {
            record: raw.id.clone(),
            field: "action",
            value: action_raw.clone(),
        })?;

        let status_raw = r.string(FIELD_STATUS)?;
        let status = CommandStatus::parse(&status_raw).ok_or_else(|| DecodeError::InvalidEnum {
            record: raw.id.clone(),
            field: FIELD_STATUS,
            value: status_raw.clone(),
        })?;

        Ok(Self {
            id: raw.id.clone(),
            command_id: r.string("commandId")?,
            client_id: r.string(FIELD_CLIENT_ID)?,
            action,
            scenario_name: r.opt_string(FIELD_SCENARIO_NAME)?,
            created: r.datetime(FIELD_CREATED)?,
            status,
            executed_at: r.opt_datetime("executedAt")?,
            error_message: r.opt_string("errorMessage")?,
        })
    }
}

/// Remote enablement of one logging scenario for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRecord {
    pub id: String,
    pub client_id: String,
    pub scenario_name: String,
    pub is_enabled: bool,
    pub created: DateTime<Utc>,
}

impl ScenarioRecord {
    pub fn new(client_id: &str, scenario_name: &str, is_enabled: bool) -> Self {
        Self {
            id: format!("{}-{}", client_id, scenario_name),
            client_id: client_id.to_string(),
            scenario_name: scenario_name.to_string(),
            is_enabled,
            created: Utc::now(),
        }
    }
}

impl Record for ScenarioRecord {
    const KIND: RecordKind = RecordKind::Scenario;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn to_raw(&self) -> RawRecord {
        RawRecord::new(Self::KIND, &self.id)
            .with(FIELD_CLIENT_ID, self.client_id.as_str())
            .with(FIELD_SCENARIO_NAME, self.scenario_name.as_str())
            .with(FIELD_IS_ENABLED, self.is_enabled)
            .with(FIELD_CREATED, format_timestamp(&self.created))
    }

    fn from_raw(raw: &RawRecord) -> Result<Self, DecodeError> {
        let r = raw.reader();
        r.check_kind(Self::KIND)?;
        Ok(Self {
            id: raw.id.clone(),
            client_id: r.string(FIELD_CLIENT_ID)?,
            scenario_name: r.string(FIELD_SCENARIO_NAME)?,
            is_enabled: r.bool(FIELD_IS_ENABLED)?,
            created: r.datetime(FIELD_CREATED)?,
        })
    }
}

/// Private mirror of [`Settings`] used to restore after a reinstall
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsBackup {
    pub settings: Settings,
}

impl From<&Settings> for SettingsBackup {
    fn from(settings: &Settings) -> Self {
        Self {
            settings: settings.clone().normalized(),
        }
    }
}

impl Record for SettingsBackup {
    const KIND: RecordKind = RecordKind::SettingsBackup;

    fn record_id(&self) -> &str {
        SETTINGS_BACKUP_RECORD
    }

    fn to_raw(&self) -> RawRecord {
        RawRecord::new(Self::KIND, SETTINGS_BACKUP_RECORD)
            .with("telemetryRequested", self.settings.telemetry_requested)
            .with(
                "telemetrySendingEnabled",
                self.settings.telemetry_sending_enabled,
            )
            .with_opt(
                "clientIdentifier",
                self.settings.client_identifier.as_deref(),
            )
    }

    fn from_raw(raw: &RawRecord) -> Result<Self, DecodeError> {
        let r = raw.reader();
        r.check_kind(Self::KIND)?;
        Ok(Self {
            settings: Settings {
                telemetry_requested: r.bool("telemetryRequested")?,
                telemetry_sending_enabled: r.bool("telemetrySendingEnabled")?,
                client_identifier: r.opt_string("clientIdentifier")?,
            }
            .normalized(),
        })
    }
}
