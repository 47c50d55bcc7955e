//! Telemetry Event Types
//!
//! Immutable, timestamped events. Created once per accepted log call,
//! buffered, shipped, never read back by the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::device::DeviceInfo;
use crate::logic::error::DecodeError;
use crate::logic::remote::records::{
    format_timestamp, RawRecord, Record, RecordKind, FIELD_CLIENT_ID,
};

// ============================================================================
// LOG LEVEL
// ============================================================================

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

// ============================================================================
// EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    /// Owning client, used for bulk deletion
    pub client_id: Option<String>,
    pub device: DeviceInfo,
    pub thread_id: String,
    pub property1: Option<String>,
    pub scenario: Option<String>,
    pub level: LogLevel,
}

impl Event {
    pub fn new(
        name: &str,
        session_id: &str,
        client_id: Option<String>,
        device: DeviceInfo,
        scenario: Option<&str>,
        level: LogLevel,
        property1: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            client_id,
            device,
            thread_id: current_thread_id(),
            property1: property1.map(str::to_string),
            scenario: scenario.map(str::to_string),
            level,
        }
    }
}

fn current_thread_id() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

impl Record for Event {
    const KIND: RecordKind = RecordKind::Event;

    fn record_id(&self) -> &str {
        &self.id
    }

    fn to_raw(&self) -> RawRecord {
        RawRecord::new(Self::KIND, &self.id)
            .with("name", self.name.as_str())
            .with("timestamp", format_timestamp(&self.timestamp))
            .with("sessionId", self.session_id.as_str())
            .with_opt(FIELD_CLIENT_ID, self.client_id.as_deref())
            .with("deviceType", self.device.device_type.as_str())
            .with("deviceName", self.device.device_name.as_str())
            .with("deviceModel", self.device.device_model.as_str())
            .with("osVersion", self.device.os_version.as_str())
            .with("appVersion", self.device.app_version.as_str())
            .with("threadId", self.thread_id.as_str())
            .with_opt("property1", self.property1.as_deref())
            .with_opt("scenario", self.scenario.as_deref())
            .with("logLevel", self.level.as_str())
    }

    fn from_raw(raw: &RawRecord) -> Result<Self, DecodeError> {
        let r = raw.reader();
        r.check_kind(Self::KIND)?;

        let level_raw = r.string("logLevel")?;
        let level = LogLevel::parse(&level_raw).ok_or_else(|| DecodeError::InvalidEnum {
            record: raw.id.clone(),
            field: "logLevel",
            value: level_raw.clone(),
        })?;

        Ok(Self {
            id: raw.id.clone(),
            name: r.string("name")?,
            timestamp: r.datetime("timestamp")?,
            session_id: r.string("sessionId")?,
            client_id: r.opt_string(FIELD_CLIENT_ID)?,
            device: DeviceInfo {
                device_type: r.string("deviceType")?,
                device_name: r.string("deviceName")?,
                device_model: r.string("deviceModel")?,
                os_version: r.string("osVersion")?,
                app_version: r.string("appVersion")?,
            },
            thread_id: r.string("threadId")?,
            property1: r.opt_string("property1")?,
            scenario: r.opt_string("scenario")?,
            level,
        })
    }
}
