//! Telemetry Client
//!
//! Client-embedded telemetry lifecycle and delivery engine: user opt-in,
//! operator approval, batched event delivery and remote commands.
//!
//! Build a [`LifecycleService`] from a [`TelemetryConfig`] and the host's
//! [`Collaborators`], call `startup()` once, then drive it from the UI and
//! from push notifications.

pub mod constants;
pub mod logic;

pub use logic::commands::{CommandHandler, CommandProcessor};
pub use logic::config::{CommandConfig, LoggerConfig, TelemetryConfig};
pub use logic::device::DeviceInfo;
pub use logic::error::{DecodeError, RecordError, StorageError, TelemetryError, TelemetryResult};
pub use logic::lifecycle::{
    Collaborators, DisableReason, FixedIdentifier, IdentifierGenerator, LifecycleService,
    LifecycleSnapshot, LifecycleStatus, RandomIdentifier, ReconciliationOutcome,
};
pub use logic::logger::{Event, EventLogger, LogLevel, LoggerStats};
pub use logic::remote::{HttpRecordStore, MemoryRecordStore, RecordStore, Records};
pub use logic::settings::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, ScenarioStates, Settings,
};
pub use logic::subscription::{
    MemoryPushRegistrar, PushRegistrar, RemoteNotification, SubscriptionManager,
};
