//! Logic Module - Telemetry Engine
//!
//! ## Structure
//! - `lifecycle/` - root orchestrator: startup, enable, disable, reconcile
//! - `commands/` - idempotent remote command queue
//! - `logger/` - event ingestion, batching and delivery
//! - `subscription.rs` - push subscription bound to the client id
//! - `remote/` - remote record store interface, memory and HTTP stores
//! - `settings/` - local settings and scenario flags
//! - `device.rs` - device attributes attached to every event

// Core engine
pub mod lifecycle;
pub mod commands;
pub mod logger;
pub mod subscription;

// Collaborators & data
pub mod remote;
pub mod settings;
pub mod device;

// Shared
pub mod backoff;
pub mod config;
pub mod error;
