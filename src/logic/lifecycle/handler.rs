//! Command handlers routed back into the lifecycle service.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use super::status::{DisableReason, LifecycleStatus};
use super::LifecycleService;
use crate::logic::commands::CommandHandler;
use crate::logic::error::{TelemetryError, TelemetryResult};

/// Holds a weak reference so the processor never keeps the service alive
pub(crate) struct LifecycleCommandHandler {
    service: Weak<LifecycleService>,
}

impl LifecycleCommandHandler {
    pub(crate) fn new(service: Weak<LifecycleService>) -> Self {
        Self { service }
    }

    fn service(&self) -> TelemetryResult<Arc<LifecycleService>> {
        self.service
            .upgrade()
            .ok_or_else(|| TelemetryError::NotConfigured("lifecycle service dropped".to_string()))
    }
}

#[async_trait]
impl CommandHandler for LifecycleCommandHandler {
    async fn on_enable(&self) -> TelemetryResult<()> {
        self.service()?.apply_remote_enable().await
    }

    async fn on_disable(&self) -> TelemetryResult<()> {
        let service = self.service()?;
        service
            .disable_with_reason(DisableReason::ServerOffLocalOn)
            .await;

        match service.status() {
            LifecycleStatus::Error(msg) => Err(TelemetryError::Handler(msg)),
            _ => Ok(()),
        }
    }

    async fn on_delete_events(&self) -> TelemetryResult<()> {
        self.service()?.delete_events().await.map(|_| ())
    }

    async fn on_enable_scenario(&self, name: &str) -> TelemetryResult<()> {
        self.service()?.update_scenario(name, true).await
    }

    async fn on_disable_scenario(&self, name: &str) -> TelemetryResult<()> {
        self.service()?.update_scenario(name, false).await
    }
}
