//! Push Subscription Management
//!
//! One push subscription per client, watching the command collection for
//! records carrying the client's id. The subscription id is the command
//! namespace followed by the client id, which is how inbound notifications
//! are recognised as ours.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logic::error::RecordError;
use crate::logic::remote::records::{Query, RecordKind, FIELD_CLIENT_ID};

/// Push registration collaborator
#[async_trait]
pub trait PushRegistrar: Send + Sync {
    async fn save_subscription(
        &self,
        subscription_id: &str,
        kind: RecordKind,
        predicate: &Query,
    ) -> Result<(), RecordError>;

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), RecordError>;

    async fn subscription_ids(&self) -> Result<Vec<String>, RecordError>;
}

// ============================================================================
// NOTIFICATION PAYLOAD
// ============================================================================

/// Parsed push payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNotification {
    pub subscription_id: Option<String>,
    /// Record that triggered the push, when the transport reports it
    pub record_id: Option<String>,
}

impl RemoteNotification {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: Some(subscription_id.into()),
            record_id: None,
        }
    }

    pub fn with_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    /// Parse `{"subscriptionID": "...", "recordID": "..."}`, optionally nested
    /// under a `"ck"` or `"query"` object. Unknown shapes yield an empty
    /// notification, which nothing will accept.
    pub fn from_json(payload: &Value) -> Self {
        let find = |key: &str| -> Option<String> {
            payload
                .get(key)
                .or_else(|| payload.get("ck").and_then(|ck| ck.get(key)))
                .or_else(|| {
                    payload
                        .get("ck")
                        .and_then(|ck| ck.get("qry"))
                        .and_then(|q| q.get(key))
                })
                .or_else(|| payload.get("query").and_then(|q| q.get(key)))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            subscription_id: find("subscriptionID").or_else(|| find("sid")),
            record_id: find("recordID").or_else(|| find("rid")),
        }
    }

    pub fn matches_namespace(&self, namespace: &str) -> bool {
        self.subscription_id
            .as_deref()
            .map_or(false, |id| id.starts_with(namespace))
    }
}

// ============================================================================
// SUBSCRIPTION MANAGER
// ============================================================================

pub struct SubscriptionManager {
    registrar: Arc<dyn PushRegistrar>,
    namespace: String,
    active: RwLock<Option<String>>,
}

impl SubscriptionManager {
    pub fn new(registrar: Arc<dyn PushRegistrar>, namespace: impl Into<String>) -> Self {
        Self {
            registrar,
            namespace: namespace.into(),
            active: RwLock::new(None),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn subscription_id_for(&self, client_id: &str) -> String {
        format!("{}{}", self.namespace, client_id)
    }

    pub fn active_subscription(&self) -> Option<String> {
        self.active.read().clone()
    }

    /// Register the client's command subscription unless it already exists
    ///
    /// Subscriptions in our namespace that belong to another client id are
    /// removed on the way.
    pub async fn ensure_subscribed(&self, client_id: &str) -> Result<(), RecordError> {
        let wanted = self.subscription_id_for(client_id);
        if self.active.read().as_deref() == Some(wanted.as_str()) {
            return Ok(());
        }

        let existing = self.registrar.subscription_ids().await?;
        for stale in existing
            .iter()
            .filter(|id| id.starts_with(&self.namespace) && **id != wanted)
        {
            log::info!("Removing stale command subscription {}", stale);
            if let Err(e) = self.registrar.delete_subscription(stale).await {
                log::warn!("Failed to remove stale subscription {}: {}", stale, e);
            }
        }

        if !existing.contains(&wanted) {
            let predicate = Query::client(client_id);
            self.registrar
                .save_subscription(&wanted, RecordKind::Command, &predicate)
                .await?;
            log::info!("Command subscription registered: {}", wanted);
        }

        *self.active.write() = Some(wanted);
        Ok(())
    }

    /// Remove every subscription in our namespace
    pub async fn unsubscribe_all(&self) -> Result<(), RecordError> {
        self.active.write().take();

        let existing = self.registrar.subscription_ids().await?;
        let mut first_error = None;

        for id in existing.iter().filter(|id| id.starts_with(&self.namespace)) {
            match self.registrar.delete_subscription(id).await {
                Ok(()) => log::info!("Command subscription removed: {}", id),
                Err(RecordError::NotFound(_)) => {}
                Err(e) => {
                    log::warn!("Failed to remove subscription {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

// ============================================================================
// IN-MEMORY REGISTRAR
// ============================================================================

/// Push registrar that only remembers what was registered
#[derive(Default)]
pub struct MemoryPushRegistrar {
    subscriptions: RwLock<BTreeSet<String>>,
    saves: Mutex<usize>,
}

impl MemoryPushRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.subscriptions.read().iter().cloned().collect()
    }

    /// Number of `save_subscription` calls so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl PushRegistrar for MemoryPushRegistrar {
    async fn save_subscription(
        &self,
        subscription_id: &str,
        _kind: RecordKind,
        predicate: &Query,
    ) -> Result<(), RecordError> {
        debug_assert!(predicate.filters.iter().any(|(f, _)| f == FIELD_CLIENT_ID));
        *self.saves.lock() += 1;
        self.subscriptions.write().insert(subscription_id.to_string());
        Ok(())
    }

    async fn delete_subscription(&self, subscription_id: &str) -> Result<(), RecordError> {
        if self.subscriptions.write().remove(subscription_id) {
            Ok(())
        } else {
            Err(RecordError::NotFound(subscription_id.to_string()))
        }
    }

    async fn subscription_ids(&self) -> Result<Vec<String>, RecordError> {
        Ok(self.ids())
    }
}
