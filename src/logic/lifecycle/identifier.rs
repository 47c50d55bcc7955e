//! Client identifier generation.

use uuid::Uuid;

/// Length of generated client identifiers
pub const CLIENT_ID_LEN: usize = 10;

pub trait IdentifierGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Lowercase hex identifiers taken from a v4 UUID
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdentifier;

impl IdentifierGenerator for RandomIdentifier {
    fn generate(&self) -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(CLIENT_ID_LEN);
        id
    }
}

/// Always hands out the same identifier
#[derive(Debug, Clone)]
pub struct FixedIdentifier(pub String);

impl FixedIdentifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl IdentifierGenerator for FixedIdentifier {
    fn generate(&self) -> String {
        self.0.clone()
    }
}
