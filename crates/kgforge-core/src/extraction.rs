use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{EntityCatalog, RelationSchema};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A text-generation endpoint. One call, one free-text reply.
///
/// `Ok(None)` means the call succeeded but carried no text.
#[async_trait]
pub trait ExtractionEndpoint: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>>;
}

#[async_trait]
pub trait EntityCatalogSource: Send + Sync {
    async fn load_catalog(&self) -> Result<EntityCatalog>;
}

#[async_trait]
pub trait RelationSchemaSource: Send + Sync {
    async fn load_schema(&self) -> Result<RelationSchema>;
}
