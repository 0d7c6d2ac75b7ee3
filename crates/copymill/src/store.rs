//! Persistence collaborator boundary.
//!
//! The pipeline never talks to a database directly — everything durable goes
//! through [`ContentStore`]. All operations are assumed atomic and
//! immediately consistent; the pipeline does not manage transactions beyond
//! per-call boundaries. Token debiting is deliberately not tied to content
//! persistence (a balance can be decremented even when a later persistence
//! step fails).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GenerationError;

pub mod memory;

/// Failure inside the persistence collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<StorageError> for GenerationError {
    fn from(err: StorageError) -> Self {
        GenerationError::Storage(err.0)
    }
}

/// Stored prompt configuration, resolved at the start of each generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    /// Caller-authored template; seeds the body prompt when `pro` is set.
    #[serde(default)]
    pub template: String,
    /// Semicolon-delimited topic list.
    #[serde(default)]
    pub topic_list: String,
    /// Free-text keyword list for SEO augmentation.
    #[serde(default)]
    pub kw_list: String,
    /// Publish marker carried through to generated content.
    #[serde(default)]
    pub post: String,
    /// JSON blob of generation parameters (may carry keys from old versions).
    #[serde(default)]
    pub params: String,
}

/// One persisted modifier row (name → template fragment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModRow {
    pub name: String,
    pub value: String,
}

/// A named supplementary field attached to a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptField {
    pub name: String,
}

/// A generated content row as persisted.
#[derive(Debug, Clone)]
pub struct ContentRecord {
    pub id: i64,
    pub user_id: i64,
    pub prompt_id: i64,
    pub title: String,
    pub text: String,
    pub post: String,
    pub created_at: DateTime<Utc>,
}

/// Stored image-prompt configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagePromptRecord {
    pub id: i64,
    pub user_id: i64,
    /// Desired image count (capped by the pipeline).
    pub number: u32,
    /// Square size in pixels; one of 256, 512, 1024.
    pub size: u32,
    /// Main descriptive mod; synthesised from content text when empty.
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub mods: Vec<String>,
}

/// The persistence operations the generation pipeline relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a prompt's stored configuration.
    async fn get_prompt(&self, user_id: i64, prompt_id: i64)
        -> Result<PromptRecord, StorageError>;

    /// Read every persisted modifier row.
    async fn modifier_rows(&self) -> Result<Vec<ModRow>, StorageError>;

    /// Read the prompt-field list for a prompt, in persisted order.
    async fn prompt_fields(&self, prompt_id: i64) -> Result<Vec<PromptField>, StorageError>;

    /// Write the remaining topic list back to the prompt row.
    async fn update_topic_list(
        &self,
        user_id: i64,
        prompt_id: i64,
        topic_list: &str,
    ) -> Result<(), StorageError>;

    /// Create a content row; returns its identifier.
    async fn add_content(
        &self,
        user_id: i64,
        prompt_id: i64,
        title: &str,
        text: &str,
        post: &str,
    ) -> Result<i64, StorageError>;

    /// Attach a name/value field to a content row.
    async fn add_content_field(
        &self,
        content_id: i64,
        name: &str,
        value: &str,
    ) -> Result<(), StorageError>;

    /// Read the body text of a content row.
    async fn content_text(&self, user_id: i64, content_id: i64) -> Result<String, StorageError>;

    /// Number of image fields already stored for a content row.
    async fn image_count(&self, content_id: i64) -> Result<u32, StorageError>;

    /// Read an image-prompt configuration.
    async fn get_image_prompt(
        &self,
        user_id: i64,
        iprompt_id: i64,
    ) -> Result<ImagePromptRecord, StorageError>;

    /// Decrement a user's token balance (additive; `amount` is subtracted).
    async fn debit_tokens(&self, user_id: i64, amount: u64) -> Result<(), StorageError>;
}
