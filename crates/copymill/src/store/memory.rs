//! In-memory `ContentStore` used by the CLI and the integration suite.
//!
//! Seeded either programmatically or from a JSON fixture file. State lives
//! behind one mutex; contention is irrelevant at this scale.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{
    ContentRecord, ContentStore, ImagePromptRecord, ModRow, PromptField, PromptRecord,
    StorageError,
};

#[derive(Default)]
struct Inner {
    prompts: HashMap<i64, PromptRecord>,
    mods: Vec<ModRow>,
    prompt_fields: HashMap<i64, Vec<PromptField>>,
    contents: Vec<ContentRecord>,
    content_fields: Vec<(i64, String, String)>,
    image_prompts: HashMap<i64, ImagePromptRecord>,
    balances: HashMap<i64, i64>,
    next_content_id: i64,
}

/// JSON fixture layout accepted by [`MemoryStore::from_seed_file`].
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub prompts: Vec<PromptRecord>,
    #[serde(default)]
    pub mods: Vec<ModRow>,
    #[serde(default)]
    pub prompt_fields: HashMap<i64, Vec<PromptField>>,
    #[serde(default)]
    pub image_prompts: Vec<ImagePromptRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().expect("store mutex poisoned");
            for prompt in seed.prompts {
                inner.prompts.insert(prompt.id, prompt);
            }
            inner.mods = seed.mods;
            inner.prompt_fields = seed.prompt_fields;
            for iprompt in seed.image_prompts {
                inner.image_prompts.insert(iprompt.id, iprompt);
            }
            inner.next_content_id = 1;
        }
        store
    }

    pub fn from_seed_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let seed: Seed = serde_json::from_str(&raw)?;
        Ok(Self::from_seed(seed))
    }

    pub fn insert_prompt(&self, prompt: PromptRecord) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.prompts.insert(prompt.id, prompt);
        if inner.next_content_id == 0 {
            inner.next_content_id = 1;
        }
    }

    pub fn set_mods(&self, mods: Vec<ModRow>) {
        self.inner.lock().expect("store mutex poisoned").mods = mods;
    }

    pub fn set_prompt_fields(&self, prompt_id: i64, fields: Vec<PromptField>) {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .prompt_fields
            .insert(prompt_id, fields);
    }

    pub fn insert_image_prompt(&self, iprompt: ImagePromptRecord) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.image_prompts.insert(iprompt.id, iprompt);
    }

    pub fn set_balance(&self, user_id: i64, tokens: i64) {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .balances
            .insert(user_id, tokens);
    }

    /// Snapshot of persisted content rows (test inspection).
    pub fn contents(&self) -> Vec<ContentRecord> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .contents
            .clone()
    }

    /// Snapshot of persisted content fields (test inspection).
    pub fn content_fields(&self) -> Vec<(i64, String, String)> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .content_fields
            .clone()
    }

    pub fn balance(&self, user_id: i64) -> i64 {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn topic_list(&self, prompt_id: i64) -> Option<String> {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .prompts
            .get(&prompt_id)
            .map(|p| p.topic_list.clone())
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn get_prompt(
        &self,
        user_id: i64,
        prompt_id: i64,
    ) -> Result<PromptRecord, StorageError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .prompts
            .get(&prompt_id)
            .filter(|p| p.user_id == user_id)
            .cloned()
            .ok_or_else(|| StorageError::new(format!("prompt {prompt_id} not found")))
    }

    async fn modifier_rows(&self) -> Result<Vec<ModRow>, StorageError> {
        Ok(self.inner.lock().expect("store mutex poisoned").mods.clone())
    }

    async fn prompt_fields(&self, prompt_id: i64) -> Result<Vec<PromptField>, StorageError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .prompt_fields
            .get(&prompt_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_topic_list(
        &self,
        user_id: i64,
        prompt_id: i64,
        topic_list: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let prompt = inner
            .prompts
            .get_mut(&prompt_id)
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| StorageError::new(format!("prompt {prompt_id} not found")))?;
        prompt.topic_list = topic_list.to_string();
        Ok(())
    }

    async fn add_content(
        &self,
        user_id: i64,
        prompt_id: i64,
        title: &str,
        text: &str,
        post: &str,
    ) -> Result<i64, StorageError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.next_content_id += 1;
        let id = inner.next_content_id;
        inner.contents.push(ContentRecord {
            id,
            user_id,
            prompt_id,
            title: title.to_string(),
            text: text.to_string(),
            post: post.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn add_content_field(
        &self,
        content_id: i64,
        name: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .content_fields
            .push((content_id, name.to_string(), value.to_string()));
        Ok(())
    }

    async fn content_text(&self, user_id: i64, content_id: i64) -> Result<String, StorageError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .contents
            .iter()
            .find(|c| c.id == content_id && c.user_id == user_id)
            .map(|c| c.text.clone())
            .ok_or_else(|| StorageError::new(format!("content {content_id} not found")))
    }

    async fn image_count(&self, content_id: i64) -> Result<u32, StorageError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner
            .content_fields
            .iter()
            .filter(|(id, name, _)| *id == content_id && name == "img")
            .count() as u32)
    }

    async fn get_image_prompt(
        &self,
        user_id: i64,
        iprompt_id: i64,
    ) -> Result<ImagePromptRecord, StorageError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .image_prompts
            .get(&iprompt_id)
            .filter(|p| p.user_id == user_id)
            .cloned()
            .ok_or_else(|| StorageError::new(format!("image prompt {iprompt_id} not found")))
    }

    async fn debit_tokens(&self, user_id: i64, amount: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let balance = inner.balances.entry(user_id).or_insert(0);
        *balance -= amount as i64;
        Ok(())
    }
}
