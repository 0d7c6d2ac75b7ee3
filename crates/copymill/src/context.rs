//! Mutable working state for one generation request.
//!
//! A `PromptContext` is resolved fresh from storage at the start of every
//! generation and discarded at the end. The only durable side effects are
//! the topic-list write-back and the content rows the creators persist.

use rand::Rng;

use crate::error::Result;
use crate::mods::ModifierSet;
use crate::params::{GenerationParams, TopicOrder};
use crate::parse;
use crate::store::{ContentStore, PromptRecord};

/// Template used when a prompt row carries no template of its own.
const EMPTY_TEMPLATE: &str = "say: \"your template is empty :/\"";

#[derive(Debug, Clone)]
pub struct PromptContext {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Caller-authored template; seeds the body prompt in pro mode.
    pub template: String,
    /// Working topic list, consumed destructively during generation.
    pub topic_list: Vec<String>,
    pub kw_list: String,
    pub post: String,
    pub params: GenerationParams,
    pub mods: ModifierSet,
    /// Topic consumed for the current generation.
    pub topic: String,
    /// Accumulated body text.
    pub text: String,
    /// Raw table-of-contents text returned by the provider.
    pub toc: String,
}

impl PromptContext {
    /// Resolve the context for a prompt from storage.
    pub async fn resolve(
        store: &dyn ContentStore,
        user_id: i64,
        prompt_id: i64,
        global_debug: bool,
    ) -> Result<Self> {
        let record = store.get_prompt(user_id, prompt_id).await?;
        let params = GenerationParams::from_json(&record.params, global_debug)?;
        let mods = ModifierSet::load(store).await;
        Ok(Self::from_record(record, params, mods))
    }

    pub fn from_record(
        record: PromptRecord,
        params: GenerationParams,
        mods: ModifierSet,
    ) -> Self {
        let topic_list = split_topic_list(&record.topic_list);
        let template = if record.template.is_empty() {
            EMPTY_TEMPLATE.to_string()
        } else {
            record.template
        };
        Self {
            id: record.id,
            user_id: record.user_id,
            name: record.name,
            template,
            topic_list,
            kw_list: record.kw_list,
            post: record.post,
            params,
            mods,
            topic: String::new(),
            text: "Text text text text\ntext text text text.".into(),
            toc: "1. One\n2. Two\n3. Three\n4. Four".into(),
        }
    }

    /// Pop one topic according to the ordering policy.
    ///
    /// Destructive: the returned topic is removed from the working list.
    /// An exhausted list yields the literal `"nothing"`.
    pub fn pop_topic(&mut self) -> String {
        if self.topic_list.is_empty() {
            return "nothing".into();
        }
        let topic = match self.params.list_order {
            TopicOrder::Sequential => self.topic_list.remove(0),
            TopicOrder::Reverse => self.topic_list.pop().expect("list is non-empty"),
            TopicOrder::Random => {
                let i = rand::thread_rng().gen_range(0..self.topic_list.len());
                self.topic_list.remove(i)
            }
        };
        topic.trim().to_string()
    }

    /// Chapter titles parsed from the raw TOC text.
    pub fn toc_list(&self, numbered: bool) -> Vec<String> {
        parse::parse_toc(&self.toc, numbered, self.params.debug)
    }

    /// Persist the remaining topic list back to the prompt row.
    pub async fn write_topic_list(&self, store: &dyn ContentStore) -> Result<()> {
        store
            .update_topic_list(self.user_id, self.id, &self.topic_list.join("; "))
            .await?;
        Ok(())
    }
}

fn split_topic_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
