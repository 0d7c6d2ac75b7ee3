//! Completion client: token budgeting, model escalation and truncation
//! recovery around the external text-completion provider.
//!
//! ## Algorithm
//!
//! 1. Estimate the prompt's token count; start on the 4096-token model.
//! 2. Fewer than 500 response tokens left → escalate to the 16384-token
//!    model and recompute the budget.
//! 3. Clamp the requested budget to what the window allows and call the
//!    provider.
//! 4. Debit the user's token balance by the reported usage (fails open —
//!    metering must never block returning generated text).
//! 5. A natural stop returns the text (double quotes normalised to single).
//!    A truncated response is continued: the second half of the text plus a
//!    continue instruction is re-submitted, up to 3 continuation levels, and
//!    the pieces are joined with single spaces. Exceeding the cap or an
//!    empty non-stop completion is fatal.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{Config, TEMPERATURE};
use crate::error::{GenerationError, Result};
use crate::store::ContentStore;

/// Context window of the base model.
pub const SMALL_WINDOW: u32 = 4096;
/// Context window of the escalation model.
pub const LARGE_WINDOW: u32 = 16_384;
/// Escalate when fewer response tokens than this would remain.
const MIN_RESPONSE_TOKENS: u32 = 500;
/// Maximum truncation-recovery depth.
const MAX_CONTINUATIONS: u32 = 3;
const CONTINUE_INSTRUCTION: &str = "...\n\ncontinue where you left off";

/// One completion call's result as reported by the provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub finish_reason: String,
    pub total_tokens: u64,
}

/// The external text-completion provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<CompletionResponse>;
}

/// Pluggable token counting strategy.
///
/// Trait exists so callers can supply a model-specific tokenizer without
/// changing the client.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u32;
}

/// Default estimator: 1 token ≈ 4 characters.
pub struct CharCountEstimator;

impl TokenEstimator for CharCountEstimator {
    fn estimate(&self, text: &str) -> u32 {
        (text.len() / 4) as u32
    }
}

// ── Provider implementation ──────────────────────────────────────────────────

/// OpenAI-style `/completions` endpoint over reqwest.
pub struct OpenAiCompletions {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompletions {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionWire {
    choices: Vec<ChoiceWire>,
    usage: UsageWire,
}

#[derive(Debug, Deserialize)]
struct ChoiceWire {
    text: String,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageWire {
    total_tokens: u64,
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<CompletionResponse> {
        let url = format!("{}/completions", self.base_url);
        let body = json!({
            "model": model,
            "prompt": prompt,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let payload = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GenerationError::provider(format!(
                "completion API error ({status}): {payload}"
            )));
        }

        let wire: CompletionWire = serde_json::from_str(&payload).map_err(|e| {
            GenerationError::provider(format!("failed to parse completion response: {e}"))
        })?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GenerationError::provider("completion response had no choices"))?;

        Ok(CompletionResponse {
            text: choice.text,
            finish_reason: choice.finish_reason.unwrap_or_default(),
            total_tokens: wire.usage.total_tokens,
        })
    }
}

// ── CompletionClient ─────────────────────────────────────────────────────────

/// Wraps the provider with budgeting, escalation, metering and continuation.
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn ContentStore>,
    estimator: Box<dyn TokenEstimator>,
    model_4k: String,
    model_16k: String,
}

impl CompletionClient {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn ContentStore>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            store,
            estimator: Box::new(CharCountEstimator),
            model_4k: config.model_4k.clone(),
            model_16k: config.model_16k.clone(),
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Model and window for a prompt: escalate when the small window would
    /// leave too little room to respond.
    fn select_model(&self, prompt_tokens: u32) -> (&str, u32) {
        if SMALL_WINDOW.saturating_sub(prompt_tokens) < MIN_RESPONSE_TOKENS {
            (&self.model_16k, LARGE_WINDOW)
        } else {
            (&self.model_4k, SMALL_WINDOW)
        }
    }

    /// Generate text for a prompt within the requested token budget.
    pub async fn generate(&self, user_id: i64, prompt: &str, tokens: u32) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        let mut prompt = prompt.to_string();
        let mut level: u32 = 0;

        loop {
            if level > MAX_CONTINUATIONS {
                return Err(GenerationError::ContinuationLimit(MAX_CONTINUATIONS));
            }

            let prompt_tokens = self.estimator.estimate(&prompt);
            let (model, window) = self.select_model(prompt_tokens);
            let budget = window.saturating_sub(prompt_tokens);
            let max_tokens = tokens.min(budget);
            debug!(model, prompt_tokens, max_tokens, level, "completion call");

            let response = self
                .provider
                .complete(model, &prompt, TEMPERATURE, max_tokens)
                .await?;

            info!(total_tokens = response.total_tokens, "completion usage");
            if let Err(e) = self.store.debit_tokens(user_id, response.total_tokens).await {
                // Metering is not transactional with generation; fail open.
                warn!(user_id, error = %e, "token debit failed");
            }

            let text = response.text.trim().replace('"', "'");
            if response.finish_reason == "stop" {
                parts.push(text);
                return Ok(parts.join(" "));
            }
            if text.is_empty() {
                return Err(GenerationError::EmptyCompletion {
                    finish_reason: response.finish_reason,
                });
            }

            prompt = format!("{}{CONTINUE_INSTRUCTION}", second_half(&text));
            parts.push(text);
            level += 1;
        }
    }
}

/// Second half of `text`, split on a char boundary.
fn second_half(text: &str) -> &str {
    let mut mid = text.len() / 2;
    while !text.is_char_boundary(mid) {
        mid += 1;
    }
    &text[mid..]
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::store::{MockContentStore, StorageError};

    #[derive(Debug, Clone)]
    struct Call {
        model: String,
        prompt: String,
        max_tokens: u32,
    }

    /// Scripted provider: pops pre-seeded responses, records every call.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<CompletionResponse>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<CompletionResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            model: &str,
            prompt: &str,
            _temperature: f64,
            max_tokens: u32,
        ) -> Result<CompletionResponse> {
            self.calls.lock().unwrap().push(Call {
                model: model.to_string(),
                prompt: prompt.to_string(),
                max_tokens,
            });
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| GenerationError::provider("script exhausted"))
        }
    }

    /// Estimator returning a fixed count regardless of input.
    struct FixedEstimator(u32);

    impl TokenEstimator for FixedEstimator {
        fn estimate(&self, _text: &str) -> u32 {
            self.0
        }
    }

    fn stop(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.into(),
            finish_reason: "stop".into(),
            total_tokens: 42,
        }
    }

    fn truncated(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.into(),
            finish_reason: "length".into(),
            total_tokens: 42,
        }
    }

    fn metering_store() -> Arc<MockContentStore> {
        let mut store = MockContentStore::new();
        store.expect_debit_tokens().returning(|_, _| Ok(()));
        Arc::new(store)
    }

    fn client(provider: Arc<ScriptedProvider>, store: Arc<MockContentStore>) -> CompletionClient {
        CompletionClient::new(provider, store, &Config::default())
    }

    #[tokio::test]
    async fn natural_stop_returns_normalized_text() {
        let provider = ScriptedProvider::new(vec![stop("  He said \"hi\"  ")]);
        let out = client(provider.clone(), metering_store())
            .generate(1, "prompt", 1000)
            .await
            .unwrap();
        assert_eq!(out, "He said 'hi'");
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn small_prompt_uses_small_model_and_clamps_budget() {
        let provider = ScriptedProvider::new(vec![stop("ok")]);
        let cfg = Config::default();
        let out_client = CompletionClient::new(provider.clone(), metering_store(), &cfg)
            .with_estimator(Box::new(FixedEstimator(100)));
        out_client.generate(1, "prompt", 8000).await.unwrap();

        let call = &provider.calls()[0];
        assert_eq!(call.model, cfg.model_4k);
        // 4096 − 100 = 3996 < requested 8000
        assert_eq!(call.max_tokens, 3996);
    }

    #[tokio::test]
    async fn long_prompt_escalates_and_recomputes_budget() {
        let provider = ScriptedProvider::new(vec![stop("ok")]);
        let cfg = Config::default();
        let out_client = CompletionClient::new(provider.clone(), metering_store(), &cfg)
            .with_estimator(Box::new(FixedEstimator(4000)));
        out_client.generate(1, "prompt", 5000).await.unwrap();

        let call = &provider.calls()[0];
        assert_eq!(call.model, cfg.model_16k);
        // budget recomputed against the large window: 16384 − 4000 > 5000
        assert_eq!(call.max_tokens, 5000);
    }

    #[tokio::test]
    async fn truncated_response_is_continued_once() {
        let provider = ScriptedProvider::new(vec![truncated("abcdef"), stop("tail")]);
        let out = client(provider.clone(), metering_store())
            .generate(1, "prompt", 1000)
            .await
            .unwrap();
        assert_eq!(out, "abcdef tail");

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].prompt, format!("def{CONTINUE_INSTRUCTION}"));
    }

    #[tokio::test]
    async fn continuation_cap_is_three_levels() {
        let provider = ScriptedProvider::new(vec![
            truncated("one"),
            truncated("two"),
            truncated("three"),
            truncated("four"),
            truncated("five"),
        ]);
        let err = client(provider.clone(), metering_store())
            .generate(1, "prompt", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::ContinuationLimit(3)));
        // initial call + 3 continuations, then the cap trips
        assert_eq!(provider.calls().len(), 4);
    }

    #[tokio::test]
    async fn empty_non_stop_completion_is_fatal() {
        let provider = ScriptedProvider::new(vec![truncated("   ")]);
        let err = client(provider, metering_store())
            .generate(1, "prompt", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::EmptyCompletion { .. }));
    }

    #[tokio::test]
    async fn metering_failure_does_not_block_text() {
        let mut store = MockContentStore::new();
        store
            .expect_debit_tokens()
            .returning(|_, _| Err(StorageError::new("balance table offline")));
        let provider = ScriptedProvider::new(vec![stop("still fine")]);
        let out = client(provider, Arc::new(store))
            .generate(1, "prompt", 1000)
            .await
            .unwrap();
        assert_eq!(out, "still fine");
    }

    #[tokio::test]
    async fn usage_is_debited_per_call() {
        let mut store = MockContentStore::new();
        store
            .expect_debit_tokens()
            .times(2)
            .returning(|_, amount| {
                assert_eq!(amount, 42);
                Ok(())
            });
        let provider = ScriptedProvider::new(vec![truncated("abcdef"), stop("tail")]);
        client(provider, Arc::new(store))
            .generate(7, "prompt", 1000)
            .await
            .unwrap();
    }
}
