//! Image generation pipeline.
//!
//! Thin compared to text generation: assemble a descriptive prompt from the
//! stored image-prompt mods (synthesising the main mod from existing content
//! text when absent), call the image provider, fetch each returned URL and
//! store the bytes under a random filename with an `img` content field.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::completion::CompletionClient;
use crate::config::{Config, IMG_EXT, IMG_MAX};
use crate::error::{GenerationError, Result};
use crate::store::ContentStore;

/// Allowed square image sizes (pixels).
const SIZES: &[u32] = &[256, 512, 1024];
/// Token budget for synthesising the main mod.
const SYNTH_TOKENS: u32 = 2048;

/// The external image-generation provider.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate `n` images for a prompt; returns one URL per image.
    async fn generate(&self, prompt: &str, n: u32, size: &str) -> Result<Vec<String>>;
}

/// OpenAI-style `/images/generations` endpoint over reqwest.
pub struct OpenAiImages {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiImages {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesWire {
    data: Vec<ImageWire>,
}

#[derive(Debug, Deserialize)]
struct ImageWire {
    url: String,
}

#[async_trait]
impl ImageProvider for OpenAiImages {
    async fn generate(&self, prompt: &str, n: u32, size: &str) -> Result<Vec<String>> {
        let url = format!("{}/images/generations", self.base_url);
        let body = json!({ "prompt": prompt, "n": n, "size": size });

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
                "image API error ({status}): {payload}"
            )));
        }

        let wire: ImagesWire = serde_json::from_str(&payload).map_err(|e| {
            GenerationError::provider(format!("failed to parse image response: {e}"))
        })?;
        Ok(wire.data.into_iter().map(|d| d.url).collect())
    }
}

/// Drives one image generation request end to end.
pub struct ImagePipeline {
    store: Arc<dyn ContentStore>,
    provider: Arc<dyn ImageProvider>,
    completions: Arc<CompletionClient>,
    media_dir: PathBuf,
}

impl ImagePipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        provider: Arc<dyn ImageProvider>,
        completions: Arc<CompletionClient>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            provider,
            completions,
            media_dir: config.media_dir.clone(),
        }
    }

    /// Generate and store images for a content row.
    ///
    /// Returns the filenames of the stored images.
    pub async fn run(
        &self,
        user_id: i64,
        content_id: i64,
        iprompt_id: i64,
    ) -> Result<Vec<String>> {
        let cfg = self.store.get_image_prompt(user_id, iprompt_id).await?;
        if !SIZES.contains(&cfg.size) {
            return Err(GenerationError::Configuration(format!(
                "unsupported image size {} (allowed: {SIZES:?})",
                cfg.size
            )));
        }

        let main_mod = if cfg.main.is_empty() {
            self.synthesise_main_mod(user_id, content_id).await?
        } else {
            cfg.main.clone()
        };
        info!(main_mod, "image main mod");

        let mut mod_list = vec![main_mod, cfg.style.clone()];
        mod_list.extend(cfg.mods.iter().cloned());
        let prompt: String = mod_list
            .iter()
            .filter(|m| !m.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" | ");

        let stored = self.store.image_count(content_id).await?;
        let number = cfg.number.min(IMG_MAX.saturating_sub(stored));
        if number == 0 {
            return Ok(Vec::new());
        }

        let size = format!("{0}x{0}", cfg.size);
        let urls = self.provider.generate(&prompt, number, &size).await?;

        let mut filenames = Vec::new();
        for url in urls {
            match self.fetch_and_store(content_id, &url).await {
                Ok(filename) => filenames.push(filename),
                // One bad download must not abort the batch.
                Err(e) => warn!(url, error = %e, "image download failed"),
            }
        }
        Ok(filenames)
    }

    /// Build the main descriptive mod from the content's own text.
    async fn synthesise_main_mod(&self, user_id: i64, content_id: i64) -> Result<String> {
        let text = self.store.content_text(user_id, content_id).await?;
        let prompt = format!(
            "Use the Text between tags '##' to create a prompt for an image model \
             to generate an illustration for the Text: ##{text}##"
        );
        self.completions.generate(user_id, &prompt, SYNTH_TOKENS).await
    }

    async fn fetch_and_store(&self, content_id: i64, url: &str) -> Result<String> {
        let response = reqwest::get(url).await?;
        if !response.status().is_success() {
            return Err(GenerationError::provider(format!(
                "image fetch failed with status {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;

        let filename = random_filename(IMG_EXT);
        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| GenerationError::storage(format!("media dir: {e}")))?;
        tokio::fs::write(self.media_dir.join(&filename), &bytes)
            .await
            .map_err(|e| GenerationError::storage(format!("image write: {e}")))?;

        self.store
            .add_content_field(content_id, "img", &filename)
            .await?;
        info!(filename, "image stored");
        Ok(filename)
    }
}

/// Random 12-letter filename with the given extension.
fn random_filename(extension: &str) -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let name: String = (0..12)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect();
    format!("{name}.{extension}")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::store::{ImagePromptRecord, MockContentStore};

    struct StubImages {
        calls: Mutex<Vec<(String, u32, String)>>,
        urls: Vec<String>,
    }

    impl StubImages {
        fn new(urls: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                urls,
            })
        }
    }

    #[async_trait]
    impl ImageProvider for StubImages {
        async fn generate(&self, prompt: &str, n: u32, size: &str) -> Result<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), n, size.to_string()));
            Ok(self.urls.clone())
        }
    }

    struct NoProvider;

    #[async_trait]
    impl crate::completion::CompletionProvider for NoProvider {
        async fn complete(
            &self,
            _model: &str,
            _prompt: &str,
            _temperature: f64,
            _max_tokens: u32,
        ) -> Result<crate::completion::CompletionResponse> {
            panic!("completion provider must not be called");
        }
    }

    fn pipeline(store: MockContentStore, provider: Arc<StubImages>) -> ImagePipeline {
        let store = Arc::new(store);
        let completions = Arc::new(CompletionClient::new(
            Arc::new(NoProvider),
            store.clone(),
            &Config::default(),
        ));
        ImagePipeline::new(store, provider, completions, &Config::default())
    }

    fn iprompt(number: u32, size: u32, main: &str) -> ImagePromptRecord {
        ImagePromptRecord {
            id: 5,
            user_id: 1,
            number,
            size,
            main: main.into(),
            style: "oil painting".into(),
            mods: vec!["8K".into(), String::new()],
        }
    }

    #[tokio::test]
    async fn prompt_joins_non_empty_mods() {
        let mut store = MockContentStore::new();
        store
            .expect_get_image_prompt()
            .returning(|_, _| Ok(iprompt(2, 512, "a lighthouse")));
        store.expect_image_count().returning(|_| Ok(0));

        let provider = StubImages::new(vec![]);
        pipeline(store, provider.clone()).run(1, 9, 5).await.unwrap();

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "a lighthouse | oil painting | 8K");
        assert_eq!(calls[0].1, 2);
        assert_eq!(calls[0].2, "512x512");
    }

    #[tokio::test]
    async fn count_is_capped_by_stored_images() {
        let mut store = MockContentStore::new();
        store
            .expect_get_image_prompt()
            .returning(|_, _| Ok(iprompt(4, 256, "a lighthouse")));
        store.expect_image_count().returning(|_| Ok(5));

        let provider = StubImages::new(vec![]);
        pipeline(store, provider.clone()).run(1, 9, 5).await.unwrap();

        let calls = provider.calls.lock().unwrap();
        // 6 − 5 = 1 slot left
        assert_eq!(calls[0].1, 1);
    }

    #[tokio::test]
    async fn full_content_generates_nothing() {
        let mut store = MockContentStore::new();
        store
            .expect_get_image_prompt()
            .returning(|_, _| Ok(iprompt(4, 256, "a lighthouse")));
        store.expect_image_count().returning(|_| Ok(6));

        let provider = StubImages::new(vec![]);
        let out = pipeline(store, provider.clone()).run(1, 9, 5).await.unwrap();
        assert!(out.is_empty());
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_size_is_rejected() {
        let mut store = MockContentStore::new();
        store
            .expect_get_image_prompt()
            .returning(|_, _| Ok(iprompt(1, 300, "x")));

        let provider = StubImages::new(vec![]);
        let err = pipeline(store, provider).run(1, 9, 5).await.unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[test]
    fn random_filenames_carry_extension() {
        let name = random_filename("jpg");
        assert_eq!(name.len(), 16);
        assert!(name.ends_with(".jpg"));
        assert_ne!(random_filename("jpg"), random_filename("jpg"));
    }
}
