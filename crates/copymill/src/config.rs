//! Env-driven runtime configuration.
//!
//! Precedence: `COPYMILL_*` environment variables, then compiled-in defaults.
//! `OPENAI_API_KEY` is honoured as a fallback for the provider key.

use std::path::PathBuf;

/// Default OpenAI-compatible API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// Instruct model with a 4K context window.
const DEFAULT_MODEL_4K: &str = "gpt-3.5-turbo-instruct";
/// Flagship model with a 16K context window, used for escalation.
const DEFAULT_MODEL_16K: &str = "gpt-3.5-turbo-1106";
/// Sampling temperature for all completion calls.
pub const TEMPERATURE: f64 = 0.6;
/// Upper bound on stored images per content row.
pub const IMG_MAX: u32 = 6;
/// Extension for stored image files.
pub const IMG_EXT: &str = "jpg";

/// Top-level pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the completion/image provider.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Small-window (4096 token) completion model.
    pub model_4k: String,
    /// Large-window (16384 token) escalation model.
    pub model_16k: String,
    /// Global debug default applied when a prompt's params omit the flag.
    pub debug: bool,
    /// Directory where generated image files are written.
    pub media_dir: PathBuf,
    /// Semaphore permits for concurrent chapter generation.
    pub max_parallel_chapters: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: std::env::var("COPYMILL_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or_default(),
            base_url: std::env::var("COPYMILL_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            model_4k: std::env::var("COPYMILL_MODEL_4K")
                .unwrap_or_else(|_| DEFAULT_MODEL_4K.into()),
            model_16k: std::env::var("COPYMILL_MODEL_16K")
                .unwrap_or_else(|_| DEFAULT_MODEL_16K.into()),
            debug: std::env::var("COPYMILL_DEBUG").is_ok_and(|v| v == "true"),
            media_dir: std::env::var("COPYMILL_MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./media")),
            max_parallel_chapters: std::env::var("COPYMILL_MAX_PARALLEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        }
    }
}

impl Config {
    /// Build from environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::default()
    }
}
