//! Typed generation parameters, parsed from a prompt's stored JSON blob.
//!
//! Stored blobs may carry keys from earlier application versions; unknown
//! keys are ignored rather than rejected. `tokens` is accepted both as a
//! JSON number and as a numeric string (older rows stored it as text).

use serde::Deserialize;

use crate::error::{GenerationError, Result};

/// Topic-list consumption policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicOrder {
    /// Pop from the front (stored as `"normal"` historically).
    #[default]
    #[serde(alias = "normal")]
    Sequential,
    /// Pop a uniformly random element.
    Random,
    /// Pop from the back.
    Reverse,
}

/// Validated generation options for one prompt.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Skip provider calls; persist raw templates instead.
    pub debug: bool,
    /// Requested response token budget.
    pub tokens: u32,
    /// Topic-list ordering policy.
    pub list_order: TopicOrder,
    /// Response language, first letter upper-cased. Empty = unset.
    pub language: String,
    /// Writing style. Empty = unset.
    pub style: String,
    /// Long-form (table-of-contents driven) generation.
    pub longread: bool,
    /// Caller supplies the body template; skip the default body mod.
    pub pro: bool,
    /// Request HTML markup and strip to the body tag afterwards.
    pub html: bool,
    /// Append keyword augmentation to body prompts.
    pub seo: bool,
}

/// Wire shape: every field optional so absent keys fall back cleanly.
#[derive(Debug, Default, Deserialize)]
struct RawParams {
    debug: Option<bool>,
    tokens: Option<TokenCount>,
    list_order: Option<TopicOrder>,
    language: Option<String>,
    style: Option<String>,
    longread: Option<bool>,
    pro: Option<bool>,
    html: Option<bool>,
    seo: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenCount {
    Number(u32),
    Text(String),
}

impl TokenCount {
    fn value(&self) -> Option<u32> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl GenerationParams {
    pub const DEFAULT_TOKENS: u32 = 4096;

    /// Parse from the stored JSON blob.
    ///
    /// An empty blob yields all defaults. `global_debug` is the deployment
    /// default used when the blob does not carry its own `debug` key.
    pub fn from_json(raw: &str, global_debug: bool) -> Result<Self> {
        let wire: RawParams = if raw.trim().is_empty() {
            RawParams::default()
        } else {
            serde_json::from_str(raw).map_err(|e| {
                GenerationError::Configuration(format!("bad params blob: {e}"))
            })?
        };

        let tokens = wire
            .tokens
            .as_ref()
            .and_then(TokenCount::value)
            .unwrap_or(Self::DEFAULT_TOKENS);
        if tokens == 0 {
            return Err(GenerationError::Configuration(
                "tokens must be a positive integer".into(),
            ));
        }

        Ok(Self {
            debug: wire.debug.unwrap_or(global_debug),
            tokens,
            list_order: wire.list_order.unwrap_or_default(),
            language: capitalize(wire.language.as_deref().unwrap_or("")),
            style: wire.style.unwrap_or_default(),
            longread: wire.longread.unwrap_or(false),
            pro: wire.pro.unwrap_or(false),
            html: wire.html.unwrap_or(false),
            seo: wire.seo.unwrap_or(false),
        })
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from_json("", false).expect("empty params blob always parses")
    }
}

/// Upper-case the first character, lower-case the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.trim().chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
    }
}
