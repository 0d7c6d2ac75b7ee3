//! Content generation pipeline around text-completion and image providers.
//!
//! A generation request resolves a stored prompt into a [`context::PromptContext`],
//! selects a creator for the use case, and drives it through template
//! construction, completion calls, response parsing and persistence:
//!
//! - **topic list**: one completion, parsed into topic titles, nothing persisted
//! - **shortread**: one article body from one consumed topic, plus field extraction
//! - **longread**: a table of contents, concurrently generated chapters, plus
//!   field extraction
//!
//! The completion client handles token budgeting, model escalation, usage
//! metering and truncation recovery; the image pipeline assembles descriptive
//! prompts from stored mods and stores the fetched images. All persistence
//! goes through the [`store::ContentStore`] trait.

pub mod completion;
pub mod config;
pub mod context;
pub mod creator;
pub mod error;
pub mod image;
pub mod mods;
pub mod params;
pub mod parse;
pub mod store;
pub mod template;

pub use completion::{CompletionClient, CompletionProvider, OpenAiCompletions};
pub use config::Config;
pub use creator::{Creator, GenerationOutcome, Generator};
pub use error::{GenerationError, Result};
pub use image::{ImagePipeline, ImageProvider, OpenAiImages};
pub use store::ContentStore;
