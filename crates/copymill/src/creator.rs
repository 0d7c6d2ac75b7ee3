//! Creators: one per generation use case, driven by a shared orchestration
//! entry point.
//!
//! A creator sequences template construction, completion calls, response
//! parsing and persistence for exactly one request. The three variants form
//! a tagged union dispatched in [`Creator::create`] — no virtual dispatch.
//!
//! Lifecycle per instance:
//! `constructed → template-built → (completion-phase)* → persisted → returned`,
//! terminal on the first unrecoverable error.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::context::PromptContext;
use crate::error::Result;
use crate::parse;
use crate::store::ContentStore;
use crate::template;

/// Attempts per chapter before degrading to an inline error marker.
const CHAPTER_ATTEMPTS: u32 = 3;
/// Fixed back-off between chapter attempts.
const CHAPTER_BACKOFF: Duration = Duration::from_secs(2);
/// Visible in-body marker substituted for a chapter that never generated.
const CHAPTER_ERROR_MARKER: &str = "\\_(o_O)_/ ";
/// Separator between templates persisted in debug mode.
const DEBUG_SEPARATOR: &str = "\n\n===================\n\n";
/// Title for content persisted without provider calls.
const DEBUG_TITLE: &str = "DEBUG: gpt off";

/// Summary returned by a finished generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Topic-list-only mode: parsed topics, nothing persisted.
    Topics(Vec<String>),
    /// A persisted content row. `debug` marks a run without provider calls.
    Content { content_id: i64, debug: bool },
}

/// The generation use case selected for one request.
#[derive(Debug, Clone)]
pub enum Creator {
    /// Produce a topic list for an explicit topic; persist nothing.
    TopicListOnly { topic: String },
    /// One article from one consumed topic.
    ShortForm,
    /// Table of contents plus concurrently generated chapters.
    LongForm,
}

impl Creator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TopicListOnly { .. } => "topic_list",
            Self::ShortForm => "shortread",
            Self::LongForm => "longread",
        }
    }

    /// Drive the use case to completion.
    pub async fn create(
        self,
        gen: &Generator,
        mut ctx: PromptContext,
    ) -> Result<GenerationOutcome> {
        info!(creator = self.name(), user_id = ctx.user_id, prompt_id = ctx.id, "creating");
        match self {
            Self::TopicListOnly { topic } => gen.topic_list(&ctx, &topic).await,
            Self::ShortForm => gen.shortread(&mut ctx).await,
            Self::LongForm => gen.longread(&mut ctx).await,
        }
    }
}

/// Shared collaborators for every creator run.
pub struct Generator {
    store: Arc<dyn ContentStore>,
    client: Arc<CompletionClient>,
    config: Config,
}

impl Generator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        client: Arc<CompletionClient>,
        config: Config,
    ) -> Self {
        Self {
            store,
            client,
            config,
        }
    }

    /// Entry point for one generation request.
    ///
    /// Resolves the context, selects the creator (explicit topic →
    /// topic-list-only, `longread` param → long-form, otherwise short-form)
    /// and runs it.
    pub async fn generate(
        &self,
        user_id: i64,
        prompt_id: i64,
        topic: Option<&str>,
    ) -> Result<GenerationOutcome> {
        let ctx = PromptContext::resolve(
            self.store.as_ref(),
            user_id,
            prompt_id,
            self.config.debug,
        )
        .await?;

        let creator = match topic {
            Some(topic) => Creator::TopicListOnly {
                topic: topic.to_string(),
            },
            None if ctx.params.longread => Creator::LongForm,
            None => Creator::ShortForm,
        };
        creator.create(self, ctx).await
    }

    // ── TopicListOnly ────────────────────────────────────────────────────

    async fn topic_list(&self, ctx: &PromptContext, topic: &str) -> Result<GenerationOutcome> {
        let template = template::topic_list_prompt(ctx, topic)?;
        if ctx.params.debug {
            return Ok(GenerationOutcome::Topics(vec![template]));
        }

        debug!(template, "topic-list prompt");
        let toc = self
            .client
            .generate(ctx.user_id, &template, ctx.params.tokens)
            .await?;
        debug!(toc, "topic-list response");

        Ok(GenerationOutcome::Topics(parse::parse_toc(
            &toc,
            false,
            ctx.params.debug,
        )))
    }

    // ── ShortForm ────────────────────────────────────────────────────────

    async fn shortread(&self, ctx: &mut PromptContext) -> Result<GenerationOutcome> {
        let body_template = template::short_body_prompt(ctx)?;
        if ctx.params.debug {
            return self.debug_shortread(ctx, body_template).await;
        }

        debug!(template = body_template, "body prompt");
        let mut text = self
            .client
            .generate(ctx.user_id, &body_template, ctx.params.tokens)
            .await?;
        if ctx.params.html {
            text = parse::extract_tagged(&text, "body");
        }
        ctx.text = text;

        let content_id = self
            .store
            .add_content(ctx.user_id, ctx.id, &ctx.topic, &ctx.text, &ctx.post)
            .await?;
        ctx.write_topic_list(self.store.as_ref()).await?;

        let fields = self.field_names(ctx.id).await?;
        let fields_template = template::short_fields_prompt(ctx, &fields)?;
        self.create_content_fields(ctx, content_id, &fields_template)
            .await?;

        info!(content_id, "shortread persisted");
        Ok(GenerationOutcome::Content {
            content_id,
            debug: false,
        })
    }

    /// Persist both short-form templates instead of calling the provider.
    async fn debug_shortread(
        &self,
        ctx: &mut PromptContext,
        body_template: String,
    ) -> Result<GenerationOutcome> {
        let fields = self.field_names(ctx.id).await?;
        let fields_template = template::short_fields_prompt(ctx, &fields)?;
        let text = format!("{body_template}{DEBUG_SEPARATOR}{fields_template}");
        let content_id = self
            .store
            .add_content(ctx.user_id, ctx.id, DEBUG_TITLE, &text, "false")
            .await?;
        Ok(GenerationOutcome::Content {
            content_id,
            debug: true,
        })
    }

    // ── LongForm ─────────────────────────────────────────────────────────

    async fn longread(&self, ctx: &mut PromptContext) -> Result<GenerationOutcome> {
        let table_template = template::long_table_prompt(ctx)?;
        if ctx.params.debug {
            return self.debug_longread(ctx, table_template).await;
        }

        debug!(template = table_template, "table prompt");
        ctx.toc = self
            .client
            .generate(ctx.user_id, &table_template, ctx.params.tokens)
            .await?;
        info!(toc = ctx.toc, "table of contents");
        ctx.text = if ctx.params.html {
            format!(
                "<div class=\"table-of-conts\">\n{}<br>\n</div>\n",
                ctx.toc.replace('\n', "<br>\n")
            )
        } else {
            ctx.toc.clone()
        };

        let chapters = self.make_chapters(ctx).await?;
        ctx.text.push_str("\n\n");
        ctx.text.push_str(&chapters.join("\n\n"));

        let content_id = self
            .store
            .add_content(ctx.user_id, ctx.id, &ctx.topic, &ctx.text, &ctx.post)
            .await?;
        ctx.write_topic_list(self.store.as_ref()).await?;

        let fields = self.field_names(ctx.id).await?;
        let fields_template = template::long_fields_prompt(ctx, &fields)?;
        self.create_content_fields(ctx, content_id, &fields_template)
            .await?;

        info!(content_id, "longread persisted");
        Ok(GenerationOutcome::Content {
            content_id,
            debug: false,
        })
    }

    /// Persist the table, first-chapter and field templates instead of
    /// calling the provider.
    async fn debug_longread(
        &self,
        ctx: &mut PromptContext,
        table_template: String,
    ) -> Result<GenerationOutcome> {
        let mut text = table_template;
        if let Some(first) = ctx.toc_list(true).first() {
            text.push_str(DEBUG_SEPARATOR);
            text.push_str(&template::long_chapter_prompt(ctx, first)?);
        }
        let fields = self.field_names(ctx.id).await?;
        text.push_str(DEBUG_SEPARATOR);
        text.push_str(&template::long_fields_prompt(ctx, &fields)?);

        let content_id = self
            .store
            .add_content(ctx.user_id, ctx.id, DEBUG_TITLE, &text, "false")
            .await?;
        Ok(GenerationOutcome::Content {
            content_id,
            debug: true,
        })
    }

    /// Generate every chapter concurrently; bodies come back in TOC order.
    ///
    /// Fan-out is bounded by a semaphore. Chapters are independent: one
    /// chapter exhausting its retries degrades to an inline marker and never
    /// cancels its siblings.
    async fn make_chapters(&self, ctx: &PromptContext) -> Result<Vec<String>> {
        let titles = ctx.toc_list(true);
        let mut jobs = Vec::with_capacity(titles.len());
        for title in titles {
            let template = template::long_chapter_prompt(ctx, &title)?;
            jobs.push((title, template));
        }

        let sem = Arc::new(Semaphore::new(self.config.max_parallel_chapters.max(1)));
        let mut join_set: JoinSet<(usize, String)> = JoinSet::new();
        let n = jobs.len();
        for (i, (title, template)) in jobs.into_iter().enumerate() {
            let sem = sem.clone();
            let client = self.client.clone();
            let user_id = ctx.user_id;
            let tokens = ctx.params.tokens;
            let html = ctx.params.html;
            join_set.spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                (i, make_one_chapter(client, user_id, title, template, tokens, html).await)
            });
        }

        let mut chapters = vec![String::new(); n];
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((i, chapter)) => chapters[i] = chapter,
                Err(e) => warn!(error = %e, "chapter task panicked"),
            }
        }
        Ok(chapters)
    }

    // ── Shared phases ────────────────────────────────────────────────────

    async fn field_names(&self, prompt_id: i64) -> Result<Vec<String>> {
        let fields = self.store.prompt_fields(prompt_id).await?;
        Ok(fields.into_iter().map(|f| f.name).collect())
    }

    /// Run the field-extraction completion and persist each parsed field.
    async fn create_content_fields(
        &self,
        ctx: &PromptContext,
        content_id: i64,
        fields_template: &str,
    ) -> Result<()> {
        debug!(template = fields_template, "field prompt");
        let fields_text = self
            .client
            .generate(ctx.user_id, fields_template, ctx.params.tokens)
            .await?;
        debug!(fields_text, "field response");

        for (name, value) in parse::parse_marked_fields(&fields_text) {
            self.store
                .add_content_field(content_id, &name, &value)
                .await?;
        }
        Ok(())
    }
}

/// Generate one chapter, retrying transient provider failures.
///
/// Retry exhaustion (or a non-retriable error) substitutes a visible error
/// marker so the rest of the article still assembles.
async fn make_one_chapter(
    client: Arc<CompletionClient>,
    user_id: i64,
    title: String,
    template: String,
    tokens: u32,
    html: bool,
) -> String {
    for attempt in 1..=CHAPTER_ATTEMPTS {
        match client.generate(user_id, &template, tokens).await {
            Ok(mut chapter) => {
                let mut heading = title;
                if html {
                    chapter = parse::extract_tagged(&chapter, "body");
                    heading = format!("<h2>{heading}</h2>");
                }
                return format!("{heading}\n\n{chapter}");
            }
            Err(e) if e.is_retriable() && attempt < CHAPTER_ATTEMPTS => {
                warn!(title, attempt, error = %e, "chapter attempt failed");
                tokio::time::sleep(CHAPTER_BACKOFF).await;
            }
            Err(e) => {
                warn!(title, error = %e, "chapter generation gave up");
                return format!("{title}\n\n{CHAPTER_ERROR_MARKER}{e}");
            }
        }
    }
    unreachable!("chapter retry loop always returns")
}
