//! Template constructors.
//!
//! Each constructor deterministically builds the next prompt string from the
//! context and its modifier set, and returns it instead of mutating shared
//! state — the creators thread the value through each phase. Topic-list
//! consumption is the one deliberate context mutation.
//!
//! Prompt-field names are fetched by the creators and passed in so that the
//! constructors stay synchronous and storage-free.

use crate::context::PromptContext;
use crate::error::Result;
use crate::mods::{fill, TOPIC_TAG};

/// Substitute a consumed topic into every occurrence of the topic tag.
///
/// Pops one topic per the ordering policy when the tag is present; an
/// exhausted list substitutes the literal `"nothing"`. The consumed topic is
/// recorded on the context (it becomes the content title).
fn consume_topic(ctx: &mut PromptContext, template: String) -> String {
    if !template.contains(TOPIC_TAG) {
        return template;
    }
    let topic = ctx.pop_topic();
    let out = template.replace(TOPIC_TAG, &topic);
    ctx.topic = topic;
    out
}

/// Keyword augmentation, applied when the seo flag is set and keywords exist.
fn seo_block(ctx: &PromptContext) -> Result<String> {
    if ctx.params.seo && !ctx.kw_list.is_empty() {
        fill(&ctx.mods.seo, &[&ctx.kw_list])
    } else {
        Ok(String::new())
    }
}

/// Option augmentation: language, style and (when requested) HTML markup.
///
/// Returns the base-options fragment plus whatever options apply, or an
/// empty string when no option applies — the bare base fragment is never
/// appended on its own.
fn options_block(ctx: &PromptContext, html: bool) -> Result<String> {
    let mut opts = ctx.mods.opts_base.clone();
    if !ctx.params.language.is_empty() {
        opts.push_str(&fill(&ctx.mods.language, &[&ctx.params.language])?);
    }
    if !ctx.params.style.is_empty() {
        opts.push_str(&fill(&ctx.mods.style, &[&ctx.params.style])?);
    }
    if html && ctx.params.html {
        opts.push_str(&ctx.mods.html);
    }
    if opts == ctx.mods.opts_base {
        return Ok(String::new());
    }
    Ok(opts)
}

/// Append one add-field request per persisted prompt field, in order.
fn field_blocks(ctx: &PromptContext, fields: &[String]) -> Result<String> {
    let mut out = String::new();
    for name in fields {
        out.push_str(&fill(&ctx.mods.add_field, &[name])?);
    }
    Ok(out)
}

/// Topic-list prompt: ask for a list of titles on an explicit topic.
pub fn topic_list_prompt(ctx: &PromptContext, topic: &str) -> Result<String> {
    let mut template = ctx.mods.topic.replace(TOPIC_TAG, topic);
    template.push_str(&options_block(ctx, false)?);
    Ok(template)
}

/// Short-form body prompt.
///
/// Pro mode seeds from the caller-authored template instead of the default
/// body mod.
pub fn short_body_prompt(ctx: &mut PromptContext) -> Result<String> {
    let seed = if ctx.params.pro {
        ctx.template.clone()
    } else {
        ctx.mods.article.clone()
    };
    let mut template = consume_topic(ctx, seed);
    template.push_str(&seo_block(ctx)?);
    template.push_str(&options_block(ctx, true)?);
    Ok(template)
}

/// Short-form field-extraction prompt, seeded from the generated body text.
pub fn short_fields_prompt(ctx: &PromptContext, fields: &[String]) -> Result<String> {
    let mut template = fill(&ctx.mods.article_fields, &[&ctx.text])?;
    template.push_str(&field_blocks(ctx, fields)?);
    template.push_str(&options_block(ctx, false)?);
    Ok(template)
}

/// Long-form table-of-contents prompt.
pub fn long_table_prompt(ctx: &mut PromptContext) -> Result<String> {
    let seed = ctx.mods.table.clone();
    let mut template = consume_topic(ctx, seed);
    template.push_str(&options_block(ctx, false)?);
    Ok(template)
}

/// Long-form chapter prompt, seeded from the TOC and one chapter title.
pub fn long_chapter_prompt(ctx: &PromptContext, chapter_title: &str) -> Result<String> {
    let mut template = fill(&ctx.mods.chapter, &[&ctx.toc, chapter_title])?;
    template.push_str(&seo_block(ctx)?);
    template.push_str(&options_block(ctx, true)?);
    Ok(template)
}

/// Long-form field-extraction prompt, seeded from the TOC.
pub fn long_fields_prompt(ctx: &PromptContext, fields: &[String]) -> Result<String> {
    let mut template = fill(&ctx.mods.table_fields, &[&ctx.toc])?;
    template.push_str(&field_blocks(ctx, fields)?);
    template.push_str(&options_block(ctx, false)?);
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::ModifierSet;
    use crate::params::GenerationParams;
    use crate::store::PromptRecord;

    fn context(params_json: &str) -> PromptContext {
        let record = PromptRecord {
            id: 1,
            user_id: 1,
            template: format!("test_template {TOPIC_TAG}"),
            topic_list: "cat;dog;duck".into(),
            kw_list: "keyword1, keyword2".into(),
            ..Default::default()
        };
        let params = GenerationParams::from_json(params_json, false).unwrap();
        PromptContext::from_record(record, params, ModifierSet::default())
    }

    #[test]
    fn no_options_leaves_template_unchanged() {
        let ctx = context("{}");
        assert_eq!(options_block(&ctx, true).unwrap(), "");
        let prompt = topic_list_prompt(&ctx, "Birds").unwrap();
        assert_eq!(prompt, ctx.mods.topic.replace(TOPIC_TAG, "Birds"));
    }

    #[test]
    fn options_append_base_and_set_options() {
        let ctx = context(r#"{"language": "russian", "style": "modern", "html": true}"#);
        let opts = options_block(&ctx, true).unwrap();
        assert_eq!(
            opts,
            format!(
                "{}{}{}{}",
                ctx.mods.opts_base,
                fill(&ctx.mods.language, &["Russian"]).unwrap(),
                fill(&ctx.mods.style, &["modern"]).unwrap(),
                ctx.mods.html,
            )
        );
        // html option only applies when the caller requests HTML awareness
        let opts = options_block(&ctx, false).unwrap();
        assert!(!opts.contains(&ctx.mods.html));
    }

    #[test]
    fn short_body_consumes_topic_into_default_mod() {
        let mut ctx = context("{}");
        let prompt = short_body_prompt(&mut ctx).unwrap();
        assert_eq!(prompt, ctx.mods.article.replace(TOPIC_TAG, "cat"));
        assert_eq!(ctx.topic, "cat");
        assert_eq!(ctx.topic_list, vec!["dog", "duck"]);
    }

    #[test]
    fn short_body_pro_seeds_from_caller_template() {
        let mut ctx = context(r#"{"pro": true}"#);
        let prompt = short_body_prompt(&mut ctx).unwrap();
        assert_eq!(prompt, "test_template cat");
    }

    #[test]
    fn exhausted_list_substitutes_nothing() {
        let mut ctx = context("{}");
        ctx.topic_list.clear();
        let prompt = short_body_prompt(&mut ctx).unwrap();
        assert_eq!(prompt, ctx.mods.article.replace(TOPIC_TAG, "nothing"));
    }

    #[test]
    fn seo_applies_only_with_flag_and_keywords() {
        let mut ctx = context(r#"{"seo": true}"#);
        let prompt = short_body_prompt(&mut ctx).unwrap();
        assert!(prompt.ends_with(&fill(&ctx.mods.seo, &["keyword1, keyword2"]).unwrap()));

        let mut ctx = context(r#"{"seo": true}"#);
        ctx.kw_list.clear();
        let prompt = short_body_prompt(&mut ctx).unwrap();
        assert_eq!(prompt, ctx.mods.article.replace(TOPIC_TAG, "cat"));
    }

    #[test]
    fn field_extraction_appends_fields_in_order() {
        let mut ctx = context("{}");
        ctx.text = "Generated body.".into();
        let fields = vec!["title".to_string(), "img".to_string()];
        let prompt = short_fields_prompt(&ctx, &fields).unwrap();
        let expected = format!(
            "{}{}{}",
            fill(&ctx.mods.article_fields, &["Generated body."]).unwrap(),
            fill(&ctx.mods.add_field, &["title"]).unwrap(),
            fill(&ctx.mods.add_field, &["img"]).unwrap(),
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn chapter_prompt_embeds_toc_and_title() {
        let mut ctx = context("{}");
        ctx.toc = "1. First\n2. Second".into();
        let prompt = long_chapter_prompt(&ctx, "First").unwrap();
        assert!(prompt.contains("1. First\n2. Second"));
        assert!(prompt.contains("'First'"));
    }

    #[test]
    fn table_prompt_consumes_topic() {
        let mut ctx = context("{}");
        let prompt = long_table_prompt(&mut ctx).unwrap();
        assert_eq!(prompt, ctx.mods.table.replace(TOPIC_TAG, "cat"));
    }
}
