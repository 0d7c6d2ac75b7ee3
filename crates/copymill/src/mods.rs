//! Modifier set: the text fragments prompts are assembled from.
//!
//! Every slot has a compiled-in default and may be overridden by a persisted
//! modifier row of the same name. Placeholders are positional `{}` and must
//! be substituted through [`fill`] — an arity mismatch between a fragment
//! and its arguments is a fatal construction error, never silent.

use tracing::warn;

use crate::error::{GenerationError, Result};
use crate::store::ContentStore;

/// Tag substituted with the consumed topic inside topic-aware fragments.
pub const TOPIC_TAG: &str = "<topic>";

mod defaults {
    pub const TOPIC: &str =
        "Write a numbered list of 10 article titles on the topic '<topic>'.";
    pub const ARTICLE: &str = "Write an article on the topic '<topic>'.";
    pub const ARTICLE_FIELDS: &str =
        "Use the Text below to fill in the fields listed after it.\n\nText: {}\n";
    pub const TABLE: &str =
        "Write a numbered table of contents for a long article on the topic '<topic>'.";
    pub const CHAPTER: &str = "Below is the table of contents of an article:\n{}\n\n\
         Write the full text of the section '{}'.";
    pub const TABLE_FIELDS: &str =
        "Use the table of contents below to fill in the fields listed after it.\n\n{}\n";
    pub const SEO: &str = "\nUse the following keywords in the text: {}.";
    pub const OPTS_BASE: &str = "\n\nOptions:";
    pub const LANGUAGE: &str = "\nRespond in {} language.";
    pub const STYLE: &str = "\nWrite in a {} style.";
    pub const HTML: &str =
        "\nFormat the response as an HTML document and put the article text inside <body> tags.";
    pub const ADD_FIELD: &str =
        "\nAdd a line that starts with ##{}: followed by a fitting value.";
}

/// Substitute `args` into the `{}` placeholders of `fragment`.
///
/// The placeholder count and the argument count must match exactly; a
/// mismatch means a misconfigured modifier row and aborts the generation.
pub fn fill(fragment: &str, args: &[&str]) -> Result<String> {
    let parts: Vec<&str> = fragment.split("{}").collect();
    let slots = parts.len() - 1;
    if slots != args.len() {
        return Err(GenerationError::Template(format!(
            "fragment has {} placeholder(s) but {} argument(s) were supplied: {:?}",
            slots,
            args.len(),
            fragment,
        )));
    }
    let mut out = String::with_capacity(fragment.len());
    for (i, part) in parts.iter().enumerate() {
        out.push_str(part);
        if i < args.len() {
            out.push_str(args[i]);
        }
    }
    Ok(out)
}

/// Versioned collection of prompt fragments, immutable once loaded.
#[derive(Debug, Clone)]
pub struct ModifierSet {
    /// Topic-list prompt. Uses the `<topic>` tag.
    pub topic: String,
    /// Short-form body prompt (non-pro). Uses the `<topic>` tag.
    pub article: String,
    /// Short-form field extraction. `{}` — article text.
    pub article_fields: String,
    /// Long-form TOC prompt. Uses the `<topic>` tag.
    pub table: String,
    /// Long-form chapter prompt. `{}` — TOC; `{}` — section title.
    pub chapter: String,
    /// Long-form field extraction. `{}` — TOC.
    pub table_fields: String,
    /// Keyword augmentation. `{}` — keyword list.
    pub seo: String,
    /// Option block opener; appended only when an option follows it.
    pub opts_base: String,
    /// `{}` — language.
    pub language: String,
    /// `{}` — style.
    pub style: String,
    /// HTML markup option.
    pub html: String,
    /// Field request line. `{}` — field name.
    pub add_field: String,
}

impl Default for ModifierSet {
    fn default() -> Self {
        Self {
            topic: defaults::TOPIC.into(),
            article: defaults::ARTICLE.into(),
            article_fields: defaults::ARTICLE_FIELDS.into(),
            table: defaults::TABLE.into(),
            chapter: defaults::CHAPTER.into(),
            table_fields: defaults::TABLE_FIELDS.into(),
            seo: defaults::SEO.into(),
            opts_base: defaults::OPTS_BASE.into(),
            language: defaults::LANGUAGE.into(),
            style: defaults::STYLE.into(),
            html: defaults::HTML.into(),
            add_field: defaults::ADD_FIELD.into(),
        }
    }
}

impl ModifierSet {
    /// Load the set from persisted modifier rows.
    ///
    /// Rows with an unknown name or an empty value are skipped; any slot not
    /// covered by a row keeps its compiled-in default. A storage failure is
    /// downgraded to the full default set — modifier loading is never fatal.
    pub async fn load(store: &dyn ContentStore) -> Self {
        let rows = match store.modifier_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "modifier rows unavailable, using defaults");
                return Self::default();
            }
        };

        let mut mods = Self::default();
        for row in rows {
            if row.value.is_empty() {
                continue;
            }
            let slot = match row.name.as_str() {
                "topic" => &mut mods.topic,
                "article" => &mut mods.article,
                "article_fields" => &mut mods.article_fields,
                "table" => &mut mods.table,
                "chapter" => &mut mods.chapter,
                "table_fields" => &mut mods.table_fields,
                "seo" => &mut mods.seo,
                "opts_base" => &mut mods.opts_base,
                "language" => &mut mods.language,
                "style" => &mut mods.style,
                "html" => &mut mods.html,
                "add_field" => &mut mods.add_field,
                _ => continue,
            };
            *slot = row.value;
        }
        mods
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockContentStore, ModRow, StorageError};

    #[test]
    fn fill_substitutes_in_order() {
        let out = fill("a {} b {} c", &["one", "two"]).unwrap();
        assert_eq!(out, "a one b two c");
    }

    #[test]
    fn fill_rejects_arity_mismatch() {
        assert!(fill("only {} here", &["one", "two"]).is_err());
        assert!(fill("{} and {}", &["one"]).is_err());
    }

    #[test]
    fn fill_does_not_recurse_into_arguments() {
        let out = fill("x {} y", &["{}"]).unwrap();
        assert_eq!(out, "x {} y");
    }

    #[tokio::test]
    async fn load_overrides_known_slots_only() {
        let mut store = MockContentStore::new();
        store.expect_modifier_rows().returning(|| {
            Ok(vec![
                ModRow {
                    name: "article".into(),
                    value: "Custom article mod <topic>".into(),
                },
                ModRow {
                    name: "style".into(),
                    value: String::new(), // empty: keep default
                },
                ModRow {
                    name: "no_such_slot".into(),
                    value: "ignored".into(),
                },
            ])
        });

        let mods = ModifierSet::load(&store).await;
        assert_eq!(mods.article, "Custom article mod <topic>");
        assert_eq!(mods.style, ModifierSet::default().style);
        assert_eq!(mods.topic, ModifierSet::default().topic);
    }

    #[tokio::test]
    async fn load_falls_back_on_storage_failure() {
        let mut store = MockContentStore::new();
        store
            .expect_modifier_rows()
            .returning(|| Err(StorageError::new("db offline")));

        let mods = ModifierSet::load(&store).await;
        assert_eq!(mods.topic, ModifierSet::default().topic);
    }

    #[test]
    fn every_default_slot_is_populated() {
        let mods = ModifierSet::default();
        for slot in [
            &mods.topic,
            &mods.article,
            &mods.article_fields,
            &mods.table,
            &mods.chapter,
            &mods.table_fields,
            &mods.seo,
            &mods.opts_base,
            &mods.language,
            &mods.style,
            &mods.html,
            &mods.add_field,
        ] {
            assert!(!slot.is_empty());
        }
    }
}
