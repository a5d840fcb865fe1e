//! Sentence lookup over raw markup.
//!
//! Sentence anchors are not always well-formed in isolation, so lookup runs
//! pattern matching over the markup text instead of a tree query. Callers
//! only see [`SentenceLocator`].

use std::sync::OnceLock;

use collatio_storage::{EncodedContent, LocalId, Store};
use regex::Regex;
use serde::Serialize;

/// Finds the markup block of one numbered sentence.
pub trait SentenceLocator {
    /// Block starting at sentence `n`'s anchor, up to the next anchor or the
    /// end of input. Empty when the sentence is not there.
    fn sentence(&self, markup: &str, n: u32) -> String;
}

/// Regex implementation. The block starts at the paragraph opening with the
/// `s-<n>` anchor and stops right before the next anchored paragraph, or at
/// the end of input.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexSentenceLocator;

fn auxiliary_blocks() -> &'static Regex {
    static AUXILIARY: OnceLock<Regex> = OnceLock::new();
    AUXILIARY.get_or_init(|| {
        Regex::new(r#"(?si)<p\s[^>]*data-dpt-type=["']auxiliary["'].*?</p>"#)
            .expect("auxiliary block pattern is valid")
    })
}

fn anchored_paragraphs() -> &'static Regex {
    static ANCHORED: OnceLock<Regex> = OnceLock::new();
    ANCHORED.get_or_init(|| {
        Regex::new(r#"(?si)<p(?:\s[^>]*)?>\s*<span[^>]+data-dpt=["']sn["']"#)
            .expect("anchored paragraph pattern is valid")
    })
}

/// Removes auxiliary paragraphs; they never belong to a sentence.
pub fn strip_auxiliary(markup: &str) -> std::borrow::Cow<'_, str> {
    auxiliary_blocks().replace_all(markup, "")
}

impl SentenceLocator for RegexSentenceLocator {
    fn sentence(&self, markup: &str, n: u32) -> String {
        let content = strip_auxiliary(markup);
        let pattern = format!(r#"(?si)<p(?:\s[^>]*)?>\s*<span[^>]+data-rid=["']s-{n}["']"#);
        let start = match Regex::new(&pattern) {
            Ok(re) => re.find(&content),
            Err(err) => {
                tracing::warn!(sentence = n, error = %err, "sentence pattern rejected");
                return String::new();
            }
        };
        let Some(start) = start else {
            return String::new();
        };

        let end = anchored_paragraphs()
            .find_at(&content, start.end())
            .map_or(content.len(), |next| next.start());
        content[start.start()..end].trim_end().to_string()
    }
}

/// Sentence `n` of one rendition.
pub fn sentence(content: &EncodedContent, n: u32) -> String {
    RegexSentenceLocator.sentence(&content.content, n)
}

/// Sentence `n` of one witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceHit {
    pub witness: LocalId,
    pub siglum: String,
    pub group_siglum: String,
    pub fragment: String,
}

/// Sentence `n` for each witness holding content of `kind`, ordered by the
/// group's siglum and then the witness's own. Empty fragments are kept.
pub fn sentences_across<S: Store + ?Sized>(
    store: &S,
    locator: &dyn SentenceLocator,
    witnesses: &[LocalId],
    kind: &str,
    n: u32,
) -> Vec<SentenceHit> {
    let mut hits: Vec<SentenceHit> = witnesses
        .iter()
        .filter_map(|&id| {
            let witness = store.witness(id)?;
            let content = store.content_for(id, kind)?;
            let group_siglum = witness
                .group
                .and_then(|group| store.witness(group))
                .map(|group| group.siglum().to_string())
                .unwrap_or_default();
            Some(SentenceHit {
                witness: id,
                siglum: witness.siglum().to_string(),
                group_siglum,
                fragment: locator.sentence(&content.content, n),
            })
        })
        .collect();
    hits.sort_by(|a, b| {
        a.group_siglum
            .cmp(&b.group_siglum)
            .then_with(|| a.siglum.cmp(&b.siglum))
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchored(n: u32, body: &str) -> String {
        format!("<p><span data-dpt=\"sn\" data-rid=\"s-{n}\">{n}</span> {body}</p>")
    }

    #[test]
    fn test_returns_block_between_anchors() {
        let markup = [
            anchored(1, "one"),
            anchored(2, "two"),
            anchored(3, "three"),
            "<p>three continued</p>".to_string(),
            anchored(4, "four"),
        ]
        .join("\n");
        let found = RegexSentenceLocator.sentence(&markup, 3);
        assert_eq!(found, format!("{}\n<p>three continued</p>", anchored(3, "three")));
    }

    #[test]
    fn test_last_sentence_runs_to_end_of_input() {
        let markup = format!("{}{}\n", anchored(1, "one"), anchored(2, "two"));
        assert_eq!(RegexSentenceLocator.sentence(&markup, 2), anchored(2, "two"));
    }

    #[test]
    fn test_auxiliary_blocks_are_ignored() {
        let markup = format!(
            "{}<p data-dpt-type=\"auxiliary\"><span data-dpt=\"sn\" data-rid=\"s-2\">x</span></p>{}",
            anchored(1, "one"),
            anchored(2, "two")
        );
        assert_eq!(RegexSentenceLocator.sentence(&markup, 1), anchored(1, "one"));
        assert_eq!(RegexSentenceLocator.sentence(&markup, 2), anchored(2, "two"));
    }

    #[test]
    fn test_missing_sentence_is_empty() {
        let markup = anchored(1, "one");
        assert_eq!(RegexSentenceLocator.sentence(&markup, 12), "");
        // s-1 must not match s-10
        assert_eq!(RegexSentenceLocator.sentence(&anchored(10, "ten"), 1), "");
    }

    #[test]
    fn test_unclosed_paragraph_stops_at_next_anchor() {
        let markup = format!(
            "<p><span data-dpt=\"sn\" data-rid=\"s-3\">3</span> three{}{}",
            anchored(4, "four"),
            anchored(5, "five")
        );
        assert_eq!(
            RegexSentenceLocator.sentence(&markup, 3),
            "<p><span data-dpt=\"sn\" data-rid=\"s-3\">3</span> three"
        );
        assert_eq!(RegexSentenceLocator.sentence(&markup, 4), anchored(4, "four"));
    }

    #[test]
    fn test_single_quoted_anchor_attributes() {
        let markup = "<p><span data-dpt='sn' data-rid='s-3'>3</span> three</p>\n\
                      <p><span data-dpt='sn' data-rid='s-4'>4</span> four</p>";
        assert_eq!(
            RegexSentenceLocator.sentence(markup, 3),
            "<p><span data-dpt='sn' data-rid='s-3'>3</span> three</p>"
        );
    }

    #[test]
    fn test_case_insensitive_tags() {
        let markup = "<P><SPAN DATA-DPT=\"sn\" DATA-RID=\"s-5\">5</SPAN> five</P>";
        assert_eq!(RegexSentenceLocator.sentence(markup, 5), markup);
    }
}
