//! Content normalizer.
//!
//! Rewrites imported markup so regions and sentence anchors carry stable
//! identifiers. Ids are recomputed from document order on every pass, which
//! makes the rewrite idempotent: a second pass finds every attribute already
//! set to its value and leaves the markup byte-identical.

use collatio_markup::conventions::{
    ANCHOR_ATTR, EMPTY_READING, EMPTY_REGION_CLASS, GROUP_ATTR, ID_ATTR, SENTENCE_ANCHOR,
};
use collatio_markup::regions::{is_region, region_kind};
use collatio_markup::{parse_fragment, MarkupError, RegionKind};

const NBSP_FORMS: [&str; 4] = ["&nbsp;", "&#160;", "&#xA0;", "&#xa0;"];

/// Replaces non-breaking spaces, literal or escaped, with plain spaces.
pub fn collapse_nbsp(markup: &str) -> String {
    let mut text = markup.replace('\u{a0}', " ");
    for form in NBSP_FORMS {
        if text.contains(form) {
            text = text.replace(form, " ");
        }
    }
    text
}

/// Normalizes one document. Fails only when the markup cannot be parsed
/// even leniently.
pub fn normalize(markup: &str) -> Result<String, MarkupError> {
    let markup = collapse_nbsp(markup);
    let mut tree = parse_fragment(&markup)?;

    let mut work_count = 0usize;
    let mut version_count = 0usize;

    for node in tree.find_elements(is_region) {
        let empty = tree.text_content(node).trim() == EMPTY_READING;
        let Some(element) = tree.element_mut(node) else {
            continue;
        };

        if element.attr(GROUP_ATTR).is_none() {
            element.set_attr(GROUP_ATTR, RegionKind::Version.as_str());
        }
        if empty {
            element.add_class(EMPTY_REGION_CLASS);
        }

        let kind = region_kind(element);
        let counter = match kind {
            RegionKind::Work => &mut work_count,
            RegionKind::Version => &mut version_count,
        };
        *counter += 1;
        element.set_attr(ID_ATTR, format!("{}-{}", kind.id_prefix(), counter));
    }

    for node in tree.find_elements(|e| e.attr(ANCHOR_ATTR) == Some(SENTENCE_ANCHOR)) {
        let Some(number) = sentence_number(&tree.text_content(node)) else {
            continue;
        };
        if let Some(element) = tree.element_mut(node) {
            element.set_attr(ID_ATTR, format!("s-{number}"));
        }
    }

    Ok(tree.serialize(true))
}

/// First run of ASCII digits in an anchor's text, without leading zeros.
fn sentence_number(text: &str) -> Option<u64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
