//! Bit-exact markup conventions shared by the importer, the collator and the
//! display layer.

/// Attribute carrying the editorial type of a node (`unsettled`, `auxiliary`).
pub const TYPE_ATTR: &str = "data-dpt-type";
/// Value of [`TYPE_ATTR`] marking an unsettled region.
pub const UNSETTLED: &str = "unsettled";
/// Value of [`TYPE_ATTR`] marking an auxiliary block, never part of a sentence.
pub const AUXILIARY: &str = "auxiliary";

/// Attribute carrying the region kind (`work` or `version`).
pub const GROUP_ATTR: &str = "data-dpt-group";
/// Stable region / sentence identifier written by the normalizer.
pub const ID_ATTR: &str = "data-rid";
/// Identifier read when [`ID_ATTR`] is missing.
pub const FALLBACK_ID_ATTR: &str = "id";
/// Number of witnesses attesting a reading.
pub const COPIES_ATTR: &str = "data-copies";

/// Attribute naming the kind of anchor element.
pub const ANCHOR_ATTR: &str = "data-dpt";
/// Value of [`ANCHOR_ATTR`] for sentence-number anchors.
pub const SENTENCE_ANCHOR: &str = "sn";

/// Glyph transcribers use for an empty reading.
pub const EMPTY_READING: &str = "\u{2205}";
/// Class added to regions whose only content is [`EMPTY_READING`].
pub const EMPTY_REGION_CLASS: &str = "empty-region";

/// Reading placed in collation cells with no counterpart.
pub const ABSENT_READING: &str = "[absent]";
/// Parent tag of an absent cell.
pub const ABSENT_PARENT: &str = "ms";

/// Tag name of the synthetic element wrapped around fragments.
pub const WRAPPER_TAG: &str = "root";

/// HTML elements that never have content or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];
