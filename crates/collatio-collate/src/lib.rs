//! Collatio Collation
//!
//! The display and query path over a stored corpus:
//!
//! ```text
//! EncodedContent ──► Collator ──► reading matrix ──► annotate ──► markup
//!                      │
//!                      └── member contents ─► extract_regions
//! ```
//!
//! - [`collator`]: positional alignment of member regions
//! - [`annotate`]: variant containers injected after each parent region
//! - [`sentence`]: sentence lookup over raw markup
//! - [`unique`]: flags readings attested by one member only
//! - [`query`]: listings, search and histograms
//!
//! Nothing here fails on missing data: absent witnesses, contents or
//! sentences yield empty results.

pub mod annotate;
pub mod collator;
pub mod query;
pub mod sentence;
pub mod unique;

pub use annotate::render_with_readings;
pub use collator::{Collation, Collator, Reading};
pub use query::{
    list_texts, plain_text, search_paragraphs, sentence_histogram, work_region_readings,
    HistogramBar, TextEntry, WorkRegionRow,
};
pub use sentence::{sentence, sentences_across, RegexSentenceLocator, SentenceHit, SentenceLocator};
pub use unique::{grouping_witnesses, mark_unique_readings, StaleRegion, UniquenessReport};

#[cfg(test)]
pub(crate) mod fixtures {
    use collatio_storage::{
        ContentDraft, Corpus, LocalId, Store, WitnessDraft, WitnessType,
    };

    pub fn witness(
        corpus: &mut Corpus,
        external_id: i64,
        kind: WitnessType,
        siglum: &str,
        group: Option<LocalId>,
    ) -> LocalId {
        let id = corpus
            .upsert_witness(
                external_id,
                WitnessDraft {
                    name: format!("{kind} {siglum}"),
                    kind,
                    manuscript: None,
                    locus: None,
                },
            )
            .id();
        corpus.set_short_name(id, Some(siglum.to_string())).unwrap();
        corpus.set_group(id, group).unwrap();
        id
    }

    pub fn content(corpus: &mut Corpus, witness: LocalId, markup: &str) -> LocalId {
        corpus
            .upsert_content(
                1000 + witness as i64,
                ContentDraft {
                    witness,
                    kind: "transcription".to_string(),
                    status: None,
                    content: markup.to_string(),
                },
            )
            .unwrap()
            .id()
    }

    pub fn version_region(id: &str, text: &str) -> String {
        format!("<span data-dpt-type=\"unsettled\" data-dpt-group=\"version\" data-rid=\"{id}\">{text}</span>")
    }
}
