//! Read-only corpus queries behind the text browser: listings, paragraph
//! search, plain text, sentence histograms and the work-region variant table.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use collatio_markup::conventions::{ANCHOR_ATTR, EMPTY_READING, ID_ATTR, SENTENCE_ANCHOR};
use collatio_markup::regions::{is_region, region_kind};
use collatio_markup::{parse_fragment, region_nodes, NodeId, RegionKind, Tree};
use collatio_storage::{slugify, CorpusConfig, LocalId, Store, Witness, WitnessType};
use regex::RegexBuilder;
use serde::Serialize;

// ============================================================================
// Text listing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManuscriptInfo {
    pub city: String,
    pub repository: String,
    pub shelfmark: Option<String>,
    pub locus: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEntry {
    pub id: LocalId,
    #[serde(rename = "type")]
    pub kind: WitnessType,
    pub slug: String,
    pub name: String,
    pub group: Option<LocalId>,
    pub siglum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manuscript: Option<ManuscriptInfo>,
}

/// Flat list of witnesses, works first, then versions, then manuscripts.
///
/// `group` (a slug or a local id) keeps the named witness, its members and
/// its members' members.
pub fn list_texts<S: Store + ?Sized>(
    store: &S,
    config: &CorpusConfig,
    group: Option<&str>,
) -> Vec<TextEntry> {
    let in_group = |witness: &Witness| match group {
        None => true,
        Some(key) => {
            let named = |w: &Witness| w.slug == key || key.parse::<LocalId>() == Ok(w.id);
            let parent = witness.group.and_then(|id| store.witness(id));
            let grandparent = parent.and_then(|p| p.group).and_then(|id| store.witness(id));
            named(witness) || parent.map_or(false, named) || grandparent.map_or(false, named)
        }
    };

    let mut witnesses: Vec<&Witness> = store
        .witnesses()
        .into_iter()
        .filter(|w| !config.is_excluded(w))
        .filter(|w| in_group(w))
        .collect();
    // Missing sigla and loci sort last.
    witnesses.sort_by_key(|w| {
        (
            Reverse(w.kind),
            w.short_name.is_none(),
            w.short_name.clone(),
            w.locus.is_none(),
            w.locus.clone(),
        )
    });

    witnesses
        .into_iter()
        .map(|w| TextEntry {
            id: w.id,
            kind: w.kind,
            slug: w.slug.clone(),
            name: w.name.clone(),
            group: w.group,
            siglum: w.short_name.clone(),
            manuscript: w.manuscript.and_then(|id| store.manuscript(id)).map(|ms| {
                let repository = ms.repository.and_then(|id| store.repository(id));
                ManuscriptInfo {
                    city: repository.map(|r| r.city.clone()).unwrap_or_default(),
                    repository: repository.map(|r| r.name.clone()).unwrap_or_default(),
                    shelfmark: ms.shelfmark.clone(),
                    locus: w.locus.clone(),
                }
            }),
        })
        .collect()
}

// ============================================================================
// Markup queries
// ============================================================================

fn paragraphs(tree: &Tree) -> Vec<NodeId> {
    tree.find_elements(|e| e.name().eq_ignore_ascii_case("p"))
}

fn parse_or_warn(markup: &str) -> Option<Tree> {
    match parse_fragment(markup) {
        Ok(tree) => Some(tree),
        Err(err) => {
            tracing::warn!(error = %err, "markup could not be parsed");
            None
        }
    }
}

/// Paragraphs whose whitespace-normalised text contains a word starting with
/// `query`, case-insensitively. Returned as markup.
pub fn search_paragraphs(markup: &str, query: &str) -> Vec<String> {
    let pattern = format!(r"\b{}\w*\b", regex::escape(&query.to_lowercase()));
    let re = match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(err) => {
            tracing::warn!(query, error = %err, "search pattern rejected");
            return Vec::new();
        }
    };
    let Some(tree) = parse_or_warn(markup) else {
        return Vec::new();
    };

    paragraphs(&tree)
        .into_iter()
        .filter(|&p| {
            let text = tree.text_content(p);
            let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
            re.is_match(&normalized)
        })
        .map(|p| tree.serialize_node(p))
        .collect()
}

/// Trimmed text of a rendition, `None` when there is none.
pub fn plain_text(markup: &str) -> Option<String> {
    let tree = parse_or_warn(markup)?;
    let text = tree.text_content(Tree::DOCUMENT);
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramBar {
    pub sentence: u64,
    /// Regions of the requested kind in the sentence's paragraph.
    pub regions: usize,
}

/// One bar per sentence anchor: the number of `kind` regions in the
/// paragraph holding it.
pub fn sentence_histogram(markup: &str, kind: RegionKind) -> Vec<HistogramBar> {
    let Some(tree) = parse_or_warn(markup) else {
        return Vec::new();
    };
    let mut bars = Vec::new();
    for paragraph in paragraphs(&tree) {
        let regions = tree
            .find_elements_under(paragraph, |e| is_region(e) && region_kind(e) == kind)
            .len();
        let anchors =
            tree.find_elements_under(paragraph, |e| e.attr(ANCHOR_ATTR) == Some(SENTENCE_ANCHOR));
        for anchor in anchors {
            let number = tree
                .element(anchor)
                .and_then(|e| e.attr(ID_ATTR))
                .and_then(|id| id.strip_prefix("s-"))
                .and_then(|n| n.parse().ok());
            if let Some(sentence) = number {
                bars.push(HistogramBar { sentence, regions });
            }
        }
    }
    bars
}

// ============================================================================
// Work-region variant table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkRegionReading {
    pub reading: String,
    /// `[parent siglum, member siglum]` pairs attesting the reading.
    pub witnesses: Vec<[String; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkRegionRow {
    pub key: String,
    pub readings: Vec<WorkRegionReading>,
}

impl WorkRegionRow {
    fn attest(&mut self, reading: String, pair: [String; 2]) {
        match self.readings.iter_mut().find(|r| r.reading == reading) {
            Some(existing) => existing.witnesses.push(pair),
            None => self.readings.push(WorkRegionReading {
                reading,
                witnesses: vec![pair],
            }),
        }
    }
}

/// Work regions of the `reference` witness, each with the readings that the
/// `manuscripts` produce once their version readings are substituted into
/// their parent version.
pub fn work_region_readings<S: Store + ?Sized>(
    store: &S,
    config: &CorpusConfig,
    reference: &str,
    manuscripts: &[LocalId],
) -> Vec<WorkRegionRow> {
    let kind = config.default_content_kind.as_str();
    let mut rows = Vec::new();
    let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();

    for witness in store.witnesses().into_iter().filter(|w| w.siglum() == reference) {
        let Some(tree) = store
            .content_for(witness.id, kind)
            .and_then(|content| parse_or_warn(&content.content))
        else {
            continue;
        };
        for region in region_nodes(&tree, RegionKind::Work) {
            let mut key: String = slugify(&tree.text_content(region)).chars().take(20).collect();
            if key.is_empty() {
                key = EMPTY_READING.to_string();
            }
            let seen = frequencies.entry(key.clone()).or_default();
            *seen += 1;
            if *seen > 1 {
                key = format!("{key}:{seen}");
            }
            rows.push(WorkRegionRow {
                key,
                readings: Vec::new(),
            });
        }
    }

    let mut members: Vec<&Witness> = manuscripts
        .iter()
        .filter_map(|&id| store.witness(id))
        .filter(|w| w.kind == WitnessType::Manuscript)
        .collect();
    members.sort_by(|a, b| a.siglum().cmp(b.siglum()));

    for member in members {
        let Some(member_tree) = store
            .content_for(member.id, kind)
            .and_then(|content| parse_or_warn(&content.content))
        else {
            continue;
        };
        let Some(parent) = member.group.and_then(|id| store.witness(id)) else {
            tracing::warn!(witness = member.display_name(), "manuscript has no parent version");
            continue;
        };
        let Some(mut parent_tree) = store
            .content_for(parent.id, kind)
            .and_then(|content| parse_or_warn(&content.content))
        else {
            continue;
        };

        let readings: Vec<String> = region_nodes(&member_tree, RegionKind::Version)
            .into_iter()
            .map(|node| member_tree.text_content(node))
            .collect();
        for (index, node) in region_nodes(&parent_tree, RegionKind::Version)
            .into_iter()
            .enumerate()
        {
            match readings.get(index) {
                Some(reading) => parent_tree.set_text(node, reading),
                None => tracing::warn!(
                    index,
                    member = member.display_name(),
                    parent = parent.display_name(),
                    "version region not found in member"
                ),
            }
        }

        for (index, node) in region_nodes(&parent_tree, RegionKind::Work)
            .into_iter()
            .enumerate()
        {
            let Some(row) = rows.get_mut(index) else {
                tracing::warn!(
                    index,
                    parent = parent.display_name(),
                    reference,
                    "work region not found in reference text"
                );
                continue;
            };
            let reading = parent_tree.text_content(node).trim().to_string();
            row.attest(
                reading,
                [parent.siglum().to_string(), member.siglum().to_string()],
            );
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{content, witness};
    use collatio_storage::Corpus;

    fn unsettled(group: &str, inner: &str) -> String {
        format!("<span data-dpt-type=\"unsettled\" data-dpt-group=\"{group}\">{inner}</span>")
    }

    #[test]
    fn test_list_texts_order_and_group_filter() {
        let mut corpus = Corpus::new();
        let work = witness(&mut corpus, 1, WitnessType::Work, "W", None);
        let version = witness(&mut corpus, 2, WitnessType::Version, "A", Some(work));
        witness(&mut corpus, 3, WitnessType::Manuscript, "M2", Some(version));
        witness(&mut corpus, 4, WitnessType::Manuscript, "M1", Some(version));
        witness(&mut corpus, 5, WitnessType::Manuscript, "HM1", Some(version));
        witness(&mut corpus, 6, WitnessType::Work, "X", None);

        let config = CorpusConfig::default();
        let all: Vec<String> = list_texts(&corpus, &config, None)
            .into_iter()
            .filter_map(|t| t.siglum)
            .collect();
        assert_eq!(all, vec!["W", "X", "A", "M1", "M2"]);

        let grouped: Vec<String> = list_texts(&corpus, &config, Some("work-w"))
            .into_iter()
            .filter_map(|t| t.siglum)
            .collect();
        assert_eq!(grouped, vec!["W", "A", "M1", "M2"]);

        let by_id = list_texts(&corpus, &config, Some(&version.to_string()));
        assert_eq!(by_id.len(), 3);
    }

    #[test]
    fn test_search_paragraphs_matches_word_prefix() {
        let markup = "<p>Robert the\n  <b>Bruce</b> king</p><p>Edward</p><p>abrupt</p>";
        assert_eq!(search_paragraphs(markup, "bru"), vec!["<p>Robert the\n  <b>Bruce</b> king</p>"]);
        assert_eq!(search_paragraphs(markup, "EDW"), vec!["<p>Edward</p>"]);
        assert!(search_paragraphs(markup, "rupt").is_empty());
        assert!(search_paragraphs(markup, "a.b").is_empty());
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(plain_text("  <p> Hello <i>world</i> </p> ").as_deref(), Some("Hello world"));
        assert_eq!(plain_text("<p> </p>"), None);
    }

    #[test]
    fn test_sentence_histogram_counts_regions_per_paragraph() {
        let markup = format!(
            "<p><span data-dpt=\"sn\" data-rid=\"s-1\">1</span>{}{}</p><p><span data-dpt=\"sn\" data-rid=\"s-2\">2</span>{}<span data-dpt=\"sn\">x</span></p>",
            unsettled("work", "a"),
            unsettled("version", "b"),
            unsettled("work", "c"),
        );
        assert_eq!(
            sentence_histogram(&markup, RegionKind::Work),
            vec![
                HistogramBar { sentence: 1, regions: 1 },
                HistogramBar { sentence: 2, regions: 1 },
            ]
        );
        assert_eq!(sentence_histogram(&markup, RegionKind::Version)[1].regions, 0);
    }

    #[test]
    fn test_work_region_readings() {
        let mut corpus = Corpus::new();
        let work = witness(&mut corpus, 1, WitnessType::Work, "W", None);
        let version = witness(&mut corpus, 2, WitnessType::Version, "A", Some(work));
        let reference = witness(&mut corpus, 3, WitnessType::Version, "HM1", None);
        let m2 = witness(&mut corpus, 4, WitnessType::Manuscript, "M2", Some(version));
        let m1 = witness(&mut corpus, 5, WitnessType::Manuscript, "M1", Some(version));

        content(
            &mut corpus,
            reference,
            &format!("{}{}", unsettled("work", "The King!"), unsettled("work", "")),
        );
        content(
            &mut corpus,
            version,
            &format!(
                "<p>{} and {}</p>",
                unsettled("work", &format!("the {} king", unsettled("version", "vb"))),
                unsettled("work", &unsettled("version", "vc")),
            ),
        );
        content(
            &mut corpus,
            m1,
            &format!("{}{}", unsettled("version", "great"), unsettled("version", "\u{2205}")),
        );
        content(&mut corpus, m2, &unsettled("version", "great"));

        let rows = work_region_readings(&corpus, &CorpusConfig::default(), "HM1", &[m2, m1]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "the-king");
        assert_eq!(
            rows[0].readings,
            vec![WorkRegionReading {
                reading: "the great king".to_string(),
                witnesses: vec![
                    ["A".to_string(), "M1".to_string()],
                    ["A".to_string(), "M2".to_string()],
                ],
            }]
        );
        assert_eq!(rows[1].key, "\u{2205}");
        let readings: Vec<&str> = rows[1].readings.iter().map(|r| r.reading.as_str()).collect();
        assert_eq!(readings, vec!["\u{2205}", "vc"]);
    }
}
