//! Flags readings attested by a single member.

use std::collections::BTreeMap;

use collatio_markup::conventions::COPIES_ATTR;
use collatio_markup::regions::region_id;
use collatio_markup::{parse_fragment, region_nodes};
use collatio_storage::{CorpusConfig, LocalId, Store, StoreError, WitnessType};
use serde::Serialize;

use crate::collator::Collator;

/// A region id recorded in a collation that no longer exists in the
/// member's markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleRegion {
    pub group: LocalId,
    pub member: LocalId,
    pub region_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UniquenessReport {
    /// Regions newly or already carrying `data-copies="1"`.
    pub marked: usize,
    /// Contents whose markup was rewritten.
    pub updated_contents: Vec<LocalId>,
    pub stale: Vec<StaleRegion>,
}

/// Every version and work witness, in insertion order.
pub fn grouping_witnesses<S: Store + ?Sized>(store: &S) -> Vec<LocalId> {
    store
        .witnesses()
        .into_iter()
        .filter(|w| w.kind != WitnessType::Manuscript)
        .map(|w| w.id)
        .collect()
}

/// Collates each of `groups` on the default content kind and sets
/// `data-copies="1"` on every region whose reading is unique within its row.
pub fn mark_unique_readings<S: Store + ?Sized>(
    store: &mut S,
    config: &CorpusConfig,
    groups: &[LocalId],
) -> Result<UniquenessReport, StoreError> {
    let kind = config.default_content_kind.as_str();
    let mut report = UniquenessReport::default();
    // content id -> (member, group, row -> region id)
    let mut pending: BTreeMap<LocalId, (LocalId, LocalId, BTreeMap<usize, String>)> =
        BTreeMap::new();

    {
        let collator = Collator::new(&*store, config);
        for &group in groups {
            let Some(parent) = store.content_for(group, kind) else {
                continue;
            };
            let collation = collator.collate(parent);

            for (index, row) in collation.matrix.iter().enumerate() {
                let mut attested: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
                for (column, reading) in row.iter().enumerate() {
                    if !reading.is_absent() {
                        attested.entry(reading.reading.as_str()).or_default().push(column);
                    }
                }
                for columns in attested.values().filter(|columns| columns.len() == 1) {
                    let member = &collation.members[columns[0]];
                    let region = &row[columns[0]].id;
                    let Some(content) = store.content_for(member.id, kind) else {
                        continue;
                    };
                    pending
                        .entry(content.id)
                        .or_insert_with(|| (member.id, group, BTreeMap::new()))
                        .2
                        .insert(index, region.clone());
                }
            }
        }
    }

    for (content_id, (member, group, rows)) in pending {
        let Some(member_kind) = store
            .witness(member)
            .and_then(|w| w.kind.member_region_kind())
        else {
            continue;
        };
        let Some(content) = store.content(content_id) else {
            continue;
        };
        let mut tree = match parse_fragment(&content.content) {
            Ok(tree) => tree,
            Err(err) => {
                tracing::warn!(content = content_id, error = %err, "cannot mark unparsable markup");
                continue;
            }
        };

        // Rows are region positions; the id only confirms the node is the
        // one that was collated.
        let nodes = region_nodes(&tree, member_kind);
        let mut changed = false;
        for (index, expected) in rows {
            let element = nodes
                .get(index)
                .and_then(|&node| tree.element_mut(node))
                .filter(|element| !expected.is_empty() && region_id(element) == expected);
            match element {
                Some(element) => {
                    changed |= element.set_attr(COPIES_ATTR, "1");
                    report.marked += 1;
                }
                None => {
                    tracing::warn!(
                        member,
                        region = expected.as_str(),
                        "unique reading refers to a region id missing from the member's markup"
                    );
                    report.stale.push(StaleRegion {
                        group,
                        member,
                        region_id: expected,
                    });
                }
            }
        }

        if changed {
            store.set_content_markup(content_id, tree.serialize(true))?;
            report.updated_contents.push(content_id);
        }
    }

    tracing::info!(
        marked = report.marked,
        updated = report.updated_contents.len(),
        stale = report.stale.len(),
        "unique readings marked"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{content, version_region, witness};
    use collatio_storage::Corpus;

    #[test]
    fn test_marks_singly_attested_readings() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        let m2 = witness(&mut corpus, 3, WitnessType::Manuscript, "M2", Some(version));
        let m3 = witness(&mut corpus, 4, WitnessType::Manuscript, "M3", Some(version));
        content(
            &mut corpus,
            version,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-2", "x")),
        );
        let c1 = content(
            &mut corpus,
            m1,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-2", "x")),
        );
        let c2 = content(
            &mut corpus,
            m2,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-2", "y")),
        );
        let c3 = content(&mut corpus, m3, &version_region("v-1", "b"));

        let config = CorpusConfig::default();
        let groups = grouping_witnesses(&corpus);
        assert_eq!(groups, vec![version]);

        let report = mark_unique_readings(&mut corpus, &config, &groups).unwrap();
        assert_eq!(report.marked, 3);
        assert!(report.stale.is_empty());
        assert_eq!(report.updated_contents, vec![c1, c2, c3]);

        let marked = |id| {
            collatio_markup::extract_regions_from_markup(
                &corpus.content(id).unwrap().content,
                collatio_markup::RegionKind::Version,
            )
            .unwrap()
            .into_iter()
            .map(|r| r.copies)
            .collect::<Vec<_>>()
        };
        assert_eq!(marked(c1), vec![0, 1]);
        assert_eq!(marked(c2), vec![0, 1]);
        assert_eq!(marked(c3), vec![1]);

        // Already marked: nothing left to rewrite.
        let again = mark_unique_readings(&mut corpus, &config, &groups).unwrap();
        assert_eq!(again.marked, 3);
        assert!(again.updated_contents.is_empty());
    }

    #[test]
    fn test_duplicate_ids_mark_only_the_collated_position() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        let m2 = witness(&mut corpus, 3, WitnessType::Manuscript, "M2", Some(version));
        content(
            &mut corpus,
            version,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-2", "b")),
        );
        let c1 = content(
            &mut corpus,
            m1,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-1", "b")),
        );
        let c2 = content(
            &mut corpus,
            m2,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-2", "c")),
        );

        let report =
            mark_unique_readings(&mut corpus, &CorpusConfig::default(), &[version]).unwrap();
        assert_eq!(report.marked, 2);
        assert!(report.stale.is_empty());

        let copies = |id| {
            collatio_markup::extract_regions_from_markup(
                &corpus.content(id).unwrap().content,
                collatio_markup::RegionKind::Version,
            )
            .unwrap()
            .into_iter()
            .map(|r| r.copies)
            .collect::<Vec<_>>()
        };
        assert_eq!(copies(c1), vec![0, 1]);
        assert_eq!(copies(c2), vec![0, 1]);
    }

    #[test]
    fn test_region_without_id_is_reported_stale() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        content(&mut corpus, version, &version_region("v-1", "a"));
        let before = "<span data-dpt-type=\"unsettled\">solo</span>";
        let c1 = content(&mut corpus, m1, before);

        let report =
            mark_unique_readings(&mut corpus, &CorpusConfig::default(), &[version]).unwrap();
        assert_eq!(
            report.stale,
            vec![StaleRegion {
                group: version,
                member: m1,
                region_id: String::new(),
            }]
        );
        assert_eq!(corpus.content(c1).unwrap().content, before);
    }
}
