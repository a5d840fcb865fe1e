//! Positional collation of sibling witnesses.
//!
//! ```text
//!            member 0     member 1     member 2
//! region 0   Reading      Reading      [absent]
//! region 1   Reading      [absent]     [absent]
//! ```
//!
//! Rows are region positions in document order, columns are members. Cells
//! with no counterpart hold a freshly built absent reading.

use collatio_markup::conventions::{ABSENT_PARENT, ABSENT_READING};
use collatio_markup::{extract_regions_from_markup, Region};
use collatio_storage::{
    AbsentMembers, CorpusConfig, EncodedContent, MemberOrder, Store, Witness, WitnessType,
};
use serde::Serialize;

/// One cell of the reading matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reading {
    /// Siglum of the member the reading comes from, `ms` for absent cells.
    pub parent: String,
    pub reading: String,
    pub id: String,
    pub copies: u32,
}

impl Reading {
    pub fn absent() -> Self {
        Self {
            parent: ABSENT_PARENT.to_string(),
            reading: ABSENT_READING.to_string(),
            id: String::new(),
            copies: 0,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.parent == ABSENT_PARENT && self.reading == ABSENT_READING && self.id.is_empty()
    }

    fn from_region(region: Region, siglum: &str) -> Self {
        Self {
            parent: siglum.to_string(),
            reading: region.reading,
            id: region.id,
            copies: region.copies,
        }
    }
}

/// Result of collating one grouping witness.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Collation {
    /// `matrix[i][j]`: reading of member `j` at region position `i`.
    pub matrix: Vec<Vec<Reading>>,
    pub members: Vec<Witness>,
}

impl Collation {
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }
}

/// Collates members of grouping witnesses held in a store.
pub struct Collator<'a, S: Store + ?Sized> {
    store: &'a S,
    config: &'a CorpusConfig,
}

impl<'a, S: Store + ?Sized> Collator<'a, S> {
    pub fn new(store: &'a S, config: &'a CorpusConfig) -> Self {
        Self { store, config }
    }

    /// Members of `group` taking part in collation, in configured order.
    pub fn members(&self, group: &Witness) -> Vec<&'a Witness> {
        let mut members: Vec<&'a Witness> = self
            .store
            .members(group.id)
            .into_iter()
            .filter(|member| !self.config.is_excluded(member))
            .collect();
        if self.config.member_order == MemberOrder::ShortName {
            members.sort_by(|a, b| a.siglum().cmp(b.siglum()));
        }
        members
    }

    pub fn collate(&self, parent: &EncodedContent) -> Collation {
        let Some(group) = self.store.witness(parent.witness) else {
            return Collation::default();
        };
        if group.kind == WitnessType::Manuscript {
            return Collation::default();
        }

        let mut members = Vec::new();
        let mut columns: Vec<Vec<Region>> = Vec::new();
        for member in self.members(group) {
            let regions = match self.store.content_for(member.id, &parent.kind) {
                Some(content) => self.member_regions(member, content),
                None if self.config.absent_members == AbsentMembers::Skip => continue,
                None => Vec::new(),
            };
            members.push(member.clone());
            columns.push(regions);
        }

        let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        if rows == 0 {
            return Collation {
                matrix: Vec::new(),
                members,
            };
        }

        let mut matrix: Vec<Vec<Reading>> = (0..rows)
            .map(|_| (0..members.len()).map(|_| Reading::absent()).collect())
            .collect();
        for (column, (member, regions)) in members.iter().zip(columns).enumerate() {
            for (row, region) in regions.into_iter().enumerate() {
                matrix[row][column] = Reading::from_region(region, member.siglum());
            }
        }

        Collation { matrix, members }
    }

    fn member_regions(&self, member: &Witness, content: &EncodedContent) -> Vec<Region> {
        let Some(kind) = member.kind.member_region_kind() else {
            return Vec::new();
        };
        match extract_regions_from_markup(&content.content, kind) {
            Ok(regions) => regions,
            Err(err) => {
                tracing::warn!(
                    witness = member.display_name(),
                    error = %err,
                    "member markup could not be parsed; treating as having no regions"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{content, version_region, witness};
    use collatio_storage::Corpus;

    fn reading(parent: &str, text: &str, id: &str) -> Reading {
        Reading {
            parent: parent.to_string(),
            reading: text.to_string(),
            id: id.to_string(),
            copies: 0,
        }
    }

    #[test]
    fn test_single_member_scenario() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        let parent = content(
            &mut corpus,
            version,
            "<span data-dpt-type=\"unsettled\" id=\"v-1\">foo</span>",
        );
        content(&mut corpus, m1, &version_region("v-1", "bar"));

        let config = CorpusConfig::default();
        let collation = Collator::new(&corpus, &config).collate(corpus.content(parent).unwrap());
        assert_eq!(collation.matrix, vec![vec![reading("M1", "bar", "v-1")]]);
        assert_eq!(collation.members.len(), 1);
        assert_eq!(collation.members[0].id, m1);
    }

    #[test]
    fn test_member_without_content_is_skipped_unless_configured() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        witness(&mut corpus, 3, WitnessType::Manuscript, "M2", Some(version));
        let m3 = witness(&mut corpus, 4, WitnessType::Manuscript, "M3", Some(version));
        let parent = content(&mut corpus, version, &version_region("v-1", "x"));
        content(
            &mut corpus,
            m1,
            &format!("{}{}", version_region("v-1", "a"), version_region("v-2", "b")),
        );
        content(&mut corpus, m3, &version_region("v-1", "c"));

        let skipped = Collator::new(&corpus, &CorpusConfig::default())
            .collate(corpus.content(parent).unwrap());
        let sigla: Vec<&str> = skipped.members.iter().map(|m| m.siglum()).collect();
        assert_eq!(sigla, vec!["M1", "M3"]);
        assert!(skipped.matrix.iter().all(|row| row.len() == 2));

        let config = CorpusConfig {
            absent_members: AbsentMembers::SentinelColumn,
            ..CorpusConfig::default()
        };
        let collation = Collator::new(&corpus, &config).collate(corpus.content(parent).unwrap());

        assert_eq!(collation.members.len(), 3);
        assert_eq!(collation.matrix.len(), 2);
        assert!(collation.matrix.iter().all(|row| row.len() == 3));
        assert!(collation.matrix.iter().all(|row| row[1].is_absent()));
        assert_eq!(collation.matrix[0][2], reading("M3", "c", "v-1"));
        assert_eq!(collation.matrix[1][2], Reading::absent());
        assert_eq!(collation.matrix[1][0], reading("M1", "b", "v-2"));
    }

    #[test]
    fn test_excluded_sigla_and_member_order() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let z = witness(&mut corpus, 2, WitnessType::Manuscript, "Z", Some(version));
        let hm = witness(&mut corpus, 3, WitnessType::Manuscript, "HM1", Some(version));
        let b = witness(&mut corpus, 4, WitnessType::Manuscript, "B", Some(version));
        let parent = content(&mut corpus, version, &version_region("v-1", "x"));
        for member in [z, hm, b] {
            content(&mut corpus, member, &version_region("v-1", "y"));
        }

        let config = CorpusConfig::default();
        let collation = Collator::new(&corpus, &config).collate(corpus.content(parent).unwrap());
        let sigla: Vec<&str> = collation.members.iter().map(|m| m.siglum()).collect();
        assert_eq!(sigla, vec!["Z", "B"]);

        let sorted = CorpusConfig {
            member_order: MemberOrder::ShortName,
            ..CorpusConfig::default()
        };
        let collation = Collator::new(&corpus, &sorted).collate(corpus.content(parent).unwrap());
        let sigla: Vec<&str> = collation.members.iter().map(|m| m.siglum()).collect();
        assert_eq!(sigla, vec!["B", "Z"]);
    }

    #[test]
    fn test_work_parent_collates_version_work_regions() {
        let mut corpus = Corpus::new();
        let work = witness(&mut corpus, 1, WitnessType::Work, "W", None);
        let version = witness(&mut corpus, 2, WitnessType::Version, "A", Some(work));
        let parent = content(
            &mut corpus,
            work,
            "<span data-dpt-type=\"unsettled\" data-dpt-group=\"work\" data-rid=\"w-1\">x</span>",
        );
        content(
            &mut corpus,
            version,
            concat!(
                "<span data-dpt-type=\"unsettled\" data-dpt-group=\"version\" data-rid=\"v-1\">v</span>",
                "<span data-dpt-type=\"unsettled\" data-dpt-group=\"work\" data-rid=\"w-1\" data-copies=\"1\">w</span>"
            ),
        );

        let config = CorpusConfig::default();
        let collation = Collator::new(&corpus, &config).collate(corpus.content(parent).unwrap());
        assert_eq!(
            collation.matrix,
            vec![vec![Reading {
                parent: "A".to_string(),
                reading: "w".to_string(),
                id: "w-1".to_string(),
                copies: 1,
            }]]
        );
    }

    #[test]
    fn test_manuscript_and_regionless_groups_are_empty() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        let parent = content(&mut corpus, version, "<p>no regions</p>");
        let member = content(&mut corpus, m1, "<p>none here either</p>");

        let config = CorpusConfig::default();
        let collator = Collator::new(&corpus, &config);
        let collation = collator.collate(corpus.content(parent).unwrap());
        assert!(collation.is_empty());
        assert_eq!(collation.members.len(), 1);
        assert_eq!(collator.collate(corpus.content(member).unwrap()), Collation::default());
    }

    #[test]
    fn test_collation_is_deterministic() {
        let mut corpus = Corpus::new();
        let version = witness(&mut corpus, 1, WitnessType::Version, "A", None);
        let m1 = witness(&mut corpus, 2, WitnessType::Manuscript, "M1", Some(version));
        witness(&mut corpus, 3, WitnessType::Manuscript, "M2", Some(version));
        let parent = content(&mut corpus, version, &version_region("v-1", "x"));
        content(&mut corpus, m1, &version_region("v-1", "a"));

        let config = CorpusConfig {
            absent_members: AbsentMembers::SentinelColumn,
            ..CorpusConfig::default()
        };
        let collator = Collator::new(&corpus, &config);
        let parent = corpus.content(parent).unwrap();
        let mut first = collator.collate(parent);
        assert_eq!(first, collator.collate(parent));

        // Cells are independent values.
        first.matrix[0][1].reading.push_str(" edited");
        assert_eq!(collator.collate(parent).matrix[0][1], Reading::absent());
    }
}
