//! Tests for the corpus tables and the transactional store

use super::*;
use std::collections::BTreeSet;
use tempfile::tempdir;

fn witness(corpus: &mut Corpus, external_id: ExternalId, name: &str, kind: WitnessType) -> LocalId {
    corpus
        .upsert_witness(
            external_id,
            WitnessDraft {
                name: name.to_string(),
                kind,
                manuscript: None,
                locus: None,
            },
        )
        .id()
}

fn content(corpus: &mut Corpus, external_id: ExternalId, witness: LocalId, markup: &str) -> Upsert {
    corpus
        .upsert_content(
            external_id,
            ContentDraft {
                witness,
                kind: "transcription".to_string(),
                status: None,
                content: markup.to_string(),
            },
        )
        .unwrap()
}

/// work(1) <- version(2) <- manuscripts(3, 4)
fn hierarchy() -> (Corpus, [LocalId; 4]) {
    let mut corpus = Corpus::new();
    let work = witness(&mut corpus, 1, "Declaration", WitnessType::Work);
    let version = witness(&mut corpus, 2, "Declaration A", WitnessType::Version);
    let ms1 = witness(&mut corpus, 3, "Paris 1", WitnessType::Manuscript);
    let ms2 = witness(&mut corpus, 4, "Paris 2", WitnessType::Manuscript);
    corpus.set_group(version, Some(work)).unwrap();
    corpus.set_group(ms1, Some(version)).unwrap();
    corpus.set_group(ms2, Some(version)).unwrap();
    (corpus, [work, version, ms1, ms2])
}

#[test]
fn test_upsert_by_external_id() {
    let mut corpus = Corpus::new();
    let created = corpus.upsert_repository(
        10,
        RepositoryDraft {
            name: "Bibliothèque nationale".to_string(),
            city: "Paris".to_string(),
        },
    );
    assert!(created.is_created());

    let updated = corpus.upsert_repository(
        10,
        RepositoryDraft {
            name: "BnF".to_string(),
            city: "Paris".to_string(),
        },
    );
    assert_eq!(updated, Upsert::Updated(created.id()));
    let repository = corpus.repository(created.id()).unwrap();
    assert_eq!(repository.name, "BnF");
    assert_eq!(repository.slug, "bnf");
    assert_eq!(corpus.count(EntityKind::Repository), 1);
}

#[test]
fn test_members_follow_insertion_order() {
    let (corpus, [work, version, ms1, ms2]) = hierarchy();
    let members: Vec<LocalId> = corpus.members(version).iter().map(|w| w.id).collect();
    assert_eq!(members, vec![ms1, ms2]);
    assert_eq!(corpus.members(work).len(), 1);
    assert!(corpus.members(ms1).is_empty());
}

#[test]
fn test_members_index_invalidated_on_regroup() {
    let (mut corpus, [_, version, ms1, _]) = hierarchy();
    assert_eq!(corpus.members(version).len(), 2);
    corpus.set_group(ms1, None).unwrap();
    assert_eq!(corpus.members(version).len(), 1);

    let extra = witness(&mut corpus, 5, "Paris 3", WitnessType::Manuscript);
    corpus.set_group(extra, Some(version)).unwrap();
    assert_eq!(corpus.members(version).len(), 2);
}

#[test]
fn test_set_group_rejects_cycles_and_level_skips() {
    let (mut corpus, [work, version, ms1, ms2]) = hierarchy();

    assert!(matches!(
        corpus.set_group(work, Some(work)),
        Err(StoreError::Cycle { .. })
    ));
    assert!(matches!(
        corpus.set_group(work, Some(ms1)),
        Err(StoreError::Cycle { .. })
    ));
    assert!(matches!(
        corpus.set_group(ms1, Some(work)),
        Err(StoreError::Hierarchy { .. })
    ));
    assert!(matches!(
        corpus.set_group(ms1, Some(ms2)),
        Err(StoreError::Hierarchy { .. })
    ));
    assert!(matches!(
        corpus.set_group(ms1, Some(999)),
        Err(StoreError::NotFound { .. })
    ));
    assert_eq!(corpus.witness(ms1).unwrap().group, Some(version));
}

#[test]
fn test_unique_slugs() {
    let mut corpus = Corpus::new();
    let a = witness(&mut corpus, 1, "Paris, BnF", WitnessType::Manuscript);
    let b = witness(&mut corpus, 2, "Paris BnF", WitnessType::Manuscript);
    let c = witness(&mut corpus, 3, "Paris - BnF", WitnessType::Manuscript);
    assert_eq!(corpus.witness(a).unwrap().slug, "paris-bnf");
    assert_eq!(corpus.witness(b).unwrap().slug, "paris-bnf-2");
    assert_eq!(corpus.witness(c).unwrap().slug, "paris-bnf-3");

    // Re-upserting keeps a witness's own slug.
    witness(&mut corpus, 2, "Paris BnF", WitnessType::Manuscript);
    assert_eq!(corpus.witness(b).unwrap().slug, "paris-bnf-2");
    assert_eq!(corpus.witness_by_slug("paris-bnf-3").unwrap().id, c);
}

#[test]
fn test_one_content_per_witness_and_kind() {
    let (mut corpus, [_, _, ms1, _]) = hierarchy();
    let first = content(&mut corpus, 100, ms1, "<p>a</p>");
    assert!(first.is_created());

    // A new external id for the same slot takes over the existing row.
    let second = content(&mut corpus, 101, ms1, "<p>b</p>");
    assert_eq!(second, Upsert::Updated(first.id()));
    assert_eq!(corpus.count(EntityKind::EncodedContent), 1);
    let row = corpus.content_for(ms1, "transcription").unwrap();
    assert_eq!(row.external_id, 101);
    assert_eq!(row.content, "<p>b</p>");
}

#[test]
fn test_upsert_content_requires_witness() {
    let mut corpus = Corpus::new();
    let result = corpus.upsert_content(
        1,
        ContentDraft {
            witness: 42,
            kind: "transcription".to_string(),
            status: None,
            content: String::new(),
        },
    );
    assert!(matches!(result, Err(StoreError::NotFound { id: 42, .. })));
}

#[test]
fn test_sweep_cascades_content_but_not_group_members() {
    let (mut corpus, [work, version, ms1, ms2]) = hierarchy();
    content(&mut corpus, 200, version, "<p>v</p>");
    content(&mut corpus, 201, ms1, "<p>m</p>");

    let keep: BTreeSet<ExternalId> = [1, 3, 4].into_iter().collect();
    assert_eq!(corpus.sweep(EntityKind::Witness, &keep), 1);

    assert!(corpus.witness(version).is_none());
    assert!(corpus.content_for(version, "transcription").is_none());
    assert!(corpus.content_for(ms1, "transcription").is_some());
    assert_eq!(corpus.witness(ms1).unwrap().group, None);
    assert_eq!(corpus.witness(ms2).unwrap().group, None);
    assert!(corpus.witness(work).is_some());
    assert!(corpus.members(work).is_empty());
}

#[test]
fn test_sweep_manuscript_clears_reference() {
    let mut corpus = Corpus::new();
    let ms = corpus
        .upsert_manuscript(
            7,
            ManuscriptDraft {
                repository: None,
                shelfmark: Some("lat. 1".to_string()),
            },
        )
        .id();
    let w = corpus
        .upsert_witness(
            8,
            WitnessDraft {
                name: "Copy".to_string(),
                kind: WitnessType::Manuscript,
                manuscript: Some(ms),
                locus: Some("1r-2v".to_string()),
            },
        )
        .id();
    assert_eq!(corpus.sweep(EntityKind::Manuscript, &BTreeSet::new()), 1);
    assert_eq!(corpus.witness(w).unwrap().manuscript, None);
}

#[test]
fn test_status_and_kind_get_or_create() {
    let mut corpus = Corpus::new();
    let draft = corpus.status_get_or_create("Draft");
    let reviewed = corpus.status_get_or_create("Reviewed");
    assert_eq!(corpus.status_get_or_create("draft"), draft);
    assert_eq!(corpus.status(reviewed).unwrap().sort_order, 2);

    assert_eq!(corpus.content_kind_get_or_create("Transcription"), "transcription");
    assert_eq!(corpus.content_kind_get_or_create("transcription"), "transcription");
    assert_eq!(corpus.content_kinds().count(), 1);
}

#[test]
fn test_clear_keeps_vocabulary() {
    let (mut corpus, _) = hierarchy();
    corpus.status_get_or_create("Draft");
    corpus.clear();
    assert_eq!(corpus.count(EntityKind::Witness), 0);
    assert_eq!(corpus.statuses().count(), 1);
}

#[test]
fn test_witness_type_levels() {
    assert_eq!(WitnessType::Manuscript.group_type(), Some(WitnessType::Version));
    assert_eq!(WitnessType::Work.group_type(), None);
    assert_eq!("Manuscript".parse::<WitnessType>(), Ok(WitnessType::Manuscript));
    assert!("chapter".parse::<WitnessType>().is_err());
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let store = CorpusStore::in_memory();
    store
        .transaction(|corpus| {
            witness(corpus, 1, "Kept", WitnessType::Work);
            Ok::<_, StoreError>(())
        })
        .unwrap();

    let result: Result<(), StoreError> = store.transaction(|corpus| {
        witness(corpus, 2, "Dropped", WitnessType::Work);
        Err(StoreError::NotFound {
            entity: "witness",
            id: 0,
        })
    });
    assert!(result.is_err());
    assert_eq!(store.read(|corpus| corpus.count(EntityKind::Witness)), 1);
}

#[test]
fn test_snapshot_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("corpus.json");
    {
        let store = CorpusStore::open(&path).unwrap();
        store
            .transaction(|corpus| {
                let (built, _) = hierarchy();
                *corpus = built;
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }
    assert!(path.exists());

    let reopened = CorpusStore::open(&path).unwrap();
    reopened.read(|corpus| {
        let version = corpus.witness_by_external_id(2).unwrap();
        assert_eq!(corpus.members(version.id).len(), 2);
        assert_eq!(corpus.count(EntityKind::Witness), 4);
    });
}

#[test]
fn test_config_defaults_and_partial_json() {
    let config = CorpusConfig::default();
    assert_eq!(config.excluded_sigla, vec!["HM1", "HM2"]);
    assert_eq!(config.absent_members, AbsentMembers::Skip);

    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"member_order": "short_name", "excluded_sigla": []}"#).unwrap();
    let loaded = CorpusConfig::load(&path).unwrap();
    assert_eq!(loaded.member_order, MemberOrder::ShortName);
    assert!(loaded.excluded_sigla.is_empty());
    assert_eq!(loaded.default_content_kind, "transcription");
    assert_eq!(loaded.absent_members, AbsentMembers::Skip);

    std::fs::write(&path, r#"{"absent_members": "sentinel_column"}"#).unwrap();
    let loaded = CorpusConfig::load(&path).unwrap();
    assert_eq!(loaded.absent_members, AbsentMembers::SentinelColumn);
}
