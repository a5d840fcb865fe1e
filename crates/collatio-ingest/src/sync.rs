//! Import synchronizer.
//!
//! ```text
//!  Phase 1  records ──► Repository ─► Manuscript ─► Witness ─► EncodedContent
//!           (touched external ids collected per entity kind)
//!  Phase 2  records ──► Witness.group / Witness.short_name
//!  Phase 3  sweep every entity kind down to the touched ids
//! ```
//!
//! All three phases run in one store transaction.

use std::collections::{BTreeMap, BTreeSet};

use collatio_storage::{
    ContentDraft, CorpusConfig, CorpusStore, EntityKind, ExternalId, LocalId, ManuscriptDraft,
    RepositoryDraft, Store, StoreError, Upsert, WitnessDraft, WitnessType,
};

use crate::normalize::normalize;
use crate::record::{display_name, Batch, ExternalRecord, ItemPartRecord, RecordKind};
use crate::{ImportError, ImportWarning};

/// Counts of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub deleted_by_kind: BTreeMap<EntityKind, usize>,
    pub warnings: Vec<ImportWarning>,
}

impl Summary {
    fn count(&mut self, upsert: Upsert) -> LocalId {
        if upsert.is_created() {
            self.created += 1;
        } else {
            self.updated += 1;
        }
        upsert.id()
    }

    fn warn(&mut self, warning: ImportWarning) {
        tracing::warn!(%warning, "import warning");
        self.warnings.push(warning);
    }
}

/// Imports `batch` into `store` atomically.
pub fn import_batch(
    store: &CorpusStore,
    batch: &Batch,
    config: &CorpusConfig,
) -> Result<Summary, ImportError> {
    let summary = store.transaction(|corpus| import_records(corpus, &batch.results, config))?;
    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        skipped = summary.skipped,
        warnings = summary.warnings.len(),
        "import finished"
    );
    Ok(summary)
}

/// Runs the three import phases against any store. Callers own atomicity.
pub fn import_records<S: Store>(
    store: &mut S,
    records: &[ExternalRecord],
    config: &CorpusConfig,
) -> Result<Summary, ImportError> {
    let mut summary = Summary::default();
    let mut touched: BTreeMap<EntityKind, BTreeSet<ExternalId>> = EntityKind::SWEEP_ORDER
        .iter()
        .map(|&kind| (kind, BTreeSet::new()))
        .collect();
    let mut witnesses_by_item_part: BTreeMap<ExternalId, LocalId> = BTreeMap::new();

    // Phase 1: entities
    for (index, record) in records.iter().enumerate() {
        let Some((text_content, item_part)) = record
            .text_content
            .as_ref()
            .and_then(|tc| tc.item_part.as_ref().map(|ip| (tc, ip)))
        else {
            summary.skipped += 1;
            summary.warn(ImportWarning::IncompleteRecord {
                index,
                missing: "text_content.item_part",
            });
            continue;
        };

        let kind = match item_part.classify() {
            RecordKind::Recognized(kind) => kind,
            RecordKind::Unrecognized(raw) => {
                summary.skipped += 1;
                summary.warn(ImportWarning::UnrecognizedType {
                    item_part: item_part.id,
                    raw,
                });
                continue;
            }
        };
        tracing::debug!(
            record = record.label.as_deref().unwrap_or(""),
            item_part = item_part.id,
            kind = %kind,
            "importing record"
        );

        let witness = upsert_witness(store, &mut summary, &mut touched, item_part, kind);
        witnesses_by_item_part.insert(item_part.id, witness);

        let status = record
            .status
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .map(|name| store.status_get_or_create(name));
        let content_kind = store.content_kind_get_or_create(
            text_content
                .kind
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .unwrap_or(&config.default_content_kind),
        );
        let raw = record.content.as_deref().unwrap_or("");
        let content = match normalize(raw) {
            Ok(content) => content,
            Err(err) => {
                summary.warn(ImportWarning::UnparsableMarkup {
                    text_content: text_content.id,
                    message: err.to_string(),
                });
                crate::normalize::collapse_nbsp(raw)
            }
        };
        let upsert = store.upsert_content(
            text_content.id,
            ContentDraft {
                witness,
                kind: content_kind,
                status,
                content,
            },
        )?;
        summary.count(upsert);
        touched_ids(&mut touched, EntityKind::EncodedContent).insert(text_content.id);
    }

    // Phase 2: hierarchy, once every witness of the batch exists
    for record in records {
        let Some(item_part) = record
            .text_content
            .as_ref()
            .and_then(|tc| tc.item_part.as_ref())
        else {
            continue;
        };
        let Some(&witness) = witnesses_by_item_part.get(&item_part.id) else {
            continue;
        };

        store.set_short_name(witness, item_part.siglum())?;

        let group = match item_part.group_id {
            None => None,
            Some(group_id) => match witnesses_by_item_part.get(&group_id) {
                Some(&group) => Some(group),
                None => {
                    summary.warn(ImportWarning::MissingReference {
                        item_part: item_part.id,
                        group: group_id,
                    });
                    continue;
                }
            },
        };
        match store.set_group(witness, group) {
            Ok(()) => {}
            Err(err @ (StoreError::Cycle { .. } | StoreError::Hierarchy { .. })) => {
                summary.warn(ImportWarning::RejectedLink {
                    item_part: item_part.id,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }
    }

    // Phase 3: orphan sweep, children first
    for kind in EntityKind::SWEEP_ORDER {
        let keep = touched_ids(&mut touched, kind);
        let deleted = store.sweep(kind, keep);
        if deleted > 0 {
            tracing::info!(entity = %kind, deleted, "removed records absent from the batch");
        }
        summary.deleted += deleted;
        summary.deleted_by_kind.insert(kind, deleted);
    }

    Ok(summary)
}

fn touched_ids(
    touched: &mut BTreeMap<EntityKind, BTreeSet<ExternalId>>,
    kind: EntityKind,
) -> &mut BTreeSet<ExternalId> {
    touched.entry(kind).or_default()
}

fn upsert_witness<S: Store>(
    store: &mut S,
    summary: &mut Summary,
    touched: &mut BTreeMap<EntityKind, BTreeSet<ExternalId>>,
    item_part: &ItemPartRecord,
    kind: WitnessType,
) -> LocalId {
    let draft = if kind == WitnessType::Manuscript {
        let current_item = item_part.current_item.as_ref();
        let repository_record = current_item.and_then(|ci| ci.repository.as_ref());

        let repository = repository_record.map(|repo| {
            touched_ids(touched, EntityKind::Repository).insert(repo.id);
            summary.count(store.upsert_repository(
                repo.id,
                RepositoryDraft {
                    name: repo.name.clone().unwrap_or_default(),
                    city: repo.place.clone().unwrap_or_default(),
                },
            ))
        });
        let manuscript = current_item.map(|ci| {
            touched_ids(touched, EntityKind::Manuscript).insert(ci.id);
            summary.count(store.upsert_manuscript(
                ci.id,
                ManuscriptDraft {
                    repository,
                    shelfmark: ci.shelfmark.clone(),
                },
            ))
        });

        let mut name = display_name([
            repository_record.and_then(|r| r.name.as_deref()),
            current_item.and_then(|ci| ci.shelfmark.as_deref()),
            item_part.locus.as_deref(),
        ]);
        if name.is_empty() {
            name = fallback_name(item_part, kind);
        }
        WitnessDraft {
            name,
            kind,
            manuscript,
            locus: item_part.locus.clone(),
        }
    } else {
        WitnessDraft {
            name: item_part
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| fallback_name(item_part, kind)),
            kind,
            manuscript: None,
            locus: None,
        }
    };

    touched_ids(touched, EntityKind::Witness).insert(item_part.id);
    summary.count(store.upsert_witness(item_part.id, draft))
}

fn fallback_name(item_part: &ItemPartRecord, kind: WitnessType) -> String {
    format!("{kind} {}", item_part.id)
}

/// Removes every repository, manuscript, witness and content in one
/// transaction. Returns how many entities were removed.
pub fn delete_all(store: &CorpusStore) -> Result<usize, StoreError> {
    let removed = store.transaction(|corpus| {
        let total = EntityKind::SWEEP_ORDER
            .iter()
            .map(|&kind| corpus.count(kind))
            .sum::<usize>();
        corpus.clear();
        Ok::<_, StoreError>(total)
    })?;
    tracing::info!(removed, "corpus cleared");
    Ok(removed)
}
