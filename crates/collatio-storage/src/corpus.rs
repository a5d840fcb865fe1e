//! In-memory corpus tables.
//!
//! Rows live in `BTreeMap`s keyed by local id. Ids come from one counter
//! shared by every table, so iterating a table yields insertion order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::slug::slugify;
use crate::{
    ContentDraft, ContentStatus, EncodedContent, EntityKind, ExternalId, LocalId, Manuscript,
    ManuscriptDraft, Repository, RepositoryDraft, Store, StoreError, Upsert, Witness, WitnessDraft,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corpus {
    next_id: LocalId,
    repositories: BTreeMap<LocalId, Repository>,
    manuscripts: BTreeMap<LocalId, Manuscript>,
    witnesses: BTreeMap<LocalId, Witness>,
    contents: BTreeMap<LocalId, EncodedContent>,
    statuses: BTreeMap<LocalId, ContentStatus>,
    /// Content kind slug -> display name.
    content_kinds: BTreeMap<String, String>,
    /// group id -> member ids, rebuilt on first use after a hierarchy write.
    #[serde(skip)]
    members_index: OnceLock<BTreeMap<LocalId, Vec<LocalId>>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> LocalId {
        self.next_id += 1;
        self.next_id
    }

    fn invalidate_members(&mut self) {
        self.members_index.take();
    }

    fn build_members_index(&self) -> BTreeMap<LocalId, Vec<LocalId>> {
        let mut index: BTreeMap<LocalId, Vec<LocalId>> = BTreeMap::new();
        for witness in self.witnesses.values() {
            if let Some(group) = witness.group {
                index.entry(group).or_default().push(witness.id);
            }
        }
        index
    }

    pub fn statuses(&self) -> impl Iterator<Item = &ContentStatus> {
        self.statuses.values()
    }

    pub fn content_kinds(&self) -> impl Iterator<Item = (&str, &str)> {
        self.content_kinds
            .iter()
            .map(|(slug, name)| (slug.as_str(), name.as_str()))
    }

    /// Chain of groups above `witness`, nearest first.
    pub fn ancestors(&self, witness: LocalId) -> Vec<LocalId> {
        let mut chain = Vec::new();
        let mut current = self.witnesses.get(&witness).and_then(|w| w.group);
        while let Some(id) = current {
            if chain.contains(&id) || chain.len() > self.witnesses.len() {
                break;
            }
            chain.push(id);
            current = self.witnesses.get(&id).and_then(|w| w.group);
        }
        chain
    }

    fn unique_witness_slug(&self, name: &str, except: Option<LocalId>) -> String {
        let base = match slugify(name) {
            slug if slug.is_empty() => "witness".to_string(),
            slug => slug,
        };
        let taken = |candidate: &str| {
            self.witnesses
                .values()
                .any(|w| Some(w.id) != except && w.slug == candidate)
        };
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }

    fn remove_witness(&mut self, id: LocalId) {
        self.contents.retain(|_, content| content.witness != id);
        for witness in self.witnesses.values_mut() {
            if witness.group == Some(id) {
                witness.group = None;
            }
        }
        self.witnesses.remove(&id);
        self.invalidate_members();
    }

    fn remove_manuscript(&mut self, id: LocalId) {
        for witness in self.witnesses.values_mut() {
            if witness.manuscript == Some(id) {
                witness.manuscript = None;
            }
        }
        self.manuscripts.remove(&id);
    }

    fn remove_repository(&mut self, id: LocalId) {
        for manuscript in self.manuscripts.values_mut() {
            if manuscript.repository == Some(id) {
                manuscript.repository = None;
            }
        }
        self.repositories.remove(&id);
    }

    fn witness_mut(&mut self, id: LocalId) -> Result<&mut Witness, StoreError> {
        self.witnesses.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "witness",
            id,
        })
    }
}

impl Store for Corpus {
    fn repository(&self, id: LocalId) -> Option<&Repository> {
        self.repositories.get(&id)
    }

    fn manuscript(&self, id: LocalId) -> Option<&Manuscript> {
        self.manuscripts.get(&id)
    }

    fn witness(&self, id: LocalId) -> Option<&Witness> {
        self.witnesses.get(&id)
    }

    fn witness_by_external_id(&self, external_id: ExternalId) -> Option<&Witness> {
        self.witnesses
            .values()
            .find(|w| w.external_id == external_id)
    }

    fn witness_by_slug(&self, slug: &str) -> Option<&Witness> {
        self.witnesses.values().find(|w| w.slug == slug)
    }

    fn witnesses(&self) -> Vec<&Witness> {
        self.witnesses.values().collect()
    }

    fn members(&self, id: LocalId) -> Vec<&Witness> {
        let index = self.members_index.get_or_init(|| self.build_members_index());
        index
            .get(&id)
            .map(|ids| ids.iter().filter_map(|m| self.witnesses.get(m)).collect())
            .unwrap_or_default()
    }

    fn content(&self, id: LocalId) -> Option<&EncodedContent> {
        self.contents.get(&id)
    }

    fn content_for(&self, witness: LocalId, kind: &str) -> Option<&EncodedContent> {
        self.contents
            .values()
            .find(|c| c.witness == witness && c.kind == kind)
    }

    fn contents(&self) -> Vec<&EncodedContent> {
        self.contents.values().collect()
    }

    fn status(&self, id: LocalId) -> Option<&ContentStatus> {
        self.statuses.get(&id)
    }

    fn external_ids(&self, entity: EntityKind) -> BTreeSet<ExternalId> {
        match entity {
            EntityKind::Repository => self.repositories.values().map(|r| r.external_id).collect(),
            EntityKind::Manuscript => self.manuscripts.values().map(|m| m.external_id).collect(),
            EntityKind::Witness => self.witnesses.values().map(|w| w.external_id).collect(),
            EntityKind::EncodedContent => self.contents.values().map(|c| c.external_id).collect(),
        }
    }

    fn count(&self, entity: EntityKind) -> usize {
        match entity {
            EntityKind::Repository => self.repositories.len(),
            EntityKind::Manuscript => self.manuscripts.len(),
            EntityKind::Witness => self.witnesses.len(),
            EntityKind::EncodedContent => self.contents.len(),
        }
    }

    fn upsert_repository(&mut self, external_id: ExternalId, draft: RepositoryDraft) -> Upsert {
        let now = Utc::now();
        let slug = slugify(&draft.name);
        if let Some(existing) = self
            .repositories
            .values_mut()
            .find(|r| r.external_id == external_id)
        {
            existing.name = draft.name;
            existing.city = draft.city;
            existing.slug = slug;
            existing.modified = now;
            return Upsert::Updated(existing.id);
        }
        let id = self.allocate();
        self.repositories.insert(
            id,
            Repository {
                id,
                external_id,
                name: draft.name,
                city: draft.city,
                slug,
                created: now,
                modified: now,
            },
        );
        Upsert::Created(id)
    }

    fn upsert_manuscript(&mut self, external_id: ExternalId, draft: ManuscriptDraft) -> Upsert {
        let now = Utc::now();
        if let Some(existing) = self
            .manuscripts
            .values_mut()
            .find(|m| m.external_id == external_id)
        {
            existing.repository = draft.repository;
            existing.shelfmark = draft.shelfmark;
            existing.modified = now;
            return Upsert::Updated(existing.id);
        }
        let id = self.allocate();
        self.manuscripts.insert(
            id,
            Manuscript {
                id,
                external_id,
                repository: draft.repository,
                shelfmark: draft.shelfmark,
                created: now,
                modified: now,
            },
        );
        Upsert::Created(id)
    }

    fn upsert_witness(&mut self, external_id: ExternalId, draft: WitnessDraft) -> Upsert {
        let now = Utc::now();
        let existing = self.witness_by_external_id(external_id).map(|w| w.id);
        let slug = self.unique_witness_slug(&draft.name, existing);
        self.invalidate_members();

        if let Some(witness) = existing.and_then(|id| self.witnesses.get_mut(&id)) {
            witness.name = draft.name;
            witness.slug = slug;
            witness.kind = draft.kind;
            witness.manuscript = draft.manuscript;
            witness.locus = draft.locus;
            witness.modified = now;
            return Upsert::Updated(witness.id);
        }

        let id = self.allocate();
        self.witnesses.insert(
            id,
            Witness {
                id,
                external_id,
                name: draft.name,
                short_name: None,
                slug,
                kind: draft.kind,
                manuscript: draft.manuscript,
                locus: draft.locus,
                group: None,
                created: now,
                modified: now,
            },
        );
        Upsert::Created(id)
    }

    fn upsert_content(
        &mut self,
        external_id: ExternalId,
        draft: ContentDraft,
    ) -> Result<Upsert, StoreError> {
        if !self.witnesses.contains_key(&draft.witness) {
            return Err(StoreError::NotFound {
                entity: "witness",
                id: draft.witness,
            });
        }
        let now = Utc::now();
        let by_external = self
            .contents
            .values()
            .find(|c| c.external_id == external_id)
            .map(|c| c.id);
        let by_slot = self.content_for(draft.witness, &draft.kind).map(|c| c.id);

        let target = match (by_external, by_slot) {
            (Some(own), Some(other)) if own != other => {
                // One rendition per (witness, kind): the record being
                // written wins over the row already holding the slot.
                tracing::debug!(content = other, "replacing content for the same witness and kind");
                self.contents.remove(&other);
                Some(own)
            }
            (Some(own), _) => Some(own),
            (None, Some(other)) => {
                tracing::debug!(
                    content = other,
                    external_id,
                    "content taken over by a new external id"
                );
                Some(other)
            }
            (None, None) => None,
        };

        if let Some(content) = target.and_then(|id| self.contents.get_mut(&id)) {
            content.external_id = external_id;
            content.witness = draft.witness;
            content.kind = draft.kind;
            content.status = draft.status;
            content.content = draft.content;
            content.modified = now;
            return Ok(Upsert::Updated(content.id));
        }

        let id = self.allocate();
        self.contents.insert(
            id,
            EncodedContent {
                id,
                external_id,
                witness: draft.witness,
                kind: draft.kind,
                status: draft.status,
                content: draft.content,
                created: now,
                modified: now,
            },
        );
        Ok(Upsert::Created(id))
    }

    fn set_group(&mut self, witness: LocalId, group: Option<LocalId>) -> Result<(), StoreError> {
        let kind = self.witness_mut(witness)?.kind;

        if let Some(group_id) = group {
            let group_kind = self
                .witnesses
                .get(&group_id)
                .map(|g| g.kind)
                .ok_or(StoreError::NotFound {
                    entity: "witness",
                    id: group_id,
                })?;
            if group_id == witness || self.ancestors(group_id).contains(&witness) {
                return Err(StoreError::Cycle {
                    witness,
                    group: group_id,
                });
            }
            if kind.group_type() != Some(group_kind) {
                return Err(StoreError::Hierarchy {
                    witness,
                    kind,
                    group: group_id,
                    group_kind,
                });
            }
        }

        let record = self.witness_mut(witness)?;
        if record.group != group {
            record.group = group;
            record.modified = Utc::now();
            self.invalidate_members();
        }
        Ok(())
    }

    fn set_short_name(
        &mut self,
        witness: LocalId,
        short_name: Option<String>,
    ) -> Result<(), StoreError> {
        let record = self.witness_mut(witness)?;
        if record.short_name != short_name {
            record.short_name = short_name;
            record.modified = Utc::now();
        }
        Ok(())
    }

    fn set_content_markup(&mut self, content: LocalId, markup: String) -> Result<(), StoreError> {
        let record = self
            .contents
            .get_mut(&content)
            .ok_or(StoreError::NotFound {
                entity: "encoded content",
                id: content,
            })?;
        if record.content != markup {
            record.content = markup;
            record.modified = Utc::now();
        }
        Ok(())
    }

    fn status_get_or_create(&mut self, name: &str) -> LocalId {
        let slug = slugify(name);
        if let Some(status) = self.statuses.values().find(|s| s.slug == slug) {
            return status.id;
        }
        let id = self.allocate();
        let sort_order = i32::try_from(self.statuses.len() + 1).unwrap_or(i32::MAX);
        self.statuses.insert(
            id,
            ContentStatus {
                id,
                slug,
                name: name.trim().to_string(),
                sort_order,
            },
        );
        id
    }

    fn content_kind_get_or_create(&mut self, name: &str) -> String {
        let slug = slugify(name);
        self.content_kinds
            .entry(slug.clone())
            .or_insert_with(|| name.trim().to_string());
        slug
    }

    fn sweep(&mut self, entity: EntityKind, keep: &BTreeSet<ExternalId>) -> usize {
        let stale: Vec<LocalId> = match entity {
            EntityKind::Repository => self
                .repositories
                .values()
                .filter(|r| !keep.contains(&r.external_id))
                .map(|r| r.id)
                .collect(),
            EntityKind::Manuscript => self
                .manuscripts
                .values()
                .filter(|m| !keep.contains(&m.external_id))
                .map(|m| m.id)
                .collect(),
            EntityKind::Witness => self
                .witnesses
                .values()
                .filter(|w| !keep.contains(&w.external_id))
                .map(|w| w.id)
                .collect(),
            EntityKind::EncodedContent => self
                .contents
                .values()
                .filter(|c| !keep.contains(&c.external_id))
                .map(|c| c.id)
                .collect(),
        };

        for &id in &stale {
            match entity {
                EntityKind::Repository => self.remove_repository(id),
                EntityKind::Manuscript => self.remove_manuscript(id),
                EntityKind::Witness => self.remove_witness(id),
                EntityKind::EncodedContent => {
                    self.contents.remove(&id);
                }
            }
        }
        stale.len()
    }

    /// Removes every repository, manuscript, witness and content. Statuses and
    /// content kinds are vocabulary and stay.
    fn clear(&mut self) {
        self.repositories.clear();
        self.manuscripts.clear();
        self.witnesses.clear();
        self.contents.clear();
        self.invalidate_members();
    }
}
