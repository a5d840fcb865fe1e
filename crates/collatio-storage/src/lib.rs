//! Collatio Corpus Storage
//!
//! Holds the witness hierarchy and the markup renditions attached to it:
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐
//! │  Repository  │◄─────│  Manuscript  │
//! └──────────────┘      └──────▲───────┘
//!                              │ manuscript + locus
//!        group (weak)   ┌──────┴───────┐  owns   ┌─────────────────┐
//!   work ◄── version ◄──│   Witness    │────────►│ EncodedContent  │
//!                       └──────────────┘         │ (one per kind)  │
//!                                                └─────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Keyed by external id**: every entity is created or refreshed by the
//!   importer using the upstream source's identifier
//! - **Acyclic hierarchy**: `group` is a back reference one level up; cycles
//!   and level skips are rejected
//! - **Transactional**: [`CorpusStore::transaction`] applies all-or-nothing
//!   and persists a JSON snapshot on commit

pub mod corpus;
pub mod error;
pub mod persistence;
pub mod slug;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use collatio_markup::RegionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub use corpus::Corpus;
pub use error::StoreError;
pub use persistence::CorpusStore;
pub use slug::slugify;

// ============================================================================
// Core Types
// ============================================================================

/// Identifier assigned by this store. Ids grow monotonically, so ordering by
/// id is insertion order.
pub type LocalId = u64;

/// Identifier from the upstream source system; the merge key on import.
pub type ExternalId = i64;

/// Abstraction level of a witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WitnessType {
    Manuscript,
    Version,
    Work,
}

impl WitnessType {
    pub const ALL: [WitnessType; 3] = [
        WitnessType::Manuscript,
        WitnessType::Version,
        WitnessType::Work,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WitnessType::Manuscript => "manuscript",
            WitnessType::Version => "version",
            WitnessType::Work => "work",
        }
    }

    /// Type of the witness one level up the hierarchy.
    pub fn group_type(self) -> Option<WitnessType> {
        match self {
            WitnessType::Manuscript => Some(WitnessType::Version),
            WitnessType::Version => Some(WitnessType::Work),
            WitnessType::Work => None,
        }
    }

    /// Region kind a witness of this type contributes when collated as a
    /// member of its group: manuscripts vary at version level, versions at
    /// work level.
    pub fn member_region_kind(self) -> Option<RegionKind> {
        match self {
            WitnessType::Manuscript => Some(RegionKind::Version),
            WitnessType::Version => Some(RegionKind::Work),
            WitnessType::Work => None,
        }
    }

    /// Region kind anchoring the collation of this witness's members.
    pub fn grouping_region_kind(self) -> Option<RegionKind> {
        match self {
            WitnessType::Manuscript => None,
            WitnessType::Version => Some(RegionKind::Version),
            WitnessType::Work => Some(RegionKind::Work),
        }
    }
}

impl fmt::Display for WitnessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WitnessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match slugify(s).as_str() {
            "manuscript" => Ok(WitnessType::Manuscript),
            "version" => Ok(WitnessType::Version),
            "work" => Ok(WitnessType::Work),
            other => Err(format!("unknown witness type '{other}'")),
        }
    }
}

/// Physical holding institution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: LocalId,
    pub external_id: ExternalId,
    pub name: String,
    pub city: String,
    pub slug: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manuscript {
    pub id: LocalId,
    pub external_id: ExternalId,
    pub repository: Option<LocalId>,
    pub shelfmark: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// A text at some level of abstraction (manuscript copy, version, work).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Witness {
    pub id: LocalId,
    pub external_id: ExternalId,
    pub name: String,
    /// Siglum.
    pub short_name: Option<String>,
    pub slug: String,
    pub kind: WitnessType,
    pub manuscript: Option<LocalId>,
    pub locus: Option<String>,
    /// Parent witness one level up. Never an ownership edge.
    pub group: Option<LocalId>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl Witness {
    /// Siglum when known, name otherwise.
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }

    pub fn siglum(&self) -> &str {
        self.short_name.as_deref().unwrap_or("")
    }
}

/// Workflow stage of an encoded rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStatus {
    pub id: LocalId,
    pub slug: String,
    pub name: String,
    /// Position of this status in the editorial workflow.
    pub sort_order: i32,
}

/// One markup rendition of a witness for a content kind
/// (`transcription`, `translation`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedContent {
    pub id: LocalId,
    pub external_id: ExternalId,
    pub witness: LocalId,
    /// Slug of the content kind.
    pub kind: String,
    pub status: Option<LocalId>,
    pub content: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

/// Entity tables swept by external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Repository,
    Manuscript,
    Witness,
    EncodedContent,
}

impl EntityKind {
    /// Children before parents.
    pub const SWEEP_ORDER: [EntityKind; 4] = [
        EntityKind::EncodedContent,
        EntityKind::Witness,
        EntityKind::Manuscript,
        EntityKind::Repository,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Repository => "repository",
            EntityKind::Manuscript => "manuscript",
            EntityKind::Witness => "witness",
            EntityKind::EncodedContent => "encoded_content",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Upsert inputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDraft {
    pub name: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManuscriptDraft {
    pub repository: Option<LocalId>,
    pub shelfmark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessDraft {
    pub name: String,
    pub kind: WitnessType,
    pub manuscript: Option<LocalId>,
    pub locus: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDraft {
    pub witness: LocalId,
    pub kind: String,
    pub status: Option<LocalId>,
    pub content: String,
}

/// Outcome of an update-or-create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Created(LocalId),
    Updated(LocalId),
}

impl Upsert {
    pub fn id(self) -> LocalId {
        match self {
            Upsert::Created(id) | Upsert::Updated(id) => id,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, Upsert::Created(_))
    }
}

// ============================================================================
// Store abstraction
// ============================================================================

/// CRUD by external id over the corpus entities.
///
/// Deleting a witness deletes its encoded content; it never deletes the
/// witnesses that reference it through `group` (their link is cleared).
pub trait Store {
    fn repository(&self, id: LocalId) -> Option<&Repository>;
    fn manuscript(&self, id: LocalId) -> Option<&Manuscript>;
    fn witness(&self, id: LocalId) -> Option<&Witness>;
    fn witness_by_external_id(&self, external_id: ExternalId) -> Option<&Witness>;
    fn witness_by_slug(&self, slug: &str) -> Option<&Witness>;
    /// All witnesses in insertion order.
    fn witnesses(&self) -> Vec<&Witness>;
    /// Witnesses whose `group` is `id`, in insertion order.
    fn members(&self, id: LocalId) -> Vec<&Witness>;
    fn content(&self, id: LocalId) -> Option<&EncodedContent>;
    fn content_for(&self, witness: LocalId, kind: &str) -> Option<&EncodedContent>;
    fn contents(&self) -> Vec<&EncodedContent>;
    fn status(&self, id: LocalId) -> Option<&ContentStatus>;
    fn external_ids(&self, entity: EntityKind) -> BTreeSet<ExternalId>;
    fn count(&self, entity: EntityKind) -> usize;

    fn upsert_repository(&mut self, external_id: ExternalId, draft: RepositoryDraft) -> Upsert;
    fn upsert_manuscript(&mut self, external_id: ExternalId, draft: ManuscriptDraft) -> Upsert;
    fn upsert_witness(&mut self, external_id: ExternalId, draft: WitnessDraft) -> Upsert;
    fn upsert_content(
        &mut self,
        external_id: ExternalId,
        draft: ContentDraft,
    ) -> Result<Upsert, StoreError>;

    /// Sets or clears the parent of `witness`, rejecting cycles and links
    /// that do not go exactly one level up.
    fn set_group(&mut self, witness: LocalId, group: Option<LocalId>) -> Result<(), StoreError>;
    fn set_short_name(
        &mut self,
        witness: LocalId,
        short_name: Option<String>,
    ) -> Result<(), StoreError>;
    fn set_content_markup(&mut self, content: LocalId, markup: String) -> Result<(), StoreError>;

    fn status_get_or_create(&mut self, name: &str) -> LocalId;
    fn content_kind_get_or_create(&mut self, name: &str) -> String;

    /// Deletes every `entity` row whose external id is not in `keep`.
    /// Returns the number of rows deleted.
    fn sweep(&mut self, entity: EntityKind, keep: &BTreeSet<ExternalId>) -> usize;
    fn clear(&mut self);
}

// ============================================================================
// Configuration
// ============================================================================

/// Order in which a grouping witness's members become matrix columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberOrder {
    /// Persisted insertion order.
    #[default]
    Insertion,
    ShortName,
}

/// Treatment of members with no content of the requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentMembers {
    /// Drop the member from the collation; no column is reserved for it.
    #[default]
    Skip,
    /// Keep the member's column, filled with absent readings.
    SentinelColumn,
}

/// Configuration for the corpus and its query surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// JSON snapshot of the corpus
    pub store_path: PathBuf,
    /// Reserved comparison witnesses left out of collations and listings
    pub excluded_sigla: Vec<String>,
    /// Content kind used when a caller names none
    pub default_content_kind: String,
    pub member_order: MemberOrder,
    pub absent_members: AbsentMembers,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("./corpus.json"),
            excluded_sigla: vec!["HM1".to_string(), "HM2".to_string()],
            default_content_kind: "transcription".to_string(),
            member_order: MemberOrder::Insertion,
            absent_members: AbsentMembers::Skip,
        }
    }
}

impl CorpusConfig {
    /// Load from a JSON file; missing keys fall back to defaults.
    pub fn load(path: &std::path::Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn is_excluded(&self, witness: &Witness) -> bool {
        witness
            .short_name
            .as_ref()
            .map_or(false, |siglum| self.excluded_sigla.iter().any(|s| s == siglum))
    }
}
