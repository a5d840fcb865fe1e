//! Shape of the upstream export.
//!
//! ```text
//! results[]
//!   ├─ str, content, status { str }
//!   └─ text_content { id, type }
//!        └─ item_part { id, str, type, locus, group__id, group_locus }
//!             └─ current_item { id, shelfmark }
//!                  └─ repository { id, str, place }
//! ```
//!
//! Only these field names matter; unknown fields are ignored and every leaf
//! is optional so one incomplete record never rejects the whole batch.

use std::path::Path;

use collatio_storage::{slugify, ExternalId, WitnessType};
use serde::Deserialize;

use crate::ImportError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub results: Vec<ExternalRecord>,
}

impl Batch {
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalRecord {
    #[serde(default, rename = "str")]
    pub label: Option<String>,
    #[serde(default)]
    pub status: Option<StatusRecord>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text_content: Option<TextContentRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusRecord {
    #[serde(default, rename = "str")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContentRecord {
    pub id: ExternalId,
    /// Content kind name, e.g. `Transcription`.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub item_part: Option<ItemPartRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemPartRecord {
    pub id: ExternalId,
    #[serde(default, rename = "str")]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub locus: Option<String>,
    #[serde(default, rename = "group__id", alias = "group_id")]
    pub group_id: Option<ExternalId>,
    /// Siglum of this item part within its group.
    #[serde(default)]
    pub group_locus: Option<String>,
    #[serde(default)]
    pub current_item: Option<CurrentItemRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentItemRecord {
    pub id: ExternalId,
    #[serde(default)]
    pub shelfmark: Option<String>,
    #[serde(default)]
    pub repository: Option<RepositoryRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryRecord {
    pub id: ExternalId,
    #[serde(default, rename = "str")]
    pub name: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
}

/// Classification of a record by its item part type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Recognized(WitnessType),
    /// Missing or unknown type; carries the raw value when there was one.
    Unrecognized(Option<String>),
}

impl ItemPartRecord {
    pub fn classify(&self) -> RecordKind {
        match self.kind.as_deref() {
            None => RecordKind::Unrecognized(None),
            Some(raw) => match raw.parse::<WitnessType>() {
                Ok(kind) => RecordKind::Recognized(kind),
                Err(_) => RecordKind::Unrecognized(Some(slugify(raw))),
            },
        }
    }

    /// Siglum from `group_locus`, `None` when blank.
    pub fn siglum(&self) -> Option<String> {
        self.group_locus
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Joins the non-empty parts with `", "`.
pub(crate) fn display_name<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
