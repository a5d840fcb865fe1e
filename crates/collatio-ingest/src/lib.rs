//! Collatio Import
//!
//! Brings an upstream export into the corpus:
//!
//! - [`record`]: serde shapes of the export and record classification
//! - [`normalize`]: region and sentence id assignment on the imported markup
//! - [`sync`]: the create-update-delete merge keyed by external id

pub mod normalize;
pub mod record;
pub mod sync;

use collatio_storage::{ExternalId, StoreError};
use thiserror::Error;

pub use normalize::normalize;
pub use record::{Batch, ExternalRecord, RecordKind};
pub use sync::{delete_all, import_batch, import_records, Summary};

/// Failures that abort an import and roll it back.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid import file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Record-level problems. The record (or its link) is skipped and the
/// import carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportWarning {
    #[error("record #{index} has no {missing}; skipped")]
    IncompleteRecord { index: usize, missing: &'static str },

    #[error("item part {item_part} has unrecognized type {raw:?}; skipped")]
    UnrecognizedType {
        item_part: ExternalId,
        raw: Option<String>,
    },

    #[error("item part {item_part} refers to group {group}, which is not in the batch")]
    MissingReference { item_part: ExternalId, group: ExternalId },

    #[error("item part {item_part} cannot be linked: {reason}")]
    RejectedLink { item_part: ExternalId, reason: String },

    #[error("text content {text_content} could not be normalized: {message}")]
    UnparsableMarkup {
        text_content: ExternalId,
        message: String,
    },
}
