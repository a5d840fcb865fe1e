use thiserror::Error;

use crate::{LocalId, WitnessType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: LocalId },

    #[error("grouping witness {witness} under {group} would create a cycle")]
    Cycle { witness: LocalId, group: LocalId },

    #[error("a {kind} witness ({witness}) cannot be a member of a {group_kind} witness ({group})")]
    Hierarchy {
        witness: LocalId,
        kind: WitnessType,
        group: LocalId,
        group_kind: WitnessType,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
