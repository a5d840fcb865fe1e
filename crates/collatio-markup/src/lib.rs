//! Collatio markup layer
//!
//! Edition markup is stored as loosely valid XML/HTML fragments. This crate
//! turns such a fragment into a navigable tree and back again:
//!
//! ```text
//!   markup string ──parse──► Tree (arena of nodes) ──serialize──► markup string
//!                              │
//!                              └── regions::extract_regions ──► [Region]
//! ```
//!
//! ## Guarantees
//!
//! - **Round-trip**: an unmodified tree serializes to the exact input bytes.
//!   Start tags keep their raw source until an attribute is changed.
//! - **Fragments**: `wrap_root` parses inputs without a single top element and
//!   `serialize(true)` strips exactly the synthetic wrapper again.
//! - **Ordered attributes**: attributes keep insertion order, so serialization
//!   of modified elements is deterministic.

pub mod conventions;
pub mod error;
pub mod regions;
pub mod tree;

pub use error::MarkupError;
pub use regions::{extract_regions, extract_regions_from_markup, region_nodes, Region, RegionKind};
pub use tree::{parse, parse_fragment, Element, NodeId, Tree};
