//! Unsettled-region extraction.
//!
//! A region is an element typed `unsettled` (or carrying a region-kind
//! attribute). Regions are returned in document order; that order is the
//! alignment key used by the collator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::conventions::{
    COPIES_ATTR, FALLBACK_ID_ATTR, GROUP_ATTR, ID_ATTR, TYPE_ATTR, UNSETTLED,
};
use crate::error::MarkupError;
use crate::tree::{parse_fragment, Element, NodeId, Tree};

/// Abstraction level a region was marked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Work,
    Version,
}

impl RegionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionKind::Work => "work",
            RegionKind::Version => "version",
        }
    }

    /// Prefix of the sequence ids the normalizer assigns (`w-1`, `v-1`).
    pub fn id_prefix(self) -> &'static str {
        match self {
            RegionKind::Work => "w",
            RegionKind::Version => "v",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Ok(RegionKind::Work),
            "version" => Ok(RegionKind::Version),
            other => Err(format!("unknown region kind '{other}'")),
        }
    }
}

/// A region as seen by the collator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub reading: String,
    pub id: String,
    pub copies: u32,
}

/// True for elements marked as unsettled regions of any kind.
pub fn is_region(element: &Element) -> bool {
    element.attr(TYPE_ATTR) == Some(UNSETTLED) || element.attr(GROUP_ATTR).is_some()
}

/// Kind of a region element; unmarked regions count as `version`.
pub fn region_kind(element: &Element) -> RegionKind {
    element
        .attr(GROUP_ATTR)
        .and_then(|group| group.parse().ok())
        .unwrap_or(RegionKind::Version)
}

/// Identifier of a region element, empty when absent.
pub fn region_id(element: &Element) -> &str {
    element
        .attr(ID_ATTR)
        .or_else(|| element.attr(FALLBACK_ID_ATTR))
        .unwrap_or("")
}

/// Region elements of `kind`, in document order.
pub fn region_nodes(tree: &Tree, kind: RegionKind) -> Vec<NodeId> {
    tree.find_elements(|element| is_region(element) && region_kind(element) == kind)
}

pub fn extract_regions(tree: &Tree, kind: RegionKind) -> Vec<Region> {
    region_nodes(tree, kind)
        .into_iter()
        .filter_map(|node| {
            let element = tree.element(node)?;
            Some(Region {
                reading: tree.text_content(node),
                id: region_id(element).to_string(),
                copies: element
                    .attr(COPIES_ATTR)
                    .and_then(|copies| copies.trim().parse().ok())
                    .unwrap_or(0),
            })
        })
        .collect()
}

/// Parses a stored fragment leniently and extracts its regions of `kind`.
pub fn extract_regions_from_markup(
    markup: &str,
    kind: RegionKind,
) -> Result<Vec<Region>, MarkupError> {
    let tree = parse_fragment(markup)?;
    Ok(extract_regions(&tree, kind))
}
