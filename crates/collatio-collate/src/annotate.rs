//! Variant annotation of a grouping witness's markup.
//!
//! Each region of the parent gets a following sibling holding the collated
//! readings:
//!
//! ```text
//! <span data-dpt-type="unsettled" ...>parent reading</span>
//! <span class="variants">
//!   <span class="variant" data-group="A" data-siglum="P" data-copies="0">reading</span>
//!   ...
//! </span>
//! ```

use collatio_markup::conventions::COPIES_ATTR;
use collatio_markup::{parse_fragment, region_nodes, Element, RegionKind};
use collatio_storage::{CorpusConfig, EncodedContent, Store};

use crate::collator::{Collation, Collator};

pub const VARIANTS_CLASS: &str = "variants";
pub const VARIANT_CLASS: &str = "variant";
/// Siglum of the grouping witness the variant was collated under.
pub const VARIANT_GROUP_ATTR: &str = "data-group";
/// Siglum of the member witness carrying the reading.
pub const VARIANT_SIGLUM_ATTR: &str = "data-siglum";

/// Markup of `parent` with the collated readings inserted after each region.
///
/// Manuscripts have nothing to collate and come back unchanged. The stored
/// content is never modified.
pub fn render_with_readings<S: Store + ?Sized>(
    store: &S,
    config: &CorpusConfig,
    parent: &EncodedContent,
) -> String {
    let Some(witness) = store.witness(parent.witness) else {
        return parent.content.clone();
    };
    let Some(kind) = witness.kind.grouping_region_kind() else {
        return parent.content.clone();
    };

    let collation = Collator::new(store, config).collate(parent);
    annotate(&parent.content, kind, witness.siglum(), &collation)
}

/// Inserts the rows of `collation` after the regions of `kind` in `markup`.
/// Regions past the last row are left alone.
pub fn annotate(
    markup: &str,
    kind: RegionKind,
    group_siglum: &str,
    collation: &Collation,
) -> String {
    if collation.is_empty() {
        return markup.to_string();
    }
    let mut tree = match parse_fragment(markup) {
        Ok(tree) => tree,
        Err(err) => {
            tracing::warn!(error = %err, "cannot annotate unparsable markup");
            return markup.to_string();
        }
    };

    let regions = region_nodes(&tree, kind);
    for (anchor, row) in regions.into_iter().zip(&collation.matrix) {
        let container = tree.create_element(Element::new("span").with_attr("class", VARIANTS_CLASS));
        for (reading, member) in row.iter().zip(&collation.members) {
            let variant = tree.create_element(
                Element::new("span")
                    .with_attr("class", VARIANT_CLASS)
                    .with_attr(VARIANT_GROUP_ATTR, group_siglum)
                    .with_attr(VARIANT_SIGLUM_ATTR, member.siglum())
                    .with_attr(COPIES_ATTR, reading.copies.to_string()),
            );
            tree.append_text(variant, &reading.reading);
            tree.append_child(container, variant);
        }
        tree.insert_after(anchor, container);
    }

    tree.serialize(true)
}
