#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for block attribution.
//!
//! Builds an R-tree over block polygons at startup and resolves incident
//! coordinates to the block containing them. Used by the ingestion
//! enrichment step; everything downstream keys on the resolved block id.

use crime_grid_geography::{Block, BlockId};
use geo::{Intersects, MultiPolygon, Point};
use rstar::{AABB, RTree, RTreeObject};

/// A block polygon stored in the R-tree with its metadata.
struct BlockEntry {
    id: BlockId,
    envelope: AABB<[f64; 2]>,
    boundary: MultiPolygon<f64>,
}

impl RTreeObject for BlockEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over one city's blocks.
///
/// Constructed once and shared by reference; lookups are read-only.
pub struct BlockIndex {
    tree: RTree<BlockEntry>,
}

impl BlockIndex {
    /// Builds the index from block polygons.
    ///
    /// Blocks with empty boundaries are skipped and logged.
    #[must_use]
    pub fn build(blocks: &[Block]) -> Self {
        let mut entries = Vec::with_capacity(blocks.len());
        for block in blocks {
            let Some(envelope) = compute_envelope(&block.boundary) else {
                log::warn!("Block {} has an empty boundary; skipping", block.id);
                continue;
            };
            entries.push(BlockEntry {
                id: block.id,
                envelope,
                boundary: block.boundary.clone(),
            });
        }
        log::info!("Built spatial index over {} blocks", entries.len());
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Resolves a point to the block containing it.
    ///
    /// Containment is boundary-inclusive. Blocks are expected not to
    /// overlap, but a point exactly on a shared edge matches both
    /// neighbors; the lowest block id wins so resolution stays
    /// deterministic. Returns `None` for points outside every block.
    #[must_use]
    pub fn resolve(&self, lng: f64, lat: f64) -> Option<BlockId> {
        let point = Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.boundary.intersects(&point))
            .map(|entry| entry.id)
            .min()
    }

    /// Number of blocks indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

/// Bounding box of a [`MultiPolygon`], or `None` if it has no coordinates.
fn compute_envelope(boundary: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    use geo::BoundingRect;

    boundary
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
