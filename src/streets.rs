//! Spatial index over the street network.
//!
//! Edges are kept in a flat table and an R-tree stores one bounding-box
//! entry per edge, pointing back into the table by position. The index is
//! built once and never mutated afterwards, so it can be shared freely
//! between sensor runs.

use geo::LineString;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::error::{Result, ScoringError};
use crate::geo_utils::line_bbox;
use crate::Edge;

/// R-tree entry for one street edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeHandle {
    /// Position of the edge in the index's edge table.
    pub idx: usize,
    /// Lower-left corner of the edge's bounding box.
    pub min: [f64; 2],
    /// Upper-right corner of the edge's bounding box.
    pub max: [f64; 2],
}

impl RTreeObject for EdgeHandle {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

impl PointDistance for EdgeHandle {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        // Squared distance to the bounding box, zero when inside. This
        // lower-bounds the true distance to the edge geometry.
        let dx = (self.min[0] - point[0]).max(point[0] - self.max[0]).max(0.0);
        let dy = (self.min[1] - point[1]).max(point[1] - self.max[1]).max(0.0);
        dx * dx + dy * dy
    }
}

/// Read-only spatial index over street edges.
#[derive(Debug)]
pub struct StreetIndex {
    pub(crate) edges: Vec<Edge>,
    pub(crate) rtree: RTree<EdgeHandle>,
}

impl StreetIndex {
    /// Build the index from raw edges, dropping any with degenerate
    /// geometry (fewer than two coordinates, or non-finite coordinates).
    ///
    /// Fails with [`ScoringError::EmptyNetwork`] when no usable edge
    /// remains; every later lookup depends on at least one edge existing.
    pub fn build(edges: Vec<Edge>) -> Result<Self> {
        let total = edges.len();
        let edges: Vec<Edge> = edges.into_iter().filter(|e| e.is_valid()).collect();
        let rejected = total - edges.len();

        if rejected > 0 {
            log::warn!("[Streets] Rejected {} edges with degenerate geometry", rejected);
        }
        if edges.is_empty() {
            return Err(ScoringError::EmptyNetwork { rejected });
        }

        let handles: Vec<EdgeHandle> = edges
            .iter()
            .enumerate()
            .filter_map(|(idx, edge)| {
                let (min, max) = line_bbox(&edge.geometry)?;
                Some(EdgeHandle { idx, min, max })
            })
            .collect();

        log::info!("[Streets] Indexed {} edges", edges.len());

        Ok(Self {
            edges,
            rtree: RTree::bulk_load(handles),
        })
    }

    /// Number of indexed edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The edge at table position `idx`.
    pub fn edge(&self, idx: usize) -> Option<&Edge> {
        self.edges.get(idx)
    }

    /// All indexed edges, in table order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub(crate) fn geometry(&self, idx: usize) -> &LineString<f64> {
        &self.edges[idx].geometry
    }

    /// Handle whose bounding box is closest to `position`.
    pub(crate) fn nearest_handle(&self, position: [f64; 2]) -> Option<&EdgeHandle> {
        self.rtree.nearest_neighbor(&position)
    }

    /// Handles whose bounding boxes lie within `max_dist_2` (squared) of
    /// `position`.
    pub(crate) fn handles_within(
        &self,
        position: [f64; 2],
        max_dist_2: f64,
    ) -> impl Iterator<Item = &EdgeHandle> {
        self.rtree.locate_within_distance(position, max_dist_2)
    }

    /// Handles whose bounding boxes intersect the given box.
    pub(crate) fn handles_in_box(
        &self,
        min: [f64; 2],
        max: [f64; 2],
    ) -> impl Iterator<Item = &EdgeHandle> {
        self.rtree
            .locate_in_envelope_intersecting(&AABB::from_corners(min, max))
    }
}
