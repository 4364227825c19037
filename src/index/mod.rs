//! Spatial lookups consumed by the reactor

mod world;

pub use world::{City, World};

use crate::protocol::{BoundingBox, EntityId};

/// Answers bounding-box queries
///
/// Called inline on the reactor thread, so implementations must be fast and
/// must not block.
pub trait SpatialIndex {
    /// Ids of every entity inside `bbox` (bounds inclusive), in index order.
    /// Degenerate boxes yield an empty result.
    fn query_bounding_box(&self, bbox: &BoundingBox) -> Vec<EntityId>;
}

impl<T: SpatialIndex + ?Sized> SpatialIndex for std::sync::Arc<T> {
    fn query_bounding_box(&self, bbox: &BoundingBox) -> Vec<EntityId> {
        (**self).query_bounding_box(bbox)
    }
}
