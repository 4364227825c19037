use super::SpatialIndex;
use crate::error::{Error, Result};
use crate::protocol::{BoundingBox, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A named point in the catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl City {
    pub fn new(id: EntityId, name: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorldFile {
    #[serde(default, rename = "city")]
    cities: Vec<City>,
}

/// In-memory city catalogue
///
/// Cities are kept sorted by `x` so a query only scans the x-slab of the box.
#[derive(Debug, Clone, Default)]
pub struct World {
    cities: Vec<City>,
}

impl World {
    /// Build a world from cities; ids must be unique and coordinates finite
    pub fn new(mut cities: Vec<City>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(cities.len());
        for city in &cities {
            if !city.x.is_finite() || !city.y.is_finite() {
                return Err(Error::Index(format!(
                    "city {} has non-finite coordinates",
                    city.id
                )));
            }
            if !seen.insert(city.id) {
                return Err(Error::Index(format!("duplicate city id {}", city.id)));
            }
        }

        // Stable, so cities sharing an x keep their input order
        cities.sort_by(|a, b| a.x.total_cmp(&b.x));
        Ok(Self { cities })
    }

    /// Load a TOML catalogue of `[[city]]` tables
    ///
    /// ```toml
    /// [[city]]
    /// id = 5
    /// name = "Stockholm"
    /// x = 18.07
    /// y = 59.33
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: WorldFile = toml::from_str(&contents)?;
        Ok(Self::new(file.cities)?)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    /// Cities inside `bbox`, ordered by `x`
    pub fn cities_in_bounding_box<'a>(
        &'a self,
        bbox: &'a BoundingBox,
    ) -> impl Iterator<Item = &'a City> + 'a {
        let slab = if bbox.is_degenerate() {
            &self.cities[..0]
        } else {
            let min_x = f64::from(bbox.min_x);
            let max_x = f64::from(bbox.max_x);
            let start = self.cities.partition_point(|c| c.x < min_x);
            let end = self.cities.partition_point(|c| c.x <= max_x);
            &self.cities[start..end.max(start)]
        };

        slab.iter().filter(move |c| bbox.contains(c.x, c.y))
    }
}

impl SpatialIndex for World {
    fn query_bounding_box(&self, bbox: &BoundingBox) -> Vec<EntityId> {
        self.cities_in_bounding_box(bbox).map(|c| c.id).collect()
    }
}
