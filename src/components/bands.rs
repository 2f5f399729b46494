use serde::{Deserialize, Serialize};

use crate::errors::{CubeError, Result};

/// Description of a single cube band.
///
/// `io_type` is a type label for writers only; in-memory chunk payloads are
/// always `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    #[serde(default = "default_io_type")]
    pub io_type: String,
    #[serde(default)]
    pub no_data: Option<f64>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

fn default_io_type() -> String {
    String::from("float64")
}

fn default_scale() -> f64 {
    1.0
}

impl Band {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            io_type: default_io_type(),
            no_data: None,
            scale: 1.0,
            offset: 0.0,
            unit: String::new(),
            description: String::new(),
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        let mut band = self.clone();
        band.name = name.into();
        band
    }
}

/// Ordered sequence of bands with unique names; band index equals position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandCollection(Vec<Band>);

impl BandCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, band: Band) -> Result<()> {
        if self.index_of(&band.name).is_some() {
            return Err(CubeError::DuplicateBand(band.name));
        }
        self.0.push(band);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, index: usize) -> Option<&Band> {
        self.0.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|band| band.name == name)
    }

    /// Index lookup that fails with [CubeError::BandNotFound].
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| CubeError::BandNotFound(name.to_string()))
    }

    pub fn require_band(&self, name: &str) -> Result<&Band> {
        self.0
            .iter()
            .find(|band| band.name == name)
            .ok_or_else(|| CubeError::BandNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|band| band.name.as_str()).collect()
    }
}

impl FromIterator<Band> for BandCollection {
    /// Collects bands, keeping the first on name collision.
    fn from_iter<I: IntoIterator<Item = Band>>(iter: I) -> Self {
        let mut collection = BandCollection::new();
        for band in iter {
            let _ = collection.add(band);
        }
        collection
    }
}
