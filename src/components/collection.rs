use std::path::{Path, PathBuf};

use geo::{Intersects, Rect};

use crate::{
    components::{bands::BandCollection, bounds::SpaceTimeWindow},
    datetime::TimePoint,
    errors::Result,
};

/// One catalog hit: a band of an underlying raster dataset together with
/// its acquisition datetime. `descriptor` is opaque to the engine and only
/// ever handed back to the raster facility.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRow {
    pub descriptor: String,
    pub band_name: String,
    /// 1-based band number within the dataset behind `descriptor`.
    pub band_number: usize,
    pub datetime: TimePoint,
}

/// Queryable store over a collection of georeferenced images.
///
/// Implementations must return rows ordered by descriptor so that rows
/// referring to the same underlying raster are contiguous.
pub trait ImageCollection: Send + Sync {
    fn bands(&self) -> &BandCollection;

    /// All rows whose space-time footprint intersects `window` (temporal
    /// end exclusive), ordered by descriptor.
    fn find_range_st(&self, window: &SpaceTimeWindow) -> Result<Vec<CatalogRow>>;

    /// Backing file, if the collection is persistent.
    fn filename(&self) -> Option<&Path> {
        None
    }
}

/// An image registered with a [MemoryCollection]. The footprint must be
/// given in the collection's working projection.
#[derive(Debug, Clone)]
pub struct CollectionImage {
    pub descriptor: String,
    pub footprint: Rect<f64>,
    pub datetime: TimePoint,
    /// `(band name, 1-based band number)` pairs.
    pub bands: Vec<(String, usize)>,
}

/// In-memory image collection, mainly for tests and programmatic use.
#[derive(Default)]
pub struct MemoryCollection {
    bands: BandCollection,
    images: Vec<CollectionImage>,
    filename: Option<PathBuf>,
}

impl MemoryCollection {
    pub fn new(bands: BandCollection) -> Self {
        Self {
            bands,
            images: Vec::new(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn add_image(&mut self, image: CollectionImage) {
        self.images.push(image);
    }
}

impl ImageCollection for MemoryCollection {
    fn bands(&self) -> &BandCollection {
        &self.bands
    }

    fn find_range_st(&self, window: &SpaceTimeWindow) -> Result<Vec<CatalogRow>> {
        let mut rows: Vec<CatalogRow> = self
            .images
            .iter()
            .filter(|image| image.footprint.intersects(&window.space))
            .filter(|image| {
                let unit = image.datetime.unit().coarser(window.t0.unit());
                let t = image.datetime.cast(unit);
                t >= window.t0.cast(unit) && t < window.t1.cast(unit)
            })
            .flat_map(|image| {
                image.bands.iter().map(|(name, number)| CatalogRow {
                    descriptor: image.descriptor.clone(),
                    band_name: name.clone(),
                    band_number: *number,
                    datetime: image.datetime,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.descriptor.cmp(&b.descriptor));
        Ok(rows)
    }

    fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::bands::Band;

    fn collection() -> MemoryCollection {
        let mut bands = BandCollection::new();
        bands.add(Band::new("B04")).unwrap();
        bands.add(Band::new("B08")).unwrap();
        let mut collection = MemoryCollection::new(bands);
        for (descriptor, day, x0) in [("img_b", 2, 0.0), ("img_a", 2, 0.0), ("img_c", 9, 50.0)] {
            collection.add_image(CollectionImage {
                descriptor: descriptor.into(),
                footprint: Rect::new((x0, 0.0), (x0 + 20.0, 20.0)),
                datetime: format!("2020-01-{day:02}").parse().unwrap(),
                bands: vec![(String::from("B04"), 1), (String::from("B08"), 2)],
            });
        }
        collection
    }

    fn window(t0: &str, t1: &str) -> SpaceTimeWindow {
        SpaceTimeWindow::new(
            Rect::new((0.0, 0.0), (30.0, 30.0)),
            "EPSG:32633",
            t0.parse().unwrap(),
            t1.parse().unwrap(),
        )
    }

    #[test]
    fn rows_are_ordered_by_descriptor() {
        let rows = collection()
            .find_range_st(&window("2020-01-01", "2020-01-08"))
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].descriptor, "img_a");
        assert_eq!(rows[1].descriptor, "img_a");
        assert_eq!(rows[2].descriptor, "img_b");
        assert_eq!(rows[0].band_name, "B04");
        assert_eq!(rows[1].band_number, 2);
    }

    #[test]
    fn temporal_end_is_exclusive() {
        let rows = collection()
            .find_range_st(&window("2020-01-01", "2020-01-02"))
            .unwrap();
        assert!(rows.is_empty());
        let rows = collection()
            .find_range_st(&window("2020-01-02", "2020-01-03"))
            .unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn spatially_disjoint_images_are_skipped() {
        // img_c sits east of the query window
        let rows = collection()
            .find_range_st(&window("2020-01-01", "2020-01-31"))
            .unwrap();
        assert!(rows.iter().all(|row| row.descriptor != "img_c"));
    }
}
