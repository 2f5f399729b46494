use std::sync::Arc;

use itertools::Itertools;
use log::{debug, warn};
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        aggregation::TemporalAggregator,
        bands::BandCollection,
        collection::{CatalogRow, ImageCollection},
        cube::{Cube, CubeCore},
        engines::{RasterFacility, WarpRequest},
        mask::ImageMask,
        view::{ChunkId, CubeView},
    },
    errors::{CubeError, Result},
};

/// Chunk size used when the builder is not given one.
pub const DEFAULT_CHUNK_SIZE: [usize; 3] = [16, 256, 256];

/// A cube that materializes chunks from an image collection.
///
/// For every chunk, the catalog is queried for intersecting images, each
/// image is warped onto the cube grid by the raster facility, and images
/// falling into the same temporal slot are fused by the view's aggregation
/// method.
pub struct ImageCollectionCube {
    core: CubeCore,
    collection: Arc<dyn ImageCollection>,
    facility: Arc<dyn RasterFacility>,
    view: CubeView,
    band_filter: Option<Vec<String>>,
    mask: Option<(String, ImageMask)>,
    warp_args: Vec<String>,
}

pub struct ImageCollectionCubeBuilder {
    collection: Arc<dyn ImageCollection>,
    facility: Arc<dyn RasterFacility>,
    view: CubeView,
    chunk_size: [usize; 3],
    band_filter: Option<Vec<String>>,
    mask: Option<(String, ImageMask)>,
    warp_args: Vec<String>,
}

impl ImageCollectionCubeBuilder {
    /// Override the chunk size; the source is the only cube whose chunk
    /// size can be chosen freely, which matters for streaming.
    pub fn chunk_size(mut self, chunk_size: [usize; 3]) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Restrict the cube to the named collection bands, in the given order.
    pub fn bands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.band_filter = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn mask(mut self, band: impl Into<String>, mask: ImageMask) -> Self {
        self.mask = Some((band.into(), mask));
        self
    }

    /// Opaque arguments forwarded to the raster facility.
    pub fn warp_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warp_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<Arc<ImageCollectionCube>> {
        self.view.stref.validate()?;
        // fail on unsupported aggregation before the first read
        TemporalAggregator::new(self.view.aggregation)?;

        let bands = match &self.band_filter {
            Some(names) => {
                let mut bands = BandCollection::new();
                for name in names {
                    let band = self
                        .collection
                        .bands()
                        .iter()
                        .find(|band| band.name == *name)
                        .ok_or_else(|| CubeError::BandNotFound(name.clone()))?;
                    bands.add(band.clone())?;
                }
                bands
            }
            None => self.collection.bands().clone(),
        };

        let mask = match self.mask {
            Some((band, mask)) if self.collection.bands().index_of(&band).is_none() => {
                warn!("band `{band}` does not exist in the image collection, mask is ignored");
                None
            }
            other => other,
        };

        let core = CubeCore::new(self.view.stref.clone(), bands, self.chunk_size, Vec::new());
        Ok(Arc::new(ImageCollectionCube {
            core,
            collection: self.collection,
            facility: self.facility,
            view: self.view,
            band_filter: self.band_filter,
            mask,
            warp_args: self.warp_args,
        }))
    }
}

impl ImageCollectionCube {
    pub fn builder(
        collection: Arc<dyn ImageCollection>,
        facility: Arc<dyn RasterFacility>,
        view: CubeView,
    ) -> ImageCollectionCubeBuilder {
        ImageCollectionCubeBuilder {
            collection,
            facility,
            view,
            chunk_size: DEFAULT_CHUNK_SIZE,
            band_filter: None,
            mask: None,
            warp_args: Vec::new(),
        }
    }

    pub fn view(&self) -> &CubeView {
        &self.view
    }

    pub fn collection(&self) -> &Arc<dyn ImageCollection> {
        &self.collection
    }
}

impl Cube for ImageCollectionCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("image_collection_cube read_chunk({id})");
        let Some(bounds) = self.bounds_from_chunk(id) else {
            return Ok(ChunkBuffer::empty());
        };
        let rows = self.collection.find_range_st(&bounds)?;
        if rows.is_empty() {
            return Ok(ChunkBuffer::empty());
        }

        let shape = self.buffer_shape_of_chunk(id);
        let (slots, sy, sx) = (shape[1], shape[2], shape[3]);
        let mut out = ChunkBuffer::new(shape);
        let mut aggregator = TemporalAggregator::new(self.view.aggregation)?;
        let dt = self.st_ref().dt;

        // rows arrive ordered by descriptor, one warp per underlying raster
        let grouped = rows.iter().chunk_by(|row| row.descriptor.clone());
        for (descriptor, group) in &grouped {
            let group: Vec<&CatalogRow> = group.collect();
            let mut band_numbers = Vec::new();
            let mut band_indices = Vec::new();
            let mut mask_number = None;
            for row in &group {
                if let Some((mask_band, _)) = &self.mask {
                    if row.band_name == *mask_band {
                        mask_number = Some(row.band_number);
                    }
                }
                if let Some(index) = self.bands().index_of(&row.band_name) {
                    band_numbers.push(row.band_number);
                    band_indices.push(index);
                }
            }
            if band_numbers.is_empty() {
                continue;
            }

            // all bands of a dataset share one acquisition datetime
            let datetime = group[0].datetime;
            let slot = dt.steps_between(&bounds.t0, &datetime);
            if slot < 0 || slot as usize >= slots {
                warn!("image `{descriptor}` at {datetime} falls outside chunk {id}, skipping");
                continue;
            }
            let slot = slot as usize;

            let request = WarpRequest {
                descriptor: &descriptor,
                band_numbers: &band_numbers,
                window: bounds.space,
                srs: &self.st_ref().srs,
                size: (sy, sx),
                resampling: &self.view.resampling,
                extra_args: &self.warp_args,
            };
            let mut planes = self.facility.warp(&request)?;

            if let Some(mask_number) = mask_number {
                if let Some((_, mask)) = &self.mask {
                    let mask_numbers = [mask_number];
                    let mask_request = WarpRequest {
                        band_numbers: &mask_numbers,
                        ..request.clone()
                    };
                    let mask_plane = self.facility.warp(&mask_request)?;
                    mask.apply(&mask_plane, &mut planes, band_numbers.len());
                }
            }

            for (plane_index, band_index) in band_indices.iter().enumerate() {
                let plane = &planes[plane_index * sy * sx..(plane_index + 1) * sy * sx];
                aggregator.update(&mut out, plane, *band_index, slot);
            }
        }

        aggregator.finalize(&mut out);
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        let mut out = json!({
            "cube_type": "image_collection",
            "chunk_size": self.chunk_size(),
            "view": serde_json::to_value(&self.view).expect("view serializes"),
        });
        if let Some(file) = self.collection.filename() {
            out["file"] = json!(file.display().to_string());
        }
        if let Some(names) = &self.band_filter {
            out["bands"] = json!(names);
        }
        if let Some((band, mask)) = &self.mask {
            out["mask"] = serde_json::to_value(mask).expect("mask serializes");
            out["mask_band"] = json!(band);
        }
        if !self.warp_args.is_empty() {
            out["warp_args"] = json!(self.warp_args);
        }
        out
    }
}
