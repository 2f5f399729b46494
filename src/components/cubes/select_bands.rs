use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::BandCollection,
        cube::{connect_to_parents, Cube, CubeCore},
        view::ChunkId,
    },
    errors::{CubeError, Result},
};

/// Reshapes the band collection to a subset, in the listed order; chunk
/// geometry is unchanged and `read_chunk` re-packs the selected planes.
pub struct SelectBandsCube {
    core: CubeCore,
    band_names: Vec<String>,
}

impl SelectBandsCube {
    pub fn create(in_cube: Arc<dyn Cube>, band_names: Vec<String>) -> Result<Arc<Self>> {
        let mut bands = BandCollection::new();
        for name in &band_names {
            bands.add(in_cube.bands().require_band(name)?.clone())?;
        }
        let core = CubeCore::new(
            in_cube.st_ref().clone(),
            bands,
            in_cube.chunk_size(),
            vec![in_cube],
        );
        let out = Arc::new(Self { core, band_names });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }

    /// Selection by position instead of name.
    pub fn create_by_index(in_cube: Arc<dyn Cube>, indices: Vec<usize>) -> Result<Arc<Self>> {
        let band_names = indices
            .iter()
            .map(|index| {
                in_cube
                    .bands()
                    .get(*index)
                    .map(|band| band.name.clone())
                    .ok_or_else(|| CubeError::BandNotFound(format!("#{index}")))
            })
            .collect::<Result<Vec<String>>>()?;
        Self::create(in_cube, band_names)
    }
}

impl Cube for SelectBandsCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("select_bands_cube read_chunk({id})");
        if !self.grid().contains(id) {
            return Ok(ChunkBuffer::empty());
        }
        let input = &self.parents()[0];
        let chunk = input.read_chunk(id)?;
        if chunk.is_empty() {
            return Ok(ChunkBuffer::empty());
        }
        let mut out = ChunkBuffer::new(self.buffer_shape_of_chunk(id));
        for (band_out, name) in self.band_names.iter().enumerate() {
            let band_in = input.bands().require(name)?;
            out.band_mut(band_out).copy_from_slice(chunk.band(band_in));
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "select_bands",
            "bands": self.band_names,
            "in_cube": self.parents()[0].describe(),
        })
    }
}
