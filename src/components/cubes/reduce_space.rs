use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::BandCollection,
        cube::{connect_to_parents, Cube, CubeCore},
        reducers::{reduced_band_name, BandReducer, ReducerKind},
        view::ChunkId,
    },
    errors::Result,
};

/// Collapses the spatial axes of a cube with one reducer per output band.
///
/// The output keeps the input's time axis but shrinks the grid to a single
/// pixel covering the full extent. Each output chunk folds the input chunks
/// of every `(cy, cx)` at its `ct`.
pub struct ReduceSpaceCube {
    core: CubeCore,
    reducer_bands: Vec<(ReducerKind, String)>,
}

impl ReduceSpaceCube {
    pub fn create(
        in_cube: Arc<dyn Cube>,
        reducer_bands: Vec<(ReducerKind, String)>,
    ) -> Result<Arc<Self>> {
        let already_reduced = in_cube.st_ref().nx * in_cube.st_ref().ny == 1;
        let mut bands = BandCollection::new();
        for (kind, name) in &reducer_bands {
            let band = in_cube.bands().require_band(name)?;
            bands.add(band.renamed(reduced_band_name(name, *kind, already_reduced)))?;
        }
        let stref = in_cube.st_ref().collapsed_over_space();
        let chunk_size = [in_cube.chunk_size()[0], 1, 1];
        let core = CubeCore::new(stref, bands, chunk_size, vec![in_cube]);
        let out = Arc::new(Self {
            core,
            reducer_bands,
        });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }
}

impl Cube for ReduceSpaceCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("reduce_space_cube read_chunk({id})");
        let Some([ct, _, _]) = self.grid().coords_of(id) else {
            return Ok(ChunkBuffer::empty());
        };
        let input = &self.parents()[0];
        // a spatially collapsed input passes through unchanged
        if input.st_ref().nx == 1 && input.st_ref().ny == 1 {
            return input.read_chunk(id);
        }

        let shape = self.buffer_shape_of_chunk(id);
        let cells = shape[1];
        let mut out = ChunkBuffer::new(shape);

        let mut reducers = Vec::with_capacity(self.reducer_bands.len());
        for (band_out, (kind, name)) in self.reducer_bands.iter().enumerate() {
            let band_in = input.bands().require(name)?;
            let reducer = BandReducer::new(*kind, band_in, band_out, cells);
            reducer.init(&mut out);
            reducers.push(reducer);
        }

        for cy in 0..input.count_chunks_y() {
            for cx in 0..input.count_chunks_x() {
                let chunk = input.read_chunk(input.grid().id_of([ct, cy, cx]))?;
                for reducer in &mut reducers {
                    reducer.combine_over_space(&mut out, &chunk);
                }
            }
        }
        for reducer in &mut reducers {
            reducer.finalize(&mut out);
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "reduce_space",
            "reducer_bands": serde_json::to_value(&self.reducer_bands).expect("reducers serialize"),
            "in_cube": self.parents()[0].describe(),
        })
    }
}
