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

/// Collapses the time axis of a cube with one reducer per output band.
///
/// The output keeps the input's spatial geometry and band order as listed;
/// `nt` becomes 1 and the temporal step spans the whole input range. Each
/// output chunk folds the input chunks of every `ct` at its `(cy, cx)`.
pub struct ReduceTimeCube {
    core: CubeCore,
    reducer_bands: Vec<(ReducerKind, String)>,
}

impl ReduceTimeCube {
    pub fn create(
        in_cube: Arc<dyn Cube>,
        reducer_bands: Vec<(ReducerKind, String)>,
    ) -> Result<Arc<Self>> {
        let already_reduced = in_cube.st_ref().nt() == 1;
        let mut bands = BandCollection::new();
        for (kind, name) in &reducer_bands {
            let band = in_cube.bands().require_band(name)?;
            bands.add(band.renamed(reduced_band_name(name, *kind, already_reduced)))?;
        }
        let stref = in_cube.st_ref().reduced_over_time();
        let chunk_size = [1, in_cube.chunk_size()[1], in_cube.chunk_size()[2]];
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

impl Cube for ReduceTimeCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("reduce_time_cube read_chunk({id})");
        let Some([_, cy, cx]) = self.grid().coords_of(id) else {
            return Ok(ChunkBuffer::empty());
        };
        let input = &self.parents()[0];
        let shape = self.buffer_shape_of_chunk(id);
        let cells = shape[2] * shape[3];
        let mut out = ChunkBuffer::new(shape);

        let mut reducers = Vec::with_capacity(self.reducer_bands.len());
        for (band_out, (kind, name)) in self.reducer_bands.iter().enumerate() {
            let band_in = input.bands().require(name)?;
            let reducer = BandReducer::new(*kind, band_in, band_out, cells);
            reducer.init(&mut out);
            reducers.push(reducer);
        }

        for ct in 0..input.count_chunks_t() {
            let chunk = input.read_chunk(input.grid().id_of([ct, cy, cx]))?;
            for reducer in &mut reducers {
                reducer.combine_over_time(&mut out, &chunk);
            }
        }
        for reducer in &mut reducers {
            reducer.finalize(&mut out);
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "reduce_time",
            "reducer_bands": serde_json::to_value(&self.reducer_bands).expect("reducers serialize"),
            "in_cube": self.parents()[0].describe(),
        })
    }
}
