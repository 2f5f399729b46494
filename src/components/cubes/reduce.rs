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

/// Early single-reducer variant of [super::reduce_time::ReduceTimeCube]:
/// one reducer applied to every input band.
pub struct ReduceCube {
    core: CubeCore,
    reducer: ReducerKind,
}

impl ReduceCube {
    pub fn create(in_cube: Arc<dyn Cube>, reducer: ReducerKind) -> Result<Arc<Self>> {
        let already_reduced = in_cube.st_ref().nt() == 1;
        let mut bands = BandCollection::new();
        for band in in_cube.bands().iter() {
            bands.add(band.renamed(reduced_band_name(&band.name, reducer, already_reduced)))?;
        }
        let stref = in_cube.st_ref().reduced_over_time();
        let chunk_size = [1, in_cube.chunk_size()[1], in_cube.chunk_size()[2]];
        let core = CubeCore::new(stref, bands, chunk_size, vec![in_cube]);
        let out = Arc::new(Self { core, reducer });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }
}

impl Cube for ReduceCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("reduce_cube read_chunk({id})");
        let Some([_, cy, cx]) = self.grid().coords_of(id) else {
            return Ok(ChunkBuffer::empty());
        };
        let input = &self.parents()[0];
        let shape = self.buffer_shape_of_chunk(id);
        let cells = shape[2] * shape[3];
        let mut out = ChunkBuffer::new(shape);

        let mut reducers: Vec<BandReducer> = (0..shape[0])
            .map(|band| BandReducer::new(self.reducer, band, band, cells))
            .collect();
        for reducer in &reducers {
            reducer.init(&mut out);
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
            "cube_type": "reduce",
            "reducer": self.reducer.as_str(),
            "in_cube": self.parents()[0].describe(),
        })
    }
}
