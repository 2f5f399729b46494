use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::{Band, BandCollection},
        cube::{Cube, CubeCore},
        view::{ChunkId, CubeView},
    },
    errors::Result,
};

/// Source cube returning constant chunks; useful as a graph leaf in tests
/// and benchmarks.
pub struct DummyCube {
    core: CubeCore,
    view: CubeView,
    fill: f64,
}

impl DummyCube {
    pub fn create(
        view: CubeView,
        nbands: usize,
        fill: f64,
        chunk_size: [usize; 3],
    ) -> Result<Arc<Self>> {
        view.stref.validate()?;
        let bands: BandCollection = (1..=nbands)
            .map(|number| Band::new(format!("band{number}")))
            .collect();
        let core = CubeCore::new(view.stref.clone(), bands, chunk_size, Vec::new());
        Ok(Arc::new(Self { core, view, fill }))
    }
}

impl Cube for DummyCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("dummy_cube read_chunk({id})");
        if !self.grid().contains(id) {
            return Ok(ChunkBuffer::empty());
        }
        Ok(ChunkBuffer::new_filled(
            self.buffer_shape_of_chunk(id),
            self.fill,
        ))
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "dummy",
            "view": serde_json::to_value(&self.view).expect("view serializes"),
            "chunk_size": self.chunk_size(),
            "nbands": self.bands().count(),
            "fill": self.fill,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::daily_stref;
    use rstest::{fixture, rstest};

    #[fixture]
    fn cube() -> Arc<DummyCube> {
        DummyCube::create(CubeView::new(daily_stref(10, 10, 5)), 2, 1.0, [2, 4, 4]).unwrap()
    }

    #[rstest]
    fn chunk_count_follows_the_tiling(cube: Arc<DummyCube>) {
        assert_eq!(cube.count_chunks_t(), 3);
        assert_eq!(cube.count_chunks_y(), 3);
        assert_eq!(cube.count_chunks_x(), 3);
        assert_eq!(cube.count_chunks(), 27);
    }

    #[rstest]
    fn chunks_match_their_advertised_shape(cube: Arc<DummyCube>) {
        for id in 0..cube.count_chunks() {
            let chunk = cube.read_chunk(id).unwrap();
            assert_eq!(chunk.shape(), cube.buffer_shape_of_chunk(id));
            assert!(chunk.as_slice().iter().all(|v| *v == 1.0));
        }
        assert!(cube.read_chunk(cube.count_chunks()).unwrap().is_empty());
        assert!(cube.read_chunk(usize::MAX).unwrap().is_empty());
    }

    #[rstest]
    fn chunk_bounds_tile_the_extent(cube: Arc<DummyCube>) {
        let stref = cube.st_ref();
        let bounds = cube.bounds_from_chunk(0).unwrap();
        // chunk (0, 0, 0) starts at the north-west corner
        assert_eq!(bounds.left(), stref.left);
        assert_eq!(bounds.top(), stref.top);
        assert_eq!(bounds.right(), stref.left + 4.0 * stref.dx());
        assert_eq!(bounds.bottom(), stref.top - 4.0 * stref.dy());
        assert_eq!(bounds.t0.to_string(), "2020-01-01");
        assert_eq!(bounds.t1.to_string(), "2020-01-03");

        // truncated chunk in the south-east corner of the last time slice
        let last = cube.count_chunks() - 1;
        let bounds = cube.bounds_from_chunk(last).unwrap();
        assert_eq!(bounds.right(), stref.right);
        assert_eq!(bounds.bottom(), stref.bottom);
        assert_eq!(bounds.t0.to_string(), "2020-01-05");
        assert!(cube.bounds_from_chunk(usize::MAX).is_none());
    }

    #[rstest]
    fn find_chunk_by_world_coordinate(cube: Arc<DummyCube>) {
        let stref = cube.st_ref().clone();
        let id = cube.find_chunk_that_contains(stref.t0, stref.left, stref.top - 0.5);
        assert_eq!(id, 0);
        // east of the third x-tile boundary, one y-tile down, day 3
        let id = cube.find_chunk_that_contains(
            "2020-01-03".parse().unwrap(),
            stref.left + 85.0,
            stref.top - 45.0,
        );
        let coords = cube.grid().coords_of(id).unwrap();
        assert_eq!(coords, [1, 1, 2]);
        // outside the cube
        let id = cube.find_chunk_that_contains("2019-12-31".parse().unwrap(), stref.left, stref.top);
        assert!(id >= cube.count_chunks());
    }

    #[rstest]
    fn band_order_matches_the_collection(cube: Arc<DummyCube>) {
        assert_eq!(cube.bands().names(), ["band1", "band2"]);
        let chunk = cube.read_chunk(0).unwrap();
        assert_eq!(chunk.shape()[0], cube.bands().count());
    }
}
