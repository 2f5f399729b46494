//! Cubes and reference frames shared by the unit tests.

use std::sync::Arc;

use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::{Band, BandCollection},
        cube::{Cube, CubeCore},
        view::{ChunkId, STReference},
    },
    datetime::{TimeDuration, TimeUnit},
    errors::Result,
};

/// Daily reference frame over a small UTM grid starting 2020-01-01.
pub fn daily_stref(nx: usize, ny: usize, days: usize) -> STReference {
    STReference {
        srs: String::from("EPSG:32633"),
        left: 300000.0,
        right: 300000.0 + nx as f64 * 10.0,
        bottom: 5000000.0,
        top: 5000000.0 + ny as f64 * 10.0,
        nx,
        ny,
        t0: "2020-01-01".parse().unwrap(),
        t1: "2020-01-01"
            .parse::<crate::datetime::TimePoint>()
            .unwrap()
            .add_units(days as i64 - 1, TimeUnit::Day),
        dt: TimeDuration::new(1, TimeUnit::Day),
    }
}

/// Cube serving chunks out of one explicit band-major `[nb, nt, ny, nx]`
/// payload.
pub struct ValuesCube {
    core: CubeCore,
    data: Vec<f64>,
}

impl ValuesCube {
    pub fn create(
        stref: STReference,
        band_names: &[&str],
        chunk_size: [usize; 3],
        data: Vec<f64>,
    ) -> Arc<Self> {
        let [nt, ny, nx] = stref.size();
        assert_eq!(data.len(), band_names.len() * nt * ny * nx);
        let bands: BandCollection = band_names.iter().map(|name| Band::new(*name)).collect();
        let core = CubeCore::new(stref, bands, chunk_size, Vec::new());
        Arc::new(Self { core, data })
    }

    /// Single band named `x` over `values.len()` days on one pixel.
    pub fn over_time(values: &[f64]) -> Arc<Self> {
        Self::create(
            daily_stref(1, 1, values.len()),
            &["x"],
            [values.len(), 1, 1],
            values.to_vec(),
        )
    }
}

impl Cube for ValuesCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        let Some(offset) = self.grid().offset_of(id) else {
            return Ok(ChunkBuffer::empty());
        };
        let shape = self.buffer_shape_of_chunk(id);
        let [nt, ny, nx] = self.st_ref().size();
        let mut out = ChunkBuffer::new(shape);
        for band in 0..shape[0] {
            for t in 0..shape[1] {
                for y in 0..shape[2] {
                    let source_start = ((band * nt + offset[0] + t) * ny + offset[1] + y) * nx
                        + offset[2];
                    let target_start = y * shape[3];
                    out.plane_mut(band, t)[target_start..target_start + shape[3]]
                        .copy_from_slice(&self.data[source_start..source_start + shape[3]]);
                }
            }
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        json!({ "cube_type": "values" })
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
