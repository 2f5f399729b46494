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

/// Unions the bands of two cubes with identical reference frames and chunk
/// geometry. Band names are prefixed per side to stay unique.
pub struct JoinBandsCube {
    core: CubeCore,
    prefix_a: String,
    prefix_b: String,
}

fn prefixed(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

impl JoinBandsCube {
    pub fn create(
        a: Arc<dyn Cube>,
        b: Arc<dyn Cube>,
        prefix_a: impl Into<String>,
        prefix_b: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let (prefix_a, prefix_b) = (prefix_a.into(), prefix_b.into());
        if a.st_ref() != b.st_ref() {
            return Err(CubeError::GeometryMismatch(String::from(
                "joined cubes must share the same spatiotemporal reference",
            )));
        }
        if a.chunk_size() != b.chunk_size() {
            return Err(CubeError::GeometryMismatch(String::from(
                "joined cubes must share the same chunk size",
            )));
        }
        let mut bands = BandCollection::new();
        for band in a.bands().iter() {
            bands.add(band.renamed(prefixed(&prefix_a, &band.name)))?;
        }
        for band in b.bands().iter() {
            bands.add(band.renamed(prefixed(&prefix_b, &band.name)))?;
        }
        let core = CubeCore::new(a.st_ref().clone(), bands, a.chunk_size(), vec![a, b]);
        let out = Arc::new(Self {
            core,
            prefix_a,
            prefix_b,
        });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }
}

impl Cube for JoinBandsCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("join_bands_cube read_chunk({id})");
        if !self.grid().contains(id) {
            return Ok(ChunkBuffer::empty());
        }
        let chunk_a = self.parents()[0].read_chunk(id)?;
        let chunk_b = self.parents()[1].read_chunk(id)?;
        if chunk_a.is_empty() && chunk_b.is_empty() {
            return Ok(ChunkBuffer::empty());
        }
        let mut out = ChunkBuffer::new(self.buffer_shape_of_chunk(id));
        let bands_a = self.parents()[0].bands().count();
        if !chunk_a.is_empty() {
            for band in 0..bands_a {
                out.band_mut(band).copy_from_slice(chunk_a.band(band));
            }
        }
        if !chunk_b.is_empty() {
            for band in 0..self.parents()[1].bands().count() {
                out.band_mut(bands_a + band).copy_from_slice(chunk_b.band(band));
            }
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "join_bands",
            "a": self.parents()[0].describe(),
            "b": self.parents()[1].describe(),
            "prefix_a": self.prefix_a,
            "prefix_b": self.prefix_b,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{daily_stref, ValuesCube};

    fn one_band(name: &str, value: f64) -> Arc<ValuesCube> {
        ValuesCube::create(daily_stref(1, 1, 1), &[name], [1, 1, 1], vec![value])
    }

    #[test]
    fn bands_are_prefixed_and_stacked() {
        let joined =
            JoinBandsCube::create(one_band("x", 1.0), one_band("x", 2.0), "A", "B").unwrap();
        assert_eq!(joined.bands().names(), ["A.x", "B.x"]);
        let chunk = joined.read_chunk(0).unwrap();
        assert_eq!(chunk.at(0, 0, 0, 0), 1.0);
        assert_eq!(chunk.at(1, 0, 0, 0), 2.0);
    }

    #[test]
    fn colliding_names_are_rejected() {
        assert!(matches!(
            JoinBandsCube::create(one_band("x", 1.0), one_band("x", 2.0), "", ""),
            Err(CubeError::DuplicateBand(_))
        ));
    }

    #[test]
    fn mismatched_geometry_is_rejected() {
        let a = one_band("x", 1.0);
        let b = ValuesCube::create(daily_stref(2, 1, 1), &["y"], [1, 1, 2], vec![1.0, 2.0]);
        assert!(matches!(
            JoinBandsCube::create(a, b, "A", "B"),
            Err(CubeError::GeometryMismatch(_))
        ));
    }
}
