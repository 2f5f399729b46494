use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        cube::{connect_to_parents, Cube, CubeCore},
        view::ChunkId,
    },
    errors::Result,
    expression::{PixelBindings, PixelExpr},
};

/// Keeps pixels where a boolean predicate over the parent bands holds and
/// blanks every band elsewhere. Bands and geometry are unchanged.
pub struct FilterPixelCube {
    core: CubeCore,
    predicate: PixelExpr,
    inputs: Vec<(String, usize)>,
}

impl FilterPixelCube {
    pub fn create(in_cube: Arc<dyn Cube>, predicate: String) -> Result<Arc<Self>> {
        let parent_names = in_cube.bands().names();
        let predicate = PixelExpr::compile(&predicate, &parent_names)?;
        let inputs = predicate
            .variables()
            .iter()
            .map(|name| Ok((name.clone(), in_cube.bands().require(name)?)))
            .collect::<Result<Vec<_>>>()?;
        let core = CubeCore::new(
            in_cube.st_ref().clone(),
            in_cube.bands().clone(),
            in_cube.chunk_size(),
            vec![in_cube],
        );
        let out = Arc::new(Self {
            core,
            predicate,
            inputs,
        });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }
}

impl Cube for FilterPixelCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("filter_pixel_cube read_chunk({id})");
        if !self.grid().contains(id) {
            return Ok(ChunkBuffer::empty());
        }
        let chunk = self.parents()[0].read_chunk(id)?;
        if chunk.is_empty() {
            return Ok(ChunkBuffer::empty());
        }
        let mut out = chunk.clone();
        let pixels = chunk.band(0).len();
        let bands = out.shape()[0];
        let mut bindings = PixelBindings::new();
        for pixel in 0..pixels {
            for (name, band_in) in &self.inputs {
                bindings.set(name, chunk.band(*band_in)[pixel])?;
            }
            if !self.predicate.eval_predicate(&bindings)? {
                for band in 0..bands {
                    out.band_mut(band)[pixel] = f64::NAN;
                }
            }
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        json!({
            "cube_type": "filter_pixel",
            "predicate": self.predicate.source(),
            "in_cube": self.parents()[0].describe(),
        })
    }
}
