use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::{Band, BandCollection},
        cube::{connect_to_parents, Cube, CubeCore},
        view::ChunkId,
    },
    errors::{CubeError, Result},
    expression::{PixelBindings, PixelExpr},
};

/// Evaluates one arithmetic expression per output band over the parent's
/// band values, pixel by pixel. Geometry is unchanged.
pub struct ApplyPixelCube {
    core: CubeCore,
    expressions: Vec<PixelExpr>,
    /// `(band name, parent band index)` pairs referenced by any expression.
    inputs: Vec<(String, usize)>,
    explicit_names: Option<Vec<String>>,
}

impl ApplyPixelCube {
    /// Output bands are named `band1..bandN` unless `band_names` overrides
    /// them.
    pub fn create(
        in_cube: Arc<dyn Cube>,
        expressions: Vec<String>,
        band_names: Option<Vec<String>>,
    ) -> Result<Arc<Self>> {
        if let Some(names) = &band_names {
            if names.len() != expressions.len() {
                return Err(CubeError::InvalidDescription(format!(
                    "{} band names given for {} expressions",
                    names.len(),
                    expressions.len()
                )));
            }
        }
        let parent_names = in_cube.bands().names();
        let compiled = expressions
            .iter()
            .map(|source| PixelExpr::compile(source, &parent_names))
            .collect::<std::result::Result<Vec<PixelExpr>, _>>()?;

        let mut inputs: Vec<(String, usize)> = Vec::new();
        for expression in &compiled {
            for name in expression.variables() {
                if !inputs.iter().any(|(seen, _)| seen == name) {
                    inputs.push((name.clone(), in_cube.bands().require(name)?));
                }
            }
        }

        let mut bands = BandCollection::new();
        for (index, _) in compiled.iter().enumerate() {
            let name = match &band_names {
                Some(names) => names[index].clone(),
                None => format!("band{}", index + 1),
            };
            bands.add(Band::new(name))?;
        }

        let core = CubeCore::new(
            in_cube.st_ref().clone(),
            bands,
            in_cube.chunk_size(),
            vec![in_cube],
        );
        let out = Arc::new(Self {
            core,
            expressions: compiled,
            inputs,
            explicit_names: band_names,
        });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }
}

impl Cube for ApplyPixelCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("apply_pixel_cube read_chunk({id})");
        if !self.grid().contains(id) {
            return Ok(ChunkBuffer::empty());
        }
        let chunk = self.parents()[0].read_chunk(id)?;
        if chunk.is_empty() {
            // expressions over all-NaN input stay all-NaN
            return Ok(ChunkBuffer::empty());
        }
        let mut out = ChunkBuffer::new(self.buffer_shape_of_chunk(id));
        let pixels = chunk.band(0).len();
        let mut bindings = PixelBindings::new();
        for pixel in 0..pixels {
            for (name, band_in) in &self.inputs {
                bindings.set(name, chunk.band(*band_in)[pixel])?;
            }
            for (band_out, expression) in self.expressions.iter().enumerate() {
                out.band_mut(band_out)[pixel] = expression.eval(&bindings)?;
            }
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        let mut out = json!({
            "cube_type": "apply_pixel",
            "expr": self.expressions.iter().map(PixelExpr::source).collect::<Vec<_>>(),
            "in_cube": self.parents()[0].describe(),
        });
        if let Some(names) = &self.explicit_names {
            out["band_names"] = json!(names);
        }
        out
    }
}
