use std::sync::Arc;

use log::debug;
use serde_json::json;

use crate::{
    buffer::ChunkBuffer,
    components::{
        bands::BandCollection,
        cube::{connect_to_parents, Cube, CubeCore},
        reducers::{median_of, ReducerKind},
        view::ChunkId,
    },
    errors::{CubeError, Result},
};

enum WindowFunction {
    /// Dot product with an explicit kernel of length `left + right + 1`.
    Kernel(Vec<f64>),
    /// A reducer per output band, applied to the window values.
    Reducers(Vec<(ReducerKind, String)>),
}

/// Combines, for every output time step, the input values in the moving
/// window `[t - left, t + right]`. Geometry is unchanged; slots outside the
/// cube count as NaN.
pub struct WindowTimeCube {
    core: CubeCore,
    window: (usize, usize),
    function: WindowFunction,
}

impl WindowTimeCube {
    pub fn create_kernel(
        in_cube: Arc<dyn Cube>,
        kernel: Vec<f64>,
        left: usize,
        right: usize,
    ) -> Result<Arc<Self>> {
        if kernel.len() != left + right + 1 {
            return Err(CubeError::InvalidDescription(format!(
                "kernel of length {} does not cover a window of {}",
                kernel.len(),
                left + right + 1
            )));
        }
        Self::create(in_cube, WindowFunction::Kernel(kernel), left, right)
    }

    pub fn create_reducers(
        in_cube: Arc<dyn Cube>,
        reducer_bands: Vec<(ReducerKind, String)>,
        left: usize,
        right: usize,
    ) -> Result<Arc<Self>> {
        Self::create(in_cube, WindowFunction::Reducers(reducer_bands), left, right)
    }

    fn create(
        in_cube: Arc<dyn Cube>,
        function: WindowFunction,
        left: usize,
        right: usize,
    ) -> Result<Arc<Self>> {
        let bands = match &function {
            WindowFunction::Kernel(_) => in_cube.bands().clone(),
            WindowFunction::Reducers(reducer_bands) => {
                let mut bands = BandCollection::new();
                for (kind, name) in reducer_bands {
                    let band = in_cube.bands().require_band(name)?;
                    bands.add(band.renamed(format!("{name}_{kind}")))?;
                }
                bands
            }
        };
        let core = CubeCore::new(
            in_cube.st_ref().clone(),
            bands,
            in_cube.chunk_size(),
            vec![in_cube],
        );
        let out = Arc::new(Self {
            core,
            window: (left, right),
            function,
        });
        let as_cube: Arc<dyn Cube> = out.clone();
        connect_to_parents(&as_cube);
        Ok(out)
    }

    /// Input time slots `[offset - left, offset + st - 1 + right]`,
    /// NaN-padded beyond the cube, gathered from the neighbor chunks.
    fn gather_window(
        &self,
        offset_t: usize,
        [cy, cx]: [usize; 2],
        shape: [usize; 4],
    ) -> Result<ChunkBuffer> {
        let (left, right) = self.window;
        let input = &self.parents()[0];
        let nb_in = input.bands().count();
        let nt = input.st_ref().nt();
        let cs_t = input.chunk_size()[0];
        let lo = offset_t as i64 - left as i64;
        let hi = (offset_t + shape[1] - 1 + right) as i64;
        let mut extended = ChunkBuffer::new([nb_in, (hi - lo + 1) as usize, shape[2], shape[3]]);

        let ct_lo = (lo.max(0) as usize) / cs_t;
        let ct_hi = (hi.min(nt as i64 - 1).max(0) as usize) / cs_t;
        for ct in ct_lo..=ct_hi {
            let chunk = input.read_chunk(input.grid().id_of([ct, cy, cx]))?;
            if chunk.is_empty() {
                continue;
            }
            for local_t in 0..chunk.shape()[1] {
                let slot = (ct * cs_t + local_t) as i64 - lo;
                if slot < 0 || slot >= extended.shape()[1] as i64 {
                    continue;
                }
                for band in 0..nb_in {
                    extended
                        .plane_mut(band, slot as usize)
                        .copy_from_slice(chunk.plane(band, local_t));
                }
            }
        }
        Ok(extended)
    }
}

impl Cube for WindowTimeCube {
    fn core(&self) -> &CubeCore {
        &self.core
    }

    fn read_chunk(&self, id: ChunkId) -> Result<ChunkBuffer> {
        debug!("window_time_cube read_chunk({id})");
        let Some([_, cy, cx]) = self.grid().coords_of(id) else {
            return Ok(ChunkBuffer::empty());
        };
        let offset_t = self.grid().offset_of(id).expect("id in range")[0];
        let shape = self.buffer_shape_of_chunk(id);
        let extended = self.gather_window(offset_t, [cy, cx], shape)?;
        let (left, right) = self.window;
        let span = left + right + 1;
        let pixels = shape[2] * shape[3];
        let mut out = ChunkBuffer::new(shape);

        match &self.function {
            WindowFunction::Kernel(kernel) => {
                for band in 0..shape[0] {
                    for t in 0..shape[1] {
                        for pixel in 0..pixels {
                            let mut acc = 0.0;
                            for (k, weight) in kernel.iter().enumerate() {
                                acc += weight * extended.plane(band, t + k)[pixel];
                            }
                            out.plane_mut(band, t)[pixel] = acc;
                        }
                    }
                }
            }
            WindowFunction::Reducers(reducer_bands) => {
                let input_bands = self.parents()[0].bands();
                let mut window = vec![0.0; span];
                for (band_out, (kind, name)) in reducer_bands.iter().enumerate() {
                    let band_in = input_bands.require(name)?;
                    for t in 0..shape[1] {
                        for pixel in 0..pixels {
                            for k in 0..span {
                                window[k] = extended.plane(band_in, t + k)[pixel];
                            }
                            out.plane_mut(band_out, t)[pixel] = scalar_reduce(*kind, &window);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn describe(&self) -> serde_json::Value {
        let mut out = json!({
            "cube_type": "window_time",
            "win_size_l": self.window.0,
            "win_size_r": self.window.1,
            "in_cube": self.parents()[0].describe(),
        });
        match &self.function {
            WindowFunction::Kernel(kernel) => out["kernel"] = json!(kernel),
            WindowFunction::Reducers(reducer_bands) => {
                out["reducer_bands"] =
                    serde_json::to_value(reducer_bands).expect("reducers serialize");
            }
        }
        out
    }
}

/// One reducer evaluation over a small window of values; non-finite values
/// are skipped.
fn scalar_reduce(kind: ReducerKind, values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();
    match kind {
        ReducerKind::Sum => finite.iter().sum(),
        ReducerKind::Prod => finite.iter().product(),
        ReducerKind::Count => n as f64,
        ReducerKind::Min => finite.iter().copied().fold(f64::NAN, f64::min),
        ReducerKind::Max => finite.iter().copied().fold(f64::NAN, f64::max),
        ReducerKind::Mean => {
            if n == 0 {
                f64::NAN
            } else {
                finite.iter().sum::<f64>() / n as f64
            }
        }
        ReducerKind::Median => median_of(&mut finite),
        ReducerKind::Var | ReducerKind::Sd => {
            if n < 2 {
                return f64::NAN;
            }
            let mean = finite.iter().sum::<f64>() / n as f64;
            let var = finite.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1) as f64;
            if kind == ReducerKind::Sd {
                var.sqrt()
            } else {
                var
            }
        }
    }
}
