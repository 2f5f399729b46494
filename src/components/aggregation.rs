use std::collections::HashMap;

use crate::{
    buffer::ChunkBuffer,
    components::view::AggregationMethod,
    errors::{CubeError, Result},
};

/// State machine fusing overlapping images into the temporal slots of one
/// chunk, keyed by `(band, slot)`.
///
/// The chunk starts out all-NaN; `update` folds one warped image plane into
/// a slot, `finalize` drops auxiliary state. Non-finite input pixels are
/// skipped everywhere except in last-writer-wins mode, which copies planes
/// verbatim and is therefore the only order-sensitive mode.
pub enum TemporalAggregator {
    None,
    Min,
    Max,
    Mean {
        counts: HashMap<(usize, usize), Box<[u32]>>,
    },
}

impl TemporalAggregator {
    /// Median has no incremental form and is rejected here; reduce over
    /// time instead.
    pub fn new(method: AggregationMethod) -> Result<Self> {
        match method {
            AggregationMethod::None => Ok(TemporalAggregator::None),
            AggregationMethod::Min => Ok(TemporalAggregator::Min),
            AggregationMethod::Max => Ok(TemporalAggregator::Max),
            AggregationMethod::Mean => Ok(TemporalAggregator::Mean {
                counts: HashMap::new(),
            }),
            AggregationMethod::Median => Err(CubeError::UnsupportedAggregation(
                AggregationMethod::Median.as_str().to_string(),
            )),
        }
    }

    pub fn update(&mut self, chunk: &mut ChunkBuffer, plane: &[f64], band: usize, slot: usize) {
        let cells = chunk.plane_mut(band, slot);
        match self {
            TemporalAggregator::None => cells.copy_from_slice(plane),
            TemporalAggregator::Min => {
                for (cell, value) in cells.iter_mut().zip(plane) {
                    if value.is_finite() {
                        *cell = if cell.is_nan() { *value } else { cell.min(*value) };
                    }
                }
            }
            TemporalAggregator::Max => {
                for (cell, value) in cells.iter_mut().zip(plane) {
                    if value.is_finite() {
                        *cell = if cell.is_nan() { *value } else { cell.max(*value) };
                    }
                }
            }
            TemporalAggregator::Mean { counts } => {
                let counts = counts
                    .entry((band, slot))
                    .or_insert_with(|| vec![0u32; plane.len()].into_boxed_slice());
                for ((cell, value), n) in cells.iter_mut().zip(plane).zip(counts.iter_mut()) {
                    if value.is_finite() {
                        if *n == 0 {
                            *cell = *value;
                            *n = 1;
                        } else {
                            *n += 1;
                            *cell += (*value - *cell) / f64::from(*n);
                        }
                    }
                }
            }
        }
    }

    pub fn finalize(&mut self, _chunk: &mut ChunkBuffer) {
        if let TemporalAggregator::Mean { counts } = self {
            counts.clear();
        }
    }
}
