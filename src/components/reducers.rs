use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    buffer::ChunkBuffer,
    errors::CubeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReducerKind {
    Sum,
    Prod,
    Count,
    Min,
    Max,
    Mean,
    Median,
    Var,
    Sd,
}

impl ReducerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReducerKind::Sum => "sum",
            ReducerKind::Prod => "prod",
            ReducerKind::Count => "count",
            ReducerKind::Min => "min",
            ReducerKind::Max => "max",
            ReducerKind::Mean => "mean",
            ReducerKind::Median => "median",
            ReducerKind::Var => "var",
            ReducerKind::Sd => "sd",
        }
    }
}

impl fmt::Display for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReducerKind {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" => Ok(ReducerKind::Sum),
            "prod" => Ok(ReducerKind::Prod),
            "count" => Ok(ReducerKind::Count),
            "min" => Ok(ReducerKind::Min),
            "max" => Ok(ReducerKind::Max),
            "mean" => Ok(ReducerKind::Mean),
            "median" => Ok(ReducerKind::Median),
            "var" => Ok(ReducerKind::Var),
            "sd" => Ok(ReducerKind::Sd),
            other => Err(CubeError::UnknownReducer(other.to_string())),
        }
    }
}

/// Bands of a reduced cube keep their name once the reduced axis is already
/// collapsed; otherwise the reducer name is appended.
pub fn reduced_band_name(band: &str, kind: ReducerKind, already_reduced: bool) -> String {
    if already_reduced {
        band.to_string()
    } else {
        format!("{band}_{kind}")
    }
}

/// Three-phase state machine collapsing one axis of one band.
///
/// `init` seeds the output band, `combine_over_*` folds an input chunk cell
/// by cell, `finalize` post-processes and releases auxiliary buffers. A cell
/// is a spatial pixel when reducing over time and a temporal slot when
/// reducing over space; either way the output band holds exactly `cells`
/// accumulators. Non-finite inputs are skipped.
pub struct BandReducer {
    kind: ReducerKind,
    band_in: usize,
    band_out: usize,
    counts: Box<[u32]>,
    means: Box<[f64]>,
    buckets: Vec<Vec<f64>>,
}

impl BandReducer {
    pub fn new(kind: ReducerKind, band_in: usize, band_out: usize, cells: usize) -> Self {
        let counts = match kind {
            ReducerKind::Mean | ReducerKind::Var | ReducerKind::Sd => {
                vec![0u32; cells].into_boxed_slice()
            }
            _ => Box::from([]),
        };
        let means = match kind {
            ReducerKind::Var | ReducerKind::Sd => vec![0.0; cells].into_boxed_slice(),
            _ => Box::from([]),
        };
        let buckets = match kind {
            ReducerKind::Median => vec![Vec::new(); cells],
            _ => Vec::new(),
        };
        Self {
            kind,
            band_in,
            band_out,
            counts,
            means,
            buckets,
        }
    }

    pub fn init(&self, out: &mut ChunkBuffer) {
        let seed = match self.kind {
            ReducerKind::Sum
            | ReducerKind::Count
            | ReducerKind::Mean
            | ReducerKind::Var
            | ReducerKind::Sd => 0.0,
            ReducerKind::Prod => 1.0,
            ReducerKind::Min | ReducerKind::Max | ReducerKind::Median => f64::NAN,
        };
        out.band_mut(self.band_out).fill(seed);
    }

    fn feed(&mut self, cell: usize, acc: &mut f64, value: f64) {
        if !value.is_finite() {
            return;
        }
        match self.kind {
            ReducerKind::Sum => *acc += value,
            ReducerKind::Prod => *acc *= value,
            ReducerKind::Count => *acc += 1.0,
            ReducerKind::Min => *acc = if acc.is_nan() { value } else { acc.min(value) },
            ReducerKind::Max => *acc = if acc.is_nan() { value } else { acc.max(value) },
            ReducerKind::Mean => {
                *acc += value;
                self.counts[cell] += 1;
            }
            ReducerKind::Var | ReducerKind::Sd => {
                let n = &mut self.counts[cell];
                *n += 1;
                let mean = &mut self.means[cell];
                let delta = value - *mean;
                *mean += delta / f64::from(*n);
                *acc += delta * (value - *mean);
            }
            ReducerKind::Median => self.buckets[cell].push(value),
        }
    }

    /// Fold an input chunk that shares the output's spatial window; every
    /// spatial pixel is one cell.
    pub fn combine_over_time(&mut self, out: &mut ChunkBuffer, input: &ChunkBuffer) {
        if input.is_empty() {
            return;
        }
        let [_, st, _, _] = input.shape();
        let accumulators = out.band_mut(self.band_out);
        for it in 0..st {
            for (cell, value) in input.plane(self.band_in, it).iter().enumerate() {
                self.feed(cell, &mut accumulators[cell], *value);
            }
        }
    }

    /// Fold an input chunk that shares the output's time window; every
    /// temporal slot is one cell.
    pub fn combine_over_space(&mut self, out: &mut ChunkBuffer, input: &ChunkBuffer) {
        if input.is_empty() {
            return;
        }
        let [_, st, _, _] = input.shape();
        let accumulators = out.band_mut(self.band_out);
        for it in 0..st {
            let acc = &mut accumulators[it];
            for value in input.plane(self.band_in, it) {
                self.feed(it, acc, *value);
            }
        }
    }

    pub fn finalize(&mut self, out: &mut ChunkBuffer) {
        let accumulators = out.band_mut(self.band_out);
        match self.kind {
            ReducerKind::Mean => {
                for (cell, acc) in accumulators.iter_mut().enumerate() {
                    let n = self.counts[cell];
                    *acc = if n > 0 { *acc / f64::from(n) } else { f64::NAN };
                }
            }
            ReducerKind::Var => {
                for (cell, acc) in accumulators.iter_mut().enumerate() {
                    let n = self.counts[cell];
                    *acc = if n > 1 { *acc / f64::from(n - 1) } else { f64::NAN };
                }
            }
            ReducerKind::Sd => {
                for (cell, acc) in accumulators.iter_mut().enumerate() {
                    let n = self.counts[cell];
                    *acc = if n > 1 {
                        (*acc / f64::from(n - 1)).sqrt()
                    } else {
                        f64::NAN
                    };
                }
            }
            ReducerKind::Median => {
                for (cell, acc) in accumulators.iter_mut().enumerate() {
                    *acc = median_of(&mut self.buckets[cell]);
                }
            }
            _ => {}
        }
        self.counts = Box::from([]);
        self.means = Box::from([]);
        self.buckets = Vec::new();
    }
}

/// Middle element, or the average of the two middle elements. NaN when
/// nothing was collected.
pub(crate) fn median_of(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reducer_names_parse_both_ways() {
        for name in ["sum", "prod", "count", "min", "max", "mean", "median", "var", "sd"] {
            assert_eq!(name.parse::<ReducerKind>().unwrap().as_str(), name);
        }
        assert!(matches!(
            "quantile".parse::<ReducerKind>(),
            Err(CubeError::UnknownReducer(_))
        ));
    }

    #[test]
    fn band_naming_skips_reduced_inputs() {
        assert_eq!(reduced_band_name("B04", ReducerKind::Mean, false), "B04_mean");
        assert_eq!(reduced_band_name("B04", ReducerKind::Mean, true), "B04");
    }

    #[test]
    fn median_of_even_and_odd_sets() {
        assert_eq!(median_of(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_of(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median_of(&mut []).is_nan());
    }

    #[test]
    fn empty_input_chunks_do_not_contribute() {
        let mut out = ChunkBuffer::new([1, 1, 1, 1]);
        let mut reducer = BandReducer::new(ReducerKind::Count, 0, 0, 1);
        reducer.init(&mut out);
        reducer.combine_over_time(&mut out, &ChunkBuffer::empty());
        reducer.finalize(&mut out);
        assert_eq!(out.at(0, 0, 0, 0), 0.0);
    }
}
