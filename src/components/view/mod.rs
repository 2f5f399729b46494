mod chunking;

pub use chunking::{ChunkGrid, ChunkId};

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::{
    components::bounds::SpaceTimeWindow,
    datetime::{TimeDuration, TimePoint},
    errors::{CubeError, Result},
};

/// How the image-collection source fuses images that fall into the same
/// temporal slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    None,
    Mean,
    Min,
    Max,
    Median,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::None => "none",
            AggregationMethod::Mean => "mean",
            AggregationMethod::Min => "min",
            AggregationMethod::Max => "max",
            AggregationMethod::Median => "median",
        }
    }
}

/// The regular spatiotemporal reference frame of a cube: a projected
/// rectangle with a pixel grid and a temporal range stepped by `dt`.
///
/// Row 0 of the pixel grid is the northernmost row (y grows downward in
/// array order, upward in world coordinates); temporal slot 0 starts at
/// `t0` and `nt` counts whole `dt` steps in `[t0, t1]` including `t0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct STReference {
    pub srs: String,
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
    pub nx: usize,
    pub ny: usize,
    pub t0: TimePoint,
    pub t1: TimePoint,
    pub dt: TimeDuration,
}

impl STReference {
    pub fn dx(&self) -> f64 {
        (self.right - self.left) / self.nx as f64
    }

    pub fn dy(&self) -> f64 {
        (self.top - self.bottom) / self.ny as f64
    }

    pub fn nt(&self) -> usize {
        (self.dt.steps_between(&self.t0, &self.t1).max(0) + 1) as usize
    }

    pub fn size(&self) -> [usize; 3] {
        [self.nt(), self.ny, self.nx]
    }

    pub fn space(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.left,
                y: self.bottom,
            },
            Coord {
                x: self.right,
                y: self.top,
            },
        )
    }

    /// Start of temporal slot `it` (may lie past the cube for slot `nt`,
    /// which makes it usable as an exclusive upper bound).
    pub fn time_at(&self, it: usize) -> TimePoint {
        self.t0
            .cast(self.dt.unit)
            .add_units(it as i64 * self.dt.count, self.dt.unit)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.ny == 0 {
            return Err(CubeError::InvalidView(format!(
                "grid size {}x{} must be positive",
                self.nx, self.ny
            )));
        }
        if self.right <= self.left || self.top <= self.bottom {
            return Err(CubeError::InvalidView(format!(
                "extent ({}, {}, {}, {}) is not a rectangle",
                self.left, self.right, self.bottom, self.top
            )));
        }
        if self.dt.count <= 0 {
            return Err(CubeError::InvalidView(format!(
                "temporal step {} must be positive",
                self.dt
            )));
        }
        if self.t1 < self.t0 {
            return Err(CubeError::InvalidView(format!(
                "temporal range ends ({}) before it starts ({})",
                self.t1, self.t0
            )));
        }
        Ok(())
    }

    /// The frame of the same cube reduced over time: a single slot spanning
    /// the whole temporal range.
    pub fn reduced_over_time(&self) -> STReference {
        let mut out = self.clone();
        out.dt = TimeDuration::between(&self.t0, &self.t1);
        out.t1 = out.t0;
        out
    }

    /// The frame of the same cube collapsed to one pixel covering the whole
    /// spatial extent.
    pub fn collapsed_over_space(&self) -> STReference {
        let mut out = self.clone();
        out.nx = 1;
        out.ny = 1;
        out
    }

    /// Space-time box of the whole cube; the temporal end is exclusive.
    pub fn bounds(&self) -> SpaceTimeWindow {
        SpaceTimeWindow::new(self.space(), self.srs.clone(), self.t0, self.time_at(self.nt()))
    }
}

/// An [STReference] plus the labels steering the image-collection source:
/// the temporal aggregation method and the resampling method forwarded to
/// the raster facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeView {
    #[serde(flatten)]
    pub stref: STReference,
    #[serde(default)]
    pub aggregation: AggregationMethod,
    #[serde(default = "default_resampling")]
    pub resampling: String,
}

fn default_resampling() -> String {
    String::from("near")
}

impl CubeView {
    pub fn new(stref: STReference) -> Self {
        Self {
            stref,
            aggregation: AggregationMethod::None,
            resampling: default_resampling(),
        }
    }

    pub fn with_aggregation(mut self, aggregation: AggregationMethod) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_resampling(mut self, resampling: impl Into<String>) -> Self {
        self.resampling = resampling.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::TimeUnit;

    pub(crate) fn daily_ref(nx: usize, ny: usize, days: usize) -> STReference {
        STReference {
            srs: String::from("EPSG:32633"),
            left: 300000.0,
            right: 300000.0 + nx as f64 * 10.0,
            bottom: 5000000.0,
            top: 5000000.0 + ny as f64 * 10.0,
            nx,
            ny,
            t0: "2020-01-01".parse().unwrap(),
            t1: format!("2020-01-{:02}", days).parse().unwrap(),
            dt: TimeDuration::new(1, TimeUnit::Day),
        }
    }

    #[test]
    fn derived_quantities() {
        let stref = daily_ref(100, 50, 8);
        assert_eq!(stref.dx(), 10.0);
        assert_eq!(stref.dy(), 10.0);
        assert_eq!(stref.nt(), 8);
        assert_eq!(stref.size(), [8, 50, 100]);
        assert_eq!(stref.time_at(3).to_string(), "2020-01-04");
        stref.validate().unwrap();
    }

    #[test]
    fn nt_counts_partial_steps() {
        let mut stref = daily_ref(10, 10, 8);
        stref.dt = TimeDuration::new(3, TimeUnit::Day);
        // slots start at day 1, 4, 7; day 8 still falls into the third slot
        assert_eq!(stref.nt(), 3);
    }

    #[test]
    fn reduced_frame_has_single_slot() {
        let out = daily_ref(10, 10, 8).reduced_over_time();
        assert_eq!(out.nt(), 1);
        assert_eq!(out.dt, TimeDuration::new(7, TimeUnit::Day));
        assert_eq!(out.t0, out.t1);
    }

    #[test]
    fn collapsed_frame_keeps_extent() {
        let stref = daily_ref(10, 20, 2);
        let out = stref.collapsed_over_space();
        assert_eq!((out.nx, out.ny), (1, 1));
        assert_eq!(out.dx(), stref.dx() * 10.0);
        assert_eq!(out.dy(), stref.dy() * 20.0);
    }

    #[test]
    fn view_serde_round_trip() {
        let view = CubeView::new(daily_ref(10, 10, 8))
            .with_aggregation(AggregationMethod::Mean)
            .with_resampling("bilinear");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["aggregation"], "mean");
        assert_eq!(json["dt"], "P1D");
        assert_eq!(json["t0"], "2020-01-01");
        let back: CubeView = serde_json::from_value(json).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn invalid_frames_are_rejected() {
        let mut stref = daily_ref(10, 10, 8);
        stref.right = stref.left;
        assert!(stref.validate().is_err());
        let mut stref = daily_ref(10, 10, 8);
        stref.dt = TimeDuration::new(0, TimeUnit::Day);
        assert!(stref.validate().is_err());
    }
}
