use std::fmt;

use geo::Rect;

use crate::datetime::TimePoint;

/// A projected rectangle plus a half-open time interval `[t0, t1)`.
///
/// Produced by `bounds_from_chunk` and consumed by catalog queries and warp
/// requests.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceTimeWindow {
    pub space: Rect<f64>,
    pub srs: String,
    pub t0: TimePoint,
    pub t1: TimePoint,
}

impl SpaceTimeWindow {
    pub fn new(space: Rect<f64>, srs: impl Into<String>, t0: TimePoint, t1: TimePoint) -> Self {
        Self {
            space,
            srs: srs.into(),
            t0,
            t1,
        }
    }

    pub fn left(&self) -> f64 {
        self.space.min().x
    }

    pub fn right(&self) -> f64 {
        self.space.max().x
    }

    pub fn bottom(&self) -> f64 {
        self.space.min().y
    }

    pub fn top(&self) -> f64 {
        self.space.max().y
    }
}

impl fmt::Display for SpaceTimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] x [{}, {}] ({}) from {} to {}",
            self.left(),
            self.right(),
            self.bottom(),
            self.top(),
            self.srs,
            self.t0,
            self.t1
        )
    }
}
