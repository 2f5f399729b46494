use serde::{Deserialize, Serialize};

/// Per-image mask applied by the image-collection source: wherever the
/// mask band fires, every band of the image is set to NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mask_type", rename_all = "snake_case")]
pub enum ImageMask {
    ValueMask {
        values: Vec<f64>,
        #[serde(default)]
        invert: bool,
    },
    RangeMask {
        min: f64,
        max: f64,
        #[serde(default)]
        invert: bool,
    },
}

impl ImageMask {
    pub fn values(values: impl Into<Vec<f64>>, invert: bool) -> Self {
        ImageMask::ValueMask {
            values: values.into(),
            invert,
        }
    }

    pub fn range(min: f64, max: f64, invert: bool) -> Self {
        ImageMask::RangeMask { min, max, invert }
    }

    pub fn fires(&self, value: f64) -> bool {
        match self {
            ImageMask::ValueMask { values, invert } => {
                values.iter().any(|m| *m == value) != *invert
            }
            ImageMask::RangeMask { min, max, invert } => {
                (value >= *min && value <= *max) != *invert
            }
        }
    }

    /// Blanks all `nb` band planes of `planes` wherever the mask band
    /// fires. `mask_plane` and each band plane hold `ny * nx` pixels.
    pub fn apply(&self, mask_plane: &[f64], planes: &mut [f64], nb: usize) {
        let pixels = mask_plane.len();
        for (ixy, mask_value) in mask_plane.iter().enumerate() {
            if self.fires(*mask_value) {
                for ib in 0..nb {
                    planes[ib * pixels + ixy] = f64::NAN;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_mask_blanks_all_bands() {
        let mask = ImageMask::values([3.0, 8.0], false);
        let mask_plane = [3.0, 1.0, 8.0, 2.0];
        let mut planes = vec![1.0; 8];
        mask.apply(&mask_plane, &mut planes, 2);
        assert!(planes[0].is_nan() && planes[4].is_nan());
        assert!(planes[2].is_nan() && planes[6].is_nan());
        assert_eq!(planes[1], 1.0);
        assert_eq!(planes[3], 1.0);
    }

    #[test]
    fn inverted_value_mask_keeps_listed_values() {
        let mask = ImageMask::values([1.0], true);
        assert!(!mask.fires(1.0));
        assert!(mask.fires(2.0));
        // NaN never equals a listed value, so it fires when inverted
        assert!(mask.fires(f64::NAN));
    }

    #[test]
    fn range_mask_boundaries_are_inclusive() {
        let mask = ImageMask::range(2.0, 4.0, false);
        assert!(mask.fires(2.0));
        assert!(mask.fires(4.0));
        assert!(!mask.fires(4.5));
        let inverted = ImageMask::range(2.0, 4.0, true);
        assert!(inverted.fires(4.5));
        assert!(!inverted.fires(3.0));
    }

    #[test]
    fn serde_round_trip_keeps_tag() {
        let mask = ImageMask::range(0.0, 1.0, true);
        let json = serde_json::to_value(&mask).unwrap();
        assert_eq!(json["mask_type"], "range_mask");
        assert_eq!(serde_json::from_value::<ImageMask>(json).unwrap(), mask);
    }
}
