use ndarray::{ArrayView4, ArrayViewMut4};

/// Densely packed chunk payload of shape `[bands, time, y, x]`, band major
/// with x innermost. Values are always `f64`; NaN marks missing pixels.
///
/// An empty buffer has no payload and reads as all-NaN.
#[derive(Debug, Clone)]
pub struct ChunkBuffer {
    // Row-major
    data: Box<[f64]>,
    shape: [usize; 4],
}

impl ChunkBuffer {
    pub fn empty() -> Self {
        Self {
            data: Box::from([]),
            shape: [0; 4],
        }
    }

    /// A NaN-filled buffer of the given shape.
    pub fn new(shape: [usize; 4]) -> Self {
        Self::new_filled(shape, f64::NAN)
    }

    pub fn new_filled(shape: [usize; 4], fill: f64) -> Self {
        Self {
            data: vec![fill; shape.iter().product()].into_boxed_slice(),
            shape,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// All values of one band, `[time, y, x]` flattened.
    pub fn band(&self, band: usize) -> &[f64] {
        let stride = self.shape[1] * self.shape[2] * self.shape[3];
        &self.data[band * stride..(band + 1) * stride]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [f64] {
        let stride = self.shape[1] * self.shape[2] * self.shape[3];
        &mut self.data[band * stride..(band + 1) * stride]
    }

    /// One spatial plane, `[y, x]` flattened.
    pub fn plane(&self, band: usize, time: usize) -> &[f64] {
        let plane = self.shape[2] * self.shape[3];
        let start = (band * self.shape[1] + time) * plane;
        &self.data[start..start + plane]
    }

    pub fn plane_mut(&mut self, band: usize, time: usize) -> &mut [f64] {
        let plane = self.shape[2] * self.shape[3];
        let start = (band * self.shape[1] + time) * plane;
        &mut self.data[start..start + plane]
    }

    pub fn at(&self, band: usize, time: usize, y: usize, x: usize) -> f64 {
        self.plane(band, time)[y * self.shape[3] + x]
    }

    pub fn view(&self) -> ArrayView4<'_, f64> {
        let [nb, nt, ny, nx] = self.shape;
        ArrayView4::from_shape((nb, nt, ny, nx), &self.data).unwrap()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut4<'_, f64> {
        let [nb, nt, ny, nx] = self.shape;
        ArrayViewMut4::from_shape((nb, nt, ny, nx), &mut self.data).unwrap()
    }

    pub fn to_owned_parts(self) -> (Box<[f64]>, [usize; 4]) {
        (self.data, self.shape)
    }
}
