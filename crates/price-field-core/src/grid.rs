use crate::spatial::CellIndex;

/// Square `resolution × resolution` grid of scalar cells.
/// Stored row-major with the x-bin as the row: `data[i * resolution + j]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    resolution: usize,
    data: Vec<f64>,
}

impl Grid {
    pub fn filled(resolution: usize, value: f64) -> Self {
        Self {
            resolution,
            data: vec![value; resolution * resolution],
        }
    }

    /// Build a grid from row-major data. Returns `None` if the length is not `resolution²`.
    pub fn from_vec(resolution: usize, data: Vec<f64>) -> Option<Self> {
        (data.len() == resolution * resolution).then_some(Self { resolution, data })
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn get(&self, cell: CellIndex) -> f64 {
        self.data[self.offset(cell)]
    }

    pub fn set(&mut self, cell: CellIndex, value: f64) {
        let offset = self.offset(cell);
        self.data[offset] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks(self.resolution)
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.rows().map(<[f64]>::to_vec).collect()
    }

    /// Element-wise `max` with another grid of the same shape.
    pub(crate) fn merge_max(&mut self, other: &Grid) {
        debug_assert_eq!(self.resolution, other.resolution);
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a = a.max(b);
        }
    }

    /// Element-wise `min` with another grid of the same shape.
    pub(crate) fn merge_min(&mut self, other: &Grid) {
        debug_assert_eq!(self.resolution, other.resolution);
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a = a.min(b);
        }
    }

    fn offset(&self, cell: CellIndex) -> usize {
        debug_assert!(cell.i < self.resolution && cell.j < self.resolution);
        cell.i * self.resolution + cell.j
    }
}
