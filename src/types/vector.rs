use std::ops::{Index, Sub};

/// A fixed-width vector of 32-bit floats.
///
/// Distance between two vectors is always squared Euclidean distance; the
/// core never compares vectors under any other metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector(pub Vec<f32>);

impl Vector {
    /// Dimension of the vector.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the vector has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Squared Euclidean distance to another vector of the same dimension.
    pub fn sq_distance(&self, other: &Vector) -> f32 {
        debug_assert_eq!(self.len(), other.len());
        self.0.iter().zip(other.0.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
    }

    /// Returns a new vector containing a contiguous slice of this one.
    pub fn slice(&self, start: usize, end: usize) -> Vector {
        Vector(self.0[start..end].to_vec())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Sub for &Vector {
    type Output = Vector;

    fn sub(self, other: &Vector) -> Vector {
        debug_assert_eq!(self.len(), other.len());
        let out = self.0.iter().zip(other.0.iter()).map(|(a, b)| a - b).collect();
        Vector(out)
    }
}

impl From<Vec<f32>> for Vector {
    fn from(v: Vec<f32>) -> Self {
        Vector(v)
    }
}

impl From<Vector> for Vec<f32> {
    fn from(v: Vector) -> Self {
        v.0
    }
}

/// A row-major matrix of f32 vectors, all sharing the same dimension.
///
/// Used for sample matrices fed to the K-Means trainer, for base/train/query
/// sets read from fvecs files, and for centroid sets.
#[derive(Debug, Clone)]
pub struct Matrix {
    rows: Vec<Vector>,
    dim: usize,
}

impl Matrix {
    /// Builds a matrix from rows, all of which must share a dimension.
    pub fn from_rows(rows: Vec<Vector>) -> Self {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        Matrix { rows, dim }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Shared dimension of every row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> &[Vector] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &Vector {
        &self.rows[i]
    }

    pub fn into_rows(self) -> Vec<Vector> {
        self.rows
    }

    /// Extracts the column-wise subspace block `[start, end)` of every row
    /// into a fresh matrix, used to split a vector into PQ subvectors.
    pub fn sub_block(&self, start: usize, end: usize) -> Matrix {
        let rows = self.rows.iter().map(|r| r.slice(start, end)).collect();
        Matrix { rows, dim: end - start }
    }
}

impl Index<usize> for Matrix {
    type Output = Vector;
    fn index(&self, i: usize) -> &Vector {
        &self.rows[i]
    }
}

/// A PQ code: one small unsigned integer per subquantizer.
///
/// Packed as one byte per subcode, which is sufficient whenever K_s <= 256
/// and is the only layout this crate supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PqCode(pub Box<[u8]>);

impl PqCode {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PqCode {
    fn from(v: Vec<u8>) -> Self {
        PqCode(v.into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sq_distance_basic() {
        let a = Vector::from(vec![0.0, 0.0]);
        let b = Vector::from(vec![3.0, 4.0]);
        assert_eq!(a.sq_distance(&b), 25.0);
    }

    #[test]
    fn residual_subtraction() {
        let a = Vector::from(vec![5.0, 6.0]);
        let b = Vector::from(vec![1.0, 2.0]);
        let r = &a - &b;
        assert_eq!(r.as_slice(), &[4.0, 4.0]);
    }

    #[test]
    fn matrix_sub_block() {
        let m = Matrix::from_rows(vec![
            Vector::from(vec![1.0, 2.0, 3.0, 4.0]),
            Vector::from(vec![5.0, 6.0, 7.0, 8.0]),
        ]);

        let block = m.sub_block(2, 4);
        assert_eq!(block.dim(), 2);
        assert_eq!(block.row(0).as_slice(), &[3.0, 4.0]);
        assert_eq!(block.row(1).as_slice(), &[7.0, 8.0]);
    }
}
