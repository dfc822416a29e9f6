use crate::ml::KMeans;
use crate::types::{Error, Matrix, PqCode, Result, Vector};
use rayon::prelude::*;

/// Product quantizer: splits R^D into `M` equal-width subspaces and holds
/// one K-Means model of `K_s` centroids per subspace.
#[derive(Debug)]
pub struct ProductQuantizer {
    num_subquantizers: usize,
    num_centroids: usize,
    max_iterations: usize,
    seed: u64,
    dim: usize,
    sub_dim: usize,
    models: Vec<KMeans>,
}

impl ProductQuantizer {
    pub fn new(
        num_subquantizers: usize,
        num_centroids: usize,
        max_iterations: usize,
        seed: u64,
    ) -> Self {
        Self {
            num_subquantizers,
            num_centroids,
            max_iterations,
            seed,
            dim: 0,
            sub_dim: 0,
            models: Vec::new(),
        }
    }

    /// Trains the `M` subquantizers on `x`, a matrix of N x D values (in
    /// practice, coarse-assignment residuals). Fails with `InvalidArgument`
    /// when D is not divisible by M.
    pub fn train(&mut self, x: &Matrix) -> Result<()> {
        let dim = x.dim();
        let m = self.num_subquantizers;

        if m == 0 || dim % m != 0 {
            return Err(Error::invalid_argument(format!(
                "Dimension {dim} is not divisible by the number of subquantizers {m}."
            )));
        }

        self.dim = dim;
        self.sub_dim = dim / m;

        let seed = self.seed;
        let k = self.num_centroids;
        let max_iter = self.max_iterations;
        let sub_dim = self.sub_dim;

        let models = (0..m)
            .into_par_iter()
            .map(|i| {
                let block = x.sub_block(i * sub_dim, (i + 1) * sub_dim);
                let mut model = KMeans::new(k, max_iter, seed + i as u64);
                model.fit(&block)?;
                Ok(model)
            })
            .collect::<Result<Vec<KMeans>>>()?;

        self.models = models;
        Ok(())
    }

    /// Number of subquantizers, `M`.
    pub fn num_subquantizers(&self) -> usize {
        self.num_subquantizers
    }

    /// Number of centroids per subquantizer, `K_s`.
    pub fn num_centroids(&self) -> usize {
        self.num_centroids
    }

    /// Encodes `v` into an M-tuple of small integer codes.
    pub fn encode(&self, v: &Vector) -> PqCode {
        let codes: Vec<u8> = (0..self.num_subquantizers)
            .map(|i| {
                let sub = v.slice(i * self.sub_dim, (i + 1) * self.sub_dim);
                self.models[i].nearest_centroid(&sub) as u8
            })
            .collect();

        PqCode::from(codes)
    }

    /// Vectorized form of [`ProductQuantizer::encode`].
    pub fn encode_many(&self, vectors: &Matrix) -> Vec<PqCode> {
        vectors.rows().par_iter().map(|v| self.encode(v)).collect()
    }

    /// Reconstructs a D-vector approximation of the original input from a
    /// code. Used for diagnostics only; never on the search hot path.
    pub fn decode(&self, code: &PqCode) -> Vector {
        let mut out = Vec::with_capacity(self.dim);
        for (i, &subcode) in code.as_slice().iter().enumerate() {
            let centroid = &self.models[i].centroids()[subcode as usize];
            out.extend_from_slice(centroid.as_slice());
        }
        Vector::from(out)
    }

    /// Builds per-subspace distance lookup tables against `q_residual`:
    /// `tables[m][k]` is the squared distance between the m-th slice of
    /// `q_residual` and the k-th centroid of subquantizer `m`.
    pub fn build_tables(&self, q_residual: &Vector) -> Vec<Vec<f32>> {
        (0..self.num_subquantizers)
            .map(|i| {
                let sub = q_residual.slice(i * self.sub_dim, (i + 1) * self.sub_dim);
                self.models[i]
                    .centroids()
                    .iter()
                    .map(|centroid| centroid.sq_distance(&sub))
                    .collect()
            })
            .collect()
    }

    /// Scores a code against precomputed tables: `sum_m tables[m][code[m]]`.
    pub fn score(tables: &[Vec<f32>], code: &PqCode) -> f32 {
        score_slice(tables, code.as_slice())
    }

    /// Builds a quantizer directly from previously-trained per-subspace
    /// centroid sets, used when reconstructing an engine from a persisted
    /// index.
    pub fn from_centroids(
        num_subquantizers: usize,
        num_centroids: usize,
        dim: usize,
        sub_centroids: Vec<Vec<Vector>>,
    ) -> Self {
        let sub_dim = if num_subquantizers == 0 { 0 } else { dim / num_subquantizers };
        let models = sub_centroids.into_iter().map(KMeans::from_centroids).collect();

        Self {
            num_subquantizers,
            num_centroids,
            max_iterations: 0,
            seed: 0,
            dim,
            sub_dim,
            models,
        }
    }

    /// Centroid sets for every subquantizer, in subspace order.
    pub fn sub_centroids(&self) -> Vec<&[Vector]> {
        self.models.iter().map(|m| m.centroids()).collect()
    }
}

/// Scores a raw code slice against precomputed tables.
pub fn score_slice(tables: &[Vec<f32>], code: &[u8]) -> f32 {
    code.iter().enumerate().map(|(m, &c)| tables[m][c as usize]).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f32>>) -> Matrix {
        Matrix::from_rows(rows.into_iter().map(Vector::from).collect())
    }

    #[test]
    fn rejects_non_divisible_dimension() {
        let x = matrix(vec![vec![0.0; 10], vec![1.0; 10]]);
        let mut pq = ProductQuantizer::new(3, 2, 10, 0);
        let err = pq.train(&x).unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::InvalidArgument);
    }

    #[test]
    fn perfect_reconstruction_when_codebook_covers_every_point() {
        // D=4, M=4, K_s=N: each subspace is 1-dimensional with as many
        // centroids as distinct training points, so every point is encoded
        // exactly (score ~= 0, decode reconstructs the original value).
        let data = vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![9.0, 10.0, 11.0, 12.0],
            vec![13.0, 14.0, 15.0, 16.0],
        ];

        let x = matrix(data.clone());
        let mut pq = ProductQuantizer::new(4, 4, 20, 0);
        pq.train(&x).unwrap();

        for row in data {
            let v = Vector::from(row);
            let code = pq.encode(&v);
            let decoded = pq.decode(&code);

            let tables = pq.build_tables(&v);
            let score = ProductQuantizer::score(&tables, &code);
            let direct = v.sq_distance(&decoded);

            assert!((score - direct).abs() < 1e-4);
            assert!(direct < 1e-3);
        }
    }

    #[test]
    fn score_matches_decode_distance_within_tolerance() {
        let data: Vec<Vec<f32>> = (0..20)
            .map(|i| vec![i as f32, (i * 2) as f32, (i * 3) as f32, (i * 4) as f32])
            .collect();

        let x = matrix(data.clone());
        let mut pq = ProductQuantizer::new(2, 4, 25, 3);
        pq.train(&x).unwrap();

        for row in data {
            let v = Vector::from(row);
            let code = pq.encode(&v);
            let decoded = pq.decode(&code);
            let tables = pq.build_tables(&v);
            let score = ProductQuantizer::score(&tables, &code);
            let direct = v.sq_distance(&decoded);
            let tolerance = (direct.abs() * 1e-5).max(1e-4);
            assert!((score - direct).abs() <= tolerance);
        }
    }
}
