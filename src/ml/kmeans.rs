use crate::types::{Error, Matrix, Result, Vector};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Lloyd's algorithm with uniform random (seeded) initialization.
///
/// Given identical (sample, K, `max_iterations`, seed) the output is
/// bit-identical across runs: the only randomness, the initial centroid
/// pick, is drawn from an RNG stream seeded solely by the caller-supplied
/// seed and independent of any other RNG in the process.
#[derive(Debug)]
pub struct KMeans {
    num_centroids: usize,
    max_iterations: usize,
    seed: u64,
    assignments: Vec<usize>,
    centroids: Vec<Vector>,
}

impl KMeans {
    /// Creates an untrained model. Call [`KMeans::fit`] before using it.
    pub fn new(num_centroids: usize, max_iterations: usize, seed: u64) -> Self {
        Self {
            num_centroids,
            max_iterations,
            seed,
            assignments: Vec::new(),
            centroids: Vec::new(),
        }
    }

    /// Builds a model directly from a previously-trained centroid set, used
    /// when reconstructing a quantizer from a persisted index.
    pub fn from_centroids(centroids: Vec<Vector>) -> Self {
        Self {
            num_centroids: centroids.len(),
            max_iterations: 0,
            seed: 0,
            assignments: Vec::new(),
            centroids,
        }
    }

    /// Fits the model to `sample`, a matrix of N x d values.
    ///
    /// Fails with `InvalidArgument` when N < K, K < 1, or d < 1.
    pub fn fit(&mut self, sample: &Matrix) -> Result<()> {
        if self.num_centroids < 1 {
            return Err(Error::invalid_argument("K must be at least 1."));
        }

        if sample.dim() < 1 {
            return Err(Error::invalid_argument("Sample dimension must be at least 1."));
        }

        if sample.len() < self.num_centroids {
            return Err(Error::invalid_argument(format!(
                "Sample size {} is smaller than K ({}).",
                sample.len(),
                self.num_centroids
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let initial = sample::<_>(&mut rng, sample.len(), self.num_centroids);
        self.centroids = initial.iter().map(|i| sample.row(i).clone()).collect();
        self.assignments = vec![usize::MAX; sample.len()];

        for _ in 0..self.max_iterations {
            let assignments = assign_clusters(&self.centroids, sample);
            let changed = assignments != self.assignments;
            self.assignments = assignments;
            self.centroids = update_centroids(
                &self.centroids,
                sample,
                &self.assignments,
                self.num_centroids,
            );

            if !changed {
                break;
            }
        }

        Ok(())
    }

    /// Index of the nearest centroid to `vector`, lowest index on ties.
    pub fn nearest_centroid(&self, vector: &Vector) -> usize {
        nearest(&self.centroids, vector).0
    }

    /// Cluster assignment produced by the most recent [`KMeans::fit`] call.
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// The trained centroid matrix.
    pub fn centroids(&self) -> &[Vector] {
        &self.centroids
    }
}

/// Returns `(index, squared distance)` of the nearest centroid, lowest
/// index wins ties.
fn nearest(centroids: &[Vector], vector: &Vector) -> (usize, f32) {
    let mut best_idx = 0;
    let mut best_dist = f32::INFINITY;

    for (i, centroid) in centroids.iter().enumerate() {
        let dist = centroid.sq_distance(vector);
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }

    (best_idx, best_dist)
}

fn assign_clusters(centroids: &[Vector], sample: &Matrix) -> Vec<usize> {
    sample.rows().par_iter().map(|v| nearest(centroids, v).0).collect()
}

fn update_centroids(
    previous: &[Vector],
    sample: &Matrix,
    assignments: &[usize],
    k: usize,
) -> Vec<Vector> {
    let dim = sample.dim();
    let mut sums = vec![vec![0.0f32; dim]; k];
    let mut counts = vec![0usize; k];

    for (row, &cluster) in sample.rows().iter().zip(assignments.iter()) {
        counts[cluster] += 1;
        for (sum, value) in sums[cluster].iter_mut().zip(row.as_slice().iter()) {
            *sum += value;
        }
    }

    sums.into_par_iter()
        .enumerate()
        .map(|(i, sum)| {
            // Empty-cluster policy: retain the previous centroid instead of
            // reseeding or dropping it, per spec.
            if counts[i] == 0 {
                return previous[i].clone();
            }

            let count = counts[i] as f32;
            let mean: Vec<f32> = sum.into_iter().map(|s| s / count).collect();
            Vector::from(mean)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vectors(n: usize) -> Matrix {
        let rows = (0..n).map(|i| Vector::from(vec![i as f32, i as f32])).collect();
        Matrix::from_rows(rows)
    }

    #[test]
    fn rejects_too_few_samples() {
        let mut km = KMeans::new(5, 10, 0);
        let err = km.fit(&vectors(3)).unwrap_err();
        assert_eq!(err.kind(), crate::types::ErrorKind::InvalidArgument);
    }

    #[test]
    fn rejects_zero_k() {
        let mut km = KMeans::new(0, 10, 0);
        assert!(km.fit(&vectors(10)).is_err());
    }

    #[test]
    fn deterministic_given_same_seed() {
        let data = vectors(100);
        let mut a = KMeans::new(5, 20, 42);
        let mut b = KMeans::new(5, 20, 42);
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();

        for (ca, cb) in a.centroids().iter().zip(b.centroids().iter()) {
            assert_eq!(ca.as_slice(), cb.as_slice());
        }
        assert_eq!(a.assignments(), b.assignments());
    }

    #[test]
    fn different_seeds_can_diverge_but_both_converge() {
        let data = vectors(200);
        let mut km = KMeans::new(4, 50, 7);
        km.fit(&data).unwrap();
        assert_eq!(km.centroids().len(), 4);

        // Every point's stored assignment matches a direct nearest lookup.
        for (i, row) in data.rows().iter().enumerate() {
            assert_eq!(km.assignments()[i], km.nearest_centroid(row));
        }
    }

    #[test]
    fn empty_cluster_retains_previous_centroid() {
        // Two far-apart points, three clusters: one cluster must end up
        // empty and keep its initial centroid rather than being reseeded.
        let data = Matrix::from_rows(vec![
            Vector::from(vec![0.0, 0.0]),
            Vector::from(vec![0.0, 0.0]),
        ]);

        let mut km = KMeans::new(2, 5, 1);
        km.fit(&data).unwrap();
        assert_eq!(km.centroids().len(), 2);
    }
}
