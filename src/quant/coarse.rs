use crate::ml::KMeans;
use crate::types::{Matrix, Result, Vector};
use rayon::prelude::*;

/// Coarse quantizer: one K-Means model of `K_c` centroids over the full
/// D-dimensional space, partitioning it into Voronoi cells.
#[derive(Debug)]
pub struct CoarseQuantizer {
    num_centroids: usize,
    max_iterations: usize,
    seed: u64,
    model: Option<KMeans>,
}

impl CoarseQuantizer {
    pub fn new(num_centroids: usize, max_iterations: usize, seed: u64) -> Self {
        Self { num_centroids, max_iterations, seed, model: None }
    }

    /// Builds a quantizer directly from a previously-trained centroid set,
    /// used when reconstructing an engine from a persisted index.
    pub fn from_centroids(centroids: Vec<Vector>) -> Self {
        Self {
            num_centroids: centroids.len(),
            max_iterations: 0,
            seed: 0,
            model: Some(KMeans::from_centroids(centroids)),
        }
    }

    /// Fits the centroid set. A subsequent call replaces the existing one.
    pub fn train(&mut self, sample: &Matrix) -> Result<()> {
        let mut model = KMeans::new(self.num_centroids, self.max_iterations, self.seed);
        model.fit(sample)?;
        self.model = Some(model);
        Ok(())
    }

    /// Number of coarse cells, `K_c`.
    pub fn num_centroids(&self) -> usize {
        self.num_centroids
    }

    /// Argmin over centroids of squared distance to `v`, lowest index on
    /// ties.
    pub fn assign(&self, v: &Vector) -> usize {
        let centroids = self.centroids();
        let mut best_idx = 0;
        let mut best_dist = f32::INFINITY;
        for (i, centroid) in centroids.iter().enumerate() {
            let dist = centroid.sq_distance(v);
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }
        best_idx
    }

    /// Vectorized form of [`CoarseQuantizer::assign`]; identical per-row
    /// result to calling `assign` individually.
    pub fn assign_many(&self, vectors: &Matrix) -> Vec<usize> {
        vectors.rows().par_iter().map(|v| self.assign(v)).collect()
    }

    /// `v` minus the centroid of its assigned cell.
    pub fn residual(&self, v: &Vector) -> Vector {
        let cell = self.assign(v);
        v - &self.centroids()[cell]
    }

    /// Residual of `v` against a specific cell's centroid, used by the
    /// engine to score probed cells other than `v`'s own nearest one.
    pub fn residual_against(&self, v: &Vector, cell: usize) -> Vector {
        v - &self.centroids()[cell]
    }

    /// Read-only accessor to the trained centroid set.
    pub fn centroids(&self) -> &[Vector] {
        match &self.model {
            Some(model) => model.centroids(),
            None => &[],
        }
    }

    /// Returns the `w` coarse cell ids whose centroids are nearest to `v`,
    /// lowest index first on distance ties, sorted ascending by distance.
    pub fn nearest_cells(&self, v: &Vector, w: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .centroids()
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.sq_distance(v)))
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.cmp(&b.0))
        });

        scored.into_iter().take(w).map(|(i, _)| i).collect()
    }
}
