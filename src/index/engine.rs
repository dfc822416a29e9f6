use crate::index::inverted::InvertedIndex;
use crate::io::format::{self, CellData, RawIndex};
use crate::quant::product::score_slice;
use crate::quant::{CoarseQuantizer, ProductQuantizer};
use crate::types::{Error, ErrorKind, Matrix, Result, Vector};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

/// Lifecycle state of an [`IVFADCEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Trained,
    Populated,
}

/// Parameters for the coarse quantizer.
#[derive(Debug, Clone, Copy)]
pub struct CoarseParams {
    pub num_centroids: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// Parameters for the product quantizer.
#[derive(Debug, Clone, Copy)]
pub struct PqParams {
    pub num_subquantizers: usize,
    pub num_centroids: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

/// One scored search result: `(score, original_id)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub score: f32,
    pub id: i64,
}

impl Eq for Neighbor {}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        OrderedFloat(self.score)
            .cmp(&OrderedFloat(other.score))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The IVFADC engine: owns the two cascaded quantizers and the inverted
/// index for its entire lifetime and orchestrates training, insertion,
/// search, and (de)serialization.
#[derive(Debug)]
pub struct IVFADCEngine {
    state: EngineState,
    dim: usize,
    coarse: CoarseQuantizer,
    pq: ProductQuantizer,
    inverted: Option<InvertedIndex>,
    next_id: i64,
}

impl IVFADCEngine {
    /// Creates an untrained engine with the given quantizer configurations.
    pub fn new(coarse_params: CoarseParams, pq_params: PqParams) -> Self {
        Self {
            state: EngineState::Uninitialized,
            dim: 0,
            coarse: CoarseQuantizer::new(
                coarse_params.num_centroids,
                coarse_params.max_iterations,
                coarse_params.seed,
            ),
            pq: ProductQuantizer::new(
                pq_params.num_subquantizers,
                pq_params.num_centroids,
                pq_params.max_iterations,
                pq_params.seed,
            ),
            inverted: None,
            next_id: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Total number of inserted vectors.
    pub fn len(&self) -> usize {
        self.next_id as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next_id == 0
    }

    /// Trains the coarse quantizer on `train_set`, then trains the product
    /// quantizer on the residuals of `train_set` against their assigned
    /// coarse centroids. Fails with `InvalidState` unless Uninitialized.
    pub fn train(&mut self, train_set: &Matrix) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Err(Error::invalid_state(
                "train() requires an Uninitialized engine; re-training is not supported.",
            ));
        }

        if train_set.is_empty() || train_set.dim() == 0 {
            return Err(Error::invalid_argument("Training set must be non-empty."));
        }

        self.coarse.train(train_set)?;

        let residuals: Vec<Vector> = train_set
            .rows()
            .par_iter()
            .map(|v| self.coarse.residual(v))
            .collect();
        let residuals = Matrix::from_rows(residuals);

        self.pq.train(&residuals)?;

        self.dim = train_set.dim();
        self.inverted =
            Some(InvertedIndex::new(self.coarse.num_centroids(), self.pq.num_subquantizers()));
        self.state = EngineState::Trained;
        Ok(())
    }

    /// Encodes and inserts every row of `base_set`. Fails with
    /// `InvalidState` unless Trained or Populated; fails with
    /// `InvalidArgument` if `base_set`'s dimension doesn't match the
    /// trained dimension, leaving the engine's observable state unchanged.
    pub fn add(&mut self, base_set: &Matrix) -> Result<()> {
        if !matches!(self.state, EngineState::Trained | EngineState::Populated) {
            return Err(Error::invalid_state(
                "add() requires a Trained or Populated engine.",
            ));
        }

        if !base_set.is_empty() && base_set.dim() != self.dim {
            return Err(Error::invalid_argument(format!(
                "Base set dimension {} does not match trained dimension {}.",
                base_set.dim(),
                self.dim
            )));
        }

        // Stage encodings for the whole batch before committing any of
        // them, so a failure partway through never mutates the index.
        let staged: Vec<(usize, i64, crate::types::PqCode)> = base_set
            .rows()
            .par_iter()
            .enumerate()
            .map(|(i, v)| {
                let cell = self.coarse.assign(v);
                let residual = self.coarse.residual_against(v, cell);
                let code = self.pq.encode(&residual);
                (cell, self.next_id + i as i64, code)
            })
            .collect();

        let inverted = self.inverted.as_mut().expect("Trained/Populated engine always has an inverted index.");
        for (cell, id, code) in &staged {
            inverted.append(*cell, *id, code);
        }

        self.next_id += base_set.len() as i64;
        self.state = EngineState::Populated;
        Ok(())
    }

    /// Returns up to `k` nearest neighbors of `query` among the `w` nearest
    /// probed coarse cells, sorted ascending by `(score, id)`. Fails with
    /// `InvalidState` if not Populated.
    pub fn search(&self, query: &Vector, k: usize, w: usize) -> Result<Vec<Neighbor>> {
        if self.state != EngineState::Populated {
            return Err(Error::invalid_state("search() requires a Populated engine."));
        }

        if k < 1 {
            return Err(Error::invalid_argument("k must be at least 1."));
        }

        if w < 1 || w > self.coarse.num_centroids() {
            return Err(Error::invalid_argument(format!(
                "w must be within [1, {}].",
                self.coarse.num_centroids()
            )));
        }

        if query.len() != self.dim {
            return Err(Error::invalid_argument(format!(
                "Query dimension {} does not match trained dimension {}.",
                query.len(),
                self.dim
            )));
        }

        let inverted = self.inverted.as_ref().expect("Populated engine always has an inverted index.");
        let cells = self.coarse.nearest_cells(query, w);

        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(k);
        for cell_id in cells {
            let q_residual = self.coarse.residual_against(query, cell_id);
            let tables = self.pq.build_tables(&q_residual);

            for (id, code) in inverted.iterate(cell_id) {
                let score = score_slice(&tables, code);
                let candidate = Neighbor { score, id };

                if heap.len() < k {
                    heap.push(candidate);
                } else if let Some(worst) = heap.peek() {
                    if candidate < *worst {
                        heap.pop();
                        heap.push(candidate);
                    }
                }
            }
        }

        Ok(heap.into_sorted_vec())
    }

    /// Vectorized form of [`IVFADCEngine::search`]: queries are independent,
    /// so they are distributed across the shared worker pool.
    pub fn search_many(&self, queries: &Matrix, k: usize, w: usize) -> Result<Vec<Vec<Neighbor>>> {
        queries.rows().par_iter().map(|query| self.search(query, k, w)).collect()
    }

    /// Serializes the full Populated state as a little-endian binary blob.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        if self.state != EngineState::Populated {
            return Err(Error::invalid_state("save() requires a Populated engine."));
        }

        let inverted = self.inverted.as_ref().unwrap();
        let num_coarse = self.coarse.num_centroids();
        let num_sub = self.pq.num_subquantizers();

        let mut coarse_centroids = Vec::with_capacity(num_coarse * self.dim);
        for c in self.coarse.centroids() {
            coarse_centroids.extend_from_slice(c.as_slice());
        }

        let mut pq_centroids = Vec::new();
        for sub in self.pq.sub_centroids() {
            for c in sub {
                pq_centroids.extend_from_slice(c.as_slice());
            }
        }

        let cells = (0..num_coarse)
            .map(|c| CellData {
                ids: inverted.cell_ids(c).to_vec(),
                codes: inverted.cell_codes(c).to_vec(),
            })
            .collect();

        let raw = RawIndex {
            dim: self.dim,
            num_coarse,
            num_subquantizers: num_sub,
            num_pq_centroids: self.pq.num_centroids(),
            n_total: self.next_id,
            coarse_centroids,
            pq_centroids,
            cells,
        };

        format::write(writer, &raw)
    }

    /// Deserializes a Populated engine. `add` is still permitted afterward
    /// as long as the loaded centroids remain unchanged.
    pub fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let raw = format::read(reader)?;

        let coarse_centroids: Vec<Vector> = raw
            .coarse_centroids
            .chunks(raw.dim)
            .map(|chunk| Vector::from(chunk.to_vec()))
            .collect();

        let sub_dim = if raw.num_subquantizers == 0 { 0 } else { raw.dim / raw.num_subquantizers };
        let sub_centroids: Vec<Vec<Vector>> = raw
            .pq_centroids
            .chunks(raw.num_pq_centroids * sub_dim)
            .map(|sub| sub.chunks(sub_dim).map(|c| Vector::from(c.to_vec())).collect())
            .collect();

        let coarse = CoarseQuantizer::from_centroids(coarse_centroids);
        let pq = ProductQuantizer::from_centroids(
            raw.num_subquantizers,
            raw.num_pq_centroids,
            raw.dim,
            sub_centroids,
        );

        let mut inverted = InvertedIndex::new(raw.num_coarse, raw.num_subquantizers);
        for (cell_id, cell) in raw.cells.iter().enumerate() {
            let m = raw.num_subquantizers;
            for (i, &id) in cell.ids.iter().enumerate() {
                let code = crate::types::PqCode::from(cell.codes[i * m..(i + 1) * m].to_vec());
                inverted.append(cell_id, id, &code);
            }
        }

        Ok(IVFADCEngine {
            state: EngineState::Populated,
            dim: raw.dim,
            coarse,
            pq,
            inverted: Some(inverted),
            next_id: raw.n_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn params(num_centroids: usize, num_sub: usize, sub_centroids: usize) -> (CoarseParams, PqParams) {
        (
            CoarseParams { num_centroids, max_iterations: 20, seed: 0 },
            PqParams {
                num_subquantizers: num_sub,
                num_centroids: sub_centroids,
                max_iterations: 20,
                seed: 100,
            },
        )
    }

    fn random_matrix(n: usize, dim: usize, seed: u64) -> Matrix {
        use rand::Rng;
        use rand::SeedableRng;
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(seed);
        let rows = (0..n)
            .map(|_| Vector::from((0..dim).map(|_| rng.gen_range(-10.0f32..10.0)).collect()))
            .collect();
        Matrix::from_rows(rows)
    }

    #[test]
    fn rejects_add_before_train() {
        let (cp, pp) = params(4, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let err = engine.add(&random_matrix(5, 8, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn rejects_search_before_populated() {
        let (cp, pp) = params(4, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let train = random_matrix(50, 8, 1);
        engine.train(&train).unwrap();
        let err = engine.search(&Vector::from(vec![0.0; 8]), 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn rejects_retrain() {
        let (cp, pp) = params(4, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let train = random_matrix(50, 8, 1);
        engine.train(&train).unwrap();
        let err = engine.train(&train).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn dimension_mismatch_leaves_state_unchanged() {
        let (cp, pp) = params(4, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        engine.train(&random_matrix(50, 8, 1)).unwrap();

        let err = engine.add(&random_matrix(5, 9, 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(engine.state(), EngineState::Trained);
        assert_eq!(engine.len(), 0);
    }

    #[test]
    fn empty_add_transitions_to_populated_and_is_a_noop() {
        let (cp, pp) = params(4, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        engine.train(&random_matrix(50, 8, 1)).unwrap();

        engine.add(&Matrix::from_rows(vec![])).unwrap();
        assert_eq!(engine.state(), EngineState::Populated);
        assert_eq!(engine.len(), 0);

        let results = engine.search(&Vector::from(vec![0.0; 8]), 5, 4).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn ids_are_contiguous_and_monotonic() {
        let (cp, pp) = params(4, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let train = random_matrix(200, 8, 1);
        engine.train(&train).unwrap();
        engine.add(&train).unwrap();

        assert_eq!(engine.len(), 200);

        let mut seen = vec![false; 200];
        let inverted = engine.inverted.as_ref().unwrap();
        for cell in 0..inverted.num_cells() {
            for (id, _) in inverted.iterate(cell) {
                seen[id as usize] = true;
            }
        }
        assert!(seen.iter().all(|&b| b));
    }

    #[test]
    fn perfect_reconstruction_search_finds_self() {
        // D=4, M=4, K_s=N: exact PQ codes, so searching for a trained
        // vector returns its own id as the closest match.
        let data = vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![50.0, 60.0, 70.0, 80.0],
            vec![-9.0, -10.0, -11.0, -12.0],
            vec![13.0, 140.0, 15.0, 16.0],
        ];
        let train = Matrix::from_rows(data.iter().cloned().map(Vector::from).collect());

        let cp = CoarseParams { num_centroids: 1, max_iterations: 10, seed: 0 };
        let pp = PqParams { num_subquantizers: 4, num_centroids: 4, max_iterations: 20, seed: 0 };
        let mut engine = IVFADCEngine::new(cp, pp);
        engine.train(&train).unwrap();
        engine.add(&train).unwrap();

        for (i, row) in data.iter().enumerate() {
            let results = engine.search(&Vector::from(row.clone()), 1, 1).unwrap();
            assert_eq!(results[0].id, i as i64);
            assert!(results[0].score < 1e-3);
        }
    }

    #[test]
    fn w_equals_one_probes_exactly_one_cell() {
        let (cp, pp) = params(8, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let train = random_matrix(300, 8, 1);
        engine.train(&train).unwrap();
        engine.add(&train).unwrap();

        let query = Vector::from(vec![0.0; 8]);
        let results_w1 = engine.search(&query, 50, 1).unwrap();
        let results_full = engine.search(&query, 50, 8).unwrap();
        assert!(results_w1.len() <= results_full.len());
    }

    #[test]
    fn save_then_load_is_search_identical() {
        let (cp, pp) = params(6, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let train = random_matrix(400, 8, 7);
        engine.train(&train).unwrap();
        engine.add(&train).unwrap();

        let mut buf = Vec::new();
        engine.save(&mut buf).unwrap();
        let loaded = IVFADCEngine::load(&mut Cursor::new(buf)).unwrap();

        let queries = random_matrix(20, 8, 42);
        for query in queries.rows() {
            let a = engine.search(query, 10, 4).unwrap();
            let b = loaded.search(query, 10, 4).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn search_many_matches_per_query_search() {
        let (cp, pp) = params(6, 2, 4);
        let mut engine = IVFADCEngine::new(cp, pp);
        let train = random_matrix(300, 8, 3);
        engine.train(&train).unwrap();
        engine.add(&train).unwrap();

        let queries = random_matrix(30, 8, 99);
        let batched = engine.search_many(&queries, 10, 4).unwrap();

        assert_eq!(batched.len(), queries.len());
        for (query, results) in queries.rows().iter().zip(batched.iter()) {
            assert_eq!(*results, engine.search(query, 10, 4).unwrap());
        }
    }
}
