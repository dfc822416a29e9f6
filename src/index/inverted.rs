use crate::types::PqCode;

/// One coarse cell's contents: a parallel id buffer and a flat code buffer
/// (struct-of-arrays, `num_subquantizers` bytes per entry) so that the
/// search inner loop scans contiguous memory rather than chasing pointers.
#[derive(Debug, Default, Clone)]
struct Cell {
    ids: Vec<i64>,
    codes: Vec<u8>,
}

/// Dense structure of `K_c` per-cell sequences, keyed by coarse cell id.
///
/// No removal, no update: entries are appended for the lifetime of a
/// Populated index, and insertion order within a cell is preserved (it
/// seeds deterministic tie-breaking during search).
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    cells: Vec<Cell>,
    num_subquantizers: usize,
}

impl InvertedIndex {
    /// Creates an empty index with `num_cells` cells, each entry holding
    /// `num_subquantizers` code bytes.
    pub fn new(num_cells: usize, num_subquantizers: usize) -> Self {
        Self {
            cells: (0..num_cells).map(|_| Cell::default()).collect(),
            num_subquantizers,
        }
    }

    /// Appends one entry to `cell_id`'s sequence. O(1) amortized.
    pub fn append(&mut self, cell_id: usize, original_id: i64, code: &PqCode) {
        debug_assert_eq!(code.len(), self.num_subquantizers);
        let cell = &mut self.cells[cell_id];
        cell.ids.push(original_id);
        cell.codes.extend_from_slice(code.as_slice());
    }

    /// Iterates over `(original_id, code slice)` pairs in insertion order.
    pub fn iterate(&self, cell_id: usize) -> impl Iterator<Item = (i64, &[u8])> {
        let cell = &self.cells[cell_id];
        let m = self.num_subquantizers;
        cell.ids.iter().enumerate().map(move |(i, &id)| (id, &cell.codes[i * m..(i + 1) * m]))
    }

    /// Number of entries in `cell_id`.
    pub fn len(&self, cell_id: usize) -> usize {
        self.cells[cell_id].ids.len()
    }

    /// Total number of entries across every cell.
    pub fn total_size(&self) -> usize {
        self.cells.iter().map(|c| c.ids.len()).sum()
    }

    /// Number of cells.
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn num_subquantizers(&self) -> usize {
        self.num_subquantizers
    }

    /// Raw access used by the persistence layer.
    pub(crate) fn cell_ids(&self, cell_id: usize) -> &[i64] {
        &self.cells[cell_id].ids
    }

    pub(crate) fn cell_codes(&self, cell_id: usize) -> &[u8] {
        &self.cells[cell_id].codes
    }
}
