//! Compressed-row matrices, the per-batch coordinate builder, and sparse
//! concept vectors.

use crate::chunk::ChunkLayout;
use crate::{ConceptId, Error, Result, WordId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Sparse matrix in compressed-row layout. Column indices within a row are
/// strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f64>,
}

impl CsrMatrix {
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self { n_rows, n_cols, indptr: vec![0; n_rows + 1], indices: Vec::new(), data: Vec::new() }
    }

    /// Build from per-row `(column, value)` lists already sorted by column.
    pub fn from_sorted_rows(n_cols: usize, rows: Vec<Vec<(u32, f64)>>) -> Self {
        let n_rows = rows.len();
        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in rows {
            for (col, value) in row {
                indices.push(col);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        Self { n_rows, n_cols, indptr, indices, data }
    }

    pub fn shape(&self) -> (usize, usize) { (self.n_rows, self.n_cols) }

    pub fn nnz(&self) -> usize { self.data.len() }

    pub fn row(&self, row: usize) -> (&[u32], &[f64]) {
        let (start, end) = (self.indptr[row], self.indptr[row + 1]);
        (&self.indices[start..end], &self.data[start..end])
    }

    pub fn row_values_mut(&mut self, row: usize) -> &mut [f64] {
        let (start, end) = (self.indptr[row], self.indptr[row + 1]);
        &mut self.data[start..end]
    }

    pub fn get(&self, row: usize, col: u32) -> f64 {
        let (cols, values) = self.row(row);
        match cols.binary_search(&col) {
            Ok(pos) => values[pos],
            Err(_) => 0.0,
        }
    }

    /// Elementwise sum. Both operands must share a shape.
    pub fn add(&self, other: &CsrMatrix) -> Result<CsrMatrix> {
        if self.shape() != other.shape() {
            return Err(Error::Shape { expected: self.shape(), found: other.shape() });
        }
        let mut indptr = Vec::with_capacity(self.n_rows + 1);
        let mut indices = Vec::with_capacity(self.nnz() + other.nnz());
        let mut data = Vec::with_capacity(self.nnz() + other.nnz());
        indptr.push(0);
        for r in 0..self.n_rows {
            let (a_cols, a_vals) = self.row(r);
            let (b_cols, b_vals) = other.row(r);
            let (mut i, mut j) = (0, 0);
            while i < a_cols.len() || j < b_cols.len() {
                let ord = match (a_cols.get(i), b_cols.get(j)) {
                    (Some(a), Some(b)) => a.cmp(b),
                    (Some(_), None) => Ordering::Less,
                    _ => Ordering::Greater,
                };
                match ord {
                    Ordering::Equal => {
                        indices.push(a_cols[i]);
                        data.push(a_vals[i] + b_vals[j]);
                        i += 1;
                        j += 1;
                    }
                    Ordering::Less => {
                        indices.push(a_cols[i]);
                        data.push(a_vals[i]);
                        i += 1;
                    }
                    Ordering::Greater => {
                        indices.push(b_cols[j]);
                        data.push(b_vals[j]);
                        j += 1;
                    }
                }
            }
            indptr.push(indices.len());
        }
        Ok(CsrMatrix { n_rows: self.n_rows, n_cols: self.n_cols, indptr, indices, data })
    }

    /// Remove explicitly stored zeros.
    pub fn eliminate_zeros(&mut self) {
        let mut write = 0;
        let mut start = 0;
        for r in 0..self.n_rows {
            let end = self.indptr[r + 1];
            for k in start..end {
                if self.data[k] != 0.0 {
                    self.indices[write] = self.indices[k];
                    self.data[write] = self.data[k];
                    write += 1;
                }
            }
            start = end;
            self.indptr[r + 1] = write;
        }
        self.indices.truncate(write);
        self.data.truncate(write);
    }

    /// Structural checks applied to every matrix read back from disk.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.indptr.len() != self.n_rows + 1 {
            return Err(format!("indptr has {} entries for {} rows", self.indptr.len(), self.n_rows));
        }
        if self.indices.len() != self.data.len() {
            return Err("indices and data lengths differ".into());
        }
        if self.indptr[0] != 0 || self.indptr[self.n_rows] != self.data.len() {
            return Err("indptr does not span the stored entries".into());
        }
        for r in 0..self.n_rows {
            if self.indptr[r] > self.indptr[r + 1] {
                return Err(format!("indptr decreases at row {r}"));
            }
            let (cols, values) = self.row(r);
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("row {r} columns are not strictly increasing"));
            }
            if cols.iter().any(|&c| c as usize >= self.n_cols) {
                return Err(format!("row {r} has a column outside 0..{}", self.n_cols));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(format!("row {r} has a non-finite value"));
            }
        }
        Ok(())
    }
}

/// Coordinate accumulator for one construction batch, keyed by
/// `(word_id, concept_id)`.
#[derive(Debug, Default)]
pub struct TripletBuilder {
    entries: HashMap<(WordId, ConceptId), f64>,
}

impl TripletBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, word: WordId, concept: ConceptId, value: f64) {
        *self.entries.entry((word, concept)).or_insert(0.0) += value;
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Split into one compressed-row block per chunk the batch touches.
    pub fn into_chunks(self, layout: &ChunkLayout, n_cols: usize) -> BTreeMap<u32, CsrMatrix> {
        let mut triplets: Vec<((WordId, ConceptId), f64)> = self.entries.into_iter().collect();
        triplets.sort_unstable_by_key(|(key, _)| *key);

        let mut blocks: BTreeMap<u32, Vec<Vec<(u32, f64)>>> = BTreeMap::new();
        for ((word, concept), value) in triplets {
            let (chunk_id, local) = layout.locate(word);
            let rows = blocks
                .entry(chunk_id)
                .or_insert_with(|| vec![Vec::new(); layout.rows_in(chunk_id)]);
            rows[local].push((concept, value));
        }
        blocks
            .into_iter()
            .map(|(chunk_id, rows)| (chunk_id, CsrMatrix::from_sorted_rows(n_cols, rows)))
            .collect()
    }
}

/// Sparse vector over concept ids with sorted indices and no stored zeros.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparseVector {
    dim: usize,
    indices: Vec<u32>,
    values: Vec<f64>,
}

impl SparseVector {
    pub fn zeros(dim: usize) -> Self { Self { dim, indices: Vec::new(), values: Vec::new() } }

    pub fn from_pairs(dim: usize, pairs: impl IntoIterator<Item = (u32, f64)>) -> Self {
        let mut acc = SparseAccumulator::new();
        for (i, v) in pairs {
            acc.add(i, v);
        }
        acc.into_vector(dim)
    }

    pub fn dim(&self) -> usize { self.dim }

    pub fn nnz(&self) -> usize { self.values.len() }

    pub fn is_zero(&self) -> bool { self.values.is_empty() }

    pub fn get(&self, index: u32) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn dot(&self, other: &SparseVector) -> f64 {
        let mut sum = 0.0;
        let (mut i, mut j) = (0, 0);
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                Ordering::Equal => {
                    sum += self.values[i] * other.values[j];
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        sum
    }

    /// Cosine similarity; zero when either vector is zero.
    pub fn cosine(&self, other: &SparseVector) -> f64 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 { 0.0 } else { self.dot(other) / denom }
    }

    /// The `k` largest entries in descending order, ties by ascending index.
    pub fn top_k(&self, k: usize) -> Vec<(u32, f64)> {
        let mut entries: Vec<(u32, f64)> = self.iter().collect();
        let cmp = |a: &(u32, f64), b: &(u32, f64)| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0))
        };
        if k == 0 { return Vec::new(); }
        if entries.len() > k {
            entries.select_nth_unstable_by(k - 1, cmp);
            entries.truncate(k);
        }
        entries.sort_unstable_by(cmp);
        entries
    }
}

/// Running sum over concept ids used while assembling a vector.
#[derive(Debug, Default)]
pub struct SparseAccumulator {
    sums: HashMap<u32, f64>,
}

impl SparseAccumulator {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, index: u32, value: f64) {
        *self.sums.entry(index).or_insert(0.0) += value;
    }

    pub fn add_scaled(&mut self, indices: &[u32], values: &[f64], scale: f64) {
        for (&i, &v) in indices.iter().zip(values) {
            self.add(i, scale * v);
        }
    }

    pub fn into_vector(self, dim: usize) -> SparseVector {
        let mut pairs: Vec<(u32, f64)> = self.sums.into_iter().filter(|(_, v)| *v != 0.0).collect();
        pairs.sort_unstable_by_key(|(i, _)| *i);
        let (indices, values) = pairs.into_iter().unzip();
        SparseVector { dim, indices, values }
    }
}
