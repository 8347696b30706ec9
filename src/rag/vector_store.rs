use super::{EmbeddingRecord, SearchMatch, TextSegment};
use crate::error::{RagError, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// In-memory store of embedding records searched by exhaustive cosine similarity.
///
/// The vector dimension is fixed by the first record added and every later
/// vector must match it. Mutation takes `&mut self`, so callers sharing a
/// store across tasks wrap it in a lock and every mutation below lands as a
/// single step from a reader's point of view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorStore {
    dimension: Option<usize>,
    records: Vec<EmbeddingRecord>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from previously snapshotted records.
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Result<Self> {
        let mut store = Self::new();
        store.add_all(records)?;
        Ok(store)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn add(&mut self, vector: Vec<f32>, segment: TextSegment) -> Result<()> {
        self.check_dimension(vector.len())?;
        self.dimension = Some(vector.len());
        self.records.push(EmbeddingRecord { vector, segment });
        Ok(())
    }

    /// Adds a batch of records, or none of them if any has the wrong dimension.
    pub fn add_all(&mut self, records: Vec<EmbeddingRecord>) -> Result<()> {
        let dimension = self.validate_batch(&records)?;
        if dimension.is_some() {
            self.dimension = dimension;
        }
        self.records.extend(records);
        Ok(())
    }

    /// Returns up to `max_results` records scoring at least `min_score`,
    /// best first. Equal scores keep insertion order.
    pub fn search(
        &self,
        query: &[f32],
        max_results: usize,
        min_score: f32,
    ) -> Result<Vec<SearchMatch>> {
        if let Some(expected) = self.dimension {
            if query.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let query_vec = DVector::from_column_slice(query);
        let query_norm = query_vec.norm();

        let mut results: Vec<SearchMatch> = self
            .records
            .iter()
            .filter_map(|record| {
                let score = cosine_similarity(&query_vec, query_norm, &record.vector);
                (score >= min_score).then(|| SearchMatch {
                    record: record.clone(),
                    score,
                    rerank_score: None,
                })
            })
            .collect();

        // sort_by is stable, ties stay in insertion order
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(max_results);

        Ok(results)
    }

    /// Removes every record whose metadata `key` equals `value`.
    pub fn remove_by_metadata(&mut self, key: &str, value: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| record.segment.metadata.get(key).map(String::as_str) != Some(value));
        before - self.records.len()
    }

    /// Swaps every record matching `key == value` for `replacement` in one step.
    ///
    /// The replacement is validated up front; on error the store is untouched.
    pub fn replace_by_metadata(
        &mut self,
        key: &str,
        value: &str,
        replacement: Vec<EmbeddingRecord>,
    ) -> Result<usize> {
        let dimension = self.validate_batch(&replacement)?;
        let removed = self.remove_by_metadata(key, value);
        if dimension.is_some() {
            self.dimension = dimension;
        }
        self.records.extend(replacement);
        Ok(removed)
    }

    pub fn remove_all(&mut self) {
        self.records.clear();
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(RagError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }

    fn validate_batch(&self, records: &[EmbeddingRecord]) -> Result<Option<usize>> {
        let mut dimension = self.dimension;
        for record in records {
            let actual = record.vector.len();
            match dimension {
                Some(expected) if expected != actual => {
                    return Err(RagError::DimensionMismatch { expected, actual });
                }
                _ => dimension = Some(actual),
            }
        }
        Ok(dimension)
    }
}

fn cosine_similarity(query: &DVector<f32>, query_norm: f32, other: &[f32]) -> f32 {
    let other = DVector::from_column_slice(other);

    let dot_product = query.dot(&other);
    let norm_other = other.norm();

    if query_norm == 0.0 || norm_other == 0.0 {
        0.0
    } else {
        dot_product / (query_norm * norm_other)
    }
}
