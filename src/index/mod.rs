//! Vector index for policy records.
//!
//! Stores one embedding per policy record and answers top-k cosine
//! similarity queries. The index is a shared, read-mostly resource:
//! every request searches it concurrently, and the write path (ingestion)
//! replaces records atomically so a search never observes a half-written
//! record.

mod flat;
mod ivf;

pub use flat::FlatIndex;
pub use ivf::IvfIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// A stored policy record. Created and updated by the ingestion
/// pipeline; read-only from the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Unique record id.
    pub id: String,
    /// Policy title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Policy category (e.g. "savings", "housing", "employment").
    pub category: String,
    /// Region the policy applies to.
    pub region: String,
    /// Embedding vector, dimension fixed per deployment.
    pub embedding: Vec<f32>,
    /// Free-form metadata blob.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One search hit: record id plus cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

/// Structured pre-filters applied before similarity ranking.
///
/// Narrowing the candidate set first, then ranking, means a region
/// filter can never push a relevant in-region record out of the top-k.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub region: Option<String>,
    pub category: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.category.is_none()
    }

    /// Whether a record passes the filters. Matching is case-insensitive;
    /// a record with an empty field is treated as nationwide/uncategorized
    /// and always passes.
    pub fn matches(&self, record: &PolicyRecord) -> bool {
        let region_ok = match &self.region {
            Some(region) => {
                record.region.is_empty() || record.region.eq_ignore_ascii_case(region)
            }
            None => true,
        };
        let category_ok = match &self.category {
            Some(category) => {
                record.category.is_empty() || record.category.eq_ignore_ascii_case(category)
            }
            None => true,
        };
        region_ok && category_ok
    }
}

/// Trait for vector index backends.
///
/// `search` returns hits ordered by similarity descending; ties break by
/// record id ascending so repeated searches over an unchanged index
/// return the same ordered id list.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embedding dimension this index was created with.
    fn dimension(&self) -> usize;

    /// Number of stored records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top-k nearest records to `vector` by cosine similarity, after
    /// applying `filters` to the candidate set.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredId>, IndexError>;

    /// Insert or atomically replace a record (ingestion-side contract).
    async fn upsert(&self, record: PolicyRecord) -> Result<(), IndexError>;

    /// Fetch stored records by id, in the order given. Unknown ids are
    /// skipped.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<PolicyRecord>, IndexError>;
}

/// Load policy records from an ingestion-produced JSON file: a single
/// array of `PolicyRecord` objects with embeddings included.
pub fn load_records(path: &std::path::Path) -> Result<Vec<PolicyRecord>, crate::error::ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<PolicyRecord> = serde_json::from_str(&raw)?;
    Ok(records)
}

/// Normalize a vector to unit length. Returns `None` for the zero
/// vector, which has no direction and cannot participate in cosine
/// similarity.
pub(crate) fn normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return None;
    }
    Some(vector.iter().map(|v| v / norm).collect())
}

/// Dot product of two equal-length vectors. Over normalized inputs this
/// is exactly cosine similarity.
pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Sort hits by score descending, id ascending on ties, then truncate.
pub(crate) fn rank_and_truncate(mut hits: Vec<ScoredId>, k: usize) -> Vec<ScoredId> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}
