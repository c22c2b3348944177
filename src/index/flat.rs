//! Exact brute-force index.
//!
//! Scans every candidate on each query. Correct at any size and fast
//! enough below roughly a hundred thousand records; the IVF index covers
//! larger collections.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use crate::error::IndexError;
use crate::index::{
    PolicyRecord, ScoredId, SearchFilters, VectorIndex, dot, normalize, rank_and_truncate,
};

struct Stored {
    record: PolicyRecord,
    /// Unit-length copy of the record embedding, computed once at upsert.
    normalized: Vec<f32>,
}

/// In-memory exact cosine index.
pub struct FlatIndex {
    dimension: usize,
    // BTreeMap keeps iteration deterministic; replace-on-insert gives the
    // atomic per-record upsert the ingestion contract requires.
    records: RwLock<BTreeMap<String, Stored>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    fn check_dimension(&self, got: usize) -> Result<(), IndexError> {
        if got != self.dimension {
            return Err(IndexError::Dimension {
                got,
                expected: self.dimension,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredId>, IndexError> {
        self.check_dimension(vector.len())?;
        let query = normalize(vector)
            .ok_or_else(|| IndexError::SearchFailed("query vector has zero norm".into()))?;

        let records = self
            .records
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        // Pre-filter, then rank the survivors.
        let hits: Vec<ScoredId> = records
            .values()
            .filter(|stored| filters.matches(&stored.record))
            .map(|stored| ScoredId {
                id: stored.record.id.clone(),
                score: dot(&query, &stored.normalized),
            })
            .collect();

        let candidates = hits.len();
        let ranked = rank_and_truncate(hits, k);
        debug!(candidates, returned = ranked.len(), k, "Flat index search");
        Ok(ranked)
    }

    async fn upsert(&self, record: PolicyRecord) -> Result<(), IndexError> {
        self.check_dimension(record.embedding.len())?;
        let normalized = normalize(&record.embedding).ok_or_else(|| {
            IndexError::SearchFailed(format!("record {} has zero-norm embedding", record.id))
        })?;

        let mut records = self
            .records
            .write()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        records.insert(record.id.clone(), Stored { record, normalized });
        Ok(())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<PolicyRecord>, IndexError> {
        let records = self
            .records
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|s| s.record.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> PolicyRecord {
        PolicyRecord {
            id: id.into(),
            title: format!("policy {id}"),
            description: "desc".into(),
            category: "savings".into(),
            region: "seoul".into(),
            embedding,
            metadata: serde_json::Value::Null,
        }
    }

    async fn seeded_index() -> FlatIndex {
        let index = FlatIndex::new(2);
        index.upsert(record("a", vec![1.0, 0.0])).await.unwrap();
        index.upsert(record("b", vec![0.0, 1.0])).await.unwrap();
        index.upsert(record("c", vec![1.0, 1.0])).await.unwrap();
        index
    }

    #[tokio::test]
    async fn search_orders_by_similarity_descending() {
        let index = seeded_index().await;
        let hits = index
            .search(&[1.0, 0.1], 3, &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(hits[0].id, "a");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn search_is_idempotent() {
        let index = seeded_index().await;
        let first = index
            .search(&[0.7, 0.7], 3, &SearchFilters::default())
            .await
            .unwrap();
        let second = index
            .search(&[0.7, 0.7], 3, &SearchFilters::default())
            .await
            .unwrap();
        let ids = |hits: &[ScoredId]| hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn search_respects_k() {
        let index = seeded_index().await;
        let hits = index
            .search(&[1.0, 0.0], 2, &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn cosine_ignores_magnitude() {
        let index = FlatIndex::new(2);
        index.upsert(record("small", vec![0.1, 0.0])).await.unwrap();
        index.upsert(record("large", vec![100.0, 0.0])).await.unwrap();
        let hits = index
            .search(&[1.0, 0.0], 2, &SearchFilters::default())
            .await
            .unwrap();
        // Same direction, different magnitudes: identical score, id tiebreak.
        assert!((hits[0].score - hits[1].score).abs() < 1e-6);
        assert_eq!(hits[0].id, "large");
        assert_eq!(hits[1].id, "small");
    }

    #[tokio::test]
    async fn filters_narrow_before_ranking() {
        let index = seeded_index().await;
        index
            .upsert(PolicyRecord {
                region: "busan".into(),
                ..record("d", vec![1.0, 0.0])
            })
            .await
            .unwrap();

        let filters = SearchFilters {
            region: Some("busan".into()),
            category: None,
        };
        let hits = index.search(&[1.0, 0.0], 5, &filters).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "d");
    }

    #[tokio::test]
    async fn zero_matches_is_ok_not_error() {
        let index = seeded_index().await;
        let filters = SearchFilters {
            region: Some("jeju".into()),
            category: None,
        };
        let hits = index.search(&[1.0, 0.0], 5, &filters).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_record_atomically() {
        let index = seeded_index().await;
        index
            .upsert(PolicyRecord {
                title: "updated".into(),
                ..record("a", vec![0.0, 1.0])
            })
            .await
            .unwrap();
        assert_eq!(index.len(), 3);
        let fetched = index.fetch(&["a".into()]).await.unwrap();
        assert_eq!(fetched[0].title, "updated");
    }

    #[tokio::test]
    async fn dimension_mismatch_rejected() {
        let index = seeded_index().await;
        let result = index
            .search(&[1.0, 0.0, 0.0], 3, &SearchFilters::default())
            .await;
        assert!(matches!(result, Err(IndexError::Dimension { .. })));

        let result = index.upsert(record("bad", vec![1.0])).await;
        assert!(matches!(result, Err(IndexError::Dimension { .. })));
    }

    #[tokio::test]
    async fn zero_norm_query_rejected() {
        let index = seeded_index().await;
        let result = index.search(&[0.0, 0.0], 3, &SearchFilters::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_preserves_requested_order() {
        let index = seeded_index().await;
        let fetched = index
            .fetch(&["c".into(), "missing".into(), "a".into()])
            .await
            .unwrap();
        let ids: Vec<&str> = fetched.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }
}
