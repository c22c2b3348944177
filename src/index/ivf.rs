//! Inverted-file approximate index.
//!
//! Records are clustered around `nlist` centroids; a query scores the
//! centroids first and scans only the `nprobe` nearest inverted lists.
//! Trades perfect recall for query latency, which is the right trade at
//! tens of thousands of records. Small collections fall back to an
//! exhaustive scan, where the result is exact.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::error::IndexError;
use crate::index::{
    PolicyRecord, ScoredId, SearchFilters, VectorIndex, dot, normalize, rank_and_truncate,
};

/// Below `nlist * EXHAUSTIVE_FACTOR` records, probing lists saves nothing —
/// scan everything and stay exact.
const EXHAUSTIVE_FACTOR: usize = 16;

/// k-means refinement rounds in `rebuild`.
const REBUILD_ROUNDS: usize = 5;

struct Stored {
    record: PolicyRecord,
    normalized: Vec<f32>,
    list: usize,
}

struct Inner {
    /// Unit-length cluster centroids.
    centroids: Vec<Vec<f32>>,
    /// Record ids per centroid.
    lists: Vec<Vec<String>>,
    records: HashMap<String, Stored>,
}

/// Approximate cosine index with inverted-file lists.
pub struct IvfIndex {
    dimension: usize,
    nlist: usize,
    nprobe: usize,
    inner: RwLock<Inner>,
}

impl IvfIndex {
    pub fn new(dimension: usize, nlist: usize, nprobe: usize) -> Self {
        Self {
            dimension,
            nlist: nlist.max(1),
            nprobe: nprobe.max(1),
            inner: RwLock::new(Inner {
                centroids: Vec::new(),
                lists: Vec::new(),
                records: HashMap::new(),
            }),
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

    /// Re-cluster the whole collection with a few k-means rounds.
    ///
    /// Ingestion calls this after a bulk load; incremental upserts just
    /// assign to the nearest existing centroid until the next rebuild.
    pub fn rebuild(&self) -> Result<(), IndexError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let ids: Vec<String> = inner.records.keys().cloned().collect();
        if ids.is_empty() {
            return Ok(());
        }

        let nlist = self.nlist.min(ids.len());
        let mut rng = rand::thread_rng();
        let seeds: Vec<String> = ids
            .choose_multiple(&mut rng, nlist)
            .cloned()
            .collect();
        let mut centroids: Vec<Vec<f32>> = seeds
            .iter()
            .map(|id| inner.records[id].normalized.clone())
            .collect();

        let mut assignment: HashMap<String, usize> = HashMap::new();
        for _ in 0..REBUILD_ROUNDS {
            // Assign every record to its nearest centroid.
            for id in &ids {
                let list = nearest_centroid(&centroids, &inner.records[id].normalized);
                assignment.insert(id.clone(), list);
            }
            // Move each centroid to the mean of its members.
            let mut sums = vec![vec![0.0f32; self.dimension]; centroids.len()];
            let mut counts = vec![0usize; centroids.len()];
            for id in &ids {
                let list = assignment[id];
                counts[list] += 1;
                for (s, v) in sums[list].iter_mut().zip(&inner.records[id].normalized) {
                    *s += v;
                }
            }
            for (i, sum) in sums.into_iter().enumerate() {
                if counts[i] > 0
                    && let Some(unit) = normalize(&sum)
                {
                    centroids[i] = unit;
                }
            }
        }

        let mut lists = vec![Vec::new(); centroids.len()];
        for id in &ids {
            let list = assignment[id];
            lists[list].push(id.clone());
            if let Some(stored) = inner.records.get_mut(id) {
                stored.list = list;
            }
        }

        info!(
            records = ids.len(),
            clusters = centroids.len(),
            "Rebuilt IVF index"
        );
        inner.centroids = centroids;
        inner.lists = lists;
        Ok(())
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let score = dot(centroid, vector);
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

#[async_trait]
impl VectorIndex for IvfIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
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

        let inner = self
            .inner
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        let exhaustive = inner.records.len() < self.nlist * EXHAUSTIVE_FACTOR;
        let hits: Vec<ScoredId> = if exhaustive {
            inner
                .records
                .values()
                .filter(|stored| filters.matches(&stored.record))
                .map(|stored| ScoredId {
                    id: stored.record.id.clone(),
                    score: dot(&query, &stored.normalized),
                })
                .collect()
        } else {
            // Probe the nprobe nearest lists only.
            let mut by_centroid: Vec<(usize, f32)> = inner
                .centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, dot(c, &query)))
                .collect();
            by_centroid.sort_by(|a, b| {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            });

            by_centroid
                .iter()
                .take(self.nprobe)
                .flat_map(|&(list, _)| inner.lists[list].iter())
                .filter_map(|id| inner.records.get(id))
                .filter(|stored| filters.matches(&stored.record))
                .map(|stored| ScoredId {
                    id: stored.record.id.clone(),
                    score: dot(&query, &stored.normalized),
                })
                .collect()
        };

        debug!(
            exhaustive,
            candidates = hits.len(),
            k,
            "IVF index search"
        );
        Ok(rank_and_truncate(hits, k))
    }

    async fn upsert(&self, record: PolicyRecord) -> Result<(), IndexError> {
        self.check_dimension(record.embedding.len())?;
        let normalized = normalize(&record.embedding).ok_or_else(|| {
            IndexError::SearchFailed(format!("record {} has zero-norm embedding", record.id))
        })?;

        let mut inner = self
            .inner
            .write()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        // Replacing an existing record: drop it from its old list first so
        // no search ever sees it twice.
        if let Some(old) = inner.records.remove(&record.id) {
            let old_list = old.list;
            inner.lists[old_list].retain(|id| id != &record.id);
        }

        let list = if inner.centroids.len() < self.nlist {
            // Still seeding: this record becomes a new centroid.
            inner.centroids.push(normalized.clone());
            inner.lists.push(Vec::new());
            inner.centroids.len() - 1
        } else {
            nearest_centroid(&inner.centroids, &normalized)
        };

        inner.lists[list].push(record.id.clone());
        inner.records.insert(
            record.id.clone(),
            Stored {
                record,
                normalized,
                list,
            },
        );
        Ok(())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<PolicyRecord>, IndexError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.records.get(id).map(|s| s.record.clone()))
            .collect())
    }
}
