//! Retrieval agent — rewrite, embed, search.
//!
//! Three sequential steps with independent failure policies:
//! 1. Query rewrite is best-effort; any failure falls back to the raw
//!    message.
//! 2. Embedding failure is fatal to retrieval only — the request
//!    continues with zero matches.
//! 3. Vector search is pre-filtered by the user's region and returns
//!    hits pre-sorted by similarity; the order is never altered here or
//!    downstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ErrorKind, ProviderError};
use crate::index::{PolicyRecord, SearchFilters, VectorIndex};
use crate::llm::{
    Deadline, EmbeddingProvider, GenerationProvider, GenerationRequest, call_with_retry,
};
use crate::workflow::state::{PolicyMatch, Stage, WorkflowState};

/// Max tokens for the query rewrite call.
const REWRITE_MAX_TOKENS: u32 = 128;

const REWRITE_TEMPERATURE: f32 = 0.0;

/// Retrieves policy matches for a request.
pub struct RetrievalAgent {
    generation: Arc<dyn GenerationProvider>,
    embedding: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    call_timeout: Duration,
    retry_backoff: Duration,
}

impl RetrievalAgent {
    pub fn new(
        generation: Arc<dyn GenerationProvider>,
        embedding: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        call_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            generation,
            embedding,
            index,
            top_k,
            call_timeout,
            retry_backoff,
        }
    }

    /// Populate `state.search_results`. Never fails the request: every
    /// failure mode degrades to an empty result set.
    pub async fn retrieve(&self, state: &mut WorkflowState, deadline: Deadline) {
        state.push_stage(Stage::Retrieval);

        let raw_query = state.latest_user_message().to_string();
        let query = self.rewrite_query(&raw_query, deadline).await;

        let vector = match call_with_retry(
            self.embedding.model_name(),
            deadline,
            self.call_timeout,
            self.retry_backoff,
            || self.embedding.embed(&query),
        )
        .await
        {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Embedding failed, degrading to zero matches");
                state.record_error(ErrorKind::ProviderUnavailable);
                return;
            }
        };

        let filters = filters_from_context(state);
        let hits = match call_with_retry(
            "vector-index",
            deadline,
            self.call_timeout,
            self.retry_backoff,
            || async {
                self.index
                    .search(&vector, self.top_k, &filters)
                    .await
                    .map_err(|e| ProviderError::RequestFailed {
                        provider: "vector-index".into(),
                        reason: e.to_string(),
                    })
            },
        )
        .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Vector search failed, degrading to zero matches");
                state.record_error(ErrorKind::IndexUnavailable);
                return;
            }
        };

        if hits.is_empty() {
            // Valid outcome, not an error — the synthesizer produces
            // general guidance instead.
            info!(query = %query, "No policy matches");
            return;
        }

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let records = match self.index.fetch(&ids).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Record fetch failed, degrading to zero matches");
                state.record_error(ErrorKind::IndexUnavailable);
                return;
            }
        };

        // Join scores back onto records by id, walking hits in order so
        // the similarity-descending ordering is preserved even when the
        // fetch skipped an id.
        let mut by_id: HashMap<String, PolicyRecord> = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        let matches: Vec<PolicyMatch> = hits
            .iter()
            .filter_map(|hit| {
                by_id
                    .remove(&hit.id)
                    .map(|record| PolicyMatch::from_record(&record, hit.score))
            })
            .collect();
        debug_assert!(
            matches
                .windows(2)
                .all(|pair| pair[0].similarity_score >= pair[1].similarity_score),
            "index returned unsorted results"
        );

        info!(matches = matches.len(), query = %query, "Retrieval complete");
        state.search_results = matches;
    }

    /// Rewrite the raw message into a denser search query. Quality
    /// optimization only — falls back to the raw message on any failure.
    async fn rewrite_query(&self, raw: &str, deadline: Deadline) -> String {
        let request = GenerationRequest::new(format!("Question:\n{raw}"))
            .with_system(REWRITE_SYSTEM_PROMPT)
            .with_max_tokens(REWRITE_MAX_TOKENS)
            .with_temperature(REWRITE_TEMPERATURE);

        match call_with_retry(
            self.generation.model_name(),
            deadline,
            self.call_timeout,
            self.retry_backoff,
            || self.generation.generate(request.clone()),
        )
        .await
        {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    raw.to_string()
                } else {
                    debug!(raw = %raw, rewritten = %rewritten, "Query rewritten");
                    rewritten.to_string()
                }
            }
            Err(e) => {
                debug!(error = %e, "Query rewrite failed, using raw message");
                raw.to_string()
            }
        }
    }
}

const REWRITE_SYSTEM_PROMPT: &str = "Rewrite the user's question as a dense search query for a \
     policy database, in the user's language. Expand colloquial phrasing into policy vocabulary \
     (e.g. \"25살인데 적금\" becomes \"25세 청년 우대 적금 정책\"). Reply with the query only.";

/// Derive structured pre-filters from the user context. Only the region
/// maps onto a record field; age and income shape the prompt, not the
/// candidate set.
fn filters_from_context(state: &WorkflowState) -> SearchFilters {
    SearchFilters {
        region: state.user_context.region.clone(),
        category: None,
    }
}
