//! Workflow orchestrator — a small finite state machine.
//!
//! Three working states and one terminal state:
//!
//! ```text
//! Router --(needs_retrieval)--> RetrievalAgent --> Synthesizer --> Done
//! Router --(direct_response)-->                    Synthesizer --> Done
//! Router --(terminated)-----------------------------------------> Done (fallback)
//! ```
//!
//! The orchestrator never inspects message content — each transition
//! consumes the routing decision the router wrote. A per-request
//! deadline bounds the whole chain; when it fires the in-flight stage
//! is abandoned and the request resolves with the canned fallback
//! instead of another synthesizer call.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::ErrorKind;
use crate::index::VectorIndex;
use crate::llm::{Deadline, EmbeddingProvider, GenerationProvider};
use crate::workflow::retrieval::RetrievalAgent;
use crate::workflow::router::IntentRouter;
use crate::workflow::state::{RoutingDecision, Stage, UserContext, WorkflowState};
use crate::workflow::synthesizer::{FALLBACK_ANSWER, ResponseSynthesizer};

/// Overall outcome classification for the response metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Every stage completed normally.
    Success,
    /// The request completed on a fallback path.
    Degraded,
}

/// What one request run produced.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub answer: String,
    pub status: WorkflowStatus,
    pub stages_run: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// FSM states. `Done` is the only terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmState {
    Routing,
    Retrieving,
    Synthesizing,
    Done,
}

/// Sequences router, retrieval agent, and synthesizer over one
/// request-scoped `WorkflowState`.
pub struct Orchestrator {
    router: IntentRouter,
    retrieval: RetrievalAgent,
    synthesizer: ResponseSynthesizer,
    config: ServiceConfig,
}

impl Orchestrator {
    pub fn new(
        config: ServiceConfig,
        generation: Arc<dyn GenerationProvider>,
        embedding: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let router = IntentRouter::new(
            Arc::clone(&generation),
            config.call_timeout,
            config.retry_backoff,
        );
        let retrieval = RetrievalAgent::new(
            Arc::clone(&generation),
            embedding,
            index,
            config.top_k,
            config.call_timeout,
            config.retry_backoff,
        );
        let synthesizer =
            ResponseSynthesizer::new(generation, config.call_timeout, config.retry_backoff);
        Self {
            router,
            retrieval,
            synthesizer,
            config,
        }
    }

    /// Run the full workflow for one inbound message.
    ///
    /// Always returns a non-empty answer: real synthesis on the happy
    /// path, the static fallback on every degraded path.
    pub async fn run(&self, message: String, user_context: UserContext) -> WorkflowOutcome {
        let deadline = Deadline::after(self.config.request_deadline);
        let mut state = WorkflowState::new(message, user_context);
        let mut fsm = FsmState::Routing;

        while fsm != FsmState::Done {
            if deadline.is_expired() {
                warn!(stage = ?fsm, "Request deadline exceeded, aborting");
                state.record_error(ErrorKind::Timeout);
                break;
            }

            fsm = match fsm {
                FsmState::Routing => {
                    self.router.classify(&mut state, deadline).await;
                    match state.routing_decision() {
                        Some(RoutingDecision::NeedsRetrieval) => FsmState::Retrieving,
                        Some(RoutingDecision::DirectResponse) => FsmState::Synthesizing,
                        Some(RoutingDecision::Terminated) | None => FsmState::Done,
                    }
                }
                FsmState::Retrieving => {
                    self.retrieval.retrieve(&mut state, deadline).await;
                    FsmState::Synthesizing
                }
                FsmState::Synthesizing => {
                    self.synthesizer.synthesize(&mut state, deadline).await;
                    FsmState::Done
                }
                FsmState::Done => FsmState::Done,
            };
        }

        // Deadline and terminated paths end here without a synthesized
        // answer; the canned fallback fills in.
        if state.final_answer().is_none() {
            state.set_final_answer(FALLBACK_ANSWER);
        }

        let degraded = state.error().is_some()
            || state.routing_decision() == Some(RoutingDecision::Terminated);
        let status = if degraded {
            WorkflowStatus::Degraded
        } else {
            WorkflowStatus::Success
        };

        info!(
            status = ?status,
            stages = state.stages_run().len(),
            decision = state.routing_decision().map(|d| d.label()).unwrap_or("none"),
            "Workflow complete"
        );

        WorkflowOutcome {
            answer: state
                .final_answer()
                .unwrap_or(FALLBACK_ANSWER)
                .to_string(),
            status,
            stages_run: state.stages_run().to_vec(),
            error: state.error(),
        }
    }
}
