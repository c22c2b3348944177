//! Intent router — decides whether a message needs policy retrieval.
//!
//! One small generation call, two labels. Misbehaving provider output
//! defaults to retrieval: the synthesizer can still answer generically
//! with zero matches, whereas skipping a needed retrieval silently
//! degrades the answer. This stage never fails the request.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::llm::{Deadline, GenerationProvider, GenerationRequest, call_with_retry};
use crate::workflow::state::{RoutingDecision, Stage, WorkflowState};

/// Max tokens for the classification call — one label, kept tight.
const ROUTE_MAX_TOKENS: u32 = 16;

const ROUTE_TEMPERATURE: f32 = 0.0;

/// Classifies inbound messages into retrieval vs direct response.
pub struct IntentRouter {
    generation: Arc<dyn GenerationProvider>,
    call_timeout: Duration,
    retry_backoff: Duration,
}

impl IntentRouter {
    pub fn new(
        generation: Arc<dyn GenerationProvider>,
        call_timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            generation,
            call_timeout,
            retry_backoff,
        }
    }

    /// Classify the latest user message and set the routing decision.
    ///
    /// Provider failures and unparseable output both map to the
    /// retrieval default; only an empty message terminates the request.
    pub async fn classify(&self, state: &mut WorkflowState, deadline: Deadline) {
        state.push_stage(Stage::Router);

        let message = state.latest_user_message().trim().to_string();
        if message.is_empty() {
            debug!("Empty message, terminating without classification");
            state.set_routing_decision(RoutingDecision::Terminated);
            return;
        }

        let request = GenerationRequest::new(build_route_prompt(&message))
            .with_system(ROUTE_SYSTEM_PROMPT)
            .with_max_tokens(ROUTE_MAX_TOKENS)
            .with_temperature(ROUTE_TEMPERATURE);

        let decision = match call_with_retry(
            self.generation.model_name(),
            deadline,
            self.call_timeout,
            self.retry_backoff,
            || self.generation.generate(request.clone()),
        )
        .await
        {
            Ok(raw) => match parse_route_label(&raw) {
                Some(decision) => decision,
                None => {
                    warn!(raw = %raw, "Unparseable routing output, defaulting to retrieval");
                    state.record_error(ErrorKind::MalformedRoutingOutput);
                    RoutingDecision::NeedsRetrieval
                }
            },
            Err(e) => {
                warn!(error = %e, "Routing call failed, defaulting to retrieval");
                state.record_error(ErrorKind::ProviderUnavailable);
                RoutingDecision::NeedsRetrieval
            }
        };

        debug!(decision = decision.label(), "Routing decision");
        state.set_routing_decision(decision);
    }
}

const ROUTE_SYSTEM_PROMPT: &str = "You classify messages sent to a youth policy assistant.\n\
     Answer with exactly one word:\n\
     - \"retrieval\" if answering requires looking up specific policies, benefits, \
       programs, eligibility rules, or amounts.\n\
     - \"direct\" if the message is a greeting, small talk, thanks, or a question \
       about the assistant itself.\n\
     No other words, no punctuation.";

fn build_route_prompt(message: &str) -> String {
    // Classification only needs the head of the message.
    let preview: String = message.chars().take(500).collect();
    format!("Message:\n{preview}")
}

/// Parse the provider's label. Accepts surrounding noise as long as
/// exactly one of the two labels appears.
fn parse_route_label(raw: &str) -> Option<RoutingDecision> {
    let lower = raw.to_lowercase();
    let has_retrieval = lower.contains("retrieval");
    let has_direct = lower.contains("direct");
    match (has_retrieval, has_direct) {
        (true, false) => Some(RoutingDecision::NeedsRetrieval),
        (false, true) => Some(RoutingDecision::DirectResponse),
        // Both or neither is ambiguous — caller applies the default.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::ProviderError;
    use crate::workflow::state::UserContext;

    struct FixedLlm {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl GenerationProvider for FixedLlm {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _request: GenerationRequest) -> Result<String, ProviderError> {
            self.response
                .clone()
                .map_err(|()| ProviderError::RequestFailed {
                    provider: "fixed".into(),
                    reason: "down".into(),
                })
        }
    }

    fn router(response: Result<&str, ()>) -> IntentRouter {
        IntentRouter::new(
            Arc::new(FixedLlm {
                response: response.map(String::from),
            }),
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn parse_plain_labels() {
        assert_eq!(
            parse_route_label("retrieval"),
            Some(RoutingDecision::NeedsRetrieval)
        );
        assert_eq!(
            parse_route_label("direct"),
            Some(RoutingDecision::DirectResponse)
        );
    }

    #[test]
    fn parse_labels_with_noise() {
        assert_eq!(
            parse_route_label("Label: \"retrieval\"."),
            Some(RoutingDecision::NeedsRetrieval)
        );
        assert_eq!(
            parse_route_label("DIRECT\n"),
            Some(RoutingDecision::DirectResponse)
        );
    }

    #[test]
    fn parse_ambiguous_is_none() {
        assert!(parse_route_label("direct retrieval").is_none());
        assert!(parse_route_label("maybe?").is_none());
        assert!(parse_route_label("").is_none());
    }

    #[tokio::test]
    async fn classify_sets_decision() {
        let mut state = WorkflowState::new("25살인데 적금 추천해줘", UserContext::default());
        router(Ok("retrieval"))
            .classify(&mut state, Deadline::after(Duration::from_secs(5)))
            .await;
        assert_eq!(
            state.routing_decision(),
            Some(RoutingDecision::NeedsRetrieval)
        );
        assert!(state.error().is_none());
        assert_eq!(state.stages_run(), [Stage::Router]);
    }

    #[tokio::test]
    async fn unparseable_output_defaults_to_retrieval() {
        let mut state = WorkflowState::new("hello", UserContext::default());
        router(Ok("I think this one is tricky"))
            .classify(&mut state, Deadline::after(Duration::from_secs(5)))
            .await;
        assert_eq!(
            state.routing_decision(),
            Some(RoutingDecision::NeedsRetrieval)
        );
        assert_eq!(state.error(), Some(ErrorKind::MalformedRoutingOutput));
    }

    #[tokio::test]
    async fn provider_failure_defaults_to_retrieval() {
        let mut state = WorkflowState::new("hello", UserContext::default());
        router(Err(()))
            .classify(&mut state, Deadline::after(Duration::from_secs(5)))
            .await;
        assert_eq!(
            state.routing_decision(),
            Some(RoutingDecision::NeedsRetrieval)
        );
        assert_eq!(state.error(), Some(ErrorKind::ProviderUnavailable));
    }

    #[tokio::test]
    async fn empty_message_terminates() {
        let mut state = WorkflowState::new("   ", UserContext::default());
        router(Ok("retrieval"))
            .classify(&mut state, Deadline::after(Duration::from_secs(5)))
            .await;
        assert_eq!(state.routing_decision(), Some(RoutingDecision::Terminated));
    }
}
