//! Response synthesizer — turns state into the final answer.
//!
//! Builds a bounded prompt from the latest user message, the user
//! context fields that are actually present, and a trimmed list of
//! matches, then makes one generation call. If the provider fails after
//! its retry, this stage produces the static fallback itself — the
//! final answer is never empty once synthesis has run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ErrorKind;
use crate::llm::{Deadline, GenerationProvider, GenerationRequest, call_with_retry};
use crate::workflow::state::{Stage, WorkflowState};

/// Static answer used when generation is unavailable. Non-personalized
/// by design: it must be safe to return with no context at all.
pub(crate) const FALLBACK_ANSWER: &str = "죄송합니다, 지금은 답변을 생성할 수 없습니다. 잠시 후 \
     다시 시도해 주세요. 청년 정책에 대한 자세한 정보는 온통청년(www.youthcenter.go.kr)에서 \
     확인하실 수 있습니다.";

/// Max tokens for the answer.
const SYNTH_MAX_TOKENS: u32 = 1024;

const SYNTH_TEMPERATURE: f32 = 0.5;

/// Per-match description budget in the prompt.
const DESCRIPTION_CHARS: usize = 200;

/// Produces the final answer for a request.
pub struct ResponseSynthesizer {
    generation: Arc<dyn GenerationProvider>,
    call_timeout: Duration,
    retry_backoff: Duration,
}

impl ResponseSynthesizer {
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

    /// Set `state`'s final answer. Always leaves a non-empty answer.
    pub async fn synthesize(&self, state: &mut WorkflowState, deadline: Deadline) {
        state.push_stage(Stage::Synthesis);

        let prompt = build_synthesis_prompt(state);
        let request = GenerationRequest::new(prompt)
            .with_system(SYNTH_SYSTEM_PROMPT)
            .with_max_tokens(SYNTH_MAX_TOKENS)
            .with_temperature(SYNTH_TEMPERATURE);

        match call_with_retry(
            self.generation.model_name(),
            deadline,
            self.call_timeout,
            self.retry_backoff,
            || self.generation.generate(request.clone()),
        )
        .await
        {
            Ok(answer) if !answer.trim().is_empty() => {
                info!(chars = answer.len(), "Synthesis complete");
                state.set_final_answer(answer.trim().to_string());
            }
            Ok(_) => {
                warn!("Generation returned empty output, using fallback answer");
                state.record_error(ErrorKind::ProviderUnavailable);
                state.set_final_answer(FALLBACK_ANSWER);
            }
            Err(e) => {
                warn!(error = %e, "Generation failed after retry, using fallback answer");
                state.record_error(ErrorKind::ProviderUnavailable);
                state.set_final_answer(FALLBACK_ANSWER);
            }
        }
    }
}

const SYNTH_SYSTEM_PROMPT: &str = "You are a youth policy assistant. Answer in the user's \
     language. Base policy facts only on the matched policies provided; if none are provided, \
     say no exact match was found and give brief general guidance on where to look. Use only \
     the user facts given — never assume age, region, or income that is not stated. Be concise \
     and concrete.";

/// Assemble the user-facing prompt. Matched policies are rendered as a
/// bounded list — title, truncated description, category and region —
/// never the full record.
fn build_synthesis_prompt(state: &WorkflowState) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str("Question:\n");
    prompt.push_str(state.latest_user_message());
    prompt.push('\n');

    let ctx = &state.user_context;
    if !ctx.is_empty() {
        prompt.push_str("\nUser facts:\n");
        if let Some(age) = ctx.age {
            prompt.push_str(&format!("- age: {age}\n"));
        }
        if let Some(ref region) = ctx.region {
            prompt.push_str(&format!("- region: {region}\n"));
        }
        if let Some(ref status) = ctx.employment_status {
            prompt.push_str(&format!("- employment status: {status}\n"));
        }
        if let Some(ref bracket) = ctx.monthly_income_bracket {
            prompt.push_str(&format!("- monthly income bracket: {bracket}\n"));
        }
    }

    if state.search_results.is_empty() {
        prompt.push_str("\nMatched policies: none\n");
    } else {
        prompt.push_str("\nMatched policies (most relevant first):\n");
        for (i, m) in state.search_results.iter().enumerate() {
            let description: String = m.description.chars().take(DESCRIPTION_CHARS).collect();
            prompt.push_str(&format!("{}. {} — {}", i + 1, m.title, description));
            if !m.category.is_empty() {
                prompt.push_str(&format!(" [{}]", m.category));
            }
            if !m.region.is_empty() {
                prompt.push_str(&format!(" ({})", m.region));
            }
            prompt.push('\n');
        }
    }

    prompt
}
