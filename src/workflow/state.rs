//! Shared state threaded through the stages of one request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ErrorKind;
use crate::index::PolicyRecord;

// ── Messages ────────────────────────────────────────────────────────

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation message. Immutable once created; the only message
/// the workflow ever appends is the final assistant answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// ── User context ────────────────────────────────────────────────────

/// Structured facts about the requester. Read-only input; the workflow
/// never mutates it and never fabricates missing fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_income_bracket: Option<String>,
}

impl UserContext {
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.region.is_none()
            && self.employment_status.is_none()
            && self.monthly_income_bracket.is_none()
    }
}

// ── Routing ─────────────────────────────────────────────────────────

/// Router verdict for one request. Set exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    /// The question needs policy retrieval before answering.
    NeedsRetrieval,
    /// The message can be answered directly (greeting, small talk).
    DirectResponse,
    /// Nothing to do — empty or unusable input.
    Terminated,
}

impl RoutingDecision {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NeedsRetrieval => "needs_retrieval",
            Self::DirectResponse => "direct_response",
            Self::Terminated => "terminated",
        }
    }
}

/// Workflow stages, in the order they may run. Serialized into response
/// metadata as `stages_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Router,
    Retrieval,
    Synthesis,
}

// ── Search results ──────────────────────────────────────────────────

/// A retrieved policy with its similarity score. Created fresh per
/// request by the retrieval agent and discarded with the request.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyMatch {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub region: String,
    pub similarity_score: f32,
}

impl PolicyMatch {
    pub fn from_record(record: &PolicyRecord, similarity_score: f32) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            category: record.category.clone(),
            region: record.region.clone(),
            similarity_score,
        }
    }
}

// ── Workflow state ──────────────────────────────────────────────────

/// The single mutable object threaded through every stage of one
/// request. Exclusively owned by that request; never shared across
/// requests or stored beyond the request's call stack.
#[derive(Debug)]
pub struct WorkflowState {
    /// Conversation in insertion order. The final assistant answer is
    /// appended when synthesis completes.
    pub messages: Vec<Message>,
    pub user_context: UserContext,
    routing_decision: Option<RoutingDecision>,
    /// Ordered similarity-descending; never re-sorted downstream.
    pub search_results: Vec<PolicyMatch>,
    final_answer: Option<String>,
    error: Option<ErrorKind>,
    stages_run: Vec<Stage>,
}

impl WorkflowState {
    /// Initial state for one inbound message.
    pub fn new(message: impl Into<String>, user_context: UserContext) -> Self {
        Self {
            messages: vec![Message::user(message)],
            user_context,
            routing_decision: None,
            search_results: Vec::new(),
            final_answer: None,
            error: None,
            stages_run: Vec::new(),
        }
    }

    /// The most recent user message. Requests always start with one.
    pub fn latest_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
            .unwrap_or_default()
    }

    pub fn routing_decision(&self) -> Option<RoutingDecision> {
        self.routing_decision
    }

    /// Set the routing decision. Write-once: a second write is ignored.
    pub fn set_routing_decision(&mut self, decision: RoutingDecision) {
        if let Some(existing) = self.routing_decision {
            warn!(
                existing = existing.label(),
                attempted = decision.label(),
                "Ignoring second routing decision write"
            );
            return;
        }
        self.routing_decision = Some(decision);
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// Set the final answer and append it to the conversation.
    /// Write-once: a second write is ignored.
    pub fn set_final_answer(&mut self, answer: impl Into<String>) {
        if self.final_answer.is_some() {
            warn!("Ignoring second final answer write");
            return;
        }
        let answer = answer.into();
        self.messages.push(Message::assistant(answer.clone()));
        self.final_answer = Some(answer);
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    /// Record a recovered per-request error. The first error is
    /// terminal — later ones are logged and dropped.
    pub fn record_error(&mut self, kind: ErrorKind) {
        match self.error {
            Some(existing) => warn!(
                existing = existing.label(),
                dropped = kind.label(),
                "Error already recorded for this request"
            ),
            None => self.error = Some(kind),
        }
    }

    pub fn push_stage(&mut self, stage: Stage) {
        self.stages_run.push(stage);
    }

    pub fn stages_run(&self) -> &[Stage] {
        &self.stages_run
    }
}
