//! Query orchestration workflow.
//!
//! One request flows Router → (Retrieval) → Synthesizer over a single
//! request-scoped `WorkflowState`, sequenced by the `Orchestrator`.

mod orchestrator;
mod retrieval;
mod router;
mod state;
mod synthesizer;

pub use orchestrator::{Orchestrator, WorkflowOutcome, WorkflowStatus};
pub use retrieval::RetrievalAgent;
pub use router::IntentRouter;
pub use state::{Message, PolicyMatch, Role, RoutingDecision, Stage, UserContext, WorkflowState};
pub use synthesizer::ResponseSynthesizer;
