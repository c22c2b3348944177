//! Policy Assist — retrieval-augmented youth policy Q&A core.

pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod server;
pub mod workflow;
