//! Conversation engines for lead qualification and customer support.
//!
//! Every inbound message runs a fixed pipeline:
//! 1. **Plan** (`planner`) - one JSON completion decides intent, extracted fields and whether
//!    to advance the SPIN phase.
//! 2. **Extract** (`conversation`) - keyword extraction fills fields the plan left empty.
//! 3. **Write** (`writer`) - one completion drafts the reply.
//! 4. **Check / Repair** (`guardrails`) - deterministic style checks, local fixes, and at most
//!    one regeneration before falling back to a canned question.
//!
//! Completions never decide scores or stage transitions; those stay in `leadflow-core`.
//! Every completion step has a deterministic fallback, so a turn always produces a reply.

pub mod conversation;
pub mod error;
pub mod guardrails;
pub mod llm;
pub mod locks;
pub mod planner;
pub mod prompts;
pub mod runtime;
pub mod scripted;
pub mod support;
pub mod writer;

pub use error::EngineError;
pub use llm::{CompletionClient, CompletionError, HttpCompletionClient};
pub use runtime::{EngineSettings, QualificationEngine, TurnOutcome};
pub use scripted::{OfflineCompletionClient, ScriptedCompletionClient};
pub use support::{SupportAgent, SupportOutcome};
