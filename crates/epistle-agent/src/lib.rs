//! Agent core for Epistle.
//!
//! This crate provides intent routing, the ingestion pipeline, retrieval,
//! spending analysis, reminder scheduling, and the alternatives finder that
//! power Epistle's mail-assistant features.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Agent                                                      │
//! │  - Routes each user turn to an intent                       │
//! │  - Dispatches to pipeline / retrieval / analyzer / reminders│
//! │  - Phrases results through the Responder                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌──────────┐    ┌──────────┐
//!       │ Ingest   │    │Retrieval │    │ Reminder │
//!       │ Pipeline │    │ Engine   │    │ Scheduler│
//!       └──────────┘    └──────────┘    └──────────┘
//!             │               │               │
//!       epistle-mail    epistle-store   epistle-notify
//!       epistle-llm     epistle-llm
//! ```
//!
//! # Core Components
//!
//! - [`Agent`]: The assembled facade; `handle_user_turn` and `run_scan`
//! - [`Router`]: Lexical-first intent classification
//! - [`IngestPipeline`]: Fetch, dedupe, filter, extract, commit
//! - [`RetrievalEngine`]: Semantic search with keyword fallback
//! - [`ReminderScheduler`]: Background due-reminder delivery

pub mod agent;
pub mod alternatives;
pub mod analyze;
pub mod error;
pub mod extraction;
pub mod pipeline;
pub mod relevance;
pub mod reminders;
pub mod responder;
pub mod retrieval;
pub mod router;

// Re-export core types
pub use error::{AgentError, Result};

// Re-export agent
pub use agent::{Agent, AgentBuilder};

// Re-export routing
pub use router::Router;

// Re-export ingestion
pub use pipeline::IngestPipeline;
pub use relevance::{Relevance, RelevanceFilter};

// Re-export extraction
pub use extraction::FieldExtractor;

// Re-export retrieval and analysis
pub use analyze::{SpendingAnalysis, SpendingAnalyzer};
pub use retrieval::RetrievalEngine;

// Re-export reminders
pub use reminders::{ReminderRunReport, ReminderScheduler};

// Re-export response assembly
pub use responder::Responder;

// Re-export the alternatives finder
pub use alternatives::{
    DuckDuckGoSearch, MockSearch, SharedSearch, WebHit, WebSearch, build_query, extract_price,
};
