//! LLM client abstraction for epistle.
//!
//! Chat completions and text embeddings behind the [`LlmBackend`] and
//! [`Embedder`] traits. The agent depends only on the traits, so tests and
//! offline runs swap in [`MockBackend`] and [`MockEmbedder`] without touching
//! call sites.
//!
//! Every supported provider (OpenAI, Groq, Ollama) speaks the OpenAI
//! chat-completions wire format, so a single [`OpenAiBackend`] covers all
//! three with different base URLs and auth rules.

pub mod backend;
pub mod embeddings;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, MockBackend, SharedBackend, with_retry};
pub use embeddings::{
    Embedder, EmbedderSpec, MockEmbedder, OpenAiEmbedder, OpenAiEmbedderConfig, SharedEmbedder,
    build_embedder, cosine_similarity,
};
pub use error::{LlmError, RateLimitInfo, Result};
pub use openai::{OpenAiBackend, OpenAiConfig, create_shared_backend};
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, Role, Usage};
