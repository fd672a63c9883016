//! Agent assembly from configuration.
//!
//! Every command that needs a live [`Agent`] funnels through here: resolve
//! providers from the config sections, open the record store, wire the
//! builder. Missing credentials are only an error for providers that need
//! them; the default `mock` providers keep the deterministic paths (lexical
//! routing, keyword relevance, hash embeddings) working offline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use epistle_agent::{Agent, DuckDuckGoSearch};
use epistle_config::{EmbeddingSection, EpistleConfig, LlmSection, MailSection};
use epistle_llm::{
    EmbedderSpec, OpenAiConfig, SharedBackend, SharedEmbedder, build_embedder,
    create_shared_backend,
};
use epistle_mail::{FixtureConnector, MockConnector, SharedConnector};
use epistle_store::RecordStore;

/// Default chat model per provider when `[llm] model` is unset.
fn default_model(provider: &str) -> &'static str {
    match provider {
        "groq" => "llama-3.3-70b-versatile",
        "ollama" => "llama3.2",
        _ => "gpt-4o-mini",
    }
}

/// Open the record store at the configured path.
pub fn open_store(config: &EpistleConfig) -> Result<Arc<RecordStore>> {
    epistle_store::init_vector_extension();
    let db_path = config.storage.effective_db_path();
    debug!(path = %db_path.display(), "opening record store");
    let store = RecordStore::open(&db_path).map_err(|e| {
        anyhow::anyhow!("failed to open record store at {}: {}", db_path.display(), e)
    })?;
    Ok(Arc::new(store))
}

/// Build a fully wired agent from the effective configuration.
pub fn build_agent(config: &EpistleConfig) -> Result<Agent> {
    let store = open_store(config)?;

    let mut builder = Agent::builder()
        .with_connector(connector_from(&config.mail)?)
        .with_store(store)
        .with_search(Arc::new(DuckDuckGoSearch::new()?))
        .with_embedder(embedder_from(&config.embedding)?)
        .with_ingest(config.ingest.clone())
        .with_retrieval(config.retrieval.clone())
        .with_reminders(config.reminders.clone());

    if let Some((backend, model)) = backend_from(&config.llm)? {
        builder = builder.with_backend(backend, model);
    }

    Ok(builder.build()?)
}

/// The mail connector: a JSON fixture mailbox when configured, otherwise an
/// empty mock.
fn connector_from(section: &MailSection) -> Result<SharedConnector> {
    match &section.fixture_path {
        Some(path) => Ok(Arc::new(FixtureConnector::load(path)?)),
        None => {
            debug!("no mailbox fixture configured, using an empty mock mailbox");
            Ok(Arc::new(MockConnector::new()))
        }
    }
}

/// The chat backend, or `None` for the `mock` provider (scans produce
/// minimal records, answers fall back to deterministic listings).
fn backend_from(section: &LlmSection) -> Result<Option<(SharedBackend, String)>> {
    let model = section
        .model
        .clone()
        .unwrap_or_else(|| default_model(&section.provider).to_string());

    let config = match section.provider.as_str() {
        "mock" => return Ok(None),
        "openai" => {
            let api_key = section
                .resolve_api_key()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "[llm] provider 'openai' requires an API key. \
                         Set api_key_env in the config or the OPENAI_API_KEY environment variable."
                    )
                })?;
            OpenAiConfig::openai(api_key)
        }
        "groq" => {
            let api_key = section
                .resolve_api_key()
                .or_else(|| std::env::var("GROQ_API_KEY").ok())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "[llm] provider 'groq' requires an API key. \
                         Set api_key_env in the config or the GROQ_API_KEY environment variable."
                    )
                })?;
            OpenAiConfig::groq(api_key)
        }
        "ollama" => OpenAiConfig::ollama(),
        other => {
            return Err(anyhow::anyhow!(
                "Unknown [llm] provider '{}'. Valid: openai, groq, ollama, mock",
                other
            ));
        }
    };

    let mut config = config
        .with_model(&model)
        .with_timeout(Duration::from_secs(section.timeout_secs))
        .with_max_retries(section.max_retries);
    if let Some(base_url) = &section.base_url {
        config = config.with_base_url(base_url);
    }

    Ok(Some((create_shared_backend(config)?, model)))
}

/// The embedder. The default `mock` provider keeps vector search working
/// deterministically without credentials.
fn embedder_from(section: &EmbeddingSection) -> Result<SharedEmbedder> {
    let api_key = section
        .api_key_env
        .as_ref()
        .and_then(|var| std::env::var(var).ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    let spec = EmbedderSpec {
        provider: section.provider.clone(),
        api_key,
        model: Some(section.model.clone()),
        base_url: section.base_url.clone(),
        dimensions: Some(section.dimensions),
    };
    Ok(build_embedder(&spec)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use epistle_llm::Embedder;

    #[test]
    fn test_default_models_per_provider() {
        assert_eq!(default_model("groq"), "llama-3.3-70b-versatile");
        assert_eq!(default_model("ollama"), "llama3.2");
        assert_eq!(default_model("openai"), "gpt-4o-mini");
    }

    #[test]
    fn test_mock_provider_builds_no_backend() {
        let section = LlmSection::default();
        assert_eq!(section.provider, "mock");
        assert!(backend_from(&section).unwrap().is_none());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let section = LlmSection {
            provider: "carrier-pigeon".to_string(),
            ..LlmSection::default()
        };
        let err = backend_from(&section).unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let section = LlmSection {
            provider: "ollama".to_string(),
            ..LlmSection::default()
        };
        let (_backend, model) = backend_from(&section).unwrap().unwrap();
        assert_eq!(model, "llama3.2");
    }

    #[test]
    fn test_default_embedder_is_mock() {
        let embedder = embedder_from(&EmbeddingSection::default()).unwrap();
        assert_eq!(embedder.name(), "mock");
        assert_eq!(embedder.dimensions(), 384);
    }

    #[tokio::test]
    async fn test_build_agent_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = EpistleConfig::default();
        config.storage.db_path = Some(dir.path().join("records.db"));

        let agent = build_agent(&config).unwrap();
        let report = agent.run_scan(None, None, false).await.unwrap();
        assert_eq!(report.fetched, 0);
    }
}
