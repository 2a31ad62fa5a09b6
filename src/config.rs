//! Pipeline configuration and the model registry (the YAML schema the
//! Router, Extractor, and Refinement Analyzer resolve model ids against).
//!
//! [`PipelineConfig`] holds every numeric/boolean knob the core honors; it is
//! built through [`PipelineConfigBuilder`], whose setters clamp out-of-range
//! input the moment it is supplied rather than deferring the check to
//! `build()`. [`ModelRegistry`] is the deserialized, validated model list
//! the Router, Extractor, and Refinement Analyzer draw model ids and
//! fallback chains from — loaded independently of `PipelineConfig` since it
//! has its own document and its own validation rules.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::model::LlmModelSpec;
use crate::progress::ProgressCallback;

/// Pipeline-wide options shared by every page a run processes. Cheap to
/// clone: everything heavy (the model registry, the progress callback) is
/// behind an `Arc`, and the cancellation token is itself a cheap `Arc`-backed
/// handle shared with the caller.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Max pages in flight at once (the Orchestrator's semaphore size).
    pub concurrency_limit: usize,
    /// Global LLM-call budget per minute, shared by every page.
    pub rate_limit_per_minute: u32,
    /// Inclusive of the initial try: `1` disables retries entirely.
    pub retry_max_attempts: u32,
    /// Seconds; backoff doubles per retry attempt.
    pub retry_initial_delay: f64,
    pub iterative_refinement_enabled: bool,
    /// Hard ceiling on refinement loops per page; `0` disables refinement
    /// even when `iterative_refinement_enabled` is true.
    pub max_refinement_cycles: u32,
    /// Per-call timeout handed to the LLM Client; a timeout is classified
    /// `transient_http` and is therefore retriable.
    pub call_timeout: Duration,
    pub registry: Arc<ModelRegistry>,
    pub progress_callback: Option<ProgressCallback>,
    /// Cooperative cancellation for the whole run. Cloned into every page
    /// task; checked before each LLM call and while waiting on the rate
    /// limiter, so once the caller cancels this token no further call
    /// reaches a provider. Defaults to a token nobody else holds, i.e. a
    /// no-op, unless the caller supplies its own via the builder.
    pub cancellation_token: CancellationToken,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency_limit", &self.concurrency_limit)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_delay", &self.retry_initial_delay)
            .field("iterative_refinement_enabled", &self.iterative_refinement_enabled)
            .field("max_refinement_cycles", &self.max_refinement_cycles)
            .field("call_timeout", &self.call_timeout)
            .field("registry_models", &self.registry.models.len())
            .field("progress_callback", &self.progress_callback.is_some())
            .field("cancellation_token_cancelled", &self.cancellation_token.is_cancelled())
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder(registry: ModelRegistry) -> PipelineConfigBuilder {
        PipelineConfigBuilder::new(registry)
    }
}

/// Builder for [`PipelineConfig`]. Every setter clamps its input to the
/// documented valid range immediately; `build()` only needs to check
/// invariants that span multiple fields.
pub struct PipelineConfigBuilder {
    concurrency_limit: usize,
    rate_limit_per_minute: u32,
    retry_max_attempts: u32,
    retry_initial_delay: f64,
    iterative_refinement_enabled: bool,
    max_refinement_cycles: u32,
    call_timeout: Duration,
    registry: ModelRegistry,
    progress_callback: Option<ProgressCallback>,
    cancellation_token: CancellationToken,
}

impl PipelineConfigBuilder {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            concurrency_limit: 10,
            rate_limit_per_minute: 60,
            retry_max_attempts: 3,
            retry_initial_delay: 1.0,
            iterative_refinement_enabled: false,
            max_refinement_cycles: 2,
            call_timeout: Duration::from_secs(60),
            registry,
            progress_callback: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn concurrency_limit(mut self, n: usize) -> Self {
        self.concurrency_limit = n.max(1);
        self
    }

    pub fn rate_limit_per_minute(mut self, n: u32) -> Self {
        self.rate_limit_per_minute = n.max(1);
        self
    }

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.retry_max_attempts = n.max(1);
        self
    }

    pub fn retry_initial_delay(mut self, secs: f64) -> Self {
        self.retry_initial_delay = secs.max(0.001);
        self
    }

    pub fn iterative_refinement_enabled(mut self, enabled: bool) -> Self {
        self.iterative_refinement_enabled = enabled;
        self
    }

    pub fn max_refinement_cycles(mut self, n: u32) -> Self {
        self.max_refinement_cycles = n;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Supply a caller-owned cancellation token. Call `.cancel()` on the same
    /// token (kept by the caller) at any point to stop the run from issuing
    /// any further LLM calls; pages already past their last call still
    /// finish, everything else is dropped from the result.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        if self.retry_initial_delay <= 0.0 {
            return Err(PipelineError::InvalidConfig(
                "retry_initial_delay must be > 0".into(),
            ));
        }
        Ok(PipelineConfig {
            concurrency_limit: self.concurrency_limit,
            rate_limit_per_minute: self.rate_limit_per_minute,
            retry_max_attempts: self.retry_max_attempts,
            retry_initial_delay: self.retry_initial_delay,
            iterative_refinement_enabled: self.iterative_refinement_enabled,
            max_refinement_cycles: self.max_refinement_cycles,
            call_timeout: self.call_timeout,
            registry: Arc::new(self.registry),
            progress_callback: self.progress_callback,
            cancellation_token: self.cancellation_token,
        })
    }
}

// ── Model registry (YAML schema) ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct RegistryFile {
    default_models: DefaultModels,
    models: HashMap<String, ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct DefaultModels {
    router: String,
    extraction: String,
    summarizer: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ModelEntry {
    provider: String,
    token_limit: u32,
    is_vision_capable: bool,
    #[serde(default)]
    fallback: Option<String>,
}

/// A validated, in-memory view of the YAML model registry: every referenced
/// id exists, every fallback graph is acyclic, and a vision-capable model
/// exists for every role that attaches a page image to its call — router,
/// extraction, and the summarizer role the Refinement Analyzer calls.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    pub default_router: String,
    pub default_extraction: String,
    pub default_summarizer: String,
    pub models: HashMap<String, LlmModelSpec>,
}

impl ModelRegistry {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| PipelineError::InvalidModelRegistry(format!("YAML parse error: {e}")))?;
        Self::from_file(file)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidModelRegistry(format!(
                "failed to read model registry '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    fn from_file(file: RegistryFile) -> Result<Self, PipelineError> {
        let models: HashMap<String, LlmModelSpec> = file
            .models
            .into_iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    LlmModelSpec {
                        model_id: id,
                        provider: entry.provider,
                        token_limit: entry.token_limit,
                        is_vision_capable: entry.is_vision_capable,
                        fallback: entry.fallback,
                    },
                )
            })
            .collect();

        let registry = ModelRegistry {
            default_router: file.default_models.router,
            default_extraction: file.default_models.extraction,
            default_summarizer: file.default_models.summarizer,
            models,
        };
        registry.validate()?;
        Ok(registry)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        for id in [&self.default_router, &self.default_extraction, &self.default_summarizer] {
            if !self.models.contains_key(id) {
                return Err(PipelineError::InvalidModelRegistry(format!(
                    "default model '{id}' is not declared in `models`"
                )));
            }
        }

        for (id, spec) in &self.models {
            if let Some(ref fallback) = spec.fallback {
                if !self.models.contains_key(fallback) {
                    return Err(PipelineError::InvalidModelRegistry(format!(
                        "model '{id}' declares fallback '{fallback}' which is not declared in `models`"
                    )));
                }
            }
        }

        for id in self.models.keys() {
            self.fallback_chain(id).map_err(|e| {
                PipelineError::InvalidModelRegistry(format!("fallback chain from '{id}': {e}"))
            })?;
        }

        if !self.models.get(&self.default_router).map(|m| m.is_vision_capable).unwrap_or(false) {
            return Err(PipelineError::InvalidModelRegistry(format!(
                "router model '{}' must be vision-capable",
                self.default_router
            )));
        }
        if !self
            .models
            .get(&self.default_extraction)
            .map(|m| m.is_vision_capable)
            .unwrap_or(false)
        {
            return Err(PipelineError::InvalidModelRegistry(format!(
                "extraction model '{}' must be vision-capable",
                self.default_extraction
            )));
        }
        if !self
            .models
            .get(&self.default_summarizer)
            .map(|m| m.is_vision_capable)
            .unwrap_or(false)
        {
            return Err(PipelineError::InvalidModelRegistry(format!(
                "summarizer model '{}' must be vision-capable",
                self.default_summarizer
            )));
        }

        Ok(())
    }

    pub fn get(&self, model_id: &str) -> Option<&LlmModelSpec> {
        self.models.get(model_id)
    }

    /// Walk `model_id.fallback` transitively, stopping before any id already
    /// visited. Returns `Err` if a cycle is detected — the registry's
    /// fallback graph must be acyclic so a chain always terminates.
    pub fn fallback_chain(&self, model_id: &str) -> Result<Vec<String>, String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = model_id.to_string();
        loop {
            if !seen.insert(current.clone()) {
                return Err(format!("cycle detected revisiting '{current}'"));
            }
            chain.push(current.clone());
            match self.models.get(&current).and_then(|m| m.fallback.clone()) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_YAML: &str = r#"
default_models:
  router: gpt-4.1-nano
  extraction: gpt-4.1-nano
  summarizer: gpt-4.1-nano
models:
  gpt-4.1-nano:
    provider: openai
    token_limit: 128000
    is_vision_capable: true
    fallback: gemini-flash
  gemini-flash:
    provider: gemini
    token_limit: 100000
    is_vision_capable: true
    fallback: null
  gpt-4.1-mini:
    provider: openai
    token_limit: 128000
    is_vision_capable: false
    fallback: null
"#;

    #[test]
    fn loads_valid_registry() {
        let reg = ModelRegistry::from_yaml_str(VALID_YAML).unwrap();
        assert_eq!(reg.default_router, "gpt-4.1-nano");
        assert_eq!(reg.models.len(), 3);
    }

    #[test]
    fn rejects_unknown_default_model() {
        let yaml = VALID_YAML.replace("router: gpt-4.1-nano", "router: nonexistent");
        assert!(ModelRegistry::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn rejects_unknown_fallback_target() {
        let yaml = VALID_YAML.replace("fallback: gemini-flash", "fallback: ghost-model");
        assert!(ModelRegistry::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn rejects_cyclic_fallback_chain() {
        let yaml = VALID_YAML.replace("fallback: null\n  gpt-4.1-mini", "fallback: gpt-4.1-nano\n  gpt-4.1-mini");
        assert!(ModelRegistry::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn rejects_non_vision_router_default() {
        let yaml = VALID_YAML.replace("router: gpt-4.1-nano", "router: gpt-4.1-mini");
        assert!(ModelRegistry::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn rejects_non_vision_summarizer_default() {
        let yaml = VALID_YAML.replace("summarizer: gpt-4.1-nano", "summarizer: gpt-4.1-mini");
        assert!(ModelRegistry::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn fallback_chain_walks_transitively() {
        let reg = ModelRegistry::from_yaml_str(VALID_YAML).unwrap();
        let chain = reg.fallback_chain("gpt-4.1-nano").unwrap();
        assert_eq!(chain, vec!["gpt-4.1-nano".to_string(), "gemini-flash".to_string()]);
    }

    #[test]
    fn builder_clamps_minimums() {
        let reg = ModelRegistry::from_yaml_str(VALID_YAML).unwrap();
        let cfg = PipelineConfig::builder(reg)
            .concurrency_limit(0)
            .rate_limit_per_minute(0)
            .retry_max_attempts(0)
            .build()
            .unwrap();
        assert_eq!(cfg.concurrency_limit, 1);
        assert_eq!(cfg.rate_limit_per_minute, 1);
        assert_eq!(cfg.retry_max_attempts, 1);
    }
}
