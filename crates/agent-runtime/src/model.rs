//! Model Selection
//!
//! Resolves which model and provider to use from the environment:
//!
//! | Variable      | Default    |
//! |---------------|------------|
//! | `AI_PROVIDER` | `ollama`   |
//! | `AI_MODEL`    | `llama3.2` |
//!
//! Hosted providers need their credential variable set. The credential is
//! referenced by name only; its value never leaves the environment.

use std::sync::Arc;

use agent_core::{AgentError, GenerationOptions, LlmProvider};

/// Context window assumed for every model
pub const DEFAULT_CONTEXT_WINDOW: u32 = 128_000;

/// Generation cap assumed for every model
pub const DEFAULT_MAX_TOKENS: u32 = 8_192;

const DEFAULT_PROVIDER: &str = "ollama";
const DEFAULT_MODEL: &str = "llama3.2";

struct ProviderEntry {
    name: &'static str,
    api: &'static str,
    key_env: Option<&'static str>,
}

// The first entry is the fallback for unknown names
const PROVIDERS: &[ProviderEntry] = &[
    ProviderEntry { name: "ollama", api: "ollama-chat", key_env: None },
    ProviderEntry { name: "openai", api: "openai-completions", key_env: Some("OPENAI_API_KEY") },
    ProviderEntry { name: "anthropic", api: "anthropic-messages", key_env: Some("ANTHROPIC_API_KEY") },
    ProviderEntry { name: "google", api: "google-generative-ai", key_env: Some("GOOGLE_API_KEY") },
    ProviderEntry { name: "deepseek", api: "openai-completions", key_env: Some("OPENAI_API_KEY") },
];

fn provider_entry(name: &str) -> &'static ProviderEntry {
    PROVIDERS
        .iter()
        .find(|p| p.name == name)
        .unwrap_or(&PROVIDERS[0])
}

/// Opaque model handle passed through to session creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    /// API family, e.g. `anthropic-messages`
    pub api: String,
    pub provider: String,
    /// Name of the variable holding the credential
    pub api_key_env: Option<String>,
    pub context_window: u32,
    pub max_tokens: u32,
}

impl ModelSpec {
    /// Resolve from process environment
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for variable access. Unknown providers fall
    /// back to the default one; a missing credential is a config error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let requested = non_empty("AI_PROVIDER").unwrap_or_else(|| DEFAULT_PROVIDER.into());
        let entry = provider_entry(&requested.to_lowercase());
        if entry.name != requested.to_lowercase() {
            tracing::warn!(requested = %requested, using = entry.name, "Unknown AI_PROVIDER");
        }

        if let Some(key) = entry.key_env {
            if non_empty(key).is_none() {
                return Err(AgentError::Config(format!(
                    "Missing {key}: set it in .env or export it"
                )));
            }
        }

        let id = non_empty("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        Ok(Self {
            name: id.clone(),
            id,
            api: entry.api.into(),
            provider: entry.name.into(),
            api_key_env: entry.key_env.map(Into::into),
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Generation options for requests against this model
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.id.clone(),
            max_tokens: self.max_tokens,
            ..GenerationOptions::default()
        }
    }
}

impl std::fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

/// Instantiate a client for `spec`. Only providers compiled into this build
/// can be built.
pub fn build_provider(spec: &ModelSpec) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match spec.provider.as_str() {
        #[cfg(feature = "ollama")]
        "ollama" => Ok(Arc::new(crate::ollama::OllamaProvider::from_env())),
        other => Err(AgentError::Config(format!(
            "No client for provider '{other}' in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_local_ollama() {
        let spec = ModelSpec::from_lookup(lookup(&[])).unwrap();
        assert_eq!(spec.provider, "ollama");
        assert_eq!(spec.id, "llama3.2");
        assert_eq!(spec.api, "ollama-chat");
        assert_eq!(spec.api_key_env, None);
        assert_eq!(spec.context_window, 128_000);
        assert_eq!(spec.max_tokens, 8_192);
    }

    #[test]
    fn test_hosted_provider_requires_key() {
        let err = ModelSpec::from_lookup(lookup(&[("AI_PROVIDER", "anthropic")])).unwrap_err();
        assert!(matches!(err, AgentError::Config(msg) if msg.contains("ANTHROPIC_API_KEY")));

        let spec = ModelSpec::from_lookup(lookup(&[
            ("AI_PROVIDER", "deepseek"),
            ("AI_MODEL", "deepseek-chat"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(spec.api, "openai-completions");
        assert_eq!(spec.provider, "deepseek");
        assert_eq!(spec.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
        assert_eq!(spec.to_string(), "deepseek/deepseek-chat");
    }

    #[test]
    fn test_unknown_provider_falls_back() {
        let spec = ModelSpec::from_lookup(lookup(&[("AI_PROVIDER", "mystery")])).unwrap();
        assert_eq!(spec.provider, "ollama");
    }

    #[test]
    fn test_generation_options_carry_model() {
        let spec = ModelSpec::from_lookup(lookup(&[("AI_MODEL", "qwen2.5")])).unwrap();
        let options = spec.generation_options();
        assert_eq!(options.model, "qwen2.5");
        assert_eq!(options.max_tokens, 8_192);
    }

    #[test]
    fn test_build_provider_rejects_missing_client() {
        let spec = ModelSpec::from_lookup(lookup(&[
            ("AI_PROVIDER", "google"),
            ("GOOGLE_API_KEY", "g"),
        ]))
        .unwrap();
        assert!(matches!(build_provider(&spec), Err(AgentError::Config(_))));
    }
}
