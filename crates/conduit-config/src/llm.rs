use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level LLM relay configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Upstream providers keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, LlmProviderConfig>,
    /// Provider that serves any model no other rule matches
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Capacity of the per-request outbound SSE frame queue
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: IndexMap::new(),
            default_provider: None,
            stream_buffer: default_stream_buffer(),
        }
    }
}

impl LlmConfig {
    /// Name of the provider used for unmatched models
    ///
    /// An explicit `default_provider` wins. A single configured provider
    /// is implicitly the default; with several and no explicit choice
    /// there is none.
    pub fn effective_default(&self) -> Option<&str> {
        if let Some(name) = self.default_provider.as_deref() {
            return Some(name);
        }

        match self.providers.len() {
            1 => self.providers.keys().next().map(String::as_str),
            _ => None,
        }
    }
}

/// Configuration for a single upstream provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmProviderConfig {
    /// Provider wire protocol
    #[serde(rename = "type")]
    pub provider_type: LlmProviderType,
    /// Credential used when the client does not supply one
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Models this provider answers for
    #[serde(default)]
    pub models: ModelMatchConfig,
    /// Forward the client's bearer credential upstream
    #[serde(default = "default_forward_authorization")]
    pub forward_authorization: bool,
    /// Connect timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Supported upstream protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderType {
    /// OpenAI-compatible chat completions
    Openai,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
}

/// Static model matching rules for a provider
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelMatchConfig {
    /// Model identifiers matched exactly
    #[serde(default)]
    pub names: Vec<String>,
    /// Model identifier prefixes (e.g. `claude-`)
    #[serde(default)]
    pub prefixes: Vec<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_forward_authorization() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_stream_buffer() -> usize {
    64
}
