use std::collections::HashMap;
use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Expand, deserialize and validate configuration text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured, the default provider
    /// is unknown, or model matching rules are ambiguous
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one LLM provider must be configured");
        }

        if self.llm.stream_buffer == 0 {
            anyhow::bail!("llm.stream_buffer must be greater than 0");
        }

        if let Some(ref name) = self.llm.default_provider
            && !self.llm.providers.contains_key(name)
        {
            anyhow::bail!("llm.default_provider '{name}' is not a configured provider");
        }

        self.validate_model_rules()
    }

    /// Exact names must be unique across providers and prefixes non-empty
    fn validate_model_rules(&self) -> anyhow::Result<()> {
        let mut owners: HashMap<&str, &str> = HashMap::new();

        for (provider, config) in &self.llm.providers {
            if provider.contains('/') {
                anyhow::bail!("provider name '{provider}' must not contain '/'");
            }

            for model in &config.models.names {
                if let Some(previous) = owners.insert(model.as_str(), provider.as_str())
                    && previous != provider.as_str()
                {
                    anyhow::bail!("model '{model}' is listed by both '{previous}' and '{provider}'");
                }
            }

            if config.models.prefixes.iter().any(String::is_empty) {
                anyhow::bail!("provider '{provider}' has an empty model prefix");
            }
        }

        Ok(())
    }
}
