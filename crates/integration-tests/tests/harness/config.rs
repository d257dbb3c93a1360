//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use conduit_config::{Config, LlmProviderConfig, LlmProviderType, ModelMatchConfig};
use secrecy::SecretString;

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.listen_address = Some(SocketAddr::from(([127, 0, 0, 1], 0)));
        Self { config }
    }

    /// Add a provider pointed at a mock backend, keyed with `test-key`
    pub fn with_provider(mut self, name: &str, kind: LlmProviderType, base_url: &str) -> Self {
        self.config.llm.providers.insert(
            name.to_owned(),
            LlmProviderConfig {
                provider_type: kind,
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                models: ModelMatchConfig::default(),
                forward_authorization: true,
                timeout: Some(5),
            },
        );
        self
    }

    pub fn with_models(mut self, provider: &str, names: &[&str], prefixes: &[&str]) -> Self {
        let models = &mut self.provider(provider).models;
        models.names = names.iter().map(|&name| name.to_owned()).collect();
        models.prefixes = prefixes.iter().map(|&prefix| prefix.to_owned()).collect();
        self
    }

    pub fn with_default_provider(mut self, name: &str) -> Self {
        self.config.llm.default_provider = Some(name.to_owned());
        self
    }

    pub fn without_forwarding(mut self, provider: &str) -> Self {
        self.provider(provider).forward_authorization = false;
        self
    }

    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    fn provider(&mut self, name: &str) -> &mut LlmProviderConfig {
        self.config
            .llm
            .providers
            .get_mut(name)
            .expect("provider added before configuring it")
    }
}
