//! Model to provider resolution
//!
//! The registry is built once from configuration and never mutated, so
//! lookups take `&self` and need no locking.

use std::collections::HashMap;

use conduit_config::LlmConfig;
use indexmap::IndexMap;

use crate::adaptor::Provider;
use crate::error::RelayError;

/// Target chosen for a requested model
#[derive(Debug)]
pub struct Resolved<'a> {
    pub provider: &'a Provider,
    /// Model id sent upstream
    pub model: String,
    /// The client named the provider with `provider/model`
    pub explicit: bool,
}

/// Static, read-only provider registry
#[derive(Debug)]
pub struct AdaptorRegistry {
    providers: IndexMap<String, Provider>,
    exact: HashMap<String, usize>,
    /// Sorted longest first so the most specific prefix wins
    prefixes: Vec<(String, usize)>,
    default: Option<usize>,
}

impl AdaptorRegistry {
    pub fn from_config(config: &LlmConfig) -> Result<Self, RelayError> {
        let mut providers = IndexMap::with_capacity(config.providers.len());
        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();

        for (index, (name, provider_config)) in config.providers.iter().enumerate() {
            providers.insert(name.clone(), Provider::from_config(name, provider_config)?);

            for model in &provider_config.models.names {
                exact.entry(model.clone()).or_insert(index);
            }

            for prefix in &provider_config.models.prefixes {
                prefixes.push((prefix.clone(), index));
            }
        }

        prefixes.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));

        let default = match config.effective_default() {
            Some(name) => Some(providers.get_index_of(name).ok_or_else(|| {
                RelayError::Internal(anyhow::anyhow!("default provider '{name}' is not configured"))
            })?),
            None => None,
        };

        tracing::debug!(
            providers = providers.len(),
            exact = exact.len(),
            prefixes = prefixes.len(),
            default = config.effective_default().unwrap_or("none"),
            "provider registry built"
        );

        Ok(Self {
            providers,
            exact,
            prefixes,
            default,
        })
    }

    /// Pick the provider for a requested model
    ///
    /// Order: explicit `provider/model`, exact name, longest prefix, then
    /// the default provider. A slash whose left side is not a provider
    /// name is treated as part of the model id.
    pub fn resolve(&self, requested: &str) -> Result<Resolved<'_>, RelayError> {
        if let Some((name, model)) = requested.split_once('/')
            && let Some(provider) = self.providers.get(name)
            && !model.is_empty()
        {
            return Ok(Resolved {
                provider,
                model: model.to_owned(),
                explicit: true,
            });
        }

        let index = self
            .exact
            .get(requested)
            .copied()
            .or_else(|| {
                self.prefixes
                    .iter()
                    .find(|(prefix, _)| requested.starts_with(prefix.as_str()))
                    .map(|(_, index)| *index)
            })
            .or(self.default)
            .ok_or_else(|| RelayError::AdaptorNotFound {
                model: requested.to_owned(),
            })?;

        let (_, provider) = self
            .providers
            .get_index(index)
            .ok_or_else(|| RelayError::Internal(anyhow::anyhow!("provider index {index} out of range")))?;

        Ok(Resolved {
            provider,
            model: requested.to_owned(),
            explicit: false,
        })
    }

    /// Statically listed models with their owning provider
    pub fn models(&self) -> Vec<(&str, &str)> {
        let mut models: Vec<(&str, &str)> = self
            .exact
            .iter()
            .filter_map(|(model, index)| {
                self.providers
                    .get_index(*index)
                    .map(|(name, _)| (model.as_str(), name.as_str()))
            })
            .collect();

        models.sort_unstable();
        models
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
