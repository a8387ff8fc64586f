use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    error::{Result, ServerError},
    models::ToolDefinition,
};

pub const TOOL_NAME_SEPARATOR: char = '_';

/// A category of tools backed by one implementation object.
///
/// `list_tools` returns definitions with bare method names; the registry
/// prefixes them with the category when flattening the catalog.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDefinition>;

    async fn invoke(&self, method: &str, args: Value) -> anyhow::Result<Value>;
}

pub type ProviderFactory = Box<dyn FnOnce() -> anyhow::Result<Arc<dyn ToolProvider>> + Send>;

pub fn provider_factory<P, F>(build: F) -> ProviderFactory
where
    P: ToolProvider + 'static,
    F: FnOnce() -> anyhow::Result<P> + Send + 'static,
{
    Box::new(move || build().map(|provider| Arc::new(provider) as Arc<dyn ToolProvider>))
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    providers: Vec<(String, Arc<dyn ToolProvider>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs every provider up front. The first factory failure aborts
    /// the whole registry.
    pub fn initialize<I, S>(factories: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ProviderFactory)>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for (category, factory) in factories {
            let category = category.into();
            let provider = factory().map_err(|reason| ServerError::Configuration {
                category: category.clone(),
                reason,
            })?;
            registry.register(category, provider);
        }
        info!(categories = registry.len(), "Tool registry initialized");
        Ok(registry)
    }

    pub fn register(&mut self, category: impl Into<String>, provider: Arc<dyn ToolProvider>) {
        let category = category.into();
        if category.contains(TOOL_NAME_SEPARATOR) {
            warn!(
                category = %category,
                "Category contains `_`; flattened tool names will route on the first separator"
            );
        }

        if let Some(slot) = self.providers.iter_mut().find(|(name, _)| *name == category) {
            warn!(category = %category, "Replacing previously registered tool provider");
            slot.1 = provider;
            return;
        }

        self.providers.push((category, provider));
    }

    pub fn get(&self, category: &str) -> Option<&Arc<dyn ToolProvider>> {
        self.providers
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, provider)| provider)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn build_catalog(&self) -> Vec<ToolDefinition> {
        self.providers
            .iter()
            .flat_map(|(category, provider)| {
                provider.list_tools().into_iter().map(move |tool| {
                    ToolDefinition::new(
                        flat_tool_name(category, &tool.name),
                        tool.description,
                        tool.input_schema,
                    )
                })
            })
            .collect()
    }
}

pub fn flat_tool_name(category: &str, method: &str) -> String {
    format!("{category}{TOOL_NAME_SEPARATOR}{method}")
}

/// Splits on the first separator only. A name without one yields an empty
/// method.
pub fn split_tool_name(full_name: &str) -> (&str, &str) {
    full_name
        .split_once(TOOL_NAME_SEPARATOR)
        .unwrap_or((full_name, ""))
}
