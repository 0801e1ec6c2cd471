//! Remote-state backend trait (spec §6.3), trimmed from the teacher's
//! `so0k-oxid::state::backend::StateBackend` to the two operations the
//! configuration core actually needs: reading outputs back out of a
//! previously-applied state, and rendering the generated backend stanza.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::value::DynValue;

/// A remote-state backend (`s3`, `gcs`, `azurerm`, `local`, ...). The core
/// doesn't implement any backend itself — it only needs to ask one, by
/// name, for the outputs already stored in state and for the HCL stanza to
/// generate into `backend.tf`.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the `outputs` map from state for the unit identified by `key`.
    async fn fetch_state_outputs(&self, key: &str) -> CoreResult<DynValue>;

    /// Render the `terraform { backend "<name>" { ... } }` stanza for the
    /// given config attributes.
    fn generate_backend_stanza(&self, config: &DynValue) -> CoreResult<String>;
}

/// A `Backend` that never succeeds, used when `remote_state` is declared
/// but no concrete backend implementation has been registered by the
/// embedder for that backend name.
pub struct UnregisteredBackend {
    pub name: String,
}

#[async_trait]
impl Backend for UnregisteredBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_state_outputs(&self, key: &str) -> CoreResult<DynValue> {
        Err(crate::error::CoreError::Other(format!(
            "no backend implementation registered for '{}' (requested key: {key})",
            self.name
        )))
    }

    fn generate_backend_stanza(&self, _config: &DynValue) -> CoreResult<String> {
        Err(crate::error::CoreError::Other(format!(
            "no backend implementation registered for '{}'",
            self.name
        )))
    }
}

/// The embedder's collection of concrete backend implementations, keyed by
/// backend name (`"s3"`, `"gcs"`, ...). Looked up by the dependency
/// resolver's optimized direct-state-read path (spec §4.6.2).
#[derive(Default)]
pub struct BackendRegistry {
    backends: std::collections::HashMap<String, std::sync::Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: std::sync::Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_backend_fails_fetch() {
        let backend = UnregisteredBackend { name: "s3".to_string() };
        assert!(backend.fetch_state_outputs("unit-a").await.is_err());
    }

    #[test]
    fn registry_round_trips_by_name() {
        let mut registry = BackendRegistry::new();
        registry.register(std::sync::Arc::new(UnregisteredBackend { name: "s3".to_string() }));
        assert!(registry.get("s3").is_some());
        assert!(registry.get("gcs").is_none());
    }
}
