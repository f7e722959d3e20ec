//! Capability registry for dispatching extraction calls.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use conductor_core::{Capability, CapabilityKind, ExtractionOutput, Result};

/// Registry mapping capability identifiers to their implementations.
///
/// New capabilities are added by registration, not by branching; the
/// worker resolves a job's chain positions through this registry.
pub struct CapabilityRegistry {
    capabilities: HashMap<CapabilityKind, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability. Replaces any existing one for the same kind.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.insert(capability.kind(), capability);
    }

    /// Look up the capability for a kind.
    pub fn get(&self, kind: CapabilityKind) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(&kind).cloned()
    }

    /// Execute through the registered capability for the given kind.
    pub async fn execute(
        &self,
        kind: CapabilityKind,
        data: &[u8],
        filename: &str,
        mime_type: &str,
        config: &JsonValue,
    ) -> Result<ExtractionOutput> {
        let capability = self.capabilities.get(&kind).ok_or_else(|| {
            conductor_core::Error::Internal(format!(
                "No capability registered for kind: {kind}"
            ))
        })?;
        capability.execute(data, filename, mime_type, config).await
    }

    /// List all kinds that have registered capabilities.
    pub fn available(&self) -> Vec<CapabilityKind> {
        self.capabilities.keys().copied().collect()
    }

    /// Check if a capability is registered for the given kind.
    pub fn has(&self, kind: CapabilityKind) -> bool {
        self.capabilities.contains_key(&kind)
    }

    /// Run health checks on all registered capabilities.
    pub async fn health_check_all(&self) -> HashMap<CapabilityKind, bool> {
        let mut results = HashMap::new();
        for (kind, capability) in &self.capabilities {
            let healthy = capability.health_check().await.unwrap_or(false);
            results.insert(*kind, healthy);
        }
        results
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::TextNativeAdapter;

    #[test]
    fn test_registry_new_is_empty() {
        let registry = CapabilityRegistry::new();
        assert!(registry.available().is_empty());
        assert!(!registry.has(CapabilityKind::TextNative));
    }

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(TextNativeAdapter));
        assert!(registry.has(CapabilityKind::TextNative));
        assert!(!registry.has(CapabilityKind::Ocr));
        assert_eq!(registry.available().len(), 1);
    }

    #[tokio::test]
    async fn test_registry_execute_missing_capability() {
        let registry = CapabilityRegistry::new();
        let result = registry
            .execute(
                CapabilityKind::Ocr,
                b"data",
                "scan.png",
                "image/png",
                &serde_json::json!({}),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_registry_execute_with_capability() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(TextNativeAdapter));

        let result = registry
            .execute(
                CapabilityKind::TextNative,
                b"hello world",
                "test.txt",
                "text/plain",
                &serde_json::json!({}),
            )
            .await
            .unwrap();
        assert_eq!(result.text.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn test_registry_health_check_all() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(TextNativeAdapter));

        let results = registry.health_check_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[&CapabilityKind::TextNative]);
    }
}
