//! Shared-schema registry with persistent and call-scoped entries.
//!
//! Two maps share one lifecycle: resolved nodes keyed by reference key
//! (plain id, `<base>#<anchor>`, `<base>#/$defs/<name>`), and raw documents
//! keyed by schema id for pointer-path traversal into fragments that are not
//! fully built yet. Entries registered during a conversion call are torn
//! down when it returns by diffing against a pre-call [`RegistryBaseline`].

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::node::SchemaNode;

#[derive(Default)]
pub struct SharedSchemaRegistry {
    nodes: HashMap<String, SchemaNode>,
    raw_docs: HashMap<String, Value>,
}

/// Key sets captured before a conversion call.
#[derive(Debug, Clone)]
pub struct RegistryBaseline {
    node_keys: HashSet<String>,
    raw_keys: HashSet<String>,
}

impl SharedSchemaRegistry {
    /// Upsert a resolved node under a reference key.
    pub fn register_node(&mut self, key: impl Into<String>, node: SchemaNode) {
        self.nodes.insert(key.into(), node);
    }

    pub fn node(&self, key: &str) -> Option<&SchemaNode> {
        self.nodes.get(key)
    }

    /// Upsert a raw document under a schema id.
    pub fn register_raw(&mut self, key: impl Into<String>, doc: Value) {
        self.raw_docs.insert(key.into(), doc);
    }

    /// Register a raw document only when the id is still free.
    pub fn register_raw_if_absent(&mut self, key: impl Into<String>, doc: Value) {
        self.raw_docs.entry(key.into()).or_insert(doc);
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.raw_docs.get(key)
    }

    /// Capture the current key sets as the pre-call baseline.
    pub fn snapshot(&self) -> RegistryBaseline {
        RegistryBaseline {
            node_keys: self.nodes.keys().cloned().collect(),
            raw_keys: self.raw_docs.keys().cloned().collect(),
        }
    }

    /// Delete every key that is not part of the baseline.
    pub fn release_transient(&mut self, baseline: &RegistryBaseline) {
        self.nodes.retain(|key, _| baseline.node_keys.contains(key));
        self.raw_docs.retain(|key, _| baseline.raw_keys.contains(key));
    }

    pub fn node_keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn raw_keys(&self) -> impl Iterator<Item = &str> {
        self.raw_docs.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn release_removes_only_post_baseline_keys() {
        let mut registry = SharedSchemaRegistry::default();
        registry.register_node("persistent", SchemaNode::string());
        registry.register_raw("persistent", json!({ "type": "string" }));

        let baseline = registry.snapshot();

        registry.register_node("transient", SchemaNode::number());
        registry.register_node("doc#anchor", SchemaNode::boolean());
        registry.register_raw("doc", json!({ "$id": "doc" }));

        registry.release_transient(&baseline);

        assert!(registry.node("persistent").is_some());
        assert!(registry.raw("persistent").is_some());
        assert!(registry.node("transient").is_none());
        assert!(registry.node("doc#anchor").is_none());
        assert!(registry.raw("doc").is_none());
    }

    #[test]
    fn register_node_overwrites() {
        let mut registry = SharedSchemaRegistry::default();
        registry.register_node("key", SchemaNode::string());
        registry.register_node("key", SchemaNode::number());
        assert_eq!(registry.node("key").map(SchemaNode::type_name), Some("number"));
    }

    #[test]
    fn register_raw_if_absent_keeps_first() {
        let mut registry = SharedSchemaRegistry::default();
        registry.register_raw_if_absent("id", json!({ "v": 1 }));
        registry.register_raw_if_absent("id", json!({ "v": 2 }));
        assert_eq!(registry.raw("id"), Some(&json!({ "v": 1 })));
    }
}
