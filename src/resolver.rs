//! Schema resolution: walks a JSON-Schema document and builds validator nodes.
//!
//! The resolver owns the shared-schema registry and the node factory. One
//! instance is meant to be reused across many independent [`convert`] calls;
//! everything registered during a call is rolled back when it returns, so
//! calls never leak registrations into each other. Calls on the same
//! instance must not interleave; use one instance per thread for parallel
//! conversion.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ConvertError;
use crate::mapper::{add_enum_restriction, allow_null_if_needed, value_node};
use crate::node::{json_type_name, MatchMode, NodeFactory, SchemaNode};
use crate::options::{OverrideOptions, ResolveOptions, ResolverConfig};
use crate::registry::SharedSchemaRegistry;

/// One schema fragment handed to [`SchemaResolver::resolve`]: either a raw
/// document subtree or an already-built node, which passes through
/// unchanged.
#[derive(Clone, Debug)]
pub enum Fragment {
    Raw(Value),
    Node(SchemaNode),
}

impl From<Value> for Fragment {
    fn from(value: Value) -> Self {
        Fragment::Raw(value)
    }
}

impl From<&Value> for Fragment {
    fn from(value: &Value) -> Self {
        Fragment::Raw(value.clone())
    }
}

impl From<SchemaNode> for Fragment {
    fn from(node: SchemaNode) -> Self {
        Fragment::Node(node)
    }
}

/// Replace every non-alphanumeric character, yielding an identifier safe
/// for node tags and link targets.
pub(crate) fn normalized_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Recursive JSON-Schema → validator-tree resolver.
pub struct SchemaResolver {
    registry: SharedSchemaRegistry,
    factory: NodeFactory,
    defaults: ResolveOptions,
}

impl SchemaResolver {
    /// Build a resolver, constructing the node factory from the config's
    /// extensions and engine-level options.
    pub fn new(config: ResolverConfig) -> Result<Self, ConvertError> {
        let factory = NodeFactory::new(config.extensions.clone(), config.allow_unknown);
        Self::with_factory(config, factory)
    }

    /// Build a resolver around a pre-configured node factory.
    pub fn with_factory(config: ResolverConfig, factory: NodeFactory) -> Result<Self, ConvertError> {
        config.validate()?;
        let defaults = config.resolve_options();
        let mut resolver = SchemaResolver {
            registry: SharedSchemaRegistry::default(),
            factory,
            defaults,
        };

        // Named sub-schemas resolve now and stay registered for the life of
        // the instance. A map key doubles as the $id when the schema has
        // none of its own.
        let options = resolver.defaults.clone();
        for (name, schema) in &config.sub_schemas {
            let mut doc = schema.clone();
            if let Value::Object(map) = &mut doc {
                map.entry("$id".to_string())
                    .or_insert_with(|| Value::String(name.clone()));
            }
            resolver.registry.register_raw_if_absent(name.clone(), doc.clone());
            let node = resolver.resolve(Fragment::Raw(doc), &options, "", false)?;
            resolver.registry.register_node(name.clone(), node);
        }

        Ok(resolver)
    }

    /// The instance-level option defaults.
    pub fn options(&self) -> &ResolveOptions {
        &self.defaults
    }

    /// Read access to the shared-schema registry.
    pub fn registry(&self) -> &SharedSchemaRegistry {
        &self.registry
    }

    /// Convert one top-level schema, rolling back every registration the
    /// call produced, also on failure.
    pub fn convert(&mut self, schema: &Value) -> Result<SchemaNode, ConvertError> {
        self.convert_with(schema, &OverrideOptions::default())
    }

    /// [`convert`](Self::convert) with per-call option overrides layered on
    /// top of the instance defaults.
    pub fn convert_with(
        &mut self,
        schema: &Value,
        overrides: &OverrideOptions,
    ) -> Result<SchemaNode, ConvertError> {
        if !schema.is_object() && !schema.is_string() {
            return Err(ConvertError::InvalidFragment {
                actual: json_type_name(schema),
            });
        }
        let options = self.defaults.merged(overrides)?;

        let baseline = self.registry.snapshot();

        // The ephemeral top-level slot makes root-relative pointer lookups
        // work; a persistent raw doc it displaces is restored afterwards.
        let doc_id = schema
            .get("$id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let displaced = self.registry.raw(&doc_id).cloned();
        self.registry.register_raw(doc_id.clone(), schema.clone());

        let result = self.resolve(Fragment::Raw(schema.clone()), &options, "", false);

        self.registry.release_transient(&baseline);
        if let Some(original) = displaced {
            self.registry.register_raw(doc_id, original);
        }

        result
    }

    /// Resolve one fragment into a validator node.
    ///
    /// Exposed for advanced embedding: nested resolvers and extensions that
    /// need to resolve sub-fragments themselves. Most callers want
    /// [`convert`](Self::convert), which adds registry rollback.
    pub fn resolve(
        &mut self,
        fragment: Fragment,
        options: &ResolveOptions,
        base_uri: &str,
        is_required: bool,
    ) -> Result<SchemaNode, ConvertError> {
        let raw = match fragment {
            // Idempotent pass-through for pre-built nodes
            Fragment::Node(node) => return Ok(node),
            Fragment::Raw(value) => value,
        };

        // A fragment declaring $id starts a new base URI for its subtree.
        let schema_id = raw
            .get("$id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let effective_base = schema_id.clone().unwrap_or_else(|| base_uri.to_string());
        if let Some(id) = &schema_id {
            self.registry.register_raw_if_absent(id.clone(), raw.clone());
        }

        // Shared definitions register before the rest of the fragment so
        // forward references from siblings and descendants resolve.
        self.register_shared(&raw, options, "$defs", &effective_base)?;
        self.register_shared(&raw, options, "definitions", &effective_base)?;

        let mut resolved;
        if let Value::String(type_name) = &raw {
            // A bare string fragment is shorthand for { "type": ... }
            resolved = self.resolve_type(&json!({ "type": type_name }), options, &effective_base, is_required)?;
        } else if let Some(reference) = raw.get("$ref").and_then(Value::as_str) {
            if reference.trim() == "#" {
                // The referenced node is the very node being built, so emit
                // a lazy link instead of recursing into the cycle.
                return Ok(if effective_base.is_empty() {
                    SchemaNode::link_root()
                } else {
                    SchemaNode::link(normalized_id(&effective_base))
                });
            }
            let target = self.resolve_reference(reference, &effective_base)?;
            resolved = self.resolve(target, options, &effective_base, is_required)?;
        } else {
            let mut candidates: Vec<SchemaNode> = Vec::new();
            if raw.get("type").is_some() {
                candidates.push(self.resolve_type(&raw, options, &effective_base, is_required)?);
            } else if raw.get("properties").is_some() {
                // properties without a type: implicit object
                candidates.push(self.object(&raw, options, &effective_base)?);
            } else if raw.get("format").is_some() {
                // format without a type: implicit string
                candidates.push(self.string(&raw)?);
            } else if let Some(enum_list) = raw.get("enum").and_then(Value::as_array) {
                let mut node = SchemaNode::any();
                if let Some(first) = enum_list.first() {
                    node = node.example(first.clone());
                }
                candidates.push(add_enum_restriction(node, Some(enum_list), options));
            } else if let Some(constant) = raw.get("const") {
                candidates.push(value_node(constant).valid([constant.clone()]));
            }
            if raw.get("anyOf").is_some() {
                candidates.push(self.resolve_combinator(&raw, "anyOf", MatchMode::Any, options, &effective_base)?);
            }
            if raw.get("allOf").is_some() {
                candidates.push(self.resolve_combinator(&raw, "allOf", MatchMode::All, options, &effective_base)?);
            }
            if raw.get("oneOf").is_some() {
                candidates.push(self.resolve_combinator(&raw, "oneOf", MatchMode::One, options, &effective_base)?);
            }
            if raw.get("not").is_some() {
                candidates.push(self.resolve_not(&raw, options, &effective_base)?);
            }
            if candidates.is_empty() {
                warn!(fragment = %raw, "schema fragment has no type, $ref, or enum; validating as any");
                candidates.push(SchemaNode::any());
            }
            resolved = if candidates.len() > 1 {
                SchemaNode::alternatives(candidates, MatchMode::All)
            } else {
                candidates.remove(0)
            };
        }

        if let Some(refine) = &options.refine_schema {
            resolved = refine(resolved, &raw);
        }

        if !options.no_defaults {
            if let Some(default) = raw.get("default") {
                resolved = resolved.default_value(default.clone());
            }
        }

        if let Some(id) = &schema_id {
            resolved = resolved.tag(normalized_id(id));
            self.registry.register_node(id.clone(), resolved.clone());
        }

        if let Some(anchor) = raw.get("$anchor").and_then(Value::as_str) {
            self.registry
                .register_node(format!("{effective_base}#{anchor}"), resolved.clone());
        }

        if is_required {
            resolved = resolved.required();
            if options.strict_required {
                resolved = resolved.invalid([Value::Null, Value::String(String::new())]);
            }
        } else {
            resolved = allow_null_if_needed(resolved, options);
        }

        Ok(resolved)
    }

    fn register_shared(
        &mut self,
        raw: &Value,
        options: &ResolveOptions,
        keyword: &str,
        base_uri: &str,
    ) -> Result<(), ConvertError> {
        let Some(defs) = raw.get(keyword).and_then(Value::as_object) else {
            return Ok(());
        };
        for (name, def) in defs.clone() {
            let node = self.resolve(Fragment::Raw(def), options, base_uri, false)?;
            self.registry
                .register_node(format!("{base_uri}#/{keyword}/{name}"), node);
        }
        Ok(())
    }

    /// Locate the target of a `$ref`, trying each lookup strategy in order:
    /// plain id, anchor, direct pointer key, then a raw-tree walk for paths
    /// crossing `/properties` (whose targets may not be built yet).
    fn resolve_reference(&self, reference: &str, base_uri: &str) -> Result<Fragment, ConvertError> {
        debug!(reference, base = base_uri, "resolving schema reference");

        let found = match reference.find('#') {
            None => self.registry.node(reference).cloned().map(Fragment::Node),
            Some(hash_idx) => {
                let id = &reference[..hash_idx];
                let path = &reference[hash_idx + 1..];
                let canonical = if id.is_empty() {
                    format!("{base_uri}{reference}")
                } else {
                    reference.to_string()
                };

                if !canonical.contains('/') {
                    // [id-or-base]#anchor
                    self.registry.node(&canonical).cloned().map(Fragment::Node)
                } else if !canonical.contains("/properties") {
                    // [id-or-base]#/$defs/name, pre-registered during the walk
                    self.registry.node(&canonical).cloned().map(Fragment::Node)
                } else {
                    // Walk the raw document; a property reached this way is
                    // not separately registered and its container may still
                    // be under construction.
                    let doc_key = if id.is_empty() { base_uri } else { id };
                    let mut current = self.registry.raw(doc_key);
                    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
                        let key = segment.replace("~1", "/").replace("~0", "~");
                        current = current.and_then(|value| value.get(&key));
                    }
                    current.cloned().map(Fragment::Raw)
                }
            }
        };

        found.ok_or_else(|| ConvertError::UnresolvedReference {
            reference: reference.to_string(),
            base_uri: base_uri.to_string(),
        })
    }

    fn resolve_combinator(
        &mut self,
        raw: &Value,
        keyword: &'static str,
        mode: MatchMode,
        options: &ResolveOptions,
        base_uri: &str,
    ) -> Result<SchemaNode, ConvertError> {
        let value = &raw[keyword];
        let Some(branches) = value.as_array() else {
            return Err(ConvertError::MalformedCombinator {
                keyword,
                expected: "array",
                actual: json_type_name(value),
            });
        };
        let mut nodes = Vec::with_capacity(branches.len());
        for branch in branches.clone() {
            nodes.push(self.resolve(Fragment::Raw(branch), options, base_uri, false)?);
        }
        Ok(SchemaNode::alternatives(nodes, mode))
    }

    fn resolve_not(
        &mut self,
        raw: &Value,
        options: &ResolveOptions,
        base_uri: &str,
    ) -> Result<SchemaNode, ConvertError> {
        let inner = &raw["not"];
        if !inner.is_object() {
            return Err(ConvertError::MalformedCombinator {
                keyword: "not",
                expected: "object",
                actual: json_type_name(inner),
            });
        }
        let inner_node = self.resolve(Fragment::Raw(inner.clone()), options, base_uri, false)?;
        Ok(SchemaNode::not(inner_node))
    }

    pub(crate) fn factory(&self) -> &NodeFactory {
        &self.factory
    }
}

/// One-shot conversion: build a resolver and convert a single schema.
pub fn convert(schema: &Value, config: ResolverConfig) -> Result<SchemaNode, ConvertError> {
    SchemaResolver::new(config)?.convert(schema)
}
