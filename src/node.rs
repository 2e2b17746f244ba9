//! Validator-node representation and the factory that builds it.
//!
//! [`SchemaNode`] is the target representation the resolver emits: an opaque,
//! cloneable tree of typed constraint nodes with builder-style combinators.
//! Nodes never evaluate themselves here; the engine lives in `validator`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

/// Imperative validation rule carried by custom extension types.
pub type CustomRule = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Match mode for an alternatives node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// At least one branch must match.
    Any,
    /// Every branch must match.
    All,
    /// Exactly one branch must match.
    One,
}

/// String format capabilities checked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Email,
    Hostname,
    Ipv4,
    Ipv6,
    Uri,
    Base64,
    Guid { v4_only: bool },
}

impl StringFormat {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            StringFormat::Email => "email",
            StringFormat::Hostname => "hostname",
            StringFormat::Ipv4 => "IPv4 address",
            StringFormat::Ipv6 => "IPv6 address",
            StringFormat::Uri => "URI",
            StringFormat::Base64 => "base64 string",
            StringFormat::Guid { .. } => "GUID",
        }
    }
}

/// Compiled pattern constraint, optionally carrying a display name.
#[derive(Clone)]
pub(crate) struct NamedPattern {
    pub regex: Regex,
    pub name: Option<String>,
}

#[derive(Clone, Default)]
pub(crate) struct NumberRules {
    pub integer: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub greater: Option<f64>,
    pub less: Option<f64>,
    pub multiple_of: Option<f64>,
}

#[derive(Clone, Default)]
pub(crate) struct StringRules {
    pub pattern: Option<NamedPattern>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub format: Option<StringFormat>,
}

#[derive(Clone, Default)]
pub(crate) struct BinaryRules {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
}

/// Policy for object keys not declared in `entries`.
#[derive(Clone, Default)]
pub(crate) enum UnknownKeys {
    #[default]
    Allow,
    Deny,
    Schema(Box<SchemaNode>),
}

#[derive(Clone, Default)]
pub(crate) struct ObjectRules {
    pub entries: Vec<(String, SchemaNode)>,
    pub unknown: UnknownKeys,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
}

/// Item shape for array nodes.
#[derive(Clone, Default)]
pub(crate) enum ItemShape {
    #[default]
    Unconstrained,
    /// Every element must match one of the listed nodes.
    OneOf(Vec<SchemaNode>),
    /// Strict positional list.
    Ordered(Vec<SchemaNode>),
}

#[derive(Clone, Default)]
pub(crate) struct ArrayRules {
    pub items: ItemShape,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique: bool,
    pub contains: Option<Box<SchemaNode>>,
}

#[derive(Clone)]
pub(crate) struct AlternativesRules {
    pub branches: Vec<SchemaNode>,
    pub mode: MatchMode,
}

/// Lazy forward reference resolved by the engine at validation time.
#[derive(Clone)]
pub(crate) enum LinkTarget {
    /// The root of the tree being validated.
    Root,
    /// The nearest node carrying this identity tag.
    Tag(String),
}

#[derive(Clone)]
pub(crate) struct CustomRules {
    pub name: String,
    pub rule: CustomRule,
}

#[derive(Clone)]
pub(crate) enum NodeKind {
    Any,
    Boolean,
    Number(NumberRules),
    String(Box<StringRules>),
    Binary(BinaryRules),
    Object(Box<ObjectRules>),
    Array(Box<ArrayRules>),
    Alternatives(AlternativesRules),
    Not(Box<SchemaNode>),
    Link(LinkTarget),
    Custom(CustomRules),
}

/// Descriptive annotations attached to a node. None of these affect
/// validation except `tag`, which links resolve against.
#[derive(Clone, Default, Debug)]
pub struct Metadata {
    pub label: Option<String>,
    pub description: Option<String>,
    pub example: Option<Value>,
    pub default: Option<Value>,
    pub tag: Option<String>,
}

/// One node of the target validation representation.
#[derive(Clone)]
pub struct SchemaNode {
    pub(crate) kind: NodeKind,
    pub(crate) required: bool,
    pub(crate) allowed: Vec<Value>,
    pub(crate) valids: Option<Vec<Value>>,
    pub(crate) invalids: Vec<Value>,
    pub(crate) meta: Metadata,
}

impl SchemaNode {
    fn with_kind(kind: NodeKind) -> Self {
        SchemaNode {
            kind,
            required: false,
            allowed: Vec::new(),
            valids: None,
            invalids: Vec::new(),
            meta: Metadata::default(),
        }
    }

    /// Unconstrained node; validates anything.
    pub fn any() -> Self {
        Self::with_kind(NodeKind::Any)
    }

    pub fn boolean() -> Self {
        Self::with_kind(NodeKind::Boolean)
    }

    pub fn number() -> Self {
        Self::with_kind(NodeKind::Number(NumberRules::default()))
    }

    pub fn integer() -> Self {
        Self::with_kind(NodeKind::Number(NumberRules {
            integer: true,
            ..NumberRules::default()
        }))
    }

    pub fn string() -> Self {
        Self::with_kind(NodeKind::String(Box::default()))
    }

    pub fn binary() -> Self {
        Self::with_kind(NodeKind::Binary(BinaryRules::default()))
    }

    pub fn object() -> Self {
        Self::with_kind(NodeKind::Object(Box::default()))
    }

    pub fn array() -> Self {
        Self::with_kind(NodeKind::Array(Box::default()))
    }

    pub fn alternatives(branches: Vec<SchemaNode>, mode: MatchMode) -> Self {
        Self::with_kind(NodeKind::Alternatives(AlternativesRules { branches, mode }))
    }

    /// Node matching values that do NOT match `inner`.
    pub fn not(inner: SchemaNode) -> Self {
        Self::with_kind(NodeKind::Not(Box::new(inner)))
    }

    /// Lazy link back to the root of the tree under validation.
    pub fn link_root() -> Self {
        Self::with_kind(NodeKind::Link(LinkTarget::Root))
    }

    /// Lazy link to the node carrying `tag`.
    pub fn link(tag: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Link(LinkTarget::Tag(tag.into())))
    }

    /// Custom extension node backed by an imperative rule.
    pub fn custom(name: impl Into<String>, rule: CustomRule) -> Self {
        Self::with_kind(NodeKind::Custom(CustomRules {
            name: name.into(),
            rule,
        }))
    }

    // --- Value-set combinators ---

    /// Values accepted unconditionally, short-circuiting every other rule.
    /// The set is deduplicated, so repeated widening is a no-op.
    pub fn allow<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        for value in values {
            if !self.allowed.contains(&value) {
                self.allowed.push(value);
            }
        }
        self
    }

    /// Restrict the node to exactly this value set.
    pub fn valid<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        self.valids = Some(values.into_iter().collect());
        self
    }

    /// Values rejected unconditionally. Deduplicated like [`SchemaNode::allow`].
    pub fn invalid<I: IntoIterator<Item = Value>>(mut self, values: I) -> Self {
        for value in values {
            if !self.invalids.contains(&value) {
                self.invalids.push(value);
            }
        }
        self
    }

    /// Mark the node required within its parent object or ordered slot.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    // --- Annotators ---

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.meta.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    pub fn example(mut self, example: Value) -> Self {
        self.meta.example = Some(example);
        self
    }

    pub fn default_value(mut self, default: Value) -> Self {
        self.meta.default = Some(default);
        self
    }

    /// Identity tag used by [`SchemaNode::link`] resolution.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.meta.tag = Some(tag.into());
        self
    }

    // --- Number constraints ---

    pub fn minimum(mut self, min: f64) -> Self {
        if let NodeKind::Number(rules) = &mut self.kind {
            rules.min = Some(min);
        }
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        if let NodeKind::Number(rules) = &mut self.kind {
            rules.max = Some(max);
        }
        self
    }

    pub fn greater_than(mut self, bound: f64) -> Self {
        if let NodeKind::Number(rules) = &mut self.kind {
            rules.greater = Some(bound);
        }
        self
    }

    pub fn less_than(mut self, bound: f64) -> Self {
        if let NodeKind::Number(rules) = &mut self.kind {
            rules.less = Some(bound);
        }
        self
    }

    pub fn multiple_of(mut self, base: f64) -> Self {
        if let NodeKind::Number(rules) = &mut self.kind {
            rules.multiple_of = Some(base);
        }
        self
    }

    // --- String / binary constraints ---

    pub(crate) fn pattern_regex(mut self, regex: Regex, name: Option<&str>) -> Self {
        if let NodeKind::String(rules) = &mut self.kind {
            rules.pattern = Some(NamedPattern {
                regex,
                name: name.map(str::to_string),
            });
        }
        self
    }

    pub fn min_length(mut self, min: u64) -> Self {
        match &mut self.kind {
            NodeKind::String(rules) => rules.min_length = Some(min),
            NodeKind::Binary(rules) => rules.min_length = Some(min),
            _ => {}
        }
        self
    }

    pub fn max_length(mut self, max: u64) -> Self {
        match &mut self.kind {
            NodeKind::String(rules) => rules.max_length = Some(max),
            NodeKind::Binary(rules) => rules.max_length = Some(max),
            _ => {}
        }
        self
    }

    pub fn format(mut self, format: StringFormat) -> Self {
        if let NodeKind::String(rules) = &mut self.kind {
            rules.format = Some(format);
        }
        self
    }

    // --- Object constraints ---

    /// Declare one child entry. The child's own `required` flag decides
    /// whether the key may be absent.
    pub fn entry(mut self, key: impl Into<String>, child: SchemaNode) -> Self {
        if let NodeKind::Object(rules) = &mut self.kind {
            rules.entries.push((key.into(), child));
        }
        self
    }

    /// Permit or deny keys not declared via [`SchemaNode::entry`].
    pub fn unknown(mut self, allow: bool) -> Self {
        if let NodeKind::Object(rules) = &mut self.kind {
            rules.unknown = if allow {
                UnknownKeys::Allow
            } else {
                UnknownKeys::Deny
            };
        }
        self
    }

    /// Validate every undeclared key against `schema`.
    pub fn unknown_schema(mut self, schema: SchemaNode) -> Self {
        if let NodeKind::Object(rules) = &mut self.kind {
            rules.unknown = UnknownKeys::Schema(Box::new(schema));
        }
        self
    }

    pub fn min_properties(mut self, min: u64) -> Self {
        if let NodeKind::Object(rules) = &mut self.kind {
            rules.min_properties = Some(min);
        }
        self
    }

    pub fn max_properties(mut self, max: u64) -> Self {
        if let NodeKind::Object(rules) = &mut self.kind {
            rules.max_properties = Some(max);
        }
        self
    }

    // --- Array constraints ---

    /// Every element must match one of `choices`.
    pub fn items_one_of(mut self, choices: Vec<SchemaNode>) -> Self {
        if let NodeKind::Array(rules) = &mut self.kind {
            rules.items = ItemShape::OneOf(choices);
        }
        self
    }

    /// Strict positional item list.
    pub fn items_ordered(mut self, slots: Vec<SchemaNode>) -> Self {
        if let NodeKind::Array(rules) = &mut self.kind {
            rules.items = ItemShape::Ordered(slots);
        }
        self
    }

    /// Stacks with any existing lower bound; the stricter one wins.
    pub fn min_items(mut self, min: u64) -> Self {
        if let NodeKind::Array(rules) = &mut self.kind {
            rules.min_items = Some(rules.min_items.map_or(min, |current| current.max(min)));
        }
        self
    }

    /// Stacks with any existing upper bound; the stricter one wins.
    pub fn max_items(mut self, max: u64) -> Self {
        if let NodeKind::Array(rules) = &mut self.kind {
            rules.max_items = Some(rules.max_items.map_or(max, |current| current.min(max)));
        }
        self
    }

    pub fn unique(mut self) -> Self {
        if let NodeKind::Array(rules) = &mut self.kind {
            rules.unique = true;
        }
        self
    }

    /// At least one element must match `schema`.
    pub fn contains(mut self, schema: SchemaNode) -> Self {
        if let NodeKind::Array(rules) = &mut self.kind {
            rules.contains = Some(Box::new(schema));
        }
        self
    }

    // --- Accessors ---

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// The node's primitive type name, or the extension name for custom nodes.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            NodeKind::Any => "any",
            NodeKind::Boolean => "boolean",
            NodeKind::Number(_) => "number",
            NodeKind::String(_) => "string",
            NodeKind::Binary(_) => "binary",
            NodeKind::Object(_) => "object",
            NodeKind::Array(_) => "array",
            NodeKind::Alternatives(_) => "alternatives",
            NodeKind::Not(_) => "not",
            NodeKind::Link(_) => "link",
            NodeKind::Custom(rules) => &rules.name,
        }
    }

    /// True when a `valid` set already governs this node's values.
    pub(crate) fn has_value_restriction(&self) -> bool {
        self.valids.is_some()
    }
}

impl fmt::Debug for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaNode")
            .field("type", &self.type_name())
            .field("required", &self.required)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Custom type descriptor consumed by the [`NodeFactory`].
#[derive(Clone)]
pub struct Extension {
    pub(crate) name: String,
    pub(crate) kind: ExtensionKind,
}

#[derive(Clone)]
pub enum ExtensionKind {
    /// Declarative base node cloned for every use of the type.
    Base(SchemaNode),
    /// Imperative validation rule.
    Rule(CustomRule),
}

impl Extension {
    /// Extension backed by a declarative base node.
    pub fn base(name: impl Into<String>, node: SchemaNode) -> Self {
        Extension {
            name: name.into(),
            kind: ExtensionKind::Base(node),
        }
    }

    /// Extension backed by a validation function.
    pub fn rule<F>(name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Extension {
            name: name.into(),
            kind: ExtensionKind::Rule(Arc::new(rule)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Factory for validator nodes: the built-in primitives plus the caller's
/// extension table and engine-level defaults.
#[derive(Clone, Default)]
pub struct NodeFactory {
    extensions: HashMap<String, Extension>,
    allow_unknown: Option<bool>,
}

impl NodeFactory {
    pub fn new(extensions: Vec<Extension>, allow_unknown: Option<bool>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|ext| (ext.name.clone(), ext))
            .collect();
        NodeFactory {
            extensions,
            allow_unknown,
        }
    }

    /// Build a node for a registered extension type name.
    pub fn extension_node(&self, name: &str) -> Option<SchemaNode> {
        self.extensions.get(name).map(|ext| match &ext.kind {
            ExtensionKind::Base(node) => node.clone(),
            ExtensionKind::Rule(rule) => SchemaNode::custom(name, rule.clone()),
        })
    }

    /// Engine-level default for undeclared object keys, when configured.
    pub fn allow_unknown(&self) -> Option<bool> {
        self.allow_unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_type_names() {
        assert_eq!(json_type_name(&json!(null)), "null");
        assert_eq!(json_type_name(&json!(true)), "boolean");
        assert_eq!(json_type_name(&json!(1)), "number");
        assert_eq!(json_type_name(&json!("x")), "string");
        assert_eq!(json_type_name(&json!([])), "array");
        assert_eq!(json_type_name(&json!({})), "object");
    }

    #[test]
    fn builder_annotations() {
        let node = SchemaNode::string()
            .label("Name")
            .description("a name")
            .example(json!("Ada"))
            .default_value(json!("?"))
            .tag("name");

        let meta = node.metadata();
        assert_eq!(meta.label.as_deref(), Some("Name"));
        assert_eq!(meta.description.as_deref(), Some("a name"));
        assert_eq!(meta.example, Some(json!("Ada")));
        assert_eq!(meta.default, Some(json!("?")));
        assert_eq!(meta.tag.as_deref(), Some("name"));
    }

    #[test]
    fn type_names() {
        assert_eq!(SchemaNode::any().type_name(), "any");
        assert_eq!(SchemaNode::integer().type_name(), "number");
        assert_eq!(SchemaNode::array().type_name(), "array");
        assert_eq!(
            SchemaNode::custom("media", Arc::new(|_| Ok(()))).type_name(),
            "media"
        );
    }

    #[test]
    fn value_sets_deduplicate() {
        let node = SchemaNode::string()
            .allow([json!(null), json!(null)])
            .allow([json!(null)])
            .invalid([json!(""), json!("")])
            .invalid([json!("")]);
        assert_eq!(node.allowed, vec![json!(null)]);
        assert_eq!(node.invalids, vec![json!("")]);
    }

    #[test]
    fn array_bounds_keep_the_stricter_value() {
        let node = SchemaNode::array().max_items(2).max_items(5).min_items(1).min_items(3);
        match &node.kind {
            NodeKind::Array(rules) => {
                assert_eq!(rules.max_items, Some(2));
                assert_eq!(rules.min_items, Some(3));
            }
            _ => panic!("expected array rules"),
        }
    }

    #[test]
    fn factory_resolves_extensions() {
        let factory = NodeFactory::new(
            vec![
                Extension::base("port", SchemaNode::integer().minimum(0.0).maximum(65535.0)),
                Extension::rule("even", |value| {
                    value
                        .as_i64()
                        .filter(|n| n % 2 == 0)
                        .map(|_| ())
                        .ok_or_else(|| "must be an even integer".to_string())
                }),
            ],
            Some(false),
        );

        assert_eq!(factory.extension_node("port").map(|n| n.type_name().to_string()), Some("number".into()));
        assert_eq!(factory.extension_node("even").map(|n| n.type_name().to_string()), Some("even".into()));
        assert!(factory.extension_node("missing").is_none());
        assert_eq!(factory.allow_unknown(), Some(false));
    }
}
