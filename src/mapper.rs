//! Type and constraint mapping: one schema fragment's `type`, `format`,
//! and per-type constraint keywords become validator nodes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ConvertError;
use crate::node::{MatchMode, SchemaNode, StringFormat};
use crate::options::ResolveOptions;
use crate::resolver::{Fragment, SchemaResolver};

// RFC3339 subsets, matched case-insensitively and anchored.
const DATE_RE: &str = r"(\d{4})-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])";
const TIME_RE: &str =
    r"([01][0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9]|60)(\.[0-9]+)?(Z|[+-]([01][0-9]|2[0-3]):([0-5][0-9]))";

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i)^{DATE_RE}$")).expect("date pattern"));
static TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i)^{TIME_RE}$")).expect("time pattern"));
static DATE_TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("(?i)^{DATE_RE}T{TIME_RE}$")).expect("date-time pattern"));

fn number_of(schema: &Value, key: &str) -> Option<f64> {
    schema.get(key).and_then(Value::as_f64)
}

fn count_of(schema: &Value, key: &str) -> Option<u64> {
    schema.get(key).and_then(Value::as_u64)
}

/// Widen a node to accept the null-like values, unless an enum restriction
/// already governs its value set or the node is an array under the
/// forbid-array-null rule.
pub(crate) fn allow_null_values(
    node: SchemaNode,
    null_values: &[Value],
    forbid_array_null: bool,
) -> SchemaNode {
    if node.has_value_restriction() {
        return node;
    }
    if forbid_array_null && node.type_name() == "array" {
        return node;
    }
    node.allow(null_values.iter().cloned())
}

pub(crate) fn allow_null_if_needed(node: SchemaNode, options: &ResolveOptions) -> SchemaNode {
    if options.allow_null {
        allow_null_values(node, &options.null_values, options.forbid_array_null)
    } else {
        node
    }
}

/// Restrict the node's value set to the fragment's `enum`. When nullability
/// is active and strict-enum is off, the set widens to accept null-like
/// sentinels (and the empty string, for strings).
pub(crate) fn add_enum_restriction(
    node: SchemaNode,
    enum_list: Option<&Vec<Value>>,
    options: &ResolveOptions,
) -> SchemaNode {
    if !options.enable_enum {
        return node;
    }
    let Some(list) = enum_list.filter(|list| !list.is_empty()) else {
        return node;
    };
    let mut valids = list.clone();
    if options.allow_null && !options.strict_enum {
        if node.type_name() == "string" {
            valids.push(Value::String(String::new()));
        }
        valids.push(Value::Null);
    }
    node.valid(valids)
}

/// Node typed from a literal's runtime type, for `const` fragments.
pub(crate) fn value_node(value: &Value) -> SchemaNode {
    match value {
        Value::String(_) => SchemaNode::string(),
        Value::Number(_) => SchemaNode::number(),
        Value::Bool(_) => SchemaNode::boolean(),
        _ => SchemaNode::any(),
    }
}

impl SchemaResolver {
    /// Map a typed fragment onto one or more validator nodes, then apply the
    /// cross-type annotations and the enum restriction.
    pub(crate) fn resolve_type(
        &mut self,
        schema: &Value,
        options: &ResolveOptions,
        base_uri: &str,
        is_required: bool,
    ) -> Result<SchemaNode, ConvertError> {
        let type_value = schema.get("type").cloned().unwrap_or(Value::Null);

        let mut had_null = false;
        let mut node = match &type_value {
            Value::String(name) => self.node_for_type(name, schema, options, base_uri, is_required)?,
            Value::Array(list) => {
                let mut names: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
                let before = names.len();
                names.retain(|name| *name != "null");
                had_null = names.len() != before;

                match names.as_slice() {
                    [] => self.node_for_type("null", schema, options, base_uri, is_required)?,
                    [single] => self.node_for_type(single, schema, options, base_uri, is_required)?,
                    many => {
                        let mut branches = Vec::with_capacity(many.len());
                        for name in many {
                            branches.push(self.node_for_type(name, schema, options, base_uri, is_required)?);
                        }
                        SchemaNode::alternatives(branches, MatchMode::Any)
                    }
                }
            }
            other => {
                return Err(ConvertError::UnknownType {
                    name: other.to_string(),
                })
            }
        };

        if had_null {
            // "null" in a type list permits null regardless of allow_null
            node = allow_null_values(node, &options.null_values, true);
        }

        if let Some(title) = schema.get("title").and_then(Value::as_str) {
            node = node.label(title);
        }

        let description = match &options.refine_description {
            Some(refine) => refine(schema),
            None => schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        if let Some(description) = description.filter(|text| !text.is_empty()) {
            node = node.description(description);
        }

        let example = schema
            .get("examples")
            .and_then(Value::as_array)
            .and_then(|examples| examples.first())
            .cloned()
            .or_else(|| schema.get("default").cloned())
            .or_else(|| {
                schema
                    .get("enum")
                    .and_then(Value::as_array)
                    .and_then(|list| list.first())
                    .cloned()
            });
        if let Some(example) = example {
            node = if node.type_name() == "array" && !example.is_array() {
                node.example(Value::Array(vec![example]))
            } else {
                node.example(example)
            };
        }

        Ok(add_enum_restriction(
            node,
            schema.get("enum").and_then(Value::as_array),
            options,
        ))
    }

    /// Dispatch one type name, after the refine-type hook, to the built-in
    /// constructors or the factory's extension table.
    fn node_for_type(
        &mut self,
        name: &str,
        schema: &Value,
        options: &ResolveOptions,
        base_uri: &str,
        is_required: bool,
    ) -> Result<SchemaNode, ConvertError> {
        let format = schema.get("format").and_then(Value::as_str);
        let name = match &options.refine_type {
            Some(refine) => refine(name, format),
            None => name.to_string(),
        };

        match name.as_str() {
            "array" => self.array(schema, options, base_uri, is_required),
            "boolean" => Ok(SchemaNode::boolean()),
            "integer" | "number" => self.number(schema, &name),
            "object" => self.object(schema, options, base_uri),
            "string" => self.string(schema),
            "null" => Ok(SchemaNode::any().valid(options.null_values.iter().cloned())),
            other => self
                .factory()
                .extension_node(other)
                .ok_or_else(|| ConvertError::UnknownType {
                    name: other.to_string(),
                }),
        }
    }

    fn number(&self, schema: &Value, type_name: &str) -> Result<SchemaNode, ConvertError> {
        let mut node = if type_name == "integer" {
            SchemaNode::integer()
        } else {
            SchemaNode::number()
        };

        if let Some(min) = number_of(schema, "minimum") {
            node = node.minimum(min);
        }
        if let Some(max) = number_of(schema, "maximum") {
            node = node.maximum(max);
        }
        if let Some(bound) = number_of(schema, "exclusiveMinimum") {
            node = node.greater_than(bound);
        }
        if let Some(bound) = number_of(schema, "exclusiveMaximum") {
            node = node.less_than(bound);
        }
        if let Some(base) = number_of(schema, "multipleOf") {
            if base != 0.0 {
                node = node.multiple_of(base);
            }
        }

        Ok(node)
    }

    pub(crate) fn string(&self, schema: &Value) -> Result<SchemaNode, ConvertError> {
        let node = SchemaNode::string();

        let node = match schema.get("format").and_then(Value::as_str) {
            Some("date") => return Ok(node.pattern_regex(DATE_PATTERN.clone(), Some("date format"))),
            Some("time") => return Ok(node.pattern_regex(TIME_PATTERN.clone(), Some("time format"))),
            Some("date-time") => {
                return Ok(node.pattern_regex(DATE_TIME_PATTERN.clone(), Some("date-time format")))
            }
            Some("email") => return Ok(node.format(StringFormat::Email)),
            Some("hostname") => return Ok(node.format(StringFormat::Hostname)),
            Some("ipv4") => return Ok(node.format(StringFormat::Ipv4)),
            Some("ipv6") => return Ok(node.format(StringFormat::Ipv6)),
            Some("uri") => return Ok(node.format(StringFormat::Uri)),
            Some("uuid") => return Ok(node.format(StringFormat::Guid { v4_only: true })),
            Some("guid") => return Ok(node.format(StringFormat::Guid { v4_only: false })),
            Some("binary") => self.binary(schema),
            Some("byte") => node.format(StringFormat::Base64),
            _ => node,
        };

        self.regular_string(schema, node)
    }

    fn regular_string(&self, schema: &Value, mut node: SchemaNode) -> Result<SchemaNode, ConvertError> {
        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            let regex = Regex::new(pattern).map_err(|source| ConvertError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            node = node.pattern_regex(regex, None);
        }

        // A plain unconstrained string permits the empty string.
        let min_length = count_of(schema, "minLength");
        let allow_empty = matches!(min_length, None | Some(0))
            && schema.get("pattern").is_none()
            && schema.get("format").is_none()
            && schema.get("enum").is_none();
        if allow_empty {
            node = node.allow([Value::String(String::new())]);
        }

        if let Some(min) = min_length {
            node = node.min_length(min);
        }
        if let Some(max) = count_of(schema, "maxLength") {
            node = node.max_length(max);
        }
        Ok(node)
    }

    fn binary(&self, schema: &Value) -> SchemaNode {
        let mut node = SchemaNode::binary();
        if let Some(min) = count_of(schema, "minLength") {
            node = node.min_length(min);
        }
        if let Some(max) = count_of(schema, "maxLength") {
            node = node.max_length(max);
        }
        node
    }

    pub(crate) fn object(
        &mut self,
        schema: &Value,
        options: &ResolveOptions,
        base_uri: &str,
    ) -> Result<SchemaNode, ConvertError> {
        let mut node = SchemaNode::object();

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            let required_keys: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            for (key, property) in properties {
                let is_property_required = required_keys.contains(&key.as_str());
                let child =
                    self.resolve(Fragment::Raw(property.clone()), options, base_uri, is_property_required)?;
                node = node.entry(key.clone(), child);
            }
        }

        match schema.get("additionalProperties") {
            Some(additional @ Value::Object(_)) => {
                let unknown = self.resolve(Fragment::Raw(additional.clone()), options, base_uri, false)?;
                node = node.unknown_schema(unknown);
            }
            other => match self.factory().allow_unknown() {
                // Engine-level default, when configured, governs the policy
                Some(allow) => node = node.unknown(allow),
                None => node = node.unknown(!matches!(other, Some(Value::Bool(false)))),
            },
        }

        if let Some(min) = count_of(schema, "minProperties") {
            node = node.min_properties(min);
        }
        if let Some(max) = count_of(schema, "maxProperties") {
            node = node.max_properties(max);
        }

        Ok(node)
    }

    fn array(
        &mut self,
        schema: &Value,
        options: &ResolveOptions,
        base_uri: &str,
        is_required: bool,
    ) -> Result<SchemaNode, ConvertError> {
        let mut node = SchemaNode::array();
        let mut positional_count = None;

        if let Some(items) = schema.get("items") {
            let resolved = self.resolve_item_list(items, options, base_uri, is_required)?;
            if items.is_array() {
                positional_count = Some(resolved.len() as u64);
            }
            node = node.items_one_of(resolved);
        } else if let Some(ordered) = schema.get("ordered") {
            let resolved = self.resolve_item_list(ordered, options, base_uri, is_required)?;
            if ordered.is_array() {
                positional_count = Some(resolved.len() as u64);
            }
            node = node.items_ordered(resolved);
        }

        if schema.get("additionalItems") == Some(&Value::Bool(false)) {
            if let Some(count) = positional_count {
                node = node.max_items(count);
            }
        }

        let min_items = match count_of(schema, "minItems") {
            // A required array defaults to non-empty under strict mode
            None if is_required && options.strict_array_required => Some(1),
            explicit => explicit,
        };
        if let Some(min) = min_items {
            node = node.min_items(min);
        }
        if let Some(max) = count_of(schema, "maxItems") {
            node = node.max_items(max);
        }

        if schema.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
            node = node.unique();
        }
        if let Some(contains) = schema.get("contains") {
            let contains_node = self.resolve(Fragment::Raw(contains.clone()), options, base_uri, false)?;
            node = node.contains(contains_node);
        }

        Ok(node)
    }

    /// Resolve `items`/`ordered`, broadcasting a single schema to a
    /// one-element list, and apply per-item null handling.
    fn resolve_item_list(
        &mut self,
        value: &Value,
        options: &ResolveOptions,
        base_uri: &str,
        is_required: bool,
    ) -> Result<Vec<SchemaNode>, ConvertError> {
        let list: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        let mut nodes = Vec::with_capacity(list.len());
        for item in list {
            let node = self.resolve(Fragment::Raw(item), options, base_uri, false)?;
            let node = if options.strict_array_required && is_required {
                node.invalid(options.null_values.iter().cloned())
            } else {
                allow_null_if_needed(node, options)
            };
            nodes.push(node);
        }
        Ok(nodes)
    }
}
