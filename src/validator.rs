//! Constraint evaluation engine for validator-node trees.
//!
//! Link nodes are resolved against the tree being validated, by identity
//! tag, at validation time. That keeps self-referential schemas finite:
//! recursion follows the value, not the node graph.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{ValidateError, Violation};
use crate::node::{
    ArrayRules, BinaryRules, ItemShape, LinkTarget, MatchMode, NodeKind, NumberRules, ObjectRules,
    SchemaNode, StringFormat, StringRules, UnknownKeys,
};

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));
static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
        .expect("hostname pattern")
});
static URI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:\S+$").expect("uri pattern"));
static BASE64_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$")
        .expect("base64 pattern")
});
static GUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("guid pattern")
});
static UUID_V4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid v4 pattern")
});

impl SchemaNode {
    /// Validate a value against this node tree, collecting every violation.
    pub fn validate(&self, value: &Value) -> Result<(), ValidateError> {
        let context = LinkContext::build(self);
        let mut violations = Vec::new();
        check(self, value, "", &context, &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidateError::Invalid { violations })
        }
    }

    /// True when the value satisfies this node tree.
    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }
}

/// Resolution context for link nodes: the root plus every tagged node.
struct LinkContext<'a> {
    root: &'a SchemaNode,
    tags: HashMap<&'a str, &'a SchemaNode>,
}

impl<'a> LinkContext<'a> {
    fn build(root: &'a SchemaNode) -> Self {
        let mut tags = HashMap::new();
        collect_tags(root, &mut tags);
        LinkContext { root, tags }
    }

    fn target(&self, link: &LinkTarget) -> Option<&'a SchemaNode> {
        match link {
            LinkTarget::Root => Some(self.root),
            LinkTarget::Tag(tag) => self.tags.get(tag.as_str()).copied(),
        }
    }
}

fn collect_tags<'a>(node: &'a SchemaNode, tags: &mut HashMap<&'a str, &'a SchemaNode>) {
    if let Some(tag) = node.meta.tag.as_deref() {
        tags.entry(tag).or_insert(node);
    }
    match &node.kind {
        NodeKind::Object(rules) => {
            for (_, child) in &rules.entries {
                collect_tags(child, tags);
            }
            if let UnknownKeys::Schema(schema) = &rules.unknown {
                collect_tags(schema, tags);
            }
        }
        NodeKind::Array(rules) => {
            match &rules.items {
                ItemShape::OneOf(list) | ItemShape::Ordered(list) => {
                    for child in list {
                        collect_tags(child, tags);
                    }
                }
                ItemShape::Unconstrained => {}
            }
            if let Some(contains) = &rules.contains {
                collect_tags(contains, tags);
            }
        }
        NodeKind::Alternatives(rules) => {
            for branch in &rules.branches {
                collect_tags(branch, tags);
            }
        }
        NodeKind::Not(inner) => collect_tags(inner, tags),
        _ => {}
    }
}

fn violation(path: &str, message: impl Into<String>) -> Violation {
    Violation {
        path: path.to_string(),
        message: message.into(),
    }
}

/// True when `value` satisfies `node`, discarding the violation detail.
fn passes(node: &SchemaNode, value: &Value, context: &LinkContext) -> bool {
    let mut probe = Vec::new();
    check(node, value, "", context, &mut probe);
    probe.is_empty()
}

fn check(
    node: &SchemaNode,
    value: &Value,
    path: &str,
    context: &LinkContext,
    out: &mut Vec<Violation>,
) {
    // invalid() overrides allow(); both override everything else
    if node.invalids.contains(value) {
        out.push(violation(path, "value is disallowed"));
        return;
    }

    if node.allowed.contains(value) {
        return;
    }

    if let Some(valids) = &node.valids {
        if !valids.contains(value) {
            out.push(violation(path, format!("must be one of: {}", render_values(valids))));
        }
        return;
    }

    match &node.kind {
        NodeKind::Any => {}
        NodeKind::Boolean => {
            if !value.is_boolean() {
                out.push(violation(
                    path,
                    format!("expected boolean, got {}", crate::node::json_type_name(value)),
                ));
            }
        }
        NodeKind::Number(rules) => check_number(rules, value, path, out),
        NodeKind::String(rules) => check_string(rules, value, path, out),
        NodeKind::Binary(rules) => check_binary(rules, value, path, out),
        NodeKind::Object(rules) => check_object(rules, value, path, context, out),
        NodeKind::Array(rules) => check_array(rules, value, path, context, out),
        NodeKind::Alternatives(rules) => {
            let matched = rules
                .branches
                .iter()
                .filter(|branch| passes(branch, value, context))
                .count();
            match rules.mode {
                MatchMode::Any => {
                    if matched == 0 {
                        out.push(violation(path, "does not match any of the allowed alternatives"));
                    }
                }
                MatchMode::All => {
                    if matched != rules.branches.len() {
                        out.push(violation(
                            path,
                            "does not match all of the required alternatives",
                        ));
                    }
                }
                MatchMode::One => {
                    if matched != 1 {
                        out.push(violation(
                            path,
                            format!("must match exactly one alternative, matched {matched}"),
                        ));
                    }
                }
            }
        }
        NodeKind::Not(inner) => {
            if passes(inner, value, context) {
                out.push(violation(path, "matches a disallowed schema"));
            }
        }
        NodeKind::Link(target) => match context.target(target) {
            Some(linked) => check(linked, value, path, context, out),
            None => out.push(violation(path, "unresolved schema link")),
        },
        NodeKind::Custom(rules) => {
            if let Err(message) = (rules.rule)(value) {
                out.push(violation(path, message));
            }
        }
    }
}

fn check_number(rules: &NumberRules, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(number) = value.as_f64() else {
        out.push(violation(
            path,
            format!("expected number, got {}", crate::node::json_type_name(value)),
        ));
        return;
    };
    // Zero fractional part qualifies, so 5.0 counts as an integer.
    if rules.integer && number.fract() != 0.0 {
        out.push(violation(path, "expected an integer"));
    }
    if let Some(min) = rules.min {
        if number < min {
            out.push(violation(path, format!("must be greater than or equal to {min}")));
        }
    }
    if let Some(max) = rules.max {
        if number > max {
            out.push(violation(path, format!("must be less than or equal to {max}")));
        }
    }
    if let Some(bound) = rules.greater {
        if number <= bound {
            out.push(violation(path, format!("must be greater than {bound}")));
        }
    }
    if let Some(bound) = rules.less {
        if number >= bound {
            out.push(violation(path, format!("must be less than {bound}")));
        }
    }
    if let Some(base) = rules.multiple_of {
        let quotient = number / base;
        if (quotient - quotient.round()).abs() > 1e-9 {
            out.push(violation(path, format!("must be a multiple of {base}")));
        }
    }
}

fn check_string(rules: &StringRules, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(text) = value.as_str() else {
        out.push(violation(
            path,
            format!("expected string, got {}", crate::node::json_type_name(value)),
        ));
        return;
    };
    // Empty strings are rejected unless explicitly allowed upstream.
    if text.is_empty() {
        out.push(violation(path, "is not allowed to be empty"));
        return;
    }
    let length = text.chars().count() as u64;
    if let Some(min) = rules.min_length {
        if length < min {
            out.push(violation(path, format!("length must be at least {min}")));
        }
    }
    if let Some(max) = rules.max_length {
        if length > max {
            out.push(violation(path, format!("length must be at most {max}")));
        }
    }
    if let Some(pattern) = &rules.pattern {
        if !pattern.regex.is_match(text) {
            let message = match &pattern.name {
                Some(name) => format!("fails to match the {name} pattern"),
                None => "fails to match the required pattern".to_string(),
            };
            out.push(violation(path, message));
        }
    }
    if let Some(format) = rules.format {
        check_format(format, text, path, out);
    }
}

fn check_format(format: StringFormat, text: &str, path: &str, out: &mut Vec<Violation>) {
    let ok = match format {
        StringFormat::Email => EMAIL_PATTERN.is_match(text),
        StringFormat::Hostname => text.len() <= 253 && HOSTNAME_PATTERN.is_match(text),
        StringFormat::Ipv4 => text.parse::<std::net::Ipv4Addr>().is_ok(),
        StringFormat::Ipv6 => text.parse::<std::net::Ipv6Addr>().is_ok(),
        StringFormat::Uri => URI_PATTERN.is_match(text),
        StringFormat::Base64 => BASE64_PATTERN.is_match(text),
        StringFormat::Guid { v4_only: true } => UUID_V4_PATTERN.is_match(text),
        StringFormat::Guid { v4_only: false } => GUID_PATTERN.is_match(text),
    };
    if !ok {
        out.push(violation(path, format!("must be a valid {}", format.label())));
    }
}

fn check_binary(rules: &BinaryRules, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let Some(text) = value.as_str() else {
        out.push(violation(
            path,
            format!("expected binary string, got {}", crate::node::json_type_name(value)),
        ));
        return;
    };
    let length = text.len() as u64;
    if let Some(min) = rules.min_length {
        if length < min {
            out.push(violation(path, format!("length must be at least {min}")));
        }
    }
    if let Some(max) = rules.max_length {
        if length > max {
            out.push(violation(path, format!("length must be at most {max}")));
        }
    }
}

fn check_object(
    rules: &ObjectRules,
    value: &Value,
    path: &str,
    context: &LinkContext,
    out: &mut Vec<Violation>,
) {
    let Some(map) = value.as_object() else {
        out.push(violation(
            path,
            format!("expected object, got {}", crate::node::json_type_name(value)),
        ));
        return;
    };

    for (key, child) in &rules.entries {
        let child_path = format!("{path}/{key}");
        match map.get(key) {
            Some(entry_value) => check(child, entry_value, &child_path, context, out),
            None => {
                if child.required {
                    out.push(violation(&child_path, "is required"));
                }
            }
        }
    }

    let declared: HashSet<&str> = rules.entries.iter().map(|(key, _)| key.as_str()).collect();
    for (key, entry_value) in map {
        if declared.contains(key.as_str()) {
            continue;
        }
        let child_path = format!("{path}/{key}");
        match &rules.unknown {
            UnknownKeys::Allow => {}
            UnknownKeys::Deny => out.push(violation(&child_path, "is not allowed")),
            UnknownKeys::Schema(schema) => check(schema, entry_value, &child_path, context, out),
        }
    }

    if let Some(min) = rules.min_properties {
        if (map.len() as u64) < min {
            out.push(violation(path, format!("must have at least {min} keys")));
        }
    }
    if let Some(max) = rules.max_properties {
        if (map.len() as u64) > max {
            out.push(violation(path, format!("must have at most {max} keys")));
        }
    }
}

fn check_array(
    rules: &ArrayRules,
    value: &Value,
    path: &str,
    context: &LinkContext,
    out: &mut Vec<Violation>,
) {
    let Some(items) = value.as_array() else {
        out.push(violation(
            path,
            format!("expected array, got {}", crate::node::json_type_name(value)),
        ));
        return;
    };

    match &rules.items {
        ItemShape::Unconstrained => {}
        ItemShape::OneOf(choices) => {
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{path}/{index}");
                if choices.len() == 1 {
                    check(&choices[0], item, &item_path, context, out);
                } else if !choices.iter().any(|choice| passes(choice, item, context)) {
                    out.push(violation(
                        &item_path,
                        "does not match any of the allowed item types",
                    ));
                }
            }
        }
        ItemShape::Ordered(slots) => {
            for (index, item) in items.iter().enumerate() {
                let item_path = format!("{path}/{index}");
                match slots.get(index) {
                    Some(slot) => check(slot, item, &item_path, context, out),
                    None => out.push(violation(&item_path, "exceeds the ordered item list")),
                }
            }
            for (index, slot) in slots.iter().enumerate().skip(items.len()) {
                if slot.required {
                    out.push(violation(&format!("{path}/{index}"), "is required"));
                }
            }
        }
    }

    if let Some(min) = rules.min_items {
        if (items.len() as u64) < min {
            out.push(violation(path, format!("must contain at least {min} item(s)")));
        }
    }
    if let Some(max) = rules.max_items {
        if (items.len() as u64) > max {
            out.push(violation(path, format!("must contain at most {max} item(s)")));
        }
    }

    if rules.unique {
        for (index, item) in items.iter().enumerate() {
            if items[..index].contains(item) {
                out.push(violation(
                    &format!("{path}/{index}"),
                    "duplicate value in unique array",
                ));
            }
        }
    }

    if let Some(contains) = &rules.contains {
        if !items.iter().any(|item| passes(contains, item, context)) {
            out.push(violation(path, "must contain at least one matching item"));
        }
    }
}

fn render_values(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
