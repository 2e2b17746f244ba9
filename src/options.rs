//! Resolver configuration and per-call option overrides.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ConvertError;
use crate::node::{Extension, SchemaNode};

/// Rewrites a resolved type name, optionally considering the `format`
/// keyword, before constraint mapping dispatches on it.
pub type RefineType = Arc<dyn Fn(&str, Option<&str>) -> String + Send + Sync>;

/// Post-processes a built node, given the raw fragment it came from.
pub type RefineSchema = Arc<dyn Fn(SchemaNode, &Value) -> SchemaNode + Send + Sync>;

/// Derives a description from the raw fragment, replacing the plain
/// `description` keyword lookup.
pub type RefineDescription = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Construction-time configuration for a resolver instance.
#[derive(Clone)]
pub struct ResolverConfig {
    /// Named schemas resolved at construction and registered persistently.
    pub sub_schemas: Vec<(String, Value)>,
    /// Custom type descriptors consumed by the node factory.
    pub extensions: Vec<Extension>,
    /// Engine-level default for undeclared object keys.
    pub allow_unknown: Option<bool>,
    pub allow_null: bool,
    pub forbid_array_null: bool,
    pub strict_array_required: bool,
    pub strict_required: bool,
    pub strict_enum: bool,
    pub enable_enum: bool,
    pub no_defaults: bool,
    /// Values treated as "null-like" when widening nullable nodes.
    pub null_values: Vec<Value>,
    pub refine_type: Option<RefineType>,
    pub refine_schema: Option<RefineSchema>,
    pub refine_description: Option<RefineDescription>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            sub_schemas: Vec::new(),
            extensions: Vec::new(),
            allow_unknown: None,
            allow_null: false,
            forbid_array_null: true,
            strict_array_required: false,
            strict_required: false,
            strict_enum: true,
            enable_enum: true,
            no_defaults: false,
            null_values: vec![Value::Null],
            refine_type: None,
            refine_schema: None,
            refine_description: None,
        }
    }
}

impl ResolverConfig {
    /// Register a named schema, resolved at construction time.
    pub fn sub_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.sub_schemas.push((name.into(), schema));
        self
    }

    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = allow;
        self
    }

    pub fn strict_required(mut self, strict: bool) -> Self {
        self.strict_required = strict;
        self
    }

    pub fn null_values(mut self, values: Vec<Value>) -> Self {
        self.null_values = values;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConvertError> {
        if self.null_values.is_empty() {
            return Err(ConvertError::Configuration {
                message: "null_values must contain at least one entry".into(),
            });
        }
        Ok(())
    }

    /// Snapshot the overridable options into a merged, immutable bag.
    pub(crate) fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            allow_null: self.allow_null,
            forbid_array_null: self.forbid_array_null,
            strict_array_required: self.strict_array_required,
            strict_required: self.strict_required,
            strict_enum: self.strict_enum,
            enable_enum: self.enable_enum,
            no_defaults: self.no_defaults,
            null_values: self.null_values.clone(),
            refine_type: self.refine_type.clone(),
            refine_schema: self.refine_schema.clone(),
            refine_description: self.refine_description.clone(),
        }
    }
}

/// Immutable option snapshot threaded through one resolution call.
#[derive(Clone)]
pub struct ResolveOptions {
    pub allow_null: bool,
    pub forbid_array_null: bool,
    pub strict_array_required: bool,
    pub strict_required: bool,
    pub strict_enum: bool,
    pub enable_enum: bool,
    pub no_defaults: bool,
    pub null_values: Vec<Value>,
    pub refine_type: Option<RefineType>,
    pub refine_schema: Option<RefineSchema>,
    pub refine_description: Option<RefineDescription>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolverConfig::default().resolve_options()
    }
}

impl ResolveOptions {
    /// Layer per-call overrides on top of these options. Values absent from
    /// the override bag keep their current setting; the receiver is never
    /// mutated.
    pub fn merged(&self, overrides: &OverrideOptions) -> Result<ResolveOptions, ConvertError> {
        overrides.validate()?;
        let mut merged = self.clone();
        if let Some(value) = overrides.allow_null {
            merged.allow_null = value;
        }
        if let Some(value) = overrides.forbid_array_null {
            merged.forbid_array_null = value;
        }
        if let Some(value) = overrides.strict_array_required {
            merged.strict_array_required = value;
        }
        if let Some(value) = overrides.strict_required {
            merged.strict_required = value;
        }
        if let Some(value) = overrides.strict_enum {
            merged.strict_enum = value;
        }
        if let Some(value) = overrides.enable_enum {
            merged.enable_enum = value;
        }
        if let Some(value) = overrides.no_defaults {
            merged.no_defaults = value;
        }
        if let Some(values) = &overrides.null_values {
            merged.null_values = values.clone();
        }
        if let Some(hook) = &overrides.refine_type {
            merged.refine_type = Some(hook.clone());
        }
        if let Some(hook) = &overrides.refine_schema {
            merged.refine_schema = Some(hook.clone());
        }
        if let Some(hook) = &overrides.refine_description {
            merged.refine_description = Some(hook.clone());
        }
        Ok(merged)
    }
}

/// Per-call option overrides; only explicitly set values take effect.
#[derive(Clone, Default)]
pub struct OverrideOptions {
    pub allow_null: Option<bool>,
    pub forbid_array_null: Option<bool>,
    pub strict_array_required: Option<bool>,
    pub strict_required: Option<bool>,
    pub strict_enum: Option<bool>,
    pub enable_enum: Option<bool>,
    pub no_defaults: Option<bool>,
    pub null_values: Option<Vec<Value>>,
    pub refine_type: Option<RefineType>,
    pub refine_schema: Option<RefineSchema>,
    pub refine_description: Option<RefineDescription>,
}

impl OverrideOptions {
    fn validate(&self) -> Result<(), ConvertError> {
        if matches!(&self.null_values, Some(values) if values.is_empty()) {
            return Err(ConvertError::Configuration {
                message: "null_values override must contain at least one entry".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_contract() {
        let options = ResolveOptions::default();
        assert!(!options.allow_null);
        assert!(options.forbid_array_null);
        assert!(!options.strict_array_required);
        assert!(!options.strict_required);
        assert!(options.strict_enum);
        assert!(options.enable_enum);
        assert_eq!(options.null_values, vec![Value::Null]);
    }

    #[test]
    fn merge_only_touches_present_values() {
        let base = ResolveOptions::default();
        let overrides = OverrideOptions {
            allow_null: Some(true),
            ..OverrideOptions::default()
        };
        let merged = base.merged(&overrides).unwrap();
        assert!(merged.allow_null);
        // untouched values keep their defaults
        assert!(merged.forbid_array_null);
        assert!(merged.strict_enum);
        // the receiver itself is unchanged
        assert!(!base.allow_null);
    }

    #[test]
    fn merge_replaces_null_values() {
        let base = ResolveOptions::default();
        let overrides = OverrideOptions {
            null_values: Some(vec![json!(null), json!("null")]),
            ..OverrideOptions::default()
        };
        let merged = base.merged(&overrides).unwrap();
        assert_eq!(merged.null_values.len(), 2);
    }

    #[test]
    fn empty_null_values_rejected() {
        let config = ResolverConfig::default().null_values(vec![]);
        assert!(matches!(
            config.validate(),
            Err(ConvertError::Configuration { .. })
        ));

        let overrides = OverrideOptions {
            null_values: Some(vec![]),
            ..OverrideOptions::default()
        };
        assert!(ResolveOptions::default().merged(&overrides).is_err());
    }
}
