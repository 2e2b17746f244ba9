//! Convert JSON-Schema documents into executable validator trees.
//!
//! A [`SchemaResolver`] walks a schema document, resolves `$ref`,
//! `$defs`, anchors, and combinators, and emits a [`SchemaNode`] tree
//! that validates JSON values directly.
//!
//! ```
//! use serde_json::json;
//! use trellis_schema::{convert, ResolverConfig};
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "name": { "type": "string", "minLength": 1 },
//!         "age": { "type": "integer", "minimum": 0 }
//!     },
//!     "required": ["name"]
//! });
//!
//! let node = convert(&schema, ResolverConfig::default())?;
//! assert!(node.validate(&json!({ "name": "Ada", "age": 36 })).is_ok());
//! assert!(node.validate(&json!({ "age": 36 })).is_err());
//! # Ok::<(), trellis_schema::ConvertError>(())
//! ```
//!
//! Shared schemas, custom type extensions, and option overrides hang off
//! [`ResolverConfig`]; per-call overrides go through
//! [`SchemaResolver::convert_with`].

mod error;
mod mapper;
mod node;
mod options;
mod registry;
mod resolver;
mod validator;

pub use error::{ConvertError, ValidateError, Violation};
pub use node::{
    json_type_name, CustomRule, Extension, ExtensionKind, MatchMode, Metadata, NodeFactory,
    SchemaNode, StringFormat,
};
pub use options::{
    OverrideOptions, RefineDescription, RefineSchema, RefineType, ResolveOptions, ResolverConfig,
};
pub use registry::{RegistryBaseline, SharedSchemaRegistry};
pub use resolver::{convert, Fragment, SchemaResolver};
