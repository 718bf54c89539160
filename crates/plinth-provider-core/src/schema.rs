//! Schema types describing provider configuration and managed resources.
//!
//! A [`ProviderSchema`] is what the host receives from `provider.get_schema`.
//! It carries one [`Schema`] for the provider configuration block and one per
//! resource type. Schemas are also used locally to validate configuration
//! before a provider ever sees it.

use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Attribute types
// ============================================================================

/// Value type of a schema attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "element", rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Bool,
    List(Box<AttributeType>),
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// Check whether a JSON value conforms to this type.
    ///
    /// `null` never matches; callers decide separately whether an attribute
    /// may be null.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => true,
            (AttributeType::Number, Value::Number(_)) => true,
            (AttributeType::Bool, Value::Bool(_)) => true,
            (AttributeType::List(element), Value::Array(items)) => {
                items.iter().all(|item| element.matches(item))
            }
            (AttributeType::Map(element), Value::Object(entries)) => {
                entries.values().all(|item| element.matches(item))
            }
            _ => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            AttributeType::String => "string".to_string(),
            AttributeType::Number => "number".to_string(),
            AttributeType::Bool => "bool".to_string(),
            AttributeType::List(element) => format!("list of {}", element.describe()),
            AttributeType::Map(element) => format!("map of {}", element.describe()),
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// A single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: AttributeType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Must be set in configuration.
    #[serde(default)]
    pub required: bool,

    /// May be set in configuration.
    #[serde(default)]
    pub optional: bool,

    /// Set by the provider. Combined with `optional`, the provider fills in
    /// a value when configuration leaves it unset.
    #[serde(default)]
    pub computed: bool,

    /// Value should be hidden from host output.
    #[serde(default)]
    pub sensitive: bool,

    /// Changing the value requires replacing the resource.
    #[serde(default)]
    pub force_new: bool,
}

impl Attribute {
    fn new(ty: AttributeType) -> Self {
        Self {
            ty,
            description: None,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
        }
    }

    pub fn required(ty: AttributeType) -> Self {
        Self {
            required: true,
            ..Self::new(ty)
        }
    }

    pub fn optional(ty: AttributeType) -> Self {
        Self {
            optional: true,
            ..Self::new(ty)
        }
    }

    pub fn computed(ty: AttributeType) -> Self {
        Self {
            computed: true,
            ..Self::new(ty)
        }
    }

    pub fn required_string() -> Self {
        Self::required(AttributeType::String)
    }

    pub fn optional_string() -> Self {
        Self::optional(AttributeType::String)
    }

    pub fn computed_string() -> Self {
        Self::computed(AttributeType::String)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark an optional attribute as also filled in by the provider.
    pub fn with_default_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Computed and not settable from configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A validation or operation message returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Attribute the diagnostic refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(summary)
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Returns true if any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

// ============================================================================
// Schemas
// ============================================================================

/// Schema for a configuration block or a resource type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Version of the state layout, bumped when stored state changes shape.
    #[serde(default)]
    pub version: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    /// An empty schema at state version 0.
    pub fn v0() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(name.into(), attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Validate a configuration object against this schema.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate_config(&self, config: &Value) -> Vec<Diagnostic> {
        let Some(object) = config.as_object() else {
            return vec![Diagnostic::error("configuration must be an object")];
        };

        let mut diagnostics = Vec::new();

        for key in object.keys() {
            if !self.attributes.contains_key(key) {
                diagnostics.push(
                    Diagnostic::error("unsupported attribute")
                        .with_detail(format!("An attribute named \"{}\" is not expected here", key))
                        .with_attribute(key.clone()),
                );
            }
        }

        for (name, attribute) in &self.attributes {
            let value = object.get(name).filter(|v| !v.is_null());

            match value {
                None if attribute.required => {
                    diagnostics.push(
                        Diagnostic::error("missing required attribute").with_attribute(name.clone()),
                    );
                }
                None => {}
                Some(_) if attribute.is_computed_only() => {
                    diagnostics.push(
                        Diagnostic::error("value for computed attribute cannot be set")
                            .with_attribute(name.clone()),
                    );
                }
                Some(v) if !attribute.ty.matches(v) => {
                    diagnostics.push(
                        Diagnostic::error("incorrect attribute value type")
                            .with_detail(format!("Expected {}", attribute.ty.describe()))
                            .with_attribute(name.clone()),
                    );
                }
                Some(_) => {}
            }
        }

        diagnostics
    }

    fn internal_validate(&self, context: &str) -> Result<()> {
        for (name, attribute) in &self.attributes {
            if !is_valid_name(name) {
                return Err(ProviderError::InvalidSchema(format!(
                    "{}: invalid attribute name {:?}",
                    context, name
                )));
            }
            if attribute.required && (attribute.optional || attribute.computed) {
                return Err(ProviderError::InvalidSchema(format!(
                    "{}.{}: required attributes cannot be optional or computed",
                    context, name
                )));
            }
            if !attribute.required && !attribute.optional && !attribute.computed {
                return Err(ProviderError::InvalidSchema(format!(
                    "{}.{}: one of required, optional or computed must be set",
                    context, name
                )));
            }
        }
        Ok(())
    }
}

/// Full schema of a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSchema {
    /// Schema of the provider configuration block.
    pub provider: Schema,

    /// Resource schemas keyed by resource type name.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    pub fn with_resource(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(type_name.into(), schema);
        self
    }

    pub fn resource(&self, type_name: &str) -> Option<&Schema> {
        self.resources.get(type_name)
    }

    pub fn resource_types(&self) -> Vec<&str> {
        self.resources.keys().map(|s| s.as_str()).collect()
    }

    /// Check the schema itself for mistakes a provider author could make.
    ///
    /// Every resource must expose a computed `id` attribute and every
    /// attribute must pick a consistent combination of flags.
    pub fn internal_validate(&self) -> Result<()> {
        self.provider.internal_validate("provider")?;

        for (type_name, schema) in &self.resources {
            if !is_valid_name(type_name) {
                return Err(ProviderError::InvalidSchema(format!(
                    "invalid resource type name {:?}",
                    type_name
                )));
            }

            schema.internal_validate(type_name)?;

            match schema.attribute("id") {
                Some(id) if id.computed => {}
                Some(_) => {
                    return Err(ProviderError::InvalidSchema(format!(
                        "{}.id: must be computed",
                        type_name
                    )))
                }
                None => {
                    return Err(ProviderError::InvalidSchema(format!(
                        "{}: missing id attribute",
                        type_name
                    )))
                }
            }
        }

        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A resource recovered by `import`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    pub type_name: String,
    pub state: Value,
}
