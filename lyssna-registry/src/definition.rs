//! Action and parameter definitions.

use serde::{Deserialize, Serialize};

use lyssna_protocols::Value;

/// Declared type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Number,
    String,
    Bool,
    Object,
    Array,
    #[default]
    #[serde(other)]
    Any,
}

impl ParamType {
    /// Whether a decoded value is acceptable for this type. Null is accepted
    /// everywhere; the game sends it for unset optional fields.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null | Value::Undefined) | (ParamType::Any, _) => true,
            (ParamType::Int, v) => v.as_i64().is_some(),
            (ParamType::Number, v) => v.as_f64().is_some(),
            (ParamType::String, Value::String(_)) => true,
            (ParamType::Bool, Value::Boolean(_)) => true,
            (ParamType::Object, Value::Object(_)) => true,
            (ParamType::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

/// A single action parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDefinition {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ParamDefinition {
    pub fn required(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
        }
    }
}

/// A named protocol action such as `hero.hireHero`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<u32>,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParamDefinition>,
}

impl ActionDefinition {
    /// Creates a definition whose category is the segment of `name` before
    /// the first `.`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let category = category_of(&name).to_owned();
        Self {
            name,
            command_id: None,
            category,
            description: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_command_id(mut self, command_id: u32) -> Self {
        self.command_id = Some(command_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_param(mut self, param: ParamDefinition) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamDefinition> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamDefinition> {
        self.parameters.iter().filter(|p| p.required)
    }
}

/// Category implied by an action name.
pub fn category_of(name: &str) -> &str {
    name.split_once('.').map_or(name, |(category, _)| category)
}

/// On-disk shape of one entry; the name comes from the document key.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDefinition {
    #[serde(default, alias = "id", alias = "cmd")]
    pub command_id: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "params")]
    pub parameters: Vec<ParamDefinition>,
}

impl RawDefinition {
    pub(crate) fn into_definition(self, name: String) -> ActionDefinition {
        let category = self
            .category
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| category_of(&name).to_owned());
        ActionDefinition {
            name,
            command_id: self.command_id,
            category,
            description: self.description,
            parameters: self.parameters,
        }
    }
}
