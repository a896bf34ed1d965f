use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use tracing::{debug, info, warn};

use lyssna_protocols::Value;

use crate::builtin;
use crate::definition::{ActionDefinition, RawDefinition};
use crate::error::{LoadError, ParamError};

/// Read-only catalog of protocol actions, keyed by name.
///
/// Safe to share between threads once built; nothing mutates it after load.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionDefinition>,
    by_command_id: HashMap<u32, String>,
}

impl ActionRegistry {
    /// Loads a registry document, or the built-in catalog when the source is
    /// missing or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::from_path(path) {
            Ok(registry) => {
                info!(path = %path.display(), actions = registry.len(), "Loaded action registry");
                registry
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Registry source unusable, falling back to built-in catalog"
                );
                Self::builtin()
            }
        }
    }

    /// Strict load from a `.json`, `.yaml` or `.yml` document mapping action
    /// names to definitions.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match extension.as_deref() {
            Some("json") => Self::from_json_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, LoadError> {
        let document: BTreeMap<String, RawDefinition> = serde_json::from_str(text)?;
        Self::from_document(document)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, LoadError> {
        let document: BTreeMap<String, RawDefinition> = serde_yaml::from_str(text)?;
        Self::from_document(document)
    }

    fn from_document(document: BTreeMap<String, RawDefinition>) -> Result<Self, LoadError> {
        Self::from_definitions(
            document
                .into_iter()
                .map(|(name, raw)| raw.into_definition(name)),
        )
    }

    pub fn from_definitions<I>(definitions: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = ActionDefinition>,
    {
        let mut registry = Self::default();
        for definition in definitions {
            if definition.name.is_empty() {
                return Err(LoadError::EmptyName);
            }
            if registry.actions.contains_key(&definition.name) {
                return Err(LoadError::DuplicateName(definition.name));
            }
            if let Some(id) = definition.command_id {
                if let Some(first) = registry.by_command_id.get(&id) {
                    return Err(LoadError::DuplicateCommandId {
                        id,
                        first: first.clone(),
                        second: definition.name,
                    });
                }
                registry.by_command_id.insert(id, definition.name.clone());
            }
            registry.actions.insert(definition.name.clone(), definition);
        }
        debug!(actions = registry.len(), "Indexed action definitions");
        Ok(registry)
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let definitions = builtin::definitions();
        let mut registry = Self::default();
        for definition in definitions {
            if let Some(id) = definition.command_id {
                registry.by_command_id.insert(id, definition.name.clone());
            }
            registry.actions.insert(definition.name.clone(), definition);
        }
        registry
    }

    pub fn lookup(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(name)
    }

    pub fn lookup_by_command_id(&self, command_id: u32) -> Option<&ActionDefinition> {
        self.by_command_id
            .get(&command_id)
            .and_then(|name| self.actions.get(name))
    }

    /// Case-insensitive substring search over action names, in name order.
    pub fn search(&self, substring: &str, limit: usize) -> Vec<&ActionDefinition> {
        let needle = substring.to_lowercase();
        self.actions
            .values()
            .filter(|d| d.name.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.actions.values().map(|d| d.category.as_str()).collect()
    }

    pub fn actions_in_category(&self, category: &str) -> Vec<&ActionDefinition> {
        self.actions
            .values()
            .filter(|d| d.category == category)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Definitions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.values()
    }

    /// Checks that `payload` is an object carrying every required parameter
    /// of `name` with a compatible type.
    pub fn validate_params(&self, name: &str, payload: &Value) -> Result<(), ParamError> {
        let definition = self
            .lookup(name)
            .ok_or_else(|| ParamError::UnknownAction(name.to_owned()))?;
        let object = payload.as_object().ok_or_else(|| ParamError::NotAnObject {
            action: name.to_owned(),
            found: payload.type_name(),
        })?;
        for param in &definition.parameters {
            match object.get(&param.name) {
                None if param.required => {
                    return Err(ParamError::Missing {
                        action: name.to_owned(),
                        parameter: param.name.clone(),
                    })
                }
                Some(value) if !param.param_type.accepts(value) => {
                    return Err(ParamError::TypeMismatch {
                        action: name.to_owned(),
                        parameter: param.name.clone(),
                        found: value.type_name(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}
