//! Raw records handed over by the scanning collaborators, and their validation.
//!
//! Raw records are deliberately loose (every name defaults to an empty string) so that a
//! malformed record still deserializes and can be rejected individually instead of failing a
//! whole input bundle.

use crate::error::RecordError;
use crate::types::{FieldDefinition, FieldName, FieldReference, ModelId, ModuleId, SourceLocation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A module's manifest dependency declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDependency {
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub depends: Vec<String>,
}

/// A model extension declaration: `model` extends each of `parents`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExtension {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub module: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFieldDefinition {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub field_type: Option<String>,
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub declared_override: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFieldReference {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub context: String,
}

/// Everything one scan produced, as read from a JSON bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBundle {
    #[serde(default)]
    pub dependencies: Vec<RawDependency>,
    #[serde(default)]
    pub extensions: Vec<RawExtension>,
    #[serde(default)]
    pub fields: Vec<RawFieldDefinition>,
    #[serde(default)]
    pub references: Vec<RawFieldReference>,
}

impl RecordBundle {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len() + self.extensions.len() + self.fields.len() + self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDeclaration {
    pub module: ModuleId,
    pub depends: Vec<ModuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDeclaration {
    pub model: ModelId,
    pub parents: Vec<ModelId>,
    pub module: ModuleId,
}

fn required(value: &str, missing: RecordError) -> Result<String, RecordError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(missing)
    } else {
        Ok(trimmed.to_string())
    }
}

impl RawDependency {
    pub fn validate(&self) -> Result<DependencyDeclaration, RecordError> {
        let module = required(&self.module, RecordError::MissingModule)?;
        let mut depends: Vec<ModuleId> = Vec::with_capacity(self.depends.len());
        for dep in &self.depends {
            let dep = dep.trim();
            if dep.is_empty() {
                continue;
            }
            if dep == module {
                debug!("Dropping self-dependency of module {}", module);
                continue;
            }
            let dep = ModuleId::from(dep);
            if !depends.contains(&dep) {
                depends.push(dep);
            }
        }
        Ok(DependencyDeclaration {
            module: ModuleId::new(module),
            depends,
        })
    }
}

impl RawExtension {
    pub fn validate(&self) -> Result<ExtensionDeclaration, RecordError> {
        let model = required(&self.model, RecordError::MissingModel)?;
        let module = required(&self.module, RecordError::MissingModule)?;
        let parents: Vec<ModelId> = self
            .parents
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(ModelId::from)
            .collect();
        if parents.is_empty() {
            return Err(RecordError::NoParents(model));
        }
        Ok(ExtensionDeclaration {
            model: ModelId::new(model),
            parents,
            module: ModuleId::new(module),
        })
    }
}

impl RawFieldDefinition {
    pub fn validate(&self) -> Result<FieldDefinition, RecordError> {
        let model = required(&self.model, RecordError::MissingModel)?;
        let field = required(&self.field, RecordError::MissingField)?;
        let module = required(&self.module, RecordError::MissingModule)?;
        Ok(FieldDefinition {
            model: ModelId::new(model),
            field: FieldName::new(field),
            module: ModuleId::new(module),
            declared_override: self.declared_override,
            field_type: self
                .field_type
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            location: self.location.clone(),
        })
    }
}

impl RawFieldReference {
    pub fn validate(&self) -> Result<FieldReference, RecordError> {
        let model = required(&self.model, RecordError::MissingModel)?;
        let field = required(&self.field, RecordError::MissingField)?;
        let module = required(&self.module, RecordError::MissingModule)?;
        Ok(FieldReference {
            model: ModelId::new(model),
            field: FieldName::new(field),
            module: ModuleId::new(module),
            context: self.context.trim().to_string(),
        })
    }
}
