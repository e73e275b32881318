use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type!(
    /// Name of a deployable module (e.g. `sale`, `base`).
    ModuleId
);
name_type!(
    /// Dotted model name (e.g. `sale.order`).
    ModelId
);
name_type!(
    /// Field name, unqualified.
    FieldName
);

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(default)]
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Key of a field group in the registry: every definition sharing it is one logical field
/// once normalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    pub model: ModelId,
    pub field: FieldName,
}

impl FieldKey {
    pub fn new(model: impl Into<ModelId>, field: impl Into<FieldName>) -> Self {
        Self {
            model: model.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.field)
    }
}

/// A validated field definition: one module touching one (model, field) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub model: ModelId,
    pub field: FieldName,
    pub module: ModuleId,
    /// The declaration itself says it overrides an existing field.
    pub declared_override: bool,
    pub field_type: Option<String>,
    pub location: SourceLocation,
}

impl FieldDefinition {
    pub fn new(
        model: impl Into<ModelId>,
        field: impl Into<FieldName>,
        module: impl Into<ModuleId>,
    ) -> Self {
        Self {
            model: model.into(),
            field: field.into(),
            module: module.into(),
            declared_override: false,
            field_type: None,
            location: SourceLocation::default(),
        }
    }

    pub fn with_override(mut self, declared_override: bool) -> Self {
        self.declared_override = declared_override;
        self
    }

    pub fn with_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = Some(field_type.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn key(&self) -> FieldKey {
        FieldKey {
            model: self.model.clone(),
            field: self.field.clone(),
        }
    }
}

/// A validated usage of a field (view, data record or code reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldReference {
    pub model: ModelId,
    pub field: FieldName,
    pub module: ModuleId,
    pub context: String,
}

impl FieldReference {
    pub fn key(&self) -> FieldKey {
        FieldKey {
            model: self.model.clone(),
            field: self.field.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_key_display_is_model_qualified() {
        let key = FieldKey::new("sale.order", "note");
        assert_eq!(key.to_string(), "sale.order.note");
    }

    #[test]
    fn names_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ModuleId::from("base")).unwrap();
        assert_eq!(json, "\"base\"");
        let back: ModelId = serde_json::from_str("\"res.partner\"").unwrap();
        assert_eq!(back.as_str(), "res.partner");
    }
}
