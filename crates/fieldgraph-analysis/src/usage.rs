// ABOUTME: Field usage: which logical fields are referenced, and by whom
// ABOUTME: References resolve through model ancestors before being counted as unresolved

use crate::resolver::{CanonicalId, Normalization};
use fieldgraph_core::{FieldKey, FieldReference, ModuleId};
use fieldgraph_graph::ModelExtensionGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUsage {
    pub count: usize,
    pub modules: BTreeSet<ModuleId>,
    pub contexts: BTreeSet<String>,
}

/// A field used by modules that neither own nor extend it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedField {
    pub field_key: String,
    pub root_module: ModuleId,
    pub used_by: BTreeSet<ModuleId>,
    pub usage_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct UsageIndex {
    usage: BTreeMap<CanonicalId, FieldUsage>,
    unresolved: Vec<FieldReference>,
}

impl UsageIndex {
    /// Attribute each reference to a logical field. A reference to a model that does not
    /// define the field itself is attributed through the model's ancestors.
    pub fn build(
        references: &[FieldReference],
        normalization: &Normalization,
        extensions: &ModelExtensionGraph,
    ) -> Self {
        let mut index = UsageIndex::default();
        for reference in references {
            let Some(id) = Self::attribute(reference, normalization, extensions) else {
                index.unresolved.push(reference.clone());
                continue;
            };
            let usage = index.usage.entry(id).or_default();
            usage.count += 1;
            usage.modules.insert(reference.module.clone());
            if !reference.context.is_empty() {
                usage.contexts.insert(reference.context.clone());
            }
        }
        index
    }

    fn attribute(
        reference: &FieldReference,
        normalization: &Normalization,
        extensions: &ModelExtensionGraph,
    ) -> Option<CanonicalId> {
        if let Some(field) = normalization.canonical_for(&reference.key()) {
            return Some(field.id.clone());
        }
        extensions
            .ancestors(&reference.model)
            .into_iter()
            .find_map(|model| {
                normalization
                    .canonical_for(&FieldKey::new(model, reference.field.clone()))
                    .map(|field| field.id.clone())
            })
    }

    pub fn usage(&self, id: &CanonicalId) -> Option<&FieldUsage> {
        self.usage.get(id)
    }

    pub fn usage_count(&self, id: &CanonicalId) -> usize {
        self.usage.get(id).map_or(0, |u| u.count)
    }

    pub fn unresolved(&self) -> &[FieldReference] {
        &self.unresolved
    }

    /// Fields referenced by at least one module outside their root and extending modules.
    pub fn shared_fields(&self, normalization: &Normalization) -> Vec<SharedField> {
        normalization
            .canonical_fields()
            .filter_map(|field| {
                let usage = self.usage.get(&field.id)?;
                let used_by: BTreeSet<ModuleId> = usage
                    .modules
                    .iter()
                    .filter(|m| **m != field.id.root_module && !field.extending_modules.contains(*m))
                    .cloned()
                    .collect();
                if used_by.is_empty() {
                    return None;
                }
                Some(SharedField {
                    field_key: field.id.field_key(),
                    root_module: field.id.root_module.clone(),
                    used_by,
                    usage_count: usage.count,
                })
            })
            .collect()
    }

    /// Logical fields with no reference at all.
    pub fn unused_fields<'a>(&'a self, normalization: &'a Normalization) -> Vec<&'a CanonicalId> {
        normalization
            .canonical_fields()
            .map(|field| &field.id)
            .filter(|id| !self.usage.contains_key(*id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldRegistry;
    use crate::resolver::normalize;
    use fieldgraph_core::{FieldDefinition, ModelId};
    use fieldgraph_graph::ModulePriorities;

    fn reference(model: &str, field: &str, module: &str) -> FieldReference {
        FieldReference {
            model: model.into(),
            field: field.into(),
            module: module.into(),
            context: format!("{}.view_form", module),
        }
    }

    #[test]
    fn references_resolve_directly_and_through_ancestors() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        models.add_edge(
            &ModelId::from("res.company"),
            &ModelId::from("res.partner"),
            &ModuleId::from("base"),
        );
        registry.register(FieldDefinition::new("res.partner", "name", "base"), &mut models);
        registry.register(FieldDefinition::new("res.partner", "ref", "base"), &mut models);
        let n = normalize(&registry, &models, &ModulePriorities::default());

        let refs = vec![
            reference("res.partner", "name", "sale"),
            reference("res.company", "name", "account"),
            reference("res.partner", "missing", "sale"),
        ];
        let index = UsageIndex::build(&refs, &n, &models);

        let name = n.canonical_for(&FieldKey::new("res.partner", "name")).unwrap();
        assert_eq!(index.usage_count(&name.id), 2);
        assert_eq!(index.unresolved().len(), 1);

        let shared = index.shared_fields(&n);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].field_key, "res.partner.name");

        let unused: Vec<String> = index.unused_fields(&n).iter().map(|id| id.field_key()).collect();
        assert_eq!(unused, vec!["res.partner.ref"]);
    }
}
