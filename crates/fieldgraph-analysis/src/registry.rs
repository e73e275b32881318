use fieldgraph_core::{FieldDefinition, FieldKey, FieldName, ModelId, ModuleId};
use fieldgraph_graph::ModelExtensionGraph;
use std::collections::BTreeMap;

/// Every raw definition, grouped by (model, field name).
///
/// Groups only ever grow: insertion cannot know the canonical owner yet, so nothing is
/// merged or overwritten here.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    models: BTreeMap<ModelId, BTreeMap<FieldName, Vec<FieldDefinition>>>,
    definitions: usize,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `definition` to its group. The model node is created in `models` if this is
    /// the first time the model is seen.
    pub fn register(&mut self, definition: FieldDefinition, models: &mut ModelExtensionGraph) {
        models.ensure_model(&definition.model);
        self.models
            .entry(definition.model.clone())
            .or_default()
            .entry(definition.field.clone())
            .or_default()
            .push(definition);
        self.definitions += 1;
    }

    pub fn group(&self, model: &ModelId, field: &FieldName) -> Option<&[FieldDefinition]> {
        self.models
            .get(model)?
            .get(field)
            .map(Vec::as_slice)
    }

    pub fn group_by_key(&self, key: &FieldKey) -> Option<&[FieldDefinition]> {
        self.group(&key.model, &key.field)
    }

    pub fn has_field(&self, model: &ModelId, field: &FieldName) -> bool {
        self.group(model, field).is_some()
    }

    /// All groups, ordered by model then field name.
    pub fn groups(&self) -> impl Iterator<Item = (FieldKey, &[FieldDefinition])> + '_ {
        self.models.iter().flat_map(|(model, fields)| {
            fields
                .iter()
                .map(move |(field, defs)| (FieldKey::new(model.clone(), field.clone()), defs.as_slice()))
        })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.models
            .values()
            .flat_map(|fields| fields.values())
            .flatten()
    }

    pub fn definitions_of_module<'a>(
        &'a self,
        module: &'a ModuleId,
    ) -> impl Iterator<Item = &'a FieldDefinition> + 'a {
        self.definitions().filter(move |d| &d.module == module)
    }

    /// Number of field definitions on `model`, counting every module's.
    pub fn definitions_on_model(&self, model: &ModelId) -> usize {
        self.models
            .get(model)
            .map_or(0, |fields| fields.values().map(Vec::len).sum())
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.models.keys()
    }

    pub fn group_count(&self) -> usize {
        self.models.values().map(BTreeMap::len).sum()
    }

    pub fn definition_count(&self) -> usize {
        self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_appends_and_creates_model_nodes() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        registry.register(FieldDefinition::new("sale.order", "note", "sale"), &mut models);
        registry.register(
            FieldDefinition::new("sale.order", "note", "sale_custom").with_override(true),
            &mut models,
        );

        assert!(models.contains(&ModelId::from("sale.order")));
        let group = registry
            .group(&ModelId::from("sale.order"), &FieldName::from("note"))
            .unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(registry.group_count(), 1);
        assert_eq!(registry.definition_count(), 2);
    }

    #[test]
    fn groups_are_ordered_by_model_then_field() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        registry.register(FieldDefinition::new("b", "y", "m"), &mut models);
        registry.register(FieldDefinition::new("a", "z", "m"), &mut models);
        registry.register(FieldDefinition::new("a", "x", "m"), &mut models);
        let keys: Vec<String> = registry.groups().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["a.x", "a.z", "b.y"]);
    }
}
