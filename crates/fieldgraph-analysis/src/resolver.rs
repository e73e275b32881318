// ABOUTME: Root-owner resolution: which module and model truly own each field
// ABOUTME: One post-pass over the full registry; candidates ranked by module priority then name

use crate::registry::FieldRegistry;
use fieldgraph_core::{FieldDefinition, FieldKey, FieldName, ModelId, ModuleId};
use fieldgraph_graph::{ModelExtensionGraph, ModulePriorities};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Identity of one logical field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CanonicalId {
    pub root_model: ModelId,
    pub root_module: ModuleId,
    pub field: FieldName,
}

impl CanonicalId {
    /// `<root model>.<field>`
    pub fn field_key(&self) -> String {
        format!("{}.{}", self.root_model, self.field)
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.root_model, self.field, self.root_module)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalField {
    pub id: CanonicalId,
    /// Every other module defining this field somewhere along the extension chain.
    pub extending_modules: BTreeSet<ModuleId>,
    /// Registry groups that resolved to this field.
    pub groups: BTreeSet<FieldKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDefinition {
    pub definition: FieldDefinition,
    pub canonical: CanonicalId,
    pub is_extension: bool,
}

/// Output of one normalization pass. Recomputed in full every time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalization {
    fields: BTreeMap<CanonicalId, CanonicalField>,
    by_group: BTreeMap<FieldKey, CanonicalId>,
    resolved: Vec<ResolvedDefinition>,
}

impl Normalization {
    pub fn canonical_fields(&self) -> impl Iterator<Item = &CanonicalField> {
        self.fields.values()
    }

    pub fn canonical(&self, id: &CanonicalId) -> Option<&CanonicalField> {
        self.fields.get(id)
    }

    /// The logical field a (model, field name) group resolved to.
    pub fn canonical_for(&self, key: &FieldKey) -> Option<&CanonicalField> {
        self.by_group.get(key).and_then(|id| self.fields.get(id))
    }

    pub fn resolved(&self) -> &[ResolvedDefinition] {
        &self.resolved
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

struct GroupResolution {
    key: FieldKey,
    root: CanonicalId,
    extending: BTreeSet<ModuleId>,
    resolved: Vec<ResolvedDefinition>,
}

/// Resolve every registry group to its canonical field.
///
/// Must only run on a fully populated registry: an owner found before every module has been
/// ingested can be wrong.
pub fn normalize(
    registry: &FieldRegistry,
    extensions: &ModelExtensionGraph,
    priorities: &ModulePriorities,
) -> Normalization {
    let models: Vec<&ModelId> = registry.models().collect();
    let ancestors: FxHashMap<&ModelId, Vec<ModelId>> = models
        .par_iter()
        .map(|model| (*model, extensions.ancestors(model)))
        .collect();

    let groups: Vec<(FieldKey, &[FieldDefinition])> = registry.groups().collect();
    let resolutions: Vec<GroupResolution> = groups
        .par_iter()
        .map(|(key, definitions)| {
            let chain = ancestors.get(&key.model).map(Vec::as_slice).unwrap_or(&[]);
            resolve_group(key, definitions, chain, registry, priorities)
        })
        .collect();

    let mut normalization = Normalization::default();
    for resolution in resolutions {
        let field = normalization
            .fields
            .entry(resolution.root.clone())
            .or_insert_with(|| CanonicalField {
                id: resolution.root.clone(),
                extending_modules: BTreeSet::new(),
                groups: BTreeSet::new(),
            });
        field.extending_modules.extend(resolution.extending);
        field.groups.insert(resolution.key.clone());
        normalization.by_group.insert(resolution.key, resolution.root);
        normalization.resolved.extend(resolution.resolved);
    }

    debug!(
        "Normalized {} definitions in {} groups into {} canonical fields",
        normalization.resolved.len(),
        normalization.by_group.len(),
        normalization.fields.len()
    );
    normalization
}

fn resolve_group(
    key: &FieldKey,
    definitions: &[FieldDefinition],
    ancestors: &[ModelId],
    registry: &FieldRegistry,
    priorities: &ModulePriorities,
) -> GroupResolution {
    // (model, module) pairs defining this field name along the chain, own model first
    let mut candidates: Vec<(&ModelId, &ModuleId)> = Vec::new();
    for model in std::iter::once(&key.model).chain(ancestors) {
        for def in registry.group(model, &key.field).unwrap_or(&[]) {
            if !candidates.contains(&(model, &def.module)) {
                candidates.push((model, &def.module));
            }
        }
    }
    // stable: equal (priority, name) keeps discovery order
    candidates.sort_by(|a, b| priorities.compare(a.1, b.1));

    let (root_model, root_module) = match candidates.first() {
        Some(&(model, module)) => (model.clone(), module.clone()),
        None => match definitions.first() {
            Some(def) => (def.model.clone(), def.module.clone()),
            None => (key.model.clone(), ModuleId::from("unknown")),
        },
    };

    let extending: BTreeSet<ModuleId> = candidates
        .iter()
        .map(|(_, module)| *module)
        .filter(|module| **module != root_module)
        .cloned()
        .collect();

    let root = CanonicalId {
        root_model,
        root_module,
        field: key.field.clone(),
    };

    let resolved = definitions
        .iter()
        .map(|def| ResolvedDefinition {
            is_extension: def.module != root.root_module,
            definition: def.clone(),
            canonical: root.clone(),
        })
        .collect();

    GroupResolution {
        key: key.clone(),
        root,
        extending,
        resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldgraph_core::DependencyDeclaration;
    use fieldgraph_graph::{ModuleDependencyGraph, PrioritySettings};

    fn priorities(decls: &[(&str, &[&str])]) -> ModulePriorities {
        let decls: Vec<DependencyDeclaration> = decls
            .iter()
            .map(|(module, deps)| DependencyDeclaration {
                module: ModuleId::from(*module),
                depends: deps.iter().map(|d| ModuleId::from(*d)).collect(),
            })
            .collect();
        ModuleDependencyGraph::from_declarations(&decls).priorities(&PrioritySettings::default())
    }

    #[test]
    fn lower_priority_module_owns_the_field() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        registry.register(
            FieldDefinition::new("sale.order", "note", "addon").with_override(true),
            &mut models,
        );
        registry.register(FieldDefinition::new("sale.order", "note", "base"), &mut models);

        let p = priorities(&[("base", &[]), ("addon", &["base"])]);
        let n = normalize(&registry, &models, &p);

        assert_eq!(n.len(), 1);
        let field = n.canonical_for(&FieldKey::new("sale.order", "note")).unwrap();
        assert_eq!(field.id.root_module, ModuleId::from("base"));
        assert!(field.extending_modules.contains(&ModuleId::from("addon")));
        for r in n.resolved() {
            assert_eq!(r.is_extension, r.definition.module.as_str() == "addon");
        }
    }

    #[test]
    fn ancestor_definition_becomes_root_model() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        models.add_edge(
            &ModelId::from("sale.order.line"),
            &ModelId::from("sale.order"),
            &ModuleId::from("sale"),
        );
        registry.register(FieldDefinition::new("sale.order", "name", "base"), &mut models);
        registry.register(
            FieldDefinition::new("sale.order.line", "name", "sale"),
            &mut models,
        );

        let p = priorities(&[("base", &[]), ("sale", &["base"])]);
        let n = normalize(&registry, &models, &p);
        let child = n
            .canonical_for(&FieldKey::new("sale.order.line", "name"))
            .unwrap();
        assert_eq!(child.id.root_model, ModelId::from("sale.order"));
        assert_eq!(child.id.field_key(), "sale.order.name");
        // the parent group resolves to the same logical field
        assert_eq!(n.len(), 1);
        assert_eq!(child.groups.len(), 2);
    }

    #[test]
    fn equal_priority_siblings_tie_break_alphabetically() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        registry.register(FieldDefinition::new("x", "f", "zeta"), &mut models);
        registry.register(FieldDefinition::new("x", "f", "alpha"), &mut models);

        let p = priorities(&[("base", &[]), ("zeta", &["base"]), ("alpha", &["base"])]);
        let n = normalize(&registry, &models, &p);
        let field = n.canonical_for(&FieldKey::new("x", "f")).unwrap();
        assert_eq!(field.id.root_module, ModuleId::from("alpha"));
    }

    #[test]
    fn cyclic_extension_chain_still_resolves() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        let module = ModuleId::from("m");
        models.add_edge(&ModelId::from("a"), &ModelId::from("b"), &module);
        models.add_edge(&ModelId::from("b"), &ModelId::from("a"), &module);
        registry.register(FieldDefinition::new("a", "f", "m"), &mut models);
        registry.register(FieldDefinition::new("b", "f", "base"), &mut models);

        let n = normalize(&registry, &models, &priorities(&[("base", &[]), ("m", &["base"])]));
        for key in [FieldKey::new("a", "f"), FieldKey::new("b", "f")] {
            let field = n.canonical_for(&key).unwrap();
            assert_eq!(field.id.root_module, ModuleId::from("base"));
            assert_eq!(field.id.root_model, ModelId::from("b"));
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        for (model, module) in [("a", "m1"), ("a", "m2"), ("b", "m3")] {
            registry.register(FieldDefinition::new(model, "f", module), &mut models);
        }
        models.add_edge(&ModelId::from("b"), &ModelId::from("a"), &ModuleId::from("m3"));
        let p = priorities(&[("m1", &[]), ("m2", &["m1"])]);
        assert_eq!(
            normalize(&registry, &models, &p),
            normalize(&registry, &models, &p)
        );
    }
}
