// ABOUTME: Per-module summaries of rooted, extended and missing-dependency fields
// ABOUTME: Built from one normalization pass and the module dependency graph

use crate::resolver::Normalization;
use fieldgraph_core::ModuleId;
use fieldgraph_graph::{ModuleDependencyGraph, ModulePriorities};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub module: ModuleId,
    pub priority: f64,
    /// Has a dependency declaration of its own.
    pub known: bool,
    pub fields_defined: usize,
    /// Definitions whose module is the field's root owner.
    pub root_fields: usize,
    pub extension_fields: usize,
    /// Other modules extending fields rooted here.
    pub extending_modules: BTreeSet<ModuleId>,
    /// At least one of this module's fields is rooted in another module.
    pub dependency_update_required: bool,
    /// Root modules of extended fields missing from the declared dependency closure.
    pub missing_dependencies: BTreeSet<ModuleId>,
}

impl ModuleSummary {
    fn new(module: ModuleId, priorities: &ModulePriorities, graph: &ModuleDependencyGraph) -> Self {
        Self {
            priority: priorities.priority(&module),
            known: graph.is_known(&module),
            module,
            fields_defined: 0,
            root_fields: 0,
            extension_fields: 0,
            extending_modules: BTreeSet::new(),
            dependency_update_required: false,
            missing_dependencies: BTreeSet::new(),
        }
    }
}

/// One summary per module that defines a field or declares dependencies, sorted by name.
pub fn summarize_modules(
    normalization: &Normalization,
    graph: &ModuleDependencyGraph,
    priorities: &ModulePriorities,
) -> Vec<ModuleSummary> {
    let mut summaries: BTreeMap<ModuleId, ModuleSummary> = BTreeMap::new();
    let mut closures: BTreeMap<ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();

    for module in graph.modules() {
        summaries.insert(
            module.clone(),
            ModuleSummary::new(module.clone(), priorities, graph),
        );
    }

    for resolved in normalization.resolved() {
        let module = &resolved.definition.module;
        let summary = summaries
            .entry(module.clone())
            .or_insert_with(|| ModuleSummary::new(module.clone(), priorities, graph));
        summary.fields_defined += 1;

        if !resolved.is_extension {
            summary.root_fields += 1;
            continue;
        }

        summary.extension_fields += 1;
        summary.dependency_update_required = true;
        let root = &resolved.canonical.root_module;
        let closure = closures
            .entry(module.clone())
            .or_insert_with(|| graph.transitive_dependencies(module));
        if !closure.contains(root) {
            summary.missing_dependencies.insert(root.clone());
        }
    }

    for field in normalization.canonical_fields() {
        if let Some(summary) = summaries.get_mut(&field.id.root_module) {
            summary
                .extending_modules
                .extend(field.extending_modules.iter().cloned());
        }
    }

    summaries.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldRegistry;
    use crate::resolver::normalize;
    use fieldgraph_core::{DependencyDeclaration, FieldDefinition};
    use fieldgraph_graph::{ModelExtensionGraph, PrioritySettings};

    #[test]
    fn extension_outside_dependency_closure_is_flagged() {
        let graph = ModuleDependencyGraph::from_declarations(&[
            DependencyDeclaration {
                module: "base".into(),
                depends: vec![],
            },
            DependencyDeclaration {
                module: "sale".into(),
                depends: vec!["base".into()],
            },
            DependencyDeclaration {
                module: "sale_note".into(),
                depends: vec!["base".into()],
            },
        ]);
        let priorities = graph.priorities(&PrioritySettings::default());

        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        registry.register(FieldDefinition::new("sale.order", "note", "sale"), &mut models);
        registry.register(FieldDefinition::new("sale.order", "note", "sale_note"), &mut models);
        registry.register(FieldDefinition::new("res.partner", "name", "base"), &mut models);
        registry.register(FieldDefinition::new("res.partner", "name", "sale"), &mut models);

        let n = normalize(&registry, &models, &priorities);
        let summaries = summarize_modules(&n, &graph, &priorities);
        let by_name: BTreeMap<&str, &ModuleSummary> =
            summaries.iter().map(|s| (s.module.as_str(), s)).collect();

        let base = by_name["base"];
        assert_eq!(base.root_fields, 1);
        assert!(!base.dependency_update_required);
        assert!(base.extending_modules.contains(&ModuleId::from("sale")));

        let sale = by_name["sale"];
        assert_eq!(sale.fields_defined, 2);
        assert_eq!(sale.extension_fields, 1);
        assert!(sale.dependency_update_required);
        assert!(sale.missing_dependencies.is_empty());

        // sale and sale_note tie on priority; "sale" wins alphabetically
        let sale_note = by_name["sale_note"];
        assert!(sale_note.dependency_update_required);
        assert!(sale_note
            .missing_dependencies
            .contains(&ModuleId::from("sale")));
    }
}
