// ABOUTME: Restructuring advice built from resolved ownership and usage
// ABOUTME: Fields and models worth moving into a core module, and the order to move modules in

use crate::resolver::{CanonicalId, Normalization};
use crate::usage::{SharedField, UsageIndex};
use fieldgraph_core::{ModelId, ModuleId};
use fieldgraph_graph::ModulePriorities;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// A root module is proposed for a move when its fields are extended by more modules than this.
pub const MOVE_EXTENDING_MODULES: usize = 1;
/// ... or when it roots more field definitions than this.
pub const MOVE_FIELD_COUNT: usize = 10;
/// ... or when more of its fields than this are shared with outside modules.
pub const MOVE_SHARED_FIELDS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Field,
    Model,
}

/// Something referenced from several modules that belongs in a shared core module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreCandidate {
    pub kind: CandidateKind,
    /// `<model>.<field>` for fields, the model name for models.
    pub key: String,
    pub current_module: ModuleId,
    pub used_in: BTreeSet<ModuleId>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMove {
    pub root_module: ModuleId,
    pub field_count: usize,
    pub extending_modules: BTreeSet<ModuleId>,
    pub shared_fields: usize,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestructuringPlan {
    pub core_candidates: Vec<CoreCandidate>,
    pub modules_to_move: Vec<ModuleMove>,
    /// Extending module -> moved root modules it will have to depend on through core.
    pub modules_to_update: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
    /// Fewest extending modules first, then most fields.
    pub priority_order: Vec<ModuleId>,
}

/// Bootstrap modules already are the platform core and are never proposed for a move.
pub fn plan_restructuring(
    normalization: &Normalization,
    usage: &UsageIndex,
    shared: &[SharedField],
    priorities: &ModulePriorities,
) -> RestructuringPlan {
    let core_candidates = core_candidates(normalization, usage, priorities);
    let modules_to_move = modules_to_move(normalization, shared, priorities);

    let mut modules_to_update: BTreeMap<ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();
    for moved in &modules_to_move {
        for extender in &moved.extending_modules {
            modules_to_update
                .entry(extender.clone())
                .or_default()
                .insert(moved.root_module.clone());
        }
    }

    let mut order: Vec<&ModuleMove> = modules_to_move.iter().collect();
    order.sort_by(|a, b| {
        a.extending_modules
            .len()
            .cmp(&b.extending_modules.len())
            .then_with(|| b.field_count.cmp(&a.field_count))
            .then_with(|| a.root_module.cmp(&b.root_module))
    });
    let priority_order = order.into_iter().map(|m| m.root_module.clone()).collect();

    info!(
        "Restructuring: {} core candidates, {} modules to move",
        core_candidates.len(),
        modules_to_move.len()
    );

    RestructuringPlan {
        core_candidates,
        modules_to_move,
        modules_to_update,
        priority_order,
    }
}

/// Fields referenced from more than one module. A model whose every field (at least two)
/// qualifies is proposed as a whole instead of field by field.
fn core_candidates(
    normalization: &Normalization,
    usage: &UsageIndex,
    priorities: &ModulePriorities,
) -> Vec<CoreCandidate> {
    let mut fields_by_model: BTreeMap<&ModelId, Vec<&CanonicalId>> = BTreeMap::new();
    let mut qualifying: BTreeMap<&CanonicalId, &BTreeSet<ModuleId>> = BTreeMap::new();

    for field in normalization.canonical_fields() {
        if priorities.is_bootstrap(&field.id.root_module) {
            continue;
        }
        fields_by_model
            .entry(&field.id.root_model)
            .or_default()
            .push(&field.id);
        if let Some(used) = usage.usage(&field.id) {
            if used.modules.len() > 1 {
                qualifying.insert(&field.id, &used.modules);
            }
        }
    }

    let mut candidates = Vec::new();
    for (model, fields) in fields_by_model {
        let all_qualify = fields.len() > 1 && fields.iter().all(|id| qualifying.contains_key(id));
        if all_qualify {
            let used_in: BTreeSet<ModuleId> = fields
                .iter()
                .filter_map(|id| qualifying.get(id))
                .flat_map(|modules| modules.iter().cloned())
                .collect();
            let owner = fields
                .iter()
                .map(|id| &id.root_module)
                .min_by(|a, b| priorities.compare(a, b))
                .cloned()
                .unwrap_or_else(|| ModuleId::from("unknown"));
            candidates.push(CoreCandidate {
                kind: CandidateKind::Model,
                key: model.to_string(),
                current_module: owner,
                used_in,
                reason: "All fields used in multiple modules".to_string(),
            });
            continue;
        }
        for id in fields {
            if let Some(modules) = qualifying.get(id) {
                candidates.push(CoreCandidate {
                    kind: CandidateKind::Field,
                    key: id.field_key(),
                    current_module: id.root_module.clone(),
                    used_in: (*modules).clone(),
                    reason: "Used in multiple modules".to_string(),
                });
            }
        }
    }
    candidates
}

fn modules_to_move(
    normalization: &Normalization,
    shared: &[SharedField],
    priorities: &ModulePriorities,
) -> Vec<ModuleMove> {
    let mut field_counts: BTreeMap<&ModuleId, usize> = BTreeMap::new();
    for resolved in normalization.resolved() {
        *field_counts.entry(&resolved.canonical.root_module).or_insert(0) += 1;
    }
    let mut extending: BTreeMap<&ModuleId, BTreeSet<ModuleId>> = BTreeMap::new();
    for field in normalization.canonical_fields() {
        extending
            .entry(&field.id.root_module)
            .or_default()
            .extend(field.extending_modules.iter().cloned());
    }

    field_counts
        .into_iter()
        .filter(|(module, _)| !priorities.is_bootstrap(module))
        .filter_map(|(module, field_count)| {
            let extending_modules = extending.remove(module).unwrap_or_default();
            let shared_fields = shared.iter().filter(|s| &s.root_module == module).count();

            let mut reasons = Vec::new();
            if extending_modules.len() > MOVE_EXTENDING_MODULES {
                let names: Vec<&str> = extending_modules.iter().map(ModuleId::as_str).collect();
                reasons.push(format!(
                    "Extended by {} modules: {}",
                    extending_modules.len(),
                    names.join(", ")
                ));
            }
            if field_count > MOVE_FIELD_COUNT {
                reasons.push(format!("Contains {} fields", field_count));
            }
            if shared_fields > MOVE_SHARED_FIELDS {
                reasons.push(format!("{} fields used across multiple modules", shared_fields));
            }
            if reasons.is_empty() {
                return None;
            }
            Some(ModuleMove {
                root_module: module.clone(),
                field_count,
                extending_modules,
                shared_fields,
                reasons,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldRegistry;
    use crate::resolver::normalize;
    use fieldgraph_core::{DependencyDeclaration, FieldDefinition, FieldReference};
    use fieldgraph_graph::{ModelExtensionGraph, ModuleDependencyGraph, PrioritySettings};

    fn priorities() -> ModulePriorities {
        let decls: Vec<DependencyDeclaration> = [
            ("base", vec![]),
            ("sale", vec!["base"]),
            ("sale_margin", vec!["sale"]),
            ("sale_note", vec!["sale"]),
            ("crm", vec!["base"]),
        ]
        .into_iter()
        .map(|(module, deps)| DependencyDeclaration {
            module: module.into(),
            depends: deps.into_iter().map(ModuleId::from).collect(),
        })
        .collect();
        ModuleDependencyGraph::from_declarations(&decls).priorities(&PrioritySettings::default())
    }

    fn reference(model: &str, field: &str, module: &str) -> FieldReference {
        FieldReference {
            model: model.into(),
            field: field.into(),
            module: module.into(),
            context: String::new(),
        }
    }

    fn plan(defs: &[(&str, &str, &str)], refs: &[FieldReference]) -> RestructuringPlan {
        let mut registry = FieldRegistry::new();
        let mut models = ModelExtensionGraph::new();
        for (model, field, module) in defs {
            registry.register(FieldDefinition::new(*model, *field, *module), &mut models);
        }
        let p = priorities();
        let n = normalize(&registry, &models, &p);
        let usage = UsageIndex::build(refs, &n, &models);
        let shared = usage.shared_fields(&n);
        plan_restructuring(&n, &usage, &shared, &p)
    }

    #[test]
    fn fields_used_by_several_modules_become_candidates() {
        let plan = plan(
            &[
                ("sale.order", "margin", "sale"),
                ("sale.order", "note", "sale"),
                ("res.partner", "name", "base"),
            ],
            &[
                reference("sale.order", "margin", "sale"),
                reference("sale.order", "margin", "crm"),
                reference("sale.order", "note", "sale"),
                reference("res.partner", "name", "sale"),
                reference("res.partner", "name", "crm"),
            ],
        );

        assert_eq!(plan.core_candidates.len(), 1);
        let candidate = &plan.core_candidates[0];
        assert_eq!(candidate.kind, CandidateKind::Field);
        assert_eq!(candidate.key, "sale.order.margin");
        assert_eq!(candidate.current_module, ModuleId::from("sale"));
        assert_eq!(
            candidate.used_in,
            BTreeSet::from([ModuleId::from("crm"), ModuleId::from("sale")])
        );
    }

    #[test]
    fn model_with_every_field_shared_is_proposed_whole() {
        let plan = plan(
            &[("sale.order", "margin", "sale"), ("sale.order", "note", "sale")],
            &[
                reference("sale.order", "margin", "sale"),
                reference("sale.order", "margin", "crm"),
                reference("sale.order", "note", "crm"),
                reference("sale.order", "note", "sale_note"),
            ],
        );

        assert_eq!(plan.core_candidates.len(), 1);
        let candidate = &plan.core_candidates[0];
        assert_eq!(candidate.kind, CandidateKind::Model);
        assert_eq!(candidate.key, "sale.order");
        assert_eq!(candidate.used_in.len(), 3);
    }

    #[test]
    fn widely_extended_modules_move_first_when_least_extended() {
        let names: Vec<String> = (0..11).map(|i| format!("f{}", i)).collect();
        let mut defs = vec![
            ("sale.order", "note", "sale"),
            ("sale.order", "note", "sale_margin"),
            ("sale.order", "note", "sale_note"),
        ];
        for name in &names {
            defs.push(("crm.lead", name.as_str(), "crm"));
        }
        let plan = plan(&defs, &[]);

        let moved: Vec<&str> = plan
            .modules_to_move
            .iter()
            .map(|m| m.root_module.as_str())
            .collect();
        assert_eq!(moved, vec!["crm", "sale"]);
        // crm has no extenders, sale has two
        assert_eq!(plan.priority_order, vec![ModuleId::from("crm"), ModuleId::from("sale")]);
        assert_eq!(
            plan.modules_to_update.get(&ModuleId::from("sale_note")),
            Some(&BTreeSet::from([ModuleId::from("sale")]))
        );
        assert!(plan
            .modules_to_move
            .iter()
            .all(|m| m.root_module.as_str() != "base"));
    }
}
