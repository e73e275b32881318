// ABOUTME: Module "depends-on" graph built from manifest declarations
// ABOUTME: Scores each module's foundational-ness; lower priority means more foundational

use crate::scc::strongly_connected_components;
use fieldgraph_core::{AnalysisConfig, DependencyDeclaration, ModuleId};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Inputs of the priority formula that do not come from the graph itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PrioritySettings {
    pub bootstrap_modules: BTreeSet<ModuleId>,
    pub unknown_priority: f64,
}

impl Default for PrioritySettings {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for PrioritySettings {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            bootstrap_modules: config
                .bootstrap_modules
                .iter()
                .map(|m| ModuleId::from(m.as_str()))
                .collect(),
            unknown_priority: config.unknown_module_priority,
        }
    }
}

/// Directed module graph; only modules with a declaration record are "known".
#[derive(Debug, Clone, Default)]
pub struct ModuleDependencyGraph {
    depends: BTreeMap<ModuleId, Vec<ModuleId>>,
    dependents: BTreeMap<ModuleId, Vec<ModuleId>>,
}

impl ModuleDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_declarations<'a>(
        declarations: impl IntoIterator<Item = &'a DependencyDeclaration>,
    ) -> Self {
        let mut graph = Self::new();
        for declaration in declarations {
            graph.declare(declaration);
        }
        graph
    }

    /// Add a declaration; repeated declarations of one module merge their lists.
    pub fn declare(&mut self, declaration: &DependencyDeclaration) {
        let deps = self.depends.entry(declaration.module.clone()).or_default();
        for dep in &declaration.depends {
            if dep == &declaration.module || deps.contains(dep) {
                continue;
            }
            deps.push(dep.clone());
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(declaration.module.clone());
        }
    }

    pub fn is_known(&self, module: &ModuleId) -> bool {
        self.depends.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.depends.keys()
    }

    pub fn len(&self) -> usize {
        self.depends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depends.is_empty()
    }

    pub fn direct_dependencies(&self, module: &ModuleId) -> &[ModuleId] {
        self.depends.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every module reachable through "depends-on" edges, excluding `module` itself.
    pub fn transitive_dependencies(&self, module: &ModuleId) -> BTreeSet<ModuleId> {
        Self::reachable(&self.depends, module)
    }

    /// Every module that depends on `module`, directly or not.
    pub fn transitive_dependents(&self, module: &ModuleId) -> BTreeSet<ModuleId> {
        Self::reachable(&self.dependents, module)
    }

    fn reachable(
        edges: &BTreeMap<ModuleId, Vec<ModuleId>>,
        start: &ModuleId,
    ) -> BTreeSet<ModuleId> {
        let mut seen: BTreeSet<ModuleId> = BTreeSet::new();
        let mut queue: VecDeque<&ModuleId> = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            for next in edges.get(current).into_iter().flatten() {
                if next != start && seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Depth-first walk of the dependencies of `start`.
    /// Never revisits a module; reports whether the walk came back to `start`.
    fn walk(&self, start: &ModuleId) -> DependencyWalk {
        let mut visited: FxHashSet<&ModuleId> = FxHashSet::default();
        let mut stack: Vec<(&ModuleId, usize)> = vec![(start, 0)];
        let mut max_depth = 0usize;
        let mut cyclic = false;
        visited.insert(start);

        while let Some((current, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            for dep in self.direct_dependencies(current) {
                if dep == start {
                    cyclic = true;
                    continue;
                }
                if visited.insert(dep) {
                    stack.push((dep, depth + 1));
                }
            }
        }

        DependencyWalk {
            transitive: visited.len() - 1,
            max_depth,
            cyclic,
        }
    }

    /// Compute every known module's priority.
    ///
    /// Bootstrap modules are pinned at 0. Modules on a dependency cycle get the deepest level
    /// their walks reached, shared by the whole cycle; anything else scores
    /// `transitive dependencies - 0.5 * transitive dependents`. Every non-bootstrap score is
    /// then raised to at least the priority of each known direct dependency, and undeclared
    /// modules rank after every known one.
    pub fn priorities(&self, settings: &PrioritySettings) -> ModulePriorities {
        let mut raw: BTreeMap<&ModuleId, f64> = BTreeMap::new();
        let mut capped = BTreeSet::new();

        for module in self.depends.keys() {
            if settings.bootstrap_modules.contains(module) {
                raw.insert(module, 0.0);
                continue;
            }
            let walk = self.walk(module);
            let score = if walk.cyclic {
                debug!(
                    "Module {} is on a dependency cycle; capping priority at depth {}",
                    module, walk.max_depth
                );
                capped.insert(module.clone());
                walk.max_depth as f64
            } else {
                let dependents = self.transitive_dependents(module).len();
                walk.transitive as f64 - 0.5 * dependents as f64
            };
            raw.insert(module, score);
        }

        let scores = self.settle(&raw, settings);
        let highest_known = scores.values().copied().fold(0.0_f64, f64::max);
        let unknown = if settings.unknown_priority > highest_known {
            settings.unknown_priority
        } else {
            debug!(
                "Known priorities reach {}; undeclared modules ranked at {}",
                highest_known,
                highest_known + 1.0
            );
            highest_known + 1.0
        };

        ModulePriorities {
            scores,
            bootstrap: settings.bootstrap_modules.clone(),
            unknown,
            capped,
        }
    }

    /// Final scores, one dependency component at a time. Tarjan emits a component only after
    /// every component it depends on, so dependency scores are final when read.
    fn settle(
        &self,
        raw: &BTreeMap<&ModuleId, f64>,
        settings: &PrioritySettings,
    ) -> BTreeMap<ModuleId, f64> {
        let ids: Vec<&ModuleId> = self.depends.keys().collect();
        let index: BTreeMap<&ModuleId, usize> =
            ids.iter().enumerate().map(|(i, m)| (*m, i)).collect();
        let adj: Vec<Vec<usize>> = ids
            .iter()
            .map(|m| {
                self.direct_dependencies(m)
                    .iter()
                    .filter_map(|d| index.get(d).copied())
                    .collect()
            })
            .collect();

        let mut scores: BTreeMap<ModuleId, f64> = BTreeMap::new();
        for component in strongly_connected_components(&adj) {
            let members: BTreeSet<usize> = component.iter().copied().collect();
            let mut shared = component
                .iter()
                .filter(|&&v| !settings.bootstrap_modules.contains(ids[v]))
                .filter_map(|&v| raw.get(ids[v]).copied())
                .fold(f64::NEG_INFINITY, f64::max);
            for &v in &component {
                for &dep in &adj[v] {
                    if !members.contains(&dep) {
                        if let Some(score) = scores.get(ids[dep]) {
                            shared = shared.max(*score);
                        }
                    }
                }
            }
            for &v in &component {
                let score = if settings.bootstrap_modules.contains(ids[v]) {
                    0.0
                } else {
                    shared
                };
                scores.insert(ids[v].clone(), score);
            }
        }
        scores
    }
}

struct DependencyWalk {
    transitive: usize,
    max_depth: usize,
    cyclic: bool,
}

/// Priority lookup; unknown modules fall back to the configured worst-case priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulePriorities {
    scores: BTreeMap<ModuleId, f64>,
    bootstrap: BTreeSet<ModuleId>,
    unknown: f64,
    capped: BTreeSet<ModuleId>,
}

impl Default for ModulePriorities {
    fn default() -> Self {
        ModuleDependencyGraph::new().priorities(&PrioritySettings::default())
    }
}

impl ModulePriorities {
    pub fn priority(&self, module: &ModuleId) -> f64 {
        if self.bootstrap.contains(module) {
            return 0.0;
        }
        self.scores.get(module).copied().unwrap_or(self.unknown)
    }

    pub fn is_known(&self, module: &ModuleId) -> bool {
        self.bootstrap.contains(module) || self.scores.contains_key(module)
    }

    /// One of the platform's own modules, pinned at priority 0.
    pub fn is_bootstrap(&self, module: &ModuleId) -> bool {
        self.bootstrap.contains(module)
    }

    /// Ascending priority, then module name.
    pub fn compare(&self, a: &ModuleId, b: &ModuleId) -> Ordering {
        self.priority(a)
            .total_cmp(&self.priority(b))
            .then_with(|| a.cmp(b))
    }

    /// Modules whose score was capped because they sit on a dependency cycle.
    pub fn capped_modules(&self) -> &BTreeSet<ModuleId> {
        &self.capped
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, f64)> {
        self.scores.iter().map(|(m, p)| (m, *p))
    }
}
