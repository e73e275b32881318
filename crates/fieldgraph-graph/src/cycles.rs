// ABOUTME: Finds cycles in the model extension graph without inflating their number
// ABOUTME: Rotation-equal cycles merge into one record whose detection count grows instead

use crate::extension::ModelExtensionGraph;
use crate::scc::strongly_connected_components;
use fieldgraph_core::ModelId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// One rotation class of closed walks in the extension graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Models along the cycle, rotated to start at the smallest identifier.
    pub sequence: Vec<ModelId>,
    pub models: BTreeSet<ModelId>,
    /// How many traversals closed this cycle.
    pub detection_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleClassification {
    RealCandidate,
    LikelySpurious,
}

impl fmt::Display for CycleClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleClassification::RealCandidate => f.write_str("real-candidate"),
            CycleClassification::LikelySpurious => f.write_str("likely-spurious"),
        }
    }
}

impl CycleRecord {
    pub fn distinct_models(&self) -> usize {
        self.models.len()
    }

    /// Advisory only: a high detection count or a single-model cycle smells like a detector
    /// artifact rather than a modelling problem.
    pub fn classify(&self, spurious_threshold: usize) -> CycleClassification {
        if self.detection_count > spurious_threshold || self.distinct_models() <= 1 {
            CycleClassification::LikelySpurious
        } else {
            CycleClassification::RealCandidate
        }
    }

    pub fn describe(&self) -> String {
        describe_cycle(&self.sequence)
    }
}

/// `a -> b -> a`: the sequence closed back on its first model.
pub fn describe_cycle(sequence: &[ModelId]) -> String {
    let mut parts: Vec<&str> = sequence.iter().map(ModelId::as_str).collect();
    if let Some(first) = sequence.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// Rotate so the smallest model comes first; members of a simple cycle are distinct.
pub fn canonical_rotation(cycle: &[ModelId]) -> Vec<ModelId> {
    let Some(start) = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
    else {
        return Vec::new();
    };
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[start..]);
    rotated.extend_from_slice(&cycle[..start]);
    rotated
}

/// Every elementary cycle of the extension graph, one record per rotation class.
///
/// Self-extensions never enter the traversal. Enumeration runs inside each non-trivial
/// strongly connected component only. A path-tracking traversal started from any model of a
/// cycle closes it once, so a cycle's detection count is the number of its models.
pub fn find_cycles(graph: &ModelExtensionGraph) -> Vec<CycleRecord> {
    let ids: Vec<&ModelId> = graph.models().collect();
    let index: FxHashMap<&ModelId, usize> = ids.iter().enumerate().map(|(i, m)| (*m, i)).collect();

    let adj: Vec<Vec<usize>> = ids
        .iter()
        .map(|model| {
            graph
                .parents(model)
                .iter()
                .filter_map(|p| index.get(p).copied())
                .filter(|p| ids[*p] != *model)
                .collect()
        })
        .collect();

    let mut classes: BTreeMap<Vec<ModelId>, usize> = BTreeMap::new();

    for component in strongly_connected_components(&adj) {
        if component.len() < 2 {
            continue;
        }
        // component members are sorted, so local indices follow global ones
        let local: FxHashMap<usize, usize> =
            component.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let local_adj: Vec<Vec<usize>> = component
            .iter()
            .map(|&v| adj[v].iter().filter_map(|w| local.get(w).copied()).collect())
            .collect();

        for cycle in elementary_cycles(&local_adj) {
            let models: Vec<ModelId> = cycle.iter().map(|&i| ids[component[i]].clone()).collect();
            let detections = models.len();
            let count = classes.entry(canonical_rotation(&models)).or_insert(0);
            if *count == 0 {
                debug!("New extension cycle through {}", models[0]);
            }
            *count += detections;
        }
    }

    classes
        .into_iter()
        .map(|(sequence, detection_count)| CycleRecord {
            models: sequence.iter().cloned().collect(),
            sequence,
            detection_count,
        })
        .collect()
}

/// Johnson's enumeration: each elementary cycle of `adj` exactly once, starting at its
/// smallest node. `adj` must not contain self-loops.
pub fn elementary_cycles(adj: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adj.len();
    let mut cycles = Vec::new();

    for start in 0..n {
        let sub: Vec<Vec<usize>> = (0..n)
            .map(|v| {
                if v < start {
                    Vec::new()
                } else {
                    adj[v].iter().copied().filter(|&w| w >= start).collect()
                }
            })
            .collect();
        let Some(component) = strongly_connected_components(&sub)
            .into_iter()
            .find(|c| c.contains(&start))
        else {
            continue;
        };
        if component.len() < 2 {
            continue;
        }

        let mut member = vec![false; n];
        for &v in &component {
            member[v] = true;
        }
        let mut search = CircuitSearch {
            adj: &sub,
            member: &member,
            start,
            blocked: vec![false; n],
            blocked_by: vec![Vec::new(); n],
            path: Vec::new(),
            cycles: &mut cycles,
        };
        search.circuit(start);
    }

    cycles
}

struct CircuitSearch<'a> {
    adj: &'a [Vec<usize>],
    member: &'a [bool],
    start: usize,
    blocked: Vec<bool>,
    blocked_by: Vec<Vec<usize>>,
    path: Vec<usize>,
    cycles: &'a mut Vec<Vec<usize>>,
}

impl CircuitSearch<'_> {
    fn circuit(&mut self, v: usize) -> bool {
        let adj = self.adj;
        let mut closed = false;
        self.path.push(v);
        self.blocked[v] = true;

        for &w in &adj[v] {
            if !self.member[w] {
                continue;
            }
            if w == self.start {
                self.cycles.push(self.path.clone());
                closed = true;
            } else if !self.blocked[w] && self.circuit(w) {
                closed = true;
            }
        }

        if closed {
            self.unblock(v);
        } else {
            for &w in &adj[v] {
                if self.member[w] && !self.blocked_by[w].contains(&v) {
                    self.blocked_by[w].push(v);
                }
            }
        }
        self.path.pop();
        closed
    }

    fn unblock(&mut self, v: usize) {
        self.blocked[v] = false;
        for w in std::mem::take(&mut self.blocked_by[v]) {
            if self.blocked[w] {
                self.unblock(w);
            }
        }
    }
}
