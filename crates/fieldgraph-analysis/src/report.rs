// ABOUTME: Flat report records handed to rendering collaborators (CSV, JSON, terminal)
// ABOUTME: One record per field definition, per cycle and per module

use crate::ingest::IngestReport;
use crate::resolver::{Normalization, ResolvedDefinition};
use crate::restructure::RestructuringPlan;
use crate::summary::ModuleSummary;
use crate::usage::{SharedField, UsageIndex};
use fieldgraph_core::{ModelId, ModuleId, SourceLocation};
use fieldgraph_graph::{
    describe_cycle, CycleClassification, CycleRecord, ModelExtensionGraph, ModulePriorities,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    /// `<root model>.<field>`
    pub field_key: String,
    pub model: ModelId,
    pub field_name: String,
    pub root_model: ModelId,
    pub root_module: ModuleId,
    /// Module of this particular definition.
    pub module: ModuleId,
    pub extending_modules: Vec<ModuleId>,
    pub is_extension: bool,
    pub declared_override: bool,
    pub field_type: Option<String>,
    pub usage_count: usize,
    pub location: SourceLocation,
}

impl FieldRecord {
    pub fn from_resolved(
        resolved: &ResolvedDefinition,
        normalization: &Normalization,
        usage: &UsageIndex,
    ) -> Self {
        let canonical = &resolved.canonical;
        let extending_modules = normalization
            .canonical(canonical)
            .map(|f| f.extending_modules.iter().cloned().collect())
            .unwrap_or_default();
        Self {
            field_key: canonical.field_key(),
            model: resolved.definition.model.clone(),
            field_name: resolved.definition.field.to_string(),
            root_model: canonical.root_model.clone(),
            root_module: canonical.root_module.clone(),
            module: resolved.definition.module.clone(),
            extending_modules,
            is_extension: resolved.is_extension,
            declared_override: resolved.definition.declared_override,
            field_type: resolved.definition.field_type.clone(),
            usage_count: usage.usage_count(canonical),
            location: resolved.definition.location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleEdge {
    pub from: ModelId,
    pub to: ModelId,
    pub declared_by: BTreeSet<ModuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub sequence: Vec<ModelId>,
    pub models: BTreeSet<ModelId>,
    pub detection_count: usize,
    pub classification: CycleClassification,
    /// Field definitions registered on each model of the cycle.
    pub field_counts: BTreeMap<ModelId, usize>,
    pub edges: Vec<CycleEdge>,
}

impl CycleReport {
    pub fn annotate(
        record: &CycleRecord,
        spurious_threshold: usize,
        extensions: &ModelExtensionGraph,
        field_counts: impl Fn(&ModelId) -> usize,
    ) -> Self {
        let n = record.sequence.len();
        let edges = (0..n)
            .map(|i| {
                let from = &record.sequence[i];
                let to = &record.sequence[(i + 1) % n];
                CycleEdge {
                    from: from.clone(),
                    to: to.clone(),
                    declared_by: extensions
                        .edge_declarers(from, to)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect();
        Self {
            sequence: record.sequence.clone(),
            models: record.models.clone(),
            detection_count: record.detection_count,
            classification: record.classify(spurious_threshold),
            field_counts: record
                .models
                .iter()
                .map(|m| (m.clone(), field_counts(m)))
                .collect(),
            edges,
        }
    }

    pub fn describe(&self) -> String {
        describe_cycle(&self.sequence)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub total_cycles: usize,
    pub total_detections: usize,
    pub real_candidates: usize,
    pub likely_spurious: usize,
    /// Detections per model, most frequent first.
    pub models_in_cycles: Vec<(ModelId, usize)>,
    /// Models that extend themselves in place; never counted as cycles.
    pub self_extending_models: usize,
}

impl CycleSummary {
    pub fn from_reports(reports: &[CycleReport], extensions: &ModelExtensionGraph) -> Self {
        let mut per_model: BTreeMap<&ModelId, usize> = BTreeMap::new();
        for report in reports {
            for model in &report.models {
                *per_model.entry(model).or_insert(0) += report.detection_count;
            }
        }
        let mut models_in_cycles: Vec<(ModelId, usize)> = per_model
            .into_iter()
            .map(|(m, c)| (m.clone(), c))
            .collect();
        models_in_cycles.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let likely_spurious = reports
            .iter()
            .filter(|r| r.classification == CycleClassification::LikelySpurious)
            .count();

        Self {
            total_cycles: reports.len(),
            total_detections: reports.iter().map(|r| r.detection_count).sum(),
            real_candidates: reports.len() - likely_spurious,
            likely_spurious,
            models_in_cycles,
            self_extending_models: extensions
                .models()
                .filter(|m| extensions.self_extension_count(m) > 0)
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub fields: Vec<FieldRecord>,
    pub canonical_fields: usize,
    pub cycles: Vec<CycleReport>,
    pub cycle_summary: CycleSummary,
    pub modules: Vec<ModuleSummary>,
    pub priorities: ModulePriorities,
    pub shared_fields: Vec<SharedField>,
    pub unused_fields: Vec<String>,
    pub unresolved_references: usize,
    pub restructuring: RestructuringPlan,
    pub ingest: IngestReport,
}

impl AnalysisReport {
    pub fn fields_of<'a>(&'a self, model: &'a str, field: &'a str) -> impl Iterator<Item = &'a FieldRecord> + 'a {
        self.fields
            .iter()
            .filter(move |r| r.model.as_str() == model && r.field_name == field)
    }

    pub fn module(&self, module: &str) -> Option<&ModuleSummary> {
        self.modules.iter().find(|m| m.module.as_str() == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldgraph_graph::find_cycles;

    #[test]
    fn annotated_cycle_reads_like_its_record() {
        let mut extensions = ModelExtensionGraph::new();
        let module = ModuleId::from("sale");
        extensions.add_edge(&ModelId::from("b"), &ModelId::from("c"), &module);
        extensions.add_edge(&ModelId::from("c"), &ModelId::from("a"), &module);
        extensions.add_edge(&ModelId::from("a"), &ModelId::from("b"), &module);

        let records = find_cycles(&extensions);
        assert_eq!(records.len(), 1);
        let report = CycleReport::annotate(&records[0], 3, &extensions, |_| 0);

        assert_eq!(report.describe(), records[0].describe());
        assert_eq!(report.describe(), "a -> b -> c -> a");
        assert_eq!(report.edges.len(), 3);
        assert!(report
            .edges
            .iter()
            .all(|e| e.declared_by == BTreeSet::from([module.clone()])));
    }
}
