// ABOUTME: End-to-end analysis over a frozen ingestion
// ABOUTME: Normalization and cycle detection run side by side once priorities exist

use crate::ingest::Ingestion;
use crate::report::{AnalysisReport, CycleReport, CycleSummary, FieldRecord};
use crate::resolver::{normalize, Normalization};
use crate::restructure::plan_restructuring;
use crate::summary::summarize_modules;
use crate::usage::UsageIndex;
use fieldgraph_core::{AnalysisConfig, FieldGraphConfig};
use fieldgraph_graph::{find_cycles, CycleRecord, ModulePriorities, PrioritySettings};
use std::time::Instant;
use tracing::{debug, info};

pub struct Analyzer {
    config: AnalysisConfig,
}

impl Analyzer {
    pub fn new(config: &FieldGraphConfig) -> Self {
        Self {
            config: config.analysis.clone(),
        }
    }

    pub fn with_analysis_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn priorities(&self, ingestion: &Ingestion) -> ModulePriorities {
        let settings = PrioritySettings::from(&self.config);
        let priorities = ingestion.module_graph().priorities(&settings);
        if !priorities.capped_modules().is_empty() {
            debug!(
                "{} modules sit on dependency cycles and were capped",
                priorities.capped_modules().len()
            );
        }
        priorities
    }

    pub fn normalize(&self, ingestion: &Ingestion) -> Normalization {
        let priorities = self.priorities(ingestion);
        normalize(ingestion.registry(), ingestion.extensions(), &priorities)
    }

    /// Cycle detection alone; does not need module priorities.
    pub fn detect_cycles(&self, ingestion: &Ingestion) -> Vec<CycleReport> {
        let records = find_cycles(ingestion.extensions());
        self.annotate_cycles(&records, ingestion)
    }

    fn annotate_cycles(&self, records: &[CycleRecord], ingestion: &Ingestion) -> Vec<CycleReport> {
        let registry = ingestion.registry();
        records
            .iter()
            .map(|record| {
                CycleReport::annotate(
                    record,
                    self.config.spurious_cycle_threshold,
                    ingestion.extensions(),
                    |model| registry.definitions_on_model(model),
                )
            })
            .collect()
    }

    pub fn run(&self, ingestion: &Ingestion) -> AnalysisReport {
        let start = Instant::now();
        let priorities = self.priorities(ingestion);
        debug!("Computed priorities in {:?}", start.elapsed());

        let phase = Instant::now();
        let (normalization, records) = rayon::join(
            || normalize(ingestion.registry(), ingestion.extensions(), &priorities),
            || find_cycles(ingestion.extensions()),
        );
        info!(
            "Resolved {} canonical fields and {} cycles in {:?}",
            normalization.len(),
            records.len(),
            phase.elapsed()
        );

        let usage = UsageIndex::build(ingestion.references(), &normalization, ingestion.extensions());
        let fields = normalization
            .resolved()
            .iter()
            .map(|resolved| FieldRecord::from_resolved(resolved, &normalization, &usage))
            .collect();

        let cycles = self.annotate_cycles(&records, ingestion);
        let cycle_summary = CycleSummary::from_reports(&cycles, ingestion.extensions());
        let modules = summarize_modules(&normalization, ingestion.module_graph(), &priorities);
        let shared_fields = usage.shared_fields(&normalization);
        let restructuring = plan_restructuring(&normalization, &usage, &shared_fields, &priorities);

        let report = AnalysisReport {
            fields,
            canonical_fields: normalization.len(),
            cycles,
            cycle_summary,
            modules,
            shared_fields,
            unused_fields: usage
                .unused_fields(&normalization)
                .into_iter()
                .map(|id| id.field_key())
                .collect(),
            unresolved_references: usage.unresolved().len(),
            restructuring,
            priorities,
            ingest: ingestion.report().clone(),
        };

        info!("Analysis completed in {:?}", start.elapsed());
        report
    }
}
