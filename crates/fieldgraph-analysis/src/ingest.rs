// ABOUTME: Single-writer ingestion of raw records into the graphs and the field registry
// ABOUTME: Parse workers push into a channel; analysis only ever sees the frozen result

use crate::registry::FieldRegistry;
use crossbeam_channel::{unbounded, Receiver, Sender};
use fieldgraph_core::{
    DependencyDeclaration, FieldGraphError, FieldKey, FieldReference, ModuleId, RawDependency,
    RawExtension, RawFieldDefinition, RawFieldReference, RecordBundle, RecordError, Result,
    SourceLocation,
};
use fieldgraph_graph::{ModelExtensionGraph, ModuleDependencyGraph};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum IngestEvent {
    Dependency(RawDependency),
    Extension(RawExtension),
    Field(RawFieldDefinition),
    Reference(RawFieldReference),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Dependency,
    Extension,
    Field,
    Reference,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::Dependency => "dependency",
            RecordKind::Extension => "extension",
            RecordKind::Field => "field",
            RecordKind::Reference => "reference",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub kind: RecordKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub dependencies: usize,
    pub extensions: usize,
    pub self_extensions: usize,
    pub fields: usize,
    pub references: usize,
    pub duplicates_collapsed: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Clonable handle given to parse workers.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: Sender<IngestEvent>,
}

impl RecordSender {
    pub fn send(&self, event: IngestEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| {
            FieldGraphError::InvalidOperation("ingestion has already finished".to_string())
        })
    }

    pub fn send_dependency(&self, record: RawDependency) -> Result<()> {
        self.send(IngestEvent::Dependency(record))
    }

    pub fn send_extension(&self, record: RawExtension) -> Result<()> {
        self.send(IngestEvent::Extension(record))
    }

    pub fn send_field(&self, record: RawFieldDefinition) -> Result<()> {
        self.send(IngestEvent::Field(record))
    }

    pub fn send_reference(&self, record: RawFieldReference) -> Result<()> {
        self.send(IngestEvent::Reference(record))
    }
}

/// Many producers, one writer.
pub struct IngestQueue {
    tx: Sender<IngestEvent>,
    rx: Receiver<IngestEvent>,
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> RecordSender {
        RecordSender {
            tx: self.tx.clone(),
        }
    }

    /// Drain every event on the calling thread and freeze the result.
    ///
    /// Blocks until every `RecordSender` has been dropped, so no analysis can start on a
    /// partially ingested graph.
    pub fn finish(self) -> Ingestion {
        let IngestQueue { tx, rx } = self;
        drop(tx);
        let mut builder = IngestionBuilder::new();
        for event in rx.iter() {
            builder.push(event);
        }
        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct IngestionBuilder {
    dependencies: Vec<DependencyDeclaration>,
    module_graph: ModuleDependencyGraph,
    extensions: ModelExtensionGraph,
    registry: FieldRegistry,
    references: Vec<FieldReference>,
    seen: FxHashSet<(FieldKey, ModuleId, SourceLocation)>,
    report: IngestReport,
}

impl IngestionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Dependency(record) => self.add_dependency(&record),
            IngestEvent::Extension(record) => self.add_extension(&record),
            IngestEvent::Field(record) => self.add_field(&record),
            IngestEvent::Reference(record) => self.add_reference(&record),
        }
    }

    pub fn extend(&mut self, bundle: RecordBundle) {
        for record in &bundle.dependencies {
            self.add_dependency(record);
        }
        for record in &bundle.extensions {
            self.add_extension(record);
        }
        for record in &bundle.fields {
            self.add_field(record);
        }
        for record in &bundle.references {
            self.add_reference(record);
        }
    }

    fn reject(&mut self, kind: RecordKind, error: RecordError) {
        warn!("Rejected {} record: {}", kind, error);
        self.report.rejected.push(RejectedRecord {
            kind,
            reason: error.to_string(),
        });
    }

    pub fn add_dependency(&mut self, record: &RawDependency) {
        match record.validate() {
            Ok(declaration) => {
                self.module_graph.declare(&declaration);
                self.dependencies.push(declaration);
                self.report.dependencies += 1;
            }
            Err(e) => self.reject(RecordKind::Dependency, e),
        }
    }

    pub fn add_extension(&mut self, record: &RawExtension) {
        match record.validate() {
            Ok(declaration) => {
                self.report.self_extensions += self.extensions.add_declaration(&declaration);
                self.report.extensions += 1;
            }
            Err(e) => self.reject(RecordKind::Extension, e),
        }
    }

    pub fn add_field(&mut self, record: &RawFieldDefinition) {
        let definition = match record.validate() {
            Ok(definition) => definition,
            Err(e) => return self.reject(RecordKind::Field, e),
        };
        let identity = (
            definition.key(),
            definition.module.clone(),
            definition.location.clone(),
        );
        if !self.seen.insert(identity) {
            debug!(
                "Collapsing duplicate definition of {} from {} at {}",
                definition.key(),
                definition.module,
                definition.location
            );
            self.report.duplicates_collapsed += 1;
            return;
        }
        self.registry.register(definition, &mut self.extensions);
        self.report.fields += 1;
    }

    pub fn add_reference(&mut self, record: &RawFieldReference) {
        match record.validate() {
            Ok(reference) => {
                self.references.push(reference);
                self.report.references += 1;
            }
            Err(e) => self.reject(RecordKind::Reference, e),
        }
    }

    pub fn build(self) -> Ingestion {
        info!(
            "Ingested {} dependency, {} extension, {} field and {} reference records ({} rejected, {} duplicates collapsed)",
            self.report.dependencies,
            self.report.extensions,
            self.report.fields,
            self.report.references,
            self.report.rejected.len(),
            self.report.duplicates_collapsed
        );
        Ingestion {
            dependencies: self.dependencies,
            module_graph: self.module_graph,
            extensions: self.extensions,
            registry: self.registry,
            references: self.references,
            report: self.report,
        }
    }
}

/// Frozen ingestion result; every analysis reads from this and nothing mutates it.
#[derive(Debug, Clone, Default)]
pub struct Ingestion {
    dependencies: Vec<DependencyDeclaration>,
    module_graph: ModuleDependencyGraph,
    extensions: ModelExtensionGraph,
    registry: FieldRegistry,
    references: Vec<FieldReference>,
    report: IngestReport,
}

impl Ingestion {
    pub fn from_bundle(bundle: RecordBundle) -> Self {
        let mut builder = IngestionBuilder::new();
        builder.extend(bundle);
        builder.build()
    }

    pub fn dependencies(&self) -> &[DependencyDeclaration] {
        &self.dependencies
    }

    pub fn module_graph(&self) -> &ModuleDependencyGraph {
        &self.module_graph
    }

    pub fn extensions(&self) -> &ModelExtensionGraph {
        &self.extensions
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn references(&self) -> &[FieldReference] {
        &self.references
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldgraph_core::ModelId;
    use std::thread;

    fn field(model: &str, name: &str, module: &str, line: u32) -> RawFieldDefinition {
        RawFieldDefinition {
            model: model.into(),
            field: name.into(),
            module: module.into(),
            location: SourceLocation::new(format!("{}/models/x.py", module), line),
            ..Default::default()
        }
    }

    #[test]
    fn identical_definitions_collapse() {
        let mut builder = IngestionBuilder::new();
        builder.add_field(&field("sale.order", "note", "sale", 10));
        builder.add_field(&field("sale.order", "note", "sale", 10));
        builder.add_field(&field("sale.order", "note", "sale", 11));
        let ingestion = builder.build();
        assert_eq!(ingestion.report().duplicates_collapsed, 1);
        assert_eq!(ingestion.registry().definition_count(), 2);
    }

    #[test]
    fn malformed_records_are_reported_not_fatal() {
        let mut builder = IngestionBuilder::new();
        builder.add_field(&field("", "note", "sale", 1));
        builder.add_field(&field("sale.order", "note", "", 1));
        builder.add_field(&field("sale.order", "name", "sale", 1));
        let ingestion = builder.build();
        assert_eq!(ingestion.report().rejected.len(), 2);
        assert_eq!(ingestion.report().rejected[0].kind, RecordKind::Field);
        assert_eq!(ingestion.registry().group_count(), 1);
    }

    #[test]
    fn self_extensions_are_counted_separately() {
        let mut builder = IngestionBuilder::new();
        builder.add_extension(&RawExtension {
            model: "sale.order".into(),
            parents: vec!["sale.order".into(), "mail.thread".into()],
            module: "sale".into(),
        });
        let ingestion = builder.build();
        assert_eq!(ingestion.report().self_extensions, 1);
        assert_eq!(
            ingestion.extensions().parents(&ModelId::from("sale.order")),
            &[ModelId::from("mail.thread")]
        );
    }

    #[test]
    fn queue_collects_from_concurrent_workers() {
        let queue = IngestQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let sender = queue.sender();
                thread::spawn(move || {
                    for line in 0..25 {
                        sender
                            .send_field(field("res.partner", "name", &format!("mod{}", worker), line))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ingestion = queue.finish();
        assert_eq!(ingestion.report().fields, 100);
        assert_eq!(ingestion.registry().group_count(), 1);
    }
}
