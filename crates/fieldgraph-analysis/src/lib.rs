//! Field identity normalization on top of the FieldGraph graphs.
//!
//! Ingestion freezes raw records into a [`FieldRegistry`] plus the module and model graphs;
//! [`Analyzer::run`] then resolves every field definition to its root owner, detects
//! extension cycles and assembles an [`AnalysisReport`].

pub mod ingest;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod restructure;
pub mod summary;
pub mod usage;

pub use ingest::*;
pub use pipeline::Analyzer;
pub use registry::FieldRegistry;
pub use report::*;
pub use resolver::*;
pub use restructure::*;
pub use summary::*;
pub use usage::*;
