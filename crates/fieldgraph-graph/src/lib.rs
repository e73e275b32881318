//! Graphs for FieldGraph
//!
//! - `module_graph`: module "depends-on" graph and priority scoring
//! - `extension`: model "extends" graph with self-extensions kept apart
//! - `cycles`: rotation-deduplicated cycle detection over the extension graph
//! - `scc`: Tarjan's strongly connected components

pub mod cycles;
pub mod extension;
pub mod module_graph;
pub mod scc;

pub use cycles::*;
pub use extension::*;
pub use module_graph::*;
pub use scc::strongly_connected_components;
