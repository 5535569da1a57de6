//! Flow execution runtime
//!
//! This crate turns declarations from `loomcore` into running networks: one
//! worker per leaf component, bounded queues between ports, a supervisor per
//! graph, plus the loader and the node registry the loader resolves classes
//! against.

mod component;
mod flow;
mod graph;
mod loader;
mod registry;

pub use component::Component;
pub use flow::{ErrorPolicy, Flow, RunContext, RuntimeConfig};
pub use graph::{Graph, GraphPort, Node, THIS_INS_ID};
pub use loader::{generate_instance_id, Loader, BUILTIN_NAMESPACE};
pub use registry::{NodeArgs, NodeFactory, NodeMetadata, NodeRegistry, PinDefinition};
