//! Core abstractions for the loom flow engine
//!
//! This crate provides the fundamental types every other component depends
//! on: the dynamic value model, the packet/EOS signal, typed input and
//! output ports, connections, the flow declaration model, and the node
//! contract. It contains no scheduling; the runtime lives in `loomruntime`.

mod connection;
mod decl;
mod error;
mod node;
mod packet;
mod port;
mod value;

pub use connection::{Connection, ConnectionEnd};
pub use decl::{FlowDecl, GraphDecl, GraphPinDecl, InstanceDecl};
pub use error::{FlowError, GraphError, LoadError, NodeError, PortError, Result};
pub use node::{
    Inputs, Latch, NodeMeta, Process, ProcessContext, ProcessHandle, ProcessOutput,
    ProcessOutputMap,
};
pub use packet::Packet;
pub use port::{
    InputConfig, InputMode, InputPort, InputSpec, InputType, OutputMode, OutputPort, OutputSpec,
    Requiredness, DEFAULT_QUEUE_CAPACITY,
};
pub use value::{json_to_value, value_to_json, value_to_yaml, yaml_to_value, Value};
