//! Built-in node library
//!
//! The macro nodes every flow can use without imports, plus a few common
//! utility components published under the `@loom/nodes` namespace.

mod attribute;
mod conditional;
mod debug;
mod inline;
mod transform;

pub use attribute::{GetAttribute, GetAttributeFactory};
pub use conditional::{Conditional, ConditionalFactory};
pub use debug::{Print, PrintFactory};
pub use inline::{InlineValue, InlineValueFactory};
pub use transform::{JsonParse, JsonParseFactory, JsonStringify, JsonStringifyFactory};

use loomruntime::NodeRegistry;
use std::sync::Arc;

/// The closed set of macro node classes the loader may expand from
/// `macroId` or `Macro__suffix` node ids.
pub static SUPPORTED_MACROS: &[&str] = &["InlineValue", "Conditional", "GetAttribute"];

/// Register all built-in nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(inline::InlineValueFactory));
    registry.register(Arc::new(conditional::ConditionalFactory));
    registry.register(Arc::new(attribute::GetAttributeFactory));
    registry.register(Arc::new(debug::PrintFactory));
    registry.register(Arc::new(transform::JsonParseFactory));
    registry.register(Arc::new(transform::JsonStringifyFactory));
}

/// A fresh registry preloaded with the built-in library.
pub fn builtin_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    registry
}
