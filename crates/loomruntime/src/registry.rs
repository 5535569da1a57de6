use crate::Component;
use loomcore::{NodeError, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Construction arguments handed to a factory: the instance identity plus
/// the parsed configuration from the declaration.
#[derive(Debug, Clone)]
pub struct NodeArgs {
    pub id: String,
    pub display_name: Option<String>,
    pub config: HashMap<String, Value>,
    pub queue_capacity: usize,
}

impl NodeArgs {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            config: HashMap::new(),
            queue_capacity: loomcore::DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Get a config entry or fail with an error naming it.
    pub fn require_config(&self, key: &str) -> Result<&Value, NodeError> {
        self.config
            .get(key)
            .ok_or_else(|| NodeError::MissingConfig(key.to_string()))
    }

    pub fn get_config(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }
}

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Node type identifier (e.g. "InlineValue", "Print")
    fn node_type(&self) -> &str;

    /// Create a new instance of the node with given arguments
    fn create(&self, args: NodeArgs) -> Result<Component, NodeError>;

    /// Optional: node metadata (description, pin schema)
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PinDefinition>,
    pub outputs: Vec<PinDefinition>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PinDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Registry of available node types
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let node_type = factory.node_type().to_string();
        tracing::debug!("registering node type: {}", node_type);
        self.factories.insert(node_type, factory);
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Create a node instance from a node type and arguments
    pub fn create_node(&self, node_type: &str, args: NodeArgs) -> Result<Component, NodeError> {
        let factory = self.factories.get(node_type).ok_or_else(|| {
            NodeError::Configuration(format!("unknown node type: {}", node_type))
        })?;
        factory.create(args)
    }

    /// All registered node types
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.factories.get(node_type).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
