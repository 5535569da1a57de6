use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raised synchronously while turning a declaration into a network; the
/// network is never started on a load error.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Malformed flow declaration: {0}")]
    Malformed(#[from] serde_yaml::Error),

    #[error("Unknown node type: {0}")]
    UnknownNode(String),

    #[error("Import source not found for '{name}'")]
    UnresolvedImport { name: String },

    #[error("Cyclic import of flow file: {0}")]
    CyclicImport(String),

    #[error("Missing field '{field}' in {node} configuration")]
    MissingMacroField { node: String, field: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Raised at graph construction, before any worker runs.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Required input '{pin}' of instance '{instance}' has no connection and no default")]
    Validation { instance: String, pin: String },

    #[error("Connection references unknown instance '{0}'")]
    UnknownInstance(String),

    #[error("Connection references unknown pin '{pin}' on instance '{instance}'")]
    UnknownPin { instance: String, pin: String },
}

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}")]
    InvalidInputType { field: String, expected: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing config entry: {0}")]
    MissingConfig(String),

    #[error("Process failed: {0}")]
    ProcessFailed(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Delivery problems on an output port; logged and dropped at runtime.
#[derive(Error, Debug, Clone)]
pub enum PortError {
    #[error("Output '{0}' is closed")]
    Closed(String),

    #[error("Consumer queue for output '{0}' is disconnected")]
    Disconnected(String),
}

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
