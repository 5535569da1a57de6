use crate::{Graph, Node, NodeArgs, NodeRegistry};
use loomcore::{yaml_to_value, FlowDecl, GraphDecl, InstanceDecl, LoadError, NodeMeta, Requiredness, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Import source name under which the built-in node library is published.
pub const BUILTIN_NAMESPACE: &str = "@loom/nodes";

/// Turns a parsed flow declaration into a wired, runnable graph.
///
/// Node class names resolve through the import table: builtin and
/// registered-package names against the registry, anything else as a flow
/// file relative to the declaring file (a nested graph, loaded recursively).
/// Macro instances bypass the import table; their class is part of the
/// runtime.
pub struct Loader {
    registry: Arc<NodeRegistry>,
    queue_capacity: usize,
    base_dir: PathBuf,
    loading: Vec<PathBuf>,
    cache: HashMap<PathBuf, FlowDecl>,
}

impl Loader {
    pub fn new(registry: Arc<NodeRegistry>, queue_capacity: usize, base_dir: PathBuf) -> Self {
        Self {
            registry,
            queue_capacity,
            base_dir,
            loading: Vec::new(),
            cache: HashMap::new(),
        }
    }

    /// Load a flow file into its declaration and the runnable root graph.
    pub fn load_file(&mut self, path: &Path) -> Result<(FlowDecl, Graph), LoadError> {
        self.load_flow_file(path, None)
    }

    /// Build a graph from an in-memory declaration.
    pub fn build_graph(
        &mut self,
        decl: &GraphDecl,
        imports: &BTreeMap<String, Vec<String>>,
        instance: Option<&InstanceDecl>,
    ) -> Result<Graph, LoadError> {
        let node_type = decl
            .node_id
            .clone()
            .or_else(|| decl.id.clone())
            .unwrap_or_else(|| "Graph".to_string());
        let id = instance
            .map(|ins| ins.id.clone())
            .or_else(|| decl.id.clone())
            .unwrap_or_else(|| generate_instance_id(&node_type));
        let display_name = instance
            .and_then(|ins| ins.display_name.clone())
            .or_else(|| decl.display_name.clone())
            .unwrap_or_default();
        let meta = NodeMeta::new(id, node_type).with_display_name(display_name);

        let mut graph = Graph::with_queue_capacity(meta, self.queue_capacity);
        for (pin, pin_decl) in &decl.inputs {
            graph.add_input(pin, pin_decl.mode.unwrap_or(Requiredness::Required));
        }
        for pin in decl.outputs.keys() {
            graph.add_output(pin);
        }
        for ins in &decl.instances {
            let node = self.instantiate(ins, imports)?;
            graph.add_instance(node);
        }
        for connection in &decl.connections {
            graph.connect(connection.clone())?;
        }
        graph.validate()?;
        graph.set_decl(decl.clone());
        Ok(graph)
    }

    fn instantiate(
        &mut self,
        ins: &InstanceDecl,
        imports: &BTreeMap<String, Vec<String>>,
    ) -> Result<Node, LoadError> {
        let (name, is_macro) = ins
            .class_name()
            .ok_or_else(|| LoadError::UnknownNode(format!("instance '{}' names no node", ins.id)))?;
        let name = name.to_string();

        if is_macro {
            if !self.registry.contains(&name) {
                return Err(LoadError::UnknownNode(name));
            }
            return self.create_component(&name, ins);
        }

        let source = imports
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == &name))
            .map(|(source, _)| source.clone())
            .ok_or_else(|| LoadError::UnresolvedImport { name: name.clone() })?;

        if source == BUILTIN_NAMESPACE || self.registry.contains(&name) {
            if !self.registry.contains(&name) {
                return Err(LoadError::UnknownNode(name));
            }
            return self.create_component(&name, ins);
        }

        // Not a registered class: the source must be a nested flow file
        // relative to the declaring file.
        let path = self.base_dir.join(&source);
        if path.is_file() {
            let (_, graph) = self.load_flow_file(&path, Some(ins))?;
            Ok(Node::Graph(graph))
        } else {
            Err(LoadError::UnresolvedImport { name })
        }
    }

    fn create_component(&self, name: &str, ins: &InstanceDecl) -> Result<Node, LoadError> {
        let args = NodeArgs {
            id: ins.id.clone(),
            display_name: ins.display_name.clone(),
            config: parse_macro_data(ins.macro_data.clone()),
            queue_capacity: self.queue_capacity,
        };
        let mut component = self.registry.create_node(name, args).map_err(|err| match err {
            loomcore::NodeError::MissingConfig(field) => {
                LoadError::MissingMacroField { node: name.to_string(), field }
            }
            other => LoadError::Node(other),
        })?;
        for (pin, config) in &ins.input_config {
            if !component.apply_input_config(pin, config) {
                tracing::warn!(instance = %ins.id, pin = %pin, "input config for unknown pin ignored");
            }
        }
        Ok(Node::Component(component))
    }

    fn load_flow_file(
        &mut self,
        path: &Path,
        instance: Option<&InstanceDecl>,
    ) -> Result<(FlowDecl, Graph), LoadError> {
        let canonical = path.canonicalize().map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if self.loading.contains(&canonical) {
            return Err(LoadError::CyclicImport(path.display().to_string()));
        }
        let decl = match self.cache.get(&canonical) {
            Some(cached) => cached.clone(),
            None => {
                let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                let decl = FlowDecl::from_yaml_str(&text)?;
                self.cache.insert(canonical.clone(), decl.clone());
                decl
            }
        };

        self.loading.push(canonical);
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let previous_base = std::mem::replace(&mut self.base_dir, parent);
        let result = self.build_graph(&decl.node, &decl.imports, instance);
        self.base_dir = previous_base;
        self.loading.pop();

        Ok((decl, result?))
    }
}

/// `<nodeId>-<uuid>` instance ids for declarations that omit one.
pub fn generate_instance_id(node_id: &str) -> String {
    format!("{}-{}", node_id, uuid::Uuid::new_v4())
}

fn parse_macro_data(data: Option<serde_yaml::Value>) -> HashMap<String, Value> {
    match data.map(yaml_to_value) {
        Some(Value::Mapping(map)) => map,
        Some(other) => {
            // A bare scalar is shorthand for {value: ...}
            let mut map = HashMap::new();
            map.insert("value".to_string(), other);
            map
        }
        None => HashMap::new(),
    }
}
