use crate::{Component, RunContext};
use futures::future::join_all;
use loomcore::{
    Connection, GraphDecl, GraphError, GraphPinDecl, InputConfig, InputPort, InputSpec,
    InstanceDecl, Latch, NodeError, NodeMeta, OutputPort, OutputSpec, Packet, ProcessHandle,
    Requiredness,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Distinguished instance id naming the surrounding graph itself in
/// connection endpoints.
pub const THIS_INS_ID: &str = "__this";

/// A node in a graph: either a leaf component or a nested graph. Both share
/// the same lifecycle surface (spawn, stop, stopped, terminate).
pub enum Node {
    Component(Component),
    Graph(Graph),
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Component(c) => f.debug_tuple("Component").field(&c.id()).finish(),
            Node::Graph(g) => f.debug_tuple("Graph").field(&g.id()).finish(),
        }
    }
}

impl Node {
    pub fn meta(&self) -> &NodeMeta {
        match self {
            Node::Component(c) => c.meta(),
            Node::Graph(g) => g.meta(),
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    pub fn spawn(&mut self, ctl: &RunContext) -> Result<(), NodeError> {
        match self {
            Node::Component(c) => c.spawn(ctl),
            Node::Graph(g) => g.spawn(ctl),
        }
    }

    pub fn stop(&self) {
        match self {
            Node::Component(c) => c.stop(),
            Node::Graph(g) => g.stop(),
        }
    }

    pub fn stopped(&self) -> Latch {
        match self {
            Node::Component(c) => c.stopped(),
            Node::Graph(g) => g.stopped(),
        }
    }

    pub fn terminate(&self) {
        match self {
            Node::Component(c) => c.terminate(),
            Node::Graph(g) => g.terminate(),
        }
    }

    pub fn link_stop(&mut self, parent: &CancellationToken) {
        match self {
            Node::Component(c) => c.link_stop(parent),
            Node::Graph(g) => g.link_stop(parent),
        }
    }

    pub fn apply_input_config(&mut self, pin: &str, config: &InputConfig) -> bool {
        match self {
            Node::Component(c) => c.apply_input_config(pin, config),
            // Graph boundary pins are plain queues; literal configs do not
            // apply to them.
            Node::Graph(_) => false,
        }
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        match self {
            Node::Component(c) => c.validate(),
            // A nested graph is a child like any other: its declared inputs
            // must be fed by the parent's wiring.
            Node::Graph(g) => {
                g.validate_boundary()?;
                g.validate()
            }
        }
    }

    /// Wire this node's input pin as a connection destination: hands back a
    /// queue sender and counts the new producer.
    fn connect_input(&mut self, pin: &str) -> Result<mpsc::Sender<Packet>, GraphError> {
        match self {
            Node::Component(c) => {
                let id = c.id().to_string();
                let port = c.input_mut(pin).ok_or_else(|| GraphError::UnknownPin {
                    instance: id,
                    pin: pin.to_string(),
                })?;
                port.inc_ref_count();
                Ok(port.sender())
            }
            Node::Graph(g) => {
                let id = g.id().to_string();
                let port = g.inputs.get_mut(pin).ok_or_else(|| GraphError::UnknownPin {
                    instance: id,
                    pin: pin.to_string(),
                })?;
                Ok(port.connect_upstream())
            }
        }
    }

    /// Wire this node's output pin as a connection source.
    fn connect_output(&mut self, pin: &str, consumer: mpsc::Sender<Packet>) -> Result<(), GraphError> {
        match self {
            Node::Component(c) => {
                let id = c.id().to_string();
                let port = c.output_mut(pin).ok_or_else(|| GraphError::UnknownPin {
                    instance: id,
                    pin: pin.to_string(),
                })?;
                port.connect(consumer);
                Ok(())
            }
            Node::Graph(g) => {
                let id = g.id().to_string();
                let port = g.outputs.get_mut(pin).ok_or_else(|| GraphError::UnknownPin {
                    instance: id,
                    pin: pin.to_string(),
                })?;
                port.connect_consumer(consumer);
                Ok(())
            }
        }
    }

    fn collect_processes(&self, out: &mut Vec<ProcessHandle>) {
        match self {
            Node::Component(c) => out.push(c.process_handle()),
            Node::Graph(g) => g.collect_processes(out),
        }
    }

    fn to_instance_decl(&self) -> InstanceDecl {
        let meta = self.meta();
        InstanceDecl {
            id: meta.id.clone(),
            node_id: Some(meta.node_type.clone()),
            display_name: if meta.display_name == meta.node_type {
                None
            } else {
                Some(meta.display_name.clone())
            },
            ..Default::default()
        }
    }
}

/// Boundary pin of a graph: an input to one side and an output to the
/// other. Items arriving on the receiving queue are re-emitted on the
/// emitting side by a pump task; when the receiving side drains (all
/// producers closed), the emitting side closes too.
#[derive(Debug)]
pub struct GraphPort {
    input: Option<InputPort>,
    output: Option<OutputPort>,
    sender: mpsc::Sender<Packet>,
    pin: String,
}

impl GraphPort {
    fn new(pin: &str, required: Requiredness, capacity: usize) -> Self {
        let spec = InputSpec::new(pin).required(required);
        let input = InputPort::new(&spec, capacity);
        let sender = input.sender();
        Self {
            input: Some(input),
            output: Some(OutputPort::new(&OutputSpec::new(pin))),
            sender,
            pin: pin.to_string(),
        }
    }

    /// Queue handle for the receiving side.
    pub fn sender(&self) -> mpsc::Sender<Packet> {
        self.sender.clone()
    }

    /// Receiving-side wiring: one new upstream producer.
    fn connect_upstream(&mut self) -> mpsc::Sender<Packet> {
        if let Some(input) = self.input.as_mut() {
            input.inc_ref_count();
        } else {
            tracing::error!(pin = %self.pin, "wiring a graph port after start is ignored");
        }
        self.sender.clone()
    }

    /// Emitting-side wiring: one new downstream consumer.
    fn connect_consumer(&mut self, consumer: mpsc::Sender<Packet>) {
        match self.output.as_mut() {
            Some(output) => output.connect(consumer),
            None => tracing::error!(pin = %self.pin, "wiring a graph port after start is ignored"),
        }
    }

    fn required(&self) -> Requiredness {
        self.input.as_ref().map(|i| i.required()).unwrap_or(Requiredness::Required)
    }

    fn is_connected(&self) -> bool {
        self.input.as_ref().map(|i| i.is_connected()).unwrap_or(true)
    }

    fn has_default(&self) -> bool {
        self.input.as_ref().and_then(|i| i.default_value()).is_some()
    }

    fn take_sides(&mut self) -> Option<(InputPort, OutputPort)> {
        Some((self.input.take()?, self.output.take()?))
    }
}

async fn pump(mut input: InputPort, mut output: OutputPort) {
    loop {
        match input.get().await {
            Packet::Item(value) => {
                let _ = output.send_packet(Packet::Item(value)).await;
            }
            Packet::Eos => {
                output.close().await;
                break;
            }
        }
    }
}

/// A composite node: owns child instances, wires their queues from the
/// connection list, launches one worker per leaf, and supervises
/// termination of the whole subtree.
#[derive(Debug)]
pub struct Graph {
    meta: NodeMeta,
    instances: HashMap<String, Node>,
    instance_order: Vec<String>,
    connections: Vec<Connection>,
    inputs: HashMap<String, GraphPort>,
    input_order: Vec<String>,
    outputs: HashMap<String, GraphPort>,
    output_order: Vec<String>,
    stop: CancellationToken,
    stopped: Latch,
    queue_capacity: usize,
    spawned: bool,
    decl: Option<GraphDecl>,
}

impl Graph {
    pub fn new(meta: NodeMeta) -> Self {
        Self::with_queue_capacity(meta, loomcore::DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(meta: NodeMeta, queue_capacity: usize) -> Self {
        Self {
            meta,
            instances: HashMap::new(),
            instance_order: Vec::new(),
            connections: Vec::new(),
            inputs: HashMap::new(),
            input_order: Vec::new(),
            outputs: HashMap::new(),
            output_order: Vec::new(),
            stop: CancellationToken::new(),
            stopped: Latch::new(),
            queue_capacity,
            spawned: false,
            decl: None,
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn link_stop(&mut self, parent: &CancellationToken) {
        let token = parent.child_token();
        for node in self.instances.values_mut() {
            node.link_stop(&token);
        }
        self.stop = token;
    }

    /// Add a child instance. Its stop token is re-rooted under this graph.
    pub fn add_instance(&mut self, mut node: Node) {
        node.link_stop(&self.stop);
        self.instance_order.push(node.id().to_string());
        self.instances.insert(node.id().to_string(), node);
    }

    pub fn instance(&self, id: &str) -> Option<&Node> {
        self.instances.get(id)
    }

    pub fn instance_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.instances.get_mut(id)
    }

    pub fn instance_ids(&self) -> &[String] {
        &self.instance_order
    }

    /// Declare an external input pin of this graph.
    pub fn add_input(&mut self, pin: &str, required: Requiredness) {
        self.input_order.push(pin.to_string());
        self.inputs.insert(pin.to_string(), GraphPort::new(pin, required, self.queue_capacity));
    }

    /// Declare an external output pin of this graph.
    pub fn add_output(&mut self, pin: &str) {
        self.output_order.push(pin.to_string());
        self.outputs
            .insert(pin.to_string(), GraphPort::new(pin, Requiredness::Required, self.queue_capacity));
    }

    /// External queue handle for an input pin. Pushing [`Packet::Eos`] here
    /// is how an outside driver ends the stream.
    pub fn input_sender(&self, pin: &str) -> Option<mpsc::Sender<Packet>> {
        self.inputs.get(pin).map(|p| p.sender())
    }

    /// Attach an external consumer to an output pin. Must happen before the
    /// graph starts.
    pub fn connect_output(&mut self, pin: &str, consumer: mpsc::Sender<Packet>) -> bool {
        match self.outputs.get_mut(pin) {
            Some(port) => {
                port.connect_consumer(consumer);
                true
            }
            None => false,
        }
    }

    fn is_self(&self, ins_id: &str) -> bool {
        ins_id == THIS_INS_ID || ins_id == self.meta.id
    }

    /// Wire one connection: bind the source output to the destination input
    /// queue and count the producer. Endpoints naming the graph itself splice
    /// through the matching graph port.
    pub fn connect(&mut self, connection: Connection) -> Result<(), GraphError> {
        let consumer = if self.is_self(&connection.to.ins_id) {
            let port = self
                .outputs
                .get_mut(&connection.to.pin_id)
                .ok_or_else(|| GraphError::UnknownPin {
                    instance: THIS_INS_ID.to_string(),
                    pin: connection.to.pin_id.clone(),
                })?;
            port.connect_upstream()
        } else {
            let node = self
                .instances
                .get_mut(&connection.to.ins_id)
                .ok_or_else(|| GraphError::UnknownInstance(connection.to.ins_id.clone()))?;
            node.connect_input(&connection.to.pin_id)?
        };

        if self.is_self(&connection.from.ins_id) {
            let port = self
                .inputs
                .get_mut(&connection.from.pin_id)
                .ok_or_else(|| GraphError::UnknownPin {
                    instance: THIS_INS_ID.to_string(),
                    pin: connection.from.pin_id.clone(),
                })?;
            port.connect_consumer(consumer);
        } else {
            let node = self
                .instances
                .get_mut(&connection.from.ins_id)
                .ok_or_else(|| GraphError::UnknownInstance(connection.from.ins_id.clone()))?;
            node.connect_output(&connection.from.pin_id, consumer)?;
        }

        self.connections.push(connection);
        Ok(())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Check every child's required inputs after wiring.
    pub fn validate(&self) -> Result<(), GraphError> {
        for id in &self.instance_order {
            self.instances[id].validate()?;
        }
        Ok(())
    }

    /// Check this graph's own required boundary inputs. Called by the parent
    /// once its wiring is in place; an unwired required pin would otherwise
    /// park the port's pump forever. The root graph is exempt — its pins are
    /// the flow's external interface, fed by whoever drives the flow.
    pub fn validate_boundary(&self) -> Result<(), GraphError> {
        for pin in &self.input_order {
            let port = &self.inputs[pin];
            if port.required() == Requiredness::Required
                && !port.is_connected()
                && !port.has_default()
            {
                return Err(GraphError::Validation {
                    instance: self.meta.id.clone(),
                    pin: pin.clone(),
                });
            }
        }
        Ok(())
    }

    /// Start every child worker and the graph-port pumps, then supervise:
    /// the graph's `stopped` is set once all children have stopped and the
    /// outer outputs have flushed their EOS.
    pub fn spawn(&mut self, ctl: &RunContext) -> Result<(), NodeError> {
        if self.spawned {
            return Err(NodeError::Configuration(format!("{}: already started", self.meta.id)));
        }
        self.spawned = true;

        let mut child_latches = Vec::with_capacity(self.instance_order.len());
        for id in &self.instance_order {
            if let Some(node) = self.instances.get_mut(id) {
                node.spawn(ctl)?;
                child_latches.push(node.stopped());
            }
        }

        let mut input_pumps = Vec::new();
        for pin in &self.input_order {
            if let Some((input, output)) = self.inputs.get_mut(pin).and_then(|p| p.take_sides()) {
                input_pumps.push(tokio::spawn(pump(input, output)));
            }
        }
        let mut output_pumps = Vec::new();
        for pin in &self.output_order {
            if let Some((input, output)) = self.outputs.get_mut(pin).and_then(|p| p.take_sides()) {
                output_pumps.push(tokio::spawn(pump(input, output)));
            }
        }

        let stopped = self.stopped.clone();
        let graph_id = self.meta.id.clone();
        tokio::spawn(async move {
            for latch in child_latches {
                latch.wait().await;
            }
            // Outer outputs must deliver their EOS before the graph is done;
            // outer inputs have nobody left to feed.
            join_all(output_pumps).await;
            for pump in input_pumps {
                pump.abort();
            }
            stopped.set();
            tracing::debug!(graph = %graph_id, "graph stopped");
        });
        Ok(())
    }

    /// Cooperative stop of the whole subtree.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn stopped(&self) -> Latch {
        self.stopped.clone()
    }

    /// Forceful variant: also wakes workers blocked on empty queues by
    /// injecting EOS everywhere.
    pub fn terminate(&self) {
        self.stop.cancel();
        for node in self.instances.values() {
            node.terminate();
        }
        for port in self.inputs.values().chain(self.outputs.values()) {
            let _ = port.sender().try_send(Packet::Eos);
        }
    }

    pub fn collect_processes(&self, out: &mut Vec<ProcessHandle>) {
        for id in &self.instance_order {
            self.instances[id].collect_processes(out);
        }
    }

    /// Remember the declaration this graph was built from so a save
    /// reproduces it field for field.
    pub fn set_decl(&mut self, decl: GraphDecl) {
        self.decl = Some(decl);
    }

    /// Serialize back to the declaration shape: the loaded declaration when
    /// there is one, otherwise a synthesis from the live structure.
    pub fn to_decl(&self) -> GraphDecl {
        if let Some(decl) = &self.decl {
            return decl.clone();
        }
        let pin_decl = |required: Requiredness| GraphPinDecl {
            mode: Some(required),
            ..Default::default()
        };
        GraphDecl {
            id: Some(self.meta.id.clone()),
            node_id: Some(self.meta.node_type.clone()),
            instances: self
                .instance_order
                .iter()
                .map(|id| self.instances[id].to_instance_decl())
                .collect(),
            connections: self.connections.clone(),
            inputs: self
                .input_order
                .iter()
                .map(|pin| (pin.clone(), pin_decl(self.inputs[pin].required())))
                .collect::<BTreeMap<_, _>>(),
            outputs: self
                .output_order
                .iter()
                .map(|pin| (pin.clone(), GraphPinDecl::default()))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }
}
