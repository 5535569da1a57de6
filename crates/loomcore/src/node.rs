use crate::{NodeError, OutputPort, PortError, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One-shot completion signal: unset until the owning worker finishes, set
/// exactly once, observable by any number of waiters.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    token: CancellationToken,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn set(&self) {
        self.token.cancel();
    }

    pub fn is_set(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

/// Identity shared by every node kind.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    pub id: String,
    pub node_type: String,
    pub display_name: String,
}

impl NodeMeta {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        let node_type = node_type.into();
        Self {
            id: id.into(),
            node_type: node_type.clone(),
            display_name: node_type,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        let name = display_name.into();
        if !name.is_empty() {
            self.display_name = name;
        }
        self
    }
}

/// Named argument map handed to a `process` invocation. Values are shared
/// references into the data plane; deep-copy only happens where the output
/// fan-out mode asks for it.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    values: HashMap<String, Arc<Value>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pin: impl Into<String>, value: Arc<Value>) {
        self.values.insert(pin.into(), value);
    }

    pub fn get(&self, pin: &str) -> Option<&Value> {
        self.values.get(pin).map(|v| v.as_ref())
    }

    pub fn get_arc(&self, pin: &str) -> Option<Arc<Value>> {
        self.values.get(pin).cloned()
    }

    pub fn require(&self, pin: &str) -> Result<&Value, NodeError> {
        self.get(pin).ok_or_else(|| NodeError::MissingInput(pin.to_string()))
    }

    pub fn contains(&self, pin: &str) -> bool {
        self.values.contains_key(pin)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a `process` invocation hands back to the worker.
///
/// `Map` entries are routed to the matching output pins; `Value` goes to the
/// node's single output; `Empty` sends nothing (the body may still have sent
/// through [`ProcessContext::send`]).
#[derive(Debug)]
pub enum ProcessOutput {
    Empty,
    Value(Value),
    Map(HashMap<String, Value>),
}

impl ProcessOutput {
    pub fn map() -> ProcessOutputMap {
        ProcessOutputMap(HashMap::new())
    }
}

/// Builder for `ProcessOutput::Map`.
pub struct ProcessOutputMap(HashMap<String, Value>);

impl ProcessOutputMap {
    pub fn with(mut self, pin: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(pin.into(), value.into());
        self
    }

    pub fn build(self) -> ProcessOutput {
        ProcessOutput::Map(self.0)
    }
}

impl From<Value> for ProcessOutput {
    fn from(value: Value) -> Self {
        ProcessOutput::Value(value)
    }
}

/// Worker-side surface a `process` body can reach: direct sends to its
/// output ports and a cooperative self-stop.
pub struct ProcessContext<'a> {
    node_id: &'a str,
    outputs: &'a mut HashMap<String, OutputPort>,
    stop: &'a CancellationToken,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        node_id: &'a str,
        outputs: &'a mut HashMap<String, OutputPort>,
        stop: &'a CancellationToken,
    ) -> Self {
        Self { node_id, outputs, stop }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Send a value on a named output pin. Delivery problems are logged and
    /// swallowed; they are not the body's concern.
    pub async fn send(&mut self, pin: &str, value: Value) {
        match self.outputs.get_mut(pin) {
            Some(output) => {
                if let Err(PortError::Closed(_)) = output.send(value).await {
                    tracing::warn!(node = %self.node_id, pin, "send on closed output");
                }
            }
            None => {
                tracing::warn!(node = %self.node_id, pin, "send to unknown output pin dropped");
            }
        }
    }

    /// Request this node to stop after the current iteration.
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

/// The body of a leaf component. The runtime invokes `process` from a single
/// worker; `shutdown` runs on the supervising task after the worker exits
/// and is the only place thread-hostile resources may be touched.
#[async_trait]
pub trait Process: Send {
    async fn process(
        &mut self,
        inputs: Inputs,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError>;

    async fn shutdown(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Shared handle to a process body, kept by the runtime so shutdown hooks can
/// run after the worker has finished with it.
pub type ProcessHandle = Arc<tokio::sync::Mutex<Box<dyn Process>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_one_shot() {
        let latch = Latch::new();
        assert!(!latch.is_set());
        latch.set();
        latch.set();
        assert!(latch.is_set());
    }

    #[tokio::test]
    async fn latch_wakes_waiters() {
        let latch = Latch::new();
        let waiter = latch.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        latch.set();
        handle.await.unwrap();
    }

    #[test]
    fn inputs_require() {
        let mut inputs = Inputs::new();
        inputs.insert("a", Arc::new(Value::Number(1.0)));
        assert_eq!(inputs.require("a").unwrap(), &Value::Number(1.0));
        assert!(matches!(inputs.require("b"), Err(NodeError::MissingInput(_))));
    }
}
