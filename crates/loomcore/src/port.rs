use crate::value::{value_to_yaml, yaml_to_value};
use crate::{Packet, PortError, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default bound for port queues. A full queue suspends the producer, which
/// is what keeps a fast source from outrunning its consumers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// How an input consumes data.
///
/// QUEUE takes one item per pull and blocks while empty. STICKY returns the
/// most recently received item (or its configured default) without blocking
/// once primed. STATIC always returns the configured value and ignores the
/// queue entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Queue,
    Sticky,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requiredness {
    #[serde(rename = "required")]
    Required,
    #[serde(rename = "optional")]
    Optional,
    #[serde(rename = "required-if-connected")]
    RequiredIfConnected,
}

/// Fan-out policy of an output connected to multiple consumers.
///
/// REF hands every consumer the same object. VALUE hands each extra consumer
/// its own deep copy. CIRCLE delivers to one consumer at a time, round-robin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Ref,
    Value,
    Circle,
}

/// Pin-level override carried by an instance declaration (`inputConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Dynamic,
    String,
    Number,
    Boolean,
    Json,
}

/// A literal-or-dynamic input configuration: `dynamic` leaves the pin on its
/// queue, any literal kind turns the pin sticky and primes it with the value.
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub kind: InputType,
    pub value: Option<Value>,
}

impl InputConfig {
    pub fn dynamic() -> Self {
        Self { kind: InputType::Dynamic, value: None }
    }

    pub fn literal(kind: InputType, value: Value) -> Self {
        Self { kind, value: Some(value) }
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == InputType::Dynamic
    }

    /// Read an input config out of an already-parsed config value
    /// (`{type: ..., value: ...}`), as macro nodes receive it.
    pub fn from_value(value: &Value) -> Option<Self> {
        let kind = match value.index("type")? {
            Value::String(s) => match s.as_str() {
                "dynamic" => InputType::Dynamic,
                "string" => InputType::String,
                "number" => InputType::Number,
                "boolean" => InputType::Boolean,
                "json" => InputType::Json,
                _ => return None,
            },
            _ => return None,
        };
        Some(Self { kind, value: value.index("value") })
    }
}

#[derive(Serialize, Deserialize)]
struct InputConfigRepr {
    #[serde(rename = "type")]
    kind: InputType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_yaml::Value>,
}

impl Serialize for InputConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        InputConfigRepr {
            kind: self.kind,
            value: self.value.as_ref().map(value_to_yaml),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InputConfig {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = InputConfigRepr::deserialize(deserializer)?;
        Ok(Self { kind: repr.kind, value: repr.value.map(yaml_to_value) })
    }
}

/// Declarative template for an input pin. Factories declare these; each
/// instance gets its own live [`InputPort`] built from the template.
#[derive(Debug, Clone)]
pub struct InputSpec {
    pub id: String,
    pub description: String,
    pub mode: InputMode,
    pub required: Requiredness,
    pub value: Option<Value>,
}

impl InputSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            mode: InputMode::Queue,
            required: Requiredness::Required,
            value: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mode(mut self, mode: InputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn required(mut self, required: Requiredness) -> Self {
        self.required = required;
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Declarative template for an output pin.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub id: String,
    pub description: String,
    pub mode: OutputMode,
    pub delayed: bool,
}

impl OutputSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            mode: OutputMode::Ref,
            delayed: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Consumer endpoint of a node. Owns its queue; upstream outputs hold
/// senders obtained from [`InputPort::sender`] at wiring time.
#[derive(Debug)]
pub struct InputPort {
    id: String,
    mode: InputMode,
    required: Requiredness,
    default: Option<Arc<Value>>,
    last: Option<Arc<Value>>,
    ref_count: usize,
    tx: mpsc::Sender<Packet>,
    rx: mpsc::Receiver<Packet>,
}

impl InputPort {
    pub fn new(spec: &InputSpec, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            id: spec.id.clone(),
            mode: spec.mode,
            required: spec.required,
            default: spec.value.clone().map(Arc::new),
            last: None,
            ref_count: 0,
            tx,
            rx,
        }
    }

    pub fn from_spec(spec: &InputSpec) -> Self {
        Self::new(spec, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn required(&self) -> Requiredness {
        self.required
    }

    pub fn default_value(&self) -> Option<&Arc<Value>> {
        self.default.as_ref()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    pub fn set_default(&mut self, value: Value) {
        self.default = Some(Arc::new(value));
    }

    /// A handle upstream outputs push into. Wiring code pairs every handed-out
    /// sender with an [`InputPort::inc_ref_count`] call.
    pub fn sender(&self) -> mpsc::Sender<Packet> {
        self.tx.clone()
    }

    pub fn inc_ref_count(&mut self) {
        self.ref_count += 1;
    }

    pub fn dec_ref_count(&mut self) {
        self.ref_count = self.ref_count.saturating_sub(1);
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Whether any upstream producer was wired to this port.
    pub fn is_connected(&self) -> bool {
        self.ref_count > 0
    }

    /// Apply a declaration-level `inputConfig` entry.
    pub fn apply_config(&mut self, config: &InputConfig) {
        if config.is_dynamic() {
            self.mode = InputMode::Queue;
            if let Some(value) = &config.value {
                self.default = Some(Arc::new(value.clone()));
            }
        } else {
            self.mode = InputMode::Sticky;
            self.default = Some(Arc::new(config.value.clone().unwrap_or(Value::Null)));
        }
    }

    /// Pull one value according to the input mode.
    ///
    /// QUEUE surfaces EOS only after every live producer has closed: each EOS
    /// packet decrements the producer count and the pull retries while
    /// producers remain. STICKY consumes at most one queued packet per call,
    /// ignores EOS, and yields the latched value (or the default, or null
    /// before priming). STATIC never touches the queue.
    pub async fn get(&mut self) -> Packet {
        match self.mode {
            InputMode::Static => Packet::Item(self.static_value()),
            InputMode::Queue => loop {
                match self.rx.recv().await {
                    Some(Packet::Item(value)) => return Packet::Item(value),
                    Some(Packet::Eos) => {
                        self.ref_count = self.ref_count.saturating_sub(1);
                        if self.ref_count == 0 {
                            return Packet::Eos;
                        }
                    }
                    // All senders dropped: equivalent to end of stream.
                    None => return Packet::Eos,
                }
            },
            InputMode::Sticky => {
                if !self.rx.is_empty() || (self.last.is_none() && self.default.is_none()) {
                    match self.rx.recv().await {
                        Some(Packet::Item(value)) => self.last = Some(value),
                        Some(Packet::Eos) | None => {}
                    }
                }
                Packet::Item(self.sticky_value())
            }
        }
    }

    /// Non-blocking variant used for OPTIONAL pins: yields a buffered item if
    /// one is ready, the configured default otherwise, `None` when there is
    /// nothing to contribute.
    pub fn try_get(&mut self) -> Option<Packet> {
        match self.mode {
            InputMode::Static => Some(Packet::Item(self.static_value())),
            InputMode::Sticky => {
                if let Ok(Packet::Item(value)) = self.rx.try_recv() {
                    self.last = Some(value);
                }
                if self.last.is_none() && self.default.is_none() {
                    return None;
                }
                Some(Packet::Item(self.sticky_value()))
            }
            InputMode::Queue => loop {
                match self.rx.try_recv() {
                    Ok(Packet::Item(value)) => return Some(Packet::Item(value)),
                    Ok(Packet::Eos) => {
                        self.ref_count = self.ref_count.saturating_sub(1);
                        if self.ref_count == 0 {
                            return Some(Packet::Eos);
                        }
                    }
                    Err(_) => {
                        return self.default.clone().map(Packet::Item);
                    }
                }
            },
        }
    }

    pub fn empty(&self) -> bool {
        match self.mode {
            InputMode::Queue => self.rx.is_empty(),
            _ => self.last.is_none() && self.default.is_none(),
        }
    }

    pub fn count(&self) -> usize {
        match self.mode {
            InputMode::Queue => self.rx.len(),
            _ => usize::from(!self.empty()),
        }
    }

    fn static_value(&self) -> Arc<Value> {
        self.default.clone().unwrap_or_else(|| Arc::new(Value::Null))
    }

    fn sticky_value(&self) -> Arc<Value> {
        self.last
            .clone()
            .or_else(|| self.default.clone())
            .unwrap_or_else(|| Arc::new(Value::Null))
    }
}

/// Producer endpoint of a node. Holds non-owning senders into consumer
/// queues and dispatches each send according to the fan-out mode.
#[derive(Debug)]
pub struct OutputPort {
    id: String,
    mode: OutputMode,
    delayed: bool,
    consumers: Vec<mpsc::Sender<Packet>>,
    circle_index: usize,
    closed: bool,
}

impl OutputPort {
    pub fn new(spec: &OutputSpec) -> Self {
        Self {
            id: spec.id.clone(),
            mode: spec.mode,
            delayed: spec.delayed,
            consumers: Vec::new(),
            circle_index: 0,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn is_delayed(&self) -> bool {
        self.delayed
    }

    pub fn is_connected(&self) -> bool {
        !self.consumers.is_empty()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Bind a consumer queue. May be called multiple times; must precede the
    /// first `send` for the consumer to observe the full stream.
    pub fn connect(&mut self, consumer: mpsc::Sender<Packet>) {
        self.consumers.push(consumer);
    }

    pub async fn send(&mut self, value: Value) -> Result<(), PortError> {
        self.send_packet(Packet::item(value)).await
    }

    pub async fn send_packet(&mut self, packet: Packet) -> Result<(), PortError> {
        if self.closed {
            tracing::warn!(output = %self.id, "send on closed output dropped");
            return Err(PortError::Closed(self.id.clone()));
        }
        if self.consumers.is_empty() {
            // Nothing downstream; drop silently.
            return Ok(());
        }
        let value = match packet {
            Packet::Item(value) => value,
            Packet::Eos => {
                // EOS always broadcasts, whatever the fan-out mode.
                for i in 0..self.consumers.len() {
                    self.push(i, Packet::Eos).await;
                }
                return Ok(());
            }
        };
        if self.consumers.len() == 1 {
            self.push(0, Packet::Item(value)).await;
            return Ok(());
        }
        match self.mode {
            OutputMode::Circle => {
                let index = self.circle_index;
                self.circle_index = (self.circle_index + 1) % self.consumers.len();
                self.push(index, Packet::Item(value)).await;
            }
            OutputMode::Ref => {
                for i in 0..self.consumers.len() {
                    self.push(i, Packet::Item(Arc::clone(&value))).await;
                }
            }
            OutputMode::Value => {
                // The first consumer gets the original, the rest deep copies.
                for i in 1..self.consumers.len() {
                    let copy = Arc::new((*value).clone());
                    self.push(i, Packet::Item(copy)).await;
                }
                self.push(0, Packet::Item(value)).await;
            }
        }
        Ok(())
    }

    /// Announce end of stream to every consumer. Idempotent; only the first
    /// call emits EOS.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for consumer in &self.consumers {
            let _ = consumer.send(Packet::Eos).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn push(&self, index: usize, packet: Packet) {
        if self.consumers[index].send(packet).await.is_err() {
            tracing::warn!(output = %self.id, consumer = index, "consumer queue dropped, delivery skipped");
        }
    }
}
