use crate::RunContext;
use loomcore::{
    InputConfig, InputMode, InputPort, InputSpec, Inputs, Latch, NodeError, NodeMeta, OutputPort,
    OutputSpec, Packet, Process, ProcessContext, ProcessHandle, ProcessOutput, Requiredness,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A leaf node: declared ports around a user `process` body, executed by one
/// worker that pulls required inputs, invokes the body, and forwards results
/// until end-of-stream or a stop request.
pub struct Component {
    meta: NodeMeta,
    input_order: Vec<String>,
    inputs: Option<HashMap<String, InputPort>>,
    outputs: Option<HashMap<String, OutputPort>>,
    input_senders: HashMap<String, mpsc::Sender<Packet>>,
    process: ProcessHandle,
    stop: CancellationToken,
    stopped: Latch,
}

impl Component {
    pub fn new(
        meta: NodeMeta,
        input_specs: Vec<InputSpec>,
        output_specs: Vec<OutputSpec>,
        process: Box<dyn Process>,
        queue_capacity: usize,
    ) -> Self {
        let mut input_order = Vec::with_capacity(input_specs.len());
        let mut inputs = HashMap::with_capacity(input_specs.len());
        let mut input_senders = HashMap::with_capacity(input_specs.len());
        for spec in &input_specs {
            let port = InputPort::new(spec, queue_capacity);
            input_order.push(spec.id.clone());
            input_senders.insert(spec.id.clone(), port.sender());
            inputs.insert(spec.id.clone(), port);
        }
        let outputs = output_specs
            .iter()
            .map(|spec| (spec.id.clone(), OutputPort::new(spec)))
            .collect();
        Self {
            meta,
            input_order,
            inputs: Some(inputs),
            outputs: Some(outputs),
            input_senders,
            process: ProcessHandle::new(tokio::sync::Mutex::new(process)),
            stop: CancellationToken::new(),
            stopped: Latch::new(),
        }
    }

    pub fn meta(&self) -> &NodeMeta {
        &self.meta
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn input_order(&self) -> &[String] {
        &self.input_order
    }

    /// Live input port; `None` for unknown pins or after the worker started.
    pub fn input_mut(&mut self, pin: &str) -> Option<&mut InputPort> {
        self.inputs.as_mut()?.get_mut(pin)
    }

    pub fn input(&self, pin: &str) -> Option<&InputPort> {
        self.inputs.as_ref()?.get(pin)
    }

    pub fn output_mut(&mut self, pin: &str) -> Option<&mut OutputPort> {
        self.outputs.as_mut()?.get_mut(pin)
    }

    /// Queue handle for a pin, usable even while the worker runs.
    pub fn input_sender(&self, pin: &str) -> Option<mpsc::Sender<Packet>> {
        self.input_senders.get(pin).cloned()
    }

    /// Apply a declaration-level input config entry. Returns false for an
    /// unknown pin.
    pub fn apply_input_config(&mut self, pin: &str, config: &InputConfig) -> bool {
        match self.input_mut(pin) {
            Some(port) => {
                port.apply_config(config);
                true
            }
            None => false,
        }
    }

    /// Re-root the stop token under a parent graph so stopping the graph
    /// cascades here.
    pub fn link_stop(&mut self, parent: &CancellationToken) {
        self.stop = parent.child_token();
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Request a cooperative stop, observed at the next iteration boundary.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn stopped(&self) -> Latch {
        self.stopped.clone()
    }

    pub fn process_handle(&self) -> ProcessHandle {
        ProcessHandle::clone(&self.process)
    }

    /// Forceful unblocking: inject EOS into every input queue so a worker
    /// waiting in `get()` wakes up and winds down.
    pub fn terminate(&self) {
        self.stop.cancel();
        for sender in self.input_senders.values() {
            let _ = sender.try_send(Packet::Eos);
        }
    }

    /// Check that every required input is either wired or has a default.
    pub fn validate(&self) -> Result<(), loomcore::GraphError> {
        if let Some(inputs) = &self.inputs {
            for pin in &self.input_order {
                let port = &inputs[pin];
                if port.required() == Requiredness::Required
                    && !port.is_connected()
                    && port.default_value().is_none()
                {
                    return Err(loomcore::GraphError::Validation {
                        instance: self.meta.id.clone(),
                        pin: pin.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Start the worker. Consumes the ports; a second call is an error.
    pub fn spawn(&mut self, ctl: &RunContext) -> Result<(), NodeError> {
        let inputs = self
            .inputs
            .take()
            .ok_or_else(|| NodeError::Configuration(format!("{}: already started", self.meta.id)))?;
        let outputs = self
            .outputs
            .take()
            .ok_or_else(|| NodeError::Configuration(format!("{}: already started", self.meta.id)))?;
        let worker = Worker {
            meta: self.meta.clone(),
            input_order: self.input_order.clone(),
            inputs,
            outputs,
            process: ProcessHandle::clone(&self.process),
            stop: self.stop.clone(),
            stopped: self.stopped.clone(),
            ctl: ctl.clone(),
        };
        tokio::spawn(worker.run());
        Ok(())
    }
}

struct Worker {
    meta: NodeMeta,
    input_order: Vec<String>,
    inputs: HashMap<String, InputPort>,
    outputs: HashMap<String, OutputPort>,
    process: ProcessHandle,
    stop: CancellationToken,
    stopped: Latch,
    ctl: RunContext,
}

impl Worker {
    async fn run(mut self) {
        tracing::debug!(node = %self.meta.id, "worker started");
        'pull: loop {
            let mut args = Inputs::new();
            // Pull queue-mode pins in declaration order. EOS on any of them
            // ends the worker.
            for pin in &self.input_order {
                let port = match self.inputs.get_mut(pin) {
                    Some(port) if port.mode() == InputMode::Queue => port,
                    _ => continue,
                };
                match port.required() {
                    Requiredness::Required => match port.get().await {
                        Packet::Item(value) => args.insert(pin.clone(), value),
                        Packet::Eos => break 'pull,
                    },
                    Requiredness::RequiredIfConnected => {
                        if port.is_connected() {
                            match port.get().await {
                                Packet::Item(value) => args.insert(pin.clone(), value),
                                Packet::Eos => break 'pull,
                            }
                        }
                    }
                    Requiredness::Optional => {
                        if let Some(Packet::Item(value)) = port.try_get() {
                            args.insert(pin.clone(), value);
                        }
                    }
                }
            }
            // Sample sticky and static pins without joining the pull set.
            // An unprimed sticky pin with no default contributes nothing
            // rather than parking the worker.
            for pin in &self.input_order {
                let port = match self.inputs.get_mut(pin) {
                    Some(port) if port.mode() != InputMode::Queue => port,
                    _ => continue,
                };
                if let Some(Packet::Item(value)) = port.try_get() {
                    args.insert(pin.clone(), value);
                }
            }

            let result = {
                let mut process = self.process.lock().await;
                let mut ctx = ProcessContext::new(&self.meta.id, &mut self.outputs, &self.stop);
                process.process(args, &mut ctx).await
            };
            match result {
                Ok(output) => self.forward(output).await,
                Err(err) => {
                    tracing::error!(node = %self.meta.id, error = %err, "process failed");
                    self.ctl.record_failure(&self.meta.id);
                    break 'pull;
                }
            }

            if self.stop.is_cancelled() {
                break 'pull;
            }
        }
        for output in self.outputs.values_mut() {
            output.close().await;
        }
        self.stopped.set();
        tracing::debug!(node = %self.meta.id, "worker stopped");
    }

    async fn forward(&mut self, output: ProcessOutput) {
        match output {
            ProcessOutput::Empty => {}
            ProcessOutput::Value(value) => {
                if self.outputs.len() == 1 {
                    if let Some(port) = self.outputs.values_mut().next() {
                        let _ = port.send(value).await;
                    }
                } else {
                    tracing::warn!(
                        node = %self.meta.id,
                        outputs = self.outputs.len(),
                        "single-value result requires exactly one output, dropped"
                    );
                }
            }
            ProcessOutput::Map(map) => {
                for (pin, value) in map {
                    match self.outputs.get_mut(&pin) {
                        Some(port) => {
                            let _ = port.send(value).await;
                        }
                        None => {
                            tracing::warn!(node = %self.meta.id, pin = %pin, "result for unknown output pin dropped");
                        }
                    }
                }
            }
        }
    }
}
