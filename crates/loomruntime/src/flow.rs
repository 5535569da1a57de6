use crate::{Graph, Loader, NodeRegistry};
use loomcore::{FlowDecl, FlowError, Latch, LoadError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What to do when a worker's `process` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log, end the failing worker with EOS downstream, keep siblings
    /// running while the network drains.
    Continue,
    /// Additionally request a cooperative stop of the whole flow.
    StopFlow,
}

/// Process-level runtime settings.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Bound of every port queue; a full queue backpressures its producer.
    pub queue_capacity: usize,
    pub on_error: ErrorPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: loomcore::DEFAULT_QUEUE_CAPACITY,
            on_error: ErrorPolicy::Continue,
        }
    }
}

/// Shared state handed to every worker at spawn time: the failure flag and
/// the root stop token the error policy may cancel.
#[derive(Debug, Clone)]
pub struct RunContext {
    errored: Arc<AtomicBool>,
    policy: ErrorPolicy,
    root: CancellationToken,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(ErrorPolicy::Continue, CancellationToken::new())
    }
}

impl RunContext {
    pub fn new(policy: ErrorPolicy, root: CancellationToken) -> Self {
        Self {
            errored: Arc::new(AtomicBool::new(false)),
            policy,
            root,
        }
    }

    pub fn record_failure(&self, node_id: &str) {
        self.errored.store(true, Ordering::SeqCst);
        if self.policy == ErrorPolicy::StopFlow {
            tracing::warn!(node = %node_id, "stopping flow after worker failure");
            self.root.cancel();
        }
    }

    pub fn has_failed(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }
}

/// Root container of a runnable network: the top-level graph plus the
/// import table and source path it was loaded from.
#[derive(Debug)]
pub struct Flow {
    imports: BTreeMap<String, Vec<String>>,
    source_path: Option<PathBuf>,
    node: Graph,
    config: RuntimeConfig,
    ctl: Option<RunContext>,
}

impl Flow {
    /// Load a flow from a YAML file. Relative component imports resolve
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>, registry: Arc<NodeRegistry>) -> Result<Self, LoadError> {
        Self::from_file_with_config(path, registry, RuntimeConfig::default())
    }

    pub fn from_file_with_config(
        path: impl AsRef<Path>,
        registry: Arc<NodeRegistry>,
        config: RuntimeConfig,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut loader = Loader::new(registry, config.queue_capacity, base_dir);
        let (decl, node) = loader.load_file(path)?;
        Ok(Self {
            imports: decl.imports,
            source_path: Some(path.to_path_buf()),
            node,
            config,
            ctl: None,
        })
    }

    /// Load a flow from YAML text. `base_dir` anchors nested flow imports.
    pub fn from_yaml(
        text: &str,
        registry: Arc<NodeRegistry>,
        base_dir: Option<&Path>,
    ) -> Result<Self, LoadError> {
        Self::from_yaml_with_config(text, registry, base_dir, RuntimeConfig::default())
    }

    pub fn from_yaml_with_config(
        text: &str,
        registry: Arc<NodeRegistry>,
        base_dir: Option<&Path>,
        config: RuntimeConfig,
    ) -> Result<Self, LoadError> {
        let decl = FlowDecl::from_yaml_str(text)?;
        let base_dir = base_dir.map(Path::to_path_buf).unwrap_or_default();
        let mut loader = Loader::new(registry, config.queue_capacity, base_dir);
        let node = loader.build_graph(&decl.node, &decl.imports, None)?;
        Ok(Self {
            imports: decl.imports,
            source_path: None,
            node,
            config,
            ctl: None,
        })
    }

    pub fn node(&self) -> &Graph {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut Graph {
        &mut self.node
    }

    pub fn imports(&self) -> &BTreeMap<String, Vec<String>> {
        &self.imports
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Start the network and return immediately. The flow's `stopped` latch
    /// is set when the root graph finishes.
    pub fn run(&mut self) -> Result<(), FlowError> {
        if self.ctl.is_some() {
            return Err(FlowError::Execution("flow already started".to_string()));
        }
        let ctl = RunContext::new(self.config.on_error, self.node.stop_token());
        self.node.spawn(&ctl)?;
        self.ctl = Some(ctl);
        Ok(())
    }

    /// One-shot latch set when the root graph has fully stopped.
    pub fn stopped(&self) -> Latch {
        self.node.stopped()
    }

    /// Run the network to completion: start it, block until every worker has
    /// stopped, then fire shutdown hooks. Fails if any worker failed.
    pub async fn run_sync(&mut self) -> Result<(), FlowError> {
        self.run()?;
        self.stopped().wait().await;
        self.shutdown().await;
        match &self.ctl {
            Some(ctl) if ctl.has_failed() => {
                Err(FlowError::Execution("a worker failed; see log for details".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Invoke every node's shutdown hook from this (supervising) task.
    pub async fn shutdown(&mut self) {
        let mut handles = Vec::new();
        self.node.collect_processes(&mut handles);
        for handle in handles {
            if let Err(err) = handle.lock().await.shutdown().await {
                tracing::warn!(error = %err, "shutdown hook failed");
            }
        }
    }

    /// Cooperative stop of the whole network.
    pub fn stop(&self) {
        self.node.stop();
    }

    /// Forceful stop that also unblocks workers waiting on empty queues.
    pub fn terminate(&self) {
        self.node.terminate();
    }

    pub fn has_failed(&self) -> bool {
        self.ctl.as_ref().map(RunContext::has_failed).unwrap_or(false)
    }

    /// Serialize the live flow back to its declaration shape.
    pub fn to_decl(&self) -> FlowDecl {
        FlowDecl {
            imports: self.imports.clone(),
            node: self.node.to_decl(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, FlowError> {
        self.to_decl()
            .to_yaml_string()
            .map_err(|e| FlowError::Load(LoadError::Malformed(e)))
    }
}
