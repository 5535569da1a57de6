use async_trait::async_trait;
use loomcore::{
    FlowDecl, InputMode, InputSpec, Inputs, LoadError, NodeError, NodeMeta, OutputSpec, Packet,
    Process, ProcessContext, ProcessOutput, Value,
};
use loomruntime::{Component, Flow, NodeArgs, NodeFactory, NodeRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn flows_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("flows")
}

/// Registry with the built-in library plus the test components the fixture
/// flows import from `test_components`.
fn test_registry() -> Arc<NodeRegistry> {
    let mut registry = loomnodes::builtin_registry();
    registry.register(Arc::new(EchoFactory));
    registry.register(Arc::new(RepeatWordFactory));
    Arc::new(registry)
}

struct Echo;

#[async_trait]
impl Process for Echo {
    async fn process(
        &mut self,
        inputs: Inputs,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        Ok(ProcessOutput::map().with("out", inputs.require("inp")?.clone()).build())
    }
}

struct EchoFactory;

impl NodeFactory for EchoFactory {
    fn node_type(&self) -> &str {
        "Echo"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        Ok(Component::new(
            NodeMeta::new(args.id.clone(), self.node_type()),
            vec![InputSpec::new("inp")],
            vec![OutputSpec::new("out")],
            Box::new(Echo),
            args.queue_capacity,
        ))
    }
}

struct RepeatWord;

#[async_trait]
impl Process for RepeatWord {
    async fn process(
        &mut self,
        inputs: Inputs,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        let word = inputs.require("word")?.as_str().unwrap_or_default().to_string();
        let times = inputs.get("times").and_then(Value::as_f64).unwrap_or(1.0) as usize;
        Ok(ProcessOutput::map().with("out", word.repeat(times)).build())
    }
}

struct RepeatWordFactory;

impl NodeFactory for RepeatWordFactory {
    fn node_type(&self) -> &str {
        "RepeatWord"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        Ok(Component::new(
            NodeMeta::new(args.id.clone(), self.node_type()),
            vec![
                InputSpec::new("word"),
                InputSpec::new("times").mode(InputMode::Sticky),
            ],
            vec![OutputSpec::new("out")],
            Box::new(RepeatWord),
            args.queue_capacity,
        ))
    }
}

async fn wait_stopped(flow: &Flow) {
    tokio::time::timeout(Duration::from_secs(5), flow.stopped().wait())
        .await
        .expect("flow did not stop in time");
}

#[tokio::test]
async fn isolated_flow_runs_to_completion() {
    let mut flow = Flow::from_file(flows_dir().join("hello.yaml"), test_registry()).unwrap();
    flow.run().unwrap();
    wait_stopped(&flow).await;
    assert!(flow.stopped().is_set());
    assert!(!flow.has_failed());
}

#[tokio::test]
async fn run_sync_finishes_and_reports_success() {
    let mut flow = Flow::from_file(flows_dir().join("hello.yaml"), test_registry()).unwrap();
    flow.run_sync().await.unwrap();
    assert!(flow.stopped().is_set());
}

#[tokio::test]
async fn in_out_flow_round_trips_messages() {
    let mut flow = Flow::from_file(flows_dir().join("inout.yaml"), test_registry()).unwrap();

    let feed = flow.node().input_sender("inMsg").unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    assert!(flow.node_mut().connect_output("outMsg", tx));

    flow.run().unwrap();

    for msg in ["Hello", "World"] {
        feed.send(Packet::item(Value::String(msg.into()))).await.unwrap();
        let out = rx.recv().await.unwrap().into_item().unwrap();
        assert_eq!(*out, Value::String(msg.into()));
    }
    feed.send(Packet::Eos).await.unwrap();
    assert!(rx.recv().await.unwrap().is_eos());

    wait_stopped(&flow).await;
    assert!(flow.stopped().is_set());
}

#[tokio::test]
async fn nested_flow_repeats_words() {
    let mut flow = Flow::from_file(flows_dir().join("nested.yaml"), test_registry()).unwrap();

    let inp = flow.node().input_sender("inp").unwrap();
    let n = flow.node().input_sender("n").unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    flow.node_mut().connect_output("out", tx);

    flow.run().unwrap();

    let rounds = [("Hello", Some(1.0), "Hello"), ("World", Some(2.0), "WorldWorld"), ("!", None, "!!")];
    for (word, times, expected) in rounds {
        // The sticky update must land before the word wakes the worker.
        if let Some(times) = times {
            n.send(Packet::item(Value::Number(times))).await.unwrap();
        }
        inp.send(Packet::item(Value::String(word.into()))).await.unwrap();
        let out = rx.recv().await.unwrap().into_item().unwrap();
        assert_eq!(*out, Value::String(expected.into()));
    }

    inp.send(Packet::Eos).await.unwrap();
    n.send(Packet::Eos).await.unwrap();
    assert!(rx.recv().await.unwrap().is_eos());
    wait_stopped(&flow).await;
}

#[tokio::test]
async fn round_trip_preserves_declaration() {
    let path = flows_dir().join("hello.yaml");
    let original = FlowDecl::from_yaml_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let flow = Flow::from_file(&path, test_registry()).unwrap();

    let saved = serde_yaml::to_value(flow.to_decl()).unwrap();
    let parsed = serde_yaml::to_value(&original).unwrap();
    assert_eq!(saved, parsed);

    // Save/load/save is a fixed point.
    let dir = flows_dir();
    let yaml = flow.to_yaml().unwrap();
    let reloaded = Flow::from_yaml(&yaml, test_registry(), Some(dir.as_path())).unwrap();
    assert_eq!(reloaded.to_yaml().unwrap(), yaml);
}

#[tokio::test]
async fn round_trip_keeps_editor_metadata() {
    let flow = Flow::from_file(flows_dir().join("hello.yaml"), test_registry()).unwrap();
    let decl = flow.to_decl();
    let printer = decl.node.instances.iter().find(|i| i.id == "printer").unwrap();
    let pos = printer.extra.get("pos").unwrap();
    assert_eq!(pos.get("y").and_then(|v| v.as_f64()), Some(80.5));
}

#[tokio::test]
async fn unknown_node_is_a_load_error() {
    let yaml = r#"
node:
  id: Broken
  instances:
    - id: mystery
      nodeId: DoesNotExist
"#;
    let err = Flow::from_yaml(yaml, test_registry(), None).unwrap_err();
    assert!(matches!(err, LoadError::UnresolvedImport { .. }), "got {:?}", err);
}

#[tokio::test]
async fn imported_but_unregistered_node_is_a_load_error() {
    let yaml = r#"
imports:
  "@loom/nodes":
    - Phantom
node:
  id: Broken
  instances:
    - id: ghost
      nodeId: Phantom
"#;
    let err = Flow::from_yaml(yaml, test_registry(), None).unwrap_err();
    assert!(matches!(err, LoadError::UnknownNode(_)), "got {:?}", err);
}

#[tokio::test]
async fn cyclic_imports_are_rejected() {
    let err = Flow::from_file(flows_dir().join("cycle_a.yaml"), test_registry()).unwrap_err();
    assert!(matches!(err, LoadError::CyclicImport(_)), "got {:?}", err);
}

#[tokio::test]
async fn missing_required_input_fails_validation() {
    let yaml = r#"
imports:
  test_components:
    - Echo
node:
  id: Dangling
  instances:
    - id: echo
      nodeId: Echo
"#;
    let err = Flow::from_yaml(yaml, test_registry(), None).unwrap_err();
    assert!(matches!(err, LoadError::Graph(_)), "got {:?}", err);
}

#[tokio::test]
async fn unwired_nested_graph_input_fails_validation() {
    // The nested Repeat graph declares a required `n` input the parent
    // never wires.
    let yaml = r#"
imports:
  repeat.yaml:
    - Repeat
node:
  id: Careless
  inputs:
    inp:
      mode: required
  outputs:
    out: {}
  instances:
    - id: repeat
      nodeId: Repeat
  connections:
    - from: {insId: Careless, pinId: inp}
      to: {insId: repeat, pinId: inp}
    - from: {insId: repeat, pinId: out}
      to: {insId: Careless, pinId: out}
"#;
    let dir = flows_dir();
    let err = Flow::from_yaml(yaml, test_registry(), Some(dir.as_path())).unwrap_err();
    assert!(matches!(err, LoadError::Graph(_)), "got {:?}", err);
}

#[tokio::test]
async fn missing_macro_value_is_a_load_error() {
    let yaml = r#"
node:
  id: Broken
  instances:
    - id: iv
      macroId: InlineValue
"#;
    let err = Flow::from_yaml(yaml, test_registry(), None).unwrap_err();
    assert!(matches!(err, LoadError::MissingMacroField { .. }), "got {:?}", err);
}

#[tokio::test]
async fn stop_is_idempotent_across_the_flow() {
    let mut flow = Flow::from_file(flows_dir().join("inout.yaml"), test_registry()).unwrap();
    let feed = flow.node().input_sender("inMsg").unwrap();
    flow.run().unwrap();
    flow.stop();
    flow.stop();
    // Unblock the echo worker so it can observe the stop.
    feed.send(Packet::Eos).await.unwrap();
    wait_stopped(&flow).await;
    assert!(flow.stopped().is_set());
}
