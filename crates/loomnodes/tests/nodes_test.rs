use loomcore::{Packet, Value};
use loomnodes::{
    ConditionalFactory, GetAttributeFactory, InlineValueFactory, JsonParseFactory,
    SUPPORTED_MACROS,
};
use loomruntime::{Component, NodeArgs, NodeFactory, RunContext};

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

fn object(entries: &[(&str, Value)]) -> Value {
    Value::Mapping(
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>(),
    )
}

fn input_config(kind: &str, value: Option<Value>) -> Value {
    let mut entries = vec![("type", Value::String(kind.into()))];
    if let Some(value) = value {
        entries.push(("value", value));
    }
    object(&entries)
}

async fn collect(mut rx: mpsc::Receiver<Packet>) -> Vec<Value> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Packet::Item(value))) => seen.push((*value).clone()),
            Ok(Some(Packet::Eos)) | Ok(None) => break,
            Err(_) => panic!("timed out waiting for output"),
        }
    }
    seen
}

async fn wait_stopped(component: &Component) {
    tokio::time::timeout(Duration::from_secs(5), component.stopped().wait())
        .await
        .expect("component did not stop in time");
}

#[tokio::test]
async fn inline_value_emits_once_and_stops() {
    let factory = InlineValueFactory;
    let mut node = factory
        .create(
            NodeArgs::new("iv")
                .with_config("value", input_config("string", Some(Value::String("Hello".into())))),
        )
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    node.output_mut("value").unwrap().connect(tx);
    node.spawn(&RunContext::default()).unwrap();
    wait_stopped(&node).await;

    assert_eq!(collect(rx).await, vec![Value::String("Hello".into())]);
}

#[tokio::test]
async fn inline_value_accepts_bare_literals() {
    let factory = InlineValueFactory;
    let mut node = factory
        .create(NodeArgs::new("iv").with_config("value", Value::Number(42.0)))
        .unwrap();

    let (tx, rx) = mpsc::channel(8);
    node.output_mut("value").unwrap().connect(tx);
    node.spawn(&RunContext::default()).unwrap();
    wait_stopped(&node).await;

    assert_eq!(collect(rx).await, vec![Value::Number(42.0)]);
}

#[tokio::test]
async fn inline_value_requires_a_value() {
    let factory = InlineValueFactory;
    assert!(factory.create(NodeArgs::new("iv")).is_err());
}

#[tokio::test]
async fn conditional_routes_on_static_operand() {
    let factory = ConditionalFactory;
    let mut node = factory
        .create(
            NodeArgs::new("cond")
                .with_config("condition", object(&[("type", Value::String("EQUAL".into()))]))
                .with_config(
                    "rightOperand",
                    input_config("string", Some(Value::String("Apple".into()))),
                ),
        )
        .unwrap();

    let left = node.input_sender("leftOperand").unwrap();
    node.input_mut("leftOperand").unwrap().inc_ref_count();
    let (tx_t, rx_t) = mpsc::channel(8);
    let (tx_f, rx_f) = mpsc::channel(8);
    node.output_mut("true").unwrap().connect(tx_t);
    node.output_mut("false").unwrap().connect(tx_f);
    node.spawn(&RunContext::default()).unwrap();

    for word in ["Apple", "Banana", "apple"] {
        left.send(Packet::item(Value::String(word.into()))).await.unwrap();
    }
    left.send(Packet::Eos).await.unwrap();
    wait_stopped(&node).await;

    assert_eq!(collect(rx_t).await, vec![Value::String("Apple".into())]);
    assert_eq!(
        collect(rx_f).await,
        vec![Value::String("Banana".into()), Value::String("apple".into())]
    );
}

#[tokio::test]
async fn conditional_compares_dynamic_operands() {
    let factory = ConditionalFactory;
    let mut node = factory
        .create(
            NodeArgs::new("cond")
                .with_config("condition", object(&[("type", Value::String("NOT_EQUAL".into()))])),
        )
        .unwrap();

    let left = node.input_sender("leftOperand").unwrap();
    let right = node.input_sender("rightOperand").unwrap();
    node.input_mut("leftOperand").unwrap().inc_ref_count();
    node.input_mut("rightOperand").unwrap().inc_ref_count();
    let (tx_t, rx_t) = mpsc::channel(8);
    let (tx_f, rx_f) = mpsc::channel(8);
    node.output_mut("true").unwrap().connect(tx_t);
    node.output_mut("false").unwrap().connect(tx_f);
    node.spawn(&RunContext::default()).unwrap();

    let pairs = [("Apple", "Apple"), ("Banana", "Orange"), ("apple", "apple")];
    for (l, r) in pairs {
        left.send(Packet::item(Value::String(l.into()))).await.unwrap();
        right.send(Packet::item(Value::String(r.into()))).await.unwrap();
    }
    left.send(Packet::Eos).await.unwrap();
    right.send(Packet::Eos).await.unwrap();
    wait_stopped(&node).await;

    assert_eq!(collect(rx_t).await, vec![Value::String("Banana".into())]);
    assert_eq!(
        collect(rx_f).await,
        vec![Value::String("Apple".into()), Value::String("apple".into())]
    );
}

#[tokio::test]
async fn conditional_regex_matches() {
    let factory = ConditionalFactory;
    let mut node = factory
        .create(
            NodeArgs::new("cond")
                .with_config(
                    "condition",
                    object(&[("type", Value::String("REGEX_MATCHES".into()))]),
                )
                .with_config(
                    "rightOperand",
                    input_config("string", Some(Value::String("^a.*e$".into()))),
                ),
        )
        .unwrap();

    let left = node.input_sender("leftOperand").unwrap();
    node.input_mut("leftOperand").unwrap().inc_ref_count();
    let (tx_t, rx_t) = mpsc::channel(8);
    let (tx_f, rx_f) = mpsc::channel(8);
    node.output_mut("true").unwrap().connect(tx_t);
    node.output_mut("false").unwrap().connect(tx_f);
    node.spawn(&RunContext::default()).unwrap();

    for word in ["apple", "banana"] {
        left.send(Packet::item(Value::String(word.into()))).await.unwrap();
    }
    left.send(Packet::Eos).await.unwrap();
    wait_stopped(&node).await;

    assert_eq!(collect(rx_t).await, vec![Value::String("apple".into())]);
    assert_eq!(collect(rx_f).await, vec![Value::String("banana".into())]);
}

#[tokio::test]
async fn get_attribute_with_static_key() {
    let factory = GetAttributeFactory;
    let mut node = factory
        .create(
            NodeArgs::new("ga")
                .with_config("key", input_config("string", Some(Value::String("name".into())))),
        )
        .unwrap();

    let objects = node.input_sender("object").unwrap();
    node.input_mut("object").unwrap().inc_ref_count();
    let (tx, rx) = mpsc::channel(8);
    node.output_mut("value").unwrap().connect(tx);
    node.spawn(&RunContext::default()).unwrap();

    objects
        .send(Packet::item(object(&[("name", Value::String("Alice".into()))])))
        .await
        .unwrap();
    objects
        .send(Packet::item(object(&[("name", Value::String("Bob".into()))])))
        .await
        .unwrap();
    objects
        .send(Packet::item(object(&[("nananan", Value::String("Charlie".into()))])))
        .await
        .unwrap();
    objects.send(Packet::Eos).await.unwrap();
    wait_stopped(&node).await;

    assert_eq!(
        collect(rx).await,
        vec![Value::String("Alice".into()), Value::String("Bob".into()), Value::Null]
    );
}

#[tokio::test]
async fn get_attribute_with_sticky_dynamic_key() {
    let factory = GetAttributeFactory;
    let mut node = factory
        .create(NodeArgs::new("ga").with_config("key", input_config("dynamic", None)))
        .unwrap();

    let objects = node.input_sender("object").unwrap();
    let keys = node.input_sender("key").unwrap();
    node.input_mut("object").unwrap().inc_ref_count();
    let (tx, rx) = mpsc::channel(8);
    node.output_mut("value").unwrap().connect(tx);
    node.spawn(&RunContext::default()).unwrap();

    // Prime the sticky key once; later objects reuse it.
    keys.send(Packet::item(Value::String("name".into()))).await.unwrap();
    objects
        .send(Packet::item(object(&[("name", Value::String("Alice".into()))])))
        .await
        .unwrap();
    objects
        .send(Packet::item(object(&[("name", Value::String("Bob".into()))])))
        .await
        .unwrap();
    objects.send(Packet::Eos).await.unwrap();
    wait_stopped(&node).await;

    assert_eq!(
        collect(rx).await,
        vec![Value::String("Alice".into()), Value::String("Bob".into())]
    );
}

#[tokio::test]
async fn get_attribute_walks_dotted_paths() {
    let factory = GetAttributeFactory;
    let mut node = factory
        .create(
            NodeArgs::new("ga")
                .with_config(
                    "key",
                    input_config("string", Some(Value::String("price.amount".into()))),
                ),
        )
        .unwrap();

    let objects = node.input_sender("object").unwrap();
    node.input_mut("object").unwrap().inc_ref_count();
    let (tx, rx) = mpsc::channel(8);
    node.output_mut("value").unwrap().connect(tx);
    node.spawn(&RunContext::default()).unwrap();

    let nested = object(&[("price", object(&[("amount", Value::Number(9.5))]))]);
    objects.send(Packet::item(nested)).await.unwrap();
    objects.send(Packet::item(Value::Number(3.0))).await.unwrap();
    objects.send(Packet::Eos).await.unwrap();
    wait_stopped(&node).await;

    assert_eq!(collect(rx).await, vec![Value::Number(9.5), Value::Null]);
}

#[tokio::test]
async fn json_transforms_round_trip() {
    let mut parse = JsonParseFactory.create(NodeArgs::new("parse")).unwrap();
    let texts = parse.input_sender("json").unwrap();
    parse.input_mut("json").unwrap().inc_ref_count();
    let (tx, rx) = mpsc::channel(8);
    parse.output_mut("parsed").unwrap().connect(tx);
    parse.spawn(&RunContext::default()).unwrap();

    texts
        .send(Packet::item(Value::String(r#"{"answer": 42}"#.into())))
        .await
        .unwrap();
    texts.send(Packet::Eos).await.unwrap();
    wait_stopped(&parse).await;

    let parsed = collect(rx).await;
    match &parsed[0] {
        Value::Json(json) => assert_eq!(json.get("answer").and_then(|v| v.as_i64()), Some(42)),
        other => panic!("expected json, got {:?}", other),
    }
}

#[test]
fn macro_table_is_closed() {
    assert_eq!(SUPPORTED_MACROS.to_vec(), vec!["InlineValue", "Conditional", "GetAttribute"]);
    let registry = loomnodes::builtin_registry();
    for name in SUPPORTED_MACROS {
        assert!(registry.contains(name), "{} must be registered", name);
    }
}
