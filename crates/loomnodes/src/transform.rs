use async_trait::async_trait;
use loomcore::{
    value_to_json, InputSpec, Inputs, NodeError, NodeMeta, OutputSpec, Process, ProcessContext,
    ProcessOutput, Value,
};
use loomruntime::{Component, NodeArgs, NodeFactory, NodeMetadata};

/// Parse each incoming JSON string into a value.
pub struct JsonParse;

#[async_trait]
impl Process for JsonParse {
    async fn process(
        &mut self,
        inputs: Inputs,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        let text = inputs.require("json")?.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
        })?;
        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| NodeError::ProcessFailed(format!("JSON parse error: {}", e)))?;
        Ok(ProcessOutput::map().with("parsed", Value::Json(parsed)).build())
    }
}

pub struct JsonParseFactory;

impl NodeFactory for JsonParseFactory {
    fn node_type(&self) -> &str {
        "JsonParse"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        let meta = NodeMeta::new(args.id.clone(), self.node_type())
            .with_display_name(args.display_name.clone().unwrap_or_default());
        Ok(Component::new(
            meta,
            vec![InputSpec::new("json").description("JSON text")],
            vec![OutputSpec::new("parsed").description("Parsed value")],
            Box::new(JsonParse),
            args.queue_capacity,
        ))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Parse JSON strings".to_string(),
            category: "transform".to_string(),
            ..Default::default()
        }
    }
}

/// Serialize each incoming value to a JSON string.
pub struct JsonStringify;

#[async_trait]
impl Process for JsonStringify {
    async fn process(
        &mut self,
        inputs: Inputs,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        let value = inputs.require("value")?;
        let text = serde_json::to_string_pretty(&value_to_json(value))
            .map_err(|e| NodeError::ProcessFailed(format!("JSON stringify error: {}", e)))?;
        Ok(ProcessOutput::map().with("json", text).build())
    }
}

pub struct JsonStringifyFactory;

impl NodeFactory for JsonStringifyFactory {
    fn node_type(&self) -> &str {
        "JsonStringify"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        let meta = NodeMeta::new(args.id.clone(), self.node_type())
            .with_display_name(args.display_name.clone().unwrap_or_default());
        Ok(Component::new(
            meta,
            vec![InputSpec::new("value").description("Value to serialize")],
            vec![OutputSpec::new("json").description("JSON text")],
            Box::new(JsonStringify),
            args.queue_capacity,
        ))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Serialize values to JSON strings".to_string(),
            category: "transform".to_string(),
            ..Default::default()
        }
    }
}
