use async_trait::async_trait;
use loomcore::{
    InputConfig, Inputs, NodeError, NodeMeta, OutputSpec, Process, ProcessContext, ProcessOutput,
    Value,
};
use loomruntime::{Component, NodeArgs, NodeFactory, NodeMetadata, PinDefinition};

/// InlineValue sends a constant value to its output exactly once, then
/// stops itself.
pub struct InlineValue {
    value: Value,
}

#[async_trait]
impl Process for InlineValue {
    async fn process(
        &mut self,
        _inputs: Inputs,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        ctx.send("value", self.value.clone()).await;
        ctx.stop();
        Ok(ProcessOutput::Empty)
    }
}

pub struct InlineValueFactory;

impl NodeFactory for InlineValueFactory {
    fn node_type(&self) -> &str {
        "InlineValue"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        // macroData: { value: {type, value}, label? }
        let config = args.require_config("value")?;
        let value = match InputConfig::from_value(config) {
            Some(cfg) => cfg.value.unwrap_or(Value::Null),
            // A bare literal is accepted too.
            None => config.clone(),
        };
        let label = args
            .display_name
            .clone()
            .or_else(|| args.get_config("label").and_then(|l| l.as_str().map(String::from)))
            .unwrap_or_default();
        let meta = NodeMeta::new(args.id.clone(), self.node_type()).with_display_name(label);
        Ok(Component::new(
            meta,
            vec![],
            vec![OutputSpec::new("value").description("The constant value")],
            Box::new(InlineValue { value }),
            args.queue_capacity,
        ))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Emit a constant value once, then stop".to_string(),
            category: "macro".to_string(),
            inputs: vec![],
            outputs: vec![PinDefinition {
                name: "value".to_string(),
                description: "The constant value".to_string(),
                required: false,
            }],
        }
    }
}
