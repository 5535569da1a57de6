use async_trait::async_trait;
use loomcore::{
    InputConfig, InputMode, InputSpec, Inputs, NodeError, NodeMeta, OutputSpec, Process,
    ProcessContext, ProcessOutput, Value,
};
use loomruntime::{Component, NodeArgs, NodeFactory, NodeMetadata};

/// Get an attribute from a mapping-shaped value. Dotted keys walk nested
/// mappings; a missing step yields null.
pub struct GetAttribute;

#[async_trait]
impl Process for GetAttribute {
    async fn process(
        &mut self,
        inputs: Inputs,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        let object = inputs.require("object")?;
        let key = inputs.get("key").and_then(Value::as_str).unwrap_or_default().to_string();

        let mut value = object.clone();
        for step in key.split('.') {
            value = match value.index(step) {
                Some(next) => next,
                None => {
                    value = Value::Null;
                    break;
                }
            };
        }
        Ok(ProcessOutput::map().with("value", value).build())
    }
}

pub struct GetAttributeFactory;

impl NodeFactory for GetAttributeFactory {
    fn node_type(&self) -> &str {
        "GetAttribute"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        // macroData: { key: {type: dynamic|string, value?} }
        let key_spec = InputSpec::new("key").description("The attribute name");
        let key_spec = match args.get_config("key").and_then(InputConfig::from_value) {
            Some(cfg) if cfg.is_dynamic() => {
                // Dynamic keys follow the stream; a preset value primes the latch.
                let spec = key_spec.mode(InputMode::Sticky);
                match cfg.value {
                    Some(value) => spec.value(value),
                    None => spec,
                }
            }
            Some(cfg) => key_spec
                .mode(InputMode::Static)
                .value(cfg.value.unwrap_or(Value::Null)),
            // No config at all: the key arrives on its queue.
            None => key_spec,
        };
        let inputs = vec![
            InputSpec::new("object").description("The object or dictionary"),
            key_spec,
        ];
        let outputs = vec![OutputSpec::new("value").description("The attribute value")];
        let meta = NodeMeta::new(args.id.clone(), self.node_type())
            .with_display_name(args.display_name.clone().unwrap_or_default());
        Ok(Component::new(meta, inputs, outputs, Box::new(GetAttribute), args.queue_capacity))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Look up an attribute on a mapping, with dotted paths".to_string(),
            category: "macro".to_string(),
            ..Default::default()
        }
    }
}
