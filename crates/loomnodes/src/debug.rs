use async_trait::async_trait;
use loomcore::{
    InputSpec, Inputs, NodeError, NodeMeta, Process, ProcessContext, ProcessOutput, Value,
};
use loomruntime::{Component, NodeArgs, NodeFactory, NodeMetadata, PinDefinition};

/// Prints every message it receives to stdout.
pub struct Print;

#[async_trait]
impl Process for Print {
    async fn process(
        &mut self,
        inputs: Inputs,
        _ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        match inputs.require("msg")? {
            Value::String(s) => println!("{}", s),
            other => println!("{:?}", other),
        }
        Ok(ProcessOutput::Empty)
    }
}

pub struct PrintFactory;

impl NodeFactory for PrintFactory {
    fn node_type(&self) -> &str {
        "Print"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        let meta = NodeMeta::new(args.id.clone(), self.node_type())
            .with_display_name(args.display_name.clone().unwrap_or_default());
        Ok(Component::new(
            meta,
            vec![InputSpec::new("msg").description("The message to print")],
            vec![],
            Box::new(Print),
            args.queue_capacity,
        ))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Print incoming messages to the console".to_string(),
            category: "debug".to_string(),
            inputs: vec![PinDefinition {
                name: "msg".to_string(),
                description: "The message to print".to_string(),
                required: true,
            }],
            outputs: vec![],
        }
    }
}
