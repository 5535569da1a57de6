use async_trait::async_trait;
use loomcore::{
    InputConfig, InputMode, InputSpec, Inputs, NodeError, NodeMeta, OutputSpec, Process,
    ProcessContext, ProcessOutput, Value,
};
use loomruntime::{Component, NodeArgs, NodeFactory, NodeMetadata};
use regex::Regex;

/// The closed set of condition kinds a Conditional can evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionType {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    RegexMatches,
    Exists,
    NotExists,
}

impl ConditionType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "EQUAL" => Some(Self::Equal),
            "NOT_EQUAL" => Some(Self::NotEqual),
            "CONTAINS" => Some(Self::Contains),
            "NOT_CONTAINS" => Some(Self::NotContains),
            "REGEX_MATCHES" => Some(Self::RegexMatches),
            "EXISTS" => Some(Self::Exists),
            "NOT_EXISTS" => Some(Self::NotExists),
            _ => None,
        }
    }
}

/// Routes its left operand to `true` or `false` depending on a configured
/// condition against the right operand.
pub struct Conditional {
    condition: ConditionType,
    // Cache of the last compiled pattern; right operands rarely change.
    regex: Option<Regex>,
}

impl Conditional {
    fn evaluate(&mut self, left: &Value, right: &Value) -> Result<bool, NodeError> {
        Ok(match self.condition {
            ConditionType::Equal => left == right,
            ConditionType::NotEqual => left != right,
            ConditionType::Contains => contains(left, right),
            ConditionType::NotContains => !contains(left, right),
            ConditionType::RegexMatches => {
                let pattern = right.as_str().ok_or_else(|| {
                    NodeError::InvalidInputType {
                        field: "rightOperand".to_string(),
                        expected: "string pattern".to_string(),
                    }
                })?;
                let stale = self.regex.as_ref().map(|r| r.as_str() != pattern).unwrap_or(true);
                if stale {
                    let compiled = Regex::new(pattern).map_err(|e| {
                        NodeError::ProcessFailed(format!("invalid pattern: {}", e))
                    })?;
                    self.regex = Some(compiled);
                }
                match (&self.regex, left.as_str()) {
                    (Some(regex), Some(l)) => regex.is_match(l),
                    _ => false,
                }
            }
            ConditionType::Exists => left.exists(),
            ConditionType::NotExists => !left.exists(),
        })
    }
}

fn contains(left: &Value, right: &Value) -> bool {
    // as_str sees through opaque JSON, so one arm covers both string kinds.
    if let Some(l) = left.as_str() {
        return right.as_str().map(|r| l.contains(r)).unwrap_or(false);
    }
    match left {
        Value::Sequence(items) => items.contains(right),
        Value::Mapping(map) => right.as_str().map(|r| map.contains_key(r)).unwrap_or(false),
        Value::Json(serde_json::Value::Object(map)) => {
            right.as_str().map(|r| map.contains_key(r)).unwrap_or(false)
        }
        _ => false,
    }
}

#[async_trait]
impl Process for Conditional {
    async fn process(
        &mut self,
        inputs: Inputs,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<ProcessOutput, NodeError> {
        let left = inputs.require("leftOperand")?.clone();
        let right = inputs.get("rightOperand").cloned().unwrap_or(Value::Null);
        let result = self.evaluate(&left, &right)?;
        if result {
            ctx.send("true", left).await;
        } else {
            ctx.send("false", left).await;
        }
        Ok(ProcessOutput::Empty)
    }
}

pub struct ConditionalFactory;

impl NodeFactory for ConditionalFactory {
    fn node_type(&self) -> &str {
        "Conditional"
    }

    fn create(&self, args: NodeArgs) -> Result<Component, NodeError> {
        // macroData: { condition: {type}, leftOperand?, rightOperand? }
        let condition = args
            .require_config("condition")?
            .index("type")
            .and_then(|t| t.as_str().and_then(ConditionType::parse))
            .ok_or_else(|| NodeError::Configuration("invalid 'condition' in Conditional".into()))?;

        let operand_spec = |pin: &str, config: Option<&Value>| {
            let spec = InputSpec::new(pin);
            match config.and_then(InputConfig::from_value) {
                // A literal operand becomes a static pin.
                Some(cfg) if !cfg.is_dynamic() => {
                    spec.mode(InputMode::Static).value(cfg.value.unwrap_or(Value::Null))
                }
                _ => spec,
            }
        };
        let inputs = vec![
            operand_spec("leftOperand", args.get_config("leftOperand"))
                .description("Left operand of the condition"),
            operand_spec("rightOperand", args.get_config("rightOperand"))
                .description("Right operand of the condition"),
        ];
        let outputs = vec![
            OutputSpec::new("true").description("Output when the condition is true"),
            OutputSpec::new("false").description("Output when the condition is false"),
        ];
        let meta = NodeMeta::new(args.id.clone(), self.node_type())
            .with_display_name(args.display_name.clone().unwrap_or_default());
        Ok(Component::new(
            meta,
            inputs,
            outputs,
            Box::new(Conditional { condition, regex: None }),
            args.queue_capacity,
        ))
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Route the left operand by evaluating a condition".to_string(),
            category: "macro".to_string(),
            ..Default::default()
        }
    }
}
