use crate::{Connection, InputConfig, Requiredness};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of a flow declaration file: an import table plus the top-level
/// graph. Field names follow the wire format so a load/save cycle preserves
/// the file's vocabulary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowDecl {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub imports: BTreeMap<String, Vec<String>>,
    pub node: GraphDecl,
}

impl FlowDecl {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Declaration of a composite node: child instances, the wiring between
/// them, and the graph's own pins. Editor layout blobs (`inputsPosition`,
/// `outputsPosition`, anything unrecognized) are carried verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "nodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instances: Vec<InstanceDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, GraphPinDecl>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, GraphPinDecl>,
    #[serde(rename = "inputsPosition", default, skip_serializing_if = "Option::is_none")]
    pub inputs_position: Option<serde_yaml::Value>,
    #[serde(rename = "outputsPosition", default, skip_serializing_if = "Option::is_none")]
    pub outputs_position: Option<serde_yaml::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Declaration of one child instance. Exactly one of `nodeId` / `macroId`
/// identifies the node class; macro node ids may also use the
/// `<Macro>__<suffix>` form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceDecl {
    pub id: String,
    #[serde(rename = "nodeId", default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "macroId", default, skip_serializing_if = "Option::is_none")]
    pub macro_id: Option<String>,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "inputConfig", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_config: BTreeMap<String, InputConfig>,
    #[serde(rename = "macroData", default, skip_serializing_if = "Option::is_none")]
    pub macro_data: Option<serde_yaml::Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl InstanceDecl {
    /// The node class name: `macroId`, the prefix of a `Macro__suffix` node
    /// id, or the plain node id.
    pub fn class_name(&self) -> Option<(&str, bool)> {
        if let Some(macro_id) = &self.macro_id {
            return Some((macro_id, true));
        }
        let node_id = self.node_id.as_deref()?;
        match node_id.split_once("__") {
            Some((prefix, _)) if !prefix.is_empty() => Some((prefix, true)),
            _ => Some((node_id, false)),
        }
    }
}

/// Declaration of a pin on a graph's boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphPinDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Requiredness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delayed: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
imports:
  "@loom/nodes":
    - InlineValue
    - Print
node:
  id: Main
  instances:
    - id: greeting
      nodeId: InlineValue__greeting
      macroData:
        value:
          type: string
          value: hello
    - id: printer
      nodeId: Print
      pos: {x: 100.5, y: -3.25}
  connections:
    - from: {insId: greeting, pinId: value}
      to: {insId: printer, pinId: msg}
  inputs: {}
  outputs: {}
"#;

    #[test]
    fn parses_sample() {
        let decl = FlowDecl::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(decl.imports["@loom/nodes"], vec!["InlineValue", "Print"]);
        assert_eq!(decl.node.instances.len(), 2);
        assert_eq!(decl.node.connections.len(), 1);
        assert_eq!(decl.node.instances[0].class_name(), Some(("InlineValue", true)));
        assert_eq!(decl.node.instances[1].class_name(), Some(("Print", false)));
    }

    #[test]
    fn preserves_layout_verbatim() {
        let decl = FlowDecl::from_yaml_str(SAMPLE).unwrap();
        let text = decl.to_yaml_string().unwrap();
        let again = FlowDecl::from_yaml_str(&text).unwrap();
        let pos = &again.node.instances[1].extra["pos"];
        assert_eq!(pos.get("x").and_then(|v| v.as_f64()), Some(100.5));
        assert_eq!(pos.get("y").and_then(|v| v.as_f64()), Some(-3.25));
    }

    #[test]
    fn macro_id_field_wins() {
        let ins = InstanceDecl {
            id: "c".into(),
            macro_id: Some("Conditional".into()),
            ..Default::default()
        };
        assert_eq!(ins.class_name(), Some(("Conditional", true)));
    }
}
