use std::collections::HashMap;

/// Payload carried on port queues.
///
/// Streams are dynamically shaped: the runtime never looks inside a payload
/// (only the packet layer's EOS marker matters to it), and components
/// downcast with the accessors below. The variants are the interchange
/// kinds of the declaration format — scalars, binary, sequence, mapping —
/// plus `Json` for opaque documents produced by parsing components.
///
/// Values cross the wire through the explicit [`yaml_to_value`] /
/// [`value_to_yaml`] and [`json_to_value`] / [`value_to_json`] conversions;
/// the type itself has no serialized form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Binary(Vec<u8>),
    Sequence(Vec<Value>),
    Mapping(HashMap<String, Value>),
    Json(serde_json::Value),
}

impl Value {
    /// String view of a payload, seeing through opaque JSON.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of a payload, seeing through opaque JSON.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Json(j) => j.as_f64(),
            _ => None,
        }
    }

    /// Boolean view of a payload, seeing through opaque JSON.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Json(j) => j.as_bool(),
            _ => None,
        }
    }

    /// True for values a Conditional treats as "existing": not null, not an
    /// empty string, not an empty sequence.
    pub fn exists(&self) -> bool {
        match self {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            Value::Sequence(items) => !items.is_empty(),
            Value::Json(serde_json::Value::Null) => false,
            Value::Json(serde_json::Value::String(s)) => !s.is_empty(),
            Value::Json(serde_json::Value::Array(items)) => !items.is_empty(),
            _ => true,
        }
    }

    /// Look up a key on a mapping-shaped value. Returns `None` for anything
    /// that is not a mapping or does not contain the key.
    pub fn index(&self, key: &str) -> Option<Value> {
        match self {
            Value::Mapping(map) => map.get(key).cloned(),
            Value::Json(serde_json::Value::Object(map)) => {
                map.get(key).cloned().map(Value::Json)
            }
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Convert plain JSON into the engine value model.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => {
            Value::Sequence(arr.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, Value> =
                obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect();
            Value::Mapping(map)
        }
    }
}

/// Inverse of [`json_to_value`].
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Binary(bytes) => serde_json::Value::Array(
            bytes.iter().map(|x| serde_json::Value::Number((*x).into())).collect(),
        ),
        Value::Json(j) => j.clone(),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                out.insert(k.clone(), value_to_json(&map[k]));
            }
            serde_json::Value::Object(out)
        }
    }
}

/// Convert a parsed YAML node into the engine value model. Used by the
/// loader for `macroData` and static pin values.
pub fn yaml_to_value(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Sequence(seq.into_iter().map(yaml_to_value).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let map: HashMap<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), yaml_to_value(v))))
                .collect();
            Value::Mapping(map)
        }
        // Tagged scalars have no counterpart in the value model
        serde_yaml::Value::Tagged(tagged) => yaml_to_value(tagged.value),
    }
}

/// Inverse of [`yaml_to_value`], used when serializing a live flow back to
/// its declaration.
pub fn value_to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Number(n) => serde_yaml::Value::Number((*n).into()),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Binary(bytes) => serde_yaml::Value::Sequence(
            bytes.iter().map(|x| serde_yaml::Value::Number(u64::from(*x).into())).collect(),
        ),
        Value::Json(j) => serde_yaml::to_value(j).unwrap_or(serde_yaml::Value::Null),
        Value::Sequence(items) => {
            serde_yaml::Value::Sequence(items.iter().map(value_to_yaml).collect())
        }
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                out.insert(serde_yaml::Value::String(k.clone()), value_to_yaml(&map[k]));
            }
            serde_yaml::Value::Mapping(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_downcast() {
        assert_eq!(Value::String("hi".into()).as_str(), Some("hi"));
        assert_eq!(Value::Number(4.0).as_f64(), Some(4.0));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Number(4.0).as_str(), None);
    }

    #[test]
    fn accessors_see_through_json() {
        let json = Value::Json(serde_json::json!("opaque"));
        assert_eq!(json.as_str(), Some("opaque"));
        assert_eq!(Value::Json(serde_json::json!(1.5)).as_f64(), Some(1.5));
        assert_eq!(Value::Json(serde_json::json!(true)).as_bool(), Some(true));
    }

    #[test]
    fn exists_rules() {
        assert!(!Value::Null.exists());
        assert!(!Value::String(String::new()).exists());
        assert!(!Value::Sequence(vec![]).exists());
        assert!(Value::Number(0.0).exists());
        assert!(Value::String("x".into()).exists());
    }

    #[test]
    fn index_walks_mappings() {
        let mut inner = HashMap::new();
        inner.insert("name".to_string(), Value::String("Alice".into()));
        let map = Value::Mapping(inner);
        assert_eq!(map.index("name"), Some(Value::String("Alice".into())));
        assert_eq!(map.index("missing"), None);
        assert_eq!(Value::Number(1.0).index("name"), None);
    }

    #[test]
    fn yaml_round_trip() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("{a: 1, b: [true, \"x\"], c: null}").unwrap();
        let value = yaml_to_value(yaml);
        match &value {
            Value::Mapping(map) => {
                assert_eq!(map["a"], Value::Number(1.0));
                assert_eq!(map["c"], Value::Null);
            }
            other => panic!("expected mapping, got {:?}", other),
        }
        let back = value_to_yaml(&value);
        assert_eq!(back.get("a"), Some(&serde_yaml::Value::Number(1.0.into())));
    }
}
