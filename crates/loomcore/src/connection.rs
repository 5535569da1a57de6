use serde::{Deserialize, Serialize};

/// One endpoint of a connection: an instance id plus a pin id on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionEnd {
    #[serde(rename = "insId")]
    pub ins_id: String,
    #[serde(rename = "pinId")]
    pub pin_id: String,
}

impl ConnectionEnd {
    pub fn new(ins_id: impl Into<String>, pin_id: impl Into<String>) -> Self {
        Self { ins_id: ins_id.into(), pin_id: pin_id.into() }
    }
}

/// A directed edge between two pins. Owns no runtime state; the graph
/// resolves endpoints by id when it wires queues.
///
/// `delayed` and `hidden` are editor metadata, preserved on round-trip and
/// never interpreted by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from: ConnectionEnd,
    pub to: ConnectionEnd,
    #[serde(default)]
    pub delayed: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl Connection {
    pub fn new(from: ConnectionEnd, to: ConnectionEnd) -> Self {
        Self { from, to, delayed: false, hidden: false }
    }

    pub fn between(
        from_ins: impl Into<String>,
        from_pin: impl Into<String>,
        to_ins: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Self {
        Self::new(ConnectionEnd::new(from_ins, from_pin), ConnectionEnd::new(to_ins, to_pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let conn = Connection::between("a", "out", "b", "in");
        assert_eq!(conn.from.ins_id, "a");
        assert_eq!(conn.to.pin_id, "in");
        assert!(!conn.delayed);
        assert!(!conn.hidden);
    }

    #[test]
    fn wire_format() {
        let yaml = "{from: {insId: a, pinId: out}, to: {insId: b, pinId: in}, delayed: true, hidden: true}";
        let conn: Connection = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(conn.from, ConnectionEnd::new("a", "out"));
        assert!(conn.delayed);
        assert!(conn.hidden);

        let back = serde_yaml::to_value(&conn).unwrap();
        assert_eq!(back.get("from").and_then(|f| f.get("insId")).and_then(|v| v.as_str()), Some("a"));
    }
}
