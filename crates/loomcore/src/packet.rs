use crate::Value;
use std::sync::Arc;

/// Unit of transfer on a port queue: either a payload or the end-of-stream
/// marker an output emits when its owner finishes.
///
/// Payloads are reference counted so that REF fan-out delivers the same
/// object to every consumer while VALUE fan-out can hand each consumer its
/// own copy.
#[derive(Debug, Clone)]
pub enum Packet {
    Item(Arc<Value>),
    Eos,
}

impl Packet {
    pub fn item(value: Value) -> Self {
        Packet::Item(Arc::new(value))
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, Packet::Eos)
    }

    /// The payload, or `None` for EOS.
    pub fn into_item(self) -> Option<Arc<Value>> {
        match self {
            Packet::Item(v) => Some(v),
            Packet::Eos => None,
        }
    }
}

impl From<Value> for Packet {
    fn from(value: Value) -> Self {
        Packet::item(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eos_identity() {
        assert!(Packet::Eos.is_eos());
        assert!(!Packet::item(Value::Null).is_eos());
        assert!(Packet::Eos.into_item().is_none());
    }

    #[test]
    fn shared_items_keep_identity() {
        let a = Packet::item(Value::String("x".into()));
        let b = a.clone();
        let (a, b) = (a.into_item().unwrap(), b.into_item().unwrap());
        assert!(Arc::ptr_eq(&a, &b));
    }
}
