use super::*;

/// Mixed payloads stored in the same cache.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
    Bytes(Vec<u8>),
    Text(String),
}

impl Value {
    pub(crate) fn text(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl Item for Value {
    fn size(&self) -> usize {
        match self {
            Value::Bytes(bytes) => bytes.size(),
            Value::Text(text) => text.size(),
        }
    }
}

/// Behaviour every policy must share on an unconstrained cache.
pub(crate) fn exercise_cache(cache: &dyn Cache<Value>) {
    assert_eq!(cache.get("/foo"), None);
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.size(), 0);
    assert!(cache.is_empty());

    cache.set("/foo", Value::Bytes(b"foo".to_vec()));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size(), 3);

    cache.set("/bar", Value::text("bar"));
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.size(), 6);

    assert_eq!(cache.get("/foo"), Some(Value::Bytes(b"foo".to_vec())));
    assert_eq!(cache.get("/bar"), Some(Value::text("bar")));

    cache.del("/foo");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size(), 3);
    assert_eq!(cache.get("/foo"), None);

    cache.del("/missing");
    assert_eq!(cache.len(), 1);
}

#[test]
fn item_sizes() {
    assert_eq!(b"boo".to_vec().size(), 3);
    assert_eq!(String::from("hello").size(), 5);
    assert_eq!("hello".size(), 5);
    assert_eq!(42i64.size(), 8);
    assert_eq!(42.0f64.size(), 8);
    assert_eq!(Arc::<str>::from("shared").size(), 6);
    assert_eq!(Box::<[u8]>::from(&b"boxed"[..]).size(), 5);
}
