//! Record values and their wire representation.
//!
//! A record's value is either a scalar or a keyed mapping of fields. On the
//! wire, scalars that need to travel as objects are wrapped in a single-field
//! envelope `{ ".value": scalar }`. Priority and identity are never part of a
//! value; they live in the cache's shadow table and on the record itself.

use serde_json::Map;

/// The field name of the scalar envelope.
pub const VALUE_FIELD: &str = ".value";

/// The field name a store may use to carry priority inside an object.
pub const PRIORITY_FIELD: &str = ".priority";

/// A JSON value as carried on the wire.
pub type Wire = serde_json::Value;

/// The fields of a keyed value.
pub type Fields = Map<String, Wire>;

/// The value of a record.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A single scalar (string, number, boolean, null, or array).
    Scalar(Wire),
    /// A mapping from field names to values.
    Keyed(Fields),
}

impl Value {
    /// Normalize a wire value.
    ///
    /// An object carrying the scalar envelope becomes a `Scalar`, any other
    /// object becomes `Keyed`, and everything else is a `Scalar`. Metadata
    /// fields (`.priority`) are stripped from keyed values.
    pub fn from_wire(wire: Wire) -> Value {
        match wire {
            Wire::Object(mut fields) => {
                if let Some(scalar) = fields.remove(VALUE_FIELD) {
                    return Value::Scalar(scalar);
                }
                fields.remove(PRIORITY_FIELD);
                return Value::Keyed(fields);
            }
            other => return Value::Scalar(other),
        }
    }

    /// Convert to the shape written to the store: scalars unwrapped,
    /// keyed values as plain objects.
    pub fn to_wire(&self) -> Wire {
        match self {
            Value::Scalar(scalar) => return scalar.clone(),
            Value::Keyed(fields) => return Wire::Object(fields.clone()),
        }
    }

    /// Convert to the shape written to the store, consuming the value.
    pub fn into_wire(self) -> Wire {
        match self {
            Value::Scalar(scalar) => return scalar,
            Value::Keyed(fields) => return Wire::Object(fields),
        }
    }

    /// Return true if this is a keyed value.
    pub fn is_keyed(&self) -> bool {
        return matches!(self, Value::Keyed(_));
    }

    /// The scalar, if this is a scalar value.
    pub fn as_scalar(&self) -> Option<&Wire> {
        match self {
            Value::Scalar(scalar) => return Some(scalar),
            Value::Keyed(_) => return None,
        }
    }

    /// The fields, if this is a keyed value.
    pub fn as_fields(&self) -> Option<&Fields> {
        match self {
            Value::Keyed(fields) => return Some(fields),
            Value::Scalar(_) => return None,
        }
    }

    /// Look up a field of a keyed value.
    pub fn field(&self, name: &str) -> Option<&Wire> {
        return self.as_fields().and_then(|fields| fields.get(name));
    }

    /// Apply a newer value onto this one.
    ///
    /// When both sides are keyed, the existing map is mutated in place:
    /// fields missing from `newer` are deleted and every field of `newer` is
    /// written. Otherwise the value is replaced outright.
    pub fn merge_from(&mut self, newer: Value) {
        match (self, newer) {
            (Value::Keyed(base), Value::Keyed(newer)) => {
                base.retain(|name, _| newer.contains_key(name));
                for (name, field) in newer {
                    base.insert(name, field);
                }
            }
            (base, newer) => *base = newer,
        }
    }
}

impl From<Wire> for Value {
    fn from(wire: Wire) -> Value {
        return Value::from_wire(wire);
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Value {
        return Value::Keyed(fields);
    }
}

impl From<&str> for Value {
    fn from(scalar: &str) -> Value {
        return Value::Scalar(Wire::from(scalar));
    }
}

impl From<String> for Value {
    fn from(scalar: String) -> Value {
        return Value::Scalar(Wire::from(scalar));
    }
}

impl From<bool> for Value {
    fn from(scalar: bool) -> Value {
        return Value::Scalar(Wire::from(scalar));
    }
}

impl From<i64> for Value {
    fn from(scalar: i64) -> Value {
        return Value::Scalar(Wire::from(scalar));
    }
}

impl From<f64> for Value {
    fn from(scalar: f64) -> Value {
        return Value::Scalar(Wire::from(scalar));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keyed(wire: Wire) -> Value {
        return Value::from_wire(wire);
    }

    #[test]
    fn objects_become_keyed() {
        let value = Value::from_wire(json!({ "foo": "bar" }));
        assert!(value.is_keyed());
        assert_eq!(value.field("foo"), Some(&json!("bar")));
    }

    #[test]
    fn envelope_becomes_scalar() {
        let value = Value::from_wire(json!({ ".value": 42 }));
        assert_eq!(value, Value::Scalar(json!(42)));
    }

    #[test]
    fn priority_field_is_stripped() {
        let value = Value::from_wire(json!({ "a": 1, ".priority": 3.5 }));
        assert_eq!(value, keyed(json!({ "a": 1 })));
    }

    #[test]
    fn scalars_unwrap_on_the_wire() {
        let value = Value::from("hello");
        assert_eq!(value.to_wire(), json!("hello"));
    }

    #[test]
    fn merge_keeps_map_in_place() {
        let mut base = keyed(json!({ "keep": 1, "drop": 2 }));
        let before = base.as_fields().map(|f| f as *const Fields);

        base.merge_from(keyed(json!({ "keep": 10, "new": 3 })));

        let after = base.as_fields().map(|f| f as *const Fields);
        assert_eq!(before, after);
        assert_eq!(base, keyed(json!({ "keep": 10, "new": 3 })));
    }

    #[test]
    fn merge_replaces_across_shapes() {
        let mut base = Value::from("scalar");
        base.merge_from(keyed(json!({ "hello": "world" })));
        assert_eq!(base, keyed(json!({ "hello": "world" })));

        base.merge_from(Value::from(7i64));
        assert_eq!(base, Value::Scalar(json!(7)));
    }
}
