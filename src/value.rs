//! The recursive, tagged-union `Value` model and its conversions to/from
//! the wire representation and a generic "native" JSON representation.

use wire_protocol::{WireStructField, WireValue};

/// Default recursion depth cap for `Value` conversions. The wire message's
/// natural limit bounds recursion in practice; this cap exists so a
/// pathological payload fails with `DepthExceeded` instead of blowing the
/// stack.
pub const DEFAULT_MAX_DEPTH: u32 = 64;

/// Closed enumeration of value kinds. `Uint32`/`Uint64` do not appear here
/// -- they exist only on the wire and are widened to signed on ingest per
/// the unsigned-widening design note.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Image { format: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Array,
    Struct,
    Image,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("unsupported value type")]
    UnsupportedType,
    #[error("recursion depth exceeded (max {max})")]
    DepthExceeded { max: u32 },
}

impl Value {
    pub fn type_of(&self) -> TypeTag {
        match self {
            Value::Bool(_) => TypeTag::Bool,
            Value::Int32(_) => TypeTag::Int32,
            Value::Int64(_) => TypeTag::Int64,
            Value::Float32(_) => TypeTag::Float32,
            Value::Float64(_) => TypeTag::Float64,
            Value::String(_) => TypeTag::String,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::Array(_) => TypeTag::Array,
            Value::Struct(_) => TypeTag::Struct,
            Value::Image { .. } => TypeTag::Image,
        }
    }

    /// Converts from the wire tagged union, widening unsigned integers to
    /// signed (bit pattern preserved, per the design note) and rejecting
    /// recursion past `max_depth`.
    pub fn from_wire(w: &WireValue, max_depth: u32) -> Result<Value, ValueError> {
        Self::from_wire_at(w, max_depth, 0)
    }

    fn from_wire_at(w: &WireValue, max_depth: u32, depth: u32) -> Result<Value, ValueError> {
        if depth > max_depth {
            return Err(ValueError::DepthExceeded { max: max_depth });
        }
        Ok(match w {
            WireValue::Bool(b) => Value::Bool(*b),
            WireValue::Uint32(u) => Value::Int32(*u as i32),
            WireValue::Sint32(i) => Value::Int32(*i),
            WireValue::Uint64(u) => Value::Int64(*u as i64),
            WireValue::Sint64(i) => Value::Int64(*i),
            WireValue::Float(f) => Value::Float32(*f),
            WireValue::Double(d) => Value::Float64(*d),
            WireValue::String(s) => Value::String(s.clone()),
            WireValue::Bytes(b) => Value::Bytes(b.clone()),
            WireValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::from_wire_at(item, max_depth, depth + 1)?);
                }
                Value::Array(out)
            }
            WireValue::Struct(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for field in fields {
                    out.push((field.name.clone(), Self::from_wire_at(&field.value, max_depth, depth + 1)?));
                }
                Value::Struct(out)
            }
            WireValue::Image { file_type, bytes } => Value::Image {
                format: file_type.clone(),
                bytes: bytes.clone(),
            },
        })
    }

    pub fn to_wire(&self) -> WireValue {
        match self {
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Int32(i) => WireValue::Sint32(*i),
            Value::Int64(i) => WireValue::Sint64(*i),
            Value::Float32(f) => WireValue::Float(*f),
            Value::Float64(f) => WireValue::Double(*f),
            Value::String(s) => WireValue::String(s.clone()),
            Value::Bytes(b) => WireValue::Bytes(b.clone()),
            Value::Array(items) => WireValue::Array(items.iter().map(Value::to_wire).collect()),
            Value::Struct(fields) => WireValue::Struct(
                fields
                    .iter()
                    .map(|(name, v)| WireStructField {
                        name: name.clone(),
                        value: v.to_wire(),
                    })
                    .collect(),
            ),
            Value::Image { format, bytes } => WireValue::Image {
                file_type: format.clone(),
                bytes: bytes.clone(),
            },
        }
    }

    /// Accepts a closed enumeration of native JSON shapes. `null` and JSON
    /// numbers that are neither representable as `i64` nor `f64` fail with
    /// `UnsupportedType`.
    pub fn from_native(v: &serde_json::Value, max_depth: u32) -> Result<Value, ValueError> {
        Self::from_native_at(v, max_depth, 0)
    }

    fn from_native_at(v: &serde_json::Value, max_depth: u32, depth: u32) -> Result<Value, ValueError> {
        if depth > max_depth {
            return Err(ValueError::DepthExceeded { max: max_depth });
        }
        Ok(match v {
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float64(f)
                } else {
                    return Err(ValueError::UnsupportedType);
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Self::from_native_at(item, max_depth, depth + 1)?);
                }
                Value::Array(out)
            }
            serde_json::Value::Object(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    out.push((name.clone(), Self::from_native_at(value, max_depth, depth + 1)?));
                }
                Value::Struct(out)
            }
            serde_json::Value::Null => return Err(ValueError::UnsupportedType),
        })
    }

    pub fn to_native(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int32(i) => serde_json::Value::from(*i),
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::Float32(f) => serde_json::Value::from(*f as f64),
            Value::Float64(f) => serde_json::Value::from(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_native).collect()),
            Value::Struct(fields) => {
                let mut map = serde_json::Map::with_capacity(fields.len());
                for (name, v) in fields {
                    map.insert(name.clone(), v.to_native());
                }
                serde_json::Value::Object(map)
            }
            Value::Image { format, bytes } => serde_json::json!({
                "format": format,
                "bytes": bytes,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_wire_values_widen_to_signed() {
        let v = Value::from_wire(&WireValue::Uint32(u32::MAX), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(v, Value::Int32(-1));
        let v = Value::from_wire(&WireValue::Uint64(u64::MAX), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(v, Value::Int64(-1));
    }

    #[test]
    fn nested_struct_and_array_convert_recursively() {
        let wire = WireValue::Struct(vec![WireStructField {
            name: "xs".to_owned(),
            value: WireValue::Array(vec![WireValue::Sint32(1), WireValue::Sint32(2)]),
        }]);
        let v = Value::from_wire(&wire, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(
            v,
            Value::Struct(vec![("xs".to_owned(), Value::Array(vec![Value::Int32(1), Value::Int32(2)]))])
        );
    }

    #[test]
    fn depth_exceeded_fails_closed() {
        let mut wire = WireValue::Sint32(1);
        for _ in 0..10 {
            wire = WireValue::Array(vec![wire]);
        }
        let result = Value::from_wire(&wire, 3);
        assert_eq!(result, Err(ValueError::DepthExceeded { max: 3 }));
    }

    #[test]
    fn from_native_rejects_null() {
        assert_eq!(
            Value::from_native(&serde_json::Value::Null, DEFAULT_MAX_DEPTH),
            Err(ValueError::UnsupportedType)
        );
    }

    #[test]
    fn native_round_trip_preserves_scalars() {
        for native in [
            serde_json::json!(true),
            serde_json::json!(42),
            serde_json::json!(1.5),
            serde_json::json!("hello"),
            serde_json::json!([1, 2, 3]),
            serde_json::json!({"a": 1, "b": "two"}),
        ] {
            let v = Value::from_native(&native, DEFAULT_MAX_DEPTH).unwrap();
            assert_eq!(v.to_native(), native);
        }
    }

    fn leaf_strategy() -> impl proptest::strategy::Strategy<Value = Value> {
        use proptest::prelude::*;
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::Int32),
            any::<i64>().prop_map(Value::Int64),
            ".*".prop_map(Value::String),
        ]
    }

    fn value_strategy() -> impl proptest::strategy::Strategy<Value = Value> {
        use proptest::prelude::*;
        leaf_strategy().prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::vec(("[a-z]{1,6}", inner), 0..4).prop_map(Value::Struct),
            ]
        })
    }

    proptest::proptest! {
        #[test]
        fn wire_round_trip_preserves_every_value(v in value_strategy()) {
            let wire = v.to_wire();
            let back = Value::from_wire(&wire, DEFAULT_MAX_DEPTH).unwrap();
            proptest::prop_assert_eq!(v, back);
        }
    }

    #[test]
    fn type_of_reports_the_closed_enumeration() {
        assert_eq!(Value::Bool(true).type_of(), TypeTag::Bool);
        assert_eq!(Value::Int64(1).type_of(), TypeTag::Int64);
        assert_eq!(
            Value::Image {
                format: "png".into(),
                bytes: vec![]
            }
            .type_of(),
            TypeTag::Image
        );
    }
}
