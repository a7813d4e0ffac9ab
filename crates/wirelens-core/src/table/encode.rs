//! Field-table encoding.

use super::{ScalarType, SimpleFieldDefinition};
use crate::error::{Error, Result};
use crate::wire::{write_tag, write_varint, write_zigzag};
use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use tracing::{debug, trace};

/// Encode a structured object with an explicit field table.
///
/// Definitions are processed in table order. Members that are missing or
/// `null` are skipped; members with no definition are ignored. Repeated
/// definitions take an array and emit one tag per element (unpacked).
/// Conversion failures abort the whole call.
pub fn encode_with_field_table(input: &Value, table: &[SimpleFieldDefinition]) -> Result<Bytes> {
    let object = input
        .as_object()
        .ok_or_else(|| Error::invalid_input("field-table input must be a JSON object"))?;

    let mut buf = BytesMut::new();

    for def in table {
        let Some(value) = object.get(&def.name).filter(|v| !v.is_null()) else {
            continue;
        };

        if def.repeated {
            let items = value.as_array().ok_or_else(|| {
                Error::field_conversion(&def.name, def.field_type, "repeated field expects an array")
            })?;
            trace!("Encoding {} elements of field {}", items.len(), def.number);
            for item in items {
                encode_value(def, item, &mut buf)?;
            }
        } else {
            encode_value(def, value, &mut buf)?;
        }
    }

    if tracing::enabled!(tracing::Level::DEBUG) {
        for key in object.keys() {
            if !table.iter().any(|def| &def.name == key) {
                debug!("No field definition for member '{}', skipped", key);
            }
        }
    }

    debug!("Encoded {} bytes from {} field definitions", buf.len(), table.len());
    Ok(buf.freeze())
}

fn encode_value(def: &SimpleFieldDefinition, value: &Value, buf: &mut BytesMut) -> Result<()> {
    let ty = def.field_type;
    write_tag(def.number, ty.wire_type(), buf)?;

    match ty {
        ScalarType::Int32 | ScalarType::Enum => {
            // Negative values are sign-extended to ten bytes
            let v = integer(def, value, i32::MIN as i128, i32::MAX as i128)?;
            write_varint(v as i64 as u64, buf);
        }
        ScalarType::Int64 => {
            let v = integer(def, value, i64::MIN as i128, i64::MAX as i128)?;
            write_varint(v as i64 as u64, buf);
        }
        ScalarType::Uint32 => {
            let v = integer(def, value, 0, u32::MAX as i128)?;
            write_varint(v as u64, buf);
        }
        ScalarType::Uint64 => {
            let v = integer(def, value, 0, u64::MAX as i128)?;
            write_varint(v as u64, buf);
        }
        ScalarType::Sint32 => {
            let v = integer(def, value, i32::MIN as i128, i32::MAX as i128)?;
            write_zigzag(v as i64, buf);
        }
        ScalarType::Sint64 => {
            let v = integer(def, value, i64::MIN as i128, i64::MAX as i128)?;
            write_zigzag(v as i64, buf);
        }
        ScalarType::Bool => {
            write_varint(boolean(def, value)? as u64, buf);
        }
        ScalarType::Fixed32 => {
            let v = integer(def, value, 0, u32::MAX as i128)?;
            buf.put_u32_le(v as u32);
        }
        ScalarType::Sfixed32 => {
            let v = integer(def, value, i32::MIN as i128, i32::MAX as i128)?;
            buf.put_i32_le(v as i32);
        }
        ScalarType::Fixed64 => {
            let v = integer(def, value, 0, u64::MAX as i128)?;
            buf.put_u64_le(v as u64);
        }
        ScalarType::Sfixed64 => {
            let v = integer(def, value, i64::MIN as i128, i64::MAX as i128)?;
            buf.put_i64_le(v as i64);
        }
        ScalarType::Float => {
            let v = float(def, value)?;
            let narrowed = v as f32;
            if v.is_finite() && !narrowed.is_finite() {
                return Err(Error::field_conversion(
                    &def.name,
                    ty,
                    format!("{} is out of range for a 32-bit float", v),
                ));
            }
            buf.put_f32_le(narrowed);
        }
        ScalarType::Double => {
            buf.put_f64_le(float(def, value)?);
        }
        ScalarType::String => {
            let s = value.as_str().ok_or_else(|| {
                Error::field_conversion(&def.name, ty, format!("expected a string, got {}", value))
            })?;
            write_length_delimited(s.as_bytes(), buf);
        }
        ScalarType::Bytes => {
            let bytes = byte_string(def, value)?;
            write_length_delimited(&bytes, buf);
        }
    }

    Ok(())
}

fn write_length_delimited(payload: &[u8], buf: &mut BytesMut) {
    write_varint(payload.len() as u64, buf);
    buf.put_slice(payload);
}

/// Integer from a JSON number or decimal string, range-checked.
fn integer(def: &SimpleFieldDefinition, value: &Value, min: i128, max: i128) -> Result<i128> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i128)
            }),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    };

    let v = parsed.ok_or_else(|| {
        Error::field_conversion(
            &def.name,
            def.field_type,
            format!("expected an integer, got {}", value),
        )
    })?;

    if v < min || v > max {
        return Err(Error::field_conversion(
            &def.name,
            def.field_type,
            format!("{} is out of range [{}, {}]", v, min, max),
        ));
    }

    Ok(v)
}

fn boolean(def: &SimpleFieldDefinition, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
        Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        _ => Err(Error::field_conversion(
            &def.name,
            def.field_type,
            format!("expected a boolean, got {}", value),
        )),
    }
}

/// Float from a JSON number or its string spelling.
fn float(def: &SimpleFieldDefinition, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse::<f64>().ok(),
        },
        _ => None,
    };

    parsed.ok_or_else(|| {
        Error::field_conversion(
            &def.name,
            def.field_type,
            format!("expected a number, got {}", value),
        )
    })
}

/// Bytes from hex or base64 text, or an array of byte values.
fn byte_string(def: &SimpleFieldDefinition, value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) => decode_text_bytes(s).ok_or_else(|| {
            Error::field_conversion(&def.name, def.field_type, "text is neither hex nor base64")
        }),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| {
                        Error::field_conversion(
                            &def.name,
                            def.field_type,
                            format!("byte array element {} is not in 0..=255", item),
                        )
                    })
            })
            .collect(),
        _ => Err(Error::field_conversion(
            &def.name,
            def.field_type,
            format!("expected hex, base64 or a byte array, got {}", value),
        )),
    }
}

/// Hex wins when the text is an even-length run of hex digits.
fn decode_text_bytes(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return hex::decode(text).ok();
    }
    base64::engine::general_purpose::STANDARD.decode(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(def: SimpleFieldDefinition, value: Value) -> Result<Bytes> {
        let mut input = serde_json::Map::new();
        input.insert(def.name.clone(), value);
        encode_with_field_table(&Value::Object(input), &[def])
    }

    #[test]
    fn test_encode_string_scenario() {
        let table = [SimpleFieldDefinition::new(1, "name", ScalarType::String)];
        let encoded = encode_with_field_table(&json!({"name": "Amy"}), &table).unwrap();
        assert_eq!(&encoded[..], &[0x0A, 0x03, 0x41, 0x6D, 0x79]);
    }

    #[test]
    fn test_encode_varint_types() {
        let def = SimpleFieldDefinition::new(1, "v", ScalarType::Int32);
        assert_eq!(&single(def.clone(), json!(150)).unwrap()[..], &[0x08, 0x96, 0x01]);
        assert_eq!(
            &single(def, json!(-1)).unwrap()[..],
            &[0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );

        let def = SimpleFieldDefinition::new(2, "v", ScalarType::Sint32);
        assert_eq!(&single(def, json!(-1)).unwrap()[..], &[0x10, 0x01]);

        let def = SimpleFieldDefinition::new(3, "v", ScalarType::Bool);
        assert_eq!(&single(def, json!(true)).unwrap()[..], &[0x18, 0x01]);

        let def = SimpleFieldDefinition::new(4, "v", ScalarType::Uint64);
        assert_eq!(
            &single(def, json!("18446744073709551615")).unwrap()[..],
            &[0x20, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );
    }

    #[test]
    fn test_float_out_of_range_fails() {
        let def = SimpleFieldDefinition::new(1, "w", ScalarType::Float);
        assert!(matches!(
            single(def.clone(), json!(1e300)),
            Err(Error::FieldConversion { ref field, .. }) if field == "w"
        ));
        assert!(single(def.clone(), json!(-1e39)).is_err());

        // Largest finite f32 still fits
        let encoded = single(def.clone(), json!(f32::MAX as f64)).unwrap();
        assert_eq!(&encoded[1..], &f32::MAX.to_le_bytes());
        let encoded = single(def, json!("Infinity")).unwrap();
        assert_eq!(&encoded[1..], &f32::INFINITY.to_le_bytes());
    }

    #[test]
    fn test_encode_fixed_types() {
        let def = SimpleFieldDefinition::new(1, "v", ScalarType::Fixed32);
        assert_eq!(
            &single(def, json!(1)).unwrap()[..],
            &[0x0D, 0x01, 0x00, 0x00, 0x00]
        );

        let def = SimpleFieldDefinition::new(1, "v", ScalarType::Double);
        let mut expected = vec![0x09];
        expected.extend(1.5f64.to_le_bytes());
        assert_eq!(&single(def, json!(1.5)).unwrap()[..], &expected[..]);

        let def = SimpleFieldDefinition::new(1, "v", ScalarType::Float);
        let encoded = single(def, json!("-Infinity")).unwrap();
        assert_eq!(&encoded[1..], &f32::NEG_INFINITY.to_le_bytes());

        let def = SimpleFieldDefinition::new(1, "v", ScalarType::Sfixed64);
        let encoded = single(def, json!(-2)).unwrap();
        assert_eq!(&encoded[1..], &(-2i64).to_le_bytes());
    }

    #[test]
    fn test_encode_bytes_auto_detect() {
        let def = SimpleFieldDefinition::new(1, "b", ScalarType::Bytes);
        assert_eq!(
            &single(def.clone(), json!("deadbeef")).unwrap()[..],
            &[0x0A, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert_eq!(
            &single(def.clone(), json!("3q2+7w==")).unwrap()[..],
            &[0x0A, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert_eq!(
            &single(def.clone(), json!([1, 2, 255])).unwrap()[..],
            &[0x0A, 0x03, 0x01, 0x02, 0xFF]
        );
        assert!(single(def.clone(), json!("not bytes!")).is_err());
        assert!(single(def, json!([256])).is_err());
    }

    #[test]
    fn test_encode_repeated_unpacked() {
        let table = [SimpleFieldDefinition::new(4, "ids", ScalarType::Int32).repeated()];
        let encoded = encode_with_field_table(&json!({"ids": [1, 2, 3]}), &table).unwrap();
        assert_eq!(&encoded[..], &[0x20, 0x01, 0x20, 0x02, 0x20, 0x03]);

        assert!(matches!(
            encode_with_field_table(&json!({"ids": 1}), &table),
            Err(Error::FieldConversion { .. })
        ));
    }

    #[test]
    fn test_encode_skips_missing_and_null() {
        let table = [
            SimpleFieldDefinition::new(1, "a", ScalarType::String),
            SimpleFieldDefinition::new(2, "b", ScalarType::Int64),
        ];
        let encoded =
            encode_with_field_table(&json!({"a": null, "b": 7, "extra": true}), &table).unwrap();
        assert_eq!(&encoded[..], &[0x10, 0x07]);
    }

    #[test]
    fn test_encode_follows_table_order() {
        let table = [
            SimpleFieldDefinition::new(2, "second", ScalarType::Uint32),
            SimpleFieldDefinition::new(1, "first", ScalarType::Uint32),
        ];
        let encoded = encode_with_field_table(&json!({"first": 1, "second": 2}), &table).unwrap();
        assert_eq!(&encoded[..], &[0x10, 0x02, 0x08, 0x01]);
    }

    #[test]
    fn test_encode_conversion_failures() {
        let def = SimpleFieldDefinition::new(1, "n", ScalarType::Int32);
        assert!(single(def.clone(), json!("abc")).is_err());
        assert!(single(def.clone(), json!(1.5)).is_err());
        assert!(single(def, json!(1u64 << 31)).is_err());

        let def = SimpleFieldDefinition::new(1, "n", ScalarType::Uint32);
        assert!(single(def, json!(-1)).is_err());

        let def = SimpleFieldDefinition::new(1, "s", ScalarType::String);
        let err = single(def, json!(5)).unwrap_err();
        assert_eq!(err.to_string(), "field 's' (string): expected a string, got 5");
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        let table = [SimpleFieldDefinition::new(0, "zero", ScalarType::Bool)];
        assert!(matches!(
            encode_with_field_table(&json!({"zero": true}), &table),
            Err(Error::InvalidFieldNumber { .. })
        ));
        assert!(matches!(
            encode_with_field_table(&json!([1, 2]), &table),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_encode_integer_from_string() {
        let def = SimpleFieldDefinition::new(1, "n", ScalarType::Int64);
        assert_eq!(
            &single(def, json!(" 300 ")).unwrap()[..],
            &[0x08, 0xAC, 0x02]
        );
    }
}
