//! Field-table decoding.

use super::{ScalarType, SimpleFieldDefinition};
use crate::decode::MAX_SAFE_INTEGER;
use crate::error::{Error, Result};
use crate::wire::{decode_zigzag, read_varint, RawValue, WireReader, WireType};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Decode `data` into a structured object using an explicit field table.
///
/// The declared type of each field drives its conversion; a wire type that
/// cannot carry the declared type is an error. Numeric fields may also arrive
/// packed. Undeclared fields are named `field_<number>` and decoded from their
/// wire type alone. Repeated occurrences of one field number are collected
/// into an array, and repeated definitions always produce arrays.
pub fn decode_with_field_table(
    data: &[u8],
    table: &[SimpleFieldDefinition],
) -> Result<Map<String, Value>> {
    let by_number: HashMap<u32, &SimpleFieldDefinition> =
        table.iter().map(|def| (def.number, def)).collect();

    let mut out = Map::new();

    for raw in WireReader::new(data) {
        let raw = raw?;

        let (name, field_type, repeated) = match by_number.get(&raw.number) {
            Some(def) => (def.name.clone(), def.field_type, def.repeated),
            None => {
                trace!("Field {} is not in the field table", raw.number);
                (
                    format!("field_{}", raw.number),
                    ScalarType::fallback_for(raw.wire_type()),
                    false,
                )
            }
        };

        match raw.value {
            RawValue::Bytes(payload) if field_type.is_packable() => {
                let values = unpack(&name, field_type, payload)?;
                trace!("Unpacked {} values for field {}", values.len(), raw.number);
                merge(&mut out, name, values, true);
            }
            value => {
                let converted = convert(&name, field_type, &value)?;
                merge(&mut out, name, vec![converted], repeated);
            }
        }
    }

    debug!("Decoded {} members from {} bytes", out.len(), data.len());
    Ok(out)
}

fn merge(out: &mut Map<String, Value>, name: String, values: Vec<Value>, as_array: bool) {
    match out.get_mut(&name) {
        Some(Value::Array(existing)) => existing.extend(values),
        Some(existing) => {
            let first = existing.take();
            let mut items = vec![first];
            items.extend(values);
            *existing = Value::Array(items);
        }
        None => {
            let value = if as_array || values.len() != 1 {
                Value::Array(values)
            } else {
                values.into_iter().next().unwrap_or(Value::Null)
            };
            out.insert(name, value);
        }
    }
}

/// Convert one payload according to its declared type.
fn convert(name: &str, ty: ScalarType, value: &RawValue<'_>) -> Result<Value> {
    let converted = match (ty, *value) {
        (ScalarType::Int32 | ScalarType::Enum, RawValue::Varint(v)) => Value::from(v as i32),
        (ScalarType::Int64, RawValue::Varint(v)) => signed_64(v as i64),
        (ScalarType::Uint32, RawValue::Varint(v)) => Value::from(v as u32),
        (ScalarType::Uint64, RawValue::Varint(v)) => unsigned_64(v),
        (ScalarType::Sint32, RawValue::Varint(v)) => Value::from(decode_zigzag(v) as i32),
        (ScalarType::Sint64, RawValue::Varint(v)) => signed_64(decode_zigzag(v)),
        (ScalarType::Bool, RawValue::Varint(v)) => Value::Bool(v != 0),
        (ScalarType::Fixed32, RawValue::Fixed32(v)) => Value::from(v),
        (ScalarType::Sfixed32, RawValue::Fixed32(v)) => Value::from(v as i32),
        (ScalarType::Float, RawValue::Fixed32(v)) => float(f32::from_bits(v) as f64),
        (ScalarType::Fixed64, RawValue::Fixed64(v)) => unsigned_64(v),
        (ScalarType::Sfixed64, RawValue::Fixed64(v)) => signed_64(v as i64),
        (ScalarType::Double, RawValue::Fixed64(v)) => float(f64::from_bits(v)),
        (ScalarType::String, RawValue::Bytes(b)) => {
            let text = std::str::from_utf8(b).map_err(|e| {
                Error::field_conversion(name, ty, format!("payload is not valid UTF-8: {}", e))
            })?;
            Value::String(text.to_owned())
        }
        (ScalarType::Bytes, RawValue::Bytes(b)) => Value::String(hex::encode(b)),
        (ty, value) => {
            return Err(Error::field_conversion(
                name,
                ty,
                format!(
                    "wire type {} cannot carry the declared type (expected {})",
                    value.wire_type(),
                    ty.wire_type()
                ),
            ))
        }
    };

    Ok(converted)
}

/// Split a packed run of numeric values.
fn unpack(name: &str, ty: ScalarType, payload: &[u8]) -> Result<Vec<Value>> {
    let mut values = Vec::new();

    match ty.wire_type() {
        WireType::Varint => {
            let mut offset = 0;
            while offset < payload.len() {
                let (v, len) = read_varint(payload, offset).ok_or_else(|| {
                    Error::field_conversion(name, ty, "packed run ends in a truncated varint")
                })?;
                offset += len;
                values.push(convert(name, ty, &RawValue::Varint(v))?);
            }
        }
        WireType::Fixed32 => {
            if payload.len() % 4 != 0 {
                return Err(Error::field_conversion(
                    name,
                    ty,
                    format!("packed run of {} bytes is not a multiple of 4", payload.len()),
                ));
            }
            for chunk in payload.chunks_exact(4) {
                let v = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                values.push(convert(name, ty, &RawValue::Fixed32(v))?);
            }
        }
        WireType::Fixed64 => {
            if payload.len() % 8 != 0 {
                return Err(Error::field_conversion(
                    name,
                    ty,
                    format!("packed run of {} bytes is not a multiple of 8", payload.len()),
                ));
            }
            for chunk in payload.chunks_exact(8) {
                let mut le = [0u8; 8];
                le.copy_from_slice(chunk);
                values.push(convert(name, ty, &RawValue::Fixed64(u64::from_le_bytes(le)))?);
            }
        }
        WireType::LengthDelimited => {
            return Err(Error::field_conversion(name, ty, "type cannot be packed"));
        }
    }

    Ok(values)
}

fn signed_64(v: i64) -> Value {
    if v.unsigned_abs() <= MAX_SAFE_INTEGER {
        Value::from(v)
    } else {
        Value::String(v.to_string())
    }
}

fn unsigned_64(v: u64) -> Value {
    if v <= MAX_SAFE_INTEGER {
        Value::from(v)
    } else {
        Value::String(v.to_string())
    }
}

fn float(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::encode_with_field_table;
    use proptest::prelude::*;
    use serde_json::json;

    fn person_table() -> Vec<SimpleFieldDefinition> {
        vec![
            SimpleFieldDefinition::new(1, "name", ScalarType::String),
            SimpleFieldDefinition::new(2, "id", ScalarType::Int32),
            SimpleFieldDefinition::new(3, "email", ScalarType::String),
            SimpleFieldDefinition::new(4, "scores", ScalarType::Sint64).repeated(),
            SimpleFieldDefinition::new(5, "ratio", ScalarType::Double),
            SimpleFieldDefinition::new(6, "active", ScalarType::Bool),
            SimpleFieldDefinition::new(7, "avatar", ScalarType::Bytes),
            SimpleFieldDefinition::new(8, "serial", ScalarType::Fixed64),
            SimpleFieldDefinition::new(9, "weight", ScalarType::Float),
            SimpleFieldDefinition::new(10, "offset", ScalarType::Sfixed32),
            SimpleFieldDefinition::new(11, "kind", ScalarType::Enum),
        ]
    }

    #[test]
    fn test_round_trip() {
        let input = json!({
            "name": "Amy",
            "id": -42,
            "email": "amy@example.com",
            "scores": [1, -1, 9007199254740991i64, "-9223372036854775808"],
            "ratio": 0.25,
            "active": true,
            "avatar": "cafebabe",
            "serial": "18446744073709551615",
            "weight": -2.5,
            "offset": -7,
            "kind": 3
        });
        let table = person_table();
        let encoded = encode_with_field_table(&input, &table).unwrap();
        let decoded = decode_with_field_table(&encoded, &table).unwrap();
        assert_eq!(Value::Object(decoded), input);
    }

    #[test]
    fn test_decode_scenario_bytes() {
        let decoded =
            decode_with_field_table(&[0x0A, 0x03, 0x41, 0x6D, 0x79], &person_table()).unwrap();
        assert_eq!(decoded.get("name"), Some(&json!("Amy")));
    }

    #[test]
    fn test_undeclared_fields_fall_back() {
        let data = [
            0x08, 0x96, 0x01, // field 1 varint
            0x12, 0x02, 0xAB, 0xCD, // field 2 len
            0x1D, 0x01, 0x00, 0x00, 0x00, // field 3 fixed32
        ];
        let decoded = decode_with_field_table(&data, &[]).unwrap();
        assert_eq!(
            Value::Object(decoded),
            json!({"field_1": 150, "field_2": "abcd", "field_3": 1})
        );
    }

    #[test]
    fn test_multiple_occurrences_merge_into_array() {
        let table = [SimpleFieldDefinition::new(1, "n", ScalarType::Uint32)];
        let decoded = decode_with_field_table(&[0x08, 0x01, 0x08, 0x02, 0x08, 0x03], &table).unwrap();
        assert_eq!(decoded.get("n"), Some(&json!([1, 2, 3])));
    }

    #[test]
    fn test_repeated_single_occurrence_is_array() {
        let table = [SimpleFieldDefinition::new(1, "n", ScalarType::Uint32).repeated()];
        let decoded = decode_with_field_table(&[0x08, 0x05], &table).unwrap();
        assert_eq!(decoded.get("n"), Some(&json!([5])));
    }

    #[test]
    fn test_packed_repeated() {
        let table = [
            SimpleFieldDefinition::new(4, "ids", ScalarType::Int32).repeated(),
            SimpleFieldDefinition::new(5, "temps", ScalarType::Fixed32).repeated(),
        ];
        let data = [
            0x22, 0x04, 0x03, 0x8E, 0x02, 0x01, // field 4 packed [3, 270, 1]
            0x2A, 0x08, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, // field 5 packed [1, 2]
            0x20, 0x07, // field 4 unpacked 7
        ];
        let decoded = decode_with_field_table(&data, &table).unwrap();
        assert_eq!(decoded.get("ids"), Some(&json!([3, 270, 1, 7])));
        assert_eq!(decoded.get("temps"), Some(&json!([1, 2])));

        assert!(decode_with_field_table(&[0x2A, 0x03, 0x01, 0x02, 0x03], &table).is_err());
        assert!(decode_with_field_table(&[0x22, 0x01, 0x80], &table).is_err());
    }

    #[test]
    fn test_wire_type_mismatch_fails() {
        let table = [SimpleFieldDefinition::new(1, "name", ScalarType::String)];
        let err = decode_with_field_table(&[0x08, 0x01], &table).unwrap_err();
        assert!(matches!(err, Error::FieldConversion { ref field, .. } if field == "name"));

        let table = [SimpleFieldDefinition::new(1, "d", ScalarType::Double)];
        assert!(decode_with_field_table(&[0x0D, 0, 0, 0, 0], &table).is_err());
    }

    #[test]
    fn test_invalid_utf8_string_fails() {
        let table = [SimpleFieldDefinition::new(1, "name", ScalarType::String)];
        assert!(matches!(
            decode_with_field_table(&[0x0A, 0x02, 0xC3, 0x28], &table),
            Err(Error::FieldConversion { .. })
        ));
    }

    #[test]
    fn test_non_finite_floats() {
        let table = [SimpleFieldDefinition::new(1, "d", ScalarType::Double).repeated()];
        let input = json!({"d": ["NaN", "Infinity", "-Infinity", 1.0]});
        let encoded = encode_with_field_table(&input, &table).unwrap();
        let decoded = decode_with_field_table(&encoded, &table).unwrap();
        assert_eq!(Value::Object(decoded), input);
    }

    #[test]
    fn test_large_64_bit_values_become_strings() {
        let table = [SimpleFieldDefinition::new(1, "big", ScalarType::Int64)];
        let input = json!({"big": 9007199254740992i64});
        let encoded = encode_with_field_table(&input, &table).unwrap();
        let decoded = decode_with_field_table(&encoded, &table).unwrap();
        assert_eq!(decoded.get("big"), Some(&json!("9007199254740992")));
    }

    #[test]
    fn test_truncated_input_fails() {
        let table = [SimpleFieldDefinition::new(1, "name", ScalarType::String)];
        assert!(matches!(
            decode_with_field_table(&[0x0A, 0x05, 0x41], &table),
            Err(Error::UnexpectedEof { .. })
        ));
    }

    fn json_i64(v: i64) -> Value {
        if v.unsigned_abs() <= MAX_SAFE_INTEGER {
            json!(v)
        } else {
            json!(v.to_string())
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1_000))]

        #[test]
        fn field_table_round_trips(
            id: i32,
            scores in proptest::collection::vec(any::<i64>(), 1..5),
            ratio in -1e300f64..1e300,
            active: bool,
            name in ".*",
            avatar in proptest::collection::vec(any::<u8>(), 0..32),
            serial: u64,
            offset: i32,
        ) {
            let mut input = Map::new();
            input.insert("name".to_string(), json!(name));
            input.insert("id".to_string(), json!(id));
            input.insert(
                "scores".to_string(),
                Value::Array(scores.iter().map(|&v| json_i64(v)).collect()),
            );
            input.insert("ratio".to_string(), json!(ratio));
            input.insert("active".to_string(), json!(active));
            input.insert("avatar".to_string(), json!(hex::encode(&avatar)));
            input.insert(
                "serial".to_string(),
                if serial <= MAX_SAFE_INTEGER { json!(serial) } else { json!(serial.to_string()) },
            );
            input.insert("offset".to_string(), json!(offset));

            let table = person_table();
            let input = Value::Object(input);
            let encoded = encode_with_field_table(&input, &table).unwrap();
            let decoded = decode_with_field_table(&encoded, &table).unwrap();
            prop_assert_eq!(Value::Object(decoded), input);
        }
    }
}
