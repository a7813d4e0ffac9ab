//! Schema inference from structured objects.

use super::{FieldDescriptor, InferredType, MessageSchema};
use crate::table::ScalarType;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Build a message schema from the members of an object.
///
/// Members are numbered from 1 in insertion order. `null` members are left
/// out but still consume their number.
pub(super) fn infer_message(name: &str, object: &Map<String, Value>) -> MessageSchema {
    let mut message = MessageSchema::new(name);
    let mut scope = Scope::default();
    scope.names.insert(name.to_string());

    for (index, (key, value)) in object.iter().enumerate() {
        let number = index as u32 + 1;

        let (element, repeated) = match value {
            Value::Null => continue,
            Value::Array(items) => (items.iter().find(|v| !v.is_null()), true),
            other => (Some(other), false),
        };

        let field_name = scope.field_name(identifier(key, number), number);

        let inferred_type = match element {
            Some(Value::Object(members)) => {
                let type_name = scope.type_name(pascal_case(key, number), number);
                message.nested.push(infer_message(&type_name, members));
                InferredType::Message(type_name)
            }
            Some(scalar) => InferredType::Scalar(scalar_type(scalar)),
            None => InferredType::Scalar(ScalarType::String),
        };

        message.fields.push(FieldDescriptor {
            number,
            name: field_name,
            inferred_type,
            repeated,
        });
    }

    message
}

/// Names declared inside one message.
///
/// Fields and nested types share `names`. Fields must also differ once
/// underscores and case are ignored, since that form backs the JSON name.
#[derive(Default)]
struct Scope {
    names: HashSet<String>,
    folded_field_names: HashSet<String>,
}

impl Scope {
    fn field_name(&mut self, base: String, number: u32) -> String {
        let name = first_free(base, number, "_", |candidate| {
            self.names.contains(candidate)
                || self.folded_field_names.contains(&fold(candidate))
        });
        self.folded_field_names.insert(fold(&name));
        self.names.insert(name.clone());
        name
    }

    fn type_name(&mut self, base: String, number: u32) -> String {
        let name = first_free(base, number, "", |candidate| self.names.contains(candidate));
        self.names.insert(name.clone());
        name
    }
}

/// `base`, else `base` with the field number, else that with a counter
fn first_free(base: String, number: u32, separator: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(&base) {
        return base;
    }
    let numbered = format!("{}{}{}", base, separator, number);
    if !taken(&numbered) {
        return numbered;
    }
    (2u32..)
        .map(|n| format!("{}_{}", numbered, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(numbered)
}

/// Lowercase with underscores removed
fn fold(name: &str) -> String {
    name.chars()
        .filter(|&c| c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn scalar_type(value: &Value) -> ScalarType {
    match value {
        Value::Bool(_) => ScalarType::Bool,
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                if i32::try_from(v).is_ok() {
                    ScalarType::Int32
                } else {
                    ScalarType::Int64
                }
            } else if n.is_u64() {
                ScalarType::Uint64
            } else {
                ScalarType::Double
            }
        }
        // Nested arrays have no protobuf counterpart
        _ => ScalarType::String,
    }
}

/// Field name usable as a protobuf identifier
fn identifier(key: &str, number: u32) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    match sanitized.chars().next() {
        None => format!("field_{}", number),
        Some(c) if c.is_ascii_digit() => format!("field_{}", sanitized),
        Some(_) => sanitized,
    }
}

/// Message type name derived from a member key
fn pascal_case(key: &str, number: u32) -> String {
    let mut name = String::with_capacity(key.len());
    for word in key.split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.push(first.to_ascii_uppercase());
            name.extend(chars);
        }
    }

    match name.chars().next() {
        None => format!("Message{}", number),
        Some(c) if c.is_ascii_digit() => format!("Message{}", name),
        Some(_) => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(value: Value) -> MessageSchema {
        match value {
            Value::Object(members) => infer_message("Root", &members),
            _ => unreachable!(),
        }
    }

    fn scalar(message: &MessageSchema, index: usize) -> (u32, &str, ScalarType, bool) {
        let field = &message.fields[index];
        match field.inferred_type {
            InferredType::Scalar(ty) => (field.number, field.name.as_str(), ty, field.repeated),
            InferredType::Message(_) => panic!("field {} is a message", field.name),
        }
    }

    #[test]
    fn test_numeric_ranges() {
        let message = infer(json!({
            "small": -5,
            "edge": 2147483647,
            "wide": -2147483649i64,
            "huge": 18446744073709551615u64,
            "ratio": 0.25
        }));
        assert_eq!(scalar(&message, 0).2, ScalarType::Int32);
        assert_eq!(scalar(&message, 1).2, ScalarType::Int32);
        assert_eq!(scalar(&message, 2).2, ScalarType::Int64);
        assert_eq!(scalar(&message, 3).2, ScalarType::Uint64);
        assert_eq!(scalar(&message, 4).2, ScalarType::Double);
    }

    #[test]
    fn test_null_consumes_number() {
        let message = infer(json!({"a": 1, "b": null, "c": "x"}));
        assert_eq!(message.fields.len(), 2);
        assert_eq!(scalar(&message, 1), (3, "c", ScalarType::String, false));
    }

    #[test]
    fn test_arrays() {
        let message = infer(json!({
            "empty": [],
            "nulls_first": [null, true],
            "nested": [[1, 2]],
        }));
        assert_eq!(scalar(&message, 0), (1, "empty", ScalarType::String, true));
        assert_eq!(scalar(&message, 1), (2, "nulls_first", ScalarType::Bool, true));
        assert_eq!(scalar(&message, 2), (3, "nested", ScalarType::String, true));
    }

    #[test]
    fn test_nested_type_names() {
        let message = infer(json!({
            "home-address": {"city": "x"},
            "home_address": {"city": "y"},
            "root": {"id": 1}
        }));

        let names: Vec<_> = message.nested.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["HomeAddress", "HomeAddress2", "Root3"]);
        assert_eq!(
            message.fields[1].inferred_type,
            InferredType::Message("HomeAddress2".to_string())
        );
        // Both keys sanitize to the same identifier
        assert_eq!(message.fields[0].name, "home_address");
        assert_eq!(message.fields[1].name, "home_address_2");
    }

    #[test]
    fn test_suffixed_names_stay_unique() {
        let message = infer(json!({"x_y_3": 1, "x_y": 2, "x y": 3}));
        let names: Vec<_> = message.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x_y_3", "x_y", "x_y_3_2"]);

        let message = infer(json!({
            "home_address3": {"a": 1},
            "home_address": {"b": 2},
            "home-address": {"c": 3}
        }));
        let types: Vec<_> = message.nested.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(types, vec!["HomeAddress3", "HomeAddress", "HomeAddress3_2"]);
        let names: Vec<_> = message.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["home_address3", "home_address", "home_address_3_2"]);
    }

    #[test]
    fn test_fields_and_types_share_scope() {
        let message = infer(json!({"Address": "x", "address": {"city": "y"}}));
        assert_eq!(message.fields[0].name, "Address");
        // Same folded form as "Address"
        assert_eq!(message.fields[1].name, "address_2");
        assert_eq!(
            message.fields[1].inferred_type,
            InferredType::Message("Address2".to_string())
        );
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("home_address_3"), "homeaddress3");
        assert_eq!(fold("homeAddress3"), "homeaddress3");
    }

    #[test]
    fn test_identifier_sanitizing() {
        assert_eq!(identifier("user id", 1), "user_id");
        assert_eq!(identifier("2fa", 4), "field_2fa");
        assert_eq!(identifier("", 7), "field_7");
        assert_eq!(identifier("ünï", 2), "_n_");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("shipping_address", 1), "ShippingAddress");
        assert_eq!(pascal_case("line-items", 1), "LineItems");
        assert_eq!(pascal_case("3d", 2), "Message3d");
        assert_eq!(pascal_case("--", 5), "Message5");
    }
}
