//! Schema inference and `.proto` generation.
//!
//! Two sources are supported:
//!
//! - a decoded field tree, where each field number's type comes from the
//!   selected interpretation of its first occurrence and a second occurrence
//!   marks it `repeated`;
//! - a structured object, where types follow the shape of the values and
//!   nested objects become nested message types.
//!
//! Both produce a [`MessageSchema`], which is lowered to a `prost-types`
//! [`FileDescriptorProto`] and rendered as text. The descriptor can be checked
//! with `prost-reflect` via [`SchemaInferencer::file_descriptor`].

mod object;
mod writer;

use crate::decode::{DecodedField, InterpretationKind};
use crate::error::{Error, Result};
use crate::table::{ScalarType, SimpleFieldDefinition};
use prost::Message;
use prost_reflect::{DescriptorPool, FileDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet};
use serde_json::Value;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::debug;
use writer::ProtoTextWriter;

/// Configuration for schema generation
#[derive(Debug, Clone)]
pub struct SchemaConfig {
    /// Package declaration (empty for none)
    pub package: String,
    /// Name of the top-level message
    pub message_name: String,
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            package: "decoded".to_string(),
            message_name: "DecodedMessage".to_string(),
            indent_str: "  ".to_string(),
        }
    }
}

impl SchemaConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the package name
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Sets the top-level message name
    pub fn message_name(mut self, name: impl Into<String>) -> Self {
        self.message_name = name.into();
        self
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }
}

/// Type inferred for a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferredType {
    /// A protobuf scalar
    Scalar(ScalarType),
    /// A nested message type, by simple name
    Message(String),
}

/// An inferred field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field number
    pub number: u32,
    /// Field name
    pub name: String,
    /// Inferred type
    pub inferred_type: InferredType,
    /// Seen more than once, or built from an array
    pub repeated: bool,
}

impl FieldDescriptor {
    /// Field-table entry for this field, if it has a scalar type
    pub fn to_definition(&self) -> Option<SimpleFieldDefinition> {
        match self.inferred_type {
            InferredType::Scalar(ty) => Some(SimpleFieldDefinition {
                number: self.number,
                name: self.name.clone(),
                field_type: ty,
                repeated: self.repeated,
            }),
            InferredType::Message(_) => None,
        }
    }

    fn to_proto(&self, scope: &str) -> FieldDescriptorProto {
        let label = if self.repeated {
            Label::Repeated
        } else {
            Label::Optional
        };
        let (ty, type_name) = match &self.inferred_type {
            InferredType::Scalar(ty) => (ty.proto_type(), None),
            InferredType::Message(name) => (Type::Message, Some(format!("{}.{}", scope, name))),
        };

        FieldDescriptorProto {
            name: Some(self.name.clone()),
            number: Some(self.number as i32),
            label: Some(label as i32),
            r#type: Some(ty as i32),
            type_name,
            ..Default::default()
        }
    }
}

/// An inferred message type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSchema {
    /// Message name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
    /// Nested message types
    pub nested: Vec<MessageSchema>,
}

impl MessageSchema {
    /// Creates an empty message schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// Lower to a descriptor; `parent` is the fully-qualified enclosing scope
    fn to_proto(&self, parent: &str) -> DescriptorProto {
        let scope = format!("{}.{}", parent, self.name);
        DescriptorProto {
            name: Some(self.name.clone()),
            field: self.fields.iter().map(|f| f.to_proto(&scope)).collect(),
            nested_type: self.nested.iter().map(|m| m.to_proto(&scope)).collect(),
            ..Default::default()
        }
    }
}

/// Infer one descriptor per field number, sorted by number.
///
/// The first occurrence of a number decides its type; later occurrences only
/// mark it repeated.
pub fn infer_descriptors(fields: &[DecodedField<'_>]) -> Vec<FieldDescriptor> {
    let mut seen: BTreeMap<u32, FieldDescriptor> = BTreeMap::new();

    for field in fields {
        match seen.entry(field.number) {
            Entry::Occupied(mut entry) => entry.get_mut().repeated = true,
            Entry::Vacant(entry) => {
                entry.insert(FieldDescriptor {
                    number: field.number,
                    name: format!("field_{}", field.number),
                    inferred_type: InferredType::Scalar(scalar_type_of(field)),
                    repeated: false,
                });
            }
        }
    }

    seen.into_values().collect()
}

/// Field table matching the descriptors inferred from a decoded tree.
pub fn infer_field_table(fields: &[DecodedField<'_>]) -> Vec<SimpleFieldDefinition> {
    infer_descriptors(fields)
        .iter()
        .filter_map(FieldDescriptor::to_definition)
        .collect()
}

fn scalar_type_of(field: &DecodedField<'_>) -> ScalarType {
    match field.primary().map(|i| i.kind) {
        Some(InterpretationKind::Uint64) => ScalarType::Int64,
        Some(InterpretationKind::Sint64) => ScalarType::Sint64,
        Some(InterpretationKind::Bool) => ScalarType::Bool,
        Some(InterpretationKind::Fixed64) => ScalarType::Fixed64,
        Some(InterpretationKind::Double) => ScalarType::Double,
        Some(InterpretationKind::Sfixed64) => ScalarType::Sfixed64,
        Some(InterpretationKind::Fixed32) => ScalarType::Fixed32,
        Some(InterpretationKind::Float) => ScalarType::Float,
        Some(InterpretationKind::Sfixed32) => ScalarType::Sfixed32,
        Some(InterpretationKind::String) => ScalarType::String,
        // Probed sub-messages are declared as bytes, without nested types
        Some(InterpretationKind::Message | InterpretationKind::Bytes) | None => ScalarType::Bytes,
    }
}

/// Infers schemas and renders them as `.proto` text
#[derive(Debug, Clone, Default)]
pub struct SchemaInferencer {
    config: SchemaConfig,
}

impl SchemaInferencer {
    /// Creates a new inferencer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new inferencer with custom configuration
    pub fn with_config(config: SchemaConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration
    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Message schema for a decoded field tree
    pub fn message_from_decoded(&self, fields: &[DecodedField<'_>]) -> MessageSchema {
        MessageSchema {
            name: self.config.message_name.clone(),
            fields: infer_descriptors(fields),
            nested: Vec::new(),
        }
    }

    /// Message schema for a structured object
    pub fn message_from_object(&self, value: &Value) -> Result<MessageSchema> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_input("schema inference needs a JSON object"))?;
        Ok(object::infer_message(&self.config.message_name, object))
    }

    /// Wrap a message schema in a file descriptor
    pub fn file_descriptor_proto(&self, message: &MessageSchema) -> FileDescriptorProto {
        let package = &self.config.package;
        let root_scope = if package.is_empty() {
            String::new()
        } else {
            format!(".{}", package)
        };
        let file_name = if package.is_empty() {
            format!("{}.proto", message.name)
        } else {
            format!("{}.proto", package.replace('.', "/"))
        };

        FileDescriptorProto {
            name: Some(file_name),
            package: (!package.is_empty()).then(|| package.clone()),
            syntax: Some("proto3".to_string()),
            message_type: vec![message.to_proto(&root_scope)],
            ..Default::default()
        }
    }

    /// Render a file descriptor as `.proto` text
    pub fn render(&self, proto: &FileDescriptorProto) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail
        let _ = ProtoTextWriter::new(&mut output, &self.config.indent_str).write_file(proto);
        output
    }

    /// Schema text for a decoded field tree
    pub fn generate_from_decoded(&self, fields: &[DecodedField<'_>]) -> String {
        let message = self.message_from_decoded(fields);
        debug!("Inferred {} fields from decoded tree", message.fields.len());
        self.render(&self.file_descriptor_proto(&message))
    }

    /// Schema text for a structured object
    pub fn generate_from_object(&self, value: &Value) -> Result<String> {
        let message = self.message_from_object(value)?;
        debug!(
            "Inferred {} fields and {} nested types from object",
            message.fields.len(),
            message.nested.len()
        );
        Ok(self.render(&self.file_descriptor_proto(&message)))
    }

    /// Resolve a generated file descriptor with prost-reflect
    pub fn file_descriptor(&self, proto: &FileDescriptorProto) -> Result<FileDescriptor> {
        let fds = FileDescriptorSet {
            file: vec![proto.clone()],
        };

        let mut fds_bytes = Vec::new();
        fds.encode(&mut fds_bytes).map_err(|e| {
            Error::descriptor_build(format!("failed to encode descriptor set: {}", e))
        })?;

        let pool = DescriptorPool::decode(fds_bytes.as_slice()).map_err(|e| {
            Error::descriptor_build(format!("failed to decode descriptor pool: {}", e))
        })?;

        pool.get_file_by_name(proto.name())
            .ok_or_else(|| Error::descriptor_build("file not found in pool"))
    }
}

/// Schema text for a decoded field tree, with default configuration.
pub fn generate_proto_from_decoded_fields(fields: &[DecodedField<'_>]) -> String {
    SchemaInferencer::new().generate_from_decoded(fields)
}

/// Schema text for a structured object, with default configuration.
pub fn generate_proto_from_object(value: &Value) -> Result<String> {
    SchemaInferencer::new().generate_from_object(value)
}
