//! Renders descriptor protos as `.proto` source text.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::fmt::Write as FmtWrite;

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtoSyntax {
    Proto2,
    Proto3,
}

impl ProtoSyntax {
    fn from_descriptor(proto: &FileDescriptorProto) -> Self {
        match proto.syntax() {
            "proto3" => ProtoSyntax::Proto3,
            _ => ProtoSyntax::Proto2,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

/// Writes a file descriptor as `.proto` text
pub(crate) struct ProtoTextWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    indent_str: &'a str,
    indent_level: usize,
    syntax: ProtoSyntax,
}

impl<'a, W: FmtWrite> ProtoTextWriter<'a, W> {
    pub(crate) fn new(writer: &'a mut W, indent_str: &'a str) -> Self {
        Self {
            writer,
            indent_str,
            indent_level: 0,
            syntax: ProtoSyntax::Proto3,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            self.writer.write_str(self.indent_str)?;
        }
        Ok(())
    }

    pub(crate) fn write_file(&mut self, proto: &FileDescriptorProto) -> std::fmt::Result {
        self.syntax = ProtoSyntax::from_descriptor(proto);

        writeln!(self.writer, "syntax = \"{}\";", self.syntax.as_str())?;
        writeln!(self.writer)?;

        if !proto.package().is_empty() {
            writeln!(self.writer, "package {};", proto.package())?;
            writeln!(self.writer)?;
        }

        for (i, message) in proto.message_type.iter().enumerate() {
            if i > 0 {
                writeln!(self.writer)?;
            }
            self.write_message(message)?;
        }

        Ok(())
    }

    fn write_message(&mut self, message: &DescriptorProto) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name())?;
        self.indent();

        for nested in &message.nested_type {
            self.write_message(nested)?;
            writeln!(self.writer)?;
        }

        for field in &message.field {
            self.write_field(field)?;
        }

        self.dedent();
        self.write_indent()?;
        writeln!(self.writer, "}}")
    }

    fn write_field(&mut self, field: &FieldDescriptorProto) -> std::fmt::Result {
        self.write_indent()?;

        let label = self.field_label(field);
        if !label.is_empty() {
            write!(self.writer, "{} ", label)?;
        }

        writeln!(
            self.writer,
            "{} {} = {};",
            field_type_name(field),
            field.name(),
            field.number()
        )
    }

    fn field_label(&self, field: &FieldDescriptorProto) -> &'static str {
        match field.label() {
            Label::Repeated => "repeated",
            Label::Required => "required",
            Label::Optional => match self.syntax {
                ProtoSyntax::Proto2 => "optional",
                ProtoSyntax::Proto3 => "",
            },
        }
    }
}

fn field_type_name(field: &FieldDescriptorProto) -> String {
    match field.r#type() {
        Type::Double => "double".to_string(),
        Type::Float => "float".to_string(),
        Type::Int64 => "int64".to_string(),
        Type::Uint64 => "uint64".to_string(),
        Type::Int32 => "int32".to_string(),
        Type::Fixed64 => "fixed64".to_string(),
        Type::Fixed32 => "fixed32".to_string(),
        Type::Bool => "bool".to_string(),
        Type::String => "string".to_string(),
        Type::Bytes => "bytes".to_string(),
        Type::Uint32 => "uint32".to_string(),
        Type::Sfixed32 => "sfixed32".to_string(),
        Type::Sfixed64 => "sfixed64".to_string(),
        Type::Sint32 => "sint32".to_string(),
        Type::Sint64 => "sint64".to_string(),
        Type::Group => "group".to_string(),
        // Generated types are declared inside the message that uses them
        Type::Message | Type::Enum => field
            .type_name()
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(name: &str, number: i32, label: Label, ty: Type) -> FieldDescriptorProto {
        FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            label: Some(label as i32),
            r#type: Some(ty as i32),
            ..Default::default()
        }
    }

    fn render(proto: &FileDescriptorProto, indent: &str) -> String {
        let mut out = String::new();
        ProtoTextWriter::new(&mut out, indent).write_file(proto).unwrap();
        out
    }

    #[test]
    fn test_write_proto3_message() {
        let proto = FileDescriptorProto {
            package: Some("demo".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![DescriptorProto {
                name: Some("Point".to_string()),
                field: vec![
                    field("x", 1, Label::Optional, Type::Sint32),
                    field("tags", 2, Label::Repeated, Type::String),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            render(&proto, "  "),
            "syntax = \"proto3\";\n\npackage demo;\n\nmessage Point {\n  sint32 x = 1;\n  repeated string tags = 2;\n}\n"
        );
    }

    #[test]
    fn test_write_nested_message_and_proto2_labels() {
        let mut child_ref = field("child", 1, Label::Optional, Type::Message);
        child_ref.type_name = Some(".demo.Outer.Child".to_string());

        let proto = FileDescriptorProto {
            message_type: vec![DescriptorProto {
                name: Some("Outer".to_string()),
                field: vec![child_ref],
                nested_type: vec![DescriptorProto {
                    name: Some("Child".to_string()),
                    field: vec![field("id", 1, Label::Required, Type::Fixed64)],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(
            render(&proto, "    "),
            "syntax = \"proto2\";\n\nmessage Outer {\n    message Child {\n        required fixed64 id = 1;\n    }\n\n    optional Child child = 1;\n}\n"
        );
    }
}
