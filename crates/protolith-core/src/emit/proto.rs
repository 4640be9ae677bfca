//! Protocol buffer schema emission.
//!
//! A namespace is first lowered to a `prost-types` [`FileDescriptorProto`]
//! and then written out as `.proto` source. Going through descriptors keeps
//! the text and binary outputs consistent, and lets the whole program be
//! checked by `prost-reflect` before anything is written.

use super::{import_path, SchemaEmitter};
use crate::error::{Error, Result};
use crate::ir::{ClassId, ClassProperty, EnumId, FieldLabel, NamespaceGraph, Program, PropertyTypeKind, TypeHandle};
use crate::naming::to_snake_case;
use prost::Message;
use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FieldOptions, FileDescriptorProto, FileDescriptorSet,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtoSyntax {
    /// Proto2 syntax
    #[default]
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

impl fmt::Display for ProtoSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProtoSyntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(ProtoSyntax::Proto2),
            "proto3" => Ok(ProtoSyntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// Configuration for protobuf emission
#[derive(Debug, Clone)]
pub struct ProtoConfig {
    /// Syntax dialect
    pub syntax: ProtoSyntax,
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
}

impl Default for ProtoConfig {
    fn default() -> Self {
        Self {
            syntax: ProtoSyntax::default(),
            indent_str: "  ".to_string(),
        }
    }
}

impl ProtoConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the syntax dialect
    pub fn syntax(mut self, syntax: ProtoSyntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }
}

/// Placement of a type: namespace index and dotted path inside it
type TypePaths = HashMap<TypeHandle, (usize, String)>;

fn type_paths(program: &Program) -> TypePaths {
    fn walk(program: &Program, ns: usize, handle: TypeHandle, path: String, out: &mut TypePaths) {
        for &nested in program.private_types(handle) {
            let nested_path = format!("{}.{}", path, program.short_name(nested));
            walk(program, ns, nested, nested_path, out);
        }
        out.insert(handle, (ns, path));
    }

    let mut out = HashMap::with_capacity(program.type_count());
    for (index, ns) in program.namespaces.iter().enumerate() {
        for handle in ns.top_level() {
            walk(program, index, handle, program.short_name(handle).to_string(), &mut out);
        }
    }
    out
}

/// Emits `.proto` files
#[derive(Debug, Clone, Default)]
pub struct ProtoEmitter {
    config: ProtoConfig,
}

impl ProtoEmitter {
    /// Creates an emitter with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration
    pub fn with_config(mut self, config: ProtoConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the syntax dialect in use
    pub fn syntax(&self) -> ProtoSyntax {
        self.config.syntax
    }

    /// Lowers the namespace at `index` to a file descriptor
    pub fn file_descriptor(&self, program: &Program, index: usize) -> Result<FileDescriptorProto> {
        self.lower_file(program, index, &type_paths(program))
    }

    /// Lowers the whole program, dependencies before their dependents
    pub fn descriptor_set(&self, program: &Program) -> Result<FileDescriptorSet> {
        let paths = type_paths(program);
        let file = dependency_order(program)
            .into_iter()
            .map(|index| self.lower_file(program, index, &paths))
            .collect::<Result<Vec<_>>>()?;
        Ok(FileDescriptorSet { file })
    }

    /// Renders a file descriptor as `.proto` source
    pub fn render(&self, file: &FileDescriptorProto) -> Result<String> {
        let mut output = String::new();
        ProtoWriter::new(&mut output, &self.config, file)
            .write_file(file)
            .map_err(|e| Error::internal(format!("failed to render '{}': {}", file.name(), e)))?;
        Ok(output)
    }

    fn lower_file(&self, program: &Program, index: usize, paths: &TypePaths) -> Result<FileDescriptorProto> {
        let ns = &program.namespaces[index];

        let mut imports = BTreeSet::new();
        for handle in program.namespace_types(index) {
            let TypeHandle::Class(id) = handle else {
                continue;
            };
            for target in program.class(id).properties.iter().filter_map(|p| p.reference) {
                if let Some(&(other, _)) = paths.get(&target) {
                    if other != index {
                        imports.insert(other);
                    }
                }
            }
        }

        let mut message_type = Vec::new();
        for &id in &ns.classes {
            message_type.push(self.lower_message(program, id, paths)?);
        }

        Ok(FileDescriptorProto {
            name: Some(import_path(&ns.full_name, "proto")),
            package: (!ns.full_name.is_empty()).then(|| ns.full_name.clone()),
            dependency: imports
                .into_iter()
                .map(|i| import_path(&program.namespaces[i].full_name, "proto"))
                .collect(),
            message_type,
            enum_type: ns.enums.iter().map(|&id| lower_enum(program, id)).collect(),
            syntax: Some(self.config.syntax.as_str().to_string()),
            ..Default::default()
        })
    }

    fn lower_message(&self, program: &Program, id: ClassId, paths: &TypePaths) -> Result<DescriptorProto> {
        let class = program.class(id);
        let mut message = DescriptorProto {
            name: Some(class.short_name.clone()),
            ..Default::default()
        };

        for &nested in &class.private_types {
            match nested {
                TypeHandle::Class(nested) => {
                    message.nested_type.push(self.lower_message(program, nested, paths)?)
                }
                TypeHandle::Enum(nested) => message.enum_type.push(lower_enum(program, nested)),
            }
        }
        for property in &class.properties {
            message.field.push(self.lower_field(program, &class.original_name, property, paths)?);
        }

        Ok(message)
    }

    fn lower_field(
        &self,
        program: &Program,
        owner: &str,
        property: &ClassProperty,
        paths: &TypePaths,
    ) -> Result<FieldDescriptorProto> {
        let options = property.options;
        let label = match options.label {
            FieldLabel::Repeated => Label::Repeated,
            FieldLabel::Required if self.config.syntax == ProtoSyntax::Proto2 => Label::Required,
            _ => Label::Optional,
        };

        let (ty, type_name) = match property.reference {
            Some(handle) => {
                let (ns, path) = paths.get(&handle).ok_or_else(|| {
                    Error::internal(format!("'{}.{}' references an unplaced type", owner, property.name))
                })?;
                let package = &program.namespaces[*ns].full_name;
                let name = if package.is_empty() {
                    format!(".{}", path)
                } else {
                    format!(".{}.{}", package, path)
                };
                let ty = match handle {
                    TypeHandle::Class(_) => Type::Message,
                    TypeHandle::Enum(_) => Type::Enum,
                };
                (ty, Some(name))
            }
            None => (scalar_type(property.kind).ok_or_else(|| {
                Error::internal(format!("'{}.{}' has no referenced type", owner, property.name))
            })?, None),
        };

        let packable = options.label == FieldLabel::Repeated
            && (property.kind.is_numeric()
                || property.kind == PropertyTypeKind::Bool
                || matches!(property.reference, Some(TypeHandle::Enum(_))));
        // proto3 packs packable fields unless told otherwise
        let packed = match self.config.syntax {
            ProtoSyntax::Proto2 => (packable && options.packed).then_some(true),
            ProtoSyntax::Proto3 => (packable && !options.packed).then_some(false),
        };

        Ok(FieldDescriptorProto {
            name: Some(to_snake_case(&property.name)),
            number: Some(options.order as i32),
            label: Some(label as i32),
            r#type: Some(ty as i32),
            type_name,
            options: packed.map(|packed| FieldOptions {
                packed: Some(packed),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

impl SchemaEmitter for ProtoEmitter {
    fn extension(&self) -> &'static str {
        "proto"
    }

    fn emit_namespace(&self, program: &Program, index: usize) -> Result<String> {
        let file = self.file_descriptor(program, index)?;
        self.render(&file)
    }
}

/// Checks that a descriptor set links, returning the resulting pool
pub fn verify_descriptor_set(set: &FileDescriptorSet) -> Result<DescriptorPool> {
    let pool = DescriptorPool::decode(set.encode_to_vec().as_slice())
        .map_err(|e| Error::DescriptorVerify(e.to_string()))?;
    debug!("Verified {} descriptor files", set.file.len());
    Ok(pool)
}

/// Writes a descriptor set in its binary encoding
pub fn write_descriptor_set(path: &Path, set: &FileDescriptorSet) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
    }
    fs::write(path, set.encode_to_vec()).map_err(|e| Error::file_write(path, e))?;
    debug!("Wrote descriptor set to {}", path.display());
    Ok(())
}

fn lower_enum(program: &Program, id: EnumId) -> EnumDescriptorProto {
    let enumeration = program.enumeration(id);
    EnumDescriptorProto {
        name: Some(enumeration.short_name.clone()),
        value: enumeration
            .properties
            .iter()
            .map(|p| EnumValueDescriptorProto {
                name: Some(p.name.clone()),
                number: Some(p.value),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

/// Protobuf scalar for a property kind; protobuf has no 8 or 16 bit types
fn scalar_type(kind: PropertyTypeKind) -> Option<Type> {
    Some(match kind {
        PropertyTypeKind::Double => Type::Double,
        PropertyTypeKind::Float => Type::Float,
        PropertyTypeKind::Byte | PropertyTypeKind::Short | PropertyTypeKind::Int32 => Type::Int32,
        PropertyTypeKind::UByte | PropertyTypeKind::UShort | PropertyTypeKind::UInt32 => Type::Uint32,
        PropertyTypeKind::Int64 => Type::Int64,
        PropertyTypeKind::UInt64 => Type::Uint64,
        PropertyTypeKind::SInt32 => Type::Sint32,
        PropertyTypeKind::SInt64 => Type::Sint64,
        PropertyTypeKind::Fixed32 => Type::Fixed32,
        PropertyTypeKind::Fixed64 => Type::Fixed64,
        PropertyTypeKind::SFixed32 => Type::Sfixed32,
        PropertyTypeKind::SFixed64 => Type::Sfixed64,
        PropertyTypeKind::Bool => Type::Bool,
        PropertyTypeKind::String => Type::String,
        PropertyTypeKind::Bytes => Type::Bytes,
        PropertyTypeKind::TypeRef => return None,
    })
}

/// Namespace indices in post order of the reference graph
fn dependency_order(program: &Program) -> Vec<usize> {
    fn visit(graph: &NamespaceGraph, node: usize, seen: &mut [bool], out: &mut Vec<usize>) {
        if seen[node] {
            return;
        }
        seen[node] = true;
        for &next in graph.successors(node) {
            visit(graph, next, seen, out);
        }
        out.push(node);
    }

    let graph = NamespaceGraph::build(program);
    let mut seen = vec![false; graph.len()];
    let mut out = Vec::with_capacity(graph.len());
    for node in 0..graph.len() {
        visit(&graph, node, &mut seen, &mut out);
    }
    out
}

/// Writes `.proto` source for one file descriptor
struct ProtoWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a ProtoConfig,
    indent_level: usize,
    package: &'a str,
    /// Top-level type names of the file, for relative references
    local: HashSet<&'a str>,
}

impl<'a, W: FmtWrite> ProtoWriter<'a, W> {
    fn new(writer: &'a mut W, config: &'a ProtoConfig, file: &'a FileDescriptorProto) -> Self {
        let local = file
            .message_type
            .iter()
            .map(|m| m.name())
            .chain(file.enum_type.iter().map(|e| e.name()))
            .collect();
        Self {
            writer,
            config,
            indent_level: 0,
            package: file.package(),
            local,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_file(&mut self, file: &FileDescriptorProto) -> fmt::Result {
        writeln!(self.writer, "syntax = \"{}\";", self.config.syntax.as_str())?;

        if !file.package().is_empty() {
            writeln!(self.writer)?;
            writeln!(self.writer, "package {};", file.package())?;
        }

        if !file.dependency.is_empty() {
            writeln!(self.writer)?;
            for dep in &file.dependency {
                writeln!(self.writer, "import \"{}\";", escape_string(dep))?;
            }
        }

        for enum_type in &file.enum_type {
            writeln!(self.writer)?;
            self.write_enum(enum_type)?;
        }

        for message in &file.message_type {
            writeln!(self.writer)?;
            self.write_message(message)?;
        }

        Ok(())
    }

    fn write_message(&mut self, message: &DescriptorProto) -> fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name())?;
        self.indent();

        let mut blocks = 0;
        for nested in &message.nested_type {
            if blocks > 0 {
                writeln!(self.writer)?;
            }
            self.write_message(nested)?;
            blocks += 1;
        }
        for enum_type in &message.enum_type {
            if blocks > 0 {
                writeln!(self.writer)?;
            }
            self.write_enum(enum_type)?;
            blocks += 1;
        }
        if blocks > 0 && !message.field.is_empty() {
            writeln!(self.writer)?;
        }

        for field in &message.field {
            self.write_field(field)?;
        }

        self.dedent();
        self.writeln("}")
    }

    fn write_field(&mut self, field: &FieldDescriptorProto) -> fmt::Result {
        self.write_indent()?;

        let label = self.field_label(field);
        if !label.is_empty() {
            write!(self.writer, "{} ", label)?;
        }

        write!(
            self.writer,
            "{} {} = {}",
            self.field_type_name(field),
            field.name(),
            field.number()
        )?;

        if let Some(packed) = field.options.as_ref().and_then(|o| o.packed) {
            write!(self.writer, " [packed = {}]", packed)?;
        }

        writeln!(self.writer, ";")
    }

    fn field_label(&self, field: &FieldDescriptorProto) -> &'static str {
        match field.label() {
            Label::Repeated => "repeated",
            Label::Required => "required",
            Label::Optional => match self.config.syntax {
                ProtoSyntax::Proto2 => "optional",
                ProtoSyntax::Proto3 => "",
            },
        }
    }

    fn field_type_name(&self, field: &FieldDescriptorProto) -> String {
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
            Type::Message | Type::Enum => self.relative_type_name(field.type_name()).to_string(),
        }
    }

    /// Strips the package from references to types of this file
    fn relative_type_name<'n>(&self, type_name: &'n str) -> &'n str {
        let rest = type_name.strip_prefix('.').and_then(|rest| {
            if self.package.is_empty() {
                Some(rest)
            } else {
                rest.strip_prefix(self.package)?.strip_prefix('.')
            }
        });
        match rest {
            Some(rest) if self.local.contains(rest.split('.').next().unwrap_or_default()) => rest,
            _ => type_name,
        }
    }

    fn write_enum(&mut self, enum_type: &EnumDescriptorProto) -> fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "enum {} {{", enum_type.name())?;
        self.indent();

        for value in &enum_type.value {
            self.write_indent()?;
            writeln!(self.writer, "{} = {};", value.name(), value.number())?;
        }

        self.dedent();
        self.writeln("}")
    }
}

/// Escape a string for proto syntax
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                result.push_str(&format!("\\x{:02x}", c as u8));
            }
            _ => result.push(c),
        }
    }
    result
}
