//! FlatBuffers schema emission.
//!
//! FlatBuffers has no nested declarations, so every type owned by a
//! namespace (including types nested in classes) is written at the top
//! level of its `.fbs` file.

use super::{import_path, SchemaEmitter};
use crate::error::{Error, Result};
use crate::ir::{ClassId, ClassProperty, EnumId, FieldLabel, Program, PropertyTypeKind, TypeHandle};
use crate::naming::lower_first;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write as FmtWrite};

/// flatc spelling of a scalar kind
fn scalar_name(kind: PropertyTypeKind) -> Option<&'static str> {
    Some(match kind {
        PropertyTypeKind::Byte => "byte",
        PropertyTypeKind::UByte => "ubyte",
        PropertyTypeKind::Short => "short",
        PropertyTypeKind::UShort => "ushort",
        PropertyTypeKind::Int32 | PropertyTypeKind::SInt32 | PropertyTypeKind::SFixed32 => "int",
        PropertyTypeKind::UInt32 | PropertyTypeKind::Fixed32 => "uint",
        PropertyTypeKind::Int64 | PropertyTypeKind::SInt64 | PropertyTypeKind::SFixed64 => "long",
        PropertyTypeKind::UInt64 | PropertyTypeKind::Fixed64 => "ulong",
        PropertyTypeKind::Float => "float",
        PropertyTypeKind::Double => "double",
        PropertyTypeKind::Bool => "bool",
        PropertyTypeKind::String => "string",
        PropertyTypeKind::Bytes | PropertyTypeKind::TypeRef => return None,
    })
}

/// Emits `.fbs` files
#[derive(Debug, Clone)]
pub struct FlatbuffersEmitter {
    indent_str: String,
}

impl Default for FlatbuffersEmitter {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
        }
    }
}

impl FlatbuffersEmitter {
    /// Creates an emitter with two-space indentation
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    fn field_type(
        &self,
        program: &Program,
        index: usize,
        locations: &HashMap<TypeHandle, usize>,
        owner: &str,
        property: &ClassProperty,
    ) -> Result<String> {
        let base = match (property.kind, property.reference) {
            (PropertyTypeKind::Bytes, _) => {
                if property.options.label == FieldLabel::Repeated {
                    return Err(Error::UnsupportedType {
                        type_name: format!("{}.{} (vector of byte vectors)", owner, property.name),
                    });
                }
                return Ok("[ubyte]".to_string());
            }
            (_, Some(handle)) => {
                let name = program.short_name(handle);
                match locations.get(&handle) {
                    Some(&other) if other != index && !program.namespaces[other].full_name.is_empty() => {
                        format!("{}.{}", program.namespaces[other].full_name, name)
                    }
                    _ => name.to_string(),
                }
            }
            (kind, None) => scalar_name(kind)
                .ok_or_else(|| Error::internal(format!("'{}.{}' has no referenced type", owner, property.name)))?
                .to_string(),
        };

        Ok(match property.options.label {
            FieldLabel::Repeated => format!("[{}]", base),
            _ => base,
        })
    }

    fn write_enum(&self, out: &mut String, program: &Program, id: EnumId) -> Result<()> {
        let enumeration = program.enumeration(id);
        let kind = scalar_name(enumeration.underlying).ok_or_else(|| Error::UnsupportedEnumKind {
            type_name: enumeration.original_name.clone(),
            underlying: format!("{:?}", enumeration.underlying),
        })?;

        let values: Vec<String> = enumeration
            .properties
            .iter()
            .map(|p| format!("{}{} = {}", self.indent_str, p.name, enumeration.underlying_value(p)))
            .collect();
        render(|| {
            writeln!(out, "enum {}:{} {{", enumeration.short_name, kind)?;
            writeln!(out, "{}", values.join(",\n"))?;
            writeln!(out, "}}")
        })
    }

    fn write_table(
        &self,
        out: &mut String,
        program: &Program,
        index: usize,
        locations: &HashMap<TypeHandle, usize>,
        id: ClassId,
    ) -> Result<()> {
        let class = program.class(id);
        let mut fields = Vec::with_capacity(class.properties.len());
        for property in &class.properties {
            let ty = self.field_type(program, index, locations, &class.original_name, property)?;
            fields.push(format!("{}{}:{};", self.indent_str, lower_first(&property.name), ty));
        }
        render(|| {
            writeln!(out, "table {} {{", class.short_name)?;
            for field in &fields {
                writeln!(out, "{}", field)?;
            }
            writeln!(out, "}}")
        })
    }
}

fn render(f: impl FnOnce() -> fmt::Result) -> Result<()> {
    f().map_err(|e| Error::internal(format!("failed to render flatbuffers schema: {}", e)))
}

impl SchemaEmitter for FlatbuffersEmitter {
    fn extension(&self) -> &'static str {
        "fbs"
    }

    fn emit_namespace(&self, program: &Program, index: usize) -> Result<String> {
        let ns = &program.namespaces[index];
        let locations = program.locations();
        let types = program.namespace_types(index);

        let mut includes = BTreeSet::new();
        for &handle in &types {
            let TypeHandle::Class(id) = handle else {
                continue;
            };
            for target in program.class(id).properties.iter().filter_map(|p| p.reference) {
                if let Some(&other) = locations.get(&target) {
                    if other != index {
                        includes.insert(other);
                    }
                }
            }
        }

        let mut out = String::new();
        render(|| {
            for &other in &includes {
                writeln!(out, "include \"{}\";", import_path(&program.namespaces[other].full_name, "fbs"))?;
            }
            if !includes.is_empty() {
                writeln!(out)?;
            }
            if !ns.full_name.is_empty() {
                writeln!(out, "namespace {};", ns.full_name)?;
            }
            Ok(())
        })?;

        let enums = types.iter().filter_map(|&h| match h {
            TypeHandle::Enum(id) => Some(id),
            TypeHandle::Class(_) => None,
        });
        for id in enums {
            out.push('\n');
            self.write_enum(&mut out, program, id)?;
        }

        let tables: Vec<ClassId> = types
            .iter()
            .filter_map(|&h| match h {
                TypeHandle::Class(id) => Some(id),
                TypeHandle::Enum(_) => None,
            })
            .collect();
        for &id in &tables {
            out.push('\n');
            self.write_table(&mut out, program, index, &locations, id)?;
        }

        if let Some(&root) = tables.first() {
            out.push('\n');
            render(|| writeln!(out, "root_type {};", program.class(root).short_name))?;
        }

        Ok(out)
    }
}
