//! Type and writer-name mappings shared by all inspectors.

use crate::error::{Error, Result};
use crate::ir::PropertyTypeKind;
use crate::metadata::{Assembly, TypeRef};
use crate::wire::Tag;

/// Result of mapping a declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mapped {
    /// A scalar schema kind
    Scalar(PropertyTypeKind),
    /// A type of the assembly, by qualified name
    Reference(String),
}

impl Mapped {
    pub(crate) fn into_parts(self) -> (PropertyTypeKind, Option<String>) {
        match self {
            Mapped::Scalar(kind) => (kind, None),
            Mapped::Reference(name) => (PropertyTypeKind::TypeRef, Some(name)),
        }
    }
}

/// Maps a declared CLI type to a schema kind.
///
/// `System.Nullable<T>` is looked through. Other `System` types without a
/// schema equivalent are rejected; everything else is a reference that the
/// decompiler will have to resolve.
pub(crate) fn map_declared(ty: &TypeRef) -> Result<Mapped> {
    if ty.full_name == "System.Nullable`1" {
        if let Some(inner) = ty.generic_arguments.first() {
            return map_declared(inner);
        }
    }

    if ty.name() == "ByteString" {
        return Ok(Mapped::Scalar(PropertyTypeKind::Bytes));
    }

    let kind = match ty.full_name.as_str() {
        "System.Double" => PropertyTypeKind::Double,
        "System.Single" => PropertyTypeKind::Float,
        "System.SByte" => PropertyTypeKind::Byte,
        "System.Byte" => PropertyTypeKind::UByte,
        "System.Int16" => PropertyTypeKind::Short,
        "System.UInt16" => PropertyTypeKind::UShort,
        "System.Int32" => PropertyTypeKind::Int32,
        "System.UInt32" => PropertyTypeKind::UInt32,
        "System.Int64" => PropertyTypeKind::Int64,
        "System.UInt64" => PropertyTypeKind::UInt64,
        "System.Boolean" => PropertyTypeKind::Bool,
        "System.String" => PropertyTypeKind::String,
        "System.Byte[]" => PropertyTypeKind::Bytes,
        other if other.starts_with("System.") || other.ends_with("[]") => {
            return Err(Error::UnsupportedType {
                type_name: other.to_string(),
            })
        }
        other => return Ok(Mapped::Reference(other.to_string())),
    };
    Ok(Mapped::Scalar(kind))
}

/// Returns the first generic argument of a generic instance, or the type itself
pub(crate) fn unwrap_generic(ty: &TypeRef) -> &TypeRef {
    ty.generic_arguments.first().unwrap_or(ty)
}

/// Meaning of the `<Kind>` part of a `Write<Kind>` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterKind {
    /// Value of a scalar kind
    Scalar(PropertyTypeKind),
    /// Message, group or enum; the kind stays `TypeRef`
    Composite,
}

/// Maps the literal kind name used by generated writer methods
pub(crate) fn writer_kind(literal: &str) -> Option<WriterKind> {
    let kind = match literal {
        "Double" => PropertyTypeKind::Double,
        "Float" => PropertyTypeKind::Float,
        "Int64" => PropertyTypeKind::Int64,
        "UInt64" => PropertyTypeKind::UInt64,
        "Int32" => PropertyTypeKind::Int32,
        "Fixed64" => PropertyTypeKind::Fixed64,
        "Fixed32" => PropertyTypeKind::Fixed32,
        "Bool" => PropertyTypeKind::Bool,
        "String" => PropertyTypeKind::String,
        "Bytes" => PropertyTypeKind::Bytes,
        "UInt32" => PropertyTypeKind::UInt32,
        "SFixed32" => PropertyTypeKind::SFixed32,
        "SFixed64" => PropertyTypeKind::SFixed64,
        "SInt32" => PropertyTypeKind::SInt32,
        "SInt64" => PropertyTypeKind::SInt64,
        "Message" | "Group" | "Enum" => return Some(WriterKind::Composite),
        _ => return None,
    };
    Some(WriterKind::Scalar(kind))
}

/// Returns true if values of this kind may use packed encoding: numeric
/// and bool scalars, and references to enums
pub(crate) fn is_packable(
    assembly: &Assembly,
    kind: PropertyTypeKind,
    type_name: Option<&str>,
) -> bool {
    match kind {
        PropertyTypeKind::TypeRef => type_name
            .and_then(|name| assembly.find(name))
            .is_some_and(|ty| ty.is_enum()),
        PropertyTypeKind::Bool => true,
        kind => kind.is_numeric(),
    }
}

/// Reads a raw tag pushed as an `ldc.i4` operand.
///
/// Tags are `uint32` in generated code, so tags of field numbers from 2^28
/// up load as negative `int32` constants.
pub(crate) fn codec_tag(value: i64) -> Option<u64> {
    u32::try_from(value)
        .ok()
        .or_else(|| i32::try_from(value).ok().map(|v| v as u32))
        .map(u64::from)
}

/// Decides packing from the raw tag of a repeated field codec: a
/// length-delimited wire type on a packable kind means packed
pub(crate) fn packed_from_tag(raw: u64, packable: bool) -> Result<bool> {
    let tag = Tag::from_raw(raw)?;
    Ok(packable && tag.is_length_delimited())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::TypeDef;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_byte_kinds() {
        assert_eq!(
            map_declared(&TypeRef::new("System.SByte")).unwrap(),
            Mapped::Scalar(PropertyTypeKind::Byte)
        );
        assert_eq!(
            map_declared(&TypeRef::new("System.Byte")).unwrap(),
            Mapped::Scalar(PropertyTypeKind::UByte)
        );
        assert_eq!(
            map_declared(&TypeRef::new("System.Byte[]")).unwrap(),
            Mapped::Scalar(PropertyTypeKind::Bytes)
        );
        assert_eq!(
            map_declared(&TypeRef::new("Google.Protobuf.ByteString")).unwrap(),
            Mapped::Scalar(PropertyTypeKind::Bytes)
        );
    }

    #[test]
    fn test_reference_and_nullable() {
        assert_eq!(
            map_declared(&TypeRef::new("Game.Net.Foo/Types/Bar")).unwrap(),
            Mapped::Reference("Game.Net.Foo/Types/Bar".into())
        );
        let nullable = TypeRef::generic("System.Nullable`1", vec![TypeRef::new("Game.Vec3")]);
        assert_eq!(
            map_declared(&nullable).unwrap(),
            Mapped::Reference("Game.Vec3".into())
        );
    }

    #[test]
    fn test_unsupported_system_type() {
        assert!(matches!(
            map_declared(&TypeRef::new("System.DateTime")),
            Err(Error::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_writer_kind() {
        assert_eq!(
            writer_kind("SFixed64"),
            Some(WriterKind::Scalar(PropertyTypeKind::SFixed64))
        );
        assert_eq!(writer_kind("Enum"), Some(WriterKind::Composite));
        assert_eq!(writer_kind("Length"), None);
    }

    #[test]
    fn test_packed_decision() {
        // field 2, LEN
        assert!(packed_from_tag(18, true).unwrap());
        assert!(!packed_from_tag(18, false).unwrap());
        // field 2, VARINT
        assert!(!packed_from_tag(16, true).unwrap());
    }

    #[test]
    fn test_codec_tag_above_int32() {
        // field 2^28, LEN: 0x8000_0002 loads as a negative int32
        let loaded = i64::from(0x8000_0002u32 as i32);
        let raw = codec_tag(loaded).unwrap();
        assert_eq!(raw, 0x8000_0002);
        assert!(packed_from_tag(raw, true).unwrap());

        assert_eq!(codec_tag(18), Some(18));
        assert_eq!(codec_tag(i64::from(u32::MAX)), Some(u64::from(u32::MAX)));
        assert_eq!(codec_tag(i64::from(u32::MAX) + 1), None);
        assert_eq!(codec_tag(i64::from(i32::MIN) - 1), None);
    }

    #[test]
    fn test_enum_reference_is_packable() {
        let assembly = Assembly::new(
            "test",
            vec![TypeDef::enumeration("Game", "Kind"), TypeDef::class("Game", "Foo")],
        );
        assert!(is_packable(&assembly, PropertyTypeKind::TypeRef, Some("Game.Kind")));
        assert!(!is_packable(&assembly, PropertyTypeKind::TypeRef, Some("Game.Foo")));
        assert!(!is_packable(&assembly, PropertyTypeKind::String, None));
        assert!(is_packable(&assembly, PropertyTypeKind::Bool, None));
        assert!(is_packable(&assembly, PropertyTypeKind::SInt64, None));
    }
}
