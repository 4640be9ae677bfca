//! FlatBuffers inspector.
//!
//! Generated accessors are plain properties over a `ByteBuffer`, so the
//! declared members are enough; no method body is interpreted. Vectors are
//! exposed as an indexed accessor method `X(int)` plus an `XLength` property.

use super::mapping::{map_declared, unwrap_generic};
use super::{Extraction, FieldShape};
use crate::error::{Error, Result};
use crate::ir::{FieldLabel, PropertyOptions};
use crate::metadata::TypeDef;
use tracing::trace;

const BUFFER_PROPERTY: &str = "ByteBuffer";
const LENGTH_SUFFIX: &str = "Length";

pub(super) fn matches(ty: &TypeDef) -> bool {
    ty.implements("IFlatbufferObject")
}

pub(super) fn extract(ty: &TypeDef) -> Result<Extraction> {
    let mut extraction = Extraction::default();
    let mut order = 1;

    for property in &ty.properties {
        if property.name == BUFFER_PROPERTY {
            continue;
        }

        let vector = property
            .name
            .strip_suffix(LENGTH_SUFFIX)
            .filter(|name| !name.is_empty());

        let (name, label, declared) = match vector {
            Some(name) => {
                let accessor = ty.method(name).ok_or_else(|| {
                    Error::missing_structure(
                        ty.full_name(),
                        format!("vector '{}' has no accessor method", name),
                    )
                })?;
                (
                    name.to_string(),
                    FieldLabel::Repeated,
                    unwrap_generic(&accessor.return_type),
                )
            }
            None => (
                property.name.clone(),
                FieldLabel::Optional,
                &property.property_type,
            ),
        };

        let (kind, type_name) = map_declared(declared)?.into_parts();
        trace!("{}: #{} {} {:?} {:?}", ty.full_name(), order, name, label, kind);

        extraction.push(FieldShape {
            name,
            kind,
            type_name,
            options: PropertyOptions {
                label,
                order,
                packed: false,
            },
        });
        order += 1;
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::PropertyTypeKind;
    use crate::metadata::{MethodDef, TypeRef};
    use pretty_assertions::assert_eq;

    fn t(name: &str) -> TypeRef {
        TypeRef::new(name)
    }

    fn monster() -> TypeDef {
        TypeDef::class("Game.Tables", "Monster")
            .implementing(t("FlatBuffers.IFlatbufferObject"))
            .with_property("ByteBuffer", t("FlatBuffers.ByteBuffer"))
            .with_property("Name", t("System.String"))
            .with_property("ItemsLength", t("System.Int32"))
            .with_method(
                MethodDef::new(
                    "Items",
                    TypeRef::generic("System.Nullable`1", vec![t("Game.Tables.Foo")]),
                )
                .with_parameter("j", t("System.Int32")),
            )
            .with_property("Length", t("System.Int32"))
    }

    #[test]
    fn test_vector_and_scalar_fields() {
        let extraction = extract(&monster()).unwrap();

        let summary: Vec<_> = extraction
            .properties
            .iter()
            .map(|p| (p.name.as_str(), p.options.order, p.options.label, p.kind))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Name", 1, FieldLabel::Optional, PropertyTypeKind::String),
                ("Items", 2, FieldLabel::Repeated, PropertyTypeKind::TypeRef),
                ("Length", 3, FieldLabel::Optional, PropertyTypeKind::Int32),
            ]
        );
        assert_eq!(extraction.properties[1].type_name.as_deref(), Some("Game.Tables.Foo"));
        assert_eq!(extraction.references, vec!["Game.Tables.Foo".to_string()]);
    }

    #[test]
    fn test_missing_vector_accessor() {
        let ty = TypeDef::class("Game", "Broken")
            .implementing(t("FlatBuffers.IFlatbufferObject"))
            .with_property("ValuesLength", t("System.Int32"));
        assert!(matches!(extract(&ty), Err(Error::MissingStructure { .. })));
    }

    #[test]
    fn test_scalar_vector() {
        let ty = TypeDef::class("Game", "Bag")
            .implementing(t("FlatBuffers.IFlatbufferObject"))
            .with_property("CountsLength", t("System.Int32"))
            .with_method(MethodDef::new("Counts", t("System.Byte")));
        let extraction = extract(&ty).unwrap();
        assert_eq!(extraction.properties[0].kind, PropertyTypeKind::UByte);
        assert!(extraction.references.is_empty());
    }
}
