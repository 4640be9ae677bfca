//! protobuf-csharp-port inspector.
//!
//! Messages derive from `GeneratedMessage<TMessage, TBuilder>`. The type
//! initializer fills a static `_<name>FieldNames` string array, and
//! `WriteTo(ICodedOutputStream)` writes every field through
//! `output.Write<Kind>[Array](number, _fieldNames[i], value)`.

use super::mapping::{is_packable, map_declared, unwrap_generic, writer_kind, Mapped, WriterKind};
use super::{Extraction, FieldShape};
use crate::cil::{Event, MethodWalker, Value};
use crate::error::{Error, Result};
use crate::ir::{FieldLabel, PropertyOptions, PropertyTypeKind};
use crate::metadata::{Assembly, TypeDef};
use crate::naming::to_pascal_case;
use tracing::trace;

const BASE_TYPE_PREFIX: &str = "GeneratedMessage";
const NAMES_FIELD_SUFFIX: &str = "FieldNames";
const SERIALIZE_METHOD: &str = "WriteTo";
const SERIALIZE_PARAMETER: &str = "ICodedOutputStream";

pub(super) fn matches(ty: &TypeDef) -> bool {
    ty.base_type
        .as_ref()
        .is_some_and(|base| base.name().starts_with(BASE_TYPE_PREFIX))
}

/// Reads the field naming table from the type initializer
fn field_names(ty: &TypeDef) -> Result<Vec<String>> {
    let cctor = ty
        .static_constructor()
        .ok_or_else(|| Error::missing_structure(ty.full_name(), "no static constructor"))?;

    let mut names = None;
    for event in MethodWalker::new(&ty.full_name(), cctor) {
        if let Event::Store(store) = event? {
            if store.target.is_none() && store.field.name.ends_with(NAMES_FIELD_SUFFIX) {
                names = store.value.string_elements();
            }
        }
    }

    names.ok_or_else(|| {
        Error::missing_structure(ty.full_name(), "static constructor stores no field name table")
    })
}

/// Writer method decomposed into kind, repetition and packing
struct Writer<'a> {
    literal: &'a str,
    repeated: bool,
    packed: bool,
}

fn parse_writer(method: &str) -> Option<Writer<'_>> {
    let rest = method.strip_prefix("Write")?;
    let (rest, packed) = match rest.strip_prefix("Packed") {
        Some(rest) => (rest, true),
        None => (rest, false),
    };
    let (literal, repeated) = match rest.strip_suffix("Array") {
        Some(literal) => (literal, true),
        None => (rest, false),
    };
    Some(Writer {
        literal,
        repeated,
        packed,
    })
}

/// Resolves the referenced type of a message/enum field through the
/// property the generator declares for it
fn referenced_type(ty: &TypeDef, field: &str, repeated: bool) -> Result<String> {
    let mut property_name = to_pascal_case(field);
    if repeated {
        property_name.push_str("List");
    }
    let property = ty
        .property(&property_name)
        .ok_or_else(|| Error::property_not_found(ty.full_name(), &property_name))?;

    let declared = if repeated {
        unwrap_generic(&property.property_type)
    } else {
        &property.property_type
    };
    match map_declared(declared)? {
        Mapped::Reference(name) => Ok(name),
        Mapped::Scalar(kind) => Err(Error::missing_structure(
            ty.full_name(),
            format!(
                "property '{}' is declared as {:?}, expected a message or enum",
                property_name, kind
            ),
        )),
    }
}

/// Checks a composite writer against the type the field resolved to.
///
/// `WriteEnum*` must target an enum and `WriteMessage*`/`WriteGroup*` a
/// class. Types missing from the assembly are left to the decompiler.
fn check_composite(assembly: &Assembly, owner: &str, writer: &Writer<'_>, referenced: &str) -> Result<()> {
    let Some(target) = assembly.find(referenced) else {
        return Ok(());
    };
    let wants_enum = writer.literal == "Enum";
    if wants_enum != target.is_enum() {
        return Err(Error::missing_structure(
            owner,
            format!(
                "'{}' is written with Write{} but is {}",
                referenced,
                writer.literal,
                if target.is_enum() { "an enum" } else { "not an enum" }
            ),
        ));
    }
    if writer.packed && !wants_enum {
        return Err(Error::missing_structure(
            owner,
            format!("message '{}' is written packed", referenced),
        ));
    }
    Ok(())
}

pub(super) fn extract(assembly: &Assembly, ty: &TypeDef) -> Result<Extraction> {
    let type_name = ty.full_name();
    let names = field_names(ty)?;
    trace!("{}: field name table {:?}", type_name, names);

    let serializer = ty
        .methods
        .iter()
        .find(|m| m.name == SERIALIZE_METHOD && m.has_single_parameter(SERIALIZE_PARAMETER))
        .ok_or_else(|| {
            Error::missing_structure(&type_name, "no WriteTo(ICodedOutputStream) method")
        })?;

    let mut extraction = Extraction::default();
    for event in MethodWalker::new(&type_name, serializer) {
        let Event::Call(call) = event? else {
            continue;
        };
        let Some(writer) = parse_writer(&call.method.name) else {
            continue;
        };
        // Field writers take (number, name, [size,] value).
        let (Some(number), Some(Value::Element { .. })) = (call.argument(0), call.argument(1))
        else {
            continue;
        };
        let kind = writer_kind(writer.literal).ok_or_else(|| {
            Error::missing_structure(
                &type_name,
                format!("unknown field writer '{}'", call.method.name),
            )
        })?;

        let order = number
            .as_int()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                Error::missing_structure(
                    &type_name,
                    format!("'{}' is called without a constant field number", call.method.name),
                )
            })?;
        let name = call
            .argument(1)
            .and_then(Value::element_index)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| names.get(i))
            .ok_or_else(|| {
                Error::missing_structure(
                    &type_name,
                    format!("field #{} has no entry in the name table", order),
                )
            })?
            .clone();

        let (kind, referenced) = match kind {
            WriterKind::Scalar(kind) => {
                if writer.packed && !is_packable(assembly, kind, None) {
                    return Err(Error::missing_structure(
                        &type_name,
                        format!("'{}' writes a {:?} field packed", call.method.name, kind),
                    ));
                }
                (kind, None)
            }
            WriterKind::Composite => {
                let referenced = referenced_type(ty, &name, writer.repeated)?;
                check_composite(assembly, &type_name, &writer, &referenced)?;
                (PropertyTypeKind::TypeRef, Some(referenced))
            }
        };

        trace!("{}: #{} {} via {}", type_name, order, name, call.method.name);
        extraction.push(FieldShape {
            name,
            kind,
            type_name: referenced,
            options: PropertyOptions {
                label: if writer.repeated {
                    FieldLabel::Repeated
                } else {
                    FieldLabel::Optional
                },
                order,
                packed: writer.packed,
            },
        });
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldRef, Instruction as I, MethodDef, MethodRef, TypeRef};
    use pretty_assertions::assert_eq;

    fn t(name: &str) -> TypeRef {
        TypeRef::new(name)
    }

    const OUTPUT: &str = "Google.ProtocolBuffers.ICodedOutputStream";

    fn writer(name: &str, value: &str, extra: usize) -> MethodRef {
        let mut params = vec![t("System.Int32"), t("System.String")];
        params.extend(std::iter::repeat(t("System.Int32")).take(extra));
        params.push(t(value));
        MethodRef::new(OUTPUT, name, params, t("System.Void")).instance()
    }

    fn getter(name: &str, ret: TypeRef) -> MethodRef {
        MethodRef::new("Game.Login", format!("get_{}", name), vec![], ret).instance()
    }

    /// Emits `output.<writer>(number, names[index], [extra..,] this.get_<prop>())`
    fn write_field(
        body: &mut Vec<I>,
        writer: MethodRef,
        number: i64,
        index: i64,
        extra: usize,
        getter: MethodRef,
    ) {
        body.push(I::op("ldarg.1"));
        body.push(I::int("ldc.i4.s", number));
        body.push(I::op("ldloc.0"));
        body.push(I::int("ldc.i4.s", index));
        body.push(I::op("ldelem.ref"));
        for _ in 0..extra {
            body.push(I::op("ldarg.0"));
            body.push(I::field("ldfld", FieldRef::new("Game.Login", "_size", t("System.Int32"))));
        }
        body.push(I::op("ldarg.0"));
        body.push(I::method("call", getter));
        body.push(I::method("callvirt", writer));
    }

    fn login() -> TypeDef {
        let names = FieldRef::new("Game.Login", "_loginFieldNames", t("System.String[]"));
        let cctor = MethodDef::static_constructor(vec![]).with_body(vec![
            I::op("ldc.i4.3"),
            I::text("newarr", "System.String"),
            I::op("dup"),
            I::op("ldc.i4.0"),
            I::text("ldstr", "kind"),
            I::op("stelem.ref"),
            I::op("dup"),
            I::op("ldc.i4.1"),
            I::text("ldstr", "scores"),
            I::op("stelem.ref"),
            I::op("dup"),
            I::op("ldc.i4.2"),
            I::text("ldstr", "user_name"),
            I::op("stelem.ref"),
            I::field("stsfld", names.clone()),
            I::op("ret"),
        ]);

        let mut body = vec![
            I::field("ldsfld", names.clone()),
            I::op("stloc.0"),
        ];
        write_field(
            &mut body,
            writer("WriteString", "System.String", 0),
            1,
            2,
            0,
            getter("UserName", t("System.String")),
        );
        write_field(
            &mut body,
            writer("WritePackedInt32Array", "System.Collections.Generic.IList`1", 1),
            2,
            1,
            1,
            getter("ScoresList", t("System.Collections.Generic.IList`1")),
        );
        write_field(
            &mut body,
            writer("WriteEnum", "System.Object", 0),
            3,
            0,
            0,
            getter("Kind", t("Game.Kind")),
        );
        body.push(I::op("ret"));

        TypeDef::class("Game", "Login")
            .extends(TypeRef::generic(
                "Google.ProtocolBuffers.GeneratedMessage`2",
                vec![t("Game.Login"), t("Game.Login/Builder")],
            ))
            .with_property("UserName", t("System.String"))
            .with_property(
                "ScoresList",
                TypeRef::generic("System.Collections.Generic.IList`1", vec![t("System.Int32")]),
            )
            .with_property("Kind", t("Game.Kind"))
            .with_method(cctor)
            .with_method(
                MethodDef::new("WriteTo", t("System.Void"))
                    .with_parameter("output", t(OUTPUT))
                    .with_body(body),
            )
    }

    #[test]
    fn test_matches_generated_message() {
        assert!(matches(&login()));
        assert!(!matches(&TypeDef::class("Game", "Plain")));
    }

    #[test]
    fn test_extract_fields() {
        let assembly = Assembly::new("test", vec![TypeDef::enumeration("Game", "Kind")]);
        let extraction = extract(&assembly, &login()).unwrap();

        let summary: Vec<_> = extraction
            .properties
            .iter()
            .map(|p| {
                (
                    p.name.as_str(),
                    p.options.order,
                    p.options.label,
                    p.options.packed,
                    p.kind,
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![
                ("user_name", 1, FieldLabel::Optional, false, PropertyTypeKind::String),
                ("scores", 2, FieldLabel::Repeated, true, PropertyTypeKind::Int32),
                ("kind", 3, FieldLabel::Optional, false, PropertyTypeKind::TypeRef),
            ]
        );
        assert_eq!(extraction.references, vec!["Game.Kind".to_string()]);
    }

    #[test]
    fn test_missing_name_table() {
        let ty = TypeDef::class("Game", "Empty")
            .extends(t("Google.ProtocolBuffers.GeneratedMessage`2"))
            .with_method(MethodDef::static_constructor(vec![I::op("ret")]));
        let err = extract(&Assembly::default(), &ty).unwrap_err();
        assert!(matches!(err, Error::MissingStructure { .. }));
    }

    /// Replaces the `position`-th field writer call in `login()`'s serialize method
    fn login_with_writer(position: usize, replacement: MethodRef) -> TypeDef {
        let mut ty = login();
        let method = ty.methods.iter_mut().find(|m| m.name == SERIALIZE_METHOD).unwrap();
        let call = method
            .body
            .iter_mut()
            .filter(|i| i.opcode == "callvirt")
            .nth(position)
            .unwrap();
        call.operand = Some(crate::metadata::Operand::Method(replacement));
        ty
    }

    #[test]
    fn test_unknown_writer_is_an_error() {
        let ty = login_with_writer(0, writer("WriteDecimal", "System.String", 0));
        let err = extract(&Assembly::default(), &ty).unwrap_err();
        assert!(matches!(err, Error::MissingStructure { .. }));
        assert!(err.to_string().contains("WriteDecimal"));
    }

    #[test]
    fn test_composite_writer_checked_against_assembly() {
        // Kind is written as an enum but the assembly declares a class.
        let assembly = Assembly::new("test", vec![TypeDef::class("Game", "Kind")]);
        let err = extract(&assembly, &login()).unwrap_err();
        assert!(matches!(err, Error::MissingStructure { .. }));
        assert!(err.to_string().contains("not an enum"));

        // Unknown to the assembly: resolution is the decompiler's job.
        assert!(extract(&Assembly::default(), &login()).is_ok());
    }

    #[test]
    fn test_packed_non_packable_writer() {
        let ty = login_with_writer(
            1,
            writer("WritePackedStringArray", "System.Collections.Generic.IList`1", 1),
        );
        let err = extract(&Assembly::default(), &ty).unwrap_err();
        assert!(err.to_string().contains("packed"));
    }

    #[test]
    fn test_parse_writer() {
        let w = parse_writer("WritePackedSInt64Array").unwrap();
        assert_eq!((w.literal, w.repeated, w.packed), ("SInt64", true, true));
        let w = parse_writer("WriteMessage").unwrap();
        assert_eq!((w.literal, w.repeated, w.packed), ("Message", false, false));
        assert!(parse_writer("ToString").is_none());
    }
}
