//! Google.Protobuf inspector.
//!
//! Every field of a generated message is a public property with a
//! `<Name>FieldNumber` constant next to it, so names, tags and declared
//! types come straight from metadata. Two method bodies fill in the rest:
//!
//! - the type initializer builds one `FieldCodec` per repeated field; the
//!   tag passed to its factory tells whether the field is packed
//! - the serialize method calls `Write<Kind>(this.get_<Name>())` per
//!   singular field, which pins down the protobuf encoding (`sint32` vs
//!   `int32`, `fixed64` vs `uint64`, ...)

use super::mapping::{
    codec_tag, is_packable, map_declared, packed_from_tag, writer_kind, WriterKind,
};
use super::{Extraction, FieldShape};
use crate::cil::{CallInfo, Event, MethodWalker, StoreInfo};
use crate::error::{Error, Result};
use crate::ir::{FieldLabel, PropertyOptions, PropertyTypeKind};
use crate::metadata::{Assembly, MethodDef, TypeDef};
use crate::naming::upper_first;
use crate::wire::Tag;
use std::collections::VecDeque;
use tracing::{trace, warn};

const PARSER_PROPERTY: &str = "Parser";
const FIELD_NUMBER_SUFFIX: &str = "FieldNumber";
const REPEATED_FIELD: &str = "RepeatedField`1";
const MAP_FIELD: &str = "MapField`2";
const CODEC_FACTORY_PREFIX: &str = "For";
const REPEATED_CODEC_PREFIX: &str = "_repeated_";
const REPEATED_CODEC_SUFFIX: &str = "_codec";
const RAW_TAG_WRITER: &str = "WriteRawTag";

pub(super) fn matches(ty: &TypeDef) -> bool {
    (ty.implements("IMessage") || ty.implements("IMessage`1"))
        && ty
            .properties
            .iter()
            .any(|p| p.is_static && p.name == PARSER_PROPERTY)
}

/// Fields declared through `<Name>FieldNumber` constants
fn declared_fields(ty: &TypeDef) -> Result<Extraction> {
    let mut extraction = Extraction::default();

    for property in ty.properties.iter().filter(|p| !p.is_static) {
        let constant = format!("{}{}", property.name, FIELD_NUMBER_SUFFIX);
        let Some(number) = ty
            .field(&constant)
            .and_then(|f| f.constant.as_ref())
            .and_then(|c| c.as_i64())
        else {
            trace!("{}: '{}' has no field number", ty.full_name(), property.name);
            continue;
        };
        let order = u32::try_from(number).map_err(|_| {
            Error::missing_structure(
                ty.full_name(),
                format!("'{}' has invalid field number {}", constant, number),
            )
        })?;

        let declared = &property.property_type;
        let (label, element) = match declared.name() {
            REPEATED_FIELD => match declared.generic_arguments.first() {
                Some(element) => (FieldLabel::Repeated, element),
                None => {
                    return Err(Error::missing_structure(
                        ty.full_name(),
                        format!("repeated field '{}' has no element type", property.name),
                    ))
                }
            },
            MAP_FIELD => {
                return Err(Error::UnsupportedType {
                    type_name: format!("{}.{} (map field #{})", ty.full_name(), property.name, order),
                })
            }
            _ => (FieldLabel::Optional, declared),
        };

        let (kind, type_name) = map_declared(element)?.into_parts();
        extraction.push(FieldShape {
            name: property.name.clone(),
            kind,
            type_name,
            options: PropertyOptions {
                label,
                order,
                packed: false,
            },
        });
    }

    Ok(extraction)
}

/// Accumulator for the type initializer walk
struct CodecTags<'a> {
    assembly: &'a Assembly,
    type_name: String,
    pending: VecDeque<u64>,
}

impl CodecTags<'_> {
    fn on_call(&mut self, call: &CallInfo) -> Result<()> {
        if !call.method.name.starts_with(CODEC_FACTORY_PREFIX) {
            return Ok(());
        }
        let tag = call
            .argument(0)
            .and_then(|v| v.as_int())
            .and_then(codec_tag)
            .ok_or_else(|| {
                Error::missing_structure(
                    &self.type_name,
                    format!("'{}' is called without a constant tag", call.method.qualified_name()),
                )
            })?;
        trace!("{}: codec tag {}", self.type_name, tag);
        self.pending.push_back(tag);
        Ok(())
    }

    fn on_store(&mut self, store: &StoreInfo, extraction: &mut Extraction) -> Result<()> {
        if store.target.is_some() {
            return Ok(());
        }
        let Some(field) = store
            .field
            .name
            .strip_prefix(REPEATED_CODEC_PREFIX)
            .and_then(|rest| rest.strip_suffix(REPEATED_CODEC_SUFFIX))
        else {
            // Tags recorded so far belonged to this field's nested codecs.
            if !self.pending.is_empty() {
                trace!(
                    "{}: dropping {} tags stored into '{}'",
                    self.type_name,
                    self.pending.len(),
                    store.field.name
                );
                self.pending.clear();
            }
            return Ok(());
        };

        let raw = self.pending.pop_front().ok_or_else(|| {
            Error::missing_structure(
                &self.type_name,
                format!("'{}' is stored without a recorded tag", store.field.name),
            )
        })?;

        let wanted = upper_first(field);
        let index = extraction
            .properties
            .iter()
            .position(|p| p.name == wanted)
            .or_else(|| {
                extraction
                    .properties
                    .iter()
                    .position(|p| p.name.trim_matches('_') == wanted)
            })
            .ok_or_else(|| Error::property_not_found(&self.type_name, &wanted))?;

        let property = &mut extraction.properties[index];
        let packable = is_packable(self.assembly, property.kind, property.type_name.as_deref());
        property.options.packed = packed_from_tag(raw, packable)?;
        trace!(
            "{}: '{}' tag {} packed={}",
            self.type_name,
            property.name,
            raw,
            property.options.packed
        );
        Ok(())
    }
}

fn serialize_method(ty: &TypeDef) -> Option<&MethodDef> {
    ty.methods
        .iter()
        .find(|m| m.name == "InternalWriteTo" && m.has_single_parameter("WriteContext"))
        .or_else(|| {
            ty.methods
                .iter()
                .find(|m| m.name == "WriteTo" && m.has_single_parameter("CodedOutputStream"))
        })
}

/// Refines the kind of the property written by `call`.
///
/// `tag` is the raw tag written just before, if any; its field number must
/// be the property's.
fn on_write(
    type_name: &str,
    call: &CallInfo,
    tag: Option<Tag>,
    extraction: &mut Extraction,
) -> Result<()> {
    let method = call.method.name.as_str();
    if method.starts_with("WriteTo") || method == RAW_TAG_WRITER {
        return Ok(());
    }
    let Some(literal) = method.strip_prefix("Write") else {
        return Ok(());
    };
    let Some(kind) = writer_kind(literal) else {
        trace!("{}: ignoring '{}'", type_name, method);
        return Ok(());
    };
    let Some(name) = call.argument(0).and_then(|v| v.getter_name()) else {
        trace!("{}: '{}' does not write a property", type_name, method);
        return Ok(());
    };

    let property = extraction
        .property_mut(name)
        .ok_or_else(|| Error::property_not_found(type_name, name))?;
    if let Some(tag) = tag {
        if tag.number != property.options.order {
            return Err(Error::missing_structure(
                type_name,
                format!(
                    "'{}' is written under tag {} but declared as field #{}",
                    name, tag, property.options.order
                ),
            ));
        }
    }
    match kind {
        WriterKind::Scalar(kind) if property.kind != PropertyTypeKind::TypeRef => {
            property.kind = kind;
        }
        WriterKind::Scalar(kind) => {
            warn!(
                "{}: '{}' references a type but is written as {:?}",
                type_name, name, kind
            );
        }
        WriterKind::Composite => {}
    }
    Ok(())
}

pub(super) fn extract(assembly: &Assembly, ty: &TypeDef) -> Result<Extraction> {
    let type_name = ty.full_name();
    let mut extraction = declared_fields(ty)?;

    let cctor = ty
        .static_constructor()
        .ok_or_else(|| Error::missing_structure(&type_name, "no static constructor"))?;
    let mut tags = CodecTags {
        assembly,
        type_name: type_name.clone(),
        pending: VecDeque::new(),
    };
    for event in MethodWalker::new(&type_name, cctor) {
        match event? {
            Event::Call(call) => tags.on_call(&call)?,
            Event::Store(store) => tags.on_store(&store, &mut extraction)?,
        }
    }
    if !tags.pending.is_empty() {
        return Err(Error::missing_structure(
            &type_name,
            format!("{} codec tags were not claimed by any field", tags.pending.len()),
        ));
    }

    let serializer = serialize_method(ty)
        .ok_or_else(|| Error::missing_structure(&type_name, "no serialize method"))?;
    let mut walker = MethodWalker::new(&type_name, serializer);
    let mut consumed = 0;
    let mut last_tag = None;
    while let Some(event) = walker.next() {
        let Event::Call(call) = event? else {
            continue;
        };
        if call.method.name == RAW_TAG_WRITER {
            let (tag, len) = Tag::decode(&walker.written_bytes()[consumed..])?;
            trace!("{}: raw tag {}", type_name, tag);
            consumed += len;
            last_tag = Some(tag);
            continue;
        }
        on_write(&type_name, &call, last_tag.take(), &mut extraction)?;
    }

    Ok(extraction)
}
