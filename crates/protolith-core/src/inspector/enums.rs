//! Enum extraction, common to every framework.

use crate::error::{Error, Result};
use crate::ir::{EnumProperty, PropertyTypeKind};
use crate::metadata::TypeDef;
use crate::naming::to_upper_snake_case;
use tracing::trace;

/// Name of the instance field holding an enum's underlying value
const VALUE_FIELD: &str = "value__";

/// Recovered enum body
#[derive(Debug, Clone, PartialEq)]
pub struct EnumShape {
    /// Underlying integer kind
    pub underlying: PropertyTypeKind,
    /// Constants in declaration order
    pub properties: Vec<EnumProperty>,
}

fn underlying_kind(ty: &TypeDef) -> Result<PropertyTypeKind> {
    let field = ty.field(VALUE_FIELD).ok_or_else(|| {
        Error::missing_structure(ty.full_name(), format!("no '{}' field", VALUE_FIELD))
    })?;

    match field.field_type.full_name.as_str() {
        "System.Int16" => Ok(PropertyTypeKind::Short),
        "System.UInt16" => Ok(PropertyTypeKind::UShort),
        "System.Int32" => Ok(PropertyTypeKind::Int32),
        "System.UInt32" => Ok(PropertyTypeKind::UInt32),
        "System.SByte" => Ok(PropertyTypeKind::Byte),
        "System.Byte" => Ok(PropertyTypeKind::UByte),
        other => Err(Error::UnsupportedEnumKind {
            type_name: ty.full_name(),
            underlying: other.to_string(),
        }),
    }
}

/// Widens a constant to `i32`; unsigned kinds go through `u32` so that
/// values above `i32::MAX` wrap instead of failing
fn widen(kind: PropertyTypeKind, value: i64) -> i32 {
    match kind {
        PropertyTypeKind::UByte | PropertyTypeKind::UShort | PropertyTypeKind::UInt32 => {
            value as u32 as i32
        }
        _ => value as i32,
    }
}

/// Extracts the constants of an enum type
pub fn extract_enum(ty: &TypeDef) -> Result<EnumShape> {
    let underlying = underlying_kind(ty)?;

    let mut properties = Vec::new();
    for field in ty.fields.iter().filter(|f| f.name != VALUE_FIELD) {
        let value = field
            .constant
            .as_ref()
            .and_then(|c| c.as_i64())
            .ok_or_else(|| {
                Error::missing_structure(
                    ty.full_name(),
                    format!("enum member '{}' has no integral constant", field.name),
                )
            })?;

        let name = to_upper_snake_case(&field.name);
        trace!("{}: {} = {}", ty.full_name(), name, value);
        properties.push(EnumProperty {
            name,
            value: widen(underlying, value),
            kind: underlying,
        });
    }

    Ok(EnumShape {
        underlying,
        properties,
    })
}
