//! Framework inspectors.
//!
//! Each supported code generator leaves a recognisable footprint in the
//! classes it emits. An inspector knows one such footprint: how to tell
//! whether a type was produced by its generator, which methods carry the
//! field information, and how to fold the interpreter events of those
//! methods into field shapes.
//!
//! Dispatch goes through [`Framework::detect`], which tries the inspectors
//! in [`Framework::DISPATCH_ORDER`] and returns the first match.

mod enums;
mod flatbuffer;
mod legacy;
mod mapping;
mod modern;

pub use enums::{extract_enum, EnumShape};

use crate::error::{Error, Result};
use crate::ir::{PropertyOptions, PropertyTypeKind};
use crate::metadata::{Assembly, TypeDef};
use std::fmt;
use tracing::debug;

/// Code generator that produced a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framework {
    /// protobuf-csharp-port (`GeneratedMessage` subclasses)
    Legacy,
    /// Google.Protobuf (`IMessage` with a static `Parser`)
    Modern,
    /// FlatBuffers (`IFlatbufferObject`)
    Flatbuffer,
}

impl Framework {
    /// Order in which inspectors are tried
    pub const DISPATCH_ORDER: [Framework; 3] =
        [Framework::Legacy, Framework::Modern, Framework::Flatbuffer];

    /// Returns the first framework whose footprint the type carries
    pub fn detect(ty: &TypeDef) -> Option<Self> {
        Self::DISPATCH_ORDER.into_iter().find(|f| f.matches(ty))
    }

    /// Returns true if the type looks like output of this framework
    pub fn matches(&self, ty: &TypeDef) -> bool {
        if !ty.is_class() {
            return false;
        }
        match self {
            Framework::Legacy => legacy::matches(ty),
            Framework::Modern => modern::matches(ty),
            Framework::Flatbuffer => flatbuffer::matches(ty),
        }
    }

    /// Extracts the fields of a matched type.
    ///
    /// The assembly is consulted for referenced types (to tell enums from
    /// messages when deciding packing).
    pub fn extract(&self, assembly: &Assembly, ty: &TypeDef) -> Result<Extraction> {
        let extraction = match self {
            Framework::Legacy => legacy::extract(assembly, ty)?,
            Framework::Modern => modern::extract(assembly, ty)?,
            Framework::Flatbuffer => flatbuffer::extract(ty)?,
        };
        debug!(
            "{} [{}]: {} fields, {} references",
            ty.full_name(),
            self,
            extraction.properties.len(),
            extraction.references.len()
        );
        Ok(extraction)
    }

    /// Returns a short human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Legacy => "legacy",
            Framework::Modern => "modern",
            Framework::Flatbuffer => "flatbuffer",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the framework of a type and extracts its fields
pub fn inspect(assembly: &Assembly, ty: &TypeDef) -> Result<(Framework, Extraction)> {
    let framework = Framework::detect(ty).ok_or_else(|| Error::unrecognized(ty.full_name()))?;
    Ok((framework, framework.extract(assembly, ty)?))
}

/// One recovered field, before references are resolved to handles
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    /// Field name
    pub name: String,
    /// Value kind
    pub kind: PropertyTypeKind,
    /// Qualified name of the referenced type when `kind` is `TypeRef`
    pub type_name: Option<String>,
    /// Label, order and packing
    pub options: PropertyOptions,
}

/// Fields of a type plus the types they reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Fields in declaration order
    pub properties: Vec<FieldShape>,
    /// Referenced type names, first occurrence order, without duplicates
    pub references: Vec<String>,
}

impl Extraction {
    fn push(&mut self, shape: FieldShape) {
        if let Some(name) = &shape.type_name {
            if !self.references.contains(name) {
                self.references.push(name.clone());
            }
        }
        self.properties.push(shape);
    }

    fn property_mut(&mut self, name: &str) -> Option<&mut FieldShape> {
        self.properties.iter_mut().find(|p| p.name == name)
    }
}
