//! Intermediate representation of a recovered schema program.
//!
//! A [`Program`] owns two arenas, one for [`Class`]es and one for [`Enum`]s,
//! plus the ordered list of [`Namespace`]s. Namespaces and classes refer to
//! their members through [`TypeHandle`]s, and so do type-referencing
//! properties. Handles are never invalidated: passes move handles between
//! namespaces but never remove arena entries.
//!
//! The reference graph between classes may contain cycles (a message can
//! refer to itself or to a message that refers back to it); only the
//! ownership tree (namespace → top-level type → nested types) is acyclic.

mod graph;

pub use graph::{mutually_reachable, NamespaceGraph};

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Index of a class in the program arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

/// Index of an enum in the program arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub(crate) usize);

/// Handle to any named type of the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeHandle {
    /// A message / table
    Class(ClassId),
    /// An enumeration
    Enum(EnumId),
}

/// Value kind of a class property or enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyTypeKind {
    /// 64-bit float
    Double,
    /// 32-bit float
    Float,
    /// Signed 8-bit integer
    Byte,
    /// Unsigned 8-bit integer
    UByte,
    /// Signed 16-bit integer
    Short,
    /// Unsigned 16-bit integer
    UShort,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 32-bit integer
    UInt32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 64-bit integer
    UInt64,
    /// Zigzag-encoded 32-bit integer
    SInt32,
    /// Zigzag-encoded 64-bit integer
    SInt64,
    /// Fixed-width unsigned 32-bit integer
    Fixed32,
    /// Fixed-width unsigned 64-bit integer
    Fixed64,
    /// Fixed-width signed 32-bit integer
    SFixed32,
    /// Fixed-width signed 64-bit integer
    SFixed64,
    /// Boolean
    Bool,
    /// UTF-8 string
    String,
    /// Opaque bytes
    Bytes,
    /// Reference to another class or enum of the program
    TypeRef,
}

impl PropertyTypeKind {
    /// Returns true for integer and floating point kinds
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Bool | Self::String | Self::Bytes | Self::TypeRef)
    }

    /// Returns true for the kinds an enum may use as underlying type
    pub fn is_enum_underlying(&self) -> bool {
        matches!(
            self,
            Self::Byte | Self::UByte | Self::Short | Self::UShort | Self::Int32 | Self::UInt32
        )
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldLabel {
    /// Singular, may be absent
    #[default]
    Optional,
    /// Singular, must be present
    Required,
    /// Zero or more values
    Repeated,
}

/// Per-property options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyOptions {
    /// Cardinality
    pub label: FieldLabel,
    /// Wire tag (protobuf) or declaration order (flatbuffers)
    pub order: u32,
    /// Packed encoding of a repeated scalar field
    pub packed: bool,
}

/// A field of a class
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProperty {
    /// Field name as recovered from the assembly
    pub name: String,
    /// Value kind
    pub kind: PropertyTypeKind,
    /// Referenced type, present exactly when `kind` is `TypeRef`
    pub reference: Option<TypeHandle>,
    /// Label, order and packing
    pub options: PropertyOptions,
}

/// A message or table
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    /// Qualified name in the assembly
    pub original_name: String,
    /// Display name used by emitters
    pub short_name: String,
    /// Namespace the type was declared in
    pub origin_namespace: String,
    /// Fields in declaration order
    pub properties: Vec<ClassProperty>,
    /// Types declared inside this one
    pub private_types: Vec<TypeHandle>,
}

/// A named enum constant
#[derive(Debug, Clone, PartialEq)]
pub struct EnumProperty {
    /// Constant name
    pub name: String,
    /// Value widened to `i32`
    pub value: i32,
    /// Underlying kind of the owning enum
    pub kind: PropertyTypeKind,
}

/// An enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
    /// Qualified name in the assembly
    pub original_name: String,
    /// Display name used by emitters
    pub short_name: String,
    /// Namespace the type was declared in
    pub origin_namespace: String,
    /// Constants in declaration order
    pub properties: Vec<EnumProperty>,
    /// Underlying integer kind
    pub underlying: PropertyTypeKind,
}

impl Enum {
    /// Returns the original integral value of a constant, narrowed back
    /// from its `i32` widening according to the underlying kind
    pub fn underlying_value(&self, property: &EnumProperty) -> i64 {
        match self.underlying {
            PropertyTypeKind::Byte => property.value as i8 as i64,
            PropertyTypeKind::UByte => property.value as u8 as i64,
            PropertyTypeKind::Short => property.value as i16 as i64,
            PropertyTypeKind::UShort => property.value as u16 as i64,
            PropertyTypeKind::UInt32 => property.value as u32 as i64,
            _ => property.value as i64,
        }
    }
}

/// A schema package
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    /// Name as declared in the assembly
    pub original_name: String,
    /// Last segment of `full_name`
    pub short_name: String,
    /// Dotted package name
    pub full_name: String,
    /// Top-level classes
    pub classes: Vec<ClassId>,
    /// Top-level enums
    pub enums: Vec<EnumId>,
}

impl Namespace {
    /// Creates an empty namespace
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut ns = Self {
            original_name: name.clone(),
            short_name: String::new(),
            full_name: String::new(),
            classes: Vec::new(),
            enums: Vec::new(),
        };
        ns.rename(name);
        ns
    }

    /// Sets the full name and derives the short name from it
    pub fn rename(&mut self, full_name: impl Into<String>) {
        self.full_name = full_name.into();
        self.short_name = self
            .full_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_string();
    }

    /// Returns true if the namespace declares no type
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.enums.is_empty()
    }

    /// Returns handles of the top-level types, classes first
    pub fn top_level(&self) -> impl Iterator<Item = TypeHandle> + '_ {
        self.classes
            .iter()
            .map(|&c| TypeHandle::Class(c))
            .chain(self.enums.iter().map(|&e| TypeHandle::Enum(e)))
    }
}

/// A complete recovered program
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Namespaces in emission order
    pub namespaces: Vec<Namespace>,
    classes: Vec<Class>,
    enums: Vec<Enum>,
}

impl Program {
    /// Creates an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class to the arena; the caller places it in a namespace or owner
    pub fn add_class(&mut self, class: Class) -> ClassId {
        self.classes.push(class);
        ClassId(self.classes.len() - 1)
    }

    /// Adds an enum to the arena; the caller places it in a namespace or owner
    pub fn add_enum(&mut self, enumeration: Enum) -> EnumId {
        self.enums.push(enumeration);
        EnumId(self.enums.len() - 1)
    }

    /// Returns a class by id
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0]
    }

    /// Returns a class by id, mutably
    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.0]
    }

    /// Returns an enum by id
    pub fn enumeration(&self, id: EnumId) -> &Enum {
        &self.enums[id.0]
    }

    /// Returns an enum by id, mutably
    pub fn enumeration_mut(&mut self, id: EnumId) -> &mut Enum {
        &mut self.enums[id.0]
    }

    /// Iterates all classes with their ids
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes.iter().enumerate().map(|(i, c)| (ClassId(i), c))
    }

    /// Iterates all enums with their ids
    pub fn enums(&self) -> impl Iterator<Item = (EnumId, &Enum)> {
        self.enums.iter().enumerate().map(|(i, e)| (EnumId(i), e))
    }

    /// Number of types in the arenas
    pub fn type_count(&self) -> usize {
        self.classes.len() + self.enums.len()
    }

    /// Returns the display name of a type
    pub fn short_name(&self, handle: TypeHandle) -> &str {
        match handle {
            TypeHandle::Class(id) => &self.class(id).short_name,
            TypeHandle::Enum(id) => &self.enumeration(id).short_name,
        }
    }

    /// Returns the qualified assembly name of a type
    pub fn original_name(&self, handle: TypeHandle) -> &str {
        match handle {
            TypeHandle::Class(id) => &self.class(id).original_name,
            TypeHandle::Enum(id) => &self.enumeration(id).original_name,
        }
    }

    /// Renames a type
    pub fn set_short_name(&mut self, handle: TypeHandle, name: String) {
        match handle {
            TypeHandle::Class(id) => self.class_mut(id).short_name = name,
            TypeHandle::Enum(id) => self.enumeration_mut(id).short_name = name,
        }
    }

    /// Returns the private types of a handle (empty for enums)
    pub fn private_types(&self, handle: TypeHandle) -> &[TypeHandle] {
        match handle {
            TypeHandle::Class(id) => &self.class(id).private_types,
            TypeHandle::Enum(_) => &[],
        }
    }

    /// Returns every type of a namespace in ownership order: each top-level
    /// type followed by its nested types, depth first
    pub fn namespace_types(&self, index: usize) -> Vec<TypeHandle> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for handle in self.namespaces[index].top_level() {
            self.collect_owned(handle, &mut out, &mut seen);
        }
        out
    }

    fn collect_owned(
        &self,
        handle: TypeHandle,
        out: &mut Vec<TypeHandle>,
        seen: &mut HashSet<TypeHandle>,
    ) {
        if !seen.insert(handle) {
            return;
        }
        out.push(handle);
        for &nested in self.private_types(handle) {
            self.collect_owned(nested, out, seen);
        }
    }

    /// Maps every placed type to the index of the namespace containing it
    pub fn locations(&self) -> HashMap<TypeHandle, usize> {
        let mut map = HashMap::with_capacity(self.type_count());
        for index in 0..self.namespaces.len() {
            for handle in self.namespace_types(index) {
                map.insert(handle, index);
            }
        }
        map
    }

    /// Finds a namespace by its current full name
    pub fn find_namespace(&self, full_name: &str) -> Option<usize> {
        self.namespaces.iter().position(|n| n.full_name == full_name)
    }

    /// Returns the index of the namespace named `full_name`, creating it if absent
    pub fn ensure_namespace(&mut self, full_name: &str) -> usize {
        match self.find_namespace(full_name) {
            Some(index) => index,
            None => {
                self.namespaces.push(Namespace::new(full_name));
                self.namespaces.len() - 1
            }
        }
    }

    /// Moves all members of namespace `source` into `target`, keeping order.
    /// The emptied source stays in place; see [`Program::remove_empty_namespaces`].
    pub fn move_members(&mut self, source: usize, target: usize) {
        if source == target {
            return;
        }
        let classes = std::mem::take(&mut self.namespaces[source].classes);
        let enums = std::mem::take(&mut self.namespaces[source].enums);
        self.namespaces[target].classes.extend(classes);
        self.namespaces[target].enums.extend(enums);
    }

    /// Merges namespaces that share a full name into the first of them
    pub fn merge_duplicate_namespaces(&mut self) -> usize {
        let mut first: HashMap<String, usize> = HashMap::new();
        let mut merged = 0;
        for index in 0..self.namespaces.len() {
            let name = self.namespaces[index].full_name.clone();
            match first.get(&name) {
                Some(&target) => {
                    self.move_members(index, target);
                    merged += 1;
                }
                None => {
                    first.insert(name, index);
                }
            }
        }
        self.remove_empty_namespaces();
        merged
    }

    /// Drops namespaces without members
    pub fn remove_empty_namespaces(&mut self) {
        self.namespaces.retain(|n| !n.is_empty());
    }

    /// Checks the structural invariants of the program.
    ///
    /// `stage` names the producer of the program in the error.
    pub fn validate(&self, stage: &str) -> Result<()> {
        self.validate_placement(stage)?;

        for (id, class) in self.classes() {
            let mut orders = HashSet::new();
            for property in &class.properties {
                match (property.kind, property.reference) {
                    (PropertyTypeKind::TypeRef, None) => {
                        return Err(Error::invariant(
                            stage,
                            format!(
                                "property '{}.{}' has no referenced type",
                                class.original_name, property.name
                            ),
                        ));
                    }
                    (PropertyTypeKind::TypeRef, Some(handle)) if !self.contains(handle) => {
                        return Err(Error::invariant(
                            stage,
                            format!(
                                "property '{}.{}' references a type outside the program",
                                class.original_name, property.name
                            ),
                        ));
                    }
                    (kind, Some(_)) if kind != PropertyTypeKind::TypeRef => {
                        return Err(Error::invariant(
                            stage,
                            format!(
                                "scalar property '{}.{}' carries a type reference",
                                class.original_name, property.name
                            ),
                        ));
                    }
                    _ => {}
                }
                if !orders.insert(property.options.order) {
                    return Err(Error::invariant(
                        stage,
                        format!(
                            "order {} is used twice in '{}' (class #{})",
                            property.options.order, class.original_name, id.0
                        ),
                    ));
                }
            }
        }

        for (_, enumeration) in self.enums() {
            if enumeration.properties.is_empty() {
                return Err(Error::invariant(
                    stage,
                    format!("enum '{}' has no values", enumeration.original_name),
                ));
            }
            if let Some(p) = enumeration
                .properties
                .iter()
                .find(|p| p.kind != enumeration.underlying)
            {
                return Err(Error::invariant(
                    stage,
                    format!(
                        "enum '{}' value '{}' has kind {:?}, expected {:?}",
                        enumeration.original_name, p.name, p.kind, enumeration.underlying
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Like [`Program::validate`], additionally requiring lowercase namespace names
    pub fn validate_normalized(&self, stage: &str) -> Result<()> {
        self.validate(stage)?;
        for ns in &self.namespaces {
            if ns.full_name != ns.full_name.to_lowercase()
                || ns.short_name != ns.short_name.to_lowercase()
            {
                return Err(Error::invariant(
                    stage,
                    format!("namespace '{}' is not lowercase", ns.full_name),
                ));
            }
        }
        Ok(())
    }

    fn contains(&self, handle: TypeHandle) -> bool {
        match handle {
            TypeHandle::Class(id) => id.0 < self.classes.len(),
            TypeHandle::Enum(id) => id.0 < self.enums.len(),
        }
    }

    /// Every arena entry must be owned exactly once
    fn validate_placement(&self, stage: &str) -> Result<()> {
        let mut owners: HashMap<TypeHandle, usize> = HashMap::new();
        let mut visit = |handle: TypeHandle| -> Result<()> {
            if !self.contains(handle) {
                return Err(Error::invariant(stage, format!("dangling handle {:?}", handle)));
            }
            *owners.entry(handle).or_default() += 1;
            Ok(())
        };

        for ns in &self.namespaces {
            for handle in ns.top_level() {
                visit(handle)?;
            }
        }
        for (_, class) in self.classes() {
            for &handle in &class.private_types {
                visit(handle)?;
            }
        }

        let all = self
            .classes()
            .map(|(id, _)| TypeHandle::Class(id))
            .chain(self.enums().map(|(id, _)| TypeHandle::Enum(id)));
        for handle in all {
            match owners.get(&handle).copied().unwrap_or(0) {
                1 => {}
                0 => {
                    return Err(Error::invariant(
                        stage,
                        format!("type '{}' was lost", self.original_name(handle)),
                    ))
                }
                n => {
                    return Err(Error::invariant(
                        stage,
                        format!("type '{}' is owned {} times", self.original_name(handle), n),
                    ))
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, ns) in self.namespaces.iter().enumerate() {
            writeln!(f, "namespace {}", ns.full_name)?;
            for handle in self.namespace_types(index) {
                writeln!(f, "  {}", self.short_name(handle))?;
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_ok() {
        let mut program = Program::new();
        let status = place_enum(&mut program, "game", enumeration("game", "Status", &[("OK", 0)]));
        place_class(
            &mut program,
            "game",
            class(
                "game",
                "Login",
                vec![
                    property("user", PropertyTypeKind::String, 1),
                    reference("status", TypeHandle::Enum(status), 2),
                ],
            ),
        );
        program.validate("test").unwrap();
        program.validate_normalized("test").unwrap();
    }

    #[test]
    fn test_validate_duplicate_order() {
        let mut program = Program::new();
        place_class(
            &mut program,
            "game",
            class(
                "game",
                "Login",
                vec![
                    property("a", PropertyTypeKind::String, 1),
                    property("b", PropertyTypeKind::Int32, 1),
                ],
            ),
        );
        let err = program.validate("test").unwrap_err();
        assert!(err.to_string().contains("order 1 is used twice"));
    }

    #[test]
    fn test_validate_lost_type() {
        let mut program = Program::new();
        program.add_class(class("game", "Orphan", vec![]));
        let err = program.validate("decompile").unwrap_err();
        assert!(err.to_string().contains("'game.Orphan' was lost"));
    }

    #[test]
    fn test_validate_empty_enum() {
        let mut program = Program::new();
        place_enum(&mut program, "game", enumeration("game", "Empty", &[]));
        assert!(program.validate("test").is_err());
    }

    #[test]
    fn test_validate_normalized_rejects_uppercase() {
        let mut program = Program::new();
        place_class(&mut program, "Game", class("Game", "Login", vec![]));
        program.validate("test").unwrap();
        assert!(program.validate_normalized("test").is_err());
    }

    #[test]
    fn test_merge_duplicate_namespaces() {
        let mut program = Program::new();
        place_class(&mut program, "a", class("a", "One", vec![]));
        place_class(&mut program, "b", class("b", "Two", vec![]));
        program.namespaces.push(Namespace::new("a"));
        let three = program.add_class(class("a", "Three", vec![]));
        program.namespaces[2].classes.push(three);

        assert_eq!(program.merge_duplicate_namespaces(), 1);
        assert_eq!(program.namespaces.len(), 2);
        assert_eq!(program.namespaces[0].classes.len(), 2);
        program.validate("test").unwrap();
    }

    #[test]
    fn test_namespace_types_include_nested() {
        let mut program = Program::new();
        let kind = program.add_enum(enumeration("game", "Kind", &[("A", 0)]));
        let mut outer = class("game", "Outer", vec![]);
        outer.private_types.push(TypeHandle::Enum(kind));
        let outer = place_class(&mut program, "game", outer);

        assert_eq!(
            program.namespace_types(0),
            vec![TypeHandle::Class(outer), TypeHandle::Enum(kind)]
        );
        assert_eq!(program.locations().len(), 2);
    }

    #[test]
    fn test_namespace_rename() {
        let mut ns = Namespace::new("Game.Net");
        assert_eq!(ns.short_name, "Net");
        ns.rename("game.net.core");
        assert_eq!(ns.short_name, "core");
    }

    #[test]
    fn test_underlying_value() {
        let mut e = enumeration("game", "Flags", &[("HIGH", -2_147_483_648)]);
        e.underlying = PropertyTypeKind::UInt32;
        assert_eq!(e.underlying_value(&e.properties[0]), 2_147_483_648);
    }
}
