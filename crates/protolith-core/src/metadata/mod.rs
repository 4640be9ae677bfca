//! Read-only model of the assembly metadata consumed by the pipeline.
//!
//! The model mirrors what a CLI metadata reader exposes: types with their
//! namespace, interfaces, fields, properties and methods, and for every
//! method the raw instruction sequence. It is deserialized from a JSON dump
//! written by an external metadata reader, so nothing in here knows about
//! PE files or metadata tables.
//!
//! ## Naming
//!
//! Qualified names follow the usual CLI conventions: `Namespace.Type` for
//! top level types and `Namespace.Outer/Inner` for nested types. Generic
//! definitions keep their arity suffix (`RepeatedField`1`).

mod builder;

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Full name of the void type, used as the default return type
pub const VOID: &str = "System.Void";

/// Reference to a (possibly generic) type by its qualified name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct TypeRef {
    /// Qualified name, e.g. `System.Int32` or `Game.Net.Foo/Types/Bar`
    pub full_name: String,
    /// Generic arguments when this is a generic instance
    #[serde(default)]
    pub generic_arguments: Vec<TypeRef>,
}

impl TypeRef {
    /// Creates a non-generic type reference
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            generic_arguments: Vec::new(),
        }
    }

    /// Creates a generic instance reference
    pub fn generic(full_name: impl Into<String>, arguments: Vec<TypeRef>) -> Self {
        Self {
            full_name: full_name.into(),
            generic_arguments: arguments,
        }
    }

    /// Returns the simple name (last path component)
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit(['.', '/'])
            .next()
            .unwrap_or(&self.full_name)
    }

    /// Returns the namespace of the outermost declaring type
    pub fn namespace(&self) -> &str {
        let outer = self.full_name.split('/').next().unwrap_or(&self.full_name);
        outer.rfind('.').map_or("", |idx| &outer[..idx])
    }

    /// Returns true if this is an instance of a generic type
    pub fn is_generic_instance(&self) -> bool {
        !self.generic_arguments.is_empty()
    }

    /// Returns true if this reference names `System.Void`
    pub fn is_void(&self) -> bool {
        self.full_name == VOID
    }
}

fn void() -> TypeRef {
    TypeRef::new(VOID)
}

/// Kind of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    /// Reference type
    #[default]
    Class,
    /// Value type
    Struct,
    /// Interface
    Interface,
    /// Enumeration
    Enum,
}

/// Compile-time constant attached to a field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Constant {
    /// Signed integer constant
    Int(i64),
    /// Unsigned integer constant too large for `i64`
    UInt(u64),
    /// Floating point constant
    Float(f64),
    /// Boolean constant
    Bool(bool),
    /// String constant
    Str(String),
}

impl Constant {
    /// Returns the constant as a 64-bit signed integer, if it is integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(*v),
            Constant::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

/// Field declared on a type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: TypeRef,
    /// Whether the field is static
    #[serde(default)]
    pub is_static: bool,
    /// Literal value for `const` fields and enum members
    #[serde(default)]
    pub constant: Option<Constant>,
}

/// Property declared on a type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Declared type
    pub property_type: TypeRef,
    /// Whether the property is static
    #[serde(default)]
    pub is_static: bool,
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterDef {
    /// Parameter name (may be empty)
    #[serde(default)]
    pub name: String,
    /// Declared type
    pub parameter_type: TypeRef,
}

/// Method declared on a type, including its body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodDef {
    /// Method name (`.ctor` / `.cctor` for constructors)
    pub name: String,
    /// Whether the method is static
    #[serde(default)]
    pub is_static: bool,
    /// Declared parameters, excluding `this`
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    /// Declared return type
    #[serde(default = "void")]
    pub return_type: TypeRef,
    /// Instruction stream of the body
    #[serde(default)]
    pub body: Vec<Instruction>,
}

impl MethodDef {
    /// Returns true for instance and static constructors
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor" || self.name == ".cctor"
    }

    /// Returns true for the type initializer
    pub fn is_static_constructor(&self) -> bool {
        self.is_constructor() && self.is_static
    }

    /// Returns true if the method takes exactly one parameter whose type is
    /// named `type_name`; by-reference parameters (`T&`) count as `T`
    pub fn has_single_parameter(&self, type_name: &str) -> bool {
        matches!(
            self.parameters.as_slice(),
            [p] if p.parameter_type.name().trim_end_matches('&') == type_name
        )
    }
}

/// Reference to a method, as found in a call operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct MethodRef {
    /// Qualified name of the declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Parameter types, excluding `this`
    pub parameters: Vec<TypeRef>,
    /// Return type
    #[serde(default = "void")]
    pub return_type: TypeRef,
    /// Whether the method takes an implicit `this`
    #[serde(default)]
    pub has_this: bool,
}

impl MethodRef {
    /// Returns `DeclaringType::Name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.declaring_type, self.name)
    }

    /// Returns true if calling this method pushes a value
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }
}

/// Reference to a field, as found in a load/store operand
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct FieldRef {
    /// Qualified name of the declaring type
    pub declaring_type: String,
    /// Field name
    pub name: String,
    /// Declared field type
    pub field_type: TypeRef,
}

/// Instruction operand
///
/// Which variant is meaningful depends on the opcode: `ldstr` and `newarr`
/// both carry text, for instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// Integer immediate, local/argument index or branch target
    Int(i64),
    /// Floating point immediate
    Float(f64),
    /// Method token
    Method(MethodRef),
    /// Field token
    Field(FieldRef),
    /// String literal or type name
    Text(String),
}

/// One instruction of a method body
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Instruction {
    /// Byte offset inside the body
    #[serde(default)]
    pub offset: u32,
    /// Opcode mnemonic, e.g. `ldc.i4.s`
    pub opcode: String,
    /// Operand, if the opcode takes one
    #[serde(default)]
    pub operand: Option<Operand>,
}

/// Type definition with all members
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeDef {
    /// Namespace of the type (of the outermost type for nested types)
    #[serde(default)]
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Qualified name of the enclosing type for nested types
    #[serde(default)]
    pub declaring_type: Option<String>,
    /// Kind of type
    #[serde(default)]
    pub kind: TypeKind,
    /// Base type, if any
    #[serde(default)]
    pub base_type: Option<TypeRef>,
    /// Directly implemented interfaces
    #[serde(default)]
    pub interfaces: Vec<TypeRef>,
    /// Declared fields
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Declared properties
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    /// Declared methods
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// Returns the qualified name (`Ns.Type` or `Ns.Outer/Inner`)
    pub fn full_name(&self) -> String {
        match &self.declaring_type {
            Some(outer) => format!("{}/{}", outer, self.name),
            None if self.namespace.is_empty() => self.name.clone(),
            None => format!("{}.{}", self.namespace, self.name),
        }
    }

    /// Returns true for enumerations
    pub fn is_enum(&self) -> bool {
        self.kind == TypeKind::Enum
    }

    /// Returns true for classes and structs
    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeKind::Class | TypeKind::Struct)
    }

    /// Returns true if the type directly implements an interface with this simple name
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i.name() == interface)
    }

    /// Finds a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds a property by name
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Finds the first method with this name
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Returns the type initializer, if declared
    pub fn static_constructor(&self) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.is_static_constructor())
    }
}

#[derive(Debug, Deserialize)]
struct AssemblyDump {
    #[serde(default)]
    name: String,
    #[serde(default)]
    types: Vec<TypeDef>,
}

/// A loaded assembly: the ordered set of type definitions plus a name index
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    name: String,
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
}

impl Assembly {
    /// Creates an assembly from type definitions, keeping their order
    pub fn new(name: impl Into<String>, types: Vec<TypeDef>) -> Self {
        let mut assembly = Self {
            name: name.into(),
            types: Vec::with_capacity(types.len()),
            index: HashMap::with_capacity(types.len()),
        };
        for ty in types {
            assembly.insert(ty);
        }
        assembly
    }

    /// Parses a JSON metadata dump
    pub fn from_json(json: &str) -> Result<Self> {
        let dump: AssemblyDump = serde_json::from_str(json)?;
        debug!(
            "Loaded metadata for '{}' ({} types)",
            dump.name,
            dump.types.len()
        );
        Ok(Self::new(dump.name, dump.types))
    }

    /// Reads and parses a JSON metadata dump from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_json(&json)
    }

    fn insert(&mut self, ty: TypeDef) {
        let full_name = ty.full_name();
        if self.index.contains_key(&full_name) {
            warn!("Ignoring duplicate definition of type '{}'", full_name);
            return;
        }
        self.index.insert(full_name, self.types.len());
        self.types.push(ty);
    }

    /// Appends the types of another assembly; first definition of a name wins
    pub fn merge(&mut self, other: Assembly) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        for ty in other.types {
            self.insert(ty);
        }
    }

    /// Returns the assembly name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all type definitions in declaration order
    pub fn types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Looks up a type by qualified name
    pub fn find(&self, full_name: &str) -> Option<&TypeDef> {
        self.index.get(full_name).map(|&i| &self.types[i])
    }

    /// Returns the declaration position of a type
    pub fn position(&self, full_name: &str) -> Option<usize> {
        self.index.get(full_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DUMP: &str = r#"{
        "name": "Game.Protocol",
        "types": [
            {
                "namespace": "Game.Net",
                "name": "Login",
                "interfaces": [{ "full_name": "Google.Protobuf.IMessage`1",
                                 "generic_arguments": [{ "full_name": "Game.Net.Login" }] }],
                "fields": [
                    { "name": "UserFieldNumber", "field_type": { "full_name": "System.Int32" },
                      "is_static": true, "constant": 1 }
                ],
                "methods": [
                    { "name": ".cctor", "is_static": true, "body": [
                        { "offset": 0, "opcode": "ldc.i4.s", "operand": 18 },
                        { "offset": 2, "opcode": "ldstr", "operand": "hello" },
                        { "offset": 7, "opcode": "call", "operand": {
                            "declaring_type": "Google.Protobuf.FieldCodec",
                            "name": "ForString",
                            "parameters": [{ "full_name": "System.UInt32" }],
                            "return_type": { "full_name": "Google.Protobuf.FieldCodec`1" } } },
                        { "offset": 12, "opcode": "stsfld", "operand": {
                            "declaring_type": "Game.Net.Login",
                            "name": "_repeated_names_codec",
                            "field_type": { "full_name": "Google.Protobuf.FieldCodec`1" } } },
                        { "offset": 17, "opcode": "ret" }
                    ]}
                ]
            },
            { "namespace": "Game.Net", "name": "Kind", "declaring_type": "Game.Net.Login", "kind": "enum" }
        ]
    }"#;

    #[test]
    fn test_parse_dump() {
        let assembly = Assembly::from_json(DUMP).unwrap();
        assert_eq!(assembly.name(), "Game.Protocol");
        assert_eq!(assembly.types().len(), 2);

        let login = assembly.find("Game.Net.Login").unwrap();
        assert!(login.implements("IMessage`1"));
        assert_eq!(
            login.field("UserFieldNumber").unwrap().constant,
            Some(Constant::Int(1))
        );

        let cctor = login.static_constructor().unwrap();
        assert_eq!(cctor.body.len(), 5);
        assert_eq!(cctor.body[0].operand, Some(Operand::Int(18)));
        assert_eq!(cctor.body[1].operand, Some(Operand::Text("hello".into())));
        assert!(matches!(cctor.body[2].operand, Some(Operand::Method(ref m)) if m.name == "ForString"));
        assert!(matches!(cctor.body[3].operand, Some(Operand::Field(ref f)) if f.name == "_repeated_names_codec"));
        assert_eq!(cctor.body[4].operand, None);

        let nested = assembly.find("Game.Net.Login/Kind").unwrap();
        assert!(nested.is_enum());
    }

    #[test]
    fn test_type_ref_names() {
        let r = TypeRef::new("Game.Net.Login/Types/Kind");
        assert_eq!(r.name(), "Kind");
        assert_eq!(r.namespace(), "Game.Net");

        let r = TypeRef::new("System.Int32");
        assert_eq!(r.name(), "Int32");
        assert_eq!(r.namespace(), "System");

        let r = TypeRef::new("Global");
        assert_eq!(r.name(), "Global");
        assert_eq!(r.namespace(), "");
    }

    #[test]
    fn test_unsigned_constant() {
        let field: FieldDef = serde_json::from_str(
            r#"{ "name": "Max", "field_type": { "full_name": "System.UInt64" },
                 "constant": 18446744073709551615 }"#,
        )
        .unwrap();
        assert_eq!(field.constant, Some(Constant::UInt(u64::MAX)));
        assert_eq!(field.constant.unwrap().as_i64(), None);
    }

    #[test]
    fn test_merge_keeps_first_definition() {
        let mut a = Assembly::new("a", vec![TypeDef::class("Ns", "Foo")]);
        let b = Assembly::new(
            "b",
            vec![TypeDef::enumeration("Ns", "Foo"), TypeDef::class("Ns", "Bar")],
        );
        a.merge(b);
        assert_eq!(a.types().len(), 2);
        assert!(!a.find("Ns.Foo").unwrap().is_enum());
        assert_eq!(a.position("Ns.Bar"), Some(1));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            Assembly::from_json("{ not json"),
            Err(Error::MetadataParse(_))
        ));
    }
}
