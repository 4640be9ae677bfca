//! Builds the IR program from an assembly.
//!
//! Decompilation starts from every generated message type plus the enums
//! explicitly asked for, and follows field references until the set of
//! types is closed. The result is placed into namespaces in assembly
//! declaration order; nested types end up inside their nearest decompiled
//! enclosing class.

use crate::error::{Error, Result};
use crate::inspector::{self, extract_enum, EnumShape, Extraction, Framework};
use crate::ir::{Class, ClassProperty, Enum, Program, TypeHandle};
use crate::metadata::{Assembly, TypeDef};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, trace};

/// Configuration for decompilation
#[derive(Debug, Clone, Default)]
pub struct DecompilerConfig {
    /// Enums decompiled even when no message references them, matched by
    /// qualified or simple name
    pub include_enums: Vec<String>,
}

impl DecompilerConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds enums to decompile unconditionally
    pub fn include_enums<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_enums.extend(names.into_iter().map(Into::into));
        self
    }

    fn includes(&self, ty: &TypeDef) -> bool {
        let full_name = ty.full_name();
        self.include_enums
            .iter()
            .any(|n| *n == full_name || *n == ty.name)
    }
}

enum Decoded {
    Class(Extraction),
    Enum(EnumShape),
}

/// Recovers the schema program of an assembly
#[derive(Debug)]
pub struct Decompiler<'a> {
    assembly: &'a Assembly,
    config: DecompilerConfig,
}

impl<'a> Decompiler<'a> {
    /// Creates a decompiler with default configuration
    pub fn new(assembly: &'a Assembly) -> Self {
        Self {
            assembly,
            config: DecompilerConfig::default(),
        }
    }

    /// Sets the configuration
    pub fn with_config(mut self, config: DecompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the qualified names the closure starts from
    pub fn roots(&self) -> Vec<String> {
        self.assembly
            .types()
            .iter()
            .filter(|ty| {
                if ty.is_enum() {
                    self.config.includes(ty)
                } else {
                    Framework::detect(ty).is_some()
                }
            })
            .map(TypeDef::full_name)
            .collect()
    }

    /// Runs the closure and builds the program
    pub fn decompile(&self) -> Result<Program> {
        let decoded = self.closure()?;

        let mut names: Vec<&String> = decoded.keys().collect();
        names.sort_by_key(|name| self.assembly.position(name));

        let mut program = Program::new();
        let mut handles: HashMap<&str, TypeHandle> = HashMap::with_capacity(names.len());
        for &name in &names {
            let ty = self.lookup(name)?;
            let handle = match &decoded[name] {
                Decoded::Class(_) => TypeHandle::Class(program.add_class(Class {
                    original_name: name.clone(),
                    short_name: ty.name.clone(),
                    origin_namespace: ty.namespace.clone(),
                    properties: Vec::new(),
                    private_types: Vec::new(),
                })),
                Decoded::Enum(shape) => TypeHandle::Enum(program.add_enum(Enum {
                    original_name: name.clone(),
                    short_name: ty.name.clone(),
                    origin_namespace: ty.namespace.clone(),
                    properties: shape.properties.clone(),
                    underlying: shape.underlying,
                })),
            };
            handles.insert(name.as_str(), handle);
        }

        for &name in &names {
            let (Decoded::Class(extraction), TypeHandle::Class(id)) = (&decoded[name], handles[name.as_str()])
            else {
                continue;
            };
            let mut properties = Vec::with_capacity(extraction.properties.len());
            for shape in &extraction.properties {
                let reference = match &shape.type_name {
                    Some(target) => Some(*handles.get(target.as_str()).ok_or_else(|| {
                        Error::internal(format!("'{}' escaped the closure of '{}'", target, name))
                    })?),
                    None => None,
                };
                properties.push(ClassProperty {
                    name: shape.name.clone(),
                    kind: shape.kind,
                    reference,
                    options: shape.options,
                });
            }
            program.class_mut(id).properties = properties;
        }

        for &name in &names {
            let ty = self.lookup(name)?;
            let handle = handles[name.as_str()];
            match self.owner(ty, &handles) {
                Some(owner) => {
                    trace!("{} is nested in class #{}", name, owner.0);
                    program.class_mut(owner).private_types.push(handle);
                }
                None => {
                    let index = program.ensure_namespace(&ty.namespace);
                    let ns = &mut program.namespaces[index];
                    match handle {
                        TypeHandle::Class(id) => ns.classes.push(id),
                        TypeHandle::Enum(id) => ns.enums.push(id),
                    }
                }
            }
        }

        program.validate("decompile")?;
        info!(
            "Decompiled {} types into {} namespaces",
            program.type_count(),
            program.namespaces.len()
        );
        Ok(program)
    }

    fn lookup(&self, name: &str) -> Result<&'a TypeDef> {
        self.assembly
            .find(name)
            .ok_or_else(|| Error::internal(format!("type '{}' vanished from the assembly", name)))
    }

    /// Nearest enclosing type that was decompiled as a class
    fn owner(&self, ty: &TypeDef, handles: &HashMap<&str, TypeHandle>) -> Option<crate::ir::ClassId> {
        let mut outer = ty.declaring_type.as_deref();
        while let Some(name) = outer {
            if let Some(TypeHandle::Class(id)) = handles.get(name) {
                return Some(*id);
            }
            outer = self
                .assembly
                .find(name)
                .and_then(|t| t.declaring_type.as_deref());
        }
        None
    }

    /// Work-list traversal from the roots over field references
    fn closure(&self) -> Result<HashMap<String, Decoded>> {
        let mut queue: VecDeque<(String, Option<String>)> =
            self.roots().into_iter().map(|name| (name, None)).collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut decoded = HashMap::new();

        debug!("Decompilation starts from {} roots", queue.len());

        while let Some((name, from)) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let ty = self.assembly.find(&name).ok_or_else(|| Error::UnresolvedType {
                from: from.clone().unwrap_or_default(),
                referenced: name.clone(),
            })?;

            let result = if ty.is_enum() {
                Decoded::Enum(extract_enum(ty)?)
            } else {
                let (_, extraction) = inspector::inspect(self.assembly, ty)?;
                for reference in &extraction.references {
                    if !visited.contains(reference) {
                        queue.push_back((reference.clone(), Some(name.clone())));
                    }
                }
                Decoded::Class(extraction)
            };
            decoded.insert(name, result);
        }

        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::PropertyTypeKind;
    use crate::metadata::{Constant, MethodDef, TypeRef};
    use pretty_assertions::assert_eq;

    fn t(name: &str) -> TypeRef {
        TypeRef::new(name)
    }

    fn table(namespace: &str, name: &str) -> TypeDef {
        TypeDef::class(namespace, name).implementing(t("FlatBuffers.IFlatbufferObject"))
    }

    fn color(namespace: &str, name: &str) -> TypeDef {
        TypeDef::enumeration(namespace, name)
            .with_field("value__", t("System.SByte"))
            .with_constant("Red", t("Game.Color"), Constant::Int(0))
            .with_constant("Green", t("Game.Color"), Constant::Int(1))
    }

    fn assembly() -> Assembly {
        Assembly::new(
            "game",
            vec![
                table("Game.World", "Monster")
                    .with_property("Name", t("System.String"))
                    .with_property("Color", t("Game.Common.Color"))
                    .with_property("PosLength", t("System.Int32"))
                    .with_method(MethodDef::new("Pos", t("Game.World.Monster/Vec3"))),
                table("Game.World", "Vec3")
                    .nested_in("Game.World.Monster")
                    .with_property("X", t("System.Single")),
                color("Game.Common", "Color"),
                color("Game.Common", "Unused"),
                TypeDef::class("Game.Util", "Helper"),
            ],
        )
    }

    #[test]
    fn test_roots() {
        let assembly = assembly();
        let decompiler = Decompiler::new(&assembly);
        assert_eq!(
            decompiler.roots(),
            vec!["Game.World.Monster".to_string(), "Game.World.Monster/Vec3".to_string()]
        );

        let decompiler = Decompiler::new(&assembly)
            .with_config(DecompilerConfig::new().include_enums(["Unused"]));
        assert_eq!(decompiler.roots().len(), 3);
    }

    #[test]
    fn test_decompile_closure_and_placement() {
        let assembly = assembly();
        let program = Decompiler::new(&assembly).decompile().unwrap();

        let names: Vec<_> = program.namespaces.iter().map(|n| n.full_name.as_str()).collect();
        assert_eq!(names, vec!["Game.World", "Game.Common"]);

        let world = &program.namespaces[0];
        assert_eq!(world.classes.len(), 1);
        let monster = program.class(world.classes[0]);
        assert_eq!(monster.short_name, "Monster");
        assert_eq!(monster.private_types.len(), 1);
        assert_eq!(program.short_name(monster.private_types[0]), "Vec3");

        let color = &monster.properties[1];
        assert_eq!(color.kind, PropertyTypeKind::TypeRef);
        let Some(TypeHandle::Enum(id)) = color.reference else {
            panic!("expected an enum reference");
        };
        assert_eq!(program.enumeration(id).underlying, PropertyTypeKind::Byte);

        // Unreferenced enums are left out unless asked for.
        assert_eq!(program.enums().count(), 1);
    }

    #[test]
    fn test_included_enum() {
        let assembly = assembly();
        let program = Decompiler::new(&assembly)
            .with_config(DecompilerConfig::new().include_enums(["Game.Common.Unused"]))
            .decompile()
            .unwrap();
        assert_eq!(program.enums().count(), 2);
        assert_eq!(program.namespaces[1].enums.len(), 2);
    }

    #[test]
    fn test_unresolved_reference() {
        let assembly = Assembly::new(
            "game",
            vec![table("Game", "Broken").with_property("Other", t("Game.Missing"))],
        );
        let err = Decompiler::new(&assembly).decompile().unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedType { ref from, ref referenced }
                if from == "Game.Broken" && referenced == "Game.Missing"
        ));
    }

    #[test]
    fn test_unrecognized_reference() {
        let assembly = Assembly::new(
            "game",
            vec![
                table("Game", "Holder").with_property("Helper", t("Game.Helper")),
                TypeDef::class("Game", "Helper"),
            ],
        );
        let err = Decompiler::new(&assembly).decompile().unwrap_err();
        assert!(matches!(err, Error::UnrecognizedCompilerOutput { .. }));
    }
}
