//! Type and enum value name collision resolution.
//!
//! Emitters reference types by short name, so after packaging two `Item`
//! types from different namespaces would be indistinguishable. Each member
//! of a colliding group is prefixed with the shortest trailing part of its
//! original qualifying path that tells the group apart.

use super::Pass;
use crate::error::Result;
use crate::ir::{EnumId, Program, TypeHandle};
use crate::naming::{to_pascal_case, to_upper_snake_case};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Compiler-inserted container for nested types of generated messages
const NESTED_CONTAINER: &str = "Types";

/// Hex digits of the hash suffix used when no path prefix helps
const HASH_SUFFIX_LEN: usize = 8;

/// Renames colliding type short names and enum values
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveNameCollisions;

impl Pass for ResolveNameCollisions {
    fn name(&self) -> &'static str {
        "collisions"
    }

    fn run(&self, mut program: Program) -> Result<Program> {
        let mut groups: BTreeMap<String, Vec<TypeHandle>> = BTreeMap::new();
        for index in 0..program.namespaces.len() {
            for handle in program.namespace_types(index) {
                groups
                    .entry(program.short_name(handle).to_string())
                    .or_default()
                    .push(handle);
            }
        }

        let mut taken: HashSet<String> = groups.keys().cloned().collect();
        for (name, members) in &groups {
            if members.len() < 2 {
                continue;
            }
            let renamed = distinguish(&program, name, members, &taken);
            for (&handle, new_name) in members.iter().zip(renamed) {
                debug!(
                    "Renaming '{}' to '{}'",
                    program.original_name(handle),
                    new_name
                );
                taken.insert(new_name.clone());
                program.set_short_name(handle, new_name);
            }
        }

        prefix_enum_values(&mut program);
        Ok(program)
    }
}

/// Namespace and owner segments of an original name, without the type itself
fn qualifying_path(original_name: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = original_name
        .split(|c: char| c == '.' || c == '/')
        .filter(|s| !s.is_empty())
        .collect();
    segments.pop();
    segments.retain(|s| *s != NESTED_CONTAINER);
    segments
}

fn short_hash(original_name: &str) -> String {
    blake3::hash(original_name.as_bytes()).to_hex()[..HASH_SUFFIX_LEN].to_string()
}

/// `name_<hash>` with the hash lengthened until the name is free
fn hashed_name(name: &str, original_name: &str, used: &HashSet<String>) -> String {
    let hex = blake3::hash(original_name.as_bytes()).to_hex();
    for len in HASH_SUFFIX_LEN..=hex.len() {
        let candidate = format!("{}_{}", name, &hex[..len]);
        if !used.contains(&candidate) {
            return candidate;
        }
    }
    (2..)
        .map(|n| format!("{}_{}_{}", name, hex, n))
        .find(|c| !used.contains(c))
        .unwrap_or_default()
}

fn distinguish(
    program: &Program,
    name: &str,
    members: &[TypeHandle],
    taken: &HashSet<String>,
) -> Vec<String> {
    let paths: Vec<Vec<&str>> = members
        .iter()
        .map(|&h| qualifying_path(program.original_name(h)))
        .collect();
    let longest = paths.iter().map(Vec::len).max().unwrap_or(0);

    for depth in 1..=longest {
        let candidates: Vec<String> = paths
            .iter()
            .map(|path| {
                let start = path.len().saturating_sub(depth);
                let prefix: String = path[start..].iter().map(|s| to_pascal_case(s)).collect();
                format!("{}{}", prefix, name)
            })
            .collect();
        let unique: HashSet<&String> = candidates.iter().collect();
        if unique.len() == candidates.len() && !candidates.iter().any(|c| taken.contains(c)) {
            return candidates;
        }
    }

    let mut used = taken.clone();
    members
        .iter()
        .map(|&h| {
            let renamed = hashed_name(name, program.original_name(h), &used);
            used.insert(renamed.clone());
            renamed
        })
        .collect()
}

/// Enum value names share a scope with the other enums next to them
fn prefix_enum_values(program: &mut Program) {
    let mut scopes: Vec<Vec<EnumId>> = program
        .namespaces
        .iter()
        .map(|ns| ns.enums.clone())
        .collect();
    scopes.extend(program.classes().map(|(_, class)| {
        class
            .private_types
            .iter()
            .filter_map(|&h| match h {
                TypeHandle::Enum(id) => Some(id),
                TypeHandle::Class(_) => None,
            })
            .collect()
    }));

    for scope in scopes.into_iter().filter(|s| s.len() > 1) {
        let mut owners: HashMap<String, usize> = HashMap::new();
        for &id in &scope {
            let names: HashSet<&str> = program
                .enumeration(id)
                .properties
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            for name in names {
                *owners.entry(name.to_string()).or_default() += 1;
            }
        }

        for id in scope {
            let enumeration = program.enumeration_mut(id);
            let prefix = to_upper_snake_case(&enumeration.short_name);
            for property in &mut enumeration.properties {
                if owners.get(&property.name).copied().unwrap_or(0) > 1 {
                    property.name = format!("{}_{}", prefix, property.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::fixtures::*;
    use crate::ir::Class;
    use pretty_assertions::assert_eq;

    fn two_items() -> Program {
        let mut program = Program::new();
        place_class(&mut program, "a", class("A", "Item", vec![]));
        place_class(&mut program, "b", class("B", "Item", vec![]));
        place_class(&mut program, "b", class("B", "Other", vec![]));
        program
    }

    fn short_names(program: &Program) -> Vec<String> {
        program
            .classes()
            .map(|(_, class)| class.short_name.clone())
            .collect()
    }

    #[test]
    fn test_qualifying_path() {
        assert_eq!(qualifying_path("Game.Net.Login/Types/Item"), vec!["Game", "Net", "Login"]);
        assert_eq!(qualifying_path("Item"), Vec::<&str>::new());
    }

    #[test]
    fn test_distinct_and_stable() {
        let first = ResolveNameCollisions.run(two_items()).unwrap();
        assert_eq!(short_names(&first), vec!["AItem", "BItem", "Other"]);

        let second = ResolveNameCollisions.run(two_items()).unwrap();
        assert_eq!(short_names(&first), short_names(&second));
    }

    #[test]
    fn test_shortest_distinguishing_suffix() {
        let mut program = Program::new();
        place_class(&mut program, "game.net", class("Game.Net.Login/Types", "Item", vec![]));
        place_class(&mut program, "game.chat", class("Game.Chat.Login/Types", "Item", vec![]));
        let program = ResolveNameCollisions.run(program).unwrap();
        assert_eq!(short_names(&program), vec!["NetLoginItem", "ChatLoginItem"]);
    }

    #[test]
    fn test_hash_fallback() {
        let mut program = Program::new();
        place_class(
            &mut program,
            "",
            Class {
                original_name: "Item".to_string(),
                ..class("", "Item", vec![])
            },
        );
        place_class(&mut program, "a", class("A", "Item", vec![]));
        let program = ResolveNameCollisions.run(program).unwrap();

        let names = short_names(&program);
        assert_ne!(names[0], names[1]);
        for name in &names {
            assert!(name.starts_with("Item_"));
            assert_eq!(name.len(), "Item_".len() + 8);
        }
        assert_eq!(names[0], format!("Item_{}", short_hash("Item")));
    }

    #[test]
    fn test_hash_fallback_skips_taken_names() {
        let mut program = Program::new();
        place_class(
            &mut program,
            "",
            Class {
                original_name: "Item".to_string(),
                ..class("", "Item", vec![])
            },
        );
        place_class(&mut program, "a", class("A", "Item", vec![]));
        let squatter = format!("Item_{}", short_hash("Item"));
        place_class(&mut program, "c", class("C", &squatter, vec![]));

        let program = ResolveNameCollisions.run(program).unwrap();
        let names = short_names(&program);
        let hex = blake3::hash(b"Item").to_hex();
        assert_eq!(names[0], format!("Item_{}", &hex[..HASH_SUFFIX_LEN + 1]));
        assert_eq!(names[2], squatter);

        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_hashed_name_exhausts_hash() {
        let hex = blake3::hash(b"X").to_hex().to_string();
        let used: HashSet<String> = (HASH_SUFFIX_LEN..=hex.len())
            .map(|len| format!("T_{}", &hex[..len]))
            .collect();
        assert_eq!(hashed_name("T", "X", &used), format!("T_{}_2", hex));
    }

    #[test]
    fn test_enum_values_prefixed_per_scope() {
        let mut program = Program::new();
        let color = place_enum(&mut program, "a", enumeration("a", "Color", &[("NONE", 0), ("RED", 1)]));
        let shape = place_enum(
            &mut program,
            "a",
            enumeration("a", "ShapeKind", &[("NONE", 0), ("SQUARE", 1)]),
        );
        let alone = place_enum(&mut program, "b", enumeration("b", "Mode", &[("NONE", 0)]));

        let program = ResolveNameCollisions.run(program).unwrap();
        let names = |id: EnumId| -> Vec<String> {
            program
                .enumeration(id)
                .properties
                .iter()
                .map(|p| p.name.clone())
                .collect()
        };
        assert_eq!(names(color), vec!["COLOR_NONE", "RED"]);
        assert_eq!(names(shape), vec!["SHAPE_KIND_NONE", "SQUARE"]);
        assert_eq!(names(alone), vec!["NONE"]);
    }
}
