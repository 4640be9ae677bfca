//! Namespace case normalisation.

use super::Pass;
use crate::error::Result;
use crate::ir::Program;
use tracing::debug;

/// Lowercases namespace names and merges namespaces that become equal
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseNamespaces;

impl Pass for LowercaseNamespaces {
    fn name(&self) -> &'static str {
        "lowercase"
    }

    fn run(&self, mut program: Program) -> Result<Program> {
        for ns in &mut program.namespaces {
            let lower = ns.full_name.to_lowercase();
            ns.rename(lower);
        }
        let merged = program.merge_duplicate_namespaces();
        if merged > 0 {
            debug!("Merged {} namespaces differing only in case", merged);
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::fixtures::*;
    use pretty_assertions::assert_eq;

    fn program() -> Program {
        let mut program = Program::new();
        place_class(&mut program, "Game.Net", class("Game.Net", "Login", vec![]));
        place_class(&mut program, "game.net", class("game.net", "Logout", vec![]));
        place_class(&mut program, "Shared", class("Shared", "Empty", vec![]));
        program
    }

    #[test]
    fn test_lowercase_merges() {
        let program = LowercaseNamespaces.run(program()).unwrap();
        let names: Vec<_> = program
            .namespaces
            .iter()
            .map(|n| (n.full_name.as_str(), n.short_name.as_str(), n.classes.len()))
            .collect();
        assert_eq!(names, vec![("game.net", "net", 2), ("shared", "shared", 1)]);
        assert_eq!(program.namespaces[0].original_name, "Game.Net");
    }

    #[test]
    fn test_idempotent() {
        let once = LowercaseNamespaces.run(program()).unwrap();
        let twice = LowercaseNamespaces.run(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
