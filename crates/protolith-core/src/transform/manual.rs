//! Manual packaging from a TOML rule file.
//!
//! ```toml
//! [[package]]
//! namespaces = ["game.net", "game.net.*"]
//! into = "net"
//! ```
//!
//! A pattern is either an exact namespace name or `prefix.*`, which matches
//! `prefix` and every namespace below it. Matching ignores case. The first
//! rule with a matching pattern wins.

use super::Pass;
use crate::error::{Error, Result};
use crate::ir::Program;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// One packaging rule
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageRule {
    /// Namespace patterns
    pub namespaces: Vec<String>,
    /// Target namespace
    pub into: String,
}

impl PackageRule {
    /// Returns true if any pattern matches the namespace
    pub fn matches(&self, namespace: &str) -> bool {
        let namespace = namespace.to_lowercase();
        self.namespaces.iter().any(|pattern| {
            let pattern = pattern.to_lowercase();
            match pattern.strip_suffix(".*") {
                Some(prefix) => {
                    namespace == prefix
                        || namespace
                            .strip_prefix(prefix)
                            .is_some_and(|rest| rest.starts_with('.'))
                }
                None => namespace == pattern,
            }
        })
    }
}

/// A set of packaging rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackagingRules {
    /// Rules in priority order
    #[serde(rename = "package", default)]
    pub rules: Vec<PackageRule>,
}

impl PackagingRules {
    /// Parses rules from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a rule file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::from_toml(&text)
    }

    /// Returns the target of the first rule matching the namespace
    pub fn target(&self, namespace: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.matches(namespace))
            .map(|rule| rule.into.as_str())
    }
}

/// Moves namespaces according to [`PackagingRules`]
#[derive(Debug, Clone)]
pub struct ManualPackaging {
    rules: PackagingRules,
}

impl ManualPackaging {
    /// Creates the pass
    pub fn new(rules: PackagingRules) -> Self {
        Self { rules }
    }
}

impl Pass for ManualPackaging {
    fn name(&self) -> &'static str {
        "manual-packaging"
    }

    fn run(&self, mut program: Program) -> Result<Program> {
        for ns in &mut program.namespaces {
            if let Some(target) = self.rules.target(&ns.full_name) {
                let target = target.to_lowercase();
                debug!("Packaging '{}' into '{}'", ns.full_name, target);
                ns.rename(target);
            }
        }
        program.merge_duplicate_namespaces();
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::fixtures::*;
    use pretty_assertions::assert_eq;

    const RULES: &str = r#"
        [[package]]
        namespaces = ["Game.Net.*"]
        into = "Network"

        [[package]]
        namespaces = ["game.shared", "game.net.legacy"]
        into = "common"
    "#;

    #[test]
    fn test_parse_rules() {
        let rules = PackagingRules::from_toml(RULES).unwrap();
        assert_eq!(rules.rules.len(), 2);
        assert_eq!(rules.rules[0].into, "Network");
    }

    #[test]
    fn test_patterns() {
        let rules = PackagingRules::from_toml(RULES).unwrap();
        assert_eq!(rules.target("game.net"), Some("Network"));
        assert_eq!(rules.target("game.net.chat"), Some("Network"));
        // First matching rule wins.
        assert_eq!(rules.target("game.net.legacy"), Some("Network"));
        assert_eq!(rules.target("game.network"), None);
        assert_eq!(rules.target("GAME.SHARED"), Some("common"));
    }

    #[test]
    fn test_invalid_rules() {
        assert!(matches!(
            PackagingRules::from_toml("[[package]]\ninto = 3"),
            Err(Error::PackagingRules(_))
        ));
    }

    #[test]
    fn test_pass_moves_and_merges() {
        let mut program = Program::new();
        place_class(&mut program, "game.net", class("game.net", "Login", vec![]));
        place_class(&mut program, "game.net.chat", class("game.net.chat", "Say", vec![]));
        place_class(&mut program, "game.world", class("game.world", "Map", vec![]));

        let rules = PackagingRules::from_toml(RULES).unwrap();
        let program = ManualPackaging::new(rules).run(program).unwrap();

        let names: Vec<_> = program
            .namespaces
            .iter()
            .map(|n| (n.full_name.as_str(), n.classes.len()))
            .collect();
        assert_eq!(names, vec![("network", 2), ("game.world", 1)]);
        program.validate_normalized("test").unwrap();
    }
}
