//! Whole-program IR passes.
//!
//! Passes run in a fixed order. Namespace case normalisation always runs
//! first; every other pass is switched on through [`PipelineConfig`]:
//!
//! 1. [`LowercaseNamespaces`]
//! 2. [`ManualPackaging`]
//! 3. [`ResolveCircularDependencies`]
//! 4. [`AutomaticPackaging`]
//! 5. [`ResolveNameCollisions`]
//!
//! The program is validated after every pass, so a pass that breaks an IR
//! invariant fails the run immediately with the pass name attached.

mod autopackage;
mod collisions;
mod cycles;
mod lowercase;
mod manual;

pub use autopackage::AutomaticPackaging;
pub use collisions::ResolveNameCollisions;
pub use cycles::ResolveCircularDependencies;
pub use lowercase::LowercaseNamespaces;
pub use manual::{ManualPackaging, PackageRule, PackagingRules};

use crate::error::Result;
use crate::ir::Program;
use tracing::{debug, info};

/// Default minimum length of an automatically extracted package prefix
pub const DEFAULT_MIN_PACKAGE_LEN: usize = 4;

/// A program-to-program transformation
pub trait Pass {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Transforms the program
    fn run(&self, program: Program) -> Result<Program>;
}

/// Which optional passes to run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rules for manual packaging, if any
    pub manual_packaging: Option<PackagingRules>,
    /// Merge namespaces that reference each other
    pub resolve_circular_dependencies: bool,
    /// Split common namespace prefixes into packages
    pub automatic_packaging: bool,
    /// Make type names unique program-wide
    pub resolve_collisions: bool,
    /// Minimum shared prefix length for automatic packaging
    pub min_package_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            manual_packaging: None,
            resolve_circular_dependencies: false,
            automatic_packaging: false,
            resolve_collisions: false,
            min_package_len: DEFAULT_MIN_PACKAGE_LEN,
        }
    }
}

impl PipelineConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the manual packaging rules
    pub fn manual_packaging(mut self, rules: PackagingRules) -> Self {
        self.manual_packaging = Some(rules);
        self
    }

    /// Sets whether to resolve circular namespace dependencies
    pub fn resolve_circular_dependencies(mut self, enabled: bool) -> Self {
        self.resolve_circular_dependencies = enabled;
        self
    }

    /// Sets whether to run automatic packaging
    pub fn automatic_packaging(mut self, enabled: bool) -> Self {
        self.automatic_packaging = enabled;
        self
    }

    /// Sets whether to resolve name collisions
    pub fn resolve_collisions(mut self, enabled: bool) -> Self {
        self.resolve_collisions = enabled;
        self
    }

    /// Sets the minimum package prefix length for automatic packaging
    pub fn min_package_len(mut self, len: usize) -> Self {
        self.min_package_len = len;
        self
    }
}

/// Ordered list of passes
pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.pass_names()).finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl Pipeline {
    /// Builds the pipeline for a configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut passes: Vec<Box<dyn Pass>> = vec![Box::new(LowercaseNamespaces)];
        if let Some(rules) = &config.manual_packaging {
            passes.push(Box::new(ManualPackaging::new(rules.clone())));
        }
        if config.resolve_circular_dependencies {
            passes.push(Box::new(ResolveCircularDependencies));
        }
        if config.automatic_packaging {
            passes.push(Box::new(AutomaticPackaging::new(config.min_package_len)));
        }
        if config.resolve_collisions {
            passes.push(Box::new(ResolveNameCollisions));
        }
        Self { passes }
    }

    /// Names of the passes in execution order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Runs every pass, validating the program after each
    pub fn run(&self, mut program: Program) -> Result<Program> {
        for pass in &self.passes {
            debug!("Running pass '{}'", pass.name());
            program = pass.run(program)?;
            program.validate_normalized(pass.name())?;
        }
        info!(
            "Pipeline finished: {} namespaces after {} passes",
            program.namespaces.len(),
            self.passes.len()
        );
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::fixtures::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_pipeline_only_lowercases() {
        assert_eq!(Pipeline::default().pass_names(), vec!["lowercase"]);
    }

    #[test]
    fn test_pass_order() {
        let config = PipelineConfig::new()
            .resolve_collisions(true)
            .automatic_packaging(true)
            .resolve_circular_dependencies(true)
            .manual_packaging(PackagingRules::default());
        assert_eq!(
            Pipeline::from_config(&config).pass_names(),
            vec!["lowercase", "manual-packaging", "circular-dependencies", "automatic-packaging", "collisions"]
        );
    }

    #[test]
    fn test_all_passes_together() {
        use crate::ir::{NamespaceGraph, PropertyTypeKind, TypeHandle};
        use std::collections::HashSet;

        // net <-> chat reference each other; GameClient/GameServer share a
        // prefix and each declare an Item.
        let mut program = Program::new();
        let message = place_class(
            &mut program,
            "Chat",
            class("Chat", "Message", vec![property("Text", PropertyTypeKind::String, 1)]),
        );
        let login = place_class(
            &mut program,
            "Net",
            class("Net", "Login", vec![reference("Last", TypeHandle::Class(message), 1)]),
        );
        program
            .class_mut(message)
            .properties
            .push(reference("Sender", TypeHandle::Class(login), 2));
        place_class(
            &mut program,
            "GameClient",
            class("GameClient", "Item", vec![reference("Owner", TypeHandle::Class(login), 1)]),
        );
        place_class(
            &mut program,
            "GameServer",
            class("GameServer", "Item", vec![property("Id", PropertyTypeKind::UInt64, 1)]),
        );
        assert!(NamespaceGraph::build(&program).has_cycle());

        let config = PipelineConfig::new()
            .resolve_circular_dependencies(true)
            .automatic_packaging(true)
            .resolve_collisions(true);
        let program = Pipeline::from_config(&config).run(program).unwrap();

        assert!(!NamespaceGraph::build(&program).has_cycle());
        program.validate_normalized("test").unwrap();

        let mut namespaces: Vec<_> = program.namespaces.iter().map(|ns| ns.full_name.as_str()).collect();
        namespaces.sort();
        assert_eq!(namespaces, vec!["chat", "game.client", "game.server"]);

        let names: Vec<String> = (0..program.namespaces.len())
            .flat_map(|index| program.namespace_types(index))
            .map(|handle| program.short_name(handle).to_string())
            .collect();
        assert_eq!(names.len(), 4);
        let unique: HashSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert!(!names.iter().any(|n| n == "Item"));
    }

    #[test]
    fn test_run_lowercases() {
        let mut program = Program::new();
        place_class(&mut program, "Game.Net", class("Game.Net", "Login", vec![]));
        let program = Pipeline::default().run(program).unwrap();
        assert_eq!(program.namespaces[0].full_name, "game.net");
    }
}
