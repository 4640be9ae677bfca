//! Circular namespace dependency resolution.
//!
//! Schema languages import whole files, and neither protoc nor flatc
//! accepts import cycles. Every group of mutually reachable namespaces is
//! merged into its lexicographically first member.

use super::Pass;
use crate::error::{Error, Result};
use crate::ir::{mutually_reachable, NamespaceGraph, Program};
use tracing::{debug, warn};

/// Merges strongly connected namespace groups
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveCircularDependencies;

impl Pass for ResolveCircularDependencies {
    fn name(&self) -> &'static str {
        "circular-dependencies"
    }

    fn run(&self, mut program: Program) -> Result<Program> {
        let placed = program.locations().len();

        // Merging a component never creates a new cycle, so one round per
        // namespace is a generous bound.
        for _ in 0..=program.namespaces.len() {
            let graph = NamespaceGraph::build(&program);
            let groups = mutually_reachable(&graph);
            if groups.is_empty() {
                break;
            }

            for group in &groups {
                let Some(&target) = group
                    .iter()
                    .min_by(|&&a, &&b| {
                        program.namespaces[a]
                            .full_name
                            .cmp(&program.namespaces[b].full_name)
                    })
                else {
                    continue;
                };
                let names: Vec<_> = group
                    .iter()
                    .map(|&i| program.namespaces[i].full_name.as_str())
                    .collect();
                warn!(
                    "Merging circular namespaces [{}] into '{}'",
                    names.join(", "),
                    program.namespaces[target].full_name
                );
                for &member in group {
                    program.move_members(member, target);
                }
            }
            program.remove_empty_namespaces();
        }

        let groups = mutually_reachable(&NamespaceGraph::build(&program));
        if let Some(group) = groups.first() {
            return Err(Error::NamespaceCycle {
                namespaces: group
                    .iter()
                    .map(|&i| program.namespaces[i].full_name.clone())
                    .collect(),
            });
        }

        let after = program.locations().len();
        if after != placed {
            return Err(Error::invariant(
                self.name(),
                format!("{} types placed before merging, {} after", placed, after),
            ));
        }
        debug!("Namespace graph is acyclic");
        Ok(program)
    }
}
