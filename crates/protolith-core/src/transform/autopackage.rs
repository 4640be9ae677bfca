//! Automatic packaging of namespaces sharing a name prefix.
//!
//! Obfuscated and generated code often flattens package hierarchies into
//! single segments such as `gameclient` and `gameserver`. When the longest
//! common substring of two leading segments is also their common prefix,
//! that prefix becomes a package of its own: `game.client`, `game.server`.

use super::Pass;
use crate::error::Result;
use crate::ir::Program;
use std::collections::BTreeMap;
use tracing::debug;

/// Splits shared leading-segment prefixes into parent packages
#[derive(Debug, Clone, Copy)]
pub struct AutomaticPackaging {
    min_len: usize,
}

impl Default for AutomaticPackaging {
    fn default() -> Self {
        Self::new(super::DEFAULT_MIN_PACKAGE_LEN)
    }
}

impl AutomaticPackaging {
    /// Creates the pass with the minimum prefix length in characters
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Longest prefix `segment` shares with any other segment, in characters
    fn package_prefix(&self, segment: &[char], others: &[Vec<char>]) -> Option<usize> {
        others
            .iter()
            .filter(|other| other.as_slice() != segment)
            .filter_map(|other| {
                let prefix = common_prefix(segment, other);
                let qualifies = prefix >= self.min_len
                    && prefix < segment.len()
                    && prefix < other.len()
                    && longest_common_substring(segment, other) == prefix;
                qualifies.then_some(prefix)
            })
            .max()
    }
}

impl Pass for AutomaticPackaging {
    fn name(&self) -> &'static str {
        "automatic-packaging"
    }

    fn run(&self, mut program: Program) -> Result<Program> {
        let mut distinct: Vec<Vec<char>> = program
            .namespaces
            .iter()
            .map(|ns| leading_segment(&ns.full_name).chars().collect())
            .collect();
        distinct.sort();
        distinct.dedup();

        // Keyed by segment so every namespace sharing it is renamed alike.
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        for segment in &distinct {
            let Some(len) = self.package_prefix(segment, &distinct) else {
                continue;
            };
            let prefix: String = segment[..len].iter().collect();
            let rest: String = segment[len..].iter().collect();
            let rest = rest.trim_start_matches(|c: char| c == '_' || c == '-');
            if rest.is_empty() {
                continue;
            }
            renames.insert(segment.iter().collect(), format!("{}.{}", prefix, rest));
        }

        for ns in &mut program.namespaces {
            let (head, tail) = match ns.full_name.split_once('.') {
                Some((head, tail)) => (head, Some(tail)),
                None => (ns.full_name.as_str(), None),
            };
            let Some(package) = renames.get(head) else {
                continue;
            };
            let renamed = match tail {
                Some(tail) => format!("{}.{}", package, tail),
                None => package.clone(),
            };
            debug!("Packaging '{}' as '{}'", ns.full_name, renamed);
            ns.rename(renamed);
        }

        program.merge_duplicate_namespaces();
        Ok(program)
    }
}

fn leading_segment(name: &str) -> &str {
    name.split('.').next().unwrap_or_default()
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Length of the longest common substring, by dynamic programming over a
/// single rolling row
fn longest_common_substring(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    let mut best = 0;
    for &x in a {
        let mut diagonal = 0;
        for (j, &y) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if x == y { diagonal + 1 } else { 0 };
            best = best.max(row[j + 1]);
            diagonal = above;
        }
    }
    best
}
