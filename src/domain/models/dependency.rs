use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A parsed import/include/require statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatement {
    /// The raw specifier (`./util`, `../lib/io`, `lodash`, `stdio.h`).
    pub source: String,
    pub line: u32,
}

/// A symbol occurrence inside a file of the dependency graph: either a
/// definition (function/class/…) or a call, in which case `callee` names
/// the invoked symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSymbol {
    pub name: String,
    pub kind: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee: Option<String>,
}

impl CodeSymbol {
    pub fn definition(name: impl Into<String>, kind: impl Into<String>, line: u32) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            line,
            callee: None,
        }
    }

    pub fn call(callee: impl Into<String>, line: u32) -> Self {
        let callee = callee.into();
        Self {
            name: callee.clone(),
            kind: "call".to_string(),
            line,
            callee: Some(callee),
        }
    }

    pub fn is_call(&self) -> bool {
        self.callee.is_some()
    }
}

/// One file in the import graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyNode {
    pub file_path: String,
    pub imports: Vec<ImportStatement>,
    pub symbols: Vec<CodeSymbol>,
    /// Resolved downstream paths this file imports.
    pub dependencies: Vec<String>,
    /// Upstream paths importing this file, filled in after traversal.
    pub dependents: Vec<String>,
}

impl DependencyNode {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            imports: Vec::new(),
            symbols: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }
}

/// The assembled import graph. Cycles are stored separately from the
/// adjacency, each as a path sequence starting and ending at the same node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, DependencyNode>,
    pub roots: Vec<String>,
    pub leaves: Vec<String>,
    pub cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Rebuild reverse edges, roots and leaves from the adjacency.
    pub fn finalize(&mut self) {
        for node in self.nodes.values_mut() {
            node.dependents.clear();
        }

        let edges: Vec<(String, String)> = self
            .nodes
            .iter()
            .flat_map(|(path, node)| {
                node.dependencies
                    .iter()
                    .map(move |dep| (path.clone(), dep.clone()))
            })
            .collect();

        for (from, to) in edges {
            if let Some(target) = self.nodes.get_mut(&to) {
                if !target.dependents.contains(&from) {
                    target.dependents.push(from);
                }
            }
        }

        self.roots = self
            .nodes
            .values()
            .filter(|n| n.dependents.is_empty())
            .map(|n| n.file_path.clone())
            .collect();
        self.leaves = self
            .nodes
            .values()
            .filter(|n| n.dependencies.is_empty())
            .map(|n| n.file_path.clone())
            .collect();
    }

    pub fn stats(&self) -> GraphStats {
        let edge_count = self.nodes.values().map(|n| n.dependencies.len()).sum();
        GraphStats {
            node_count: self.nodes.len(),
            edge_count,
            root_count: self.roots.len(),
            leaf_count: self.leaves.len(),
            cycle_count: self.cycles.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub cycle_count: usize,
}
