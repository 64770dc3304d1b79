use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ChunkKind;

/// A symbol definition in the cross-reference graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDefinition {
    pub name: String,
    /// Dotted scope path joined with the name (`Outer.Inner.method`).
    pub qualified_name: String,
    pub kind: ChunkKind,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub scope_path: Vec<String>,
    /// Short names this definition calls, in source order, deduplicated.
    pub calls: Vec<String>,
    /// Fully qualified callers, filled in by `build_reverse_references`.
    pub called_by: Vec<String>,
}

/// One textual call occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    /// Enclosing definition's FQN, or the literal `module` for top-level
    /// calls.
    pub caller: String,
}

pub const MODULE_CALLER: &str = "module";

/// Per-file parse output handed from the tracker to the graph.
#[derive(Debug, Clone, Default)]
pub struct FileXref {
    pub definitions: Vec<SymbolDefinition>,
    /// `(callee short name, call site)` pairs.
    pub calls: Vec<(String, CallSite)>,
}

/// Bidirectional caller↔callee map derived from AST.
///
/// Maps are ordered so that serialization is deterministic and a no-op
/// re-index leaves the persisted graph byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrefGraph {
    pub definitions: BTreeMap<String, SymbolDefinition>,
    pub call_sites: BTreeMap<String, Vec<CallSite>>,
}

impl XrefGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one file's definitions and call sites into the graph.
    /// Re-adding a file must be preceded by `remove_file`.
    pub fn add_file(&mut self, xref: FileXref) {
        for def in xref.definitions {
            self.definitions.insert(def.qualified_name.clone(), def);
        }
        for (callee, site) in xref.calls {
            self.call_sites.entry(callee).or_default().push(site);
        }
    }

    /// Drop every definition and call site contributed by `file`.
    pub fn remove_file(&mut self, file: &str) {
        self.definitions.retain(|_, def| def.file != file);
        self.call_sites.retain(|_, sites| {
            sites.retain(|site| site.file != file);
            !sites.is_empty()
        });
    }

    /// Recompute every definition's `called_by` from the call sites.
    ///
    /// For each call of short name `t`, every definition whose FQN ends
    /// with `.t` (or whose own name is `t`) gains the site's caller FQN,
    /// deduplicated. A common short name legitimately resolves to several
    /// definitions.
    pub fn build_reverse_references(&mut self) {
        for def in self.definitions.values_mut() {
            def.called_by.clear();
        }

        let suffix_index: Vec<(String, String)> = self
            .definitions
            .values()
            .map(|def| (def.name.clone(), def.qualified_name.clone()))
            .collect();

        for (target, sites) in &self.call_sites {
            for (short_name, fqn) in &suffix_index {
                if short_name != target {
                    continue;
                }
                let def = self
                    .definitions
                    .get_mut(fqn)
                    .expect("suffix index entries mirror definitions");
                for site in sites {
                    if !def.called_by.contains(&site.caller) {
                        def.called_by.push(site.caller.clone());
                    }
                }
            }
        }
    }

    /// Definitions matching a short name (exact name or FQN suffix).
    pub fn find_definitions(&self, name: &str) -> Vec<&SymbolDefinition> {
        self.definitions
            .values()
            .filter(|def| def.name == name)
            .collect()
    }

    pub fn call_sites_for(&self, name: &str) -> &[CallSite] {
        self.call_sites.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Calls list for the definition anchored at `(file, start_line, name)`,
    /// used by the chunker to attach cross-reference data.
    pub fn calls_for_location(&self, file: &str, start_line: u32, name: &str) -> Option<&[String]> {
        self.definitions
            .values()
            .find(|def| def.file == file && def.start_line == start_line && def.name == name)
            .map(|def| def.calls.as_slice())
    }

    pub fn definition_count(&self) -> usize {
        self.definitions.len()
    }

    pub fn serialize_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn deserialize_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
