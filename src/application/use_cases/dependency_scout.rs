use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::application::ParserService;
use crate::domain::{CodeSymbol, DependencyGraph, DependencyNode, ImportStatement, Language};

#[derive(Debug, Clone)]
pub struct ScoutConfig {
    pub max_depth: usize,
    pub include_node_modules: bool,
    /// Extensions tried when an import specifier has none.
    pub extensions: Vec<String>,
    /// Directory names never descended into.
    pub excluded_dirs: Vec<String>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            max_depth: 50,
            include_node_modules: false,
            extensions: Language::all_source_extensions()
                .into_iter()
                .map(String::from)
                .collect(),
            excluded_dirs: vec![
                "node_modules".to_string(),
                "target".to_string(),
                "dist".to_string(),
                "build".to_string(),
                ".git".to_string(),
            ],
        }
    }
}

/// Cached per-file analysis so repeated traversals don't re-parse.
#[derive(Debug, Clone)]
struct FileAnalysis {
    mtime_ms: u64,
    imports: Vec<ImportStatement>,
    symbols: Vec<CodeSymbol>,
}

/// A symbol hit produced by the linear-scan lookups.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolHit {
    pub file: String,
    pub line: u32,
    pub kind: String,
    pub name: String,
}

/// Recursive import-graph builder over the parser façade.
pub struct DependencyScout {
    parser: Arc<dyn ParserService>,
    config: ScoutConfig,
    cache: Mutex<HashMap<PathBuf, FileAnalysis>>,
}

impl DependencyScout {
    pub fn new(parser: Arc<dyn ParserService>) -> Self {
        Self::with_config(parser, ScoutConfig::default())
    }

    pub fn with_config(parser: Arc<dyn ParserService>, config: ScoutConfig) -> Self {
        Self {
            parser,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn parser(&self) -> Arc<dyn ParserService> {
        self.parser.clone()
    }

    /// Build the import graph reachable from `entry_points`. Missing entry
    /// points are skipped; cycles are recorded and do not recurse.
    pub fn build_dependency_graph(&self, entry_points: &[PathBuf]) -> DependencyGraph {
        let mut graph = DependencyGraph::default();
        let mut stack: Vec<String> = Vec::new();

        for entry in entry_points {
            let Ok(path) = entry.canonicalize() else {
                warn!("Entry point does not exist: {}", entry.display());
                continue;
            };
            self.visit(&path, &mut stack, 0, &mut graph);
        }

        graph.finalize();
        debug!(
            "Dependency graph: {} nodes, {} cycles",
            graph.nodes.len(),
            graph.cycles.len()
        );
        graph
    }

    fn visit(&self, path: &Path, stack: &mut Vec<String>, depth: usize, graph: &mut DependencyGraph) {
        let key = path.to_string_lossy().to_string();

        // A path already on the DFS stack closes a cycle; record the slice
        // from its first occurrence and stop descending.
        if let Some(i) = stack.iter().position(|p| p == &key) {
            let mut cycle: Vec<String> = stack[i..].to_vec();
            cycle.push(key);
            if !graph.cycles.iter().any(|c| same_cycle(c, &cycle)) {
                graph.cycles.push(cycle);
            }
            return;
        }

        if depth > self.config.max_depth {
            debug!("Depth cap reached at {}", key);
            return;
        }

        let already_visited = graph.nodes.contains_key(&key);

        if !already_visited {
            let Some(analysis) = self.analyze(path) else {
                return;
            };

            let mut node = DependencyNode::new(key.clone());
            node.imports = analysis.imports.clone();
            node.symbols = analysis.symbols.clone();

            for import in &analysis.imports {
                if let Some(resolved) = self.resolve_import(&import.source, path) {
                    let resolved_key = resolved.to_string_lossy().to_string();
                    if !node.dependencies.contains(&resolved_key) {
                        node.dependencies.push(resolved_key);
                    }
                }
            }
            graph.nodes.insert(key.clone(), node);
        }

        let dependencies = graph.nodes[&key].dependencies.clone();
        // Even an already-visited node must be rewalked for cycle detection
        // when reached through a new stack; visited nodes short-circuit via
        // the stack check in each child visit.
        if already_visited {
            return;
        }

        stack.push(key);
        for dep in dependencies {
            self.visit(Path::new(&dep), stack, depth + 1, graph);
        }
        stack.pop();
    }

    fn analyze(&self, path: &Path) -> Option<FileAnalysis> {
        let mtime_ms = std::fs::metadata(path)
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        {
            let cache = self.cache.lock().expect("parse cache poisoned");
            if let Some(hit) = cache.get(path) {
                if hit.mtime_ms == mtime_ms {
                    return Some(hit.clone());
                }
            }
        }

        let language = Language::from_path(path);
        if !language.is_known() {
            return None;
        }
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        let imports = self
            .parser
            .extract_imports(&content, language)
            .unwrap_or_default();

        let rel = path.to_string_lossy();
        let mut symbols: Vec<CodeSymbol> = Vec::new();
        if let Ok(xref) = self.parser.extract_file_xref(&content, &rel, language) {
            for def in xref.definitions {
                symbols.push(CodeSymbol::definition(
                    def.name,
                    def.kind.as_str(),
                    def.start_line,
                ));
            }
            for (callee, site) in xref.calls {
                symbols.push(CodeSymbol::call(callee, site.line));
            }
        }

        let analysis = FileAnalysis {
            mtime_ms,
            imports,
            symbols,
        };
        self.cache
            .lock()
            .expect("parse cache poisoned")
            .insert(path.to_path_buf(), analysis.clone());
        Some(analysis)
    }

    /// Resolve an import specifier against the importing file. Relative
    /// and absolute specifiers try the exact path, each configured
    /// extension, then `index` files; package-like specifiers resolve to
    /// nothing unless node_modules resolution is enabled.
    pub fn resolve_import(&self, specifier: &str, from_file: &Path) -> Option<PathBuf> {
        let from_dir = from_file.parent()?;

        let base = if specifier.starts_with("./") || specifier.starts_with("../") {
            from_dir.join(specifier)
        } else if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else {
            if !self.config.include_node_modules {
                return None;
            }
            // Walk up looking for a node_modules directory carrying the
            // package.
            let mut dir = Some(from_dir);
            let mut found = None;
            while let Some(d) = dir {
                let candidate = d.join("node_modules").join(specifier);
                if candidate.exists() || self.try_extensions(&candidate).is_some() {
                    found = Some(candidate);
                    break;
                }
                dir = d.parent();
            }
            found?
        };

        let resolved = self.try_candidates(&base)?;
        let canonical = resolved.canonicalize().ok()?;

        if self.is_excluded(&canonical) && !self.config.include_node_modules {
            return None;
        }
        Some(canonical)
    }

    fn try_candidates(&self, base: &Path) -> Option<PathBuf> {
        if base.is_file() {
            return Some(base.to_path_buf());
        }
        if let Some(with_ext) = self.try_extensions(base) {
            return Some(with_ext);
        }
        let index = base.join("index");
        self.try_extensions(&index)
    }

    fn try_extensions(&self, base: &Path) -> Option<PathBuf> {
        for ext in &self.config.extensions {
            let candidate = PathBuf::from(format!("{}.{}", base.to_string_lossy(), ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            self.config.excluded_dirs.iter().any(|d| d == name.as_ref())
        })
    }

    pub fn clear_cache(&self) {
        self.cache.lock().expect("parse cache poisoned").clear();
    }

    // ── Linear-scan lookups over a built graph ───────────────────────────

    pub fn find_symbol_definitions(&self, name: &str, graph: &DependencyGraph) -> Vec<SymbolHit> {
        graph
            .nodes
            .values()
            .flat_map(|node| {
                node.symbols
                    .iter()
                    .filter(|s| !s.is_call() && s.name == name)
                    .map(|s| SymbolHit {
                        file: node.file_path.clone(),
                        line: s.line,
                        kind: s.kind.clone(),
                        name: s.name.clone(),
                    })
            })
            .collect()
    }

    pub fn find_call_sites(&self, name: &str, graph: &DependencyGraph) -> Vec<SymbolHit> {
        graph
            .nodes
            .values()
            .flat_map(|node| {
                node.symbols
                    .iter()
                    .filter(|s| s.callee.as_deref() == Some(name))
                    .map(|s| SymbolHit {
                        file: node.file_path.clone(),
                        line: s.line,
                        kind: s.kind.clone(),
                        name: s.name.clone(),
                    })
            })
            .collect()
    }

    /// Shortest chain of imports from `from` to `to`, inclusive, or `None`
    /// when `to` is unreachable.
    pub fn find_import_path(
        &self,
        from: &str,
        to: &str,
        graph: &DependencyGraph,
    ) -> Option<Vec<String>> {
        let mut petgraph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();

        for path in graph.nodes.keys() {
            indices.insert(path.as_str(), petgraph.add_node(path.as_str()));
        }
        for (path, node) in &graph.nodes {
            for dep in &node.dependencies {
                if let (Some(&a), Some(&b)) =
                    (indices.get(path.as_str()), indices.get(dep.as_str()))
                {
                    petgraph.add_edge(a, b, ());
                }
            }
        }

        let start = *indices.get(from)?;
        let goal = *indices.get(to)?;
        let (_, path) = astar(&petgraph, start, |n| n == goal, |_| 1, |_| 0)?;
        Some(path.into_iter().map(|i| petgraph[i].to_string()).collect())
    }

    pub fn graph_stats(&self, graph: &DependencyGraph) -> crate::domain::GraphStats {
        graph.stats()
    }
}

/// Two cycle reports are the same when one is a rotation of the other.
fn same_cycle(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // Drop the repeated closing element before comparing rotations.
    let a = &a[..a.len() - 1];
    let b = &b[..b.len() - 1];
    if a.is_empty() {
        return b.is_empty();
    }
    (0..a.len()).any(|shift| (0..a.len()).all(|i| a[(i + shift) % a.len()] == b[i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TreeSitterParser;
    use std::fs;
    use tempfile::TempDir;

    fn scout() -> DependencyScout {
        DependencyScout::new(Arc::new(TreeSitterParser::new()))
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_simple_import_chain() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "c.ts", "export const c = 3;\n");
        write(dir.path(), "b.ts", "import { c } from \"./c\";\nexport const b = 2;\n");
        let a = write(dir.path(), "a.ts", "import { b } from \"./b\";\nexport const a = 1;\n");

        let graph = scout().build_dependency_graph(&[a.clone()]);

        assert_eq!(graph.nodes.len(), 3);
        assert!(graph.cycles.is_empty());

        let a_key = a.canonicalize().unwrap().to_string_lossy().to_string();
        assert_eq!(graph.roots, vec![a_key.clone()]);
        assert_eq!(graph.leaves.len(), 1);
        assert!(graph.leaves[0].ends_with("c.ts"));

        let a_node = &graph.nodes[&a_key];
        assert_eq!(a_node.dependencies.len(), 1);
        assert!(a_node.dependencies[0].ends_with("b.ts"));
    }

    #[test]
    fn test_cycle_detected_once() {
        let dir = TempDir::new().unwrap();
        let a = write(
            dir.path(),
            "a.ts",
            "import \"./b\";\nexport const a = 1;\n",
        );
        write(dir.path(), "b.ts", "import \"./a\";\nexport const b = 2;\n");

        let graph = scout().build_dependency_graph(&[a]);

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.cycles.len(), 1);

        let cycle = &graph.cycles[0];
        assert_eq!(cycle.first(), cycle.last());
        let members: std::collections::HashSet<&str> = cycle
            .iter()
            .map(|p| Path::new(p).file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(members, ["a.ts", "b.ts"].into_iter().collect());
    }

    #[test]
    fn test_package_imports_skipped_by_default() {
        let dir = TempDir::new().unwrap();
        let a = write(
            dir.path(),
            "a.ts",
            "import path from \"path\";\nimport { b } from \"./b\";\nexport const a = 1;\n",
        );
        write(dir.path(), "b.ts", "export const b = 2;\n");

        let graph = scout().build_dependency_graph(&[a.clone()]);
        let a_key = a.canonicalize().unwrap().to_string_lossy().to_string();
        assert_eq!(graph.nodes[&a_key].dependencies.len(), 1);
    }

    #[test]
    fn test_resolve_index_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "lib/index.ts", "export const lib = 1;\n");
        let a = write(dir.path(), "a.ts", "import { lib } from \"./lib\";\n");

        let graph = scout().build_dependency_graph(&[a.clone()]);
        let a_key = a.canonicalize().unwrap().to_string_lossy().to_string();
        assert_eq!(graph.nodes[&a_key].dependencies.len(), 1);
        assert!(graph.nodes[&a_key].dependencies[0].ends_with("index.ts"));
    }

    #[test]
    fn test_find_symbols_and_calls() {
        let dir = TempDir::new().unwrap();
        let a = write(
            dir.path(),
            "app.ts",
            r#"import { parseConfig } from "./config";

export function bootstrap() {
    return parseConfig("app.toml");
}
"#,
        );
        write(
            dir.path(),
            "config.ts",
            "export function parseConfig(path: string) {\n    return path;\n}\n",
        );

        let scout = scout();
        let graph = scout.build_dependency_graph(&[a]);

        let defs = scout.find_symbol_definitions("parseConfig", &graph);
        assert_eq!(defs.len(), 1);
        assert!(defs[0].file.ends_with("config.ts"));

        let calls = scout.find_call_sites("parseConfig", &graph);
        assert!(!calls.is_empty());
        assert!(calls.iter().any(|c| c.file.ends_with("app.ts")));
    }

    #[test]
    fn test_find_import_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "c.ts", "export const c = 3;\n");
        write(dir.path(), "b.ts", "import { c } from \"./c\";\n");
        let a = write(dir.path(), "a.ts", "import { b } from \"./b\";\n");

        let scout = scout();
        let graph = scout.build_dependency_graph(&[a.clone()]);

        let a_key = a.canonicalize().unwrap().to_string_lossy().to_string();
        let c_key = graph
            .nodes
            .keys()
            .find(|k| k.ends_with("c.ts"))
            .unwrap()
            .clone();

        let path = scout.find_import_path(&a_key, &c_key, &graph).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], a_key);
        assert_eq!(path[2], c_key);

        assert!(scout.find_import_path(&c_key, &a_key, &graph).is_none());
    }

    #[test]
    fn test_same_cycle_rotation() {
        let cycle = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(same_cycle(
            &cycle(&["a", "b", "a"]),
            &cycle(&["b", "a", "b"])
        ));
        assert!(!same_cycle(
            &cycle(&["a", "b", "a"]),
            &cycle(&["a", "c", "a"])
        ));
    }

    #[test]
    fn test_missing_entry_point_skipped() {
        let graph = scout().build_dependency_graph(&[PathBuf::from("/does/not/exist.ts")]);
        assert!(graph.nodes.is_empty());
    }
}
