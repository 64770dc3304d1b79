use std::collections::HashSet;

use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use crate::application::ParserService;
use crate::domain::{
    CallSite, ChunkKind, DomainError, FileXref, ImportStatement, Language, ParsedNode,
    SymbolDefinition, MODULE_CALLER,
};

/// Normalize import paths by stripping surrounding delimiters.
/// - Go imports: "fmt" -> fmt
/// - C/C++ string includes: "header.h" -> header.h
/// - C/C++ system includes: <iostream> -> iostream
fn normalize_import_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.len() < 2 {
        return trimmed.to_string();
    }

    if (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('\'') && trimmed.ends_with('\''))
    {
        return trimmed[1..trimmed.len() - 1].to_string();
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        return trimmed[1..trimmed.len() - 1].to_string();
    }

    trimmed.to_string()
}

/// Callee names dropped from the cross-reference graph: language builtins
/// and utility calls so common they only add noise.
fn is_builtin_noise(name: &str) -> bool {
    if name.len() <= 2 {
        return true;
    }
    static NOISE: &[&str] = &[
        // Output / formatting
        "print", "println", "printf", "sprintf", "fprintf", "puts", "echo", "format", "write",
        "writeln", "log", "debug", "info", "warn", "error", "trace",
        // Collections / iteration
        "len", "size", "count", "push", "pop", "append", "insert", "remove", "get", "set",
        "keys", "values", "items", "iter", "next", "map", "filter", "reduce", "forEach",
        "collect", "join", "split", "slice", "splice", "concat", "contains", "indexOf",
        "push_back", "emplace_back",
        // Conversion / construction
        "str", "int", "float", "bool", "from", "into", "parse", "clone", "copy", "new",
        "toString", "to_string", "to_owned", "valueOf", "String", "Number", "Boolean", "Array",
        "Object", "Vec", "HashMap", "Box", "Some", "None", "Ok", "Err", "require",
        // Errors / assertions
        "panic", "assert", "assert_eq", "assert_ne", "unwrap", "expect", "raise", "throw",
        "isinstance", "hasattr", "getattr", "setattr", "super",
    ];
    NOISE.contains(&name)
}

fn is_comment_kind(kind: &str) -> bool {
    matches!(
        kind,
        "comment" | "line_comment" | "block_comment" | "doc_comment"
    )
}

fn is_identifier_kind(kind: &str) -> bool {
    matches!(
        kind,
        "identifier"
            | "type_identifier"
            | "property_identifier"
            | "field_identifier"
            | "simple_identifier"
            | "name"
            | "constant"
    )
}

fn node_text(node: Node, src: &str) -> String {
    src.get(node.byte_range()).unwrap_or("").to_string()
}

fn start_line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Descend into a node looking for the identifier that names it. Checks
/// the `name`/`declarator`/`type` fields before scanning children, so
/// `Class::method` declarators resolve to `method`, not `Class`.
fn find_identifier(node: Node, src: &str) -> Option<String> {
    if is_identifier_kind(node.kind()) {
        return Some(node_text(node, src));
    }
    for field in ["name", "declarator", "type"] {
        if let Some(child) = node.child_by_field_name(field) {
            if let Some(ident) = find_identifier(child, src) {
                return Some(ident);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if is_identifier_kind(child.kind()) {
            return Some(node_text(child, src));
        }
    }
    None
}

/// The declared name of a definition node, via language field conventions.
fn node_name(node: Node, src: &str) -> Option<String> {
    for field in ["name", "declarator", "type"] {
        if let Some(child) = node.child_by_field_name(field) {
            if let Some(ident) = find_identifier(child, src) {
                return Some(ident);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if is_identifier_kind(child.kind()) {
            return Some(node_text(child, src));
        }
    }
    None
}

/// First adjacent comment block above a node, or (for Python-style
/// languages) the string literal opening its body.
fn extract_docstring(node: Node, src: &str) -> Option<String> {
    let mut comments: Vec<String> = Vec::new();
    let mut expected_row = node.start_position().row;
    let mut prev = node.prev_sibling();

    while let Some(p) = prev {
        if !is_comment_kind(p.kind()) {
            break;
        }
        // The comment block must sit directly above (at most one blank line
        // inside the block itself).
        if expected_row.saturating_sub(p.end_position().row) > 1 {
            break;
        }
        comments.push(node_text(p, src));
        expected_row = p.start_position().row;
        prev = p.prev_sibling();
    }

    if !comments.is_empty() {
        comments.reverse();
        return Some(comments.join("\n"));
    }

    // Python: first statement of the body as a string literal.
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() == "expression_statement" {
        let inner = first.named_child(0)?;
        if inner.kind() == "string" {
            return Some(node_text(inner, src));
        }
    }
    None
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    name: String,
    class_like: bool,
}

/// Kinds whose members are scoped under the definition's name.
fn is_container(kind: ChunkKind) -> bool {
    matches!(
        kind,
        ChunkKind::Class
            | ChunkKind::Interface
            | ChunkKind::Struct
            | ChunkKind::Enum
            | ChunkKind::Impl
            | ChunkKind::Trait
            | ChunkKind::Module
            | ChunkKind::Namespace
            | ChunkKind::Decorated
    )
}

/// Containers whose immediate function members are methods.
fn is_class_like(kind: ChunkKind) -> bool {
    matches!(
        kind,
        ChunkKind::Class
            | ChunkKind::Interface
            | ChunkKind::Struct
            | ChunkKind::Enum
            | ChunkKind::Impl
            | ChunkKind::Trait
    )
}

pub struct TreeSitterParser {
    supported_languages: Vec<Language>,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self {
            supported_languages: Language::all_supported(),
        }
    }

    fn grammar(language: Language) -> Option<tree_sitter::Language> {
        match language {
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::CSharp => Some(tree_sitter_c_sharp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Unknown => None,
        }
    }

    /// Parse a file. Returns `Ok(None)` on grammar failure so that callers
    /// can fall back to naïve chunking; an unsupported language is an
    /// error.
    pub fn parse(&self, content: &str, language: Language) -> Result<Option<Tree>, DomainError> {
        let grammar = Self::grammar(language)
            .ok_or_else(|| DomainError::UnsupportedLanguage(language.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| DomainError::parse(format!("Failed to set language: {}", e)))?;

        match parser.parse(content, None) {
            Some(tree) => {
                // A root that is nothing but an error node gives callers no
                // structure to work with; treat it as a parse failure.
                let root = tree.root_node();
                if root.has_error() && root.named_child_count() == 0 {
                    debug!("Parse produced no usable tree ({})", language);
                    return Ok(None);
                }
                Ok(Some(tree))
            }
            None => {
                debug!("Parser returned no tree ({})", language);
                Ok(None)
            }
        }
    }

    // ── Declared-construct extraction (chunker input) ────────────────────

    fn collect_nodes(
        node: Node,
        src: &str,
        language: Language,
        scope: &mut Vec<ScopeEntry>,
        out: &mut Vec<ParsedNode>,
    ) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            Self::process_node(child, src, language, scope, out);
        }
    }

    fn process_node(
        node: Node,
        src: &str,
        language: Language,
        scope: &mut Vec<ScopeEntry>,
        out: &mut Vec<ParsedNode>,
    ) {
        match node.kind() {
            // `export const handler = async () => {}` and plain arrow-bound
            // functions surface as declarations, not function nodes.
            "lexical_declaration" | "variable_declaration"
                if matches!(language, Language::TypeScript | Language::JavaScript) =>
            {
                Self::process_variable_declaration(node, src, scope, out);
            }
            "export_statement" => {
                // Descend so the wrapped declaration is captured with its
                // own kind; bare re-export lists carry no definition.
                Self::collect_nodes(node, src, language, scope, out);
            }
            "decorated_definition" => {
                Self::process_decorated(node, src, language, scope, out);
            }
            kind => match ChunkKind::from_node_kind(kind) {
                Some(mut chunk_kind) => {
                    let name = node_name(node, src);
                    if chunk_kind == ChunkKind::Function
                        && scope.last().is_some_and(|s| s.class_like)
                    {
                        chunk_kind = ChunkKind::Method;
                    }

                    out.push(ParsedNode {
                        text: node_text(node, src),
                        start_line: start_line(node),
                        end_line: end_line(node),
                        kind: chunk_kind,
                        name: name.clone(),
                        scope_path: scope.iter().map(|s| s.name.clone()).collect(),
                        docstring: extract_docstring(node, src),
                    });

                    if is_container(chunk_kind) {
                        if let Some(name) = name {
                            scope.push(ScopeEntry {
                                name,
                                class_like: is_class_like(chunk_kind),
                            });
                            Self::collect_nodes(node, src, language, scope, out);
                            scope.pop();
                            return;
                        }
                    }
                    Self::collect_nodes(node, src, language, scope, out);
                }
                None => Self::collect_nodes(node, src, language, scope, out),
            },
        }
    }

    fn process_variable_declaration(
        node: Node,
        src: &str,
        scope: &mut Vec<ScopeEntry>,
        out: &mut Vec<ParsedNode>,
    ) {
        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(value) = declarator.child_by_field_name("value") else {
                continue;
            };
            if matches!(value.kind(), "arrow_function" | "function_expression") {
                out.push(ParsedNode {
                    text: node_text(node, src),
                    start_line: start_line(node),
                    end_line: end_line(node),
                    kind: ChunkKind::Function,
                    name: node_name(declarator, src),
                    scope_path: scope.iter().map(|s| s.name.clone()).collect(),
                    docstring: extract_docstring(node, src),
                });
            } else if node.parent().is_some_and(|p| p.kind() == "export_statement") {
                // Exported constants are retrievable definitions too.
                out.push(ParsedNode {
                    text: node_text(node, src),
                    start_line: start_line(node),
                    end_line: end_line(node),
                    kind: ChunkKind::Export,
                    name: node_name(declarator, src),
                    scope_path: scope.iter().map(|s| s.name.clone()).collect(),
                    docstring: extract_docstring(node, src),
                });
            }
        }
    }

    fn process_decorated(
        node: Node,
        src: &str,
        language: Language,
        scope: &mut Vec<ScopeEntry>,
        out: &mut Vec<ParsedNode>,
    ) {
        let definition = node.child_by_field_name("definition");
        let name = definition.and_then(|d| node_name(d, src));
        let inner_is_class = definition.is_some_and(|d| d.kind() == "class_definition");

        out.push(ParsedNode {
            text: node_text(node, src),
            start_line: start_line(node),
            end_line: end_line(node),
            kind: ChunkKind::Decorated,
            name: name.clone(),
            scope_path: scope.iter().map(|s| s.name.clone()).collect(),
            docstring: definition.and_then(|d| extract_docstring(d, src)),
        });

        // Members of a decorated class are still reachable under its name.
        if let (Some(definition), Some(name)) = (definition, name) {
            if inner_is_class {
                scope.push(ScopeEntry {
                    name,
                    class_like: true,
                });
                Self::collect_nodes(definition, src, language, scope, out);
                scope.pop();
            }
        }
    }

    // ── Cross-reference extraction ───────────────────────────────────────

    fn collect_definitions(
        node: Node,
        src: &str,
        rel_path: &str,
        scope: &mut Vec<String>,
        out: &mut Vec<SymbolDefinition>,
    ) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        drop(cursor);

        for child in children {
            let normalized = ChunkKind::from_node_kind(child.kind());
            let name = normalized.and_then(|_| node_name(child, src));

            match (normalized, name) {
                (Some(kind), Some(name)) if kind != ChunkKind::Export => {
                    let qualified_name = if scope.is_empty() {
                        name.clone()
                    } else {
                        format!("{}.{}", scope.join("."), name)
                    };
                    out.push(SymbolDefinition {
                        name: name.clone(),
                        qualified_name,
                        kind,
                        file: rel_path.to_string(),
                        start_line: start_line(child),
                        end_line: end_line(child),
                        scope_path: scope.clone(),
                        calls: Vec::new(),
                        called_by: Vec::new(),
                    });
                    scope.push(name);
                    Self::collect_definitions(child, src, rel_path, scope, out);
                    scope.pop();
                }
                _ => Self::collect_definitions(child, src, rel_path, scope, out),
            }
        }
    }

    /// The short name invoked by a call-expression node, per language.
    fn call_target(node: Node, src: &str, language: Language) -> Option<String> {
        match (language, node.kind()) {
            (Language::Rust, "call_expression") => {
                let function = node.child_by_field_name("function")?;
                match function.kind() {
                    "identifier" => Some(node_text(function, src)),
                    "scoped_identifier" => function
                        .child_by_field_name("name")
                        .map(|n| node_text(n, src)),
                    "field_expression" => function
                        .child_by_field_name("field")
                        .map(|n| node_text(n, src)),
                    _ => None,
                }
            }
            (Language::Rust, "macro_invocation") => node
                .child_by_field_name("macro")
                .filter(|m| m.kind() == "identifier")
                .map(|m| node_text(m, src)),
            (Language::Python, "call") => {
                let function = node.child_by_field_name("function")?;
                match function.kind() {
                    "identifier" => Some(node_text(function, src)),
                    "attribute" => function
                        .child_by_field_name("attribute")
                        .map(|n| node_text(n, src)),
                    _ => None,
                }
            }
            (Language::TypeScript | Language::JavaScript, "call_expression") => {
                let function = node.child_by_field_name("function")?;
                match function.kind() {
                    "identifier" => Some(node_text(function, src)),
                    "member_expression" => function
                        .child_by_field_name("property")
                        .map(|n| node_text(n, src)),
                    _ => None,
                }
            }
            (Language::TypeScript | Language::JavaScript, "new_expression") => node
                .child_by_field_name("constructor")
                .filter(|c| c.kind() == "identifier")
                .map(|c| node_text(c, src)),
            (Language::Go, "call_expression") => {
                let function = node.child_by_field_name("function")?;
                match function.kind() {
                    "identifier" => Some(node_text(function, src)),
                    "selector_expression" => function
                        .child_by_field_name("field")
                        .map(|n| node_text(n, src)),
                    _ => None,
                }
            }
            (Language::Java, "method_invocation") => node
                .child_by_field_name("name")
                .map(|n| node_text(n, src)),
            (Language::Java, "object_creation_expression") => node
                .child_by_field_name("type")
                .and_then(|t| find_identifier(t, src)),
            (Language::C | Language::Cpp, "call_expression") => {
                let function = node.child_by_field_name("function")?;
                match function.kind() {
                    "identifier" => Some(node_text(function, src)),
                    "field_expression" => function
                        .child_by_field_name("field")
                        .map(|n| node_text(n, src)),
                    "qualified_identifier" => function
                        .child_by_field_name("name")
                        .and_then(|n| find_identifier(n, src)),
                    _ => None,
                }
            }
            (Language::Cpp, "new_expression") => node
                .child_by_field_name("type")
                .and_then(|t| find_identifier(t, src)),
            (Language::CSharp, "invocation_expression") => {
                let function = node.child_by_field_name("function")?;
                match function.kind() {
                    "identifier" => Some(node_text(function, src)),
                    "member_access_expression" => function
                        .child_by_field_name("name")
                        .map(|n| node_text(n, src)),
                    _ => None,
                }
            }
            (Language::CSharp, "object_creation_expression") => node
                .child_by_field_name("type")
                .and_then(|t| find_identifier(t, src)),
            (Language::Ruby, "call") => node
                .child_by_field_name("method")
                .map(|m| node_text(m, src)),
            (Language::Php, "function_call_expression") => node
                .child_by_field_name("function")
                .and_then(|f| find_identifier(f, src)),
            (Language::Php, "member_call_expression" | "scoped_call_expression") => node
                .child_by_field_name("name")
                .map(|n| node_text(n, src)),
            (Language::Php, "object_creation_expression") => find_identifier(node, src),
            _ => None,
        }
    }

    fn collect_calls(node: Node, src: &str, language: Language, out: &mut Vec<(String, u32)>) {
        if let Some(name) = Self::call_target(node, src, language) {
            if !is_builtin_noise(&name) {
                out.push((name, start_line(node)));
            }
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        drop(cursor);
        for child in children {
            Self::collect_calls(child, src, language, out);
        }
    }

    /// Raw import specifier carried by an import-ish node, per language.
    fn import_source(node: Node, src: &str, language: Language) -> Option<String> {
        let raw = match (language, node.kind()) {
            (Language::TypeScript | Language::JavaScript, "import_statement") => node
                .child_by_field_name("source")
                .map(|s| node_text(s, src)),
            (Language::TypeScript | Language::JavaScript, "call_expression") => {
                let function = node.child_by_field_name("function")?;
                if function.kind() == "identifier" && node_text(function, src) == "require" {
                    let args = node.child_by_field_name("arguments")?;
                    let first = args.named_child(0)?;
                    (first.kind() == "string").then(|| node_text(first, src))
                } else {
                    None
                }
            }
            (Language::Python, "import_statement") => {
                node.named_child(0).map(|n| node_text(n, src))
            }
            (Language::Python, "import_from_statement") => node
                .child_by_field_name("module_name")
                .map(|m| node_text(m, src)),
            (Language::Rust, "use_declaration") => node
                .child_by_field_name("argument")
                .map(|a| node_text(a, src)),
            (Language::Go, "import_spec") => {
                node.child_by_field_name("path").map(|p| node_text(p, src))
            }
            (Language::Java, "import_declaration") => {
                node.named_child(0).map(|n| node_text(n, src))
            }
            (Language::C | Language::Cpp, "preproc_include") => {
                node.child_by_field_name("path").map(|p| node_text(p, src))
            }
            (Language::CSharp, "using_directive") => {
                node.named_child(0).map(|n| node_text(n, src))
            }
            (Language::Ruby, "call") => {
                let method = node.child_by_field_name("method")?;
                let method_name = node_text(method, src);
                if method_name == "require" || method_name == "require_relative" {
                    let args = node.child_by_field_name("arguments")?;
                    args.named_child(0).map(|a| node_text(a, src))
                } else {
                    None
                }
            }
            (Language::Php, "namespace_use_declaration") => {
                node.named_child(0).map(|n| node_text(n, src))
            }
            (Language::Php, "include_expression" | "require_expression"
            | "include_once_expression" | "require_once_expression") => {
                node.named_child(0).map(|n| node_text(n, src))
            }
            _ => None,
        }?;
        Some(normalize_import_path(&raw))
    }

    /// Top-level nodes that belong to a file's header region: comments,
    /// imports, lexical declarations, attributes and directive strings.
    fn is_header_node(node: Node) -> bool {
        if is_comment_kind(node.kind()) {
            return true;
        }
        match node.kind() {
            "import_statement"
            | "import_from_statement"
            | "future_import_statement"
            | "use_declaration"
            | "import_declaration"
            | "import_spec_list"
            | "import_header"
            | "preproc_include"
            | "preproc_define"
            | "using_directive"
            | "package_declaration"
            | "package_clause"
            | "namespace_use_declaration"
            | "php_tag"
            | "lexical_declaration"
            | "variable_declaration"
            | "const_item"
            | "static_item"
            | "attribute_item"
            | "inner_attribute_item"
            | "extern_crate_declaration" => true,
            // Go/Java wrap import groups in a declaration node.
            "import_declaration_list" => true,
            // Directive prologues ("use strict") and module docstrings.
            "expression_statement" => node
                .named_child(0)
                .is_some_and(|inner| inner.kind() == "string"),
            "string" => true,
            _ => false,
        }
    }

    fn collect_imports(
        node: Node,
        src: &str,
        language: Language,
        out: &mut Vec<ImportStatement>,
    ) {
        if let Some(source) = Self::import_source(node, src, language) {
            if !source.is_empty() {
                out.push(ImportStatement {
                    source,
                    line: start_line(node),
                });
            }
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        drop(cursor);
        for child in children {
            Self::collect_imports(child, src, language, out);
        }
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserService for TreeSitterParser {
    fn extract_nodes(
        &self,
        content: &str,
        language: Language,
    ) -> Result<Option<Vec<ParsedNode>>, DomainError> {
        let Some(tree) = self.parse(content, language)? else {
            return Ok(None);
        };

        let mut nodes = Vec::new();
        let mut scope = Vec::new();
        Self::collect_nodes(tree.root_node(), content, language, &mut scope, &mut nodes);

        debug!("Extracted {} declared constructs ({})", nodes.len(), language);
        Ok(Some(nodes))
    }

    fn extract_file_xref(
        &self,
        content: &str,
        rel_path: &str,
        language: Language,
    ) -> Result<FileXref, DomainError> {
        let Some(tree) = self.parse(content, language)? else {
            return Ok(FileXref::default());
        };
        let root = tree.root_node();

        let mut definitions = Vec::new();
        let mut scope = Vec::new();
        Self::collect_definitions(root, content, rel_path, &mut scope, &mut definitions);

        let mut raw_calls = Vec::new();
        Self::collect_calls(root, content, language, &mut raw_calls);

        // Assign each call its tightest enclosing definition and record the
        // call under every definition whose span contains it.
        let mut calls = Vec::with_capacity(raw_calls.len());
        let mut seen_per_def: Vec<HashSet<String>> =
            definitions.iter().map(|_| HashSet::new()).collect();

        for (name, line) in raw_calls {
            let mut caller = MODULE_CALLER.to_string();
            let mut tightest_span = u32::MAX;
            for def in &definitions {
                if def.start_line <= line && line <= def.end_line {
                    let span = def.end_line - def.start_line;
                    if span < tightest_span {
                        tightest_span = span;
                        caller = def.qualified_name.clone();
                    }
                }
            }
            for (def, seen) in definitions.iter_mut().zip(seen_per_def.iter_mut()) {
                if def.start_line <= line && line <= def.end_line && seen.insert(name.clone()) {
                    def.calls.push(name.clone());
                }
            }
            calls.push((
                name,
                CallSite {
                    file: rel_path.to_string(),
                    line,
                    caller,
                },
            ));
        }

        debug!(
            "Extracted {} definitions, {} calls from {} ({})",
            definitions.len(),
            calls.len(),
            rel_path,
            language
        );

        Ok(FileXref { definitions, calls })
    }

    fn extract_imports(
        &self,
        content: &str,
        language: Language,
    ) -> Result<Vec<ImportStatement>, DomainError> {
        let Some(tree) = self.parse(content, language)? else {
            return Ok(Vec::new());
        };
        let mut imports = Vec::new();
        Self::collect_imports(tree.root_node(), content, language, &mut imports);
        Ok(imports)
    }

    fn file_context_span(
        &self,
        content: &str,
        language: Language,
    ) -> Result<Option<u32>, DomainError> {
        const HEADER_LINE_CEILING: u32 = 200;

        let Some(tree) = self.parse(content, language)? else {
            return Ok(None);
        };

        let root = tree.root_node();
        let mut end_of_header: Option<u32> = None;
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if start_line(child) > HEADER_LINE_CEILING {
                break;
            }
            if !Self::is_header_node(child) {
                break;
            }
            end_of_header = Some(end_line(child));
        }
        Ok(end_of_header)
    }

    fn supported_languages(&self) -> Vec<Language> {
        self.supported_languages.clone()
    }
}
