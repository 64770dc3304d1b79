use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Language;

/// Cheap, deterministic token estimate used for every size bound in the
/// pipeline: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Stable chunk identity: the SHA-256 of path, line range and code,
/// truncated to 16 hex characters. Unchanged `(path, lines, code)` yields
/// the same id across re-indexing.
pub fn chunk_id(relative_path: &str, start_line: u32, end_line: u32, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative_path.as_bytes());
    hasher.update(start_line.to_string().as_bytes());
    hasher.update(end_line.to_string().as_bytes());
    hasher.update(code.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// A semantic fragment of a source file with retrieval metadata.
///
/// `code` is what callers display; `index_text` (when present) is the
/// enriched text fed to the embedder and the lexical index. Line numbers
/// always index into `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    id: String,
    file_path: String,
    relative_path: String,
    code: String,
    index_text: Option<String>,
    start_line: u32,
    end_line: u32,
    language: Language,
    kind: ChunkKind,
    name: Option<String>,
    scope: String,
    docstring: Option<String>,
    token_estimate: usize,
    calls: Vec<String>,
    called_by: Vec<String>,
    last_updated_ms: u64,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_path: String,
        relative_path: String,
        code: String,
        start_line: u32,
        end_line: u32,
        language: Language,
        kind: ChunkKind,
    ) -> Self {
        debug_assert!(start_line <= end_line);
        let id = chunk_id(&relative_path, start_line, end_line, &code);
        let token_estimate = estimate_tokens(&code);
        Self {
            id,
            file_path,
            relative_path,
            code,
            index_text: None,
            start_line,
            end_line,
            language,
            kind,
            name: None,
            scope: String::new(),
            docstring: None,
            token_estimate,
            calls: Vec::new(),
            called_by: Vec::new(),
            last_updated_ms: now_ms(),
        }
    }

    /// Reconstitutes from persisted data (used by adapters).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        file_path: String,
        relative_path: String,
        code: String,
        start_line: u32,
        end_line: u32,
        language: Language,
        kind: ChunkKind,
        name: Option<String>,
        scope: String,
        docstring: Option<String>,
        token_estimate: usize,
        last_updated_ms: u64,
    ) -> Self {
        Self {
            id,
            file_path,
            relative_path,
            code,
            index_text: None,
            start_line,
            end_line,
            language,
            kind,
            name,
            scope,
            docstring,
            token_estimate,
            calls: Vec::new(),
            called_by: Vec::new(),
            last_updated_ms,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_index_text(mut self, index_text: impl Into<String>) -> Self {
        self.index_text = Some(index_text.into());
        self
    }

    pub fn with_calls(mut self, calls: Vec<String>) -> Self {
        self.calls = calls;
        self
    }

    pub fn set_calls(&mut self, calls: Vec<String>) {
        self.calls = calls;
    }

    pub fn set_called_by(&mut self, callers: Vec<String>) {
        self.called_by = callers;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The text the embedder and lexical index consume; falls back to the
    /// raw code when no enriched text was built.
    pub fn index_text(&self) -> &str {
        self.index_text.as_deref().unwrap_or(&self.code)
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn docstring(&self) -> Option<&str> {
        self.docstring.as_deref()
    }

    pub fn token_estimate(&self) -> usize {
        self.token_estimate
    }

    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn called_by(&self) -> &[String] {
        &self.called_by
    }

    pub fn last_updated_ms(&self) -> u64 {
        self.last_updated_ms
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Document id used by the lexical index: `relPath:start:end`, so that
    /// per-file removal is a prefix scan.
    pub fn lexical_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.relative_path, self.start_line, self.end_line
        )
    }

    pub fn location(&self) -> String {
        format!(
            "{}:{}-{}",
            self.relative_path, self.start_line, self.end_line
        )
    }

    /// Dotted fully qualified name, or the bare name at module scope.
    pub fn qualified_name(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        if self.scope.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{}.{}", self.scope, name))
        }
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Normalized code-construct kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Struct,
    Enum,
    Impl,
    Trait,
    Module,
    Namespace,
    Export,
    Decorated,
    FileContext,
    Block,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Class => "class",
            ChunkKind::Interface => "interface",
            ChunkKind::Type => "type",
            ChunkKind::Struct => "struct",
            ChunkKind::Enum => "enum",
            ChunkKind::Impl => "impl",
            ChunkKind::Trait => "trait",
            ChunkKind::Module => "module",
            ChunkKind::Namespace => "namespace",
            ChunkKind::Export => "export",
            ChunkKind::Decorated => "decorated",
            ChunkKind::FileContext => "file_context",
            ChunkKind::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "function" => ChunkKind::Function,
            "method" => ChunkKind::Method,
            "class" => ChunkKind::Class,
            "interface" => ChunkKind::Interface,
            "type" => ChunkKind::Type,
            "struct" => ChunkKind::Struct,
            "enum" => ChunkKind::Enum,
            "impl" => ChunkKind::Impl,
            "trait" => ChunkKind::Trait,
            "module" => ChunkKind::Module,
            "namespace" => ChunkKind::Namespace,
            "export" => ChunkKind::Export,
            "decorated" => ChunkKind::Decorated,
            "file_context" => ChunkKind::FileContext,
            _ => ChunkKind::Block,
        }
    }

    /// Collapses language-specific tree-sitter node kinds into the
    /// normalized kind set.
    pub fn from_node_kind(raw: &str) -> Option<Self> {
        let kind = match raw {
            // Functions
            "function_declaration" | "function_item" | "function_definition"
            | "arrow_function" | "function_expression" | "generator_function_declaration"
            | "local_function_statement" => ChunkKind::Function,
            // Methods
            "method_definition" | "method_declaration" | "constructor_declaration"
            | "method" | "singleton_method" => ChunkKind::Method,
            // Classes
            "class_declaration" | "class_definition" | "class_specifier" | "class" => {
                ChunkKind::Class
            }
            // Interfaces
            "interface_declaration" => ChunkKind::Interface,
            // Type aliases (Go's outer type_declaration is skipped; its
            // inner type_spec carries the name)
            "type_alias_declaration" | "type_item" | "type_definition" | "type_spec" => {
                ChunkKind::Type
            }
            // Structs
            "struct_item" | "struct_specifier" | "struct_declaration" => ChunkKind::Struct,
            // Enums
            "enum_item" | "enum_declaration" | "enum_specifier" => ChunkKind::Enum,
            // Impl blocks
            "impl_item" => ChunkKind::Impl,
            // Traits
            "trait_item" | "trait_declaration" => ChunkKind::Trait,
            // Modules
            "mod_item" | "module" => ChunkKind::Module,
            // Namespaces
            "namespace_definition" | "namespace_declaration" | "internal_module" => {
                ChunkKind::Namespace
            }
            // Exports
            "export_statement" => ChunkKind::Export,
            // Decorated definitions
            "decorated_definition" => ChunkKind::Decorated,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, ChunkKind::Function | ChunkKind::Method)
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
