use crate::domain::{DomainError, FileXref, ImportStatement, Language, ParsedNode};

/// Uniform parsing façade over the supported language set.
///
/// Parsing is pure CPU work, so the port is synchronous; callers run it
/// inside their own task pools.
pub trait ParserService: Send + Sync {
    /// Extract declared constructs (functions, classes, …) from a file.
    ///
    /// Returns `None` when the content cannot be parsed, so callers can
    /// fall back to naïve block chunking. An unsupported language is an
    /// error.
    fn extract_nodes(
        &self,
        content: &str,
        language: Language,
    ) -> Result<Option<Vec<ParsedNode>>, DomainError>;

    /// Extract the definitions and call sites of a file for the
    /// cross-reference graph. Best-effort: a failed parse yields an empty
    /// result.
    fn extract_file_xref(
        &self,
        content: &str,
        rel_path: &str,
        language: Language,
    ) -> Result<FileXref, DomainError>;

    /// Extract import/include/require statements for the dependency scout.
    fn extract_imports(
        &self,
        content: &str,
        language: Language,
    ) -> Result<Vec<ImportStatement>, DomainError>;

    /// Last line (1-based, inclusive) of the file's header region: the
    /// leading run of comments, imports and top-level declarations used as
    /// file context. `None` when the tree is unavailable or the file has
    /// no header, in which case callers use a line-based heuristic.
    fn file_context_span(
        &self,
        content: &str,
        language: Language,
    ) -> Result<Option<u32>, DomainError>;

    fn supported_languages(&self) -> Vec<Language>;

    fn supports_language(&self, language: Language) -> bool {
        self.supported_languages().contains(&language)
    }
}
