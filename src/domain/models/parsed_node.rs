use super::ChunkKind;

/// One declared construct extracted from a parse tree: the raw text of the
/// node plus the metadata the chunker needs. Lines are 1-based and
/// inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub text: String,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: ChunkKind,
    pub name: Option<String>,
    /// Enclosing class/module names, outermost first.
    pub scope_path: Vec<String>,
    pub docstring: Option<String>,
}

impl ParsedNode {
    pub fn scope(&self) -> String {
        self.scope_path.join(".")
    }

    pub fn qualified_name(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        if self.scope_path.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{}.{}", self.scope(), name))
        }
    }
}
