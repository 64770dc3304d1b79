use std::sync::Arc;

use tracing::debug;

use crate::application::ParserService;
use crate::domain::{estimate_tokens, Chunk, ChunkKind, FileXref, Language, ParsedNode};

/// Size bounds for semantic chunking.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Hard ceiling on a chunk's token estimate; larger nodes are split.
    pub max_chunk_tokens: usize,
    /// Structural chunks estimated below `min_chunk_lines * 10` tokens are
    /// dropped as retrieval noise.
    pub min_chunk_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 512,
            min_chunk_lines: 3,
        }
    }
}

impl ChunkerConfig {
    fn window_lines(&self) -> usize {
        (self.max_chunk_tokens / 4).max(1)
    }

    fn file_context_budget(&self) -> usize {
        128.min(self.max_chunk_tokens / 4).max(1)
    }

    fn min_tokens(&self) -> usize {
        self.min_chunk_lines * 10
    }
}

/// AST-driven decomposition of a source file into retrieval chunks.
pub struct SemanticChunker {
    parser: Arc<dyn ParserService>,
    config: ChunkerConfig,
}

impl SemanticChunker {
    pub fn new(parser: Arc<dyn ParserService>) -> Self {
        Self {
            parser,
            config: ChunkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChunkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> ChunkerConfig {
        self.config
    }

    /// Chunk one file. `xref` carries this file's tracker output so chunks
    /// can be annotated with their outgoing calls.
    pub fn chunk_file(
        &self,
        abs_path: &str,
        rel_path: &str,
        content: &str,
        language: Language,
        xref: Option<&FileXref>,
    ) -> Vec<Chunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }

        let nodes = match self.parser.extract_nodes(content, language) {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!("Node extraction failed for {}: {}", rel_path, e);
                None
            }
        };

        let file_context = self.build_file_context(abs_path, rel_path, content, language);
        let context_snippet = file_context.as_ref().map(|c| {
            truncate_head_tail(c.code(), self.config.file_context_budget())
        });

        let mut chunks = Vec::new();

        match nodes {
            Some(nodes) if !nodes.is_empty() => {
                for node in nodes {
                    self.push_node_chunks(
                        &mut chunks,
                        abs_path,
                        rel_path,
                        language,
                        node,
                        context_snippet.as_deref(),
                        xref,
                    );
                }
            }
            _ => {
                debug!("Falling back to block chunking for {}", rel_path);
                self.push_block_chunks(
                    &mut chunks,
                    abs_path,
                    rel_path,
                    content,
                    language,
                    context_snippet.as_deref(),
                );
            }
        }

        if let Some(context) = file_context {
            chunks.insert(0, context);
        }

        chunks
    }

    /// Build the `file_context` chunk: a bounded prefix of imports and
    /// header-ish declarations that disambiguates otherwise identical
    /// fragments across files. Its code and index text are identical.
    fn build_file_context(
        &self,
        abs_path: &str,
        rel_path: &str,
        content: &str,
        language: Language,
    ) -> Option<Chunk> {
        let end_of_header = match self.parser.file_context_span(content, language) {
            Ok(Some(end)) => end,
            Ok(None) | Err(_) => heuristic_header_end(content)?,
        };

        let header: Vec<&str> = content.lines().take(end_of_header as usize).collect();
        if header.is_empty() {
            return None;
        }
        let text = truncate_head_tail(&header.join("\n"), self.config.file_context_budget());
        if text.trim().is_empty() {
            return None;
        }

        let chunk = Chunk::new(
            abs_path.to_string(),
            rel_path.to_string(),
            text.clone(),
            1,
            end_of_header,
            language,
            ChunkKind::FileContext,
        )
        .with_index_text(text);
        Some(chunk)
    }

    #[allow(clippy::too_many_arguments)]
    fn push_node_chunks(
        &self,
        chunks: &mut Vec<Chunk>,
        abs_path: &str,
        rel_path: &str,
        language: Language,
        node: ParsedNode,
        context_snippet: Option<&str>,
        xref: Option<&FileXref>,
    ) {
        if estimate_tokens(&node.text) < self.config.min_tokens() {
            return;
        }

        let scope = node.scope();
        let calls = node
            .name
            .as_deref()
            .and_then(|name| {
                xref.and_then(|x| {
                    x.definitions
                        .iter()
                        .find(|d| d.start_line == node.start_line && d.name == name)
                        .map(|d| d.calls.clone())
                })
            })
            .unwrap_or_default();

        if estimate_tokens(&node.text) <= self.config.max_chunk_tokens {
            let mut chunk = Chunk::new(
                abs_path.to_string(),
                rel_path.to_string(),
                node.text.clone(),
                node.start_line,
                node.end_line,
                language,
                node.kind,
            )
            .with_scope(scope.clone())
            .with_calls(calls);
            if let Some(name) = &node.name {
                chunk = chunk.with_name(name.clone());
            }
            if let Some(doc) = &node.docstring {
                chunk = chunk.with_docstring(doc.clone());
            }
            let index_text =
                self.assemble_index_text(rel_path, &chunk, context_snippet, node.docstring.as_deref());
            chunks.push(chunk.with_index_text(index_text));
            return;
        }

        // Oversize node: split by line into token-bounded sub-chunks. Only
        // the first part keeps the docstring.
        for (part, (code, part_start, part_end)) in self
            .split_by_budget(&node.text, node.start_line)
            .into_iter()
            .enumerate()
        {
            let part_name = node
                .name
                .as_ref()
                .map(|name| format!("{}_part{}", name, part));
            let mut chunk = Chunk::new(
                abs_path.to_string(),
                rel_path.to_string(),
                code,
                part_start,
                part_end,
                language,
                node.kind,
            )
            .with_scope(scope.clone())
            .with_calls(calls.clone());
            if let Some(name) = part_name {
                chunk = chunk.with_name(name);
            }
            let docstring = (part == 0).then_some(node.docstring.as_deref()).flatten();
            if let Some(doc) = docstring {
                chunk = chunk.with_docstring(doc.to_string());
            }
            let index_text = self.assemble_index_text(rel_path, &chunk, context_snippet, docstring);
            chunks.push(chunk.with_index_text(index_text));
        }
    }

    fn push_block_chunks(
        &self,
        chunks: &mut Vec<Chunk>,
        abs_path: &str,
        rel_path: &str,
        content: &str,
        language: Language,
        context_snippet: Option<&str>,
    ) {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return;
        }

        let window = self.config.window_lines();
        // 25% overlap between consecutive windows.
        let step = (window * 3 / 4).max(1);

        let mut start = 0usize;
        loop {
            let end = (start + window).min(lines.len());
            let code = lines[start..end].join("\n");
            if !code.trim().is_empty() {
                let chunk = Chunk::new(
                    abs_path.to_string(),
                    rel_path.to_string(),
                    code,
                    start as u32 + 1,
                    end as u32,
                    language,
                    ChunkKind::Block,
                );
                let index_text = self.assemble_index_text(rel_path, &chunk, context_snippet, None);
                chunks.push(chunk.with_index_text(index_text));
            }
            if end == lines.len() {
                break;
            }
            start += step;
        }
    }

    /// Split an oversize node into line runs, each bounded by both the
    /// token ceiling and a `max_chunk_tokens/4` line window. Returns
    /// `(code, start_line, end_line)` triples with absolute line numbers.
    fn split_by_budget(&self, text: &str, first_line: u32) -> Vec<(String, u32, u32)> {
        let lines: Vec<&str> = text.lines().collect();
        let max_lines = self.config.window_lines();
        let max_tokens = self.config.max_chunk_tokens;

        let mut parts = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_tokens = 0usize;
        let mut current_start = 0usize;

        for (i, line) in lines.iter().enumerate() {
            let line_tokens = estimate_tokens(line) + 1;
            let would_overflow = !current.is_empty()
                && (current_tokens + line_tokens > max_tokens || current.len() >= max_lines);
            if would_overflow {
                parts.push((
                    current.join("\n"),
                    first_line + current_start as u32,
                    first_line + i as u32 - 1,
                ));
                current = Vec::new();
                current_tokens = 0;
                current_start = i;
            }
            current.push(line);
            current_tokens += line_tokens;
        }
        if !current.is_empty() {
            parts.push((
                current.join("\n"),
                first_line + current_start as u32,
                first_line + lines.len() as u32 - 1,
            ));
        }
        parts
    }

    /// The text the embedder and lexical index consume: truncated file
    /// context, a metadata header, the docstring, then the code, separated
    /// by blank lines.
    fn assemble_index_text(
        &self,
        rel_path: &str,
        chunk: &Chunk,
        context_snippet: Option<&str>,
        docstring: Option<&str>,
    ) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(context) = context_snippet {
            if !context.trim().is_empty() {
                sections.push(context.to_string());
            }
        }

        let mut header = format!("// File: {}\n// Kind: {}", rel_path, chunk.kind());
        if let Some(name) = chunk.name() {
            header.push(' ');
            header.push_str(name);
        }
        header.push_str("\n// Scope: ");
        header.push_str(if chunk.scope().is_empty() {
            "module"
        } else {
            chunk.scope()
        });
        sections.push(header);

        if let Some(doc) = docstring {
            sections.push(doc.to_string());
        }
        sections.push(chunk.code().to_string());
        sections.join("\n\n")
    }
}

/// Heuristic header detection used when no parse tree is available: the
/// leading run of blank, comment and import-ish lines within the first 80.
fn heuristic_header_end(content: &str) -> Option<u32> {
    const PREFIXES: &[&str] = &[
        "import ", "from ", "use ", "using ", "package ", "require ", "require(", "include ",
        "#include", "#define", "export ", "const ", "let ", "var ", "namespace ", "<?php",
        "module ", "extern ",
    ];

    let mut end = 0u32;
    for (i, line) in content.lines().take(80).enumerate() {
        let trimmed = line.trim();
        let header_ish = trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with("/*")
            || trimmed.starts_with('*')
            || trimmed.starts_with('#')
            || trimmed.starts_with("\"use")
            || trimmed.starts_with("'use")
            || PREFIXES.iter().any(|p| trimmed.starts_with(p));
        if !header_ish {
            break;
        }
        if !trimmed.is_empty() {
            end = i as u32 + 1;
        }
    }
    (end > 0).then_some(end)
}

/// Bound `text` to roughly `budget` tokens by keeping the head and the
/// tail and eliding the middle.
fn truncate_head_tail(text: &str, budget: usize) -> String {
    if estimate_tokens(text) <= budget {
        return text.to_string();
    }

    let lines: Vec<&str> = text.lines().collect();
    let head_budget = budget * 2 / 3;
    let tail_budget = budget - head_budget;

    let mut head: Vec<&str> = Vec::new();
    let mut used = 0usize;
    for line in &lines {
        let cost = estimate_tokens(line) + 1;
        if used + cost > head_budget {
            break;
        }
        head.push(line);
        used += cost;
    }

    let mut tail: Vec<&str> = Vec::new();
    let mut tail_used = 0usize;
    for line in lines.iter().rev() {
        let cost = estimate_tokens(line) + 1;
        if tail_used + cost > tail_budget {
            break;
        }
        tail.push(line);
        tail_used += cost;
    }
    tail.reverse();

    if head.len() + tail.len() >= lines.len() {
        return lines[..head.len().min(lines.len())].join("\n");
    }

    let mut out = head.join("\n");
    out.push_str("\n// …\n");
    out.push_str(&tail.join("\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TreeSitterParser;

    fn chunker() -> SemanticChunker {
        SemanticChunker::new(Arc::new(TreeSitterParser::new()))
    }

    fn chunker_with(max_chunk_tokens: usize, min_chunk_lines: usize) -> SemanticChunker {
        chunker().with_config(ChunkerConfig {
            max_chunk_tokens,
            min_chunk_lines,
        })
    }

    #[test]
    fn test_chunk_rust_file() {
        let content = r#"use std::collections::HashMap;

/// Counts word occurrences in a line-oriented corpus.
fn count_words(corpus: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for word in corpus.split_whitespace() {
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }
    counts
}
"#;
        let chunks = chunker().chunk_file("/repo/w.rs", "w.rs", content, Language::Rust, None);

        assert!(chunks
            .iter()
            .any(|c| c.kind() == ChunkKind::FileContext && c.start_line() == 1));
        let func = chunks
            .iter()
            .find(|c| c.name() == Some("count_words"))
            .expect("function chunk");
        assert_eq!(func.kind(), ChunkKind::Function);
        assert!(func.docstring().unwrap().contains("Counts word occurrences"));
        assert!(func.index_text().contains("// File: w.rs"));
        assert!(func.index_text().contains(func.code()));
    }

    #[test]
    fn test_chunk_ids_stable_across_runs() {
        let content = "fn stable() -> u32 {\n    1\n}\n";
        let first = chunker().chunk_file("/r/s.rs", "s.rs", content, Language::Rust, None);
        let second = chunker().chunk_file("/r/s.rs", "s.rs", content, Language::Rust, None);

        let first_ids: Vec<&str> = first.iter().map(|c| c.id()).collect();
        let second_ids: Vec<&str> = second.iter().map(|c| c.id()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_oversize_function_is_split() {
        // One function of ~4000 characters against a 200-token ceiling.
        let body: String = (0..100)
            .map(|i| format!("    let value_{i} = compute_step_number_{i}(input);\n"))
            .collect();
        let content = format!("/// Pipeline driver.\nfn run_pipeline(input: u32) {{\n{body}}}\n");

        let chunks = chunker_with(200, 1).chunk_file(
            "/r/big.rs",
            "big.rs",
            &content,
            Language::Rust,
            None,
        );

        let parts: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.name().is_some_and(|n| n.starts_with("run_pipeline_part")))
            .collect();
        assert!(parts.len() > 1, "expected multiple sub-chunks");

        for part in &parts {
            assert!(part.token_estimate() <= 200, "sub-chunk over budget");
        }

        let part0 = parts
            .iter()
            .find(|c| c.name() == Some("run_pipeline_part0"))
            .unwrap();
        assert!(part0.docstring().is_some(), "part0 keeps the docstring");
        for part in parts.iter().filter(|c| c.name() != Some("run_pipeline_part0")) {
            assert!(part.docstring().is_none());
        }

        let mut ids: Vec<&str> = parts.iter().map(|c| c.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), parts.len(), "sub-chunk ids must be distinct");
    }

    #[test]
    fn test_tiny_fragments_dropped() {
        let content = "const A: u32 = 1;\n\nfn tiny() {}\n";
        let chunks = chunker_with(512, 3).chunk_file("/r/t.rs", "t.rs", content, Language::Rust, None);
        assert!(chunks.iter().all(|c| c.name() != Some("tiny")));
    }

    #[test]
    fn test_fallback_block_chunking() {
        // Not valid code in any supported grammar, so extraction yields no
        // nodes and the chunker falls back to line windows.
        let lines: String = (0..120).map(|i| format!("datum {i} :: value\n")).collect();
        let chunks = chunker_with(160, 1).chunk_file(
            "/r/data.py",
            "data.py",
            &lines,
            Language::Python,
            None,
        );

        let blocks: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.kind() == ChunkKind::Block)
            .collect();
        assert!(blocks.len() > 1, "expected multiple block windows");

        // 25% overlap: each window starts 3/4 of a window after the last.
        let window = 160 / 4;
        let step = window * 3 / 4;
        assert_eq!(blocks[1].start_line() - blocks[0].start_line(), step as u32);
    }

    #[test]
    fn test_xref_association() {
        let parser = TreeSitterParser::new();
        let content = r#"
fn helper_routine() -> u32 {
    42
}

fn orchestrate() -> u32 {
    helper_routine() + helper_routine()
}
"#;
        let xref = parser
            .extract_file_xref(content, "x.rs", Language::Rust)
            .unwrap();

        let chunks = chunker_with(512, 1).chunk_file(
            "/r/x.rs",
            "x.rs",
            content,
            Language::Rust,
            Some(&xref),
        );

        let orchestrate = chunks
            .iter()
            .find(|c| c.name() == Some("orchestrate"))
            .unwrap();
        assert_eq!(orchestrate.calls(), &["helper_routine".to_string()]);
    }

    #[test]
    fn test_truncate_head_tail() {
        let text = (0..100)
            .map(|i| format!("line number {i} with some padding"))
            .collect::<Vec<_>>()
            .join("\n");
        let truncated = truncate_head_tail(&text, 50);
        assert!(estimate_tokens(&truncated) <= 60);
        assert!(truncated.contains("line number 0"));
        assert!(truncated.contains("line number 99"));
        assert!(truncated.contains("…"));
    }

    #[test]
    fn test_empty_file_yields_no_chunks() {
        assert!(chunker()
            .chunk_file("/r/e.rs", "e.rs", "   \n\n", Language::Rust, None)
            .is_empty());
    }
}
