use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::application::use_cases::crawl::Crawler;
use crate::connector::storage::IndexCatalog;
use crate::domain::{estimate_tokens, ChunkKind, DomainError};

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    /// Restrict the summary to paths under this prefix; empty means the
    /// whole repository.
    pub scope: String,
    /// How many directory levels to break out.
    pub depth: usize,
    /// Path fragments to detail with their symbols.
    pub focus: Vec<String>,
    /// Hard ceiling on the summary's token estimate.
    pub max_tokens: usize,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            scope: String::new(),
            depth: 2,
            focus: Vec::new(),
            max_tokens: 1024,
        }
    }
}

/// Produces a bounded architectural overview: directory layout, language
/// mix and the most referenced symbols, truncated to the token budget.
pub struct SummarizeCodebaseUseCase {
    crawler: Crawler,
    catalog: Arc<IndexCatalog>,
}

impl SummarizeCodebaseUseCase {
    pub fn new(crawler: Crawler, catalog: Arc<IndexCatalog>) -> Self {
        Self { crawler, catalog }
    }

    pub async fn execute(&self, options: &SummarizeOptions) -> Result<String, DomainError> {
        let crawl = self.crawler.crawl().await?;
        let in_scope: Vec<_> = crawl
            .iter()
            .filter(|f| options.scope.is_empty() || f.rel_path.starts_with(&options.scope))
            .collect();

        let mut by_language: BTreeMap<&str, usize> = BTreeMap::new();
        let mut by_dir: BTreeMap<String, usize> = BTreeMap::new();
        for file in &in_scope {
            *by_language.entry(file.language.as_str()).or_insert(0) += 1;
            let dir = dir_key(&file.rel_path, options.depth);
            *by_dir.entry(dir).or_insert(0) += 1;
        }

        let mut sections: Vec<String> = Vec::new();
        sections.push(format!(
            "# Codebase summary{}\n\n{} source files.",
            if options.scope.is_empty() {
                String::new()
            } else {
                format!(" ({})", options.scope)
            },
            in_scope.len()
        ));

        let languages = by_language
            .iter()
            .map(|(lang, count)| format!("{} ({})", lang, count))
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(format!("## Languages\n\n{}", languages));

        let mut dirs: Vec<(String, usize)> = by_dir.into_iter().collect();
        dirs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let layout = dirs
            .iter()
            .take(30)
            .map(|(dir, count)| format!("- {}  ({} files)", dir, count))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## Layout\n\n{}", layout));

        // Most referenced symbols, straight from the xref graph.
        {
            let xref = self.catalog.xref.read().expect("xref lock poisoned");
            let mut ranked: Vec<(&String, usize)> = xref
                .definitions
                .iter()
                .filter(|(_, def)| !def.called_by.is_empty())
                .filter(|(_, def)| {
                    options.scope.is_empty() || def.file.starts_with(&options.scope)
                })
                .map(|(fqn, def)| (fqn, def.called_by.len()))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            if !ranked.is_empty() {
                let symbols = ranked
                    .iter()
                    .take(15)
                    .map(|(fqn, callers)| format!("- {}  ({} callers)", fqn, callers))
                    .collect::<Vec<_>>()
                    .join("\n");
                sections.push(format!("## Most referenced symbols\n\n{}", symbols));
            }
        }

        // Focused paths get their declared symbols listed.
        if !options.focus.is_empty() {
            let xref = self.catalog.xref.read().expect("xref lock poisoned");
            for fragment in &options.focus {
                let mut symbols: Vec<String> = xref
                    .definitions
                    .values()
                    .filter(|def| def.file.contains(fragment.as_str()))
                    .filter(|def| def.kind != ChunkKind::Block)
                    .map(|def| {
                        format!(
                            "- {} {} ({}:{})",
                            def.kind, def.qualified_name, def.file, def.start_line
                        )
                    })
                    .collect();
                symbols.sort();
                if !symbols.is_empty() {
                    sections.push(format!(
                        "## Focus: {}\n\n{}",
                        fragment,
                        symbols.join("\n")
                    ));
                }
            }
        }

        let summary = truncate_to_budget(&sections.join("\n\n"), options.max_tokens);
        debug!(
            "Summary: {} sections, ~{} tokens",
            sections.len(),
            estimate_tokens(&summary)
        );
        Ok(summary)
    }
}

fn dir_key(rel_path: &str, depth: usize) -> String {
    let parts: Vec<&str> = rel_path.split('/').collect();
    if parts.len() <= 1 {
        return "(root)".to_string();
    }
    let dirs = &parts[..parts.len() - 1];
    dirs.iter()
        .take(depth.max(1))
        .copied()
        .collect::<Vec<_>>()
        .join("/")
}

fn truncate_to_budget(text: &str, max_tokens: usize) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let mut out = String::new();
    for line in text.lines() {
        if estimate_tokens(&out) + estimate_tokens(line) + 1 > max_tokens {
            out.push_str("\n…");
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_summary_lists_languages_and_layout() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.rs", "fn main() {}");
        write(dir.path(), "src/util.rs", "fn util() {}");
        write(dir.path(), "scripts/run.py", "def run(): pass");

        let use_case = SummarizeCodebaseUseCase::new(
            Crawler::new(dir.path()),
            Arc::new(IndexCatalog::in_memory()),
        );
        let summary = use_case.execute(&SummarizeOptions::default()).await.unwrap();

        assert!(summary.contains("3 source files"));
        assert!(summary.contains("rust (2)"));
        assert!(summary.contains("python (1)"));
        assert!(summary.contains("- src"));
    }

    #[tokio::test]
    async fn test_summary_respects_token_budget() {
        let dir = TempDir::new().unwrap();
        for i in 0..60 {
            write(
                dir.path(),
                &format!("mod_{i}/file_{i}.rs"),
                "fn placeholder() {}",
            );
        }

        let use_case = SummarizeCodebaseUseCase::new(
            Crawler::new(dir.path()),
            Arc::new(IndexCatalog::in_memory()),
        );
        let summary = use_case
            .execute(&SummarizeOptions {
                max_tokens: 50,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(estimate_tokens(&summary) <= 60);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn test_dir_key_depth() {
        assert_eq!(dir_key("main.rs", 2), "(root)");
        assert_eq!(dir_key("src/main.rs", 2), "src");
        assert_eq!(dir_key("src/engine/core/x.rs", 2), "src/engine");
    }
}
