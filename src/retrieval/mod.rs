//! Guideline retrieval
//!
//! The knowledge base is a directory of markdown files. Each `## ` section
//! becomes one chunk. The index is built once per run and only read after
//! that, so workers share it through an `Arc` without locking.

use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Query words that carry no topical signal
const STOP_TERMS: &[&str] = &["and", "for", "the", "with", "rule", "rules"];

pub trait Retriever: Send + Sync {
    /// Up to `top_k` chunks ranked by relevance to `query`.
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<String>;
}

#[derive(Debug, Clone)]
struct Chunk {
    text: String,
    terms: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct GuidelineIndex {
    chunks: Vec<Chunk>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() >= 2)
        .map(|w| w.to_lowercase())
}

/// Split a markdown document at `## ` headings. Text before the first
/// heading is its own chunk when non-empty.
pub fn split_sections(document: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    for line in document.lines() {
        if line.starts_with("## ") && !current.trim().is_empty() {
            sections.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current.trim().to_string());
    }
    sections
}

impl GuidelineIndex {
    /// Build from `(name, markdown)` pairs, keeping their order.
    pub fn from_documents<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let chunks = documents
            .into_iter()
            .flat_map(|doc| split_sections(doc.as_ref()))
            .map(|text| Chunk {
                terms: tokenize(&text).collect(),
                text,
            })
            .collect();
        Self { chunks }
    }

    /// Load every `*.md` file under `dir` in path order. A missing or
    /// unreadable directory yields an empty index.
    pub fn load(dir: &Path) -> Self {
        if !dir.is_dir() {
            tracing::warn!(path = %dir.display(), "knowledge base not found; retrieval yields nothing");
            return Self::default();
        }
        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let documents: Vec<String> = paths
            .par_iter()
            .filter_map(|path| match fs::read_to_string(path) {
                Ok(text) => Some(text),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable guideline file");
                    None
                }
            })
            .collect();

        let index = Self::from_documents(documents);
        tracing::info!(
            files = paths.len(),
            chunks = index.len(),
            "loaded knowledge base"
        );
        index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Retriever for GuidelineIndex {
    fn retrieve(&self, query: &str, top_k: usize) -> Vec<String> {
        let query_terms: Vec<String> = {
            let mut seen = HashSet::new();
            tokenize(query)
                .filter(|t| !STOP_TERMS.contains(&t.as_str()))
                .filter(|t| seen.insert(t.clone()))
                .collect()
        };
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &Chunk)> = self
            .chunks
            .iter()
            .map(|chunk| {
                let hits = query_terms
                    .iter()
                    .filter(|t| chunk.terms.contains(*t))
                    .count();
                (hits, chunk)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        // Stable: equal scores keep load order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, chunk)| chunk.text.clone())
            .collect()
    }
}

/// Run every query and merge the results, dropping repeated chunks while
/// keeping first-seen order.
pub fn gather(retriever: &dyn Retriever, queries: &[String], top_k: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for query in queries {
        for chunk in retriever.retrieve(query, top_k) {
            if seen.insert(chunk.clone()) {
                merged.push(chunk);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATABASE: &str = "\
# Database

## Parameterized queries
Never build SQL by string concatenation. Use parameterized database queries.

## Connection lifetime
Close database connections with a context manager.
";

    const STYLE: &str = "\
## General code style
Prefer small functions. Keep code style consistent.
";

    #[test]
    fn test_split_sections_keeps_headings() {
        let sections = split_sections(DATABASE);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], "# Database");
        assert!(sections[1].starts_with("## Parameterized queries"));
        assert!(sections[2].starts_with("## Connection lifetime"));
    }

    #[test]
    fn test_retrieve_ranks_by_term_hits_then_load_order() {
        let index = GuidelineIndex::from_documents([DATABASE, STYLE]);
        let hits = index.retrieve("database rules", 5);
        assert_eq!(hits.len(), 3);
        assert!(hits[0].starts_with("# Database"));
        assert!(hits[1].starts_with("## Parameterized"));

        let style = index.retrieve("general code style", 1);
        assert_eq!(style.len(), 1);
        assert!(style[0].starts_with("## General code style"));
    }

    #[test]
    fn test_stop_terms_alone_match_nothing() {
        let index = GuidelineIndex::from_documents([DATABASE]);
        assert!(index.retrieve("rules", 3).is_empty());
    }

    #[test]
    fn test_gather_dedupes_across_queries() {
        let index = GuidelineIndex::from_documents([DATABASE, STYLE]);
        let queries = vec!["database rules".to_string(), "database connections".to_string()];
        let merged = gather(&index, &queries, 2);
        let unique: HashSet<&String> = merged.iter().collect();
        assert_eq!(unique.len(), merged.len());
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = GuidelineIndex::load(&dir.path().join("absent"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_load_reads_markdown_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.md"), STYLE).unwrap();
        fs::write(dir.path().join("a.md"), DATABASE).unwrap();
        fs::write(dir.path().join("notes.txt"), "## Ignored\ntext").unwrap();
        let index = GuidelineIndex::load(dir.path());
        assert_eq!(index.len(), 4);
    }
}
