//! Per-book vector index and the registry that hands out loaded indexes.
//!
//! Each book's index is a JSON file at `<data>/<book>/index.json` holding one
//! embedded entry per chunk. Search is a linear cosine scan; vectors are
//! unit-length so the score is a dot product.
use async_trait::async_trait;
use deepread_game::{PassageRetriever, RetrievedPassage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::chunker::Chunk;
use crate::embedder::HashedEmbedder;
use crate::import::chapter_file_name;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index for book {0:?}; import it first")]
    Missing(String),
    #[error("failed to read index {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write index {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("index {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("index dimension {found} does not match embedder dimension {expected}")]
    Dimension { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub chapter_index: u32,
    pub chunk_index: u32,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookIndex {
    pub dimension: usize,
    pub entries: Vec<IndexEntry>,
}

impl BookIndex {
    #[must_use]
    pub fn build(embedder: &HashedEmbedder, chunks: &[Chunk]) -> Self {
        let entries = chunks
            .iter()
            .map(|chunk| IndexEntry {
                text: chunk.text.clone(),
                chapter_index: chunk.chapter_index,
                chunk_index: chunk.chunk_index,
                vector: embedder.embed_sync(&chunk.text),
            })
            .collect();
        Self {
            dimension: embedder.dimension(),
            entries,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `k` entries by score, best first.
    #[must_use]
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<RetrievedPassage> {
        let mut scored: Vec<RetrievedPassage> = self
            .entries
            .iter()
            .filter(|entry| entry.vector.len() == vector.len())
            .map(|entry| RetrievedPassage {
                text: entry.text.clone(),
                score: entry.vector.iter().zip(vector).map(|(a, b)| a * b).sum(),
                chapter_index: entry.chapter_index,
                chunk_index: entry.chunk_index,
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }

    fn chunk_text(&self, chapter_index: u32, chunk_index: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.chapter_index == chapter_index && e.chunk_index == chunk_index)
            .map(|e| e.text.as_str())
    }

    /// Text of a hit joined with the chunks on either side of it.
    #[must_use]
    pub fn expand(&self, passage: &RetrievedPassage) -> String {
        let chapter = passage.chapter_index;
        let mut parts = Vec::with_capacity(3);
        if let Some(prev) = passage
            .chunk_index
            .checked_sub(1)
            .and_then(|idx| self.chunk_text(chapter, idx))
        {
            parts.push(prev);
        }
        parts.push(passage.text.as_str());
        if let Some(next) = self.chunk_text(chapter, passage.chunk_index + 1) {
            parts.push(next);
        }
        parts.join("\n\n")
    }

    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let content = fs::read_to_string(path).map_err(|source| IndexError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| IndexError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let write_err = |source| IndexError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let payload = serde_json::to_string(self).map_err(|source| IndexError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, payload).map_err(write_err)
    }
}

/// A hit widened with its neighbours, plus where to read the full chapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedPassage {
    #[serde(flatten)]
    pub passage: RetrievedPassage,
    pub chapter_file: PathBuf,
    pub line: usize,
}

/// 1-based line of the chapter file where `chunk` starts, or 1 if not found.
fn find_line(file: &Path, chunk: &str) -> usize {
    let Some(first) = chunk.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return 1;
    };
    fs::read_to_string(file)
        .ok()
        .and_then(|content| content.lines().position(|line| line.trim() == first))
        .map_or(1, |idx| idx + 1)
}

/// Loaded indexes keyed by book id.
///
/// Handles are loaded lazily from disk and shared as `Arc`s; `evict` drops a
/// book's handle so the next lookup reloads it.
pub struct IndexRegistry {
    root: PathBuf,
    embedder: HashedEmbedder,
    handles: RwLock<HashMap<String, Arc<BookIndex>>>,
}

impl IndexRegistry {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, embedder: HashedEmbedder) -> Self {
        Self {
            root: root.into(),
            embedder,
            handles: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn embedder(&self) -> &HashedEmbedder {
        &self.embedder
    }

    #[must_use]
    pub fn index_path(&self, book_id: &str) -> PathBuf {
        self.root.join(book_id).join(INDEX_FILE)
    }

    /// Loaded index for `book_id`, reading it from disk on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the book has no index or it cannot be loaded.
    pub fn handle(&self, book_id: &str) -> Result<Arc<BookIndex>, IndexError> {
        if let Some(handle) = self
            .handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(book_id)
        {
            return Ok(Arc::clone(handle));
        }
        let path = self.index_path(book_id);
        if !path.exists() {
            return Err(IndexError::Missing(book_id.to_string()));
        }
        let index = BookIndex::load(&path)?;
        if index.dimension != self.embedder.dimension() {
            return Err(IndexError::Dimension {
                expected: self.embedder.dimension(),
                found: index.dimension,
            });
        }
        log::debug!("loaded index for {book_id} ({} entries)", index.len());
        let handle = Arc::new(index);
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(book_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Build, save and register an index for freshly imported chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the index file cannot be written.
    pub fn insert(&self, book_id: &str, chunks: &[Chunk]) -> Result<Arc<BookIndex>, IndexError> {
        let index = BookIndex::build(&self.embedder, chunks);
        index.save(&self.index_path(book_id))?;
        log::info!("indexed {} chunk(s) for {book_id}", index.len());
        let handle = Arc::new(index);
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(book_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn evict(&self, book_id: &str) -> bool {
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(book_id)
            .is_some()
    }

    /// # Errors
    ///
    /// Returns an error if the book's index cannot be loaded.
    pub fn search(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, IndexError> {
        let vector = self.embedder.embed_sync(query);
        Ok(self.handle(book_id)?.query(&vector, k))
    }

    /// Top `k` hits, each widened with its neighbouring chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the book's index cannot be loaded.
    pub fn search_expanded(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<ExpandedPassage>, IndexError> {
        let vector = self.embedder.embed_sync(query);
        let index = self.handle(book_id)?;
        Ok(index
            .query(&vector, k)
            .into_iter()
            .map(|hit| {
                let chapter_file = self
                    .root
                    .join(book_id)
                    .join(chapter_file_name(hit.chapter_index));
                let line = find_line(&chapter_file, &hit.text);
                let text = index.expand(&hit);
                ExpandedPassage {
                    passage: RetrievedPassage { text, ..hit },
                    chapter_file,
                    line,
                }
            })
            .collect())
    }
}

#[async_trait]
impl PassageRetriever for IndexRegistry {
    type Error = IndexError;

    async fn search_top_k(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, Self::Error> {
        self.search(book_id, query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "deepread-index-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn chunk(chapter: u32, idx: u32, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            chapter_index: chapter,
            chunk_index: idx,
        }
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            chunk(1, 0, "Inspectional reading is systematic skimming."),
            chunk(1, 1, "Analytical reading chews and digests a book."),
            chunk(1, 2, "Syntopical reading compares many books on one subject."),
            chunk(2, 0, "Every author has a vocabulary of terms."),
        ]
    }

    #[test]
    fn query_ranks_matching_chunk_first() {
        let index = BookIndex::build(&HashedEmbedder::default(), &chunks());
        let vector = HashedEmbedder::default().embed_sync("analytical reading digests a book");
        let hits = index.query(&vector, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!((hits[0].chapter_index, hits[0].chunk_index), (1, 1));
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn expansion_stays_inside_the_chapter() {
        let index = BookIndex::build(&HashedEmbedder::default(), &chunks());
        let middle = RetrievedPassage {
            text: chunks()[1].text.clone(),
            score: 1.0,
            chapter_index: 1,
            chunk_index: 1,
        };
        let expanded = index.expand(&middle);
        assert!(expanded.starts_with("Inspectional"));
        assert!(expanded.ends_with("one subject."));

        let lone = RetrievedPassage {
            chapter_index: 2,
            chunk_index: 0,
            ..middle
        };
        assert_eq!(index.expand(&lone), lone.text);
    }

    #[test]
    fn registry_loads_saved_indexes_lazily() {
        let root = temp_root("registry");
        let writer = IndexRegistry::new(&root, HashedEmbedder::default());
        writer.insert("b1", &chunks()).unwrap();

        let reader = IndexRegistry::new(&root, HashedEmbedder::default());
        let first = reader.handle("b1").unwrap();
        let second = reader.handle("b1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 4);
        assert!(reader.evict("b1"));
        assert!(!reader.evict("b1"));
        assert!(matches!(reader.handle("nope"), Err(IndexError::Missing(_))));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let root = temp_root("dimension");
        IndexRegistry::new(&root, HashedEmbedder::new(16))
            .insert("b1", &chunks())
            .unwrap();
        let reader = IndexRegistry::new(&root, HashedEmbedder::new(32));
        assert!(matches!(
            reader.handle("b1"),
            Err(IndexError::Dimension {
                expected: 32,
                found: 16
            })
        ));
    }

    #[tokio::test]
    async fn retriever_searches_through_the_registry() {
        let root = temp_root("retriever");
        let registry = IndexRegistry::new(&root, HashedEmbedder::default());
        registry.insert("b1", &chunks()).unwrap();
        let hits = registry
            .search_top_k("b1", "vocabulary of terms", 1)
            .await
            .unwrap();
        assert_eq!(hits[0].chapter_index, 2);

        let expanded = registry
            .search_expanded("b1", "syntopical many books", 1)
            .unwrap();
        assert_eq!(expanded[0].passage.chunk_index, 2);
        assert!(expanded[0].passage.text.starts_with("Analytical"));
        assert_eq!(expanded[0].line, 1);
        assert!(expanded[0].chapter_file.ends_with("chapter_001.md"));
    }
}
