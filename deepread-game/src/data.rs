//! Shapes exchanged with the book pipeline, the retrieval index and the store.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Book metadata as produced by the import pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub chapter_count: u32,
    pub imported_at: DateTime<Utc>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Book {
    /// Title plus description, the ground truth for classification checks.
    #[must_use]
    pub fn reference_text(&self) -> String {
        format!("{} {}", self.title, self.description.as_deref().unwrap_or_default())
    }
}

/// Lightweight book handle used for cross-book features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRef {
    pub id: String,
    pub title: String,
}

impl From<&Book> for BookRef {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: u32,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub word_count: usize,
}

impl Chapter {
    #[must_use]
    pub fn new(index: u32, title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let word_count = content.split_whitespace().count();
        Self {
            index,
            title: title.into(),
            content,
            word_count,
        }
    }
}

/// Table-of-contents node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    #[serde(default)]
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    #[must_use]
    pub fn leaf(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            children: Vec::new(),
        }
    }
}

/// A ranked chunk returned by the retrieval collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub chapter_index: u32,
    #[serde(default)]
    pub chunk_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: String,
    pub word: String,
    pub definition: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub chapter_index: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposition {
    pub id: String,
    pub statement: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub chapter_index: u32,
    #[serde(default)]
    pub related_term_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentStrength {
    #[default]
    Unverified,
    Supported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub id: String,
    pub premises: Vec<String>,
    pub conclusion: String,
    #[serde(default)]
    pub chapter_index: u32,
    #[serde(default)]
    pub strength: ArgumentStrength,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueKind {
    Agreement,
    Disagreement,
    SuspendJudgment,
}

impl CritiqueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agreement => "agreement",
            Self::Disagreement => "disagreement",
            Self::SuspendJudgment => "suspend_judgment",
        }
    }
}

impl fmt::Display for CritiqueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub id: String,
    pub kind: CritiqueKind,
    pub content: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub chapter_index: u32,
    #[serde(default)]
    pub related_argument_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}
