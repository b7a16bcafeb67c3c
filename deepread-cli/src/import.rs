//! Markdown book import.
//!
//! A book file is Markdown with optional `---` front matter (`title`,
//! `author`, `description`, `language`). Each `# ` heading opens a chapter and
//! each `## ` heading inside it becomes a table-of-contents child. Text before
//! the first chapter heading becomes an introduction chapter.
use chrono::{DateTime, Utc};
use deepread_game::{Book, Chapter, TocEntry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::store::ChapterRecord;

const BOOK_ID_HEX_CHARS: usize = 12;
const FRONT_MATTER_FENCE: &str = "---";
const INTRO_TITLE: &str = "Introduction";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("front matter is missing its closing `---`")]
    UnterminatedFrontMatter,
    #[error("front matter is not valid YAML: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
    #[error("book has no readable text")]
    Empty,
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parsed book ready to be stored and indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedBook {
    pub book: Book,
    pub chapters: Vec<Chapter>,
    pub toc: Vec<TocEntry>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct FrontMatter {
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
    #[serde(alias = "lang")]
    language: Option<String>,
}

/// Header written at the top of each stored chapter file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterHeader {
    pub title: String,
    pub index: u32,
    pub word_count: usize,
}

/// Stable id derived from the book's bytes.
#[must_use]
pub fn book_id(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = String::with_capacity(BOOK_ID_HEX_CHARS);
    for byte in digest.iter().take(BOOK_ID_HEX_CHARS / 2) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Split a leading front-matter block from the body.
///
/// # Errors
///
/// Returns [`ImportError::UnterminatedFrontMatter`] when the opening fence is
/// never closed.
pub fn split_front_matter(content: &str) -> Result<(Option<&str>, &str), ImportError> {
    let content = content.trim_start_matches('\u{feff}');
    let Some(rest) = content
        .strip_prefix(FRONT_MATTER_FENCE)
        .and_then(|rest| rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")))
    else {
        return Ok((None, content));
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(header), body));
        }
        offset += line.len();
    }
    Err(ImportError::UnterminatedFrontMatter)
}

fn parse_front_matter(header: &str) -> Result<FrontMatter, ImportError> {
    if header.trim().is_empty() {
        return Ok(FrontMatter::default());
    }
    let meta: FrontMatter = serde_yaml::from_str(header)?;
    let keep = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Ok(FrontMatter {
        title: keep(meta.title),
        author: keep(meta.author),
        description: keep(meta.description),
        language: keep(meta.language),
    })
}

struct Draft {
    title: String,
    lines: Vec<String>,
    sections: Vec<TocEntry>,
}

impl Draft {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
            sections: Vec::new(),
        }
    }

    fn body(&self) -> String {
        self.lines.join("\n").trim().to_string()
    }
}

/// Parse a Markdown book. `fallback_title` is used when front matter has none.
///
/// # Errors
///
/// Returns an error for unterminated or malformed front matter, or a book
/// without text.
pub fn parse_markdown(
    content: &str,
    fallback_title: &str,
    now: DateTime<Utc>,
) -> Result<ImportedBook, ImportError> {
    let (header, body) = split_front_matter(content)?;
    let meta = header
        .map(parse_front_matter)
        .transpose()?
        .unwrap_or_default();

    let mut drafts = vec![Draft::new(INTRO_TITLE)];
    for line in body.lines() {
        if let Some(title) = line.strip_prefix("# ") {
            drafts.push(Draft::new(title.trim()));
            continue;
        }
        let Some(current) = drafts.last_mut() else {
            continue;
        };
        if let Some(section) = line.strip_prefix("## ") {
            current.sections.push(TocEntry::leaf(section.trim()));
        }
        current.lines.push(line.to_string());
    }

    let mut chapters = Vec::new();
    let mut toc = Vec::new();
    for draft in drafts {
        let text = draft.body();
        if text.is_empty() {
            if draft.title != INTRO_TITLE {
                log::warn!("skipping empty chapter {:?}", draft.title);
            }
            continue;
        }
        let index = u32::try_from(chapters.len() + 1).unwrap_or(u32::MAX);
        toc.push(TocEntry {
            title: draft.title.clone(),
            children: draft.sections,
        });
        chapters.push(Chapter::new(index, draft.title, text));
    }
    if chapters.is_empty() {
        return Err(ImportError::Empty);
    }

    let book = Book {
        id: book_id(content),
        title: meta.title.unwrap_or_else(|| fallback_title.to_string()),
        author: meta.author.unwrap_or_default(),
        language: meta.language.unwrap_or_else(|| "en".to_string()),
        description: meta.description,
        chapter_count: u32::try_from(chapters.len()).unwrap_or(u32::MAX),
        imported_at: now,
    };
    log::info!(
        "parsed {:?} as {} with {} chapter(s)",
        book.title,
        book.id,
        chapters.len()
    );
    Ok(ImportedBook {
        book,
        chapters,
        toc,
    })
}

#[must_use]
pub fn chapter_file_name(index: u32) -> String {
    format!("chapter_{index:03}.md")
}

/// Write one Markdown file per chapter under `dir`.
///
/// # Errors
///
/// Returns an error if the directory, a header or a chapter file cannot be
/// written.
pub fn write_chapter_files(
    dir: &Path,
    book_id: &str,
    chapters: &[Chapter],
) -> Result<Vec<ChapterRecord>, ImportError> {
    fs::create_dir_all(dir).map_err(|source| ImportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut records = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        let file_name = chapter_file_name(chapter.index);
        let path = dir.join(&file_name);
        let header = serde_yaml::to_string(&ChapterHeader {
            title: chapter.title.clone(),
            index: chapter.index,
            word_count: chapter.word_count,
        })?;
        let file = format!(
            "{FRONT_MATTER_FENCE}\n{header}{FRONT_MATTER_FENCE}\n\n{}\n",
            chapter.content
        );
        fs::write(&path, file).map_err(|source| ImportError::Write { path, source })?;
        records.push(ChapterRecord {
            book_id: book_id.to_string(),
            index: chapter.index,
            title: chapter.title.clone(),
            file_name,
            word_count: chapter.word_count,
        });
    }
    Ok(records)
}

/// Body of a stored chapter file without its front matter.
#[must_use]
pub fn chapter_body(file: &str) -> &str {
    split_front_matter(file).map_or(file, |(_, body)| body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK: &str = "---\ntitle: \"How to Read a Book\"\nauthor: Mortimer Adler\ndescription: A guide to intelligent reading\n---\n\nA short preface.\n\n# The Activity of Reading\n\nReading is active.\n\n## Levels\n\nThere are four levels.\n\n# Empty\n\n# Inspectional Reading\n\nSkim first.\n";

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn ids_are_stable_hex() {
        let id = book_id("same text");
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, book_id("same text"));
        assert_ne!(id, book_id("other text"));
    }

    #[test]
    fn front_matter_fills_metadata() {
        let imported = parse_markdown(BOOK, "fallback", now()).unwrap();
        assert_eq!(imported.book.title, "How to Read a Book");
        assert_eq!(imported.book.author, "Mortimer Adler");
        assert_eq!(
            imported.book.description.as_deref(),
            Some("A guide to intelligent reading")
        );
        assert_eq!(imported.book.language, "en");
        assert_eq!(imported.book.id, book_id(BOOK));
    }

    #[test]
    fn chapters_and_toc_follow_headings() {
        let imported = parse_markdown(BOOK, "fallback", now()).unwrap();
        let titles: Vec<&str> = imported.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Introduction", "The Activity of Reading", "Inspectional Reading"]
        );
        let indexes: Vec<u32> = imported.chapters.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
        assert_eq!(imported.book.chapter_count, 3);
        assert_eq!(imported.toc[1].children, vec![TocEntry::leaf("Levels")]);
        assert!(imported.chapters[1].content.contains("## Levels"));
    }

    #[test]
    fn missing_front_matter_uses_fallback_title() {
        let imported = parse_markdown("# One\n\nWords here.", "notes", now()).unwrap();
        assert_eq!(imported.book.title, "notes");
        assert_eq!(imported.chapters.len(), 1);
        assert_eq!(imported.chapters[0].title, "One");
    }

    #[test]
    fn unterminated_front_matter_is_rejected() {
        assert!(matches!(
            parse_markdown("---\ntitle: x\n# One\n", "x", now()),
            Err(ImportError::UnterminatedFrontMatter)
        ));
    }

    #[test]
    fn blank_book_is_rejected() {
        assert!(matches!(
            parse_markdown("---\ntitle: x\n---\n\n# Empty\n", "x", now()),
            Err(ImportError::Empty)
        ));
    }

    #[test]
    fn chapter_files_round_trip_their_body() {
        let dir = std::env::temp_dir().join(format!(
            "deepread-import-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let chapters = vec![Chapter::new(7, "Seventh \"Heaven\"", "Body text.")];
        let records = write_chapter_files(&dir, "b1", &chapters).unwrap();
        assert_eq!(records[0].file_name, "chapter_007.md");
        let raw = fs::read_to_string(dir.join("chapter_007.md")).unwrap();
        let (header, _) = split_front_matter(&raw).unwrap();
        let header: ChapterHeader = serde_yaml::from_str(header.unwrap()).unwrap();
        assert_eq!(header.title, "Seventh \"Heaven\"");
        assert_eq!(header.index, 7);
        assert_eq!(chapter_body(&raw), "Body text.");
    }

    #[test]
    fn folded_description_is_unfolded() {
        let book = "---\ntitle: Deep Work\ndescription: >\n  Rules for focused success\n  in a distracted world\nlang: de\n---\n\n# One\n\nWords here.\n";
        let imported = parse_markdown(book, "x", now()).unwrap();
        assert_eq!(imported.book.title, "Deep Work");
        assert_eq!(
            imported.book.description.as_deref(),
            Some("Rules for focused success in a distracted world")
        );
        assert_eq!(imported.book.language, "de");
    }

    #[test]
    fn blank_and_unknown_keys_are_ignored() {
        let book = "---\ntitle: \"  \"\nauthor:\nisbn: 12345\n---\n\n# One\n\nWords here.\n";
        let imported = parse_markdown(book, "fallback", now()).unwrap();
        assert_eq!(imported.book.title, "fallback");
        assert_eq!(imported.book.author, "");
    }

    #[test]
    fn malformed_front_matter_is_rejected() {
        assert!(matches!(
            parse_markdown("---\ntitle: [unclosed\n---\n\n# One\n\nText.\n", "x", now()),
            Err(ImportError::FrontMatter(_))
        ));
    }
}
