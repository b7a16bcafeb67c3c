//! Paragraph-aware chunking of chapter Markdown for the vector index.
use deepread_game::Chapter;
use regex::Regex;
use std::sync::OnceLock;

pub const MAX_CHUNK_CHARS: usize = 500;
pub const MIN_CHUNK_CHARS: usize = 50;

const SENTENCE_ENDS: &[char] = &['.', '!', '?', '。', '！', '？', '\n'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub chapter_index: u32,
    pub chunk_index: u32,
}

fn block_break() -> Option<&'static Regex> {
    static BREAK: OnceLock<Option<Regex>> = OnceLock::new();
    BREAK.get_or_init(|| Regex::new(r"\n{2,}").ok()).as_ref()
}

fn heading() -> Option<&'static Regex> {
    static HEADING: OnceLock<Option<Regex>> = OnceLock::new();
    HEADING.get_or_init(|| Regex::new(r"^#{1,6}\s").ok()).as_ref()
}

fn is_heading(block: &str) -> bool {
    heading().map_or_else(|| block.starts_with('#'), |re| re.is_match(block))
}

/// Split after each sentence terminator, dropping the whitespace that follows.
fn sentences(block: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = block.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if !SENTENCE_ENDS.contains(&ch) {
            continue;
        }
        let end = idx + ch.len_utf8();
        out.push(&block[start..end]);
        start = end;
        while let Some((next_idx, next)) = chars.peek().copied() {
            if !next.is_whitespace() {
                break;
            }
            start = next_idx + next.len_utf8();
            chars.next();
        }
    }
    if start < block.len() {
        out.push(&block[start..]);
    }
    out
}

/// Split chapter Markdown into chunks of at most `max` characters.
///
/// Paragraphs are packed together until the next one would overflow; a
/// heading always starts a new chunk. Oversized paragraphs are packed
/// sentence by sentence. Pieces shorter than `min` characters are dropped.
#[must_use]
pub fn split_into_chunks(markdown: &str, max: usize, min: usize) -> Vec<String> {
    if markdown.trim().is_empty() {
        return Vec::new();
    }
    let blocks: Vec<&str> = match block_break() {
        Some(re) => re.split(markdown).collect(),
        None => markdown.split("\n\n").collect(),
    };

    let mut chunks = Vec::new();
    let mut current = String::new();
    let flush = |text: &str, chunks: &mut Vec<String>| {
        if text.chars().count() >= min {
            chunks.push(text.trim().to_string());
        }
    };

    for block in blocks {
        let trimmed = block.trim();
        if trimmed.is_empty() {
            continue;
        }
        let len = trimmed.chars().count();
        if !current.is_empty() && (current.chars().count() + len > max || is_heading(trimmed)) {
            flush(&current, &mut chunks);
            current.clear();
        }

        if len > max {
            let mut packed = String::new();
            for sentence in sentences(trimmed) {
                let packed_len = packed.chars().count();
                if packed_len + sentence.chars().count() > max && packed_len >= min {
                    flush(&packed, &mut chunks);
                    packed.clear();
                }
                if !packed.is_empty() {
                    packed.push(' ');
                }
                packed.push_str(sentence);
            }
            flush(&packed, &mut chunks);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }
    flush(&current, &mut chunks);
    chunks
}

/// Chunk every chapter with the default sizes, numbering chunks per chapter.
#[must_use]
pub fn chunk_chapters(chapters: &[Chapter]) -> Vec<Chunk> {
    let mut out = Vec::new();
    for chapter in chapters {
        let pieces = split_into_chunks(&chapter.content, MAX_CHUNK_CHARS, MIN_CHUNK_CHARS);
        if pieces.is_empty() {
            log::warn!(
                "chapter {} ({:?}) produced no chunks",
                chapter.index,
                chapter.title
            );
        }
        out.extend(pieces.into_iter().zip(0u32..).map(|(text, chunk_index)| Chunk {
            text,
            chapter_index: chapter.index,
            chunk_index,
        }));
    }
    out
}
