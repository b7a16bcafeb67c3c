//! JSON-file persistence.
//!
//! The whole database lives in one `deepread.json` under the data directory
//! and every mutation is a read-modify-write of that file. The store assumes a
//! single writer: running two `deepread` processes against the same data
//! directory can lose updates.
use chrono::{DateTime, Utc};
use deepread_game::{
    Argument, Book, Critique, DifficultyId, GamePhase, GameState, GameStore, Inventory,
    MilestoneCard, Proposition, Quest, QuestStatus, Term, TocEntry, VerificationQuestion,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

const DB_FILE: &str = "deepread.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("database {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode database: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown book {0:?}")]
    UnknownBook(String),
}

/// A record owned by one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owned<T> {
    pub book_id: String,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Owned<T> {
    fn new(book_id: &str, record: T) -> Self {
        Self {
            book_id: book_id.to_string(),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub book_id: String,
    pub index: u32,
    pub title: String,
    pub file_name: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub book_id: String,
    pub difficulty: DifficultyId,
    pub state: GameState,
    pub last_updated: DateTime<Utc>,
}

/// Per-book flags and the table of contents captured at import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BookProgress {
    pub book_id: String,
    #[serde(default)]
    pub book_classified: bool,
    #[serde(default)]
    pub unity_statement: Option<String>,
    #[serde(default)]
    pub understanding_verified: bool,
    #[serde(default)]
    pub toc: Vec<TocEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicTag {
    pub topic: String,
    pub book_id: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub chapters: Vec<ChapterRecord>,
    #[serde(default)]
    pub progress: Vec<BookProgress>,
    #[serde(default)]
    pub game_states: Vec<StateRecord>,
    #[serde(default)]
    pub terms: Vec<Owned<Term>>,
    #[serde(default)]
    pub propositions: Vec<Owned<Proposition>>,
    #[serde(default)]
    pub arguments: Vec<Owned<Argument>>,
    #[serde(default)]
    pub critiques: Vec<Owned<Critique>>,
    #[serde(default)]
    pub quests: Vec<Owned<Quest>>,
    #[serde(default)]
    pub milestones: Vec<Owned<MilestoneCard>>,
    #[serde(default)]
    pub verifications: Vec<Owned<VerificationQuestion>>,
    #[serde(default)]
    pub topics: Vec<TopicTag>,
}

impl Database {
    fn progress_mut(&mut self, book_id: &str) -> &mut BookProgress {
        if let Some(idx) = self.progress.iter().position(|p| p.book_id == book_id) {
            return &mut self.progress[idx];
        }
        self.progress.push(BookProgress {
            book_id: book_id.to_string(),
            ..BookProgress::default()
        });
        let last = self.progress.len() - 1;
        &mut self.progress[last]
    }

    fn owned_by<'a, T>(items: &'a [Owned<T>], book_id: &'a str) -> impl Iterator<Item = &'a T> {
        items
            .iter()
            .filter(move |item| item.book_id == book_id)
            .map(|item| &item.record)
    }
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Write {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn book_dir(&self, book_id: &str) -> PathBuf {
        self.root.join(book_id)
    }

    fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    pub fn read(&self) -> Result<Database, StoreError> {
        let path = self.db_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Database::default()),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        if content.trim().is_empty() {
            return Ok(Database::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    fn write(&self, db: &Database) -> Result<(), StoreError> {
        let path = self.db_path();
        let payload = serde_json::to_string_pretty(db)?;
        fs::write(&path, payload).map_err(|source| StoreError::Write { path, source })
    }

    /// Read the database, let `f` change it, and write it back.
    pub fn update<T>(&self, f: impl FnOnce(&mut Database) -> T) -> Result<T, StoreError> {
        let mut db = self.read()?;
        let out = f(&mut db);
        self.write(&db)?;
        Ok(out)
    }

    // Books ----------------------------------------------------------------

    pub fn add_book(
        &self,
        book: Book,
        chapters: Vec<ChapterRecord>,
        toc: Vec<TocEntry>,
    ) -> Result<(), StoreError> {
        self.update(|db| {
            let book_id = book.id.clone();
            db.books.retain(|b| b.id != book_id);
            db.chapters.retain(|c| c.book_id != book_id);
            db.books.push(book);
            db.chapters.extend(chapters);
            db.progress_mut(&book_id).toc = toc;
        })
    }

    pub fn list_books(&self) -> Result<Vec<Book>, StoreError> {
        Ok(self.read()?.books)
    }

    pub fn book(&self, book_id: &str) -> Result<Book, StoreError> {
        self.read()?
            .books
            .into_iter()
            .find(|b| b.id == book_id)
            .ok_or_else(|| StoreError::UnknownBook(book_id.to_string()))
    }

    /// Remove a book and everything recorded against it.
    pub fn delete_book(&self, book_id: &str) -> Result<bool, StoreError> {
        self.update(|db| {
            let before = db.books.len();
            db.books.retain(|b| b.id != book_id);
            db.chapters.retain(|c| c.book_id != book_id);
            db.progress.retain(|p| p.book_id != book_id);
            db.game_states.retain(|s| s.book_id != book_id);
            db.terms.retain(|t| t.book_id != book_id);
            db.propositions.retain(|p| p.book_id != book_id);
            db.arguments.retain(|a| a.book_id != book_id);
            db.critiques.retain(|c| c.book_id != book_id);
            db.quests.retain(|q| q.book_id != book_id);
            db.milestones.retain(|m| m.book_id != book_id);
            db.verifications.retain(|v| v.book_id != book_id);
            db.topics.retain(|t| t.book_id != book_id);
            db.books.len() != before
        })
    }

    pub fn chapters(&self, book_id: &str) -> Result<Vec<ChapterRecord>, StoreError> {
        let mut chapters: Vec<ChapterRecord> = self
            .read()?
            .chapters
            .into_iter()
            .filter(|c| c.book_id == book_id)
            .collect();
        chapters.sort_by_key(|c| c.index);
        Ok(chapters)
    }

    /// Markdown body of a chapter, read from the book directory.
    pub fn chapter_text(&self, book_id: &str, index: u32) -> Result<Option<String>, StoreError> {
        let Some(record) = self
            .chapters(book_id)?
            .into_iter()
            .find(|c| c.index == index)
        else {
            return Ok(None);
        };
        let path = self.book_dir(book_id).join(&record.file_name);
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|source| StoreError::Read { path, source })
    }

    pub fn progress(&self, book_id: &str) -> Result<BookProgress, StoreError> {
        Ok(self
            .read()?
            .progress
            .into_iter()
            .find(|p| p.book_id == book_id)
            .unwrap_or_else(|| BookProgress {
                book_id: book_id.to_string(),
                ..BookProgress::default()
            }))
    }

    pub fn mark_classified(&self, book_id: &str) -> Result<(), StoreError> {
        self.update(|db| db.progress_mut(book_id).book_classified = true)
    }

    pub fn set_unity_statement(&self, book_id: &str, statement: &str) -> Result<(), StoreError> {
        self.update(|db| db.progress_mut(book_id).unity_statement = Some(statement.to_string()))
    }

    pub fn set_understanding_verified(&self, book_id: &str, verified: bool) -> Result<(), StoreError> {
        self.update(|db| db.progress_mut(book_id).understanding_verified = verified)
    }

    // Inventory ------------------------------------------------------------

    pub fn add_term(&self, book_id: &str, term: Term) -> Result<(), StoreError> {
        self.update(|db| db.terms.push(Owned::new(book_id, term)))
    }

    pub fn add_proposition(&self, book_id: &str, proposition: Proposition) -> Result<(), StoreError> {
        self.update(|db| db.propositions.push(Owned::new(book_id, proposition)))
    }

    pub fn add_argument(&self, book_id: &str, argument: Argument) -> Result<(), StoreError> {
        self.update(|db| db.arguments.push(Owned::new(book_id, argument)))
    }

    pub fn add_critique(&self, book_id: &str, critique: Critique) -> Result<(), StoreError> {
        self.update(|db| db.critiques.push(Owned::new(book_id, critique)))
    }

    pub fn critiques(&self, book_id: &str) -> Result<Vec<Critique>, StoreError> {
        let db = self.read()?;
        Ok(Database::owned_by(&db.critiques, book_id).cloned().collect())
    }

    // Quests ---------------------------------------------------------------

    pub fn add_quest(&self, book_id: &str, quest: Quest) -> Result<(), StoreError> {
        self.update(|db| db.quests.push(Owned::new(book_id, quest)))
    }

    pub fn quest(&self, book_id: &str, quest_id: &str) -> Result<Option<Quest>, StoreError> {
        let db = self.read()?;
        Ok(Database::owned_by(&db.quests, book_id)
            .find(|q| q.id == quest_id)
            .cloned())
    }

    pub fn quests(&self, book_id: &str, status: Option<QuestStatus>) -> Result<Vec<Quest>, StoreError> {
        let db = self.read()?;
        Ok(Database::owned_by(&db.quests, book_id)
            .filter(|q| status.is_none_or(|s| q.status == s))
            .cloned()
            .collect())
    }

    pub fn update_quest_status(
        &self,
        book_id: &str,
        quest_id: &str,
        status: QuestStatus,
    ) -> Result<bool, StoreError> {
        self.update(|db| {
            db.quests
                .iter_mut()
                .find(|q| q.book_id == book_id && q.record.id == quest_id)
                .map(|q| q.record.status = status)
                .is_some()
        })
    }

    // Milestones, verification and topics ---------------------------------

    pub fn add_milestone(&self, book_id: &str, card: MilestoneCard) -> Result<(), StoreError> {
        self.update(|db| db.milestones.push(Owned::new(book_id, card)))
    }

    pub fn milestones(&self, book_id: &str) -> Result<Vec<MilestoneCard>, StoreError> {
        let db = self.read()?;
        Ok(Database::owned_by(&db.milestones, book_id).cloned().collect())
    }

    /// Books with a judgment milestone on record.
    pub fn completed_books(&self) -> Result<Vec<String>, StoreError> {
        let db = self.read()?;
        let mut ids: Vec<String> = db
            .milestones
            .iter()
            .filter(|m| m.record.phase >= GamePhase::Judgment)
            .map(|m| m.book_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub fn replace_verification(
        &self,
        book_id: &str,
        questions: Vec<VerificationQuestion>,
    ) -> Result<(), StoreError> {
        self.update(|db| {
            db.verifications.retain(|v| v.book_id != book_id);
            db.verifications
                .extend(questions.into_iter().map(|q| Owned::new(book_id, q)));
        })
    }

    pub fn verification(&self, book_id: &str) -> Result<Vec<VerificationQuestion>, StoreError> {
        let db = self.read()?;
        Ok(Database::owned_by(&db.verifications, book_id)
            .cloned()
            .collect())
    }

    pub fn tag_topic(&self, book_id: &str, topic: &str) -> Result<bool, StoreError> {
        self.update(|db| {
            let exists = db
                .topics
                .iter()
                .any(|t| t.book_id == book_id && t.topic == topic);
            if !exists {
                db.topics.push(TopicTag {
                    topic: topic.to_string(),
                    book_id: book_id.to_string(),
                });
            }
            !exists
        })
    }

    /// Topic label to tagged book ids.
    pub fn topic_books(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        let mut topics: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for tag in self.read()?.topics {
            topics.entry(tag.topic).or_default().push(tag.book_id);
        }
        Ok(topics)
    }
}

impl GameStore for JsonStore {
    type Error = StoreError;

    fn load_state(
        &self,
        book_id: &str,
        difficulty: DifficultyId,
    ) -> Result<Option<GameState>, Self::Error> {
        Ok(self
            .read()?
            .game_states
            .into_iter()
            .find(|s| s.book_id == book_id && s.difficulty == difficulty)
            .map(|record| record.state))
    }

    fn save_state(
        &self,
        book_id: &str,
        difficulty: DifficultyId,
        state: &GameState,
    ) -> Result<(), Self::Error> {
        let record = StateRecord {
            book_id: book_id.to_string(),
            difficulty,
            state: state.clone(),
            last_updated: Utc::now(),
        };
        self.update(|db| {
            match db
                .game_states
                .iter_mut()
                .find(|s| s.book_id == book_id && s.difficulty == difficulty)
            {
                Some(existing) => *existing = record,
                None => db.game_states.push(record),
            }
        })
    }

    fn delete_state(&self, book_id: &str, difficulty: DifficultyId) -> Result<(), Self::Error> {
        self.update(|db| {
            db.game_states
                .retain(|s| !(s.book_id == book_id && s.difficulty == difficulty));
        })
    }

    fn load_inventory(&self, book_id: &str) -> Result<Inventory, Self::Error> {
        let db = self.read()?;
        let progress = db.progress.iter().find(|p| p.book_id == book_id);
        Ok(Inventory {
            book_classified: progress.is_some_and(|p| p.book_classified),
            unity_statement: progress.is_some_and(|p| p.unity_statement.is_some()),
            terms: Database::owned_by(&db.terms, book_id).cloned().collect(),
            propositions: Database::owned_by(&db.propositions, book_id)
                .cloned()
                .collect(),
            arguments: Database::owned_by(&db.arguments, book_id).cloned().collect(),
        })
    }
}
