//! Deepread Game Engine
//!
//! Platform-agnostic progression, quest and validation logic for the Deepread
//! reading companion. Persistence, embeddings and passage retrieval are
//! supplied by the host through the traits declared here.

pub mod constants;
pub mod data;
pub mod debug;
pub mod difficulty;
pub mod numbers;
pub mod quest;
pub mod session;
pub mod state;
pub mod summary;
pub mod syntopical;
pub mod validation;

// Re-export commonly used types
pub use data::{
    Argument, ArgumentStrength, Book, BookRef, Chapter, Critique, CritiqueKind, Proposition,
    RetrievedPassage, Term, TocEntry,
};
pub use debug::{DebugCommand, DebugEffect, DebugError, MENU_COMMANDS, SetField};
pub use difficulty::{AdvancedModeConfig, DifficultyConfig, DifficultyId, ProgressThresholds};
pub use quest::{Quest, QuestKind, QuestStatus, QuestTier, generate_quest};
pub use session::{Advance, QuestOutcome, ReadingSession, Settlement};
pub use state::{
    ActionKind, GamePhase, GameState, Inventory, LEVEL_THRESHOLDS, LevelInfo, LevelThreshold,
    LevelUp, ManaChange, ManaEvent, PhaseProgress, VisionFragment, XpAward, level_for_xp,
    level_progress,
};
pub use summary::{BookSummary, MilestoneCard, PhaseStats};
pub use syntopical::{SyntopicalQuest, UnlockCheck, check_unlock, generate_syntopical_quest};
pub use validation::{
    AnswerValidator, Similarity, ValidationError, ValidationResult, Verdict,
    VerificationQuestion, VerificationReport, cosine_similarity, generate_hints,
};

use async_trait::async_trait;

/// Trait for abstracting game-state persistence
/// Host-specific implementations should provide this
pub trait GameStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the state for a book at a difficulty
    ///
    /// # Errors
    ///
    /// Returns an error if the stored state cannot be read.
    fn load_state(
        &self,
        book_id: &str,
        difficulty: DifficultyId,
    ) -> Result<Option<GameState>, Self::Error>;

    /// Save the state for a book at a difficulty
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn save_state(
        &self,
        book_id: &str,
        difficulty: DifficultyId,
        state: &GameState,
    ) -> Result<(), Self::Error>;

    /// Delete the state for a book at a difficulty
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be removed.
    fn delete_state(&self, book_id: &str, difficulty: DifficultyId) -> Result<(), Self::Error>;

    /// Load the reader's collected artifacts for a book
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read.
    fn load_inventory(&self, book_id: &str) -> Result<Inventory, Self::Error>;
}

/// Text embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Embed `text` into a fixed-dimension vector
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding backend fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, Self::Error>;
}

/// Ranked passage search over a book's index
#[async_trait]
pub trait PassageRetriever: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return up to `k` passages ordered by descending score
    ///
    /// # Errors
    ///
    /// Returns an error if the book's index cannot be searched.
    async fn search_top_k(
        &self,
        book_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, Self::Error>;
}

/// Main engine binding sessions to their store
pub struct ReaderEngine<S>
where
    S: GameStore,
{
    store: S,
}

impl<S> ReaderEngine<S>
where
    S: GameStore,
{
    /// Create a new engine over the provided store
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Resume the stored session for a book, or start a fresh one
    ///
    /// # Errors
    ///
    /// Returns an error if the stored state cannot be read.
    pub fn start_session(
        &self,
        book_id: &str,
        difficulty: DifficultyId,
        seed: u64,
    ) -> Result<ReadingSession, S::Error> {
        let session = match self.store.load_state(book_id, difficulty)? {
            Some(state) => ReadingSession::from_state(book_id, difficulty, state, seed),
            None => {
                log::debug!("new session book={book_id} difficulty={difficulty}");
                ReadingSession::new(book_id, difficulty, seed)
            }
        };
        Ok(session)
    }

    /// Persist a session's state
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    pub fn save_session(&self, session: &ReadingSession) -> Result<(), S::Error> {
        self.store
            .save_state(session.book_id(), session.difficulty(), session.state())
    }

    /// Drop the stored state so the next session starts over
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be removed.
    pub fn reset(&self, book_id: &str, difficulty: DifficultyId) -> Result<(), S::Error> {
        self.store.delete_state(book_id, difficulty)
    }

    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read.
    pub fn inventory(&self, book_id: &str) -> Result<Inventory, S::Error> {
        self.store.load_inventory(book_id)
    }

    /// Evaluate the phase gate against the stored inventory
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read.
    pub fn check_progression(&self, session: &ReadingSession) -> Result<PhaseProgress, S::Error> {
        let inventory = self.store.load_inventory(session.book_id())?;
        Ok(session.check_progression(&inventory))
    }

    /// Advance the session if the gate allows and persist the move
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be read or the state saved.
    pub fn try_advance(&self, session: &mut ReadingSession) -> Result<Advance, anyhow::Error>
    where
        S::Error: Into<anyhow::Error>,
    {
        let inventory = self
            .store
            .load_inventory(session.book_id())
            .map_err(Into::into)?;
        let outcome = session.try_advance(&inventory);
        if let Advance::Moved { from, to } = outcome {
            log::info!("book {} advanced {from} -> {to}", session.book_id());
            self.save_session(session).map_err(Into::into)?;
        }
        Ok(outcome)
    }
}
