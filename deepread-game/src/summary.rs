//! Phase milestone cards and the end-of-book summary
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{Book, BookRef};
use crate::difficulty::DifficultyId;
use crate::state::{GamePhase, GameState, Inventory};

/// Artifact counts gathered while a phase was active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PhaseStats {
    pub terms: usize,
    pub propositions: usize,
    pub arguments: usize,
    pub critiques: usize,
    pub quests_completed: usize,
}

impl PhaseStats {
    /// Counts taken from a book inventory plus the critique and quest tallies.
    #[must_use]
    pub fn from_inventory(inventory: &Inventory, critiques: usize, quests_completed: usize) -> Self {
        Self {
            terms: inventory.terms.len(),
            propositions: inventory.propositions.len(),
            arguments: inventory.arguments.len(),
            critiques,
            quests_completed,
        }
    }
}

/// Card issued when a reader clears a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneCard {
    pub phase: GamePhase,
    pub title: String,
    pub headline: String,
    pub difficulty: DifficultyId,
    pub stats: PhaseStats,
    pub earned_at: DateTime<Utc>,
}

impl MilestoneCard {
    #[must_use]
    pub fn for_phase(
        phase: GamePhase,
        difficulty: DifficultyId,
        stats: PhaseStats,
        now: DateTime<Utc>,
    ) -> Self {
        let headline = match phase {
            GamePhase::Scouting => "The book is classified and its unity stated.".to_string(),
            GamePhase::Hunting => format!("{} terms logged and defined.", stats.terms),
            GamePhase::Alchemy => format!(
                "{} propositions distilled into {} argument(s).",
                stats.propositions, stats.arguments
            ),
            GamePhase::Judgment => format!("{} critique(s) delivered.", stats.critiques),
            GamePhase::Syntopical => "Several books brought into conversation.".to_string(),
        };
        Self {
            phase,
            title: format!("{} Complete", phase.label()),
            headline,
            difficulty,
            stats,
            earned_at: now,
        }
    }
}

/// Final record for a finished (or abandoned) book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub book: BookRef,
    pub difficulty: DifficultyId,
    pub level: u32,
    pub level_title: String,
    pub xp_total: u32,
    pub final_phase: GamePhase,
    pub completed: bool,
    pub visions: usize,
    pub totals: PhaseStats,
    pub milestones: Vec<MilestoneCard>,
    pub generated_at: DateTime<Utc>,
}

impl BookSummary {
    #[must_use]
    pub fn new(
        book: &Book,
        state: &GameState,
        milestones: Vec<MilestoneCard>,
        difficulty: DifficultyId,
        now: DateTime<Utc>,
    ) -> Self {
        let totals = milestones
            .iter()
            .fold(PhaseStats::default(), |acc, card| PhaseStats {
                terms: acc.terms.max(card.stats.terms),
                propositions: acc.propositions.max(card.stats.propositions),
                arguments: acc.arguments.max(card.stats.arguments),
                critiques: acc.critiques.max(card.stats.critiques),
                quests_completed: acc.quests_completed + card.stats.quests_completed,
            });
        let level = state.level_info();
        Self {
            book: BookRef::from(book),
            difficulty,
            level: level.level,
            level_title: level.title.to_string(),
            xp_total: state.xp_total,
            final_phase: state.current_phase,
            completed: milestones
                .iter()
                .any(|card| card.phase >= GamePhase::Judgment),
            visions: state.visions.len(),
            totals,
            milestones,
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Book {
        Book {
            id: "b".into(),
            title: "How to Read a Book".into(),
            author: "Adler".into(),
            language: "en".into(),
            description: None,
            chapter_count: 3,
            imported_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn stats(terms: usize, quests: usize) -> PhaseStats {
        PhaseStats {
            terms,
            quests_completed: quests,
            ..PhaseStats::default()
        }
    }

    #[test]
    fn milestone_titles_follow_phase() {
        let card = MilestoneCard::for_phase(
            GamePhase::Hunting,
            DifficultyId::Master,
            stats(5, 2),
            DateTime::<Utc>::UNIX_EPOCH,
        );
        assert_eq!(card.title, "Hunting Phase Complete");
        assert!(card.headline.starts_with("5 terms"));
    }

    #[test]
    fn summary_totals_counts_and_quests() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let cards = vec![
            MilestoneCard::for_phase(GamePhase::Scouting, DifficultyId::Master, stats(0, 1), now),
            MilestoneCard::for_phase(GamePhase::Hunting, DifficultyId::Master, stats(5, 3), now),
        ];
        let state = GameState {
            xp_total: 640,
            current_phase: GamePhase::Alchemy,
            ..GameState::default()
        };
        let summary = BookSummary::new(&book(), &state, cards, DifficultyId::Master, now);
        assert_eq!(summary.totals.terms, 5);
        assert_eq!(summary.totals.quests_completed, 4);
        assert_eq!(summary.level, 3);
        assert_eq!(summary.level_title, "Scholar");
        assert!(!summary.completed);
        assert_eq!(summary.book.title, "How to Read a Book");
    }

    #[test]
    fn judgment_milestone_marks_completion() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let cards = vec![MilestoneCard::for_phase(
            GamePhase::Judgment,
            DifficultyId::Expert,
            PhaseStats::default(),
            now,
        )];
        let summary = BookSummary::new(
            &book(),
            &GameState::default(),
            cards,
            DifficultyId::Expert,
            now,
        );
        assert!(summary.completed);
    }
}
