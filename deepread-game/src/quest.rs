//! Phase-aware quest generation.
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::constants::{
    ALCHEMY_XP, EASY_TIER_FAILURE_THRESHOLD, EXCERPT_ELLIPSIS, EXCERPT_FALLBACK,
    EXCERPT_PREVIEW_CHARS, HUNT_XP, JUDGE_XP, PARAGRAPH_BREAK_PATTERN, PARAGRAPH_MIN_CHARS,
    SCOUT_XP, SYNTHESIS_XP,
};
use crate::state::{GamePhase, GameState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestKind {
    Scout,
    Hunt,
    Alchemy,
    Judge,
    Synthesis,
}

impl QuestKind {
    #[must_use]
    pub const fn for_phase(phase: GamePhase) -> Self {
        match phase {
            GamePhase::Scouting => Self::Scout,
            GamePhase::Hunting => Self::Hunt,
            GamePhase::Alchemy => Self::Alchemy,
            GamePhase::Judgment => Self::Judge,
            GamePhase::Syntopical => Self::Synthesis,
        }
    }

    #[must_use]
    pub const fn xp_reward(self) -> u32 {
        match self {
            Self::Scout => SCOUT_XP,
            Self::Hunt => HUNT_XP,
            Self::Alchemy => ALCHEMY_XP,
            Self::Judge => JUDGE_XP,
            Self::Synthesis => SYNTHESIS_XP,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scout => "SCOUT",
            Self::Hunt => "HUNT",
            Self::Alchemy => "ALCHEMY",
            Self::Judge => "JUDGE",
            Self::Synthesis => "SYNTHESIS",
        }
    }
}

impl fmt::Display for QuestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestTier {
    Easy,
    #[default]
    Normal,
}

impl QuestTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Normal => "NORMAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub kind: QuestKind,
    pub description: String,
    pub target: String,
    pub xp_reward: u32,
    pub tier: QuestTier,
    #[serde(default)]
    pub status: QuestStatus,
    pub created_at: DateTime<Utc>,
}

/// Easy tier kicks in once the reader has failed more than twice in a row.
#[must_use]
pub const fn quest_tier(state: &GameState) -> QuestTier {
    if state.consecutive_failures > EASY_TIER_FAILURE_THRESHOLD {
        QuestTier::Easy
    } else {
        QuestTier::Normal
    }
}

fn paragraph_break() -> Option<&'static Regex> {
    static PARAGRAPH_BREAK: OnceLock<Option<Regex>> = OnceLock::new();
    PARAGRAPH_BREAK
        .get_or_init(|| Regex::new(PARAGRAPH_BREAK_PATTERN).ok())
        .as_ref()
}

/// Paragraph blocks long enough to quote.
#[must_use]
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let blocks: Vec<&str> = match paragraph_break() {
        Some(re) => re.split(text).collect(),
        None => text.split("\n\n").collect(),
    };
    blocks
        .into_iter()
        .filter(|block| block.chars().count() > PARAGRAPH_MIN_CHARS)
        .collect()
}

/// Pick one qualifying paragraph and truncate it into a quoted excerpt.
pub fn pick_excerpt<R: Rng + ?Sized>(text: &str, rng: &mut R) -> String {
    let paragraphs = split_paragraphs(text);
    let chosen = if paragraphs.is_empty() {
        EXCERPT_FALLBACK
    } else {
        paragraphs[rng.gen_range(0..paragraphs.len())]
    };
    let preview: String = chosen.chars().take(EXCERPT_PREVIEW_CHARS).collect();
    format!("{preview}{EXCERPT_ELLIPSIS}")
}

/// Build a quest for the reader's current phase.
///
/// Only the Easy hunting and alchemy quests quote an excerpt, so the RNG is
/// consulted for those alone. The state is never modified.
pub fn generate_quest<R: Rng + ?Sized>(
    state: &GameState,
    chapter_text: &str,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Quest {
    let tier = quest_tier(state);
    let kind = QuestKind::for_phase(state.current_phase);
    let easy = tier == QuestTier::Easy;

    let (description, target) = match kind {
        QuestKind::Scout if easy => (
            "Read the first paragraph and identify one keyword.".to_string(),
            "Keyword Identification",
        ),
        QuestKind::Scout => (
            "Read the chapter and summarize its main theme in one sentence.".to_string(),
            "Unity Statement",
        ),
        QuestKind::Hunt if easy => (
            format!(
                "Find the definition of a word in this section: \"{}\"",
                pick_excerpt(chapter_text, rng)
            ),
            "Term Definition",
        ),
        QuestKind::Hunt => (
            "Identify and define 2 key terms that are central to this chapter's argument."
                .to_string(),
            "Term Logging",
        ),
        QuestKind::Alchemy if easy => (
            format!(
                "Find one declarative sentence in this paragraph: \"{}\"",
                pick_excerpt(chapter_text, rng)
            ),
            "Proposition Extraction",
        ),
        QuestKind::Alchemy => (
            "Construct an argument by linking 2 propositions found in this chapter.".to_string(),
            "Argument Building",
        ),
        QuestKind::Judge => (
            "Critique the author's main argument in this chapter using specific evidence."
                .to_string(),
            "Critique",
        ),
        QuestKind::Synthesis if easy => (
            "Analyze the common themes across your completed books and identify one key topic."
                .to_string(),
            "Topic Identification",
        ),
        QuestKind::Synthesis => (
            "Build a neutral terminology system by comparing terms from different books on the same topic."
                .to_string(),
            "Neutral Term System",
        ),
    };

    log::debug!(
        "quest generated kind={kind} tier={} phase={}",
        tier.as_str(),
        state.current_phase
    );

    Quest {
        id: format!("quest_{}", now.timestamp_millis()),
        kind,
        description,
        target: target.to_string(),
        xp_reward: kind.xp_reward(),
        tier,
        status: QuestStatus::Active,
        created_at: now,
    }
}
