//! Advanced cross-book tier: unlock checks and synthesis quests.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::AUTO_DETECTED_TOPIC;
use crate::data::BookRef;
use crate::difficulty::AdvancedModeConfig;
use crate::quest::{Quest, QuestKind, QuestStatus, quest_tier};
use crate::state::{ActionKind, GamePhase, GameState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockCheck {
    pub can_unlock: bool,
    pub reason: String,
    pub eligible_topics: Vec<String>,
}

impl UnlockCheck {
    fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_unlock: false,
            reason: reason.into(),
            eligible_topics: Vec::new(),
        }
    }
}

/// Decide whether the reader may open the syntopical tier.
///
/// `completed_books` lists books whose judgment phase is done; `topic_books`
/// maps topic labels to the books tagged with them. When no topic has enough
/// members the completed-book count alone can unlock an auto-detected topic.
#[must_use]
pub fn check_unlock(
    state: &GameState,
    config: &AdvancedModeConfig,
    completed_books: &[String],
    topic_books: &BTreeMap<String, Vec<String>>,
) -> UnlockCheck {
    if !config.enabled {
        return UnlockCheck::denied("Syntopical reading is only available on Expert difficulty");
    }
    if config.require_prior_phase_complete && state.current_phase != GamePhase::Judgment {
        return UnlockCheck::denied("Complete the Judgment phase of analytical reading first");
    }

    let min = config.min_group_size;
    let eligible_topics: Vec<String> = topic_books
        .iter()
        .filter(|(_, books)| books.len() >= min)
        .map(|(topic, _)| topic.clone())
        .collect();

    if !eligible_topics.is_empty() {
        return UnlockCheck {
            can_unlock: true,
            reason: format!("Found {} eligible topic(s)", eligible_topics.len()),
            eligible_topics,
        };
    }

    let completed = completed_books.len();
    if completed < min {
        return UnlockCheck::denied(format!(
            "Need at least {min} books on one topic to start syntopical reading. Completed books: {completed}"
        ));
    }

    log::debug!("syntopical unlock via completed book count {completed}");
    UnlockCheck {
        can_unlock: true,
        reason: "Several completed books are available for syntopical reading".to_string(),
        eligible_topics: vec![AUTO_DETECTED_TOPIC.to_string()],
    }
}

/// Cross-book quest carrying the topic and participating books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntopicalQuest {
    #[serde(flatten)]
    pub quest: Quest,
    pub topic: String,
    pub books: Vec<BookRef>,
}

#[must_use]
pub fn generate_syntopical_quest(
    state: &GameState,
    books: &[BookRef],
    topic: &str,
    now: DateTime<Utc>,
) -> SyntopicalQuest {
    SyntopicalQuest {
        quest: Quest {
            id: format!("syntopical_{}", now.timestamp_millis()),
            kind: QuestKind::Synthesis,
            description: format!("Syntopical reading: build a neutral terminology for \"{topic}\""),
            target: "Cross-Book Analysis".to_string(),
            xp_reward: ActionKind::TopicAnalyzed.base_xp(),
            tier: quest_tier(state),
            status: QuestStatus::Active,
            created_at: now,
        },
        topic: topic.to_string(),
        books: books.to_vec(),
    }
}
