//! Reader progression: phases, XP, levels, mana and phase gating.
//!
//! Every operation takes the current [`GameState`] by reference and returns a
//! fresh state; callers decide when to persist it.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    COMBO_CAP, COMBO_STEP, DEFAULT_ACTION_XP, MANA_HINT_REQUEST, MANA_MAX, MANA_MIN,
    MANA_PARTIAL_ANSWER, MANA_REST_ADVISED_AT, MANA_REST_RECOVERY, MANA_RESTATEMENT_SUCCESS,
    MANA_WRONG_ANSWER,
};
use crate::data::{Argument, Proposition, Term};
use crate::difficulty::{self, DifficultyId};
use crate::numbers::round_f64_to_u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    #[default]
    Scouting,
    Hunting,
    Alchemy,
    Judgment,
    Syntopical,
}

impl GamePhase {
    pub const ALL: &'static [Self] = &[
        Self::Scouting,
        Self::Hunting,
        Self::Alchemy,
        Self::Judgment,
        Self::Syntopical,
    ];
    pub const BASE_ORDER: &'static [Self] =
        &[Self::Scouting, Self::Hunting, Self::Alchemy, Self::Judgment];

    /// Phase order for the active track.
    #[must_use]
    pub const fn order(allow_advanced: bool) -> &'static [Self] {
        if allow_advanced {
            Self::ALL
        } else {
            Self::BASE_ORDER
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scouting => "SCOUTING",
            Self::Hunting => "HUNTING",
            Self::Alchemy => "ALCHEMY",
            Self::Judgment => "JUDGMENT",
            Self::Syntopical => "SYNTOPICAL",
        }
    }

    /// Reading tools open in this phase. The syntopical tier works through
    /// its quests rather than tools.
    #[must_use]
    pub const fn available_tools(self) -> &'static [&'static str] {
        match self {
            Self::Scouting => &["scan_structure", "classify_book"],
            Self::Hunting => &["log_term", "define_term"],
            Self::Alchemy => &["extract_proposition", "build_argument"],
            Self::Judgment => &["critique_argument", "verify_understanding"],
            Self::Syntopical => &[],
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scouting => "Scouting Phase",
            Self::Hunting => "Hunting Phase",
            Self::Alchemy => "Alchemy Phase",
            Self::Judgment => "Judgment Phase",
            Self::Syntopical => "Syntopical Phase",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GamePhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCOUTING" => Ok(Self::Scouting),
            "HUNTING" => Ok(Self::Hunting),
            "ALCHEMY" => Ok(Self::Alchemy),
            "JUDGMENT" => Ok(Self::Judgment),
            "SYNTOPICAL" => Ok(Self::Syntopical),
            _ => Err(()),
        }
    }
}

/// Actions that earn XP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    BookClassified,
    UnityStatement,
    TermDefined,
    PropositionExtracted,
    ArgumentBuilt,
    ValidCritique,
    ChapterComplete,
    TopicAnalyzed,
    NeutralTermCreated,
    CrossBookComparison,
    SynthesisCreated,
    TopicComplete,
}

impl ActionKind {
    pub const ALL: &'static [Self] = &[
        Self::BookClassified,
        Self::UnityStatement,
        Self::TermDefined,
        Self::PropositionExtracted,
        Self::ArgumentBuilt,
        Self::ValidCritique,
        Self::ChapterComplete,
        Self::TopicAnalyzed,
        Self::NeutralTermCreated,
        Self::CrossBookComparison,
        Self::SynthesisCreated,
        Self::TopicComplete,
    ];

    #[must_use]
    pub const fn base_xp(self) -> u32 {
        match self {
            Self::BookClassified | Self::ArgumentBuilt => 50,
            Self::UnityStatement => 30,
            Self::TermDefined => 20,
            Self::PropositionExtracted => 25,
            Self::ValidCritique => 100,
            Self::ChapterComplete => 75,
            Self::TopicAnalyzed => 150,
            Self::NeutralTermCreated => 80,
            Self::CrossBookComparison => 120,
            Self::SynthesisCreated => 200,
            Self::TopicComplete => 300,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookClassified => "BOOK_CLASSIFIED",
            Self::UnityStatement => "UNITY_STATEMENT",
            Self::TermDefined => "TERM_DEFINED",
            Self::PropositionExtracted => "PROPOSITION_EXTRACTED",
            Self::ArgumentBuilt => "ARGUMENT_BUILT",
            Self::ValidCritique => "VALID_CRITIQUE",
            Self::ChapterComplete => "CHAPTER_COMPLETE",
            Self::TopicAnalyzed => "TOPIC_ANALYZED",
            Self::NeutralTermCreated => "NEUTRAL_TERM_CREATED",
            Self::CrossBookComparison => "CROSS_BOOK_COMPARISON",
            Self::SynthesisCreated => "SYNTHESIS_CREATED",
            Self::TopicComplete => "TOPIC_COMPLETE",
        }
    }
}

impl FromStr for ActionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == wanted)
            .ok_or(())
    }
}

/// Base XP for an action name; unknown names earn the flat default.
#[must_use]
pub fn base_xp_for(action: &str) -> u32 {
    action
        .parse::<ActionKind>()
        .map_or(DEFAULT_ACTION_XP, ActionKind::base_xp)
}

/// Named mana events with fixed deltas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManaEvent {
    WrongAnswer,
    HintRequest,
    PartialAnswer,
    RestRecovery,
    RestatementSuccess,
}

impl ManaEvent {
    #[must_use]
    pub const fn amount(self) -> i32 {
        match self {
            Self::WrongAnswer => MANA_WRONG_ANSWER,
            Self::HintRequest => MANA_HINT_REQUEST,
            Self::PartialAnswer => MANA_PARTIAL_ANSWER,
            Self::RestRecovery => MANA_REST_RECOVERY,
            Self::RestatementSuccess => MANA_RESTATEMENT_SUCCESS,
        }
    }

    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::WrongAnswer => "wrong answer",
            Self::HintRequest => "hint requested",
            Self::PartialAnswer => "partial answer",
            Self::RestRecovery => "rest",
            Self::RestatementSuccess => "restatement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelThreshold {
    pub level: u32,
    pub title: &'static str,
    pub xp_required: u32,
}

/// Ascending level table.
pub const LEVEL_THRESHOLDS: [LevelThreshold; 5] = [
    LevelThreshold {
        level: 1,
        title: "Novice",
        xp_required: 0,
    },
    LevelThreshold {
        level: 2,
        title: "Apprentice",
        xp_required: 200,
    },
    LevelThreshold {
        level: 3,
        title: "Scholar",
        xp_required: 500,
    },
    LevelThreshold {
        level: 4,
        title: "Master",
        xp_required: 1000,
    },
    LevelThreshold {
        level: 5,
        title: "Sage",
        xp_required: 2000,
    },
];

/// Highest level whose requirement `xp` meets.
#[must_use]
pub fn level_for_xp(xp: u32) -> &'static LevelThreshold {
    LEVEL_THRESHOLDS
        .iter()
        .rev()
        .find(|threshold| xp >= threshold.xp_required)
        .unwrap_or(&LEVEL_THRESHOLDS[0])
}

/// Position of an XP total on the level table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelInfo {
    pub level: u32,
    pub title: &'static str,
    pub xp_required: u32,
    /// Requirement of the next level; `None` at the top of the table.
    pub xp_for_next: Option<u32>,
    /// Percent of the way from this level's floor to the next; 100 at the top.
    pub progress: u8,
}

#[must_use]
pub fn level_progress(xp: u32) -> LevelInfo {
    let current = level_for_xp(xp);
    let next = LEVEL_THRESHOLDS
        .iter()
        .find(|threshold| threshold.xp_required > xp);
    let progress = next.map_or(100, |next| {
        let span = u64::from(next.xp_required - current.xp_required);
        let done = u64::from(xp - current.xp_required);
        u8::try_from(done * 100 / span).unwrap_or(100)
    });
    LevelInfo {
        level: current.level,
        title: current.title,
        xp_required: current.xp_required,
        xp_for_next: next.map(|threshold| threshold.xp_required),
        progress,
    }
}

/// Table entry for `level`, clamped to the table bounds.
#[must_use]
pub fn level_entry(level: u32) -> &'static LevelThreshold {
    LEVEL_THRESHOLDS
        .iter()
        .rev()
        .find(|threshold| level >= threshold.level)
        .unwrap_or(&LEVEL_THRESHOLDS[0])
}

/// Collected reading artifacts for one book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Inventory {
    #[serde(default)]
    pub book_classified: bool,
    #[serde(default)]
    pub unity_statement: bool,
    #[serde(default)]
    pub terms: Vec<Term>,
    #[serde(default)]
    pub propositions: Vec<Proposition>,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

/// Insight reward fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionFragment {
    pub id: String,
    pub concept: String,
    pub image_path: Option<String>,
    pub awarded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub level: u32,
    pub xp_total: u32,
    pub mana: i32,
    pub current_phase: GamePhase,
    #[serde(default = "first_chapter")]
    pub current_chapter: u32,
    pub combo_count: u32,
    pub consecutive_failures: u32,
    #[serde(default)]
    pub active_quest_id: Option<String>,
    #[serde(default)]
    pub visions: Vec<VisionFragment>,
}

const fn first_chapter() -> u32 {
    1
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            level: 1,
            xp_total: 0,
            mana: MANA_MAX,
            current_phase: GamePhase::Scouting,
            current_chapter: first_chapter(),
            combo_count: 0,
            consecutive_failures: 0,
            active_quest_id: None,
            visions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
    pub new_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XpAward {
    pub state: GameState,
    pub xp_gained: u32,
    pub level_up: Option<LevelUp>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManaChange {
    pub state: GameState,
    pub mana_change: i32,
    pub exhausted: bool,
    pub message: String,
}

/// Result of the phase-advancement gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub ready: bool,
    pub missing: Vec<String>,
}

impl GameState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Level, title and progress towards the next level implied by `xp_total`.
    #[must_use]
    pub fn level_info(&self) -> LevelInfo {
        level_progress(self.xp_total)
    }

    /// Mana is low enough that resting beats answering.
    #[must_use]
    pub const fn needs_rest(&self) -> bool {
        self.mana <= MANA_REST_ADVISED_AT
    }

    /// XP multiplier from the current combo streak, saturating at 2x.
    #[must_use]
    pub fn combo_multiplier(&self) -> f64 {
        1.0 + (f64::from(self.combo_count) * COMBO_STEP).min(COMBO_CAP)
    }

    #[must_use]
    pub fn award_xp(&self, action: ActionKind) -> XpAward {
        self.award_base_xp(action.base_xp())
    }

    /// Award XP for an action given by name; unknown names earn the flat default.
    #[must_use]
    pub fn award_named_xp(&self, action: &str) -> XpAward {
        self.award_base_xp(base_xp_for(action))
    }

    /// Award XP after scaling the action's base by the difficulty multiplier.
    #[must_use]
    pub fn award_scaled_xp(&self, action: ActionKind, difficulty: DifficultyId) -> XpAward {
        self.award_base_xp(difficulty::compute_xp(action.base_xp(), difficulty))
    }

    /// Award `base_xp` with the combo multiplier applied.
    #[must_use]
    pub fn award_base_xp(&self, base_xp: u32) -> XpAward {
        let multiplier = self.combo_multiplier();
        let xp_gained = round_f64_to_u32(f64::from(base_xp) * multiplier);

        let mut next = self.clone();
        next.xp_total = self.xp_total.saturating_add(xp_gained);
        next.combo_count = self.combo_count.saturating_add(1);
        next.consecutive_failures = 0;

        let old_entry = level_for_xp(self.xp_total);
        let new_entry = level_for_xp(next.xp_total);
        next.level = new_entry.level;
        let level_up = (new_entry.level > old_entry.level).then(|| {
            next.mana = MANA_MAX;
            LevelUp {
                old_level: old_entry.level,
                new_level: new_entry.level,
                new_title: new_entry.title.to_string(),
            }
        });

        let message = if self.combo_count > 0 {
            format!("+{xp_gained} XP (x{multiplier:.1} Combo!)")
        } else {
            format!("+{xp_gained} XP")
        };
        log::debug!(
            "xp award base={base_xp} gained={xp_gained} total={} combo={}",
            next.xp_total,
            next.combo_count
        );

        XpAward {
            state: next,
            xp_gained,
            level_up,
            message,
        }
    }

    /// Apply a mana delta, clamped to `[0, 100]`. Penalties break the combo.
    #[must_use]
    pub fn modify_mana(&self, delta: i32, reason: &str) -> ManaChange {
        let mut next = self.clone();
        next.mana = self.mana.saturating_add(delta).clamp(MANA_MIN, MANA_MAX);
        if delta < 0 {
            next.combo_count = 0;
            next.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        let sign = if delta > 0 { "+" } else { "" };
        ManaChange {
            exhausted: next.mana == MANA_MIN,
            message: format!("Mana {sign}{delta} ({reason})"),
            mana_change: delta,
            state: next,
        }
    }

    #[must_use]
    pub fn apply_mana_event(&self, event: ManaEvent) -> ManaChange {
        self.modify_mana(event.amount(), event.reason())
    }

    /// Recover the difficulty's fixed rest amount.
    #[must_use]
    pub fn rest(&self, difficulty: DifficultyId) -> ManaChange {
        self.modify_mana(
            difficulty::compute_mana_recovery(difficulty),
            ManaEvent::RestRecovery.reason(),
        )
    }

    /// Evaluate the requirements of the current phase only.
    #[must_use]
    pub fn check_phase_progression(
        &self,
        inventory: &Inventory,
        difficulty: DifficultyId,
    ) -> PhaseProgress {
        let thresholds = difficulty::thresholds_for(difficulty);
        let mut missing = Vec::new();

        match self.current_phase {
            GamePhase::Scouting => {
                if !inventory.book_classified {
                    missing.push("Classify Book".to_string());
                }
                if !inventory.unity_statement {
                    missing.push("Unity Statement".to_string());
                }
            }
            GamePhase::Hunting => {
                let terms = inventory.terms.len();
                if terms < thresholds.terms {
                    missing.push(format!(
                        "Log {need} Terms (Collected: {terms}/{need})",
                        need = thresholds.terms
                    ));
                }
            }
            GamePhase::Alchemy => {
                let props = inventory.propositions.len();
                let args = inventory.arguments.len();
                if props < thresholds.propositions {
                    missing.push(format!(
                        "Extract {need} Propositions (Collected: {props}/{need})",
                        need = thresholds.propositions
                    ));
                }
                if args < thresholds.arguments {
                    missing.push(format!(
                        "Build {need} Argument(s) (Built: {args}/{need})",
                        need = thresholds.arguments
                    ));
                }
            }
            GamePhase::Judgment | GamePhase::Syntopical => {}
        }

        PhaseProgress {
            ready: missing.is_empty(),
            missing,
        }
    }

    /// Move to the next phase in order. The last phase of the active order is
    /// returned unchanged.
    #[must_use]
    pub fn advance_phase(&self, allow_advanced: bool) -> Self {
        let order = GamePhase::order(allow_advanced);
        let next_phase = order
            .iter()
            .position(|phase| *phase == self.current_phase)
            .and_then(|idx| order.get(idx + 1))
            .copied();

        let Some(phase) = next_phase else {
            return self.clone();
        };
        log::debug!("phase advance {} -> {phase}", self.current_phase);
        Self {
            current_phase: phase,
            current_chapter: first_chapter(),
            combo_count: 0,
            consecutive_failures: 0,
            ..self.clone()
        }
    }

    /// Append an insight fragment to the reward log.
    #[must_use]
    pub fn award_vision(
        &self,
        concept: impl Into<String>,
        image_path: Option<String>,
        now: DateTime<Utc>,
    ) -> (Self, VisionFragment) {
        let fragment = VisionFragment {
            id: format!("vision_{}", now.timestamp_millis()),
            concept: concept.into(),
            image_path,
            awarded_at: now,
        };
        let mut next = self.clone();
        next.visions.push(fragment.clone());
        (next, fragment)
    }
}
