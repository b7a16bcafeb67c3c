//! Centralized balance and tuning constants for Deepread game logic.
//!
//! These values define the deterministic math for progression, quests and
//! answer validation. Keeping them together ensures that gameplay can only be
//! adjusted via code changes reviewed in version control, rather than through
//! external JSON assets.

// XP tuning ----------------------------------------------------------------
pub(crate) const DEFAULT_ACTION_XP: u32 = 10;
pub(crate) const COMBO_STEP: f64 = 0.1;
pub(crate) const COMBO_CAP: f64 = 1.0;

// Mana tuning --------------------------------------------------------------
pub(crate) const MANA_MIN: i32 = 0;
pub(crate) const MANA_MAX: i32 = 100;
pub(crate) const MANA_WRONG_ANSWER: i32 = -10;
pub(crate) const MANA_HINT_REQUEST: i32 = -15;
pub(crate) const MANA_PARTIAL_ANSWER: i32 = -5;
pub(crate) const MANA_REST_RECOVERY: i32 = 30;
pub(crate) const MANA_RESTATEMENT_SUCCESS: i32 = 15;
pub(crate) const MANA_REST_ADVISED_AT: i32 = 20;

// Quest generation ---------------------------------------------------------
pub(crate) const EASY_TIER_FAILURE_THRESHOLD: u32 = 2;
pub(crate) const PARAGRAPH_MIN_CHARS: usize = 50;
pub(crate) const EXCERPT_PREVIEW_CHARS: usize = 100;
pub(crate) const EXCERPT_ELLIPSIS: &str = "...";
pub(crate) const EXCERPT_FALLBACK: &str = "the chapter text";
pub(crate) const PARAGRAPH_BREAK_PATTERN: &str = r"\r?\n(?:[ \t]*\r?\n)+";

pub(crate) const SCOUT_XP: u32 = 20;
pub(crate) const HUNT_XP: u32 = 40;
pub(crate) const ALCHEMY_XP: u32 = 50;
pub(crate) const JUDGE_XP: u32 = 100;
pub(crate) const SYNTHESIS_XP: u32 = 150;

// Similarity verdicts ------------------------------------------------------
pub(crate) const VERDICT_VALID_ABOVE: f32 = 0.7;
pub(crate) const VERDICT_PARTIAL_ABOVE: f32 = 0.5;
pub(crate) const MATCHED_CONCEPT_ABOVE: f32 = 0.6;
pub(crate) const CLASSIFICATION_ACCEPT_ABOVE: f32 = 0.4;
pub(crate) const UNITY_ACCEPT_ABOVE: f32 = 0.5;
pub(crate) const TERM_ACCEPT_ABOVE: f32 = 0.45;
pub(crate) const CRITIQUE_ACCEPT_ABOVE: f32 = 0.4;

pub(crate) const UNITY_MIN_WORDS: usize = 5;
pub(crate) const UNITY_MAX_WORDS: usize = 100;
pub(crate) const RETRIEVAL_TOP_K: usize = 3;
pub(crate) const MIN_ARGUMENT_PREMISES: usize = 2;
pub(crate) const HINT_CONTEXT_CHARS: usize = 50;
pub(crate) const HINT_FOCUS_CHARS: usize = 100;

// Understanding verification -----------------------------------------------
pub(crate) const CLOZE_QUERY: &str = "main idea key concept important definition";
pub(crate) const CLOZE_MIN_WORD_CHARS: usize = 5;
pub(crate) const CLOZE_BLANK: &str = "_______";
pub(crate) const CLOZE_EXACT_CREDIT: f64 = 100.0;
pub(crate) const CLOZE_CLOSE_CREDIT: f64 = 80.0;
pub(crate) const CLOZE_PARTIAL_CREDIT: f64 = 40.0;
pub(crate) const VERIFICATION_PASS_SCORE: f64 = 60.0;

// Advanced tier ------------------------------------------------------------
pub(crate) const DEFAULT_MIN_GROUP_SIZE: usize = 2;
pub(crate) const AUTO_DETECTED_TOPIC: &str = "auto-detected";
