use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use crate::constants::VERDICT_PARTIAL_ABOVE;
use crate::debug::{DebugCommand, DebugEffect};
use crate::difficulty::{self, DifficultyId};
use crate::numbers::similarity_to_percent;
use crate::quest::{Quest, QuestStatus, generate_quest};
use crate::state::{
    ActionKind, GamePhase, GameState, Inventory, ManaChange, ManaEvent, PhaseProgress,
    VisionFragment, XpAward,
};
use crate::syntopical::UnlockCheck;
use crate::validation::ValidationResult;

/// Outcome of handing a validated answer back to its quest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QuestOutcome {
    Completed(XpAward),
    Partial(ManaChange),
    Failed(ManaChange),
}

impl QuestOutcome {
    #[must_use]
    pub const fn status(&self) -> QuestStatus {
        match self {
            Self::Completed(_) => QuestStatus::Completed,
            Self::Partial(_) | Self::Failed(_) => QuestStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Advance {
    Moved { from: GamePhase, to: GamePhase },
    Blocked(PhaseProgress),
    FinalPhase,
}

/// What handing in one answer did to the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Settlement {
    /// The answer settled the active quest; its reward replaces the action XP.
    Quest(QuestOutcome),
    /// Accepted outside a quest and paid the action's XP.
    Action(XpAward),
    /// Rejected outside a quest.
    Rejected(ManaChange),
    /// Accepted, but the answer earns nothing on its own.
    Unrewarded,
}

/// Near misses above the partial band cost less than wrong answers.
fn rejection_event(result: &ValidationResult) -> ManaEvent {
    if result.score > similarity_to_percent(VERDICT_PARTIAL_ABOVE) {
        ManaEvent::PartialAnswer
    } else {
        ManaEvent::WrongAnswer
    }
}

/// One reader working through one book at one difficulty.
#[derive(Debug, Clone)]
pub struct ReadingSession {
    book_id: String,
    difficulty: DifficultyId,
    seed: u64,
    state: GameState,
    rng: ChaCha20Rng,
}

impl ReadingSession {
    /// Fresh session at the starting state.
    #[must_use]
    pub fn new(book_id: impl Into<String>, difficulty: DifficultyId, seed: u64) -> Self {
        Self::from_state(book_id, difficulty, GameState::default(), seed)
    }

    /// Resume a stored state.
    #[must_use]
    pub fn from_state(
        book_id: impl Into<String>,
        difficulty: DifficultyId,
        state: GameState,
        seed: u64,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            difficulty,
            seed,
            state,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    #[must_use]
    pub const fn difficulty(&self) -> DifficultyId {
        self.difficulty
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> GameState {
        self.state
    }

    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha20Rng::seed_from_u64(seed);
    }

    /// Award an action's XP scaled for this session's difficulty.
    pub fn award(&mut self, action: ActionKind) -> XpAward {
        let award = self.state.award_scaled_xp(action, self.difficulty);
        self.state = award.state.clone();
        award
    }

    pub fn apply_mana(&mut self, event: ManaEvent) -> ManaChange {
        let change = self.state.apply_mana_event(event);
        self.state = change.state.clone();
        change
    }

    pub fn rest(&mut self) -> ManaChange {
        let change = self.state.rest(self.difficulty);
        self.state = change.state.clone();
        change
    }

    /// Spend mana on a hint. `None` when the difficulty offers no hints.
    pub fn request_hint(&mut self) -> Option<ManaChange> {
        difficulty::hints_available(self.difficulty)
            .then(|| self.apply_mana(ManaEvent::HintRequest))
    }

    /// Generate the next quest and mark it active.
    pub fn next_quest(&mut self, chapter_text: &str, now: DateTime<Utc>) -> Quest {
        let quest = generate_quest(&self.state, chapter_text, &mut self.rng, now);
        self.state.active_quest_id = Some(quest.id.clone());
        quest
    }

    /// Mark an externally built quest (such as a syntopical one) as active.
    pub fn activate_quest(&mut self, quest: &Quest) {
        self.state.active_quest_id = Some(quest.id.clone());
    }

    /// Settle a quest against its validation result.
    ///
    /// A valid answer earns the quest reward scaled by difficulty. A rejected
    /// answer that still scored above the partial band costs the smaller
    /// penalty; anything else counts as wrong.
    pub fn complete_quest(&mut self, quest: &Quest, result: &ValidationResult) -> QuestOutcome {
        if self.state.active_quest_id.as_deref() == Some(quest.id.as_str()) {
            self.state.active_quest_id = None;
        }
        if result.valid {
            let award = self
                .state
                .award_base_xp(difficulty::compute_xp(quest.xp_reward, self.difficulty));
            self.state = award.state.clone();
            return QuestOutcome::Completed(award);
        }
        let event = rejection_event(result);
        let change = self.apply_mana(event);
        match event {
            ManaEvent::PartialAnswer => QuestOutcome::Partial(change),
            _ => QuestOutcome::Failed(change),
        }
    }

    /// Score one answer. A quest it settles pays the quest reward only, so
    /// each answer moves the combo by at most one step.
    pub fn settle(
        &mut self,
        quest: Option<&Quest>,
        action: Option<ActionKind>,
        result: &ValidationResult,
    ) -> Settlement {
        match (quest, result.valid) {
            (Some(quest), _) => Settlement::Quest(self.complete_quest(quest, result)),
            (None, true) => action.map_or(Settlement::Unrewarded, |action| {
                Settlement::Action(self.award(action))
            }),
            (None, false) => Settlement::Rejected(self.reject(result)),
        }
    }

    /// Charge mana for a rejected answer given outside any quest.
    pub fn reject(&mut self, result: &ValidationResult) -> ManaChange {
        self.apply_mana(rejection_event(result))
    }

    #[must_use]
    pub fn check_progression(&self, inventory: &Inventory) -> PhaseProgress {
        self.state.check_phase_progression(inventory, self.difficulty)
    }

    /// Advance along the base phase order when the gate is satisfied.
    pub fn try_advance(&mut self, inventory: &Inventory) -> Advance {
        let progress = self.check_progression(inventory);
        if !progress.ready {
            return Advance::Blocked(progress);
        }
        let from = self.state.current_phase;
        let next = self.state.advance_phase(false);
        if next.current_phase == from {
            return Advance::FinalPhase;
        }
        self.state = next;
        Advance::Moved {
            from,
            to: self.state.current_phase,
        }
    }

    /// Enter the syntopical tier after a successful unlock check. Only a
    /// session sitting in Judgment can move.
    pub fn unlock_advanced(&mut self, check: &UnlockCheck) -> bool {
        if !check.can_unlock
            || self.state.current_phase != GamePhase::Judgment
            || !difficulty::is_advanced_enabled(self.difficulty)
        {
            return false;
        }
        let next = self.state.advance_phase(true);
        let moved = next.current_phase != self.state.current_phase;
        self.state = next;
        moved
    }

    pub fn award_vision(
        &mut self,
        concept: &str,
        image_path: Option<String>,
        now: DateTime<Utc>,
    ) -> VisionFragment {
        let (state, fragment) = self.state.award_vision(concept, image_path, now);
        self.state = state;
        fragment
    }

    /// Apply a debug command; state changes replace the session state.
    pub fn debug(&mut self, command: DebugCommand) -> DebugEffect {
        let effect = command.apply(&self.state);
        if let DebugEffect::StateChanged { state, .. } = &effect {
            self.state = state.clone();
        }
        effect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Term;

    fn result(valid: bool, score: u8) -> ValidationResult {
        ValidationResult {
            valid,
            score,
            ..ValidationResult::default()
        }
    }

    fn terms(n: usize) -> Inventory {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        Inventory {
            terms: (0..n)
                .map(|i| Term {
                    id: format!("t{i}"),
                    word: format!("word{i}"),
                    definition: String::new(),
                    context: None,
                    chapter_index: 0,
                    created_at: now,
                })
                .collect(),
            ..Inventory::default()
        }
    }

    #[test]
    fn award_scales_by_difficulty() {
        let mut session = ReadingSession::new("b", DifficultyId::Expert, 1);
        let award = session.award(ActionKind::TermDefined);
        assert_eq!(award.xp_gained, 30);
        assert_eq!(session.state().xp_total, 30);
        assert_eq!(session.state().combo_count, 1);
    }

    #[test]
    fn quest_lifecycle_tracks_active_id() {
        let mut session = ReadingSession::new("b", DifficultyId::Master, 1);
        let quest = session.next_quest("text", DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(session.state().active_quest_id.as_deref(), Some("quest_0"));

        let outcome = session.complete_quest(&quest, &result(true, 90));
        assert_eq!(outcome.status(), QuestStatus::Completed);
        assert!(session.state().active_quest_id.is_none());
        assert_eq!(session.state().xp_total, 20);
    }

    #[test]
    fn near_misses_cost_less_mana() {
        let mut session = ReadingSession::new("b", DifficultyId::Master, 1);
        let quest = session.next_quest("text", DateTime::<Utc>::UNIX_EPOCH);
        let partial = session.complete_quest(&quest, &result(false, 65));
        assert!(matches!(partial, QuestOutcome::Partial(ref c) if c.mana_change == -5));
        let failed = session.complete_quest(&quest, &result(false, 50));
        assert!(matches!(failed, QuestOutcome::Failed(ref c) if c.mana_change == -10));
        assert_eq!(session.state().mana, 85);
        assert_eq!(session.state().consecutive_failures, 2);
    }

    #[test]
    fn rejection_without_quest_still_costs_mana() {
        let mut session = ReadingSession::new("b", DifficultyId::Master, 1);
        assert_eq!(session.reject(&result(false, 70)).mana_change, -5);
        assert_eq!(session.reject(&result(false, 10)).mana_change, -10);
        assert_eq!(session.state().mana, 85);
        assert!(session.state().active_quest_id.is_none());
    }

    #[test]
    fn activated_quest_can_be_settled() {
        let mut session = ReadingSession::new("b", DifficultyId::Master, 1);
        let quest = session.next_quest("text", DateTime::<Utc>::UNIX_EPOCH);
        let outside = Quest {
            id: "syntopical_1".into(),
            ..quest
        };
        session.activate_quest(&outside);
        assert_eq!(session.state().active_quest_id.as_deref(), Some("syntopical_1"));
        session.complete_quest(&outside, &result(true, 80));
        assert!(session.state().active_quest_id.is_none());
    }

    #[test]
    fn quest_answer_pays_once() {
        let mut session = ReadingSession::new("b", DifficultyId::Master, 1);
        let quest = session.next_quest("text", DateTime::<Utc>::UNIX_EPOCH);
        let settled = session.settle(
            Some(&quest),
            Some(ActionKind::TermDefined),
            &result(true, 90),
        );
        assert!(matches!(settled, Settlement::Quest(QuestOutcome::Completed(_))));
        assert_eq!(session.state().combo_count, 1);
        assert_eq!(session.state().xp_total, 20);

        let settled = session.settle(None, Some(ActionKind::TermDefined), &result(true, 90));
        assert!(matches!(settled, Settlement::Action(_)));
        assert_eq!(session.state().combo_count, 2);

        assert_eq!(session.settle(None, None, &result(true, 90)), Settlement::Unrewarded);
        assert_eq!(session.state().combo_count, 2);

        let settled = session.settle(None, None, &result(false, 10));
        assert!(matches!(settled, Settlement::Rejected(ref c) if c.mana_change == -10));
        assert_eq!(session.state().combo_count, 0);
    }

    #[test]
    fn hints_depend_on_difficulty() {
        let mut easy = ReadingSession::new("b", DifficultyId::Beginner, 1);
        assert_eq!(easy.request_hint().map(|c| c.state.mana), Some(85));
        let mut hard = ReadingSession::new("b", DifficultyId::Master, 1);
        assert!(hard.request_hint().is_none());
        assert_eq!(hard.state().mana, 100);
    }

    #[test]
    fn try_advance_respects_gate() {
        let state = GameState {
            current_phase: GamePhase::Hunting,
            ..GameState::default()
        };
        let mut session = ReadingSession::from_state("b", DifficultyId::Beginner, state, 1);
        assert!(matches!(session.try_advance(&terms(2)), Advance::Blocked(_)));
        assert_eq!(
            session.try_advance(&terms(3)),
            Advance::Moved {
                from: GamePhase::Hunting,
                to: GamePhase::Alchemy
            }
        );
    }

    #[test]
    fn judgment_is_final_without_unlock() {
        let state = GameState {
            current_phase: GamePhase::Judgment,
            ..GameState::default()
        };
        let mut session = ReadingSession::from_state("b", DifficultyId::Expert, state, 1);
        assert_eq!(session.try_advance(&Inventory::default()), Advance::FinalPhase);

        let check = UnlockCheck {
            can_unlock: true,
            reason: String::new(),
            eligible_topics: vec!["ethics".into()],
        };
        assert!(session.unlock_advanced(&check));
        assert_eq!(session.state().current_phase, GamePhase::Syntopical);
    }

    #[test]
    fn unlock_refused_below_expert() {
        let state = GameState {
            current_phase: GamePhase::Judgment,
            ..GameState::default()
        };
        let mut session = ReadingSession::from_state("b", DifficultyId::Master, state, 1);
        let check = UnlockCheck {
            can_unlock: true,
            reason: String::new(),
            eligible_topics: Vec::new(),
        };
        assert!(!session.unlock_advanced(&check));
        assert_eq!(session.state().current_phase, GamePhase::Judgment);
    }

    #[test]
    fn unlock_needs_judgment_phase() {
        let check = UnlockCheck {
            can_unlock: true,
            reason: String::new(),
            eligible_topics: vec!["ethics".into()],
        };
        for phase in [GamePhase::Scouting, GamePhase::Alchemy, GamePhase::Syntopical] {
            let state = GameState {
                current_phase: phase,
                ..GameState::default()
            };
            let mut session = ReadingSession::from_state("b", DifficultyId::Expert, state, 1);
            assert!(!session.unlock_advanced(&check), "{phase}");
            assert_eq!(session.state().current_phase, phase);
        }
    }

    #[test]
    fn same_seed_same_quests() {
        let text = format!("{}\n\n{}\n\n{}", "a".repeat(80), "b".repeat(80), "c".repeat(80));
        let state = GameState {
            current_phase: GamePhase::Hunting,
            consecutive_failures: 3,
            ..GameState::default()
        };
        let mut first = ReadingSession::from_state("b", DifficultyId::Master, state.clone(), 42);
        let mut second = ReadingSession::from_state("b", DifficultyId::Master, state, 42);
        let now = DateTime::<Utc>::UNIX_EPOCH;
        for _ in 0..5 {
            assert_eq!(
                first.next_quest(&text, now).description,
                second.next_quest(&text, now).description
            );
        }
    }

    #[test]
    fn debug_state_changes_stick() {
        let mut session = ReadingSession::new("b", DifficultyId::Master, 1);
        let effect = session.debug(DebugCommand::Goto(GamePhase::Judgment));
        assert!(matches!(effect, DebugEffect::StateChanged { .. }));
        assert_eq!(session.state().current_phase, GamePhase::Judgment);
    }
}
