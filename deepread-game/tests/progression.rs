use deepread_game::difficulty::advanced_mode;
use deepread_game::{
    ActionKind, DifficultyId, GamePhase, GameState, Inventory, LEVEL_THRESHOLDS, ManaEvent,
    check_unlock, level_for_xp,
};
use std::collections::BTreeMap;

fn sample_states() -> Vec<GameState> {
    let mut states = Vec::new();
    for mana in [0, 1, 35, 99, 100] {
        for combo in [0, 1, 5, 10, 40] {
            for failures in [0, 3] {
                states.push(GameState {
                    mana,
                    combo_count: combo,
                    consecutive_failures: failures,
                    xp_total: combo * 37,
                    level: level_for_xp(combo * 37).level,
                    ..GameState::default()
                });
            }
        }
    }
    states
}

#[test]
fn mana_stays_in_bounds_for_any_delta() {
    for state in sample_states() {
        for delta in [-1000, -101, -15, -1, 0, 1, 30, 101, i32::MAX, i32::MIN] {
            let change = state.modify_mana(delta, "sweep");
            assert!((0..=100).contains(&change.state.mana), "delta {delta}");
        }
    }
}

#[test]
fn penalties_reset_combo_and_count_failures() {
    for state in sample_states() {
        for delta in [-1, -10, -500] {
            let change = state.modify_mana(delta, "penalty");
            assert_eq!(change.state.combo_count, 0);
            assert_eq!(
                change.state.consecutive_failures,
                state.consecutive_failures + 1
            );
        }
    }
}

#[test]
fn xp_awards_are_monotonic_and_extend_combo() {
    for state in sample_states() {
        for action in ActionKind::ALL {
            let award = state.award_xp(*action);
            assert!(award.state.xp_total >= state.xp_total);
            assert_eq!(award.state.combo_count, state.combo_count + 1);
            assert_eq!(award.state.consecutive_failures, 0);
        }
    }
}

#[test]
fn combo_bonus_caps_at_double() {
    for combo in [10, 11, 50, 1000] {
        let state = GameState {
            combo_count: combo,
            ..GameState::default()
        };
        for action in ActionKind::ALL {
            assert_eq!(state.award_xp(*action).xp_gained, action.base_xp() * 2);
        }
    }
}

#[test]
fn level_is_a_function_of_xp() {
    for xp in (0..2500).step_by(7) {
        let left = GameState::default().award_base_xp(xp);
        let right = GameState {
            combo_count: 0,
            mana: 12,
            ..GameState::default()
        }
        .award_base_xp(xp);
        assert_eq!(left.state.xp_total, right.state.xp_total);
        assert_eq!(left.state.level, right.state.level);
        assert_eq!(left.state.level, level_for_xp(xp).level);
    }
    for window in LEVEL_THRESHOLDS.windows(2) {
        assert!(window[0].xp_required < window[1].xp_required);
    }
}

#[test]
fn terminal_phase_is_fixed_point_without_advanced_tier() {
    let state = GameState {
        current_phase: GamePhase::Judgment,
        combo_count: 4,
        current_chapter: 7,
        ..GameState::default()
    };
    assert_eq!(state.advance_phase(false), state);
}

#[test]
fn empty_scouting_inventory_reports_two_missing() {
    let progress =
        GameState::default().check_phase_progression(&Inventory::default(), DifficultyId::Master);
    assert!(!progress.ready);
    assert_eq!(progress.missing.len(), 2);
}

#[test]
fn penalty_after_award_always_breaks_combo() {
    for state in sample_states() {
        let awarded = state.award_xp(ActionKind::ArgumentBuilt).state;
        let penalized = awarded.apply_mana_event(ManaEvent::WrongAnswer).state;
        assert_eq!(penalized.combo_count, 0);
    }
}

#[test]
fn first_classification_stays_at_level_one() {
    let award = GameState::default().award_named_xp("BOOK_CLASSIFIED");
    assert_eq!(award.xp_gained, 50);
    assert_eq!(award.state.xp_total, 50);
    assert_eq!(award.state.level, 1);
    assert!(award.level_up.is_none());
}

#[test]
fn crossing_two_hundred_levels_up_and_refills_mana() {
    for mana in [0, 50, 100] {
        let state = GameState {
            xp_total: 190,
            mana,
            ..GameState::default()
        };
        let award = state.award_xp(ActionKind::TermDefined);
        let level_up = award.level_up.expect("level up");
        assert_eq!(level_up.new_level, 2);
        assert_eq!(level_up.new_title, LEVEL_THRESHOLDS[1].title);
        assert_eq!(award.state.mana, 100);
    }
}

#[test]
fn disabled_advanced_mode_never_unlocks() {
    let mut topics = BTreeMap::new();
    topics.insert(
        "ethics".to_string(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
    );
    let completed: Vec<String> = (0..5).map(|i| format!("book-{i}")).collect();
    for difficulty in [
        DifficultyId::Beginner,
        DifficultyId::Apprentice,
        DifficultyId::Master,
    ] {
        for phase in GamePhase::ALL {
            let state = GameState {
                current_phase: *phase,
                ..GameState::default()
            };
            let check = check_unlock(&state, &advanced_mode(difficulty), &completed, &topics);
            assert!(!check.can_unlock);
        }
    }
}

#[test]
fn full_track_reaches_judgment_at_each_difficulty() {
    use deepread_game::data::{Argument, ArgumentStrength, Proposition, Term};
    use chrono::{DateTime, Utc};

    let now = DateTime::<Utc>::UNIX_EPOCH;
    let inventory = Inventory {
        book_classified: true,
        unity_statement: true,
        terms: (0..7)
            .map(|i| Term {
                id: format!("t{i}"),
                word: format!("term{i}"),
                definition: "meaning".into(),
                context: None,
                chapter_index: 1,
                created_at: now,
            })
            .collect(),
        propositions: (0..5)
            .map(|i| Proposition {
                id: format!("p{i}"),
                statement: "claim".into(),
                source: None,
                chapter_index: 1,
                related_term_ids: Vec::new(),
                created_at: now,
            })
            .collect(),
        arguments: (0..2)
            .map(|i| Argument {
                id: format!("a{i}"),
                premises: vec!["p0".into(), "p1".into()],
                conclusion: "so".into(),
                chapter_index: 1,
                strength: ArgumentStrength::Supported,
                created_at: now,
            })
            .collect(),
    };

    for difficulty in DifficultyId::ALL {
        let mut state = GameState::default();
        while state
            .check_phase_progression(&inventory, *difficulty)
            .ready
        {
            let next = state.advance_phase(false);
            if next == state {
                break;
            }
            state = next;
        }
        assert_eq!(state.current_phase, GamePhase::Judgment, "{difficulty}");
    }
}
