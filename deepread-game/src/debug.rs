//! Debug console commands.
//!
//! Commands are parsed once into a closed [`DebugCommand`] and applied
//! without any progression gating.
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::constants::{MANA_MAX, MANA_MIN};
use crate::state::{GamePhase, GameState, level_entry, level_for_xp};

const MENU: &str = "/debug";
const MENU_BARE: &str = "debug";
const ADD_TOPICS: &str = "/debug:add_topics";
const EXIT: &str = "/exit_debug";
const GOTO_PREFIX: &str = "/goto:";
const SET_PREFIX: &str = "/set:";

/// Command reference shown by the debug menu.
pub const MENU_COMMANDS: &[(&str, &str)] = &[
    ("/goto:SCOUTING", "Jump to the scouting phase"),
    ("/goto:HUNTING", "Jump to the hunting phase"),
    ("/goto:ALCHEMY", "Jump to the alchemy phase"),
    ("/goto:JUDGMENT", "Jump to the judgment phase"),
    ("/goto:SYNTOPICAL", "Jump to the syntopical phase"),
    ("/set:XP:<n>", "Set total XP (level follows)"),
    ("/set:LEVEL:<n>", "Set level (XP moves to the level floor)"),
    ("/set:MANA:<n>", "Set mana (0-100)"),
    ("/set:PHASE:<phase>", "Set the current phase"),
    ("/debug:add_topics", "Add sample topic data"),
    ("/exit_debug", "Leave debug mode"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    #[error("unknown phase {0:?}; expected one of SCOUTING, HUNTING, ALCHEMY, JUDGMENT, SYNTOPICAL")]
    UnknownPhase(String),
    #[error("unknown setting {0:?}; expected XP, LEVEL, MANA or PHASE")]
    UnknownKey(String),
    #[error("malformed set command {0:?}; expected /set:<KEY>:<VALUE>")]
    MalformedSet(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("unknown debug command {0:?}")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetField {
    Xp(u32),
    Level(u32),
    Mana(i32),
    Phase(GamePhase),
}

impl SetField {
    fn parse(key: &str, value: &str) -> Result<Self, DebugError> {
        let invalid = |key: &'static str| DebugError::InvalidValue {
            key,
            value: value.to_string(),
        };
        match key {
            "xp" => value.parse().map(Self::Xp).map_err(|_| invalid("XP")),
            "level" => value.parse().map(Self::Level).map_err(|_| invalid("LEVEL")),
            "mana" => value.parse().map(Self::Mana).map_err(|_| invalid("MANA")),
            "phase" => value
                .parse()
                .map(Self::Phase)
                .map_err(|()| DebugError::UnknownPhase(value.to_ascii_uppercase())),
            other => Err(DebugError::UnknownKey(other.to_ascii_uppercase())),
        }
    }
}

impl fmt::Display for SetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xp(xp) => write!(f, "XP = {xp}"),
            Self::Level(level) => write!(f, "LEVEL = {level}"),
            Self::Mana(mana) => write!(f, "MANA = {mana}"),
            Self::Phase(phase) => write!(f, "PHASE = {phase}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Menu,
    Goto(GamePhase),
    Set(SetField),
    AddTopics,
    Exit,
}

/// What applying a command did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DebugEffect {
    ShowMenu,
    StateChanged { state: GameState, message: String },
    AddTopics,
    ExitDebug,
}

impl DebugCommand {
    /// Parse raw console input. Input that is not a debug command yields `None`.
    ///
    /// # Errors
    ///
    /// Returns a [`DebugError`] for debug-shaped input that cannot be honoured.
    pub fn parse(input: &str) -> Result<Option<Self>, DebugError> {
        let cmd = input.trim().to_ascii_lowercase();

        if cmd == MENU || cmd == MENU_BARE {
            return Ok(Some(Self::Menu));
        }
        if cmd == ADD_TOPICS {
            return Ok(Some(Self::AddTopics));
        }
        if cmd == EXIT {
            return Ok(Some(Self::Exit));
        }
        if let Some(phase) = cmd.strip_prefix(GOTO_PREFIX) {
            return phase
                .parse()
                .map(|phase| Some(Self::Goto(phase)))
                .map_err(|()| DebugError::UnknownPhase(phase.to_ascii_uppercase()));
        }
        if let Some(rest) = cmd.strip_prefix(SET_PREFIX) {
            let parts: Vec<&str> = rest.split(':').collect();
            let [key, value] = parts.as_slice() else {
                return Err(DebugError::MalformedSet(input.trim().to_string()));
            };
            return SetField::parse(key, value).map(|field| Some(Self::Set(field)));
        }
        if cmd.starts_with(MENU) {
            return Err(DebugError::UnknownCommand(input.trim().to_string()));
        }
        Ok(None)
    }

    /// Apply the command to `state`, bypassing all progression gates.
    #[must_use]
    pub fn apply(self, state: &GameState) -> DebugEffect {
        match self {
            Self::Menu => DebugEffect::ShowMenu,
            Self::AddTopics => DebugEffect::AddTopics,
            Self::Exit => DebugEffect::ExitDebug,
            Self::Goto(phase) => DebugEffect::StateChanged {
                state: GameState {
                    current_phase: phase,
                    current_chapter: 1,
                    combo_count: 0,
                    consecutive_failures: 0,
                    ..state.clone()
                },
                message: format!("Jumped to phase: {phase}"),
            },
            Self::Set(field) => {
                let mut next = state.clone();
                match field {
                    SetField::Xp(xp) => {
                        next.xp_total = xp;
                        next.level = level_for_xp(xp).level;
                    }
                    SetField::Level(level) => {
                        let entry = level_entry(level);
                        next.level = entry.level;
                        next.xp_total = entry.xp_required;
                    }
                    SetField::Mana(mana) => next.mana = mana.clamp(MANA_MIN, MANA_MAX),
                    SetField::Phase(phase) => next.current_phase = phase,
                }
                log::debug!("debug override {field}");
                DebugEffect::StateChanged {
                    state: next,
                    message: format!("Set {field}"),
                }
            }
        }
    }
}
