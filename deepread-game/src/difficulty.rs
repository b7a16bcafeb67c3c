//! Difficulty tiers and their tuning tables.
//!
//! Lookups never fail: an unrecognized difficulty name resolves to
//! [`DifficultyId::Master`].
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::DEFAULT_MIN_GROUP_SIZE;
use crate::numbers::round_f64_to_u32;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyId {
    Beginner,
    Apprentice,
    #[default]
    Master,
    Expert,
}

impl DifficultyId {
    pub const ALL: &'static [Self] = &[Self::Beginner, Self::Apprentice, Self::Master, Self::Expert];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Apprentice => "apprentice",
            Self::Master => "master",
            Self::Expert => "expert",
        }
    }

    /// Resolve a free-form difficulty name, falling back to the default tier.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|()| {
            log::debug!("unknown difficulty {name:?}, using {}", Self::default());
            Self::default()
        })
    }

    #[must_use]
    pub fn config(self) -> &'static DifficultyConfig {
        match self {
            Self::Beginner => &BEGINNER,
            Self::Apprentice => &APPRENTICE,
            Self::Master => &MASTER,
            Self::Expert => &EXPERT,
        }
    }
}

impl fmt::Display for DifficultyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "apprentice" => Ok(Self::Apprentice),
            "master" => Ok(Self::Master),
            "expert" => Ok(Self::Expert),
            _ => Err(()),
        }
    }
}

/// Inventory counts required to leave the Hunting and Alchemy phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressThresholds {
    pub terms: usize,
    pub propositions: usize,
    pub arguments: usize,
}

/// Unlock rules for the optional cross-book (syntopical) tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedModeConfig {
    pub enabled: bool,
    pub min_group_size: usize,
    pub require_prior_phase_complete: bool,
}

impl AdvancedModeConfig {
    pub const DISABLED: Self = Self {
        enabled: false,
        min_group_size: DEFAULT_MIN_GROUP_SIZE,
        require_prior_phase_complete: true,
    };
}

impl Default for AdvancedModeConfig {
    fn default() -> Self {
        Self::DISABLED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifficultyConfig {
    pub id: DifficultyId,
    pub name: &'static str,
    pub xp_multiplier: f64,
    pub mana_recovery: i32,
    pub hints_available: bool,
    pub thresholds: ProgressThresholds,
    pub advanced_mode: Option<AdvancedModeConfig>,
}

const BEGINNER: DifficultyConfig = DifficultyConfig {
    id: DifficultyId::Beginner,
    name: "Beginner",
    xp_multiplier: 0.5,
    mana_recovery: 40,
    hints_available: true,
    thresholds: ProgressThresholds {
        terms: 3,
        propositions: 2,
        arguments: 1,
    },
    advanced_mode: None,
};

const APPRENTICE: DifficultyConfig = DifficultyConfig {
    id: DifficultyId::Apprentice,
    name: "Apprentice",
    xp_multiplier: 0.75,
    mana_recovery: 30,
    hints_available: true,
    thresholds: ProgressThresholds {
        terms: 4,
        propositions: 3,
        arguments: 1,
    },
    advanced_mode: None,
};

const MASTER: DifficultyConfig = DifficultyConfig {
    id: DifficultyId::Master,
    name: "Master",
    xp_multiplier: 1.0,
    mana_recovery: 25,
    hints_available: false,
    thresholds: ProgressThresholds {
        terms: 5,
        propositions: 3,
        arguments: 1,
    },
    advanced_mode: None,
};

const EXPERT: DifficultyConfig = DifficultyConfig {
    id: DifficultyId::Expert,
    name: "Expert",
    xp_multiplier: 1.5,
    mana_recovery: 20,
    hints_available: false,
    thresholds: ProgressThresholds {
        terms: 7,
        propositions: 5,
        arguments: 2,
    },
    advanced_mode: Some(AdvancedModeConfig {
        enabled: true,
        min_group_size: 2,
        require_prior_phase_complete: true,
    }),
};

/// Look up a difficulty by name; unknown names use the default tier.
#[must_use]
pub fn config(name: &str) -> &'static DifficultyConfig {
    DifficultyId::from_name(name).config()
}

/// Scale a base XP reward by the tier's multiplier.
#[must_use]
pub fn compute_xp(base_xp: u32, difficulty: DifficultyId) -> u32 {
    round_f64_to_u32(f64::from(base_xp) * difficulty.config().xp_multiplier)
}

/// Mana restored by a rest. A fixed per-tier amount.
#[must_use]
pub fn compute_mana_recovery(difficulty: DifficultyId) -> i32 {
    difficulty.config().mana_recovery
}

#[must_use]
pub fn thresholds_for(difficulty: DifficultyId) -> ProgressThresholds {
    difficulty.config().thresholds
}

#[must_use]
pub fn hints_available(difficulty: DifficultyId) -> bool {
    difficulty.config().hints_available
}

#[must_use]
pub fn advanced_mode(difficulty: DifficultyId) -> AdvancedModeConfig {
    difficulty.config().advanced_mode.unwrap_or_default()
}

#[must_use]
pub fn is_advanced_enabled(difficulty: DifficultyId) -> bool {
    advanced_mode(difficulty).enabled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_fall_back_to_master() {
        assert_eq!(DifficultyId::from_name("nightmare"), DifficultyId::Master);
        assert_eq!(config("").id, DifficultyId::Master);
        assert_eq!(DifficultyId::from_name(" Expert "), DifficultyId::Expert);
    }

    #[test]
    fn xp_scales_and_rounds() {
        assert_eq!(compute_xp(50, DifficultyId::Beginner), 25);
        assert_eq!(compute_xp(25, DifficultyId::Apprentice), 19);
        assert_eq!(compute_xp(30, DifficultyId::Master), 30);
        assert_eq!(compute_xp(25, DifficultyId::Expert), 38);
    }

    #[test]
    fn mana_recovery_is_fixed_per_tier() {
        assert_eq!(compute_mana_recovery(DifficultyId::Beginner), 40);
        assert_eq!(compute_mana_recovery(DifficultyId::Expert), 20);
    }

    #[test]
    fn only_expert_enables_advanced_mode() {
        for id in DifficultyId::ALL {
            assert_eq!(is_advanced_enabled(*id), *id == DifficultyId::Expert);
        }
        assert_eq!(advanced_mode(DifficultyId::Master), AdvancedModeConfig::DISABLED);
        assert_eq!(thresholds_for(DifficultyId::Expert).arguments, 2);
        assert!(hints_available(DifficultyId::Beginner));
        assert!(!hints_available(DifficultyId::Master));
    }

    #[test]
    fn ids_roundtrip_through_strings() {
        for id in DifficultyId::ALL {
            assert_eq!(id.as_str().parse::<DifficultyId>(), Ok(*id));
            assert_eq!(id.to_string(), id.as_str());
        }
    }
}
