//! Final session rating
//!
//! The rating is never stored: it is recomputed from the hit set whenever a
//! session ends.

use std::collections::HashSet;
use std::fmt;

use marksconf::AchievementConfig;
use serde::{Deserialize, Serialize};

/// Qualitative rank, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    Excellent,
    Good,
    Pass,
    NotAchieved,
}

impl Achievement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Achievement::Excellent => "excellent",
            Achievement::Good => "good",
            Achievement::Pass => "pass",
            Achievement::NotAchieved => "not_achieved",
        }
    }
}

impl fmt::Display for Achievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and the high-value marker used by [`AchievementRules::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementRules {
    pub top_hits: usize,
    pub second_hits: usize,
    pub third_hits: usize,
    pub high_value_marker: String,
}

impl AchievementRules {
    pub fn is_high_value(&self, label: &str) -> bool {
        label.contains(&self.high_value_marker)
    }

    /// Rate a set of distinct hit targets.
    ///
    /// The second rank needs exactly `second_hits` targets including the
    /// high-value one; without it the same count only reaches the third rank.
    pub fn classify(&self, hits: &HashSet<String>) -> Achievement {
        let count = hits.len();
        if count >= self.top_hits {
            return Achievement::Excellent;
        }
        if count == self.second_hits && hits.iter().any(|label| self.is_high_value(label)) {
            return Achievement::Good;
        }
        if count >= self.third_hits {
            return Achievement::Pass;
        }
        Achievement::NotAchieved
    }
}

impl Default for AchievementRules {
    fn default() -> Self {
        Self::from(&AchievementConfig::default())
    }
}

impl From<&AchievementConfig> for AchievementRules {
    fn from(config: &AchievementConfig) -> Self {
        Self {
            top_hits: config.top_hits,
            second_hits: config.second_hits,
            third_hits: config.third_hits,
            high_value_marker: config.high_value_marker.clone(),
        }
    }
}
