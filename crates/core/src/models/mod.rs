//! Shared domain models.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Visual theme selected by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Default look.
    #[default]
    Neon,
    /// Green-on-black.
    Matrix,
    /// Plain palette.
    Classic,
}

impl Theme {
    /// Parse a stored theme name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "neon" => Some(Theme::Neon),
            "matrix" => Some(Theme::Matrix),
            "classic" => Some(Theme::Classic),
            _ => None,
        }
    }
}

/// Cosmetic preferences; no effect on the economy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Show the "+N" text that floats up after a click.
    pub show_floating_text: bool,
    /// Play UI animations.
    pub enable_animations: bool,
    /// Active theme.
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_floating_text: true,
            enable_animations: true,
            theme: Theme::Neon,
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    /// New floating-text toggle.
    pub show_floating_text: Option<bool>,
    /// New animation toggle.
    pub enable_animations: Option<bool>,
    /// New theme.
    pub theme: Option<Theme>,
}

impl Settings {
    /// Merge the keys present in `patch`.
    pub fn merged(self, patch: &SettingsPatch) -> Self {
        Self {
            show_floating_text: patch.show_floating_text.unwrap_or(self.show_floating_text),
            enable_animations: patch.enable_animations.unwrap_or(self.enable_animations),
            theme: patch.theme.unwrap_or(self.theme),
        }
    }
}

/// Progress of a single player.
///
/// Values only change through the functions in [`crate::transition`]; stored
/// documents are turned into a `GameState` by [`crate::save::migrate`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub(crate) currency: f64,
    pub(crate) total_currency_earned: f64,
    pub(crate) click_count: u64,
    #[serde(rename = "upgrades")]
    pub(crate) upgrade_levels: BTreeMap<String, u32>,
    #[serde(rename = "research")]
    pub(crate) research_levels: BTreeMap<String, u32>,
    pub(crate) prestige_currency: u64,
    pub(crate) prestige_spent: u64,
    pub(crate) prestige_count: u32,
    pub(crate) settings: Settings,
    pub(crate) last_save: i64,
}

impl GameState {
    /// Fresh game with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spendable balance.
    pub fn currency(&self) -> f64 {
        self.currency
    }

    /// Lifetime earnings; never reset.
    pub fn total_currency_earned(&self) -> f64 {
        self.total_currency_earned
    }

    /// Manual clicks performed over the lifetime of the save.
    pub fn click_count(&self) -> u64 {
        self.click_count
    }

    /// Owned level of an upgrade; unknown ids are level 0.
    pub fn upgrade_level(&self, id: &str) -> u32 {
        self.upgrade_levels.get(id).copied().unwrap_or(0)
    }

    /// Owned level of a research item; unknown ids are level 0.
    pub fn research_level(&self, id: &str) -> u32 {
        self.research_levels.get(id).copied().unwrap_or(0)
    }

    /// Owned upgrade levels keyed by upgrade id.
    pub fn upgrade_levels(&self) -> &BTreeMap<String, u32> {
        &self.upgrade_levels
    }

    /// Owned research levels keyed by research id.
    pub fn research_levels(&self) -> &BTreeMap<String, u32> {
        &self.research_levels
    }

    /// Lifetime prestige currency; drives the prestige multiplier.
    pub fn prestige_currency(&self) -> u64 {
        self.prestige_currency
    }

    /// Prestige currency already spent on research.
    pub fn prestige_spent(&self) -> u64 {
        self.prestige_spent
    }

    /// Number of prestige resets performed.
    pub fn prestige_count(&self) -> u32 {
        self.prestige_count
    }

    /// Cosmetic preferences.
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Epoch milliseconds of the last acknowledged save, 0 if never saved.
    pub fn last_save(&self) -> i64 {
        self.last_save
    }

    /// [`GameState::last_save`] as a timestamp.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        if self.last_save <= 0 {
            return None;
        }
        Utc.timestamp_millis_opt(self.last_save).single()
    }

    pub(crate) fn with_last_save(mut self, millis: i64) -> Self {
        self.last_save = millis;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_levels_are_zero() {
        let mut state = GameState::new();
        state.upgrade_levels.insert("basic_click".to_string(), 3);
        assert_eq!(state.upgrade_level("basic_click"), 3);
        assert_eq!(state.upgrade_level("factory"), 0);
        assert_eq!(state.research_level("optimized_synapse"), 0);
    }

    #[test]
    fn patch_merges_present_keys_only() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            theme: Some(Theme::Matrix),
            ..SettingsPatch::default()
        };
        let merged = settings.merged(&patch);
        assert_eq!(merged.theme, Theme::Matrix);
        assert!(merged.show_floating_text);
        assert!(merged.enable_animations);
    }

    #[test]
    fn patch_ignores_unrecognised_keys() {
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"enableAnimations":false,"volume":11}"#).expect("patch");
        assert_eq!(patch.enable_animations, Some(false));
        assert_eq!(patch.theme, None);
    }

    #[test]
    fn never_saved_has_no_timestamp() {
        let state = GameState::new();
        assert!(state.last_saved_at().is_none());
        let saved = state.with_last_save(1_776_000_000_000);
        assert!(saved.last_saved_at().is_some());
    }
}
