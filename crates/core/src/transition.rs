//! Player actions as pure `GameState -> GameState` steps.
//!
//! Every step takes the current state by value, re-validates against it, and
//! hands back either the successor or the untouched input with the reason it
//! was left alone. No step panics or fails.

use serde::{Deserialize, Serialize};

use crate::{
    catalog::Catalog,
    economy,
    models::{GameState, SettingsPatch},
};

/// Why a step left the state unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum NoOp {
    /// Upgrade id not in the catalog.
    UnknownUpgrade(String),
    /// Research id not in the catalog.
    UnknownResearch(String),
    /// Balance short of the price.
    Unaffordable {
        /// Price that was asked.
        cost: f64,
        /// Balance at evaluation time.
        balance: f64,
    },
    /// Prestige would grant no shards.
    NothingToGain,
    /// Tick with no passive income or no elapsed time.
    NoIncome,
}

/// Result of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The step was applied.
    Applied(GameState),
    /// The step was rejected; the input is returned as-is.
    Unchanged(GameState, NoOp),
}

impl Transition {
    /// Whether the step changed anything.
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    /// Borrow the resulting state.
    pub fn state(&self) -> &GameState {
        match self {
            Transition::Applied(state) | Transition::Unchanged(state, _) => state,
        }
    }

    /// Consume into the resulting state.
    pub fn into_state(self) -> GameState {
        match self {
            Transition::Applied(state) | Transition::Unchanged(state, _) => state,
        }
    }

    /// Rejection reason, if any.
    pub fn no_op(&self) -> Option<&NoOp> {
        match self {
            Transition::Applied(_) => None,
            Transition::Unchanged(_, reason) => Some(reason),
        }
    }
}

/// Multi-buy step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuyAmount {
    /// Single level.
    #[default]
    #[serde(rename = "1")]
    One,
    /// Ten levels.
    #[serde(rename = "10")]
    Ten,
    /// One hundred levels.
    #[serde(rename = "100")]
    Hundred,
}

impl BuyAmount {
    /// Number of levels bought.
    pub fn quantity(self) -> u32 {
        match self {
            BuyAmount::One => 1,
            BuyAmount::Ten => 10,
            BuyAmount::Hundred => 100,
        }
    }
}

/// Manual click; returns the successor and the amount dispensed.
pub fn apply_click(mut state: GameState, catalog: &Catalog) -> (GameState, f64) {
    let value = economy::click_power(&state, catalog);
    state.currency += value;
    state.total_currency_earned += value;
    state.click_count = state.click_count.saturating_add(1);
    (state, value)
}

/// Credit `auto_power × elapsed_seconds` of passive income.
pub fn apply_tick(mut state: GameState, catalog: &Catalog, elapsed_seconds: f64) -> Transition {
    let rate = economy::auto_power(&state, catalog);
    if rate <= 0.0 || !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
        return Transition::Unchanged(state, NoOp::NoIncome);
    }
    let gain = rate * elapsed_seconds;
    state.currency += gain;
    state.total_currency_earned += gain;
    Transition::Applied(state)
}

/// Buy one level of upgrade `id`.
pub fn purchase_upgrade(state: GameState, catalog: &Catalog, id: &str) -> Transition {
    purchase_upgrades(state, catalog, id, BuyAmount::One)
}

/// Buy `amount` levels of upgrade `id`, all or nothing.
pub fn purchase_upgrades(
    mut state: GameState,
    catalog: &Catalog,
    id: &str,
    amount: BuyAmount,
) -> Transition {
    let Some(def) = catalog.upgrade(id) else {
        return Transition::Unchanged(state, NoOp::UnknownUpgrade(id.to_string()));
    };
    let level = state.upgrade_level(id);
    let quantity = amount.quantity();
    let cost = economy::bulk_cost(def, level, quantity, &state, catalog);
    if state.currency < cost {
        let balance = state.currency;
        return Transition::Unchanged(state, NoOp::Unaffordable { cost, balance });
    }
    state.currency = (state.currency - cost).max(0.0);
    state
        .upgrade_levels
        .insert(def.id.clone(), level.saturating_add(quantity));
    Transition::Applied(state)
}

/// Buy one level of research `id` with unspent shards.
pub fn purchase_research(mut state: GameState, catalog: &Catalog, id: &str) -> Transition {
    let Some(def) = catalog.research(id) else {
        return Transition::Unchanged(state, NoOp::UnknownResearch(id.to_string()));
    };
    let available = economy::available_shards(&state);
    if available < def.cost {
        return Transition::Unchanged(
            state,
            NoOp::Unaffordable {
                cost: def.cost as f64,
                balance: available as f64,
            },
        );
    }
    state.prestige_spent += def.cost;
    let level = state.research_level(id);
    state
        .research_levels
        .insert(def.id.clone(), level.saturating_add(1));
    Transition::Applied(state)
}

/// Trade currency and upgrades for shards.
///
/// Lifetime earnings, research, clicks and settings carry over.
pub fn perform_prestige(mut state: GameState) -> Transition {
    let gain = economy::pending_prestige_gain(&state);
    if gain == 0 {
        return Transition::Unchanged(state, NoOp::NothingToGain);
    }
    state.currency = 0.0;
    state.upgrade_levels.clear();
    state.prestige_currency += gain;
    state.prestige_count = state.prestige_count.saturating_add(1);
    Transition::Applied(state)
}

/// Merge cosmetic settings.
pub fn update_settings(mut state: GameState, patch: &SettingsPatch) -> GameState {
    state.settings = state.settings.merged(patch);
    state
}
