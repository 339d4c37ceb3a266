//! Pure formulas deriving prices and income from a [`GameState`].
//!
//! Nothing here is cached in the state; every value is recomputed on demand.

use serde::Serialize;

use crate::{
    catalog::{Catalog, Channel, ResearchKind, UpgradeDef},
    models::GameState,
};

/// Lifetime earnings required before a prestige reset yields anything.
pub const PRESTIGE_THRESHOLD: f64 = 1_000_000.0;
/// Shards granted per unit of `sqrt(earned / threshold)`.
pub const PRESTIGE_SCALE: f64 = 10.0;
/// Income bonus per lifetime shard.
pub const SHARD_BONUS: f64 = 0.01;

/// Undiscounted price of buying level `level + 1`.
pub fn purchase_cost(def: &UpgradeDef, level: u32) -> f64 {
    (def.base_cost * def.cost_multiplier.powf(f64::from(level))).floor()
}

/// Multiplicative price factor from owned cost-reduction research.
pub fn cost_discount(state: &GameState, catalog: &Catalog) -> f64 {
    catalog
        .research_items()
        .filter(|def| def.kind == ResearchKind::CostReduction)
        .map(|def| (1.0 - def.power).max(0.0).powf(f64::from(state.research_level(&def.id))))
        .product()
}

/// Price actually charged for level `level + 1`, never below 1.
pub fn effective_cost(def: &UpgradeDef, level: u32, state: &GameState, catalog: &Catalog) -> f64 {
    (purchase_cost(def, level) * cost_discount(state, catalog))
        .floor()
        .max(1.0)
}

/// Combined price of `quantity` consecutive levels starting at `level`.
pub fn bulk_cost(
    def: &UpgradeDef,
    level: u32,
    quantity: u32,
    state: &GameState,
    catalog: &Catalog,
) -> f64 {
    (0..quantity)
        .map(|offset| effective_cost(def, level.saturating_add(offset), state, catalog))
        .sum()
}

/// Whether the next `quantity` levels of upgrade `id` are affordable right now.
pub fn can_afford(state: &GameState, catalog: &Catalog, id: &str, quantity: u32) -> bool {
    catalog.upgrade(id).is_some_and(|def| {
        state.currency() >= bulk_cost(def, state.upgrade_level(id), quantity, state, catalog)
    })
}

/// Sum of `level × power` over upgrades feeding `channel`.
pub fn upgrade_bonus(state: &GameState, catalog: &Catalog, channel: Channel) -> f64 {
    catalog
        .upgrades()
        .filter(|def| def.kind.channel() == channel)
        .map(|def| f64::from(state.upgrade_level(&def.id)) * def.power)
        .sum()
}

/// `1 + Σ level × power` over research multiplying `channel`.
pub fn research_factor(state: &GameState, catalog: &Catalog, channel: Channel) -> f64 {
    1.0 + catalog
        .research_items()
        .filter(|def| def.kind.channel() == Some(channel))
        .map(|def| f64::from(state.research_level(&def.id)) * def.power)
        .sum::<f64>()
}

/// Each lifetime shard adds 1% to every channel.
pub fn prestige_multiplier(state: &GameState) -> f64 {
    1.0 + state.prestige_currency() as f64 * SHARD_BONUS
}

/// Floored income of `channel` after every bonus and multiplier.
pub fn power(state: &GameState, catalog: &Catalog, channel: Channel) -> f64 {
    ((channel.base_power() + upgrade_bonus(state, catalog, channel))
        * research_factor(state, catalog, channel)
        * prestige_multiplier(state))
    .floor()
}

/// Currency granted by one manual click.
pub fn click_power(state: &GameState, catalog: &Catalog) -> f64 {
    power(state, catalog, Channel::Click)
}

/// Currency granted per second by generators.
pub fn auto_power(state: &GameState, catalog: &Catalog) -> f64 {
    power(state, catalog, Channel::Auto)
}

/// Shards a prestige reset would grant now.
///
/// Zero below [`PRESTIGE_THRESHOLD`]; past it the lifetime entitlement grows
/// with the square root of lifetime earnings, minus what was already granted.
pub fn pending_prestige_gain(state: &GameState) -> u64 {
    let earned = state.total_currency_earned();
    if earned.is_nan() || earned < PRESTIGE_THRESHOLD {
        return 0;
    }
    let entitled = ((earned / PRESTIGE_THRESHOLD).sqrt() * PRESTIGE_SCALE).floor();
    // f64 -> u64 casts saturate.
    (entitled as u64).saturating_sub(state.prestige_currency())
}

/// Shards available for research.
pub fn available_shards(state: &GameState) -> u64 {
    state.prestige_currency().saturating_sub(state.prestige_spent())
}

/// Derived figures shown next to the raw state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// See [`click_power`].
    pub click_power: f64,
    /// See [`auto_power`].
    pub auto_power: f64,
    /// See [`prestige_multiplier`].
    pub prestige_multiplier: f64,
    /// See [`pending_prestige_gain`].
    pub pending_prestige_gain: u64,
    /// See [`available_shards`].
    pub available_shards: u64,
}

impl Stats {
    /// Compute every derived figure for `state`.
    pub fn compute(state: &GameState, catalog: &Catalog) -> Self {
        Self {
            click_power: click_power(state, catalog),
            auto_power: auto_power(state, catalog),
            prestige_multiplier: prestige_multiplier(state),
            pending_prestige_gain: pending_prestige_gain(state),
            available_shards: available_shards(state),
        }
    }
}
