//! Static definitions of everything a player can buy.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Income stream an effect feeds into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Currency granted per manual click.
    Click,
    /// Currency granted per second by generators.
    Auto,
}

impl Channel {
    /// Power of the channel before any upgrade is bought.
    pub fn base_power(self) -> f64 {
        match self {
            Channel::Click => 1.0,
            Channel::Auto => 0.0,
        }
    }
}

/// Effect of an upgrade level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeKind {
    /// Adds `power` to click power per level.
    ClickBonus,
    /// Adds `power` to auto power per level.
    AutoBonus,
}

impl UpgradeKind {
    /// Channel the bonus is added to.
    pub fn channel(self) -> Channel {
        match self {
            UpgradeKind::ClickBonus => Channel::Click,
            UpgradeKind::AutoBonus => Channel::Auto,
        }
    }
}

/// Effect of a research level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchKind {
    /// Multiplies click power by `1 + level × power`.
    ClickMultiplier,
    /// Multiplies auto power by `1 + level × power`.
    AutoMultiplier,
    /// Discounts upgrade prices by `(1 − power)^level`.
    CostReduction,
}

impl ResearchKind {
    /// Channel the multiplier applies to, `None` for price effects.
    pub fn channel(self) -> Option<Channel> {
        match self {
            ResearchKind::ClickMultiplier => Some(Channel::Click),
            ResearchKind::AutoMultiplier => Some(Channel::Auto),
            ResearchKind::CostReduction => None,
        }
    }
}

/// Upgrade bought with currency; price grows geometrically per level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDef {
    /// Unique identifier used as the key in saved upgrade levels.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Price of the first level.
    pub base_cost: f64,
    /// Growth factor applied to the price per owned level.
    pub cost_multiplier: f64,
    /// Bonus granted per level.
    pub power: f64,
    /// What the bonus applies to.
    pub kind: UpgradeKind,
}

/// Permanent research bought with prestige currency at a flat price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchDef {
    /// Unique identifier used as the key in saved research levels.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Prestige currency spent per level.
    pub cost: u64,
    /// Fractional effect per level.
    pub power: f64,
    /// What the effect applies to.
    pub kind: ResearchKind,
}

/// Reasons a catalog is rejected at construction.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    /// Two definitions share an id.
    #[error("duplicate catalog id `{0}`")]
    DuplicateId(String),
    /// Base cost is not a positive whole number.
    #[error("upgrade `{0}` must have a positive whole base cost")]
    InvalidBaseCost(String),
    /// Cost multiplier does not grow the price.
    #[error("upgrade `{0}` must have a cost multiplier above 1")]
    InvalidCostMultiplier(String),
    /// Power is negative or not finite.
    #[error("`{0}` must have a non-negative power")]
    InvalidPower(String),
    /// Research priced at zero.
    #[error("research `{0}` must cost at least one shard")]
    InvalidResearchCost(String),
    /// A cost reduction of 100% or more per level.
    #[error("research `{0}` cannot reduce costs by 100% or more per level")]
    InvalidReduction(String),
}

/// Immutable set of upgrade and research definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    upgrades: Vec<UpgradeDef>,
    research: Vec<ResearchDef>,
}

static STANDARD: Lazy<Catalog> = Lazy::new(|| {
    Catalog::new(standard_upgrades(), standard_research()).expect("invalid built-in catalog")
});

impl Catalog {
    /// Validate and build a catalog.
    pub fn new(
        upgrades: Vec<UpgradeDef>,
        research: Vec<ResearchDef>,
    ) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for def in &upgrades {
            if !seen.insert(def.id.as_str()) {
                return Err(CatalogError::DuplicateId(def.id.clone()));
            }
            // Prices are floored, so a fractional base would undercut itself.
            if !def.base_cost.is_finite()
                || def.base_cost <= 0.0
                || def.base_cost.fract() != 0.0
            {
                return Err(CatalogError::InvalidBaseCost(def.id.clone()));
            }
            if !def.cost_multiplier.is_finite() || def.cost_multiplier <= 1.0 {
                return Err(CatalogError::InvalidCostMultiplier(def.id.clone()));
            }
            if !def.power.is_finite() || def.power < 0.0 {
                return Err(CatalogError::InvalidPower(def.id.clone()));
            }
        }
        for def in &research {
            if !seen.insert(def.id.as_str()) {
                return Err(CatalogError::DuplicateId(def.id.clone()));
            }
            if def.cost == 0 {
                return Err(CatalogError::InvalidResearchCost(def.id.clone()));
            }
            if !def.power.is_finite() || def.power < 0.0 {
                return Err(CatalogError::InvalidPower(def.id.clone()));
            }
            if def.kind == ResearchKind::CostReduction && def.power >= 1.0 {
                return Err(CatalogError::InvalidReduction(def.id.clone()));
            }
        }
        Ok(Self { upgrades, research })
    }

    /// The catalog shipped with the game.
    pub fn standard() -> &'static Catalog {
        &STANDARD
    }

    /// Look up an upgrade by id.
    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|def| def.id == id)
    }

    /// Look up a research item by id.
    pub fn research(&self, id: &str) -> Option<&ResearchDef> {
        self.research.iter().find(|def| def.id == id)
    }

    /// All upgrades in display order.
    pub fn upgrades(&self) -> impl Iterator<Item = &UpgradeDef> {
        self.upgrades.iter()
    }

    /// All research items in display order.
    pub fn research_items(&self) -> impl Iterator<Item = &ResearchDef> {
        self.research.iter()
    }
}

fn upgrade(
    id: &str,
    name: &str,
    description: &str,
    base_cost: f64,
    cost_multiplier: f64,
    power: f64,
    kind: UpgradeKind,
) -> UpgradeDef {
    UpgradeDef {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        base_cost,
        cost_multiplier,
        power,
        kind,
    }
}

fn standard_upgrades() -> Vec<UpgradeDef> {
    use UpgradeKind::{AutoBonus, ClickBonus};
    vec![
        upgrade(
            "basic_click",
            "Sharpened Finger",
            "Increases click power by 1.",
            10.0,
            1.15,
            1.0,
            ClickBonus,
        ),
        upgrade(
            "auto_clicker",
            "Nano-Bot",
            "Clicks for you once every second.",
            50.0,
            1.15,
            1.0,
            AutoBonus,
        ),
        upgrade(
            "mega_click",
            "Hydraulic Press",
            "Increases click power by 10.",
            500.0,
            1.2,
            10.0,
            ClickBonus,
        ),
        upgrade(
            "factory",
            "Click Factory",
            "Generates 25 clicks per second.",
            2_000.0,
            1.18,
            25.0,
            AutoBonus,
        ),
        upgrade(
            "quantum_processor",
            "Quantum Processor",
            "Generates 150 clicks per second.",
            15_000.0,
            1.22,
            150.0,
            AutoBonus,
        ),
        upgrade(
            "data_store",
            "Neural DataStore",
            "A massive array of servers generating 1000 clicks per second.",
            100_000.0,
            1.25,
            1_000.0,
            AutoBonus,
        ),
        upgrade(
            "dyson_swarm",
            "Dyson Swarm",
            "Harness the power of a star to generate 5000 clicks per second.",
            1_000_000.0,
            1.3,
            5_000.0,
            AutoBonus,
        ),
        upgrade(
            "galactic_network",
            "Galactic Network",
            "Connect the galaxy to generate 25000 clicks per second.",
            10_000_000.0,
            1.35,
            25_000.0,
            AutoBonus,
        ),
    ]
}

fn standard_research() -> Vec<ResearchDef> {
    vec![
        ResearchDef {
            id: "optimized_synapse".to_string(),
            name: "Optimized Synapse".to_string(),
            description: "Increases click power by 25% per level.".to_string(),
            cost: 10,
            power: 0.25,
            kind: ResearchKind::ClickMultiplier,
        },
        ResearchDef {
            id: "parallel_processing".to_string(),
            name: "Parallel Processing".to_string(),
            description: "Increases auto-income by 25% per level.".to_string(),
            cost: 25,
            power: 0.25,
            kind: ResearchKind::AutoMultiplier,
        },
        ResearchDef {
            id: "efficient_coding".to_string(),
            name: "Efficient Coding".to_string(),
            description: "Reduces upgrade costs by 5% per level.".to_string(),
            cost: 50,
            power: 0.05,
            kind: ResearchKind::CostReduction,
        },
    ]
}
