//! Upgrading stored documents to the current schema.
//!
//! Three shapes have shipped:
//!
//! 1. currency, lifetime earnings, clicks, upgrades, lastSave
//! 2. adds `settings`, `prestigeCurrency`, `prestigeCount`
//! 3. adds `research`, `prestigeSpent` and the `schemaVersion` stamp
//!
//! Documents written before the stamp are classified by the fields they carry.
//! After the migration steps run, every field is decoded defensively so that no
//! stored value, however mangled, produces a NaN or negative number.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::models::{GameState, Settings, Theme};

/// Known schema revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// First shape, without settings or prestige.
    Base = 1,
    /// Settings and prestige fields.
    Prestige = 2,
    /// Research and shard spending.
    Research = 3,
}

impl SchemaVersion {
    /// Revision written by this build.
    pub const CURRENT: SchemaVersion = SchemaVersion::Research;

    /// Numeric stamp stored in `schemaVersion`.
    pub fn number(self) -> u32 {
        self as u32
    }

    fn from_number(number: u64) -> Option<Self> {
        match number {
            1 => Some(SchemaVersion::Base),
            2 => Some(SchemaVersion::Prestige),
            3 => Some(SchemaVersion::Research),
            _ => None,
        }
    }

    fn next(self) -> Option<Self> {
        match self {
            SchemaVersion::Base => Some(SchemaVersion::Prestige),
            SchemaVersion::Prestige => Some(SchemaVersion::Research),
            SchemaVersion::Research => None,
        }
    }

    /// Classify a document by its stamp, falling back to the fields present.
    ///
    /// Returns `Err` with the stamp when the document comes from a newer build.
    pub fn detect(document: &Map<String, Value>) -> Result<Self, u64> {
        let stamp = document
            .get("schemaVersion")
            .and_then(|value| coerce_number(Some(value)))
            .map(|value| value.floor() as u64);
        if let Some(stamp) = stamp {
            if let Some(version) = Self::from_number(stamp) {
                return Ok(version);
            }
            if stamp > u64::from(Self::CURRENT.number()) {
                return Err(stamp);
            }
        }

        if document.contains_key("research") || document.contains_key("prestigeSpent") {
            Ok(SchemaVersion::Research)
        } else if document.contains_key("settings")
            || document.contains_key("prestigeCurrency")
            || document.contains_key("prestigeCount")
        {
            Ok(SchemaVersion::Prestige)
        } else {
            Ok(SchemaVersion::Base)
        }
    }
}

/// Bring a document of any revision up to date and decode it.
pub fn migrate(document: Value) -> GameState {
    let Value::Object(mut document) = document else {
        warn!("Stored save is not a JSON object; starting fresh");
        return GameState::default();
    };

    match SchemaVersion::detect(&document) {
        Ok(version) => {
            if version < SchemaVersion::CURRENT {
                info!(
                    from = version.number(),
                    to = SchemaVersion::CURRENT.number(),
                    "Migrating save document"
                );
            }
            let mut current = version;
            while let Some(next) = current.next() {
                upgrade(&mut document, next);
                current = next;
            }
        }
        Err(stamp) => {
            warn!(
                schema = stamp,
                supported = SchemaVersion::CURRENT.number(),
                "Save written by a newer build; loading known fields only"
            );
        }
    }

    decode(&document)
}

fn upgrade(document: &mut Map<String, Value>, to: SchemaVersion) {
    match to {
        SchemaVersion::Base => {}
        SchemaVersion::Prestige => {
            document
                .entry("settings")
                .or_insert_with(|| json!(Settings::default()));
            document.entry("prestigeCurrency").or_insert(json!(0));
            document.entry("prestigeCount").or_insert(json!(0));
        }
        SchemaVersion::Research => {
            document.entry("research").or_insert_with(|| json!({}));
            document.entry("prestigeSpent").or_insert(json!(0));
        }
    }
    document.insert("schemaVersion".to_string(), json!(to.number()));
}

fn decode(document: &Map<String, Value>) -> GameState {
    let prestige_currency = count(document.get("prestigeCurrency"));
    GameState {
        currency: amount(document.get("currency")),
        total_currency_earned: amount(document.get("totalCurrencyEarned")),
        click_count: count(document.get("clickCount")),
        upgrade_levels: levels(document.get("upgrades")),
        research_levels: levels(document.get("research")),
        prestige_currency,
        prestige_spent: count(document.get("prestigeSpent")).min(prestige_currency),
        prestige_count: level(document.get("prestigeCount")),
        settings: settings(document.get("settings")),
        last_save: amount(document.get("lastSave")).floor() as i64,
    }
}

fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let raw = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    raw.is_finite().then_some(raw)
}

/// Non-negative finite number, else 0.
fn amount(value: Option<&Value>) -> f64 {
    coerce_number(value).filter(|value| *value >= 0.0).unwrap_or(0.0)
}

fn count(value: Option<&Value>) -> u64 {
    // f64 -> u64 casts saturate.
    amount(value).floor() as u64
}

fn level(value: Option<&Value>) -> u32 {
    amount(value).floor() as u32
}

fn levels(value: Option<&Value>) -> BTreeMap<String, u32> {
    match value {
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(id, value)| (id.clone(), level(Some(value))))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        _ => default,
    }
}

fn settings(value: Option<&Value>) -> Settings {
    let defaults = Settings::default();
    let Some(Value::Object(fields)) = value else {
        return defaults;
    };
    Settings {
        show_floating_text: flag(fields.get("showFloatingText"), defaults.show_floating_text),
        enable_animations: flag(fields.get("enableAnimations"), defaults.enable_animations),
        theme: fields
            .get("theme")
            .and_then(Value::as_str)
            .and_then(Theme::from_name)
            .unwrap_or(defaults.theme),
    }
}
