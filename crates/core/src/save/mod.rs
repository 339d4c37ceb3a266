//! Save documents: encoding, schema migration and durable storage.

mod migrate;
pub mod store;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::models::GameState;

pub use migrate::{migrate, SchemaVersion};
pub use store::{FileSaveStore, MemorySaveStore, SaveEntry, SaveRecord, SaveStore, StoreError};

/// Wire form of a [`GameState`], stamped with the schema it was written in.
#[derive(Serialize)]
struct Document<'a> {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    #[serde(flatten)]
    state: &'a GameState,
}

/// Whether `id` can be used as a save identity.
pub fn is_valid_save_id(id: &str) -> bool {
    static SAVE_ID_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("invalid save id regex"));
    SAVE_ID_RE.is_match(id)
}

/// Encode `state` as a current-schema JSON document.
pub fn encode(state: &GameState) -> Result<Value, serde_json::Error> {
    serde_json::to_value(Document {
        schema_version: SchemaVersion::CURRENT.number(),
        state,
    })
}

/// Encode `state` as current-schema JSON text.
pub fn encode_text(state: &GameState) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Document {
        schema_version: SchemaVersion::CURRENT.number(),
        state,
    })
}

/// Decode stored JSON text of any schema.
///
/// Text that is not JSON at all decodes to a fresh game.
pub fn decode_text(text: &str) -> GameState {
    match serde_json::from_str::<Value>(text) {
        Ok(document) => migrate(document),
        Err(err) => {
            warn!(?err, "Stored save is not valid JSON; starting fresh");
            GameState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Catalog, transition};
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn save_ids_are_restricted() {
        assert!(is_valid_save_id("player_one"));
        assert!(is_valid_save_id("A-1"));
        assert!(!is_valid_save_id(""));
        assert!(!is_valid_save_id("../etc/passwd"));
        assert!(!is_valid_save_id("with space"));
        assert!(!is_valid_save_id(&"x".repeat(65)));
    }

    #[test]
    fn encoded_document_uses_wire_names() -> Result<(), serde_json::Error> {
        let catalog = Catalog::standard();
        let (state, _) = transition::apply_click(GameState::new(), catalog);
        let document = encode(&state)?;

        assert_eq!(document["schemaVersion"], json!(3));
        assert_eq!(document["currency"], json!(1.0));
        assert_eq!(document["totalCurrencyEarned"], json!(1.0));
        assert_eq!(document["clickCount"], json!(1));
        assert_eq!(document["upgrades"], json!({}));
        assert_eq!(document["research"], json!({}));
        assert_eq!(document["prestigeCurrency"], json!(0));
        assert_eq!(document["prestigeCount"], json!(0));
        assert_eq!(document["settings"]["theme"], json!("neon"));
        assert_eq!(document["settings"]["showFloatingText"], json!(true));
        Ok(())
    }

    #[test]
    fn garbage_text_starts_fresh() {
        assert_eq!(decode_text("{not json"), GameState::default());
        assert_eq!(decode_text(""), GameState::default());
    }

    fn amount() -> impl Strategy<Value = f64> {
        (0u64..(1 << 40)).prop_map(|quarters| quarters as f64 / 4.0)
    }

    fn levels() -> impl Strategy<Value = std::collections::BTreeMap<String, u32>> {
        proptest::collection::btree_map("[a-z_]{1,12}", 0u32..500, 0..6)
    }

    prop_compose! {
        fn game_state()(
            currency in amount(),
            extra in amount(),
            click_count in 0u64..1_000_000_000,
            upgrade_levels in levels(),
            research_levels in levels(),
            prestige_currency in 0u64..100_000,
            spent_share in 0u64..=100,
            prestige_count in 0u32..1_000,
            show_floating_text in any::<bool>(),
            enable_animations in any::<bool>(),
            theme in prop_oneof![
                Just(crate::models::Theme::Neon),
                Just(crate::models::Theme::Matrix),
                Just(crate::models::Theme::Classic),
            ],
            last_save in 0i64..4_000_000_000_000,
        ) -> GameState {
            GameState {
                currency,
                total_currency_earned: currency + extra,
                click_count,
                upgrade_levels,
                research_levels,
                prestige_currency,
                prestige_spent: prestige_currency * spent_share / 100,
                prestige_count,
                settings: crate::models::Settings {
                    show_floating_text,
                    enable_animations,
                    theme,
                },
                last_save,
            }
        }
    }

    proptest! {
        #[test]
        fn documents_round_trip(state in game_state()) {
            let text = encode_text(&state).expect("encode");
            prop_assert_eq!(decode_text(&text), state);
        }
    }
}
