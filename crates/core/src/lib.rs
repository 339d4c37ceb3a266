#![warn(clippy::all, missing_docs)]

//! Core game logic for Neon Genesis.
//!
//! This crate hosts the upgrade catalog, the pure economy and transition
//! functions, the save schema with its migrations, the save stores and
//! gateways, and the live session that ticks and autosaves.

pub mod catalog;
pub mod config;
pub mod economy;
pub mod gateway;
pub mod models;
pub mod save;
pub mod session;
pub mod transition;

pub use catalog::{Catalog, Channel, ResearchDef, UpgradeDef};
pub use config::AppConfig;
pub use economy::Stats;
pub use gateway::{GatewayError, HttpGateway, LocalGateway, SaveGateway};
pub use models::{GameState, Settings, SettingsPatch, Theme};
pub use save::{FileSaveStore, SaveStore};
pub use session::{SessionConfig, SessionEvent, SessionHandle};
pub use transition::{BuyAmount, NoOp, Transition};
