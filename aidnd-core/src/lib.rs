//! Deterministic D&D 5e rules engine and reference catalog for an AI Dungeon Master.
//!
//! This crate provides:
//! - Dice expressions with injectable randomness and a full audit trail
//! - Attack resolution against AC with conditions, advantage and crits
//! - Immutable encounter snapshots and crash-safe snapshot storage
//! - A bundled SRD catalog with exact and fuzzy lookup
//! - Single-flight fetch-and-cache of full records from Open5e
//!
//! # Quick Start
//!
//! ```ignore
//! use aidnd_core::{AttackOptions, ConditionRules, DiceExpression, EngineConfig, SessionId};
//! use aidnd_core::testing::sample_encounter;
//!
//! #[tokio::main]
//! async fn main() -> aidnd_core::Result<()> {
//!     let config = EngineConfig::from_env()?;
//!     let store = config.snapshot_store().await?;
//!     let session = SessionId::parse("table-1")?;
//!
//!     let encounter = sample_encounter();
//!     let (encounter, outcome) = encounter.resolve_attack(
//!         &"fighter".into(),
//!         &"goblin-1".into(),
//!         &DiceExpression::d20(),
//!         &"1d8".parse()?,
//!         &AttackOptions::melee().with_downed_policy(config.rules.downed_defender),
//!         &ConditionRules::standard(),
//!         &mut rand::thread_rng(),
//!     )?;
//!     println!("hit: {}", outcome.hit);
//!
//!     store.save(&session, &encounter).await?;
//!     Ok(())
//! }
//! ```

pub mod attack;
pub mod cache;
pub mod catalog;
pub mod combatant;
pub mod compendium;
pub mod conditions;
pub mod config;
pub mod dice;
pub mod encounter;
pub mod error;
pub mod persist;
pub mod testing;

// Primary public API
pub use attack::{resolve_attack, AttackOptions, AttackOutcome, AttackRange, DownedDefenderPolicy};
pub use cache::{CacheConfig, CacheEntry, CacheKey, FetchCache, FetchError, RecordFetcher};
pub use catalog::{CatalogError, CatalogIndex, CatalogRecord, ResourceKind, ScoredRecord};
pub use combatant::{
    Ability, AbilityModifiers, ActiveCondition, Combatant, CombatantId, DamageApplied, HitPoints,
    TempHpPolicy,
};
pub use compendium::{Compendium, FullRecord};
pub use conditions::{ConditionEffect, ConditionRules};
pub use config::{EngineConfig, RulePolicy};
pub use dice::{roll, roll_seeded, Advantage, DiceError, DiceExpression, DieRoll, DieSource, Roll};
pub use encounter::{CombatError, Encounter, TurnAdvance};
pub use error::{Error, Result};
pub use persist::{SavedEncounter, SessionId, SnapshotStore, StoreError};
