//! Testing utilities.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedDice` to feed exact die faces into an evaluation
//! - `MockFetcher` to stand in for the remote catalog (counts calls,
//!   optional delay and failures)
//! - Sample combatants and a ready-made encounter

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::{FetchError, RecordFetcher};
use crate::catalog::ResourceKind;
use crate::combatant::{AbilityModifiers, Combatant, CombatantId};
use crate::dice::DieSource;
use crate::encounter::Encounter;

/// Die source that returns a fixed sequence of faces.
///
/// Panics when the script runs out or a face does not fit the die, so a
/// test that rolls more than it expects fails loudly.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u32>,
    history: Vec<(u32, u32)>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
            history: Vec::new(),
        }
    }

    /// Faces not yet used.
    pub fn remaining(&self) -> usize {
        self.faces.len()
    }

    /// `(sides, value)` for every die rolled so far.
    pub fn history(&self) -> &[(u32, u32)] {
        &self.history
    }
}

impl DieSource for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        let Some(value) = self.faces.pop_front() else {
            panic!("ScriptedDice ran out of faces rolling a d{sides}");
        };
        assert!(
            (1..=sides).contains(&value),
            "scripted face {value} does not fit a d{sides}"
        );
        self.history.push((sides, value));
        value
    }
}

/// In-memory stand-in for the remote catalog source.
#[derive(Debug, Default)]
pub struct MockFetcher {
    records: HashMap<(ResourceKind, String), Value>,
    delay: Duration,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    calls_by_key: Mutex<HashMap<(ResourceKind, String), usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, kind: ResourceKind, slug: &str, body: Value) -> Self {
        self.records.insert((kind, slug.to_string()), body);
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail the next `n` fetches with a network error.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Total fetches issued.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, kind: ResourceKind, slug: &str) -> usize {
        self.calls_by_key
            .lock()
            .map(|calls| calls.get(&(kind, slug.to_string())).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RecordFetcher for MockFetcher {
    async fn fetch(&self, kind: ResourceKind, slug: &str) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls_by_key.lock() {
            *calls.entry((kind, slug.to_string())).or_insert(0) += 1;
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(FetchError::Network("simulated outage".to_string()));
        }

        self.records
            .get(&(kind, slug.to_string()))
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                kind,
                slug: slug.to_string(),
            })
    }
}

/// A level 3 fighter: 28 HP, AC 16, STR +3, DEX +1, initiative 15.
pub fn sample_fighter(id: &str) -> Combatant {
    Combatant::new(CombatantId::from(id), "Roland", 28, 16)
        .with_modifiers(AbilityModifiers {
            strength: 3,
            dexterity: 1,
            constitution: 2,
            intelligence: 0,
            wisdom: 1,
            charisma: -1,
        })
        .with_initiative(15)
        .as_player()
}

/// An SRD goblin: 7 HP, AC 15, DEX +2, initiative 12.
pub fn sample_goblin(id: &str) -> Combatant {
    Combatant::new(CombatantId::from(id), "Goblin", 7, 15)
        .with_modifiers(AbilityModifiers {
            strength: -1,
            dexterity: 2,
            constitution: 0,
            intelligence: 0,
            wisdom: -1,
            charisma: -1,
        })
        .with_initiative(12)
}

/// A fighter against two goblins, in order `fighter`, `goblin-1`, `goblin-2`.
pub fn sample_encounter() -> Encounter {
    let combatants = vec![
        sample_fighter("fighter"),
        sample_goblin("goblin-1"),
        sample_goblin("goblin-2").with_initiative(10),
    ];
    match Encounter::new(combatants) {
        Ok(encounter) => encounter,
        Err(e) => panic!("sample encounter is invalid: {e}"),
    }
}
