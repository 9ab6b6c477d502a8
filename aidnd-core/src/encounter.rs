//! Encounter snapshots.
//!
//! An [`Encounter`] is a self-contained value: ordered combatants, the round
//! number and whose turn it is. Every operation takes `&self` and returns a
//! new encounter alongside its outcome, so a failed operation leaves the
//! caller's snapshot exactly as it was.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

use crate::attack::{self, AttackOptions, AttackOutcome};
use crate::combatant::{ActiveCondition, Combatant, CombatantId, DamageApplied, TempHpPolicy};
use crate::conditions::ConditionRules;
use crate::dice::{DiceExpression, DieSource};

/// Errors from encounter operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("Unknown combatant: {0}")]
    UnknownCombatant(CombatantId),

    #[error("Duplicate combatant id: {0}")]
    DuplicateCombatant(CombatantId),

    #[error("Invalid condition name: {0:?}")]
    InvalidCondition(String),

    #[error("Invalid monster record: {0}")]
    InvalidRecord(String),

    #[error("Inconsistent encounter: {0}")]
    Inconsistent(String),
}

/// What `next_turn` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAdvance {
    pub round: u32,
    pub turn_index: usize,
    /// The turn order wrapped and a new round began.
    pub new_round: bool,
    /// Conditions that ran out at the start of the new round.
    pub expired: Vec<(CombatantId, String)>,
}

/// Combat state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encounter {
    round: u32,
    turn_index: usize,
    combatants: Vec<Combatant>,
}

impl Default for Encounter {
    fn default() -> Self {
        Self {
            round: 1,
            turn_index: 0,
            combatants: Vec::new(),
        }
    }
}

impl Encounter {
    /// Start round 1, ordered by initiative (highest first, ties keep input order).
    pub fn new(combatants: Vec<Combatant>) -> Result<Self, CombatError> {
        let mut seen = HashSet::new();
        for combatant in &combatants {
            if !seen.insert(&combatant.id) {
                return Err(CombatError::DuplicateCombatant(combatant.id.clone()));
            }
            combatant.validate().map_err(CombatError::Inconsistent)?;
        }

        let mut combatants = combatants;
        combatants.sort_by(|a, b| b.initiative.cmp(&a.initiative));

        Ok(Self {
            round: 1,
            turn_index: 0,
            combatants,
        })
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn combatant(&self, id: &CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| &c.id == id)
    }

    /// Whose turn it is.
    pub fn current(&self) -> Option<&Combatant> {
        self.combatants.get(self.turn_index)
    }

    pub fn is_empty(&self) -> bool {
        self.combatants.is_empty()
    }

    /// True once every player or every non-player is at 0 HP.
    pub fn is_resolved(&self) -> bool {
        let side_standing = |players: bool| {
            self.combatants
                .iter()
                .any(|c| c.is_player == players && c.is_standing())
        };
        let has_side = |players: bool| self.combatants.iter().any(|c| c.is_player == players);

        (has_side(true) && !side_standing(true)) || (has_side(false) && !side_standing(false))
    }

    /// Check round, turn and combatant invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.round < 1 {
            return Err(format!("round {} is below 1", self.round));
        }
        if self.combatants.is_empty() {
            if self.turn_index != 0 {
                return Err(format!("turn index {} with no combatants", self.turn_index));
            }
        } else if self.turn_index >= self.combatants.len() {
            return Err(format!(
                "turn index {} out of range for {} combatants",
                self.turn_index,
                self.combatants.len()
            ));
        }

        let mut seen = HashSet::new();
        for combatant in &self.combatants {
            if !seen.insert(&combatant.id) {
                return Err(format!("duplicate combatant id {}", combatant.id));
            }
            combatant.validate()?;
        }
        Ok(())
    }

    fn index_of(&self, id: &CombatantId) -> Result<usize, CombatError> {
        self.combatants
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| CombatError::UnknownCombatant(id.clone()))
    }

    /// Copy the encounter and change one combatant in the copy.
    fn update<T>(
        &self,
        id: &CombatantId,
        f: impl FnOnce(&mut Combatant) -> T,
    ) -> Result<(Encounter, T), CombatError> {
        let index = self.index_of(id)?;
        let mut next = self.clone();
        let result = f(&mut next.combatants[index]);
        Ok((next, result))
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Resolve an attack between two combatants of this encounter.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_attack<D: DieSource + ?Sized>(
        &self,
        attacker_id: &CombatantId,
        defender_id: &CombatantId,
        attack_roll: &DiceExpression,
        damage_roll: &DiceExpression,
        options: &AttackOptions,
        rules: &ConditionRules,
        dice: &mut D,
    ) -> Result<(Encounter, AttackOutcome), CombatError> {
        let attacker = &self.combatants[self.index_of(attacker_id)?];
        let defender_index = self.index_of(defender_id)?;
        let defender = &self.combatants[defender_index];

        let outcome = attack::resolve_attack(
            attacker,
            defender,
            attack_roll,
            damage_roll,
            options,
            rules,
            dice,
        );

        let mut next = self.clone();
        next.combatants[defender_index] = outcome.defender.clone();
        Ok((next, outcome))
    }

    pub fn apply_damage(
        &self,
        id: &CombatantId,
        amount: i32,
    ) -> Result<(Encounter, DamageApplied), CombatError> {
        self.update(id, |c| c.apply_damage(amount))
    }

    /// Returns the combatant's new current HP alongside the encounter.
    pub fn apply_healing(&self, id: &CombatantId, amount: i32) -> Result<(Encounter, i32), CombatError> {
        self.update(id, |c| c.apply_healing(amount))
    }

    pub fn grant_temporary_hp(
        &self,
        id: &CombatantId,
        amount: i32,
        policy: TempHpPolicy,
    ) -> Result<(Encounter, i32), CombatError> {
        self.update(id, |c| c.grant_temporary_hp(amount, policy))
    }

    pub fn stabilize(&self, id: &CombatantId) -> Result<(Encounter, bool), CombatError> {
        self.update(id, |c| {
            c.stabilize();
            c.stable
        })
    }

    /// Returns whether the condition was new.
    pub fn add_condition(
        &self,
        id: &CombatantId,
        condition: ActiveCondition,
    ) -> Result<(Encounter, bool), CombatError> {
        if condition.name.is_empty() {
            return Err(CombatError::InvalidCondition(condition.name));
        }
        self.update(id, |c| c.add_condition(condition))
    }

    /// Returns whether the condition was present.
    pub fn remove_condition(&self, id: &CombatantId, name: &str) -> Result<(Encounter, bool), CombatError> {
        self.update(id, |c| c.remove_condition(name))
    }

    /// Move to the next combatant. Wrapping past the last one starts a new
    /// round, and every combatant's timed conditions count down once.
    pub fn next_turn(&self) -> (Encounter, TurnAdvance) {
        let mut next = self.clone();
        let mut expired = Vec::new();
        let mut new_round = false;

        if !next.combatants.is_empty() {
            next.turn_index += 1;
            if next.turn_index >= next.combatants.len() {
                next.turn_index = 0;
                next.round += 1;
                new_round = true;
                for combatant in &mut next.combatants {
                    for name in combatant.tick_conditions() {
                        expired.push((combatant.id.clone(), name));
                    }
                }
                debug!(round = next.round, expired = expired.len(), "new round");
            }
        }

        let advance = TurnAdvance {
            round: next.round,
            turn_index: next.turn_index,
            new_round,
            expired,
        };
        (next, advance)
    }

    /// Insert a combatant in initiative order after any with equal
    /// initiative. The current turn stays with the same combatant.
    pub fn add_combatant(&self, combatant: Combatant) -> Result<Encounter, CombatError> {
        if self.combatant(&combatant.id).is_some() {
            return Err(CombatError::DuplicateCombatant(combatant.id));
        }
        combatant.validate().map_err(CombatError::Inconsistent)?;

        let mut next = self.clone();
        let position = next
            .combatants
            .iter()
            .position(|c| c.initiative < combatant.initiative)
            .unwrap_or(next.combatants.len());
        if position <= next.turn_index && !next.combatants.is_empty() {
            next.turn_index += 1;
        }
        next.combatants.insert(position, combatant);
        Ok(next)
    }

    /// Remove a combatant. The turn passes to whoever followed it; removing
    /// the last in order hands the turn to the top of the order.
    pub fn remove_combatant(&self, id: &CombatantId) -> Result<(Encounter, Combatant), CombatError> {
        let index = self.index_of(id)?;
        let mut next = self.clone();
        let removed = next.combatants.remove(index);

        if index < next.turn_index {
            next.turn_index -= 1;
        }
        if next.turn_index >= next.combatants.len() {
            next.turn_index = 0;
        }
        Ok((next, removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_encounter, sample_fighter, sample_goblin, ScriptedDice};

    fn id(s: &str) -> CombatantId {
        CombatantId::from(s)
    }

    #[test]
    fn test_new_orders_by_initiative() {
        let encounter = Encounter::new(vec![
            sample_goblin("g1").with_initiative(8),
            sample_fighter("pc").with_initiative(15),
            sample_goblin("g2").with_initiative(8),
        ])
        .unwrap();

        let order: Vec<&str> = encounter.combatants().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["pc", "g1", "g2"]);
        assert_eq!(encounter.round(), 1);
        assert_eq!(encounter.current().unwrap().id, id("pc"));
    }

    #[test]
    fn test_new_rejects_duplicates() {
        let result = Encounter::new(vec![sample_goblin("g"), sample_goblin("g")]);
        assert_eq!(result, Err(CombatError::DuplicateCombatant(id("g"))));
    }

    #[test]
    fn test_unknown_combatant() {
        let encounter = sample_encounter();
        let result = encounter.apply_damage(&id("nobody"), 5);
        assert_eq!(result, Err(CombatError::UnknownCombatant(id("nobody"))));
    }

    #[test]
    fn test_operations_leave_original_untouched() {
        let encounter = sample_encounter();
        let (after, applied) = encounter.apply_damage(&id("goblin-1"), 3).unwrap();

        assert_eq!(applied.hp_lost, 3);
        assert_eq!(after.combatant(&id("goblin-1")).unwrap().hit_points.current, 4);
        assert_eq!(encounter.combatant(&id("goblin-1")).unwrap().hit_points.current, 7);
    }

    #[test]
    fn test_resolve_attack_updates_defender() {
        let encounter = sample_encounter();
        let mut dice = ScriptedDice::new([16, 5]);

        let (after, outcome) = encounter
            .resolve_attack(
                &id("fighter"),
                &id("goblin-1"),
                &DiceExpression::parse("1d20+5").unwrap(),
                &DiceExpression::parse("1d8+3").unwrap(),
                &AttackOptions::melee(),
                &ConditionRules::standard(),
                &mut dice,
            )
            .unwrap();

        assert!(outcome.hit);
        assert!(outcome.defender_dropped);
        assert_eq!(after.combatant(&id("goblin-1")).unwrap().hit_points.current, 0);
        assert_eq!(after.round(), encounter.round());
    }

    #[test]
    fn test_next_turn_wraps_and_ticks_conditions() {
        let encounter = sample_encounter();
        let (encounter, _) = encounter
            .add_condition(&id("goblin-1"), ActiveCondition::new("frightened").for_rounds(1))
            .unwrap();
        let (encounter, _) = encounter
            .add_condition(&id("fighter"), ActiveCondition::new("prone"))
            .unwrap();

        let count = encounter.combatants().len();
        let mut current = encounter;
        for _ in 0..count - 1 {
            let (next, advance) = current.next_turn();
            assert!(!advance.new_round);
            assert!(advance.expired.is_empty());
            current = next;
        }

        let (after, advance) = current.next_turn();
        assert!(advance.new_round);
        assert_eq!(advance.round, 2);
        assert_eq!(advance.turn_index, 0);
        assert_eq!(advance.expired, vec![(id("goblin-1"), "frightened".to_string())]);
        assert!(!after.combatant(&id("goblin-1")).unwrap().has_condition("frightened"));
        assert!(after.combatant(&id("fighter")).unwrap().has_condition("prone"));
    }

    #[test]
    fn test_next_turn_on_empty_encounter() {
        let encounter = Encounter::default();
        let (after, advance) = encounter.next_turn();
        assert_eq!(after, encounter);
        assert!(!advance.new_round);
    }

    #[test]
    fn test_add_combatant_keeps_current_turn() {
        let encounter = sample_encounter();
        let (encounter, _) = encounter.next_turn();
        let current = encounter.current().unwrap().id.clone();

        let fast = sample_goblin("scout").with_initiative(30);
        let after = encounter.add_combatant(fast).unwrap();

        assert_eq!(after.combatants()[0].id, id("scout"));
        assert_eq!(after.current().unwrap().id, current);
        assert!(after.validate().is_ok());
    }

    #[test]
    fn test_add_combatant_rejects_duplicate() {
        let encounter = sample_encounter();
        let result = encounter.add_combatant(sample_goblin("goblin-1"));
        assert_eq!(result, Err(CombatError::DuplicateCombatant(id("goblin-1"))));
    }

    #[test]
    fn test_remove_combatant_adjusts_turn() {
        let encounter = sample_encounter();
        let (encounter, _) = encounter.next_turn();
        let (encounter, _) = encounter.next_turn();
        assert_eq!(encounter.turn_index(), 2);
        let last = encounter.current().unwrap().id.clone();

        let first = encounter.combatants()[0].id.clone();
        let (after, removed) = encounter.remove_combatant(&first).unwrap();
        assert_eq!(removed.id, first);
        assert_eq!(after.current().unwrap().id, last);

        let (after, _) = after.remove_combatant(&last).unwrap();
        assert_eq!(after.turn_index(), 0);
        assert!(after.validate().is_ok());
    }

    #[test]
    fn test_is_resolved() {
        let encounter = sample_encounter();
        assert!(!encounter.is_resolved());

        let (encounter, _) = encounter.apply_damage(&id("goblin-1"), 100).unwrap();
        assert!(!encounter.is_resolved());
        let (encounter, _) = encounter.apply_damage(&id("goblin-2"), 100).unwrap();
        assert!(encounter.is_resolved());
    }

    #[test]
    fn test_add_condition_rejects_blank_name() {
        let encounter = sample_encounter();
        let result = encounter.add_condition(&id("fighter"), ActiveCondition::new("   "));
        assert!(matches!(result, Err(CombatError::InvalidCondition(_))));
    }

    #[test]
    fn test_validate_catches_bad_turn_index() {
        let mut encounter = sample_encounter();
        encounter.turn_index = 10;
        assert!(encounter.validate().is_err());

        let mut encounter = sample_encounter();
        encounter.round = 0;
        assert!(encounter.validate().is_err());
    }
}
