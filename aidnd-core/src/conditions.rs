//! Mechanical effects of conditions, as a data table.
//!
//! Conditions on a [`Combatant`] are just names. What a name does in combat
//! comes from a [`ConditionRules`] table, so house rules and extra states
//! (cover, the Dodge action) are new rows rather than new code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::iter;

use crate::attack::AttackRange;
use crate::combatant::{normalize_condition_name, Ability, Combatant};
use crate::dice::Advantage;

/// What one condition does to attacks and saves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionEffect {
    /// Applied to attack rolls the affected creature makes.
    pub own_attacks: Advantage,
    /// Applied to melee attack rolls against the affected creature.
    pub melee_attacks_against: Advantage,
    /// Applied to ranged attack rolls against the affected creature.
    pub ranged_attacks_against: Advantage,
    /// Melee hits against the affected creature are critical hits.
    pub melee_hits_are_critical: bool,
    /// Can't take actions or reactions.
    pub incapacitated: bool,
    pub auto_fail_saves: Vec<Ability>,
    pub attack_bonus: i32,
    pub ac_bonus: i32,
}

impl ConditionEffect {
    pub fn own_attacks(mut self, advantage: Advantage) -> Self {
        self.own_attacks = advantage;
        self
    }

    /// Same state for melee and ranged attacks against.
    pub fn attacks_against(mut self, advantage: Advantage) -> Self {
        self.melee_attacks_against = advantage;
        self.ranged_attacks_against = advantage;
        self
    }

    pub fn melee_against(mut self, advantage: Advantage) -> Self {
        self.melee_attacks_against = advantage;
        self
    }

    pub fn ranged_against(mut self, advantage: Advantage) -> Self {
        self.ranged_attacks_against = advantage;
        self
    }

    pub fn melee_crits(mut self) -> Self {
        self.melee_hits_are_critical = true;
        self
    }

    pub fn incapacitating(mut self) -> Self {
        self.incapacitated = true;
        self
    }

    pub fn failing_saves(mut self, abilities: &[Ability]) -> Self {
        self.auto_fail_saves = abilities.to_vec();
        self
    }

    pub fn with_attack_bonus(mut self, bonus: i32) -> Self {
        self.attack_bonus = bonus;
        self
    }

    pub fn with_ac_bonus(mut self, bonus: i32) -> Self {
        self.ac_bonus = bonus;
        self
    }
}

lazy_static::lazy_static! {
    /// SRD conditions plus a few common combat states.
    static ref STANDARD_EFFECTS: HashMap<String, ConditionEffect> = {
        use crate::dice::Advantage::{Advantage as Adv, Disadvantage as Dis};
        let physical = [Ability::Strength, Ability::Dexterity];

        let rows = vec![
            ("blinded", ConditionEffect::default().own_attacks(Dis).attacks_against(Adv)),
            ("charmed", ConditionEffect::default()),
            ("deafened", ConditionEffect::default()),
            ("frightened", ConditionEffect::default().own_attacks(Dis)),
            ("grappled", ConditionEffect::default()),
            ("incapacitated", ConditionEffect::default().incapacitating()),
            ("invisible", ConditionEffect::default().own_attacks(Adv).attacks_against(Dis)),
            (
                "paralyzed",
                ConditionEffect::default()
                    .incapacitating()
                    .failing_saves(&physical)
                    .attacks_against(Adv)
                    .melee_crits(),
            ),
            (
                "petrified",
                ConditionEffect::default()
                    .incapacitating()
                    .failing_saves(&physical)
                    .attacks_against(Adv),
            ),
            ("poisoned", ConditionEffect::default().own_attacks(Dis)),
            (
                "prone",
                ConditionEffect::default()
                    .own_attacks(Dis)
                    .melee_against(Adv)
                    .ranged_against(Dis),
            ),
            ("restrained", ConditionEffect::default().own_attacks(Dis).attacks_against(Adv)),
            (
                "stunned",
                ConditionEffect::default()
                    .incapacitating()
                    .failing_saves(&physical)
                    .attacks_against(Adv),
            ),
            (
                "unconscious",
                ConditionEffect::default()
                    .incapacitating()
                    .failing_saves(&physical)
                    .attacks_against(Adv)
                    .melee_crits(),
            ),
            // Levels only touch checks, speed and HP maximum, none of which
            // this table models.
            ("exhaustion", ConditionEffect::default()),
            ("dodging", ConditionEffect::default().attacks_against(Dis)),
            ("half-cover", ConditionEffect::default().with_ac_bonus(2)),
            ("three-quarters-cover", ConditionEffect::default().with_ac_bonus(5)),
        ];

        rows.into_iter()
            .map(|(name, effect)| (name.to_string(), effect))
            .collect()
    };
}

/// Lookup table from condition name to effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionRules {
    effects: HashMap<String, ConditionEffect>,
}

impl ConditionRules {
    /// A table with no rows; every condition is cosmetic.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The SRD conditions, exhaustion, dodging and cover.
    pub fn standard() -> Self {
        Self {
            effects: STANDARD_EFFECTS.clone(),
        }
    }

    /// Add or replace a row.
    pub fn with_effect(mut self, name: &str, effect: ConditionEffect) -> Self {
        self.insert(name, effect);
        self
    }

    pub fn insert(&mut self, name: &str, effect: ConditionEffect) -> Option<ConditionEffect> {
        self.effects.insert(normalize_condition_name(name), effect)
    }

    pub fn effect(&self, name: &str) -> Option<&ConditionEffect> {
        self.effects.get(&normalize_condition_name(name))
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.effect(name).is_some()
    }

    /// Known condition names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.effects.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn effects_on<'a>(&'a self, combatant: &'a Combatant) -> impl Iterator<Item = &'a ConditionEffect> + 'a {
        combatant
            .conditions
            .iter()
            .filter_map(move |c| self.effects.get(&c.name))
    }

    /// Net advantage for an attack, starting from the caller's own state.
    pub fn attack_advantage(
        &self,
        attacker: &Combatant,
        defender: &Combatant,
        range: AttackRange,
        base: Advantage,
    ) -> Advantage {
        let own = self.effects_on(attacker).map(|e| e.own_attacks);
        let against = self.effects_on(defender).map(|e| match range {
            AttackRange::Melee => e.melee_attacks_against,
            AttackRange::Ranged => e.ranged_attacks_against,
        });
        Advantage::resolve(iter::once(base).chain(own).chain(against))
    }

    /// Whether a hit on `defender` at this range is automatically critical.
    pub fn auto_critical(&self, defender: &Combatant, range: AttackRange) -> bool {
        range == AttackRange::Melee && self.effects_on(defender).any(|e| e.melee_hits_are_critical)
    }

    pub fn attack_bonus(&self, attacker: &Combatant) -> i32 {
        self.effects_on(attacker).map(|e| e.attack_bonus).sum()
    }

    pub fn ac_bonus(&self, defender: &Combatant) -> i32 {
        self.effects_on(defender).map(|e| e.ac_bonus).sum()
    }

    pub fn is_incapacitated(&self, combatant: &Combatant) -> bool {
        self.effects_on(combatant).any(|e| e.incapacitated)
    }

    pub fn auto_fails_save(&self, combatant: &Combatant, ability: Ability) -> bool {
        self.effects_on(combatant)
            .any(|e| e.auto_fail_saves.contains(&ability))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::ActiveCondition;

    fn with_conditions(names: &[&str]) -> Combatant {
        let mut c = Combatant::new("c", "Creature", 10, 12);
        for name in names {
            c.add_condition(ActiveCondition::new(name));
        }
        c
    }

    #[test]
    fn test_standard_table_has_srd_conditions() {
        let rules = ConditionRules::standard();
        for name in [
            "blinded",
            "charmed",
            "deafened",
            "frightened",
            "grappled",
            "incapacitated",
            "invisible",
            "paralyzed",
            "petrified",
            "poisoned",
            "prone",
            "restrained",
            "stunned",
            "unconscious",
            "exhaustion",
        ] {
            assert!(rules.is_known(name), "missing {name}");
        }
        assert!(rules.is_known("Prone"));
        assert!(!rules.is_known("on fire"));
    }

    #[test]
    fn test_prone_depends_on_range() {
        let rules = ConditionRules::standard();
        let attacker = with_conditions(&[]);
        let defender = with_conditions(&["prone"]);

        assert_eq!(
            rules.attack_advantage(&attacker, &defender, AttackRange::Melee, Advantage::Normal),
            Advantage::Advantage
        );
        assert_eq!(
            rules.attack_advantage(&attacker, &defender, AttackRange::Ranged, Advantage::Normal),
            Advantage::Disadvantage
        );
    }

    #[test]
    fn test_sources_cancel() {
        let rules = ConditionRules::standard();
        let attacker = with_conditions(&["poisoned"]);
        let defender = with_conditions(&["restrained"]);

        assert_eq!(
            rules.attack_advantage(&attacker, &defender, AttackRange::Melee, Advantage::Normal),
            Advantage::Normal
        );
        assert_eq!(
            rules.attack_advantage(&attacker, &defender, AttackRange::Melee, Advantage::Advantage),
            Advantage::Normal
        );
    }

    #[test]
    fn test_unconscious_melee_auto_crit() {
        let rules = ConditionRules::standard();
        let defender = with_conditions(&["unconscious"]);
        assert!(rules.auto_critical(&defender, AttackRange::Melee));
        assert!(!rules.auto_critical(&defender, AttackRange::Ranged));
        assert!(rules.is_incapacitated(&defender));
        assert!(rules.auto_fails_save(&defender, Ability::Dexterity));
        assert!(!rules.auto_fails_save(&defender, Ability::Wisdom));
    }

    #[test]
    fn test_cover_bonus_stacks_with_custom_rows() {
        let rules = ConditionRules::standard()
            .with_effect("Shield of Faith", ConditionEffect::default().with_ac_bonus(2))
            .with_effect("blessed", ConditionEffect::default().with_attack_bonus(1));

        let defender = with_conditions(&["half-cover", "shield of faith"]);
        assert_eq!(rules.ac_bonus(&defender), 4);

        let attacker = with_conditions(&["blessed"]);
        assert_eq!(rules.attack_bonus(&attacker), 1);
    }

    #[test]
    fn test_unknown_conditions_are_cosmetic() {
        let rules = ConditionRules::empty();
        let defender = with_conditions(&["prone"]);
        let attacker = with_conditions(&[]);
        assert_eq!(
            rules.attack_advantage(&attacker, &defender, AttackRange::Melee, Advantage::Normal),
            Advantage::Normal
        );
        assert!(rules.names().is_empty());
    }
}
