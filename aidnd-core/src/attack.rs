//! Attack resolution.
//!
//! A pure function from (attacker, defender, dice expressions, options,
//! condition table, die source) to an [`AttackOutcome`] carrying the updated
//! defender. Nothing is mutated in place.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::combatant::{Ability, Combatant, CombatantId, DamageApplied};
use crate::conditions::ConditionRules;
use crate::dice::{Advantage, DiceError, DiceExpression, DieSource, Roll};

/// Melee or ranged; several conditions care.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackRange {
    #[default]
    Melee,
    Ranged,
}

/// What happens when an attack hits a defender who is already down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownedDefenderPolicy {
    /// Damage still applies (it matters for death saves and temp HP).
    #[default]
    ApplyDamage,
    /// Report the hit but leave the defender untouched.
    FlagOnly,
}

impl FromStr for DownedDefenderPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "apply-damage" => Ok(DownedDefenderPolicy::ApplyDamage),
            "flag-only" => Ok(DownedDefenderPolicy::FlagOnly),
            other => Err(format!("unknown downed-defender policy: {other:?}")),
        }
    }
}

/// Per-attack knobs supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOptions {
    /// Ability modifier added to the attack roll, if any.
    pub ability: Option<Ability>,
    pub advantage: Advantage,
    pub range: AttackRange,
    pub downed_policy: DownedDefenderPolicy,
}

impl AttackOptions {
    pub fn melee() -> Self {
        Self::default()
    }

    pub fn ranged() -> Self {
        Self {
            range: AttackRange::Ranged,
            ..Self::default()
        }
    }

    pub fn with_ability(mut self, ability: Ability) -> Self {
        self.ability = Some(ability);
        self
    }

    pub fn with_advantage(mut self, advantage: Advantage) -> Self {
        self.advantage = advantage;
        self
    }

    pub fn with_downed_policy(mut self, policy: DownedDefenderPolicy) -> Self {
        self.downed_policy = policy;
        self
    }
}

/// Everything that happened during one attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub attacker_id: CombatantId,
    pub defender_id: CombatantId,
    pub hit: bool,
    pub critical: bool,
    /// Natural 1 on the d20.
    pub fumble: bool,
    pub natural_d20: Option<u32>,
    pub attack_total: i64,
    /// Defender AC including condition bonuses.
    pub target_ac: i32,
    /// Net advantage after combining the caller's and the conditions'.
    pub advantage: Advantage,
    pub attack_roll: Roll,
    pub damage_roll: Option<Roll>,
    /// Damage rolled after clamping at 0, before temp HP.
    pub damage_rolled: i32,
    /// None on a miss or when the policy withheld damage.
    pub damage: Option<DamageApplied>,
    pub defender_was_down: bool,
    pub defender_dropped: bool,
    pub defender_hp: i32,
    pub defender_temp_hp: i32,
    /// The defender after damage.
    pub defender: Combatant,
}

/// Resolve one attack roll and, on a hit, its damage.
///
/// The d20 decides first: a natural 20 always hits and crits, a natural 1
/// always misses. Otherwise the total must meet the defender's AC. Advantage
/// rolls the d20 twice and keeps the better face; any other dice in the
/// attack roll are rolled once. Critical hits double the damage dice but not
/// flat modifiers.
pub fn resolve_attack<D: DieSource + ?Sized>(
    attacker: &Combatant,
    defender: &Combatant,
    attack_roll: &DiceExpression,
    damage_roll: &DiceExpression,
    options: &AttackOptions,
    rules: &ConditionRules,
    dice: &mut D,
) -> AttackOutcome {
    let modifier = options
        .ability
        .map_or(0, |ability| attacker.modifiers.get(ability))
        + rules.attack_bonus(attacker);
    let advantage = rules.attack_advantage(attacker, defender, options.range, options.advantage);
    let attack_expr = attack_roll
        .with_modifier(i64::from(modifier))
        .with_d20_advantage(advantage);

    let roll = attack_expr.evaluate(dice);
    let natural_d20 = roll.natural(20);
    let target_ac = defender.armor_class + rules.ac_bonus(defender);

    let fumble = natural_d20 == Some(1);
    let hit = match natural_d20 {
        Some(20) => true,
        Some(1) => false,
        _ => roll.total >= i64::from(target_ac),
    };
    let critical =
        hit && (natural_d20 == Some(20) || rules.auto_critical(defender, options.range));

    let defender_was_down = defender.is_down();
    let mut updated = defender.clone();

    let (damage_roll_result, damage_rolled, damage) = if hit {
        let expr = if critical {
            damage_roll.with_doubled_dice()
        } else {
            damage_roll.clone()
        };
        let rolled = expr.evaluate(dice);
        let amount = rolled.total.clamp(0, i64::from(i32::MAX)) as i32;
        let applied = if defender_was_down && options.downed_policy == DownedDefenderPolicy::FlagOnly {
            None
        } else {
            Some(updated.apply_damage(amount))
        };
        (Some(rolled), amount, applied)
    } else {
        (None, 0, None)
    };

    let defender_dropped = damage.is_some_and(|d| d.dropped_to_zero);

    debug!(
        attacker = %attacker.id,
        defender = %defender.id,
        total = roll.total,
        target_ac,
        hit,
        critical,
        damage = damage_rolled,
        "attack resolved"
    );

    AttackOutcome {
        attacker_id: attacker.id.clone(),
        defender_id: defender.id.clone(),
        hit,
        critical,
        fumble,
        natural_d20,
        attack_total: roll.total,
        target_ac,
        advantage,
        attack_roll: roll,
        damage_roll: damage_roll_result,
        damage_rolled,
        damage,
        defender_was_down,
        defender_dropped,
        defender_hp: updated.hit_points.current,
        defender_temp_hp: updated.hit_points.temporary,
        defender: updated,
    }
}

/// Parse both expressions first, then resolve. Nothing is rolled when
/// either expression is malformed.
pub fn resolve_attack_notation<D: DieSource + ?Sized>(
    attacker: &Combatant,
    defender: &Combatant,
    attack_roll: &str,
    damage_roll: &str,
    options: &AttackOptions,
    rules: &ConditionRules,
    dice: &mut D,
) -> Result<AttackOutcome, DiceError> {
    let attack_roll = DiceExpression::parse(attack_roll)?;
    let damage_roll = DiceExpression::parse(damage_roll)?;
    Ok(resolve_attack(
        attacker,
        defender,
        &attack_roll,
        &damage_roll,
        options,
        rules,
        dice,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::ActiveCondition;
    use crate::testing::{sample_fighter, sample_goblin, ScriptedDice};

    fn expr(s: &str) -> DiceExpression {
        DiceExpression::parse(s).unwrap()
    }

    #[test]
    fn test_hit_without_crit() {
        let attacker = sample_fighter("fighter");
        let defender = Combatant::new("ogre", "Ogre", 59, 15);
        let mut dice = ScriptedDice::new([13, 6]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d8+3"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert_eq!(outcome.attack_total, 18);
        assert!(outcome.hit);
        assert!(!outcome.critical);
        assert_eq!(outcome.damage_rolled, 9);
        assert_eq!(outcome.defender_hp, 50);
        assert_eq!(outcome.defender.hit_points.current, 50);
        // The input defender is untouched
        assert_eq!(defender.hit_points.current, 59);
    }

    #[test]
    fn test_natural_twenty_always_hits_and_doubles_dice() {
        let attacker = sample_fighter("fighter");
        let defender = Combatant::new("dragon", "Dragon", 200, 30);
        let mut dice = ScriptedDice::new([20, 4, 5]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d8+3"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert!(outcome.hit);
        assert!(outcome.critical);
        assert_eq!(outcome.natural_d20, Some(20));
        let damage = outcome.damage_roll.unwrap();
        assert_eq!(damage.dice.len(), 2);
        assert_eq!(outcome.damage_rolled, 4 + 5 + 3);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    fn test_natural_one_always_misses() {
        let attacker = sample_fighter("fighter");
        let defender = Combatant::new("rat", "Rat", 1, 2);
        let mut dice = ScriptedDice::new([1]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+30"),
            &expr("1d4"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert!(!outcome.hit);
        assert!(outcome.fumble);
        assert!(outcome.damage_roll.is_none());
        assert!(outcome.damage.is_none());
        assert_eq!(outcome.defender, defender);
    }

    #[test]
    fn test_advantage_rerolls_only_the_d20() {
        let attacker = sample_fighter("fighter");
        let defender = Combatant::new("dragon", "Dragon", 200, 30);
        // d20s 20 and 19, then the d4 once, then 2d8 critical damage.
        let mut dice = ScriptedDice::new([20, 19, 1, 5, 6]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+1d4"),
            &expr("1d8"),
            &AttackOptions::melee().with_advantage(Advantage::Advantage),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert_eq!(outcome.natural_d20, Some(20));
        assert_eq!(outcome.attack_total, 21);
        assert!(outcome.hit);
        assert!(outcome.critical);
        assert_eq!(outcome.attack_roll.dice.len(), 3);
        assert_eq!(outcome.damage_rolled, 11);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    fn test_disadvantage_keeps_the_lower_face() {
        let attacker = sample_fighter("fighter");
        let defender = Combatant::new("rat", "Rat", 1, 2);
        let mut dice = ScriptedDice::new([20, 1, 4]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+1d4+10"),
            &expr("1d4"),
            &AttackOptions::melee().with_advantage(Advantage::Disadvantage),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert_eq!(outcome.natural_d20, Some(1));
        assert!(outcome.fumble);
        assert!(!outcome.hit);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    fn test_ability_modifier_is_added() {
        let attacker = sample_fighter("fighter");
        let defender = Combatant::new("ogre", "Ogre", 59, 11);
        let mut dice = ScriptedDice::new([8, 1]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20"),
            &expr("1d8"),
            &AttackOptions::melee().with_ability(Ability::Strength),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert_eq!(outcome.attack_total, 8 + attacker.modifiers.strength as i64);
        assert!(outcome.hit);
    }

    #[test]
    fn test_prone_defender_gives_melee_advantage() {
        let attacker = sample_fighter("fighter");
        let mut defender = sample_goblin("goblin");
        defender.add_condition(ActiveCondition::new("prone"));
        let mut dice = ScriptedDice::new([3, 17, 2]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d6"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert_eq!(outcome.advantage, Advantage::Advantage);
        assert_eq!(outcome.natural_d20, Some(17));
        assert_eq!(outcome.attack_total, 22);
        assert!(outcome.hit);
    }

    #[test]
    fn test_melee_hit_on_unconscious_is_critical() {
        let attacker = sample_fighter("fighter");
        let mut defender = sample_goblin("goblin");
        defender.add_condition(ActiveCondition::new("unconscious"));
        let mut dice = ScriptedDice::new([2, 12, 1, 1]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d6"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert!(outcome.hit);
        assert!(outcome.critical);
        assert_eq!(outcome.damage_roll.unwrap().dice.len(), 2);
    }

    #[test]
    fn test_cover_raises_target_ac() {
        let attacker = sample_fighter("fighter");
        let mut defender = Combatant::new("archer", "Archer", 11, 13);
        defender.add_condition(ActiveCondition::new("half-cover"));
        let mut dice = ScriptedDice::new([9]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d8"),
            &AttackOptions::ranged(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert_eq!(outcome.target_ac, 15);
        assert_eq!(outcome.attack_total, 14);
        assert!(!outcome.hit);
    }

    #[test]
    fn test_negative_damage_clamps_to_zero() {
        let attacker = sample_fighter("fighter");
        let defender = sample_goblin("goblin");
        let mut dice = ScriptedDice::new([15, 1]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d4-3"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert!(outcome.hit);
        assert_eq!(outcome.damage_rolled, 0);
        assert_eq!(outcome.defender_hp, defender.hit_points.current);
    }

    #[test]
    fn test_downed_defender_policies() {
        let attacker = sample_fighter("fighter");
        let defender = sample_goblin("goblin").with_current_hp(0);
        assert!(defender.is_down());

        let mut dice = ScriptedDice::new([15, 4]);
        let applied = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d6"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );
        assert!(applied.defender_was_down);
        assert!(applied.damage.is_some());
        assert!(!applied.defender_dropped);

        let mut dice = ScriptedDice::new([15, 4]);
        let flagged = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("1d6"),
            &AttackOptions::melee().with_downed_policy(DownedDefenderPolicy::FlagOnly),
            &ConditionRules::standard(),
            &mut dice,
        );
        assert!(flagged.hit);
        assert!(flagged.defender_was_down);
        assert!(flagged.damage.is_none());
        assert_eq!(flagged.damage_rolled, 4);
    }

    #[test]
    fn test_dropping_defender_to_zero() {
        let attacker = sample_fighter("fighter");
        let defender = sample_goblin("goblin");
        let mut dice = ScriptedDice::new([18, 6, 6]);

        let outcome = resolve_attack(
            &attacker,
            &defender,
            &expr("1d20+5"),
            &expr("2d6"),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert!(outcome.defender_dropped);
        assert_eq!(outcome.defender_hp, 0);
        assert!(outcome.defender.is_down());
    }

    #[test]
    fn test_notation_errors_roll_nothing() {
        let attacker = sample_fighter("fighter");
        let defender = sample_goblin("goblin");
        let mut dice = ScriptedDice::new([10]);

        let result = resolve_attack_notation(
            &attacker,
            &defender,
            "1d20+5",
            "2d",
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        );

        assert!(result.is_err());
        assert_eq!(dice.remaining(), 1);
    }

    #[test]
    fn test_downed_policy_from_str() {
        assert_eq!(
            "flag-only".parse::<DownedDefenderPolicy>(),
            Ok(DownedDefenderPolicy::FlagOnly)
        );
        assert_eq!(
            "Apply_Damage".parse::<DownedDefenderPolicy>(),
            Ok(DownedDefenderPolicy::ApplyDamage)
        );
        assert!("ignore".parse::<DownedDefenderPolicy>().is_err());
    }
}
