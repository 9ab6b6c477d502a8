//! Combatants: hit points, armor class, ability modifiers and timed conditions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::encounter::CombatError;

// ============================================================================
// Identity and abilities
// ============================================================================

/// Identifier of a combatant, unique within one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatantId(String);

impl CombatantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CombatantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CombatantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The six core abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    /// Lowercase field name used by Open5e monster records.
    pub fn field_name(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

impl FromStr for Ability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Ability::all()
            .into_iter()
            .find(|a| a.field_name() == wanted || a.abbreviation().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown ability: {s:?}"))
    }
}

/// Modifier for an ability score, e.g. 14 -> +2, 9 -> -1.
pub fn ability_modifier(score: i32) -> i32 {
    score.saturating_sub(10).div_euclid(2)
}

/// Per-ability modifiers (not raw scores).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityModifiers {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityModifiers {
    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: i32) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }
}

// ============================================================================
// Hit points
// ============================================================================

/// How a new grant of temporary hit points interacts with existing ones.
/// Temporary hit points never stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TempHpPolicy {
    /// Keep whichever pool is larger.
    #[default]
    KeepHigher,
    /// The latest grant replaces the old pool.
    Replace,
}

impl FromStr for TempHpPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "keep-higher" => Ok(TempHpPolicy::KeepHigher),
            "replace" => Ok(TempHpPolicy::Replace),
            other => Err(format!("unknown temporary HP policy: {other:?}")),
        }
    }
}

/// Hit point tracking. `current` stays within `0..=maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
    pub temporary: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        let maximum = maximum.max(1);
        Self {
            current: maximum,
            maximum,
            temporary: 0,
        }
    }

    /// Remove hit points, temporary ones first. Negative amounts count as zero.
    pub fn take_damage(&mut self, amount: i32) -> DamageApplied {
        let amount = amount.max(0);
        let was_up = self.current > 0;

        let absorbed_by_temp = amount.min(self.temporary);
        self.temporary -= absorbed_by_temp;

        let hp_lost = (amount - absorbed_by_temp).min(self.current);
        self.current -= hp_lost;

        DamageApplied {
            absorbed_by_temp,
            hp_lost,
            total: absorbed_by_temp + hp_lost,
            dropped_to_zero: was_up && self.current == 0,
        }
    }

    /// Restore hit points up to the maximum. Returns the new current value.
    pub fn heal(&mut self, amount: i32) -> i32 {
        self.current = self.current.saturating_add(amount.max(0)).min(self.maximum);
        self.current
    }

    /// Returns the new temporary pool.
    pub fn grant_temporary(&mut self, amount: i32, policy: TempHpPolicy) -> i32 {
        let amount = amount.max(0);
        self.temporary = match policy {
            TempHpPolicy::KeepHigher => self.temporary.max(amount),
            TempHpPolicy::Replace => amount,
        };
        self.temporary
    }

    pub fn is_zero(&self) -> bool {
        self.current == 0
    }

    pub fn ratio(&self) -> f32 {
        (self.current as f32 / self.maximum as f32).max(0.0)
    }
}

/// What a single application of damage actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageApplied {
    pub absorbed_by_temp: i32,
    pub hp_lost: i32,
    /// `absorbed_by_temp + hp_lost`; never more than current + temporary before the hit.
    pub total: i32,
    /// The hit took the combatant from above 0 to exactly 0.
    pub dropped_to_zero: bool,
}

// ============================================================================
// Conditions
// ============================================================================

/// A condition on a combatant. Names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCondition {
    pub name: String,
    /// Rounds left; 0 means it lasts until removed.
    pub remaining_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ActiveCondition {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_condition_name(name),
            remaining_rounds: 0,
            source: None,
        }
    }

    pub fn for_rounds(mut self, rounds: u32) -> Self {
        self.remaining_rounds = rounds;
        self
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.remaining_rounds == 0
    }
}

pub(crate) fn normalize_condition_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// Combatant
// ============================================================================

/// A creature in an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub name: String,
    pub hit_points: HitPoints,
    pub armor_class: i32,
    #[serde(default)]
    pub modifiers: AbilityModifiers,
    #[serde(default)]
    pub initiative: i32,
    #[serde(default)]
    pub is_player: bool,
    /// Stabilized at 0 HP; no longer "down" for death-save purposes.
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub conditions: Vec<ActiveCondition>,
}

impl Combatant {
    pub fn new(
        id: impl Into<CombatantId>,
        name: impl Into<String>,
        max_hp: i32,
        armor_class: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hit_points: HitPoints::new(max_hp),
            armor_class,
            modifiers: AbilityModifiers::default(),
            initiative: 0,
            is_player: false,
            stable: false,
            conditions: Vec::new(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: AbilityModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_modifier(mut self, ability: Ability, value: i32) -> Self {
        self.modifiers.set(ability, value);
        self
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = initiative;
        self
    }

    /// Start below full health; clamped to `0..=maximum`.
    pub fn with_current_hp(mut self, current: i32) -> Self {
        self.hit_points.current = current.clamp(0, self.hit_points.maximum);
        self
    }

    pub fn as_player(mut self) -> Self {
        self.is_player = true;
        self
    }

    /// Apply damage through temporary HP first. Damage that reaches a
    /// combatant already at 0 HP undoes stabilization.
    pub fn apply_damage(&mut self, amount: i32) -> DamageApplied {
        let was_at_zero = self.hit_points.is_zero();
        let applied = self.hit_points.take_damage(amount);
        if was_at_zero && amount > applied.absorbed_by_temp {
            self.stable = false;
        }
        applied
    }

    /// Heal up to the maximum and return the new current HP.
    pub fn apply_healing(&mut self, amount: i32) -> i32 {
        let current = self.hit_points.heal(amount);
        if current > 0 {
            self.stable = false;
        }
        current
    }

    pub fn grant_temporary_hp(&mut self, amount: i32, policy: TempHpPolicy) -> i32 {
        self.hit_points.grant_temporary(amount, policy)
    }

    /// Add a condition. Re-adding an existing one keeps the longer duration
    /// (permanent beats timed). Returns true when the condition is new.
    pub fn add_condition(&mut self, condition: ActiveCondition) -> bool {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.name == condition.name)
        {
            Some(existing) => {
                if existing.is_permanent() || condition.is_permanent() {
                    existing.remaining_rounds = 0;
                } else {
                    existing.remaining_rounds =
                        existing.remaining_rounds.max(condition.remaining_rounds);
                }
                if condition.source.is_some() {
                    existing.source = condition.source;
                }
                false
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }

    /// Remove a condition by name. Returns whether it was present.
    pub fn remove_condition(&mut self, name: &str) -> bool {
        let name = normalize_condition_name(name);
        let before = self.conditions.len();
        self.conditions.retain(|c| c.name != name);
        self.conditions.len() != before
    }

    pub fn has_condition(&self, name: &str) -> bool {
        let name = normalize_condition_name(name);
        self.conditions.iter().any(|c| c.name == name)
    }

    /// Count down timed conditions by one round. Returns the names that expired.
    pub fn tick_conditions(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        self.conditions.retain_mut(|c| {
            if c.is_permanent() {
                return true;
            }
            c.remaining_rounds -= 1;
            if c.remaining_rounds == 0 {
                expired.push(c.name.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn stabilize(&mut self) {
        if self.hit_points.is_zero() {
            self.stable = true;
        }
    }

    /// At 0 HP and not stabilized.
    pub fn is_down(&self) -> bool {
        self.hit_points.is_zero() && !self.stable
    }

    pub fn is_standing(&self) -> bool {
        !self.hit_points.is_zero()
    }

    /// Check the HP and condition invariants.
    pub fn validate(&self) -> Result<(), String> {
        let hp = &self.hit_points;
        if self.id.as_str().is_empty() {
            return Err("combatant id is empty".to_string());
        }
        if hp.maximum < 1 {
            return Err(format!("{}: maximum HP {} below 1", self.id, hp.maximum));
        }
        if hp.current < 0 || hp.current > hp.maximum {
            return Err(format!(
                "{}: current HP {} outside 0..={}",
                self.id, hp.current, hp.maximum
            ));
        }
        if hp.temporary < 0 {
            return Err(format!("{}: negative temporary HP", self.id));
        }
        for (i, condition) in self.conditions.iter().enumerate() {
            if condition.name.is_empty() || condition.name != normalize_condition_name(&condition.name) {
                return Err(format!("{}: malformed condition name {:?}", self.id, condition.name));
            }
            if self.conditions[..i].iter().any(|c| c.name == condition.name) {
                return Err(format!("{}: duplicate condition {}", self.id, condition.name));
            }
        }
        Ok(())
    }

    /// Build a combatant from an Open5e monster body.
    ///
    /// Needs `name` and `hit_points`; `armor_class` may be a number or a list
    /// of `{ "value": n }` objects. Ability scores become modifiers.
    pub fn from_monster_record(id: impl Into<CombatantId>, record: &Value) -> Result<Self, CombatError> {
        let name = record
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CombatError::InvalidRecord("monster record has no name".to_string()))?;
        let hit_points = record
            .get("hit_points")
            .and_then(Value::as_i64)
            .filter(|hp| *hp > 0)
            .ok_or_else(|| {
                CombatError::InvalidRecord(format!("monster {name} has no positive hit_points"))
            })?;
        let armor_class = match record.get("armor_class") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::Array(entries)) => entries
                .first()
                .and_then(|e| e.get("value").or_else(|| e.get("ac")))
                .and_then(Value::as_i64),
            _ => None,
        }
        .ok_or_else(|| CombatError::InvalidRecord(format!("monster {name} has no armor_class")))?;

        let stat = |field: &str, value: i64| {
            i32::try_from(value).map_err(|_| {
                CombatError::InvalidRecord(format!("monster {name} has {field} {value} out of range"))
            })
        };
        let hit_points = stat("hit_points", hit_points)?;
        let armor_class = stat("armor_class", armor_class)?;

        let mut modifiers = AbilityModifiers::default();
        for ability in Ability::all() {
            if let Some(score) = record.get(ability.field_name()).and_then(Value::as_i64) {
                modifiers.set(ability, ability_modifier(stat(ability.field_name(), score)?));
            }
        }

        Ok(Combatant::new(id, name, hit_points, armor_class).with_modifiers(modifiers))
    }
}
