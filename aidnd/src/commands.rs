//! Command implementations. Each prints one JSON document to stdout.

use aidnd_core::catalog::slugify;
use aidnd_core::conditions::ConditionRules;
use aidnd_core::dice::{Advantage, DiceExpression};
use aidnd_core::persist::{SessionId, SnapshotStore, StoreError};
use aidnd_core::{ActiveCondition, AttackOptions, Combatant, CombatantId, EngineConfig, Encounter};
use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

use crate::{AdvantageFlags, Command, EncounterCommand};

impl AdvantageFlags {
    fn resolve(self) -> Advantage {
        Advantage::from_flags(self.advantage, self.disadvantage)
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn dice_source(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

pub async fn run(command: Command, config: &EngineConfig) -> Result<()> {
    match command {
        Command::Roll {
            notation,
            seed,
            advantage,
        } => {
            let expr = DiceExpression::parse(&notation)?.with_d20_advantage(advantage.resolve());
            let roll = expr.evaluate(&mut dice_source(seed));
            print_json(&json!({
                "expression": expr.to_string(),
                "total": roll.total,
                "dice": roll.dice,
                "display": roll.to_string(),
            }))
        }

        Command::Search {
            kind,
            query,
            limit,
            remote,
        } => {
            if remote {
                let client = config.open5e_client()?;
                let page = client
                    .search(kind.as_str(), &query, limit.unwrap_or(config.search_limit))
                    .await
                    .context("remote search failed")?;
                return print_json(&json!({"count": page.count, "results": page.results}));
            }

            let index = config.catalog_index().await?;
            let hits: Vec<_> = index
                .fuzzy_search_scored(kind, &query, limit.unwrap_or(config.search_limit))
                .into_iter()
                .map(|hit| json!({"score": hit.score, "record": hit.record}))
                .collect();
            print_json(&hits)
        }

        Command::Lookup {
            kind,
            name,
            prefer_doc,
            full,
        } => {
            if full {
                let compendium = config.compendium().await?;
                let record = compendium.full_record(kind, &name).await?;
                return print_json(&record);
            }
            let index = config.catalog_index().await?;
            let record = index.exact_lookup_in(kind, &name, prefer_doc.as_deref())?;
            print_json(record)
        }

        Command::Fetch { kind, slug } => {
            let compendium = config.compendium().await?;
            let entry = compendium.cache().fetch_and_cache(kind, &slug).await?;
            print_json(&*entry)
        }

        Command::Evict { kind, slug } => {
            let compendium = config.compendium().await?;
            let removed = compendium.cache().evict(kind, &slug).await?;
            print_json(&json!({"kind": kind, "slug": slugify(&slug), "removed": removed}))
        }

        Command::Encounter(command) => run_encounter(command, config).await,
    }
}

async fn run_encounter(command: EncounterCommand, config: &EngineConfig) -> Result<()> {
    let store = config.snapshot_store().await?;
    let rules = ConditionRules::standard();

    match command {
        EncounterCommand::Start {
            session,
            party,
            monsters,
            seed,
        } => {
            ensure_no_encounter(&store, &session).await?;

            let mut combatants: Vec<Combatant> = match party {
                Some(path) => {
                    let json = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?
                }
                None => Vec::new(),
            };

            if !monsters.is_empty() {
                let compendium = config.compendium().await?;
                let mut dice = dice_source(seed);
                let initiative = DiceExpression::d20();
                let mut counts: HashMap<String, u32> = HashMap::new();

                for name in &monsters {
                    let slug = compendium.resolve(aidnd_core::ResourceKind::Monsters, name)?.slug.clone();
                    let n = counts.entry(slug.clone()).or_insert(0);
                    *n += 1;
                    let id = format!("{slug}-{n}");

                    let monster = compendium.monster_combatant(id.as_str(), name).await?;
                    let roll = initiative
                        .with_modifier(i64::from(monster.modifiers.dexterity))
                        .evaluate(&mut dice);
                    let rolled = i32::try_from(roll.total).unwrap_or_default();
                    combatants.push(monster.with_initiative(rolled));
                }
            }

            if combatants.is_empty() {
                bail!("an encounter needs at least one combatant (--party or --monster)");
            }
            let encounter = Encounter::new(combatants)?;
            save(&store, &session, &encounter).await?;
            info!(session = %session, combatants = encounter.combatants().len(), "encounter started");
            print_json(&encounter)
        }

        EncounterCommand::Show { session } => print_json(&store.load(&session).await?),

        EncounterCommand::Attack {
            session,
            attacker,
            defender,
            attack,
            damage,
            ability,
            ranged,
            advantage,
            seed,
        } => {
            // Parse both rolls before loading anything so a typo changes nothing.
            let attack: DiceExpression = attack.parse()?;
            let damage: DiceExpression = damage.parse()?;

            let encounter = store.load(&session).await?;
            let mut options = if ranged {
                AttackOptions::ranged()
            } else {
                AttackOptions::melee()
            }
            .with_advantage(advantage.resolve())
            .with_downed_policy(config.rules.downed_defender);
            if let Some(ability) = ability {
                options = options.with_ability(ability);
            }

            let (encounter, outcome) = encounter.resolve_attack(
                &CombatantId::from(attacker),
                &CombatantId::from(defender),
                &attack,
                &damage,
                &options,
                &rules,
                &mut dice_source(seed),
            )?;
            save(&store, &session, &encounter).await?;
            print_json(&json!({"outcome": outcome, "resolved": encounter.is_resolved()}))
        }

        EncounterCommand::Damage {
            session,
            target,
            amount,
        } => {
            let encounter = store.load(&session).await?;
            let (encounter, applied) = encounter.apply_damage(&CombatantId::from(target), amount)?;
            save(&store, &session, &encounter).await?;
            print_json(&applied)
        }

        EncounterCommand::Heal {
            session,
            target,
            amount,
        } => {
            let encounter = store.load(&session).await?;
            let (encounter, current) = encounter.apply_healing(&CombatantId::from(target), amount)?;
            save(&store, &session, &encounter).await?;
            print_json(&json!({"current_hp": current}))
        }

        EncounterCommand::TempHp {
            session,
            target,
            amount,
        } => {
            let encounter = store.load(&session).await?;
            let (encounter, temporary) =
                encounter.grant_temporary_hp(&CombatantId::from(target), amount, config.rules.temp_hp)?;
            save(&store, &session, &encounter).await?;
            print_json(&json!({"temporary_hp": temporary}))
        }

        EncounterCommand::Condition {
            session,
            target,
            name,
            rounds,
            source,
            remove,
        } => {
            let encounter = store.load(&session).await?;
            let target = CombatantId::from(target);
            let (encounter, changed) = if remove {
                encounter.remove_condition(&target, &name)?
            } else {
                if !rules.is_known(&name) {
                    tracing::warn!(condition = %name, "condition has no mechanical effect");
                }
                let mut condition = ActiveCondition::new(&name).for_rounds(rounds);
                if let Some(source) = source {
                    condition = condition.from_source(source);
                }
                encounter.add_condition(&target, condition)?
            };
            save(&store, &session, &encounter).await?;
            print_json(&json!({"changed": changed}))
        }

        EncounterCommand::Next { session } => {
            let encounter = store.load(&session).await?;
            let (encounter, advance) = encounter.next_turn();
            save(&store, &session, &encounter).await?;
            print_json(&json!({
                "advance": advance,
                "current": encounter.current().map(|c| c.id.clone()),
            }))
        }

        EncounterCommand::End { session } => {
            let path = store.archive(&session).await?;
            print_json(&json!({"archived": path}))
        }

        EncounterCommand::List => print_json(&store.list().await?),
    }
}

/// Refuse to start over an existing snapshot, including one that no longer
/// loads: a corrupt file is reported rather than overwritten.
async fn ensure_no_encounter(store: &SnapshotStore, session: &SessionId) -> Result<()> {
    match store.load(session).await {
        Err(StoreError::NotFound(_)) => Ok(()),
        Ok(_) => bail!("session {session} already has an encounter; end it first"),
        Err(e) => Err(aidnd_core::Error::from(e))
            .with_context(|| format!("session {session} has an unreadable snapshot; archive or delete it first")),
    }
}

async fn save(store: &SnapshotStore, session: &SessionId, encounter: &Encounter) -> Result<()> {
    store
        .save(session, encounter)
        .await
        .with_context(|| format!("saving session {session}"))
}
