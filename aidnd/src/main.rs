//! aidnd - deterministic rules engine on the command line.
//!
//! Every command prints JSON so an orchestrating agent can read the result.
//!
//! ```bash
//! aidnd roll "adv(1d20+5)" --seed 7
//! aidnd search monster gobln
//! aidnd lookup spell "Tasha's Hideous Laughter" --full
//! aidnd encounter start table-1 --party party.json --monster goblin --monster goblin
//! aidnd encounter attack table-1 fighter goblin-1 --damage 1d8+3 --ability str
//! ```

mod commands;

use aidnd_core::catalog::ResourceKind;
use aidnd_core::combatant::Ability;
use aidnd_core::persist::SessionId;
use aidnd_core::EngineConfig;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "aidnd", version, about = "D&D 5e dice, combat and catalog lookups")]
struct Cli {
    /// Override AIDND_STATE_DIR.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a dice expression.
    Roll {
        notation: String,
        #[arg(long)]
        seed: Option<u64>,
        #[command(flatten)]
        advantage: AdvantageFlags,
    },

    /// Fuzzy search the catalog.
    Search {
        kind: ResourceKind,
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Ask the Open5e API instead of the local catalog.
        #[arg(long)]
        remote: bool,
    },

    /// Exact lookup by name or slug.
    Lookup {
        kind: ResourceKind,
        name: String,
        /// Prefer this source document when several share the slug.
        #[arg(long)]
        prefer_doc: Option<String>,
        /// Include the full record body, fetching it if needed.
        #[arg(long)]
        full: bool,
    },

    /// Fetch a full record through the cache.
    Fetch { kind: ResourceKind, slug: String },

    /// Drop a cached record.
    Evict { kind: ResourceKind, slug: String },

    /// Run an encounter stored as a snapshot.
    #[command(subcommand)]
    Encounter(EncounterCommand),
}

#[derive(Subcommand)]
enum EncounterCommand {
    /// Start a new encounter.
    Start {
        session: SessionId,
        /// JSON file with an array of combatants.
        #[arg(long)]
        party: Option<PathBuf>,
        /// Monster to add from the catalog (repeatable).
        #[arg(long = "monster")]
        monsters: Vec<String>,
        /// Seed for monster initiative rolls.
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the current snapshot.
    Show { session: SessionId },

    /// Resolve an attack and save the result.
    Attack {
        session: SessionId,
        attacker: String,
        defender: String,
        #[arg(long, default_value = "1d20")]
        attack: String,
        #[arg(long)]
        damage: String,
        /// Ability modifier to add to the attack roll.
        #[arg(long)]
        ability: Option<Ability>,
        #[arg(long)]
        ranged: bool,
        #[command(flatten)]
        advantage: AdvantageFlags,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Apply damage outside an attack.
    Damage {
        session: SessionId,
        target: String,
        amount: i32,
    },

    Heal {
        session: SessionId,
        target: String,
        amount: i32,
    },

    /// Grant temporary hit points.
    TempHp {
        session: SessionId,
        target: String,
        amount: i32,
    },

    /// Add or remove a condition.
    Condition {
        session: SessionId,
        target: String,
        name: String,
        /// Rounds until it wears off; 0 lasts until removed.
        #[arg(long, default_value_t = 0)]
        rounds: u32,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        remove: bool,
    },

    /// Advance to the next turn.
    Next { session: SessionId },

    /// Archive the encounter.
    End { session: SessionId },

    /// List stored encounters.
    List,
}

#[derive(Args, Clone, Copy)]
struct AdvantageFlags {
    #[arg(long, conflicts_with = "disadvantage")]
    advantage: bool,
    #[arg(long)]
    disadvantage: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aidnd=info,aidnd_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env()?;
    if let Some(state_dir) = cli.state_dir {
        if config.cache_dir == Some(config.state_dir.join("cache")) {
            config.cache_dir = Some(state_dir.join("cache"));
        }
        config.state_dir = state_dir;
    }

    commands::run(cli.command, &config).await
}
