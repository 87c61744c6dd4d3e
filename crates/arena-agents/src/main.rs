use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arena_agents::{build_gateway, load_roster, seed_store, ArenaConfig};
use clap::{Parser, Subcommand};
use coordination::arena::DEFAULT_CATEGORY;
use coordination::debate::prompts::SYSTEM_LABEL;
use coordination::state::PersonaStore;
use coordination::events::FilteredReceiver;
use coordination::{
    ArenaEvent, ArenaSnapshot, DebateEngine, EventBus, EventFilter, MatchEngine, MemoryStore,
    Persona, ReputationLedger, Sender, SharedEventBus, SharedReputationLedger,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "arena", about = "Autonomous persona debates and judged matches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed a topic and let the personas argue for a while
    Debate {
        /// Topic injected by the moderator
        #[arg(long)]
        title: String,
        /// TOML persona roster to load before starting
        #[arg(long)]
        roster: Option<PathBuf>,
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,
        /// Restrict turn selection to these persona ids
        #[arg(long, value_delimiter = ',')]
        participants: Vec<String>,
        /// JSON snapshot to resume from and save back to
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Run one judged match between personas
    Match {
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Challenge category
        #[arg(long = "type", default_value = DEFAULT_CATEGORY)]
        kind: String,
        #[arg(long, default_value_t = 3)]
        rounds: u32,
        /// Persona ids in speaking order; defaults to every active persona
        #[arg(long, value_delimiter = ',')]
        participants: Vec<String>,
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Print personas and reputation totals from a snapshot
    Standings {
        #[arg(long)]
        state: PathBuf,
    },
}

/// Stores and ledger shared by every command.
struct Runtime {
    store: Arc<MemoryStore>,
    ledger: SharedReputationLedger,
    events: SharedEventBus,
}

impl Runtime {
    fn open(state: Option<&Path>, roster: Option<&Path>) -> Result<Self> {
        let events = EventBus::new().shared();
        let (store, ledger) = match state {
            Some(path) if path.exists() => ArenaSnapshot::load(path)
                .with_context(|| format!("Failed to load state from {}", path.display()))?
                .restore(),
            _ => (MemoryStore::new(), ReputationLedger::new()),
        };

        if let Some(path) = roster {
            let personas = load_roster(path)
                .with_context(|| format!("Failed to load roster {}", path.display()))?;
            seed_store(&store, personas).context("Failed to seed roster")?;
        }

        Ok(Self {
            store: store.shared(),
            ledger: ledger.with_events(events.clone()).shared(),
            events,
        })
    }

    fn save(&self, state: Option<&Path>) -> Result<()> {
        let Some(path) = state else {
            return Ok(());
        };
        ArenaSnapshot::capture(&self.store, Some(&*self.ledger))
            .context("Failed to capture state")?
            .save(path)
            .with_context(|| format!("Failed to save state to {}", path.display()))?;
        info!(path = %path.display(), "State saved");
        Ok(())
    }

    fn names(&self) -> Result<HashMap<String, String>> {
        let tables = self.store.tables()?;
        Ok(tables
            .personas
            .values()
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect())
    }
}

fn speaker_label<'a>(sender: &'a Sender, names: &'a HashMap<String, String>) -> &'a str {
    match sender {
        Sender::System => SYSTEM_LABEL,
        Sender::Participant(id) => names.get(id).map(String::as_str).unwrap_or(id),
    }
}

/// Echo utterances to stdout as they land.
fn spawn_printer(
    mut events: FilteredReceiver,
    names: HashMap<String, String>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(ArenaEvent::UtteranceAppended { sender, content_preview, .. }) => {
                        println!("[{}] {}", speaker_label(&sender, &names), content_preview);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

async fn run_debate(
    config: &ArenaConfig,
    title: String,
    roster: Option<PathBuf>,
    duration: Duration,
    participants: Vec<String>,
    state: Option<PathBuf>,
) -> Result<()> {
    let runtime = Runtime::open(state.as_deref(), roster.as_deref())?;
    if runtime.store.list_active().await?.is_empty() {
        bail!("No active personas; pass --roster with at least one persona");
    }
    let names = runtime.names()?;

    let gateway = build_gateway(config).context("Failed to build completion gateway")?;
    let engine = DebateEngine::new(runtime.store.clone(), gateway, config.debate.clone())
        .with_events(runtime.events.clone())
        .shared();

    let shutdown = CancellationToken::new();
    let utterances = runtime
        .events
        .subscribe_filtered(EventFilter::new().types(vec!["utterance_appended"]));
    let printer = spawn_printer(utterances, names.clone(), shutdown.clone());
    let driver = engine.spawn_driver(shutdown.clone());

    let conversation = engine
        .create_conversation(Some(&title), participants)
        .await
        .context("Failed to create conversation")?;
    info!(
        conversation_id = %conversation.id,
        duration_secs = duration.as_secs(),
        "Debate running"
    );

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    engine
        .toggle_simulation(&conversation.id, false)
        .await
        .context("Failed to pause conversation")?;
    shutdown.cancel();
    driver.await.context("Debate driver panicked")?;
    printer.await.context("Event printer panicked")?;

    let view = engine.get_conversation(&conversation.id).await?;
    println!("\n=== Transcript ({} utterances) ===", view.utterances.len());
    for utterance in &view.utterances {
        println!("{}: {}", speaker_label(&utterance.sender, &names), utterance.content);
    }

    runtime.save(state.as_deref())
}

async fn run_match(
    config: &ArenaConfig,
    roster: Option<PathBuf>,
    kind: String,
    rounds: u32,
    participants: Vec<String>,
    state: Option<PathBuf>,
) -> Result<()> {
    let runtime = Runtime::open(state.as_deref(), roster.as_deref())?;
    let participants = if participants.is_empty() {
        runtime
            .store
            .list_active()
            .await?
            .into_iter()
            .map(|p: Persona| p.id)
            .collect()
    } else {
        participants
    };

    let gateway = build_gateway(config).context("Failed to build completion gateway")?;
    let engine = MatchEngine::new(runtime.store.clone(), gateway, config.matches.clone())
        .with_events(runtime.events.clone())
        .with_reputation(runtime.ledger.clone());

    let tournament = engine
        .create_tournament(&format!("{kind} cup"), &kind)
        .await?;
    let m = engine
        .create_match(&tournament.id, participants)
        .await
        .context("Failed to create match")?;
    let finished = engine.run_match(&m.id, rounds).await?;
    let result = finished
        .result
        .context("Finished match carries no result")?;

    let names = runtime.names()?;
    let label = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());
    println!("{}", result.transcript);
    println!("=== Verdict ===");
    println!("Challenge ({}): {}", result.kind, result.challenge);
    println!("Winner: {}", label(&result.winner_id));
    println!("Reason: {}", result.judge_reason);
    if result.judge_fallback {
        println!("(judge unavailable, fallback verdict)");
    }
    for (id, score) in &result.scores {
        println!("  {:<24} {score:>6.1}", label(id));
    }

    runtime.save(state.as_deref())
}

fn print_standings(state: &Path) -> Result<()> {
    let (store, ledger) = ArenaSnapshot::load(state)
        .with_context(|| format!("Failed to load state from {}", state.display()))?
        .restore();
    let tables = store.tables()?;

    let mut rows = Vec::with_capacity(tables.personas.len());
    for persona in tables.personas.values() {
        rows.push((ledger.total(&persona.id)?, persona));
    }
    rows.sort_by(|a, b| b.0.total_cmp(&a.0));

    println!("{:<24} {:<10} {:>8}", "persona", "status", "score");
    for (total, persona) in rows {
        println!(
            "{:<24} {:<10} {total:>8.1}",
            persona.name,
            persona.status.to_string()
        );
    }
    println!(
        "{} matches, {} conversations",
        tables.matches.len(),
        tables.conversations.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ArenaConfig::from_env();

    match cli.command {
        Command::Debate {
            title,
            roster,
            duration_secs,
            participants,
            state,
        } => {
            run_debate(
                &config,
                title,
                roster,
                Duration::from_secs(duration_secs),
                participants,
                state,
            )
            .await
        }
        Command::Match {
            roster,
            kind,
            rounds,
            participants,
            state,
        } => run_match(&config, roster, kind, rounds, participants, state).await,
        Command::Standings { state } => print_standings(&state),
    }
}
