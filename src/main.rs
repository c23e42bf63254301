//! War of Cells
//!
//! Headless driver for the simulation.
//!
//! ```text
//! war-of-cells [demo [level] [history-file]]
//! war-of-cells relay [host] [port]
//! ```
//!
//! `demo` plays AI against AI on a built-in level, records the game, replays
//! the recording and checks that both runs end on the same state hash.
//! `relay` runs the peer relay until Ctrl-C.

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use war_of_cells::{
    TICK_RATE, VERSION,
    core::hash::short_hex,
    game::{
        AiController, AiDifficulty, Faction, GameData, GameEventData, Simulation, SimulationConfig,
        events::EventSink,
        summary::format_time,
    },
    network::{peer::validate_address, RelayConfig, RelayServer},
    replay::{GameHistory, GameRecorder, GameType, Playback},
};

/// Seed for the demo match.
const DEMO_SEED: u64 = 12345;

/// Give up on a demo match after ten simulated minutes.
const MAX_DEMO_TICKS: u32 = 10 * 60 * TICK_RATE;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("War of Cells v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("demo") => {
            let level = args.get(1).map(String::as_str).unwrap_or("level1");
            demo_match(level, args.get(2).map(String::as_str))
        }
        Some("relay") => {
            let host = args.get(1).map(String::as_str).unwrap_or("127.0.0.1");
            let port = match args.get(2) {
                Some(p) => p.parse().with_context(|| format!("invalid port '{}'", p))?,
                None => 5555,
            };
            run_relay(host, port)
        }
        Some(other) => bail!("unknown command '{}' (expected demo or relay)", other),
    }
}

/// Play AI vs AI, record, replay, and compare hashes.
fn demo_match(level: &str, save_to: Option<&str>) -> anyhow::Result<()> {
    info!("=== Starting Demo Match on {} ===", level);

    let mut data = GameData::builtin()?;
    let config = SimulationConfig::default();
    let placements = data.build_placements(level, &config)?;
    let mut sim = Simulation::new(config, DEMO_SEED, &placements);
    info!("RNG Seed: {}", DEMO_SEED);
    info!("{} cells", sim.cells().count());

    let mut recorder = GameRecorder::new(level, GameType::SinglePlayer).with_ai(AiDifficulty::Easy);
    let mut controllers = [
        AiController::new(Faction::Player, AiDifficulty::Medium, DEMO_SEED ^ 1),
        AiController::new(Faction::Enemy, AiDifficulty::Easy, DEMO_SEED ^ 2),
    ];

    let mut total_events = 0;
    while !sim.is_over() && sim.tick_count() < MAX_DEMO_TICKS {
        for ai in controllers.iter_mut() {
            if let Some(command) = ai.decide(&sim) {
                if let Err(reason) = sim.apply(command) {
                    warn!(?command, %reason, "AI command rejected");
                }
            }
        }
        sim.tick();

        for event in sim.take_events() {
            match &event.data {
                GameEventData::CellCaptured { cell_id, new_type, cause, .. } => {
                    info!("Tick {}: cell {} captured by {:?} ({:?})", event.tick, cell_id, new_type, cause);
                }
                GameEventData::GameEnd { winner, time, .. } => {
                    info!("Game over after {}: {} wins", time, winner.name());
                }
                _ => {}
            }
            recorder.on_event(&event);
            total_events += 1;
        }

        if sim.tick_count() % (10 * TICK_RATE) == 0 {
            info!(
                "Tick {}: {} bridges, {} balls, score {}",
                sim.tick_count(),
                sim.bridges().count(),
                sim.balls().count(),
                sim.score()
            );
        }
    }

    // Print final results
    info!("=== Match Results ===");
    let hash = sim.state_hash();
    info!("Final State Hash: {}", short_hex(&hash));
    info!("Total events: {}", total_events);
    match sim.winner() {
        Some(winner) => {
            let secs = sim.now_ms() / 1000;
            let stars = data.record_result(level, sim.score(), secs);
            info!("Winner: {} in {}, score {}, {} stars", winner.name(), format_time(secs), sim.score(), stars);
        }
        None => info!("No winner after {} ticks", sim.tick_count()),
    }

    let history = recorder.finish();
    if let Some(path) = save_to {
        history.save(path)?;
        info!("History saved to {}", path);
    }

    // Verify determinism by replaying the XML form of the recording
    info!("=== Verifying Determinism ===");
    let reloaded = GameHistory::from_xml(&history.to_xml()?)?;
    let mut playback = Playback::new(&reloaded)?;
    playback.advance_to_tick(sim.tick_count());
    let replay_hash = playback.simulation().state_hash();
    info!("Replay State Hash: {}", short_hex(&replay_hash));

    if hash == replay_hash {
        info!("DETERMINISM VERIFIED: Hashes match!");
        Ok(())
    } else {
        bail!("DETERMINISM FAILURE: Hashes differ ({} skipped commands)", playback.skipped())
    }
}

/// Run the relay until Ctrl-C.
fn run_relay(host: &str, port: u16) -> anyhow::Result<()> {
    let bind_addr = validate_address(host, port)?;
    let server = RelayServer::new(RelayConfig {
        bind_addr,
        ..Default::default()
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(async {
        tokio::select! {
            result = server.run() => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                server.shutdown();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
