//! Gravitas CLI — listening-gravity aggregation and ranking.
//!
//! Usage:
//!   gravitas aggregate [--once] [--interval secs] [--db path]
//!   gravitas rank <current> <candidates>... [--similarity id=score] [--db path]

use clap::{Parser, Subcommand};
use gravitas::{
    Aggregator, AggregatorConfig, Event, EventMeta, EventLog, EventType, OpenStore, Ranker,
    SqliteStore, TrackId,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "gravitas",
    version,
    about = "Listening-gravity engine: behavioral track-transition graph and ranking"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fold new listening events into the gravity graph
    Aggregate {
        /// Process one batch and exit instead of polling forever
        #[arg(long)]
        once: bool,
        /// Seconds between polls in loop mode
        #[arg(long, default_value_t = 30)]
        interval: u64,
        /// Maximum events per batch
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
    },
    /// Rank candidate next tracks for a current track
    Rank {
        /// The track currently playing
        current: String,
        /// Candidate next tracks, in preference order for tie-breaks
        #[arg(required = true)]
        candidates: Vec<String>,
        /// Content-similarity scores as id=score pairs
        #[arg(long = "similarity", value_name = "ID=SCORE")]
        similarity: Vec<String>,
        /// Recently played tracks, penalized as repeats
        #[arg(long = "history", value_name = "ID")]
        history: Vec<String>,
    },
    /// Show a track's strongest outgoing gravity edges
    Neighbors {
        /// The track to inspect
        track: String,
        /// Maximum neighbors to show
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Append one listening event to the log
    Event {
        /// Listening session id
        session: String,
        /// Track the event refers to
        track: String,
        /// Event kind (play_start, play_10s, radio_next, skip, like, ...)
        event_type: String,
        /// Milliseconds into the track, for skip events
        #[arg(long)]
        elapsed_ms: Option<i64>,
    },
    /// Seed the log with simulated listening sessions
    Simulate {
        /// Track ids to simulate over; generated when fewer than four given
        tracks: Vec<String>,
    },
}

/// Get the default database path (~/.local/share/gravitas/gravitas.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let gravitas_dir = data_dir.join("gravitas");
    std::fs::create_dir_all(&gravitas_dir).ok();
    gravitas_dir.join("gravitas.db")
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store =
        SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

/// Parse an `id=score` pair for the similarity map
fn parse_similarity(raw: &str) -> Result<(TrackId, f64), String> {
    let (id, score) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=SCORE, got '{}'", raw))?;
    let score: f64 = score
        .parse()
        .map_err(|_| format!("invalid score in '{}'", raw))?;
    if !(0.0..=1.0).contains(&score) {
        return Err(format!("score in '{}' must be within [0, 1]", raw));
    }
    Ok((TrackId::from(id), score))
}

fn cmd_aggregate(store: Arc<SqliteStore>, once: bool, interval: u64, batch_size: usize) -> i32 {
    let config = AggregatorConfig {
        batch_size,
        poll_interval: std::time::Duration::from_secs(interval),
        ..AggregatorConfig::default()
    };
    let aggregator = Aggregator::with_config(store.clone(), store, config);

    if once {
        return match aggregator.run_until_idle() {
            Ok(n) => {
                println!("Processed {} events", n);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        };
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };
    rt.block_on(aggregator.run());
    0
}

fn cmd_rank(
    store: Arc<SqliteStore>,
    current: &str,
    candidates: &[String],
    similarity: &[String],
    history: &[String],
) -> i32 {
    let mut similarity_scores = std::collections::HashMap::new();
    for raw in similarity {
        match parse_similarity(raw) {
            Ok((id, score)) => {
                similarity_scores.insert(id, score);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }

    let candidates: Vec<TrackId> = candidates.iter().map(TrackId::from_string).collect();
    let history: Vec<TrackId> = history.iter().map(TrackId::from_string).collect();

    let ranker = Ranker::new(store);
    match ranker.rank(&TrackId::from(current), &candidates, &similarity_scores, &history) {
        Ok(ranked) => {
            match serde_json::to_string_pretty(&ranked) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return 1;
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_neighbors(store: Arc<SqliteStore>, track: &str, limit: usize) -> i32 {
    let ranker = Ranker::new(store);
    match ranker.neighbors(&TrackId::from(track), limit) {
        Ok(neighbors) => {
            if neighbors.is_empty() {
                println!("No outgoing edges for '{}'", track);
                return 0;
            }
            println!("{:<40}  {:>10}  {:>10}", "TRACK", "WEIGHT", "NORMALIZED");
            println!("{}", "-".repeat(64));
            for n in neighbors {
                println!(
                    "{:<40}  {:>10.3}  {:>10.3}",
                    n.track_id, n.weight, n.normalized_score
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_event(
    store: Arc<SqliteStore>,
    session: &str,
    track: &str,
    event_type: &str,
    elapsed_ms: Option<i64>,
) -> i32 {
    let mut event = Event::new(session, track, EventType::parse(event_type));
    if let Some(ms) = elapsed_ms {
        event = event.with_meta(EventMeta::new().with("elapsed_ms", ms));
    }
    match store.append(&event) {
        Ok(sequence) => {
            println!("Recorded {} at sequence {}", event.event_type, sequence);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_simulate(store: Arc<SqliteStore>, tracks: &[String]) -> i32 {
    let tracks: Vec<TrackId> = tracks.iter().map(TrackId::from_string).collect();
    match gravitas::simulate::seed_sessions(store.as_ref(), &tracks) {
        Ok(written) => {
            println!(
                "Seeded {} events; run `gravitas aggregate --once` to fold them in",
                written
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let store = match open_store(cli.db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Aggregate {
            once,
            interval,
            batch_size,
        } => cmd_aggregate(store, once, interval, batch_size),
        Commands::Rank {
            current,
            candidates,
            similarity,
            history,
        } => cmd_rank(store, &current, &candidates, &similarity, &history),
        Commands::Neighbors { track, limit } => cmd_neighbors(store, &track, limit),
        Commands::Event {
            session,
            track,
            event_type,
            elapsed_ms,
        } => cmd_event(store, &session, &track, &event_type, elapsed_ms),
        Commands::Simulate { tracks } => cmd_simulate(store, &tracks),
    };
    std::process::exit(code);
}
