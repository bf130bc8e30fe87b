//! # Dr. Docent CLI (`docent`)
//!
//! Runs the HTTP API and exposes the scoring, radar and literature tools
//! for local use.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent init` | Create the SQLite database and run schema migrations |
//! | `docent serve` | Start the HTTP API server |
//! | `docent score` | Print the daily score for a set of activities |
//! | `docent radar` | Print the health radar for a profile |
//! | `docent age` | Print age-based targets for a birth date |
//! | `docent ranking` | Print the daily ranking |
//! | `docent papers search/feed/import` | Work with the paper store |
//! | `docent tools list` | List registered assistant tools |
//!
//! Log output goes to stderr; `RUST_LOG` overrides the default `info` level.

use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docent::clients::Clients;
use docent::{config, db, health, migrate, models, papers, radar, ranking, scoring, server, traits};

/// Dr. Docent: health tracking backend with daily scoring, drug-nutrient
/// interaction checks and a literature-grounded chat assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docent.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "docent", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP API server.
    Serve,

    /// Print the daily score for the given activities.
    Score {
        /// Number of meals logged.
        #[arg(long, default_value_t = 0)]
        meals: i64,
        #[arg(long)]
        exercise: bool,
        #[arg(long)]
        medication: bool,
        #[arg(long)]
        sleep: bool,
    },

    /// Print the five radar axes and the overall score as JSON.
    Radar {
        #[arg(long)]
        age: Option<u32>,
        /// Height in centimetres.
        #[arg(long)]
        height: Option<f64>,
        /// Weight in kilograms.
        #[arg(long)]
        weight: Option<f64>,
        /// Free-text conditions, e.g. "고혈압, 당뇨".
        #[arg(long)]
        conditions: Option<String>,
    },

    /// Print the age, group, targets and guide for a birth date as JSON.
    Age {
        /// Birth date (YYYY-MM-DD).
        #[arg(long)]
        birth_date: String,
    },

    /// Print the daily ranking from the database.
    Ranking {
        /// Ranking date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<String>,
        /// Also report this user's position.
        #[arg(long)]
        user: Option<String>,
    },

    /// Work with the stored medical paper chunks.
    Papers {
        #[command(subcommand)]
        action: PapersAction,
    },

    /// Inspect the assistant tool registry.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum PapersAction {
    /// Search stored chunks (vector search, falling back to keywords).
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Fetch, filter, chunk and store papers for a query.
    Feed {
        query: String,
        /// Feed even when the store already covers the query.
        #[arg(long)]
        skip_cache: bool,
    },
    /// Import paper chunks from a JSON-lines file.
    Import { path: PathBuf },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List registered tools with their parameter schemas.
    List,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Score {
            meals,
            exercise,
            medication,
            sleep,
        } => {
            let activity = scoring::DayActivity {
                meal_count: *meals,
                has_exercise: *exercise,
                has_medication: *medication,
                has_sleep: *sleep,
            };
            let caps = config::ScoringConfig::default();
            println!("{}", scoring::daily_score(&activity, caps.daily_cap));
            return Ok(());
        }
        Commands::Radar {
            age,
            height,
            weight,
            conditions,
        } => {
            let input = radar::RadarInput {
                age: *age,
                height_cm: *height,
                weight_kg: *weight,
                conditions: conditions.as_deref(),
            };
            return print_json(&radar::report(&input));
        }
        Commands::Age { birth_date } => {
            let birth = models::parse_date(birth_date)?;
            let today = Local::now().date_naive();
            let Some(age) = health::age_from_birth_date(birth, today) else {
                anyhow::bail!("birth date out of range: {}", birth_date);
            };
            return print_json(&health::age_summary(age));
        }
        Commands::Tools {
            action: ToolsAction::List,
        } => {
            let registry = traits::ToolRegistry::with_builtins();
            for info in registry.infos() {
                let tag = if info.builtin { "builtin" } else { "custom" };
                println!("{} ({}): {}", info.name, tag, info.description);
            }
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ranking { date, user } => {
            let date = match date {
                Some(d) => models::parse_date(&d)?,
                None => Local::now().date_naive(),
            };
            let pool = db::connect(&cfg).await?;
            let response =
                ranking::daily_ranking(&pool, user.as_deref().unwrap_or(""), date).await?;
            print_json(&response)?;
        }
        Commands::Papers { action } => {
            let pool = db::open(&cfg).await?;
            let clients = Clients::from_config(&cfg)?;
            match action {
                PapersAction::Search { query, limit } => {
                    let limit = limit.unwrap_or(cfg.papers.top_k);
                    let chunks = papers::search_papers(
                        &pool,
                        clients.embedder.as_ref(),
                        &query,
                        cfg.papers.match_threshold,
                        limit,
                    )
                    .await?;
                    if chunks.is_empty() {
                        println!("No results.");
                    }
                    for (i, c) in chunks.iter().enumerate() {
                        println!(
                            "{}. [{:.3}] {} (PMID: {}, citations: {})",
                            i + 1,
                            c.similarity,
                            c.title,
                            c.pmid,
                            c.citation_count
                        );
                    }
                }
                PapersAction::Feed { query, skip_cache } => {
                    let result = clients.feeder(&pool, &cfg).run(&query, skip_cache).await;
                    print_json(&result)?;
                }
                PapersAction::Import { path } => {
                    let provider = clients
                        .embedder
                        .is_enabled()
                        .then_some(clients.embedder.as_ref());
                    let stats = papers::import_jsonl(&pool, provider, &path).await?;
                    print_json(&stats)?;
                }
            }
        }
        Commands::Score { .. } | Commands::Radar { .. } | Commands::Age { .. } | Commands::Tools { .. } => {}
    }

    Ok(())
}
