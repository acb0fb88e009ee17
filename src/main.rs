use clap::{Parser, Subcommand};
use lanescout::backfill::{self, BackfillQueue};
use lanescout::collector::{CollectionJob, JobSettings};
use lanescout::config::Config;
use lanescout::logger::{self, LogTag};
use lanescout::riot::RiotClient;
use lanescout::scheduler;
use lanescout::store::{self, MatchupStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "lanescout",
    about = "Collects and serves lane matchup statistics from ranked match history",
    version
)]
struct Cli {
    /// Path to the JSON config file (created with defaults when missing)
    #[arg(long, global = true, default_value = "lanescout.json")]
    config: String,

    // Logger flags; parsed independently by the logger via arguments.rs,
    // declared here so clap accepts them
    #[arg(long, global = true, hide = true)]
    verbose: bool,
    #[arg(long, global = true, hide = true)]
    quiet: bool,
    #[arg(long, global = true, hide = true)]
    debug_api: bool,
    #[arg(long, global = true, hide = true)]
    debug_collector: bool,
    #[arg(long, global = true, hide = true)]
    debug_cache: bool,
    #[arg(long, global = true, hide = true)]
    debug_backfill: bool,
    #[arg(long, global = true, hide = true)]
    debug_scheduler: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one bulk collection job (resumes from its checkpoint if present)
    Collect {
        /// Display patch to collect, e.g. 25.10
        #[arg(long)]
        patch: String,

        /// Lanes to aggregate (comma separated); defaults to the config set
        #[arg(long, value_delimiter = ',')]
        lanes: Vec<String>,

        /// Override collection.player_pool
        #[arg(long)]
        players: Option<usize>,

        /// Override collection.matches_per_player
        #[arg(long)]
        matches_per_player: Option<usize>,

        /// Override collection.max_matches
        #[arg(long)]
        max_matches: Option<usize>,

        /// Override the checkpoint file path
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },

    /// Run the daemon: nightly bulk runs plus the backfill worker
    Schedule {
        #[arg(long)]
        patch: String,

        #[arg(long, value_delimiter = ',')]
        lanes: Vec<String>,
    },

    /// Show cache freshness counts for a patch
    Overview {
        #[arg(long)]
        patch: String,

        #[arg(long)]
        lane: Option<String>,
    },

    /// List cached pairs, most recently computed first
    Pairs {
        #[arg(long)]
        patch: String,

        #[arg(long)]
        lane: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only pairs that are still fresh
        #[arg(long)]
        fresh_only: bool,
    },

    /// List champions observed in a lane
    Champions {
        #[arg(long)]
        patch: String,

        #[arg(long)]
        lane: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lanescout: {:#}", e);
            std::process::exit(1);
        }
    };

    logger::init(config.log_file.as_deref());
    logger::info(LogTag::System, "🚀 lanescout starting up");

    let exit_code = match run(cli, config).await {
        Ok(()) => 0,
        Err(e) => {
            logger::error(LogTag::System, &format!("{:#}", e));
            1
        }
    };

    logger::flush();
    std::process::exit(exit_code);
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Collect {
            patch,
            lanes,
            players,
            matches_per_player,
            max_matches,
            checkpoint,
        } => {
            let client = build_client(&config)?;
            let store = open_store(&config).await?;

            let mut settings = JobSettings::bulk(&config, &patch, lanes);
            if let Some(players) = players {
                settings.params.player_pool = players;
            }
            if let Some(matches_per_player) = matches_per_player {
                settings.params.matches_per_player = matches_per_player;
            }
            if let Some(max_matches) = max_matches {
                settings.params.max_matches = max_matches;
            }
            if let Some(checkpoint) = checkpoint {
                settings.checkpoint_path = Some(checkpoint);
            }

            let job = CollectionJob::new(client, store, settings);
            let outcome = job.run().await?;

            println!(
                "processed {} matches ({} skipped), wrote {} records{}",
                outcome.matches_processed,
                outcome.items_skipped,
                outcome.records_written,
                if outcome.resumed { " [resumed]" } else { "" }
            );
            Ok(())
        }

        Commands::Schedule { patch, lanes } => {
            let client = build_client(&config)?;
            let store = open_store(&config).await?;

            let (queue, rx) = BackfillQueue::new(&config);
            let worker = backfill::spawn_worker(
                queue,
                rx,
                client.clone(),
                store.clone(),
                config.clone(),
            );

            if config.scheduler.enabled {
                let nightly = tokio::spawn(scheduler::run_nightly(
                    client,
                    store,
                    config.clone(),
                    patch,
                    lanes,
                ));

                tokio::signal::ctrl_c().await?;
                logger::info(LogTag::System, "shutting down");
                nightly.abort();
            } else {
                logger::warning(
                    LogTag::Scheduler,
                    "scheduler disabled in config; running backfill worker only",
                );
                tokio::signal::ctrl_c().await?;
                logger::info(LogTag::System, "shutting down");
            }
            worker.abort();
            Ok(())
        }

        Commands::Overview { patch, lane } => {
            let store = open_store(&config).await?;
            let overview = store
                .overview(&patch, lane.as_deref(), chrono::Utc::now())
                .await?;

            println!("patch {} {}", patch, lane.as_deref().unwrap_or("(all lanes)"));
            println!("  total: {}", overview.total);
            println!("  fresh: {}", overview.fresh);
            println!("  stale: {}", overview.stale);
            match overview.latest_computed_at {
                Some(ts) => println!("  latest: {}", ts.to_rfc3339()),
                None => println!("  latest: -"),
            }
            Ok(())
        }

        Commands::Pairs {
            patch,
            lane,
            limit,
            fresh_only,
        } => {
            let store = open_store(&config).await?;
            let pairs = store
                .list_pairs(&patch, lane.as_deref(), limit, fresh_only, chrono::Utc::now())
                .await?;

            if pairs.is_empty() {
                println!("no cached pairs for patch {}", patch);
                return Ok(());
            }
            for pair in pairs {
                println!(
                    "{:<8} {:>3} games  {} vs {}  ({})",
                    pair.lane,
                    pair.games,
                    pair.player_champion,
                    pair.enemy_champion,
                    pair.computed_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }

        Commands::Champions { patch, lane } => {
            let store = open_store(&config).await?;
            let champions = store.champions_in_lane(&patch, &lane).await?;

            if champions.is_empty() {
                println!("no champions recorded for {} {}", patch, lane);
            } else {
                println!("{}", champions.join("\n"));
            }
            Ok(())
        }
    }
}

fn build_client(config: &Config) -> anyhow::Result<Arc<RiotClient>> {
    let api_key = config.resolved_api_key()?;
    Ok(Arc::new(RiotClient::new(&config.riot, api_key)?))
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn MatchupStore>> {
    logger::debug(
        LogTag::Cache,
        &format!("opening {} store", config.storage.backend),
    );
    Ok(store::open_store(&config.storage).await?)
}
