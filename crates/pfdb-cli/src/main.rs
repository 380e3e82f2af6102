mod runtime;
mod watch;

use clap::{Parser, Subcommand};
use pfdb_db::{ContentQuery, SortKey};
use pfdb_pipeline::ProfileService;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pfdb-cli")]
#[command(about = "Social profile acquisition and analytics")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve a profile from the store, acquiring it when the gate allows
    Fetch { handle: String },
    /// Force a refresh, subject to the interval and daily quota
    Refresh { handle: String },
    /// List stored content, acquiring the profile first if needed
    Content {
        handle: String,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 12)]
        page_size: u32,
        /// recent, likes, comments or views
        #[arg(long, default_value = "recent")]
        sort: SortKey,
    },
    /// Print the analytics snapshot for a profile
    Analytics {
        handle: String,
        /// Also aggregate the top N hashtags over every stored item
        #[arg(long)]
        hashtags: Option<usize>,
    },
    /// Mirror the avatar and content assets of a stored profile
    Mirror { handle: String },
    /// Fetch content not yet stored for a profile
    Backfill {
        handle: String,
        #[arg(long, default_value_t = 40)]
        count: usize,
    },
    /// Find stored profiles by handle prefix
    Search {
        prefix: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Refresh the watchlist on the configured schedule
    Watch {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check connectivity
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = pfdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("pfdb-cli ready; see --help");
        return Ok(());
    };

    match command {
        Commands::Db { command } => run_db(&config, command).await,
        command => {
            let service = runtime::build_service(&config).await?;
            let result = run(&service, &config, command).await;
            // Detached mirror runs finish before the process exits.
            service.mirror().wait_idle().await;
            result
        }
    }
}

async fn run(
    service: &ProfileService,
    config: &pfdb_core::AppConfig,
    command: Commands,
) -> anyhow::Result<()> {
    match command {
        Commands::Fetch { handle } => print_json(&service.get_profile(&handle).await?),
        Commands::Refresh { handle } => print_json(&service.refresh_profile(&handle).await?),
        Commands::Content {
            handle,
            page,
            page_size,
            sort,
        } => {
            let query = ContentQuery {
                page,
                page_size,
                sort,
            };
            print_json(&service.get_content(&handle, query).await?)
        }
        Commands::Analytics { handle, hashtags } => {
            let view = service.get_analytics(&handle).await?;
            match hashtags {
                Some(limit) => {
                    let tags = service.top_hashtags(&view.handle, limit).await?;
                    print_json(&serde_json::json!({ "analytics": view, "hashtags": tags }))
                }
                None => print_json(&view),
            }
        }
        Commands::Mirror { handle } => print_json(&service.mirror_assets(&handle).await?),
        Commands::Backfill { handle, count } => {
            print_json(&service.backfill_content(&handle, count).await?)
        }
        Commands::Search { prefix, limit } => print_json(&service.search(&prefix, limit).await?),
        Commands::Watch { once } => watch::run_watch(service, config, once).await,
        Commands::Db { command } => run_db(config, command).await,
    }
}

async fn run_db(config: &pfdb_core::AppConfig, command: DbCommands) -> anyhow::Result<()> {
    let pool = pfdb_db::connect_pool_from_config(config).await?;
    match command {
        DbCommands::Migrate => {
            let applied = pfdb_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        DbCommands::Ping => {
            pfdb_db::ping(&pool).await?;
            println!("database reachable");
        }
    }
    Ok(())
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
