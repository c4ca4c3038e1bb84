mod commands;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "storesync-cli")]
#[command(about = "StoreSync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upsert tenants and their connection descriptors from the tenants file.
    Seed,
    /// Run one catalog sync for the tenant owning the API key.
    Sync {
        #[arg(long = "api-key")]
        api_key: String,
    },
    /// Show recent sync runs across all tenants.
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print the completed-orders report for the tenant owning the API key.
    Orders {
        #[arg(long = "api-key")]
        api_key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = storesync_core::load_app_config()?;
    let pool_config = storesync_db::PoolConfig::from_app_config(&config);
    let pool = storesync_db::connect_pool(&config.database_url, pool_config).await?;
    storesync_db::run_migrations(&pool).await?;

    match cli.command {
        Commands::Seed => commands::run_seed(&pool, &config).await,
        Commands::Sync { api_key } => commands::run_sync(&pool, &config, &api_key).await,
        Commands::Runs { limit } => commands::run_list_runs(&pool, limit).await,
        Commands::Orders { api_key } => commands::run_orders(&pool, &config, &api_key).await,
    }
}
