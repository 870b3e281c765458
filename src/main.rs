use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tablecache_cache::{InMemoryTokenCache, TableTokenCache};
use tablecache_config::Config;
use tablecache_protect::AesGcmProtector;
use tablecache_types::{AccessArgs, DataProtector, TokenCacheHooks};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tablecache", about = "tablecache — per-user token cache table tools")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Log at debug level regardless of configuration.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the token cache table if it does not exist.
    Provision,
    /// Show the stored token cache rows for a user.
    Show {
        /// Signed-in user identifier (row key).
        user: String,
    },
    /// Delete every stored token cache row for a user.
    Clear {
        /// Signed-in user identifier (row key).
        user: String,
    },
    /// Print a fresh base64 master key for `protection.master_key`.
    Keygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Keygen) {
        println!("{}", AesGcmProtector::generate_key_b64());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    config.validate()?;
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Provision => cmd_provision(&config).await,
        Commands::Show { user } => cmd_show(&config, user).await,
        Commands::Clear { user } => cmd_clear(&config, user).await,
        Commands::Keygen => Ok(()),
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn cmd_provision(config: &Config) -> Result<()> {
    // Opening a store provisions its table.
    tablecache_store::open_store(&config.storage).await?;
    tracing::info!(table = %config.storage.table_name, "token cache table ready");
    Ok(())
}

async fn cmd_show(config: &Config, user: String) -> Result<()> {
    let store = tablecache_store::open_store(&config.storage).await?;
    let rows = store.fetch_all(&user).await?;
    if rows.is_empty() {
        println!("{user}: no stored token cache");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{}: last_write={} bytes={}",
            row.row_key,
            row.last_write.to_rfc3339(),
            row.cache_bits.len()
        );
    }

    if config.protection.master_key.is_none() {
        println!("(set protection.master_key to list cached tokens)");
        return Ok(());
    }
    let protector = Arc::new(AesGcmProtector::from_config(&config.protection)?);
    let mut cache = TableTokenCache::new(&user, InMemoryTokenCache::new(), store, protector);
    cache
        .before_access(&AccessArgs::new().with_user(&user, &user))
        .await?;
    for (key, token) in cache.state().iter() {
        println!("  {key}: {}", token.state());
    }
    Ok(())
}

async fn cmd_clear(config: &Config, user: String) -> Result<()> {
    let store = tablecache_store::open_store(&config.storage).await?;
    // Clearing never unprotects, so a missing key only needs a placeholder.
    let protector: Arc<dyn DataProtector> = match &config.protection.master_key {
        Some(_) => Arc::new(AesGcmProtector::from_config(&config.protection)?),
        None => Arc::new(AesGcmProtector::generate()),
    };
    let mut cache = TableTokenCache::new(&user, InMemoryTokenCache::new(), store, protector);
    cache
        .clear()
        .await
        .map_err(|e| anyhow::anyhow!("clear failed: {e}"))?;
    eprintln!("{user}: token cache cleared");
    Ok(())
}
