use anyhow::Context;
use clap::{Parser, Subcommand};
use http_disk_cache::cache::{Cache, Session};
use http_disk_cache::config::Config;
use http_disk_cache::resource::{RegistrableDomain, SecurityOrigin};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Inspect and maintain an HTTP disk cache directory
#[derive(Parser, Debug)]
#[command(name = "http-disk-cache")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory, overriding the configuration
    #[arg(short, long)]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print entry count, body size, average worth and capacity
    Summary,
    /// List the security origins with cached data
    Origins {
        /// Include the bytes stored per origin
        #[arg(long)]
        sizes: bool,
    },
    /// Remove cached entries
    Clear {
        /// Only remove entries stored within the last N seconds
        #[arg(long)]
        since_secs: Option<u64>,
    },
    /// Remove entries belonging to registrable domains
    DeleteDomain {
        #[arg(required = true)]
        domains: Vec<String>,
    },
    /// Remove entries belonging to origins such as https://example.com
    DeleteOrigin {
        #[arg(required = true)]
        origins: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(directory) = args.directory {
        config.storage_directory = directory;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    http_disk_cache::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    tracing::info!(
        storage_directory = %config.storage_directory.display(),
        cache_model = ?config.cache_model,
        "Configuration loaded successfully"
    );

    let session = Session::new(0)
        .with_cache_model(config.cache_model)
        .with_stale_while_revalidate(config.stale_while_revalidate);
    let cache = Cache::open(&config.storage_directory, config.cache_options(), session)
        .await
        .context("Failed to open cache")?;

    match args.command {
        Command::Summary => {
            let summary = cache.summary().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Origins { sizes } => {
            for entry in cache.fetch_data(sizes).await {
                match entry.size {
                    Some(size) => println!("{}\t{}", entry.origin, size),
                    None => println!("{}", entry.origin),
                }
            }
        }
        Command::Clear { since_secs } => {
            match since_secs {
                Some(secs) => {
                    let since = SystemTime::now()
                        .checked_sub(Duration::from_secs(secs))
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    cache.clear(since).await;
                }
                None => cache.clear_all().await,
            }
            println!("cleared");
        }
        Command::DeleteDomain { domains } => {
            let domains: Vec<RegistrableDomain> = domains.iter().map(RegistrableDomain::new).collect();
            let found = cache.delete_data_for_registrable_domains(&domains).await;
            let mut found: Vec<_> = found.into_iter().collect();
            found.sort();
            for domain in found {
                println!("{}", domain);
            }
        }
        Command::DeleteOrigin { origins } => {
            let origins = origins
                .iter()
                .map(|origin| {
                    SecurityOrigin::parse(origin)
                        .with_context(|| format!("Invalid origin: {}", origin))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            cache.delete_data(&origins).await;
            println!("deleted {} origin(s)", origins.len());
        }
    }

    Ok(())
}
