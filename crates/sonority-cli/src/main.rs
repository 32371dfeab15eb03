use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use sonority_core::ErrorKind;
use sonority_search::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "sonority", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Milvus REST endpoint (overrides config and SONORITY_MILVUS_URI)
    #[arg(long, global = true)]
    milvus_uri: Option<String>,

    /// IVF clusters probed per search
    #[arg(long, global = true)]
    nprobe: Option<u32>,

    /// Genre taxonomy JSON (default: ~/.config/sonority/mtg_jamendo_genre.json)
    #[arg(long, global = true)]
    taxonomy: Option<PathBuf>,

    /// SQLite catalog used to resolve file paths to ids
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Check that the vector index is reachable
    ///
    /// Looks up the sentinel record and prints a {status, message} report.
    /// Always exits successfully; a down index is reported as status "error".
    Ping,
    /// Ping the index on a fixed interval until interrupted
    ///
    /// Serverless index tiers suspend after a period of inactivity. Run this
    /// alongside the service to keep the index warm. Stops on Ctrl-C.
    Keepalive {
        /// Seconds between pings (default: keepalive_interval_secs, 86400)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Print the stored embedding of an entity
    Entity {
        /// Entity id
        id: String,
    },
    /// Find tracks similar to an entity id
    Similar {
        /// Entity id
        id: String,
    },
    /// Find tracks similar to one or more file paths
    ///
    /// The first path with a stored embedding seeds the search. With --short,
    /// a larger candidate pool is fetched and re-ranked so artists repeat
    /// only when there are not enough distinct ones.
    SimilarPaths {
        /// File paths as stored in the index
        #[arg(required = true)]
        paths: Vec<String>,

        /// Return short entities re-ranked for artist diversity
        #[arg(long)]
        short: bool,
    },
    /// Find tracks similar to a file, resolving its id through the catalog
    SimilarCatalog {
        /// File path as stored in the catalog
        path: String,
    },
    /// Summarize the top genres of a track
    Genres {
        /// File path as stored in the activation collection
        path: String,

        /// Print a base64-encoded SVG bar chart instead of JSON
        #[arg(long)]
        plot: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Print an example config file
    Example,
    /// Create the config file with defaults
    Init,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(uri) = &self.milvus_uri {
            config.milvus_uri.clone_from(uri);
        }
        if let Some(nprobe) = self.nprobe {
            config.nprobe = nprobe;
        }
        if let Some(taxonomy) = &self.taxonomy {
            config.taxonomy_path.clone_from(taxonomy);
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_path = Some(catalog.clone());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommand::Show => commands::config::show_config(),
            ConfigCommand::Path => commands::config::show_path(),
            ConfigCommand::Example => commands::config::show_example(),
            ConfigCommand::Init => commands::config::init_config(),
        };
    }

    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);

    match cli.command {
        Commands::Ping => commands::ping::run_ping(&config).await,
        Commands::Keepalive { interval_secs } => {
            commands::ping::run_keepalive(&config, interval_secs).await
        }
        Commands::Entity { id } => commands::similar::show_entity(&config, &id).await,
        Commands::Similar { id } => commands::similar::similar_by_id(&config, &id).await,
        Commands::SimilarPaths { paths, short } => {
            commands::similar::similar_by_paths(&config, &paths, short).await
        }
        Commands::SimilarCatalog { path } => {
            commands::similar::similar_by_catalog(&config, &path).await
        }
        Commands::Genres { path, plot } => commands::genres::run_genres(&config, &path, plot).await,
        Commands::Config { .. } => Ok(()),
    }
}

/// Exit status per error category, so scripts can tell a missing entity
/// from a down index.
fn exit_code(kind: Option<ErrorKind>) -> u8 {
    match kind {
        Some(ErrorKind::NotFound) => 2,
        Some(ErrorKind::Unavailable) => 3,
        Some(ErrorKind::DataUnavailable) => 4,
        Some(ErrorKind::InvalidInput) => 5,
        None => 1,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err
                .downcast_ref::<sonority_core::Error>()
                .map(sonority_core::Error::kind);
            if let Some(kind) = kind {
                eprintln!("error [{}]: {err:#}", kind.category());
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(exit_code(kind))
        }
    }
}
