//! Point d'entrée CLI pour parcel-assistant

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// Clés d'API depuis `.env`: répertoire courant, sinon à côté de l'exécutable
fn load_env() {
    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;
use parcel_lookup::LngLat;

/// Parcelle sous un point, et un assistant qui en discute
#[derive(Parser)]
#[command(name = "parcel-assistant")]
#[command(author, version)]
#[command(about = "Resolve a location to its parcel and discuss it with an AI assistant")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config preset name (nyc) or path to a JSON config
    #[arg(long, default_value = "nyc", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let app = cli::build_app(&cli.config)?;

    match cli.command {
        Commands::Resolve { lat, lon, output } => {
            info!(lat, lon, "Resolve parcel");
            cli::cmd_resolve(&app, lat, lon, output.as_deref()).await?;
        }
        Commands::Search { address, output } => {
            info!(address = %address, "Search address");
            cli::cmd_search(&app, &address, output.as_deref()).await?;
        }
        Commands::Context { lat, lon } => {
            cli::cmd_context(&app, lat, lon).await?;
        }
        Commands::Chat { lat, lon } => {
            let start = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(LngLat::new(lon, lat)?),
                _ => None,
            };
            cli::cmd_chat(&app, start).await?;
        }
    }

    Ok(())
}

/// `-v`/`-q` fixent le niveau de base, `RUST_LOG` l'affine par cible
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout est réservé à la session interactive
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
