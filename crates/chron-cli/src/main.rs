#![forbid(unsafe_code)]

mod cmd;

use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chron: archive and merge a live simulation feed",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $CHRON_CONFIG, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run the stream worker and both pollers",
        long_about = "Connect to the push feed and start the minute and five-minute pollers. Runs until interrupted.",
        after_help = "EXAMPLES:\n    chron ingest\n    CHRON_LOG=chron=debug chron ingest --config ./chron.toml"
    )]
    Ingest,

    #[command(
        about = "Refold every stored game update into aggregates",
        after_help = "EXAMPLES:\n    chron rebuild\n    chron rebuild --json"
    )]
    Rebuild,

    #[command(about = "Show record counts in the store")]
    Status,

    #[command(about = "Show the aggregate for one game")]
    Game(cmd::game::GameArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHRON_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "chron=debug,info"
        } else {
            "chron=info,warn"
        })
    });

    let format = env::var("CHRON_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cmd::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest => cmd::ingest::run_ingest(&config),
        Commands::Rebuild => cmd::rebuild::run_rebuild(&config, cli.json),
        Commands::Status => cmd::status::run_status(&config, cli.json),
        Commands::Game(ref args) => cmd::game::run_game(args, &config),
    }
}
