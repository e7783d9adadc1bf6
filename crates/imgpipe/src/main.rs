//! imgpipe CLI - batch image editing from the command line.
//!
//! imgpipe takes image files, runs an ordered list of transform steps over
//! each of them, and writes the results as individual files or one zip
//! archive.
//!
//! # Usage
//!
//! ```bash
//! # Halve a photo and convert it to JPEG
//! imgpipe process photo.png --step resize:percent=50 --step convert:format=jpeg
//!
//! # Watermark a directory, steps from a recipe file
//! imgpipe process ./photos/ --recipe watermark.toml --report run.jsonl --report-format jsonl
//!
//! # Hand an operation to a transform server
//! imgpipe remote meme cat.png --param top=HELLO --endpoint http://localhost:8080/api
//!
//! # View configuration
//! imgpipe config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// imgpipe - compress, resize, crop, rotate, convert, watermark.
#[derive(Parser, Debug)]
#[command(name = "imgpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run transform steps over image files
    Process(cli::process::ProcessArgs),

    /// Run one operation on a server-side transform endpoint
    Remote(cli::remote::RemoteArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match imgpipe_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `imgpipe config path`."
            );
            imgpipe_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("imgpipe v{}", imgpipe_core::VERSION);

    match cli.command {
        Commands::Process(args) => cli::process::execute(args, config).await,
        Commands::Remote(args) => cli::remote::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
