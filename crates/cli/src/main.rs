mod commands;
mod config;
mod progress;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bucketstore",
    version,
    about = "Files in an object-storage bucket"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    #[command(flatten)]
    overrides: config::Overrides,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let overrides = cli.overrides;
    match cli.command {
        commands::Command::Init(args) => commands::init::run(args, overrides).await,
        commands::Command::Put(args) => commands::put::run(args, overrides).await,
        commands::Command::Get(args) => commands::get::run(args, overrides).await,
        commands::Command::Rm(args) => commands::rm::run(args, overrides).await,
        commands::Command::Exists(args) => commands::exists::run(args, overrides).await,
        commands::Command::Ls(args) => commands::ls::run(args, overrides).await,
        commands::Command::Stat(args) => commands::stat::run(args, overrides).await,
        commands::Command::Url(args) => commands::url::run(args, overrides).await,
    }
}
