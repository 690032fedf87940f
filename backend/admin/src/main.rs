use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an event and write the QR code of its join link
    Create { name: String, expected_players: String },

    /// Show who joined and whether voting is open
    Status { event_id: u64 },

    /// Show standings, or how many votes are still missing
    Results { event_id: u64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let admin = admin::Admin::connect().await?;

    match args.command {
        Command::Create {
            name,
            expected_players,
        } => admin.create(&name, &expected_players).await,
        Command::Status { event_id } => admin.status(event_id).await,
        Command::Results { event_id } => admin.results(event_id).await,
    }
}
