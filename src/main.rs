use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aaxion_resolve::cli::{self, Target};
use aaxion_resolve::config::Config;

#[derive(Parser)]
#[command(name = "aaxion")]
#[command(about = "Find Aaxion servers on the LAN and pick the best endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,

    /// List servers announced on the local network
    Discover,

    /// Probe a server's addresses and pick the best one
    Resolve {
        /// Device name or hostname of a discovered server
        #[arg(long)]
        host: Option<String>,

        /// Candidate address (repeatable); skips discovery
        #[arg(short, long = "address")]
        addresses: Vec<String>,

        /// Port for addresses given with --address
        #[arg(short, long)]
        port: Option<u16>,

        /// Store the result as the current server
        #[arg(long)]
        save: bool,
    },

    /// Show address priority order without probing
    Rank {
        /// Candidate address (repeatable); defaults to the current server's
        #[arg(short, long = "address")]
        addresses: Vec<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the current and recent servers
    Current,

    /// Forget the current server
    Forget,

    /// Manage the bearer token sent with health probes
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Save a token
    Set { token: String },

    /// Remove the saved token
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    if let Commands::Init = cli.command {
        let config = Config::default();
        config.save(&config_path)?;
        println!("Config saved to: {}", config_path.display());
        println!("Data directory: {}", config.paths.data_dir.display());
        return Ok(());
    }

    let config = Config::load_or_default(&config_path)?;

    match cli.command {
        Commands::Init => {}

        Commands::Discover => {
            cli::discover_servers(&config).await?;
        }

        Commands::Resolve {
            host,
            addresses,
            port,
            save,
        } => {
            let target = match (host, addresses.is_empty()) {
                (host, false) => Target::Addresses {
                    host,
                    addresses,
                    port,
                },
                (Some(name), true) => Target::Discovered(name),
                (None, true) => Target::Default,
            };
            cli::resolve_server(&config, target, save).await?;
        }

        Commands::Rank { addresses, port } => {
            cli::rank_addresses(&config, addresses, port)?;
        }

        Commands::Current => {
            cli::show_current(&config)?;
        }

        Commands::Forget => {
            cli::forget_current(&config)?;
        }

        Commands::Token { command } => match command {
            TokenCommands::Set { token } => cli::set_token(&config, &token)?,
            TokenCommands::Clear => cli::clear_token(&config)?,
        },
    }

    Ok(())
}
