mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "wabridge")]
#[command(about = "HTTP bridge to a linked messaging session", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (long-running daemon)
    Serve {
        /// Host to bind to (overrides config gateway.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config gateway.port and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write the default configuration and capability descriptor
    Init {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and probe a running bridge
    Status,

    /// List the methods the capability gate allows
    Capabilities,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            commands::serve::run(host, port).await?;
        }
        Commands::Init { force } => {
            commands::init::run(force).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Capabilities => {
            commands::capabilities::run().await?;
        }
    }

    Ok(())
}
