use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rawlease::{Config, DhcpServer, NetworkInterface, OptionCatalog, Result};

#[derive(Parser)]
#[command(name = "rawlease")]
#[command(author, version, about = "A DHCP server speaking raw Ethernet frames", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.txt")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve leases until interrupted
    Run,
    /// Print the parsed configuration as JSON
    ShowConfig,
    /// Print the encoded reply options
    ShowOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = Config::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting DHCP server with config: {:?}", cli.config);
            let server = DhcpServer::new(config).await?;

            tokio::select! {
                result = server.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server...");
                    Ok(())
                }
            }
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ShowOptions => {
            let server_ip = match NetworkInterface::by_name(&config.interface) {
                Ok(interface) => interface.ipv4,
                Err(error) => {
                    warn!("{}; showing server identifier as 0.0.0.0", error);
                    Ipv4Addr::UNSPECIFIED
                }
            };
            let catalog = OptionCatalog::build(&config, server_ip)?;

            println!("{:<6} {:<24} {}", "Code", "Value", "Bytes");
            println!("{}", "-".repeat(60));
            for entry in catalog.entries() {
                let hex: Vec<String> = entry.encode().iter().map(|b| format!("{:02x}", b)).collect();
                println!(
                    "{:<6} {:<24} {}",
                    entry.option_code(),
                    format!("{:?}", entry),
                    hex.join(" ")
                );
            }

            Ok(())
        }
    }
}
