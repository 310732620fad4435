//! HuffStream CLI
//!
//! Huffman-compressed file transfer

mod config;
mod progress;

use clap::{Parser, Subcommand};
use console::style;
use huffstream_core::{ErrorKind, SessionClient, SessionManager};
use huffstream_files::DirectorySink;
use huffstream_transport::TcpConnector;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{TransferProgress, format_bytes, format_duration, format_stats};

/// HuffStream - Huffman-compressed file transfer
#[derive(Parser)]
#[command(name = "huffstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a container
    Encode {
        /// File to compress
        input: PathBuf,
        /// Container to write
        output: PathBuf,
    },

    /// Reconstruct a file from a container
    Decode {
        /// Container to read
        input: PathBuf,
        /// File to write
        output: PathBuf,
    },

    /// Compress a file and send it to a server
    Send {
        /// File to send
        file: PathBuf,

        /// Index into the configured server list
        #[arg(short, long, default_value_t = 0)]
        server: usize,
    },

    /// Accept transfers until interrupted
    Serve {
        /// Output directory (defaults to the server's save_directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Index into the configured server list
        #[arg(short, long, default_value_t = 0)]
        server: usize,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the standard config path)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        init_logging(cli.verbose, "info");
        return init_config(path.clone(), *force);
    }

    let config = Config::resolve(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.logging.level);
    config.validate()?;
    tracing::debug!("Loaded configuration with {} server(s)", config.servers.len());

    match cli.command {
        Commands::Encode { input, output } => encode(&input, &output).await?,
        Commands::Decode { input, output } => decode(&input, &output).await?,
        Commands::Send { file, server } => send_file(&file, server, &config).await?,
        Commands::Serve { output, server } => serve(output, server, &config).await?,
        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Compress a file into a container
async fn encode(input: &Path, output: &Path) -> anyhow::Result<()> {
    tracing::info!("Encoding {:?} to {:?}", input, output);
    let stats = huffstream_files::encode_file(input, output).await?;
    println!(
        "{} {} -> {}",
        style("Encoded").green().bold(),
        input.display(),
        output.display()
    );
    println!("  {}", format_stats(&stats));
    Ok(())
}

/// Reconstruct a file from a container
async fn decode(input: &Path, output: &Path) -> anyhow::Result<()> {
    tracing::info!("Decoding {:?} to {:?}", input, output);
    let bytes = huffstream_files::decode_file(input, output).await?;
    println!(
        "{} {} -> {} ({})",
        style("Decoded").green().bold(),
        input.display(),
        output.display(),
        format_bytes(bytes)
    );
    Ok(())
}

/// Send a file to a configured server
async fn send_file(file: &Path, server: usize, config: &Config) -> anyhow::Result<()> {
    if !file.exists() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let endpoint = config.server(server)?.endpoint();
    let name = huffstream_files::encoded_name(file)?;
    let data = tokio::fs::read(file).await?;
    let container = huffstream_codec::compress(&data)?;

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(data.len() as u64));
    println!("Server: {endpoint}");
    tracing::info!("Sending {:?} as {} to {}", file, name, endpoint);

    let connector = TcpConnector::default();
    let mut client = SessionClient::connect_with_retry(
        &endpoint,
        config.session_config(),
        &connector,
        config.retry_policy(),
    )
    .await?;

    let progress = TransferProgress::new(container.len() as u64, &name);
    let interrupted = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let report = match client
        .send_container_with_cancel(&name, &container, |sent| progress.update(sent), interrupted)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            progress.abandon();
            if e.kind() == ErrorKind::Cancelled {
                tracing::warn!("Transfer of {} cancelled", name);
                let _ = client.close().await;
            }
            return Err(e.into());
        }
    };
    progress.finish_with_message(format!("Sent {name}"));
    client.close().await?;

    println!(
        "{} in {}: {}",
        style("Transfer complete").green().bold(),
        format_duration(report.elapsed),
        format_stats(&report.stats)
    );
    Ok(())
}

/// Accept transfers until Ctrl+C
async fn serve(output: Option<PathBuf>, server: usize, config: &Config) -> anyhow::Result<()> {
    let server_config = config.server(server)?;
    let output = output.unwrap_or_else(|| server_config.save_directory.clone());
    let sink = DirectorySink::create(&output).await?;

    let manager = SessionManager::new(config.session_config(), Arc::new(sink))?;
    let running = manager.bind(&server_config.endpoint()).await?;

    println!("HuffStream server");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Control: {}", running.control_addr());
    println!("Data: {}", running.data_addr());
    println!("Output directory: {}", output.display());
    println!("Max sessions: {}", running.max_sessions());
    println!("\nPress Ctrl+C to stop");
    tracing::info!(
        "Serving on {} / {} into {:?}",
        running.control_addr(),
        running.data_addr(),
        output
    );

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    tracing::info!("Stopping server");
    running.shutdown().await;

    Ok(())
}

/// Write a default configuration file
fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(Config::default_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(&path)?;
    tracing::debug!("Wrote default configuration to {:?}", path);
    println!(
        "{} {}",
        style("Configuration written to").green(),
        path.display()
    );
    Ok(())
}
