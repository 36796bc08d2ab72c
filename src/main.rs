mod config;
mod notify;
mod protocol;
mod registry;
mod server;
mod session;
mod utils;

use clap::Parser;
use config::ServerConfig;
use tracing::info;

#[derive(Parser)]
#[command(name = "filebeamd")]
#[command(about = "Network file-transfer server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, help = "Config file path")]
    config: Option<String>,

    #[arg(long, help = "Listen address (overrides config)")]
    listen: Option<String>,

    #[arg(long, help = "Storage root directory (overrides config)")]
    storage: Option<String>,

    #[arg(long, help = "Worker thread count (overrides config)")]
    workers: Option<usize>,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show server configuration and storage state
    Status,
    /// Write a default config file
    GenerateConfig {
        #[arg(long, default_value = "filebeam.toml", help = "Config file path")]
        output: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("FILEBEAM_LOG").unwrap_or_else(|_| "filebeamd=info".to_string()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load_or_create(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.listen_address = listen;
    }
    if let Some(storage) = cli.storage {
        config.storage_root = storage.into();
    }
    if let Some(workers) = cli.workers {
        config.worker_threads = workers;
    }

    match cli.command {
        Some(Commands::Status) => {
            let storage_ready = config.storage_root.exists();
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": if storage_ready { "ready" } else { "not_initialized" },
                        "listen_address": config.listen_address,
                        "storage_root": config.storage_root,
                        "worker_threads": config.worker_threads,
                    })
                );
            } else {
                println!("Filebeam Server Status");
                println!("======================");
                if storage_ready {
                    println!("Status: ready");
                } else {
                    println!("Status: not initialized (storage root missing)");
                }
                println!("  Listen address: {}", config.listen_address);
                println!("  Storage root: {}", config.storage_root.display());
                println!("  Worker threads: {}", config.worker_threads);
            }
            Ok(())
        }
        Some(Commands::GenerateConfig { output }) => {
            config.save(&output)?;
            println!("Wrote config to {}", output);
            Ok(())
        }
        None => {
            config.validate()?;
            info!(
                "Starting with {} worker threads, storage at {:?}",
                config.worker_threads, config.storage_root
            );
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.worker_threads)
                .enable_all()
                .build()?;
            runtime.block_on(server::run(config))
        }
    }
}
