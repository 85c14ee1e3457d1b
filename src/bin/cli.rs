//! CLI for uploads and downloads

use anyhow::Result;
use clap::{Parser, Subcommand};
use minidfs::client::{self, CoordinatorClient, StorageClient, DEFAULT_CHUNK_SIZE};
use minidfs::common::utils::format_bytes;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minidfs")]
#[command(about = "minidfs distributed file store CLI")]
#[command(version)]
struct Cli {
    /// Coordinator address (host:port)
    #[arg(long, default_value = "127.0.0.1:5000")]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file
    Put {
        /// Name to store the file under
        name: String,

        /// File path
        #[arg(long)]
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
    },

    /// Download a file
    Get {
        /// Stored file name
        name: String,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let coordinator = CoordinatorClient::new(cli.coordinator);
    let storage = StorageClient::new();

    match cli.command {
        Commands::Put {
            name,
            file,
            chunk_size,
        } => {
            let bytes =
                client::upload_file(&coordinator, &storage, &name, &file, chunk_size).await?;
            println!("Uploaded '{}' ({})", name, format_bytes(bytes));
        }

        Commands::Get { name, output } => {
            let bytes = client::download_file(&coordinator, &storage, &name, &output).await?;
            println!(
                "Downloaded '{}' to {} ({})",
                name,
                output.display(),
                format_bytes(bytes)
            );
        }
    }

    Ok(())
}
