use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use storage::{FileStore, LocalDisks, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/cms.db")]
    database_url: String,
    /// Root directory of the `public` disk.
    #[arg(long, default_value = "./data/public")]
    storage_root: String,
    #[arg(long, default_value = "http://127.0.0.1:8080/storage")]
    public_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the user if needed and prints its id.
    CreateUser { username: String },
    /// Lists media rows whose file is missing from its disk.
    AuditMedia,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateUser { username } => {
            let user_id = storage.create_user(username.trim()).await?;
            println!("user_id={}", user_id.0);
        }
        Command::AuditMedia => {
            let disks = LocalDisks::public(&cli.storage_root, &cli.public_url)?;
            let media = storage.list_media(None).await?;
            let mut missing = 0usize;
            for item in &media {
                let present = match disks.exists(&item.disk, &item.path).await {
                    Ok(present) => present,
                    Err(err) => {
                        eprintln!("media_id={} path={} error={err:#}", item.media_id, item.path);
                        false
                    }
                };
                if !present {
                    missing += 1;
                    println!(
                        "missing media_id={} disk={} path={}",
                        item.media_id, item.disk, item.path
                    );
                }
            }
            println!("checked={} missing={missing}", media.len());
            if missing > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
