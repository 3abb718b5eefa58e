use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

// `#[zbus::proxy]` generates `AttendanceProxy` for the daemon's interface.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn register(
        &self,
        identity: i64,
        name: &str,
        embeddings_json: &str,
    ) -> zbus::Result<String>;
    async fn recognize(&self, embedding_json: &str, location: &str) -> zbus::Result<String>;
    async fn recognize_batch(&self, queries_json: &str, location: &str) -> zbus::Result<String>;
    async fn remove_identity(&self, identity: i64) -> zbus::Result<bool>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn attendance(&self, identity: i64) -> zbus::Result<String>;
    async fn clear_attendance(&self, identity: i64) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from a file of sample embeddings
    Register {
        /// Numeric identity id
        id: i64,
        /// Display name
        name: String,
        /// JSON file: array of embedding vectors (at least 3)
        file: PathBuf,
    },
    /// Recognize a single embedding and mark attendance
    Recognize {
        /// JSON file: one embedding vector
        file: PathBuf,
        /// Location label for the attendance record
        #[arg(short, long, default_value = "")]
        location: String,
    },
    /// Recognize every face from one image's queries
    Batch {
        /// JSON file: array of {"embedding": [...]|null, "bbox": {...}?}
        file: PathBuf,
        #[arg(short, long, default_value = "")]
        location: String,
    },
    /// List enrolled identities
    List,
    /// Remove an enrolled identity
    Remove {
        /// Identity id to remove
        id: i64,
    },
    /// Show attendance records
    Attendance {
        /// Limit to one identity
        #[arg(long)]
        identity: Option<i64>,
    },
    /// Clear attendance records
    ClearAttendance {
        /// Limit to one identity (default: clear all)
        #[arg(long)]
        identity: Option<i64>,
    },
    /// Show daemon status
    Status,
}

fn read_json(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Re-indent a JSON response from the daemon for the terminal.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string())
        ),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus (is rollcalld running?)")?;
    let proxy = AttendanceProxy::new(&conn).await?;

    match cli.command {
        Commands::Register { id, name, file } => {
            let reply = proxy.register(id, &name, &read_json(&file)?).await?;
            print_json(&reply);
        }
        Commands::Recognize { file, location } => {
            let reply = proxy.recognize(&read_json(&file)?, &location).await?;
            print_json(&reply);
        }
        Commands::Batch { file, location } => {
            let reply = proxy.recognize_batch(&read_json(&file)?, &location).await?;
            print_json(&reply);
        }
        Commands::List => {
            print_json(&proxy.list_identities().await?);
        }
        Commands::Remove { id } => {
            if proxy.remove_identity(id).await? {
                println!("Removed identity {id}");
            } else {
                println!("Identity {id} was not enrolled");
            }
        }
        Commands::Attendance { identity } => {
            print_json(&proxy.attendance(identity.unwrap_or(-1)).await?);
        }
        Commands::ClearAttendance { identity } => {
            let cleared = proxy.clear_attendance(identity.unwrap_or(-1)).await?;
            println!("Cleared {cleared} attendance records");
        }
        Commands::Status => {
            print_json(&proxy.status().await?);
        }
    }

    Ok(())
}
