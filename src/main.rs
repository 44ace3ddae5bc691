//! wfa_share CLI - Manage NFS shares through NetApp WFA workflows.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wfa_share::{
    Access, DriverConfig, FileLocks, InProcessLocks, JsonFileStorage, LockProvider, Operation,
    Share, Snapshot, WfaDriver,
};

/// CLI tool for running share operations through WFA workflows.
#[derive(Parser)]
#[command(name = "wfa_share")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the driver JSON configuration file.
    #[arg(long, env = "WFA_CONFIG")]
    config: PathBuf,

    /// JSON file keeping per share metadata (job id and status).
    #[arg(long, env = "WFA_STORAGE", default_value = "wfa_private_storage.json")]
    storage: PathBuf,

    /// Directory for lock files shared with other processes.
    /// Without it locks only cover this process.
    #[arg(long, env = "WFA_LOCK_DIR")]
    lock_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the workflow resolved for each operation.
    Workflows,

    /// Show backend capabilities.
    Stats,

    /// Create a share.
    CreateShare {
        /// Share ID.
        id: String,

        /// Size in GB.
        #[arg(long)]
        size: u64,

        #[arg(long, default_value = "NFS")]
        proto: String,

        /// Extra spec as KEY=VALUE (e.g. netapp:aggrName=aggr1). Repeatable.
        #[arg(long = "extra-spec", value_parser = parse_key_val)]
        extra_specs: Vec<(String, String)>,
    },

    /// Delete a share.
    DeleteShare {
        /// Share ID.
        id: String,
    },

    /// Create a snapshot of a share.
    CreateSnapshot {
        /// Snapshot ID.
        id: String,

        #[arg(long)]
        share_id: String,
    },

    /// Delete a snapshot.
    DeleteSnapshot {
        /// Snapshot ID.
        id: String,
    },

    /// Create a share from a snapshot.
    CreateShareFromSnapshot {
        /// New share ID.
        id: String,

        #[arg(long)]
        snapshot_id: String,

        /// Size in GB.
        #[arg(long)]
        size: u64,

        #[arg(long, default_value = "NFS")]
        proto: String,
    },

    /// Allow an IP or network to access a share.
    AllowAccess {
        /// Share ID.
        share_id: String,

        /// IP address or network (e.g. 10.0.0.0/24).
        access_to: String,

        #[arg(long, default_value = "ip")]
        access_type: String,

        #[arg(long, default_value = "NFS")]
        proto: String,

        /// Extra spec as KEY=VALUE (e.g. netapp:levelOfAccess=rw). Repeatable.
        #[arg(long = "extra-spec", value_parser = parse_key_val)]
        extra_specs: Vec<(String, String)>,
    },

    /// Deny an IP or network access to a share.
    DenyAccess {
        /// Share ID.
        share_id: String,

        /// IP address or network.
        access_to: String,

        #[arg(long, default_value = "ip")]
        access_type: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "wfa_share=debug"
    } else {
        "wfa_share=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a `KEY=VALUE` pair.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn share(id: String, size: u64, proto: String, extra_specs: Vec<(String, String)>) -> Share {
    Share {
        id,
        size,
        share_proto: proto,
        extra_specs: extra_specs.into_iter().collect(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = DriverConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    let storage = Arc::new(JsonFileStorage::new(&cli.storage));
    let locks: Arc<dyn LockProvider> = match &cli.lock_dir {
        Some(dir) => Arc::new(FileLocks::new(dir)),
        None => Arc::new(InProcessLocks::new()),
    };

    let mut driver = WfaDriver::new(config, storage, locks).context("Failed to create driver")?;

    if let Commands::Stats = cli.command {
        println!("{}", serde_json::to_string_pretty(&driver.share_stats())?);
        return Ok(());
    }

    driver
        .do_setup()
        .await
        .context("Failed to set up workflows")?;

    match cli.command {
        Commands::Workflows => {
            println!("{:<28} {:<38} {}", "OPERATION", "UUID", "WORKFLOW");
            println!("{}", "-".repeat(100));
            for operation in Operation::ALL {
                match driver.workflows().get(&operation).and_then(Option::as_ref) {
                    Some(workflow) => {
                        println!("{:<28} {:<38} {}", operation, workflow.uuid, workflow.name)
                    }
                    None => println!("{:<28} {:<38} {}", operation, "-", "(not configured)"),
                }
            }
        }

        Commands::Stats => {}

        Commands::CreateShare {
            id,
            size,
            proto,
            extra_specs,
        } => {
            let share = share(id, size, proto, extra_specs);
            let export = driver
                .create_share(&share)
                .await
                .with_context(|| format!("Failed to create share: {}", share.id))?;
            println!("{}", export);
        }

        Commands::DeleteShare { id } => {
            let share = share(id, 0, "NFS".to_string(), Vec::new());
            driver
                .delete_share(&share)
                .await
                .with_context(|| format!("Failed to delete share: {}", share.id))?;
            println!("Deleted share {}", share.id);
        }

        Commands::CreateSnapshot { id, share_id } => {
            let snapshot = Snapshot { id, share_id };
            driver
                .create_snapshot(&snapshot)
                .await
                .with_context(|| format!("Failed to create snapshot: {}", snapshot.id))?;
            println!("Created snapshot {}", snapshot.id);
        }

        Commands::DeleteSnapshot { id } => {
            let snapshot = Snapshot {
                id,
                share_id: String::new(),
            };
            driver
                .delete_snapshot(&snapshot)
                .await
                .with_context(|| format!("Failed to delete snapshot: {}", snapshot.id))?;
            println!("Deleted snapshot {}", snapshot.id);
        }

        Commands::CreateShareFromSnapshot {
            id,
            snapshot_id,
            size,
            proto,
        } => {
            let share = share(id, size, proto, Vec::new());
            let snapshot = Snapshot {
                id: snapshot_id,
                share_id: String::new(),
            };
            let export = driver
                .create_share_from_snapshot(&share, &snapshot)
                .await
                .with_context(|| {
                    format!("Failed to create share {} from snapshot {}", share.id, snapshot.id)
                })?;
            println!("{}", export);
        }

        Commands::AllowAccess {
            share_id,
            access_to,
            access_type,
            proto,
            extra_specs,
        } => {
            let share = share(share_id, 0, proto, extra_specs);
            let access = Access {
                access_type,
                access_to,
            };
            driver
                .allow_access(&share, &access)
                .await
                .with_context(|| format!("Failed to allow access to share: {}", share.id))?;
            println!("Allowed {} on share {}", access.access_to, share.id);
        }

        Commands::DenyAccess {
            share_id,
            access_to,
            access_type,
        } => {
            let share = share(share_id, 0, "NFS".to_string(), Vec::new());
            let access = Access {
                access_type,
                access_to,
            };
            driver
                .deny_access(&share, &access)
                .await
                .with_context(|| format!("Failed to deny access to share: {}", share.id))?;
            println!("Denied {} on share {}", access.access_to, share.id);
        }
    }

    Ok(())
}
