//! wfa_share - NFS share management through NetApp Workflow Automation (WFA).
//!
//! This library provides functionality to:
//! - Talk to the WFA REST API with XML request and response bodies
//! - Discover workflows, validate their inputs, run them and poll the jobs
//! - Map share, snapshot and access operations onto workflows
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wfa_share::{DriverConfig, InMemoryStorage, InProcessLocks, Share, WfaDriver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DriverConfig::from_file("wfa.json")?;
//!     let mut driver = WfaDriver::new(
//!         config,
//!         Arc::new(InMemoryStorage::new()),
//!         Arc::new(InProcessLocks::new()),
//!     )?;
//!     driver.do_setup().await?;
//!
//!     let share = Share {
//!         id: "4c1f2c9a-0d2e-4b53-9f3a-7b1f0e2d5c11".to_string(),
//!         size: 10,
//!         share_proto: "NFS".to_string(),
//!         ..Default::default()
//!     };
//!     let export = driver.create_share(&share).await?;
//!     println!("{}", export);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod driver;
pub mod element;
pub mod error;
pub mod lock;
pub mod models;
pub mod storage;
pub mod template;

// Re-exports for convenience
pub use client::WorkflowClient;
pub use config::{DriverConfig, InputNames, WorkflowNames};
pub use connection::{AuthStyle, ServerConnection, Transport, TransportType};
pub use driver::WfaDriver;
pub use element::{Element, ElementEntry, ElementValue};
pub use error::{ApiCode, ErrorKind, Result, WfaError};
pub use lock::{FileLocks, InProcessLocks, LockGuard, LockProvider};
pub use models::{Access, InputMap, JobResult, Operation, Share, ShareStats, Snapshot, WorkflowDefinition};
pub use storage::{InMemoryStorage, JsonFileStorage, PrivateStorage};
