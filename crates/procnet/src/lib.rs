//! Socket table scanner for Linux.
//!
//! This crate enumerates the sockets the kernel exposes under `/proc/net`,
//! attributes each one to the process that owns it, and can repeat the scan
//! inside other network namespaces. It is the engine behind a `netstat`-like
//! tool, usable on its own as a library.
//!
//! # Features
//!
//! - `serde` - Serialize scan results (JSON output)
//!
//! # Example
//!
//! ```ignore
//! use procnet::netstat::{self, FeatureSelection, ScanConfig, accept};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> procnet::Result<()> {
//!     let features = FeatureSelection::default().resolve_processes(true);
//!     let scan = netstat::netstat(
//!         ScanConfig::default(),
//!         features,
//!         accept::listening,
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!
//!     for entry in &scan.entries {
//!         println!("{} {} {}", entry.transport, entry.local, entry.state);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Namespaces
//!
//! ```ignore
//! use procnet::netstat::{FeatureSelection, NamespaceSelection};
//!
//! // Every namespace reachable through /proc, plus the named ones
//! let features = FeatureSelection::default().namespaces(NamespaceSelection::All);
//!
//! // Only the namespace of pid 1234 (the host is skipped)
//! let features = FeatureSelection::default().namespaces(NamespaceSelection::Pids(vec![1234]));
//! ```

pub mod netstat;

// Re-export common types at crate root for convenience
pub use netstat::{Error, Result};
