//! Socket listing from the `/proc/net` tables.
//!
//! This module reads the kernel's text socket tables (`tcp`, `tcp6`, `udp`,
//! `udp6`, `udplite`, `udplite6`, `raw`, `raw6`), attributes sockets to the
//! processes holding them and can repeat the scan inside other network
//! namespaces. It is the engine behind a `netstat`-like tool.
//!
//! # Features
//!
//! - Lazy, line-at-a-time table decoding that skips malformed records
//! - Socket inode to process attribution via `/proc/<pid>/fd`
//! - Scoped network namespace switching with guaranteed restore
//! - Caller-supplied inclusion predicate and cooperative cancellation
//! - A coverage report listing everything the scan had to skip
//!
//! # Namespaces
//!
//! Switching network namespace affects only the calling OS thread. The
//! blocking [`Netstat::run`] does it on the caller's thread and restores the
//! original namespace before returning; the async [`netstat()`] runs the same
//! scan on a thread of its own that exits with the scan.
//!
//! ```ignore
//! use procnet::netstat::{FeatureSelection, NamespaceSelection, Netstat, ScanConfig, accept};
//! use tokio_util::sync::CancellationToken;
//!
//! let features = FeatureSelection::new().namespaces(NamespaceSelection::All);
//! let scan = Netstat::new(ScanConfig::default())
//!     .run(&features, accept::all, &CancellationToken::new())?;
//! if !scan.report.is_complete() {
//!     for issue in &scan.report.issues {
//!         eprintln!("warning: {}", issue);
//!     }
//! }
//! ```

pub mod accept;
pub mod decode;
pub mod error;
pub mod namespace;
pub mod process;
pub mod scan;
pub mod table;
pub mod types;

pub use error::{Error, Result};
pub use namespace::{
    NamespaceGuard, NamespaceSelection, NamespaceSwitch, NamespaceTarget, SetnsSwitch,
};
pub use process::{IndexStats, InodeIndex, build_index};
pub use scan::{
    FeatureSelection, Netstat, PROC_ROOT, Scan, ScanConfig, ScanIssue, ScanReport, netstat,
};
pub use table::{SockTable, parse_record};
pub use types::{
    Endpoint, NamespaceId, Process, SocketEntry, SocketState, TcpState, Transport,
};
