//! Scan orchestration.
//!
//! [`Netstat::run`] ties the pieces together: it resolves the namespaces to
//! visit, builds the process index once, then for each namespace reads every
//! selected table, attributes entries to processes and keeps those the
//! caller's predicate accepts.
//!
//! Entries come out in namespace visit order, then table order, then record
//! order. A namespace's entries are only kept once all of its tables were
//! read and the original namespace was restored.

use std::fmt;
use std::io;
use std::path::PathBuf;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::error::{Error, Result};
use super::namespace::{
    NETNS_RUN_DIR, NamespaceSelection, NamespaceSwitch, NamespaceTarget, SetnsSwitch,
    resolve_targets, run_in,
};
use super::process::{InodeIndex, build_index, is_privileged};
use super::table::SockTable;
use super::types::{NamespaceId, SocketEntry, Transport};

/// Default proc filesystem mount point.
pub const PROC_ROOT: &str = "/proc";

/// Where the engine reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Proc filesystem root.
    pub proc_root: PathBuf,
    /// Directory holding named network namespaces.
    pub netns_run_dir: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(PROC_ROOT),
            netns_run_dir: PathBuf::from(NETNS_RUN_DIR),
        }
    }
}

impl ScanConfig {
    /// Set the proc filesystem root.
    pub fn proc_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_root = path.into();
        self
    }

    /// Set the named namespace directory.
    pub fn netns_run_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.netns_run_dir = path.into();
        self
    }

    /// Path of a table as seen by the calling thread.
    ///
    /// `/proc/net` follows the thread group leader, so once a thread has
    /// switched namespace it must read through `thread-self` instead.
    pub fn table_path(&self, transport: Transport, switched: bool) -> PathBuf {
        let net = if switched {
            self.proc_root.join("thread-self/net")
        } else {
            self.proc_root.join("net")
        };
        net.join(transport.file_name())
    }
}

/// What a scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSelection {
    transports: Vec<Transport>,
    explicit: bool,
    resolve_processes: bool,
    namespace_attribution: bool,
    namespaces: NamespaceSelection,
    skip_host: bool,
}

impl Default for FeatureSelection {
    fn default() -> Self {
        Self {
            transports: vec![Transport::Tcp, Transport::Tcp6, Transport::Udp, Transport::Udp6],
            explicit: false,
            resolve_processes: false,
            namespace_attribution: false,
            namespaces: NamespaceSelection::HostOnly,
            skip_host: false,
        }
    }
}

impl FeatureSelection {
    /// Create the default selection (TCP and UDP, both families, host only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan exactly these transports.
    ///
    /// The set becomes explicit: a table that cannot be read fails the scan
    /// instead of being skipped.
    pub fn transports(mut self, transports: &[Transport]) -> Self {
        self.transports = Transport::ALL
            .into_iter()
            .filter(|t| transports.contains(t))
            .collect();
        self.explicit = true;
        self
    }

    /// Scan every transport the kernel may expose, skipping missing tables.
    pub fn all_transports(mut self) -> Self {
        self.transports = Transport::ALL.to_vec();
        self.explicit = false;
        self
    }

    /// Keep only IPv4 tables.
    pub fn ipv4_only(mut self) -> Self {
        self.transports.retain(|t| !t.is_ipv6());
        self
    }

    /// Keep only IPv6 tables.
    pub fn ipv6_only(mut self) -> Self {
        self.transports.retain(|t| t.is_ipv6());
        self
    }

    /// Attribute sockets to processes.
    pub fn resolve_processes(mut self, enabled: bool) -> Self {
        self.resolve_processes = enabled;
        self
    }

    /// Only attribute a socket to a process living in the scanned namespace.
    pub fn namespace_attribution(mut self, enabled: bool) -> Self {
        self.namespace_attribution = enabled;
        self
    }

    /// Choose the namespaces to visit.
    pub fn namespaces(mut self, selection: NamespaceSelection) -> Self {
        self.namespaces = selection;
        self
    }

    /// Do not scan the caller's own namespace.
    pub fn skip_host(mut self, skip: bool) -> Self {
        self.skip_host = skip;
        self
    }

    /// Selected transports, in read order.
    pub fn selected_transports(&self) -> &[Transport] {
        &self.transports
    }

    /// Whether the transport set was given explicitly.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whether process resolution is enabled.
    pub fn resolves_processes(&self) -> bool {
        self.resolve_processes
    }

    /// Selected namespaces.
    pub fn namespace_selection(&self) -> &NamespaceSelection {
        &self.namespaces
    }

    /// Whether the host namespace is left out, explicitly or implied.
    pub fn skips_host(&self) -> bool {
        self.skip_host || self.namespaces.implies_skip_host()
    }
}

/// Something a scan could not cover.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ScanIssue {
    /// A table could not be opened and contributed nothing.
    TableUnavailable {
        /// Namespace being scanned.
        namespace: NamespaceId,
        /// Table that was skipped.
        transport: Transport,
        /// Why it could not be opened.
        reason: String,
    },
    /// A table stopped with a read error part way through.
    TableTruncated {
        /// Namespace being scanned.
        namespace: NamespaceId,
        /// Table that was cut short.
        transport: Transport,
        /// The read error.
        reason: String,
    },
    /// Records that did not decode were skipped.
    MalformedRecords {
        /// Namespace being scanned.
        namespace: NamespaceId,
        /// Table with bad records.
        transport: Transport,
        /// Number of skipped records.
        count: usize,
    },
    /// A namespace could not be entered and contributed nothing.
    NamespaceDenied {
        /// The namespace.
        namespace: NamespaceId,
        /// Why it could not be entered.
        reason: String,
    },
    /// Processes exited while the index was built.
    ProcessesVanished {
        /// Number of processes.
        count: usize,
    },
    /// Processes whose descriptors could not be read.
    ProcessesUnreadable {
        /// Number of processes.
        count: usize,
    },
    /// Process resolution ran without root; other users' sockets stay
    /// unattributed.
    ReducedAttribution,
}

impl fmt::Display for ScanIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableUnavailable {
                namespace,
                transport,
                reason,
            } => write!(f, "{} table unavailable in {}: {}", transport, namespace, reason),
            Self::TableTruncated {
                namespace,
                transport,
                reason,
            } => write!(f, "{} table truncated in {}: {}", transport, namespace, reason),
            Self::MalformedRecords {
                namespace,
                transport,
                count,
            } => write!(
                f,
                "{} malformed {} record(s) skipped in {}",
                count, transport, namespace
            ),
            Self::NamespaceDenied { namespace, reason } => {
                write!(f, "namespace {} not scanned: {}", namespace, reason)
            }
            Self::ProcessesVanished { count } => {
                write!(f, "{} process(es) exited during the scan", count)
            }
            Self::ProcessesUnreadable { count } => {
                write!(f, "{} process(es) could not be inspected", count)
            }
            Self::ReducedAttribution => f.write_str(
                "not all processes could be identified, you would have to be root to see it all",
            ),
        }
    }
}

/// What a scan covered and what it could not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanReport {
    /// Namespaces fully scanned, in visit order.
    pub namespaces_scanned: Vec<NamespaceId>,
    /// Everything that was skipped, with the reason.
    pub issues: Vec<ScanIssue>,
}

impl ScanReport {
    /// Whether the scan covered everything it was asked to.
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of a scan.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Scan {
    /// Accepted entries.
    pub entries: Vec<SocketEntry>,
    /// Coverage report.
    pub report: ScanReport,
}

enum TablesOutcome {
    Done(Vec<SocketEntry>, Vec<ScanIssue>),
    Cancelled,
}

/// The scan engine.
#[derive(Debug, Clone)]
pub struct Netstat<S = SetnsSwitch> {
    config: ScanConfig,
    switch: S,
}

impl Netstat<SetnsSwitch> {
    /// Create an engine that switches namespaces with `setns(2)`.
    pub fn new(config: ScanConfig) -> Self {
        Self::with_switch(config, SetnsSwitch)
    }
}

impl<S: NamespaceSwitch> Netstat<S> {
    /// Create an engine with a custom namespace switch.
    pub fn with_switch(config: ScanConfig, switch: S) -> Self {
        Self { config, switch }
    }

    /// Engine configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run a scan on the calling thread.
    ///
    /// Namespace switches happen on this thread and are undone before the
    /// call returns. Cancellation is checked before each namespace and each
    /// table; a cancelled scan returns [`Error::Cancelled`] holding the
    /// namespaces completed so far.
    pub fn run<F>(
        &self,
        features: &FeatureSelection,
        accept: F,
        cancel: &CancellationToken,
    ) -> Result<Scan>
    where
        F: Fn(&SocketEntry) -> bool,
    {
        let mut scan = Scan::default();

        let targets = resolve_targets(
            features.namespace_selection(),
            features.skips_host(),
            &self.config,
        )?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                partial: Box::new(scan),
            });
        }

        let index = if features.resolves_processes() {
            Some(self.build_index(&mut scan.report)?)
        } else {
            None
        };

        for target in &targets {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    partial: Box::new(scan),
                });
            }

            let outcome = match &target.path {
                None => self.scan_tables(target, false, features, index.as_ref(), &accept, cancel),
                Some(path) => run_in(&self.switch, &target.id, path, || {
                    self.scan_tables(target, true, features, index.as_ref(), &accept, cancel)
                }),
            };

            match outcome {
                Ok(TablesOutcome::Done(entries, issues)) => {
                    tracing::debug!(
                        namespace = %target.id,
                        entries = entries.len(),
                        "namespace scanned"
                    );
                    scan.entries.extend(entries);
                    scan.report.issues.extend(issues);
                    scan.report.namespaces_scanned.push(target.id.clone());
                }
                Ok(TablesOutcome::Cancelled) => {
                    return Err(Error::Cancelled {
                        partial: Box::new(scan),
                    });
                }
                Err(Error::NamespaceAccessDenied { namespace, source }) => {
                    tracing::warn!(%namespace, "cannot enter network namespace: {}", source);
                    scan.report.issues.push(ScanIssue::NamespaceDenied {
                        namespace,
                        reason: source.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(scan)
    }

    fn build_index(&self, report: &mut ScanReport) -> Result<InodeIndex> {
        let (index, stats) = build_index(&self.config.proc_root)?;
        if !is_privileged() {
            report.issues.push(ScanIssue::ReducedAttribution);
        }
        if stats.vanished > 0 {
            report.issues.push(ScanIssue::ProcessesVanished {
                count: stats.vanished,
            });
        }
        if stats.unreadable > 0 {
            report.issues.push(ScanIssue::ProcessesUnreadable {
                count: stats.unreadable,
            });
        }
        Ok(index)
    }

    fn scan_tables<F>(
        &self,
        target: &NamespaceTarget,
        switched: bool,
        features: &FeatureSelection,
        index: Option<&InodeIndex>,
        accept: &F,
        cancel: &CancellationToken,
    ) -> Result<TablesOutcome>
    where
        F: Fn(&SocketEntry) -> bool,
    {
        let mut entries = Vec::new();
        let mut issues = Vec::new();
        let netns = target.inode.filter(|_| features.namespace_attribution);

        for &transport in features.selected_transports() {
            if cancel.is_cancelled() {
                return Ok(TablesOutcome::Cancelled);
            }

            let path = self.config.table_path(transport, switched);
            let mut table = match SockTable::open(&path, transport) {
                Ok(table) => table.in_namespace(target.id.clone()),
                Err(e) if features.is_explicit() => return Err(e),
                Err(e) => {
                    tracing::debug!(namespace = %target.id, "{}", e);
                    issues.push(ScanIssue::TableUnavailable {
                        namespace: target.id.clone(),
                        transport,
                        reason: source_reason(&e),
                    });
                    continue;
                }
            };

            for mut entry in table.by_ref() {
                if let Some(index) = index {
                    let owner = match netns {
                        Some(ns) => index.get_in(entry.inode, ns),
                        None => index.get(entry.inode),
                    };
                    entry.process = owner.cloned();
                }
                if accept(&entry) {
                    entries.push(entry);
                }
            }

            if table.skipped() > 0 {
                issues.push(ScanIssue::MalformedRecords {
                    namespace: target.id.clone(),
                    transport,
                    count: table.skipped(),
                });
            }
            if let Some(e) = table.take_error() {
                issues.push(ScanIssue::TableTruncated {
                    namespace: target.id.clone(),
                    transport,
                    reason: e.to_string(),
                });
            }
        }

        Ok(TablesOutcome::Done(entries, issues))
    }
}

fn source_reason(e: &Error) -> String {
    match e {
        Error::SourceUnavailable { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

/// Run a scan on a dedicated OS thread.
///
/// Namespace switching moves a single OS thread, so the scan never runs on an
/// async worker or on a pooled blocking thread. The thread is spawned for
/// this scan and exits when it returns; should a namespace restore fail, the
/// thread left in the foreign namespace dies with it instead of going back
/// to a pool. The engine is the same as [`Netstat::run`].
pub async fn netstat<F>(
    config: ScanConfig,
    features: FeatureSelection,
    accept: F,
    cancel: CancellationToken,
) -> Result<Scan>
where
    F: Fn(&SocketEntry) -> bool + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("netstat-scan".into())
        .spawn(move || {
            let result = Netstat::new(config).run(&features, accept, &cancel);
            // The receiver is gone only if the caller dropped the future.
            let _ = tx.send(result);
        })?;

    rx.await
        .map_err(|_| Error::Io(io::Error::other("scan thread exited without a result")))?
}
