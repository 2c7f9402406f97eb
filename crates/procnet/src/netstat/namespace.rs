//! Network namespace utilities.
//!
//! This module decides which network namespaces a scan visits and provides
//! the scoped switch used to read each namespace's view of `/proc/net`.
//!
//! Switching is thread-scoped on Linux: `setns(2)` moves only the calling
//! thread. Every switch is therefore paired with a restore on the same
//! thread, and [`NamespaceGuard`] is not `Send`.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use procnet::netstat::{NamespaceId, SetnsSwitch, namespace};
//!
//! let id = NamespaceId::Named("myns".into());
//! let count = namespace::run_in(SetnsSwitch, &id, Path::new("/var/run/netns/myns"), || {
//!     // Now in "myns": /proc/thread-self/net/tcp is its table
//!     Ok(std::fs::read_to_string("/proc/thread-self/net/tcp")?.lines().count())
//! })?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::marker::PhantomData;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use super::error::{Error, Result};
use super::process::{list_pids, netns_inode};
use super::scan::ScanConfig;
use super::types::NamespaceId;

/// The runtime directory where named network namespaces are stored.
pub const NETNS_RUN_DIR: &str = "/var/run/netns";

/// Handle of the calling thread's own network namespace.
const THREAD_SELF_NETNS: &str = "/proc/thread-self/ns/net";

/// A handle to an open namespace file.
#[derive(Debug)]
pub struct NamespaceFd {
    file: File,
}

impl NamespaceFd {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }
}

impl AsRawFd for NamespaceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// The operations a scoped namespace switch needs.
///
/// [`SetnsSwitch`] is the real implementation. Other implementations let the
/// switch sequencing be exercised without privilege.
pub trait NamespaceSwitch {
    /// Saved handle of a namespace to return to.
    type Handle;

    /// Save the calling thread's current namespace.
    fn current(&self) -> io::Result<Self::Handle>;

    /// Move the calling thread into the namespace at `target`.
    fn enter(&self, target: &Path) -> io::Result<()>;

    /// Move the calling thread back into a saved namespace.
    fn restore(&self, original: &Self::Handle) -> io::Result<()>;
}

impl<S: NamespaceSwitch + ?Sized> NamespaceSwitch for &S {
    type Handle = S::Handle;

    fn current(&self) -> io::Result<Self::Handle> {
        (**self).current()
    }

    fn enter(&self, target: &Path) -> io::Result<()> {
        (**self).enter(target)
    }

    fn restore(&self, original: &Self::Handle) -> io::Result<()> {
        (**self).restore(original)
    }
}

/// Namespace switching through `setns(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetnsSwitch;

fn setns(fd: RawFd) -> io::Result<()> {
    // SAFETY: libc::setns is a standard Linux syscall for switching namespaces.
    // fd is a valid fd to a namespace file, CLONE_NEWNET specifies we're
    // switching the network namespace.
    let ret = unsafe { libc::setns(fd, libc::CLONE_NEWNET) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl NamespaceSwitch for SetnsSwitch {
    type Handle = NamespaceFd;

    fn current(&self) -> io::Result<NamespaceFd> {
        NamespaceFd::open(Path::new(THREAD_SELF_NETNS))
    }

    fn enter(&self, target: &Path) -> io::Result<()> {
        let target = NamespaceFd::open(target)?;
        setns(target.as_raw_fd())
    }

    fn restore(&self, original: &NamespaceFd) -> io::Result<()> {
        setns(original.as_raw_fd())
    }
}

/// A guard that restores the original namespace when dropped.
///
/// Prefer [`NamespaceGuard::restore`]: a failure to restore is only logged
/// from `Drop`.
pub struct NamespaceGuard<S: NamespaceSwitch = SetnsSwitch> {
    switch: S,
    original: Option<S::Handle>,
    // The namespace belongs to this thread; the guard must stay on it.
    _thread: PhantomData<*const ()>,
}

impl<S: NamespaceSwitch> NamespaceGuard<S> {
    /// Save the current namespace, then enter `target`.
    ///
    /// Failing to enter yields [`Error::NamespaceAccessDenied`] and leaves
    /// the thread where it was.
    pub fn enter(switch: S, namespace: &NamespaceId, target: &Path) -> Result<Self> {
        let original = switch.current()?;
        switch
            .enter(target)
            .map_err(|source| Error::NamespaceAccessDenied {
                namespace: namespace.clone(),
                source,
            })?;
        Ok(Self {
            switch,
            original: Some(original),
            _thread: PhantomData,
        })
    }

    /// Restore the original namespace explicitly.
    ///
    /// This is called automatically on drop, but calling it explicitly
    /// allows you to handle errors.
    pub fn restore(mut self) -> Result<()> {
        match self.original.take() {
            Some(original) => self
                .switch
                .restore(&original)
                .map_err(|source| Error::NamespaceRestoreFailed { source }),
            None => Ok(()),
        }
    }
}

impl<S: NamespaceSwitch> fmt::Debug for NamespaceGuard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceGuard")
            .field("active", &self.original.is_some())
            .finish()
    }
}

impl<S: NamespaceSwitch> Drop for NamespaceGuard<S> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take()
            && let Err(e) = self.switch.restore(&original)
        {
            tracing::error!("failed to restore network namespace: {}", e);
        }
    }
}

/// Run `f` inside the namespace at `target`, then return to the original one.
///
/// The restore happens whether or not `f` succeeds. A failed restore wins
/// over `f`'s result, since the thread is no longer where the caller left it.
pub fn run_in<S, T, F>(switch: S, namespace: &NamespaceId, target: &Path, f: F) -> Result<T>
where
    S: NamespaceSwitch,
    F: FnOnce() -> Result<T>,
{
    let guard = NamespaceGuard::enter(switch, namespace, target)?;
    let result = f();
    guard.restore()?;
    result
}

/// List the named network namespaces in `run_dir`, sorted.
///
/// A missing directory means there are none.
pub fn list_in(run_dir: &Path) -> Result<Vec<String>> {
    let dir = match std::fs::read_dir(run_dir) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io(e)),
    };

    let mut names = Vec::new();
    for entry in dir {
        let entry = entry?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }

    names.sort();
    Ok(names)
}

/// Which network namespaces a scan visits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceSelection {
    /// The caller's namespace only, without switching.
    #[default]
    HostOnly,
    /// Every namespace reachable through the proc root or the run directory.
    All,
    /// The namespaces of these processes.
    Pids(Vec<u32>),
    /// These named namespaces.
    Names(Vec<String>),
}

impl NamespaceSelection {
    /// A single explicit target means the caller is only interested in it.
    pub fn implies_skip_host(&self) -> bool {
        match self {
            Self::Pids(pids) => pids.len() == 1,
            Self::Names(names) => names.len() == 1,
            _ => false,
        }
    }
}

/// One namespace to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTarget {
    /// Display identifier.
    pub id: NamespaceId,
    /// Handle to enter; `None` for the caller's own namespace.
    pub path: Option<PathBuf>,
    /// Namespace inode, when it could be read.
    pub inode: Option<u64>,
}

impl NamespaceTarget {
    fn host(config: &ScanConfig) -> Self {
        Self {
            id: NamespaceId::Host,
            path: None,
            inode: netns_inode(&config.proc_root.join("self/ns/net")).ok(),
        }
    }

    fn at(id: NamespaceId, path: PathBuf) -> Self {
        let inode = netns_inode(&path).ok();
        Self {
            id,
            path: Some(path),
            inode,
        }
    }
}

/// Resolve a selection into the ordered list of namespaces to visit.
///
/// A name absent from the run directory yields [`Error::NamespaceNotFound`];
/// an existing handle that cannot be entered is left to the walk.
pub fn resolve_targets(
    selection: &NamespaceSelection,
    skip_host: bool,
    config: &ScanConfig,
) -> Result<Vec<NamespaceTarget>> {
    let skip_host = skip_host || selection.implies_skip_host();
    let host = NamespaceTarget::host(config);
    let mut targets = Vec::new();

    match selection {
        NamespaceSelection::HostOnly => {}
        NamespaceSelection::Pids(pids) => {
            let mut seen = HashSet::new();
            for &pid in pids {
                if seen.insert(pid) {
                    let path = config.proc_root.join(pid.to_string()).join("ns/net");
                    targets.push(NamespaceTarget::at(NamespaceId::Pid(pid), path));
                }
            }
        }
        NamespaceSelection::Names(names) => {
            let mut seen = HashSet::new();
            for name in names {
                if seen.insert(name.as_str()) {
                    let path = config.netns_run_dir.join(name);
                    if let Err(e) = fs::symlink_metadata(&path)
                        && e.kind() == io::ErrorKind::NotFound
                    {
                        return Err(Error::NamespaceNotFound { name: name.clone() });
                    }
                    targets.push(NamespaceTarget::at(NamespaceId::Named(name.clone()), path));
                }
            }
        }
        NamespaceSelection::All => targets = discover(config, host.inode)?,
    }

    if !skip_host {
        targets.insert(0, host);
    }
    Ok(targets)
}

/// Find every distinct namespace other than the host's.
///
/// Named namespaces come first so they are displayed by name; processes then
/// contribute the namespaces nobody named.
fn discover(config: &ScanConfig, host_inode: Option<u64>) -> Result<Vec<NamespaceTarget>> {
    let mut seen: HashSet<u64> = host_inode.into_iter().collect();
    let mut targets = Vec::new();

    for name in list_in(&config.netns_run_dir)? {
        let target = NamespaceTarget::at(
            NamespaceId::Named(name.clone()),
            config.netns_run_dir.join(&name),
        );
        let Some(inode) = target.inode else {
            tracing::debug!(name, "cannot stat named namespace");
            continue;
        };
        if seen.insert(inode) {
            targets.push(target);
        }
    }

    for pid in list_pids(&config.proc_root)? {
        let target = NamespaceTarget::at(
            NamespaceId::Pid(pid),
            config.proc_root.join(pid.to_string()).join("ns/net"),
        );
        // Unreadable (other user's process) or already exited
        if let Some(inode) = target.inode
            && seen.insert(inode)
        {
            targets.push(target);
        }
    }

    tracing::debug!(count = targets.len(), "discovered network namespaces");
    Ok(targets)
}
