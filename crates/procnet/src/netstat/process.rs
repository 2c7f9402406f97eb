//! Process index: which process owns which socket inode.
//!
//! Built by walking `/proc/<pid>/fd` with [`procfs`], where every socket
//! descriptor resolves to [`FDTarget::Socket`]. The inode is the same number
//! printed in the last column of the socket tables, which is how entries are
//! joined to processes.
//!
//! The walk races with the rest of the system. A process may exit between the
//! pid listing and the fd listing, and descriptors may close while being read.
//! Both cases drop that pid (or fd) and carry on.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use procfs::ProcError;
use procfs::process::{FDTarget, all_processes_with_root};

use super::error::{Error, Result};
use super::types::Process;

/// Mapping from socket inode to owning process.
///
/// A socket shared by several descriptors maps to whichever was seen last.
#[derive(Debug, Clone, Default)]
pub struct InodeIndex {
    sockets: HashMap<u64, Process>,
    netns: HashMap<u32, u64>,
}

impl InodeIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `process` holds socket `inode`.
    pub fn insert(&mut self, inode: u64, process: Process) {
        self.sockets.insert(inode, process);
    }

    /// Record the network namespace inode of `pid`.
    pub fn set_netns(&mut self, pid: u32, netns: u64) {
        self.netns.insert(pid, netns);
    }

    /// Look up the owner of a socket.
    pub fn get(&self, inode: u64) -> Option<&Process> {
        self.sockets.get(&inode)
    }

    /// Look up the owner of a socket, only if it lives in namespace `netns`.
    pub fn get_in(&self, inode: u64, netns: u64) -> Option<&Process> {
        self.get(inode)
            .filter(|p| self.netns.get(&p.pid) == Some(&netns))
    }

    /// Network namespace inode of a process, if it was readable.
    pub fn netns_of(&self, pid: u32) -> Option<u64> {
        self.netns.get(&pid).copied()
    }

    /// Number of indexed sockets.
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Whether no socket was indexed.
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

/// Counters collected while building an [`InodeIndex`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Processes whose descriptors were read.
    pub processes: usize,
    /// Processes that exited during the walk.
    pub vanished: usize,
    /// Processes whose descriptors could not be read (usually privilege).
    pub unreadable: usize,
}

/// Whether the caller runs with effective uid 0.
///
/// Without it, descriptors of other users' processes are unreadable and the
/// index is incomplete.
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// List the pids visible under the proc root, sorted.
pub fn list_pids(proc_root: &Path) -> Result<Vec<u32>> {
    let mut pids: Vec<u32> = all_processes_with_root(proc_root)?
        .filter_map(|process| process.ok())
        .filter_map(|process| u32::try_from(process.pid()).ok())
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

/// Inode of the namespace a handle refers to.
///
/// `stat` follows the `ns/net` magic link (or a bind mount under the netns
/// run directory) to the nsfs inode, which identifies the namespace.
pub fn netns_inode(handle: &Path) -> io::Result<u64> {
    fs::metadata(handle).map(|m| m.ino())
}

/// Read the network namespace inode of a process.
pub fn read_netns_inode(proc_root: &Path, pid: u32) -> io::Result<u64> {
    netns_inode(&proc_root.join(pid.to_string()).join("ns/net"))
}

fn vanished_or(pid: u32, e: ProcError) -> Error {
    match e {
        ProcError::NotFound(_) => Error::ProcessVanished { pid },
        ProcError::Io(ref io, _) if io.raw_os_error() == Some(libc::ESRCH) => {
            Error::ProcessVanished { pid }
        }
        other => Error::Proc(other),
    }
}

/// Read the name and socket inodes of one process.
fn scan_pid(process: &procfs::process::Process, pid: u32) -> Result<(Process, Vec<u64>)> {
    let stat = process.stat().map_err(|e| vanished_or(pid, e))?;
    let owner = Process::new(pid, stat.comm);

    let mut inodes = Vec::new();
    for fd in process.fd().map_err(|e| vanished_or(pid, e))? {
        // The descriptor may close between listing and readlink
        let Ok(fd) = fd else { continue };
        if let FDTarget::Socket(inode) = fd.target {
            inodes.push(inode);
        }
    }

    Ok((owner, inodes))
}

/// Build the inode index for every process visible under `proc_root`.
///
/// Only a failure to list `proc_root` itself is an error.
pub fn build_index(proc_root: &Path) -> Result<(InodeIndex, IndexStats)> {
    let mut index = InodeIndex::new();
    let mut stats = IndexStats::default();

    for process in all_processes_with_root(proc_root)? {
        let Ok(process) = process else {
            stats.vanished += 1;
            continue;
        };
        let Ok(pid) = u32::try_from(process.pid()) else {
            continue;
        };
        match scan_pid(&process, pid) {
            Ok((owner, inodes)) => {
                stats.processes += 1;
                if let Ok(netns) = read_netns_inode(proc_root, pid) {
                    index.set_netns(pid, netns);
                }
                for inode in inodes {
                    index.insert(inode, owner.clone());
                }
            }
            Err(e @ Error::ProcessVanished { .. }) => {
                stats.vanished += 1;
                tracing::debug!("{}", e);
            }
            Err(e) => {
                stats.unreadable += 1;
                tracing::debug!(pid, "cannot read descriptors: {}", e);
            }
        }
    }

    tracing::debug!(
        sockets = index.len(),
        processes = stats.processes,
        vanished = stats.vanished,
        unreadable = stats.unreadable,
        "built inode index"
    );
    Ok((index, stats))
}
