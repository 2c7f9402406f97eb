//! Protocol table reader.
//!
//! Reads one `/proc/net/<transport>` file and yields its records lazily, one
//! line at a time. The layout is shared by the TCP, UDP, UDP-Lite and raw
//! tables:
//!
//! ```text
//!   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
//!    0: 0100007F:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 16303 ...
//! ```
//!
//! A record that does not decode, or is not valid UTF-8, is skipped and
//! counted; it never ends the table.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::decode::{parse_endpoint, parse_state};
use super::error::{Error, Result};
use super::types::{NamespaceId, SocketEntry, Transport};

// Whitespace-separated field positions.
const FIELD_LOCAL: usize = 1;
const FIELD_REMOTE: usize = 2;
const FIELD_STATE: usize = 3;
const FIELD_QUEUES: usize = 4;
const FIELD_UID: usize = 7;
const FIELD_INODE: usize = 9;

/// Decode one table record (a line without the header).
///
/// The returned entry has no process and is tagged with the host namespace.
pub fn parse_record(line: &str, transport: Transport) -> Result<SocketEntry> {
    let mut fields: [&str; FIELD_INODE + 1] = [""; FIELD_INODE + 1];
    let mut iter = line.split_whitespace();
    for (i, slot) in fields.iter_mut().enumerate() {
        *slot = iter
            .next()
            .ok_or_else(|| Error::malformed(format!("record has only {} fields", i)))?;
    }

    let local = parse_endpoint(fields[FIELD_LOCAL])?;
    let remote = parse_endpoint(fields[FIELD_REMOTE])?;
    let state = transport.decode_state(parse_state(fields[FIELD_STATE])?);

    let (tx, rx) = fields[FIELD_QUEUES]
        .split_once(':')
        .ok_or_else(|| Error::malformed("queue field without separator"))?;
    let tx_queue = u32::from_str_radix(tx, 16)
        .map_err(|_| Error::malformed(format!("invalid tx_queue {:?}", tx)))?;
    let rx_queue = u32::from_str_radix(rx, 16)
        .map_err(|_| Error::malformed(format!("invalid rx_queue {:?}", rx)))?;

    let uid = fields[FIELD_UID]
        .parse::<u32>()
        .map_err(|_| Error::malformed(format!("invalid uid {:?}", fields[FIELD_UID])))?;
    let inode = fields[FIELD_INODE]
        .parse::<u64>()
        .map_err(|_| Error::malformed(format!("invalid inode {:?}", fields[FIELD_INODE])))?;

    Ok(SocketEntry {
        transport,
        local,
        remote,
        state,
        tx_queue,
        rx_queue,
        uid,
        inode,
        process: None,
        namespace: NamespaceId::Host,
    })
}

/// A lazy, single-pass reader over one socket table.
///
/// Each instance reads its source once; open a new one to re-read.
#[derive(Debug)]
pub struct SockTable<R> {
    reader: R,
    transport: Transport,
    namespace: NamespaceId,
    line: Vec<u8>,
    line_no: usize,
    skipped: usize,
    error: Option<io::Error>,
    done: bool,
}

impl SockTable<BufReader<File>> {
    /// Open a table file.
    ///
    /// A missing or unreadable file yields [`Error::SourceUnavailable`].
    pub fn open(path: impl AsRef<Path>, transport: Transport) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), transport))
    }
}

impl<R: BufRead> SockTable<R> {
    /// Read a table from an already open stream.
    pub fn from_reader(reader: R, transport: Transport) -> Self {
        Self {
            reader,
            transport,
            namespace: NamespaceId::Host,
            line: Vec::with_capacity(256),
            line_no: 0,
            skipped: 0,
            error: None,
            done: false,
        }
    }

    /// Tag produced entries with a namespace.
    pub fn in_namespace(mut self, namespace: NamespaceId) -> Self {
        self.namespace = namespace;
        self
    }

    /// Transport of this table.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Number of records skipped so far because they did not decode.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Take the read error that ended the table early, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn next_line(&mut self) -> Option<()> {
        if self.done {
            return None;
        }
        self.line.clear();
        match self.reader.read_until(b'\n', &mut self.line) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                self.line_no += 1;
                Some(())
            }
            Err(e) => {
                tracing::warn!(
                    transport = %self.transport,
                    line = self.line_no + 1,
                    "socket table read failed: {}",
                    e
                );
                self.error = Some(e);
                self.done = true;
                None
            }
        }
    }
}

impl<R: BufRead> Iterator for SockTable<R> {
    type Item = SocketEntry;

    fn next(&mut self) -> Option<SocketEntry> {
        loop {
            self.next_line()?;

            // Header
            if self.line_no == 1 {
                continue;
            }
            let line = match std::str::from_utf8(&self.line) {
                Ok(line) => line,
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!(
                        transport = %self.transport,
                        line = self.line_no,
                        "skipping record: {}",
                        e
                    );
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match parse_record(line, self.transport) {
                Ok(mut entry) => {
                    entry.namespace = self.namespace.clone();
                    return Some(entry);
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::debug!(
                        transport = %self.transport,
                        line = self.line_no,
                        "skipping record: {}",
                        e
                    );
                }
            }
        }
    }
}
