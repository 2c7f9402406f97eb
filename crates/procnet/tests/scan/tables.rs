//! Host table scans over a fake proc tree.

use procnet::Result;
use procnet::netstat::{
    Error, FeatureSelection, NamespaceId, Netstat, Process, ScanIssue, Transport, accept,
    netstat, process::is_privileged,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::common::{FakeProc, record};

fn run<F>(proc: &FakeProc, features: &FeatureSelection, accept: F) -> Result<procnet::netstat::Scan>
where
    F: Fn(&procnet::netstat::SocketEntry) -> bool,
{
    Netstat::new(proc.config()).run(features, accept, &CancellationToken::new())
}

fn listen_and_established(proc: &FakeProc) -> std::io::Result<()> {
    proc.host_table(
        Transport::Tcp,
        &[
            record("0100007F:0277", "00000000:0000", "0A", 0, 100),
            record("0F02000A:B0A4", "5DB8D822:01BB", "01", 1000, 101),
        ],
    )?;
    proc.host_table(
        Transport::Udp,
        &[record("00000000:0044", "00000000:0000", "07", 0, 200)],
    )
}

#[test]
fn test_predicates_partition_entries() -> Result<()> {
    let proc = FakeProc::new()?;
    listen_and_established(&proc)?;
    let features = FeatureSelection::new().transports(&[Transport::Tcp, Transport::Udp]);

    let listening = run(&proc, &features, accept::listening)?;
    let inodes: Vec<u64> = listening.entries.iter().map(|e| e.inode).collect();
    assert_eq!(inodes, vec![100, 200]);

    let connected = run(&proc, &features, accept::connected)?;
    let inodes: Vec<u64> = connected.entries.iter().map(|e| e.inode).collect();
    assert_eq!(inodes, vec![101]);

    let all = run(&proc, &features, accept::all)?;
    assert_eq!(all.entries.len(), 3);
    assert!(all.report.is_complete());
    assert_eq!(all.report.namespaces_scanned, vec![NamespaceId::Host]);
    Ok(())
}

#[test]
fn test_entries_keep_table_then_record_order() -> Result<()> {
    let proc = FakeProc::new()?;
    listen_and_established(&proc)?;
    let features = FeatureSelection::new().transports(&[Transport::Udp, Transport::Tcp]);

    let scan = run(&proc, &features, accept::all)?;
    let order: Vec<(Transport, u64)> = scan.entries.iter().map(|e| (e.transport, e.inode)).collect();
    assert_eq!(
        order,
        vec![
            (Transport::Tcp, 100),
            (Transport::Tcp, 101),
            (Transport::Udp, 200)
        ]
    );
    Ok(())
}

#[test]
fn test_resolves_owner_by_inode() -> Result<()> {
    let proc = FakeProc::new()?;
    proc.host_table(
        Transport::Tcp,
        &[
            record("0100007F:1F90", "00000000:0000", "0A", 0, 12345),
            record("0100007F:1F91", "00000000:0000", "0A", 0, 777),
        ],
    )?;
    proc.process(42, "myproc", "host", &[12345])?;

    let features = FeatureSelection::new()
        .transports(&[Transport::Tcp])
        .resolve_processes(true);
    let scan = run(&proc, &features, accept::all)?;

    assert_eq!(scan.entries[0].process, Some(Process::new(42, "myproc")));
    // Kernel-owned or already closed: unresolved, not an error
    assert_eq!(scan.entries[1].process, None);
    Ok(())
}

#[test]
fn test_predicate_sees_attached_process() -> Result<()> {
    let proc = FakeProc::new()?;
    proc.host_table(
        Transport::Tcp,
        &[
            record("0100007F:0016", "00000000:0000", "0A", 0, 1),
            record("0100007F:0050", "00000000:0000", "0A", 0, 2),
        ],
    )?;
    proc.process(10, "sshd", "host", &[1])?;
    proc.process(11, "nginx: worker", "host", &[2])?;

    let features = FeatureSelection::new()
        .transports(&[Transport::Tcp])
        .resolve_processes(true);
    let scan = run(&proc, &features, |e| {
        e.namespace.is_host() && e.process.as_ref().is_some_and(|p| p.name.starts_with("nginx"))
    })?;

    assert_eq!(scan.entries.len(), 1);
    assert_eq!(scan.entries[0].local.port, 80);
    Ok(())
}

#[test]
fn test_malformed_records_are_skipped_and_reported() -> Result<()> {
    let proc = FakeProc::new()?;
    proc.host_table(
        Transport::Tcp,
        &[
            record("0100007F:0277", "00000000:0000", "0A", 0, 100),
            "   1: 0100007:0050 00000000:0000 0A".to_string(),
            record("0100007F:0035", "00000000:0000", "0A", 0, 102),
        ],
    )?;

    let features = FeatureSelection::new().transports(&[Transport::Tcp]);
    let scan = run(&proc, &features, accept::all)?;

    assert_eq!(scan.entries.len(), 2);
    assert!(!scan.report.is_complete());
    assert!(scan.report.issues.contains(&ScanIssue::MalformedRecords {
        namespace: NamespaceId::Host,
        transport: Transport::Tcp,
        count: 1,
    }));
    Ok(())
}

#[test]
fn test_missing_default_tables_are_reported() -> Result<()> {
    let proc = FakeProc::new()?;
    listen_and_established(&proc)?;

    let scan = run(&proc, &FeatureSelection::default(), accept::all)?;
    assert_eq!(scan.entries.len(), 3);

    let skipped: Vec<Transport> = scan
        .report
        .issues
        .iter()
        .filter_map(|issue| match issue {
            ScanIssue::TableUnavailable { transport, .. } => Some(*transport),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec![Transport::Tcp6, Transport::Udp6]);
    Ok(())
}

#[test]
fn test_explicit_missing_table_fails() -> Result<()> {
    let proc = FakeProc::new()?;
    listen_and_established(&proc)?;

    let features = FeatureSelection::new().transports(&[Transport::Tcp, Transport::UdpLite]);
    let err = run(&proc, &features, accept::all).unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable { .. }));
    assert!(err.is_not_found());
    Ok(())
}

#[test]
fn test_unprivileged_scan_reports_reduced_attribution() -> Result<()> {
    let proc = FakeProc::new()?;
    proc.host_table(
        Transport::Tcp,
        &[record("0100007F:0277", "00000000:0000", "0A", 0, 100)],
    )?;
    proc.process(10, "cupsd", "host", &[100])?;

    let features = FeatureSelection::new()
        .transports(&[Transport::Tcp])
        .resolve_processes(true);
    let scan = run(&proc, &features, accept::all)?;

    assert_eq!(scan.entries[0].process, Some(Process::new(10, "cupsd")));
    assert_eq!(
        scan.report.issues.contains(&ScanIssue::ReducedAttribution),
        !is_privileged()
    );

    // Without process resolution there is nothing to attribute
    let scan = run(&proc, &FeatureSelection::new().transports(&[Transport::Tcp]), accept::all)?;
    assert!(!scan.report.issues.contains(&ScanIssue::ReducedAttribution));
    Ok(())
}

#[test]
fn test_unreadable_descriptors_are_reported() -> Result<()> {
    // Root reads through mode 000
    if is_privileged() {
        return Ok(());
    }

    let proc = FakeProc::new()?;
    proc.host_table(
        Transport::Tcp,
        &[
            record("0100007F:0016", "00000000:0000", "0A", 0, 1),
            record("0100007F:0050", "00000000:0000", "0A", 0, 2),
        ],
    )?;
    proc.process(10, "sshd", "host", &[1])?;
    proc.process(11, "nginx", "host", &[2])?;

    let fd_dir = proc.proc_root().join("11/fd");
    fs::set_permissions(&fd_dir, fs::Permissions::from_mode(0o000))?;

    let features = FeatureSelection::new()
        .transports(&[Transport::Tcp])
        .resolve_processes(true);
    let scan = run(&proc, &features, accept::all);
    fs::set_permissions(&fd_dir, fs::Permissions::from_mode(0o755))?;
    let scan = scan?;

    assert_eq!(scan.entries[0].process, Some(Process::new(10, "sshd")));
    assert_eq!(scan.entries[1].process, None);
    assert!(scan
        .report
        .issues
        .contains(&ScanIssue::ProcessesUnreadable { count: 1 }));
    assert!(scan.report.issues.contains(&ScanIssue::ReducedAttribution));
    Ok(())
}

#[tokio::test]
async fn test_async_scan_runs_on_its_own_thread() -> Result<()> {
    let proc = FakeProc::new()?;
    listen_and_established(&proc)?;

    let caller = std::thread::current().id();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record_thread = {
        let seen = Arc::clone(&seen);
        move |_: &procnet::netstat::SocketEntry| {
            let current = std::thread::current();
            seen.lock()
                .unwrap()
                .push((current.id(), current.name().map(str::to_string)));
            true
        }
    };

    let features = FeatureSelection::new().transports(&[Transport::Tcp, Transport::Udp]);
    let scan = netstat(proc.config(), features, record_thread, CancellationToken::new()).await?;
    assert_eq!(scan.entries.len(), 3);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    for (id, name) in seen.iter() {
        assert_ne!(*id, caller);
        assert_eq!(name.as_deref(), Some("netstat-scan"));
    }
    Ok(())
}
