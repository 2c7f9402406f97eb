//! Namespace walking over a fake proc tree.

use procnet::Result;
use procnet::netstat::{
    Error, FeatureSelection, NamespaceId, NamespaceSelection, Netstat, Process, ScanIssue,
    Transport, accept,
};
use tokio_util::sync::CancellationToken;

use crate::common::{FakeProc, FakeSwitch, record};

/// Host plus two namespaces, each with one listening TCP socket.
///
/// - host: inode 1, pid 61
/// - blue: inode 2, named `blue`, pid 50 and 62
/// - red: inode 3, pid 60
fn three_namespaces() -> std::io::Result<FakeProc> {
    let proc = FakeProc::new()?;
    proc.host_table(
        Transport::Tcp,
        &[record("0100007F:0016", "00000000:0000", "0A", 0, 1)],
    )?;
    proc.view_table(
        "blue",
        Transport::Tcp,
        &[record("0100007F:0050", "00000000:0000", "0A", 0, 2)],
    )?;
    proc.view_table(
        "red",
        Transport::Tcp,
        &[record("0100007F:01BB", "00000000:0000", "0A", 0, 3)],
    )?;
    proc.named("blue", "blue")?;
    proc.process(50, "blue-a", "blue", &[2])?;
    proc.process(60, "red", "red", &[3])?;
    proc.process(61, "init", "host", &[1])?;
    proc.process(62, "blue-b", "blue", &[])?;
    Ok(proc)
}

fn tcp() -> FeatureSelection {
    FeatureSelection::new().transports(&[Transport::Tcp])
}

#[test]
fn test_single_pid_skips_host() -> Result<()> {
    let proc = three_namespaces()?;
    let switch = FakeSwitch::new(&proc);
    let features = tcp().namespaces(NamespaceSelection::Pids(vec![50]));

    let scan = Netstat::with_switch(proc.config(), &switch).run(
        &features,
        accept::all,
        &CancellationToken::new(),
    )?;

    let inodes: Vec<u64> = scan.entries.iter().map(|e| e.inode).collect();
    assert_eq!(inodes, vec![2]);
    assert!(scan.entries.iter().all(|e| e.namespace == NamespaceId::Pid(50)));
    assert_eq!(scan.report.namespaces_scanned, vec![NamespaceId::Pid(50)]);
    assert_eq!(*switch.entered.borrow(), vec!["blue".to_string()]);
    assert_eq!(proc.current_view()?, "host");
    Ok(())
}

#[test]
fn test_all_visits_each_namespace_once() -> Result<()> {
    let proc = three_namespaces()?;
    let switch = FakeSwitch::new(&proc);
    let features = tcp().namespaces(NamespaceSelection::All);

    let scan = Netstat::with_switch(proc.config(), &switch).run(
        &features,
        accept::all,
        &CancellationToken::new(),
    )?;

    assert_eq!(
        scan.report.namespaces_scanned,
        vec![
            NamespaceId::Host,
            NamespaceId::Named("blue".into()),
            NamespaceId::Pid(60),
        ]
    );
    let tagged: Vec<(u64, NamespaceId)> = scan
        .entries
        .iter()
        .map(|e| (e.inode, e.namespace.clone()))
        .collect();
    assert_eq!(
        tagged,
        vec![
            (1, NamespaceId::Host),
            (2, NamespaceId::Named("blue".into())),
            (3, NamespaceId::Pid(60)),
        ]
    );
    assert_eq!(switch.restored.get(), 2);
    assert_eq!(proc.current_view()?, "host");
    Ok(())
}

#[test]
fn test_denied_namespace_is_skipped() -> Result<()> {
    let proc = three_namespaces()?;
    let switch = FakeSwitch::new(&proc).deny("red");
    let features = tcp().namespaces(NamespaceSelection::All);

    let scan = Netstat::with_switch(proc.config(), &switch).run(
        &features,
        accept::all,
        &CancellationToken::new(),
    )?;

    assert!(scan.entries.iter().all(|e| e.namespace != NamespaceId::Pid(60)));
    assert!(!scan.report.namespaces_scanned.contains(&NamespaceId::Pid(60)));
    assert!(scan.report.issues.iter().any(|issue| matches!(
        issue,
        ScanIssue::NamespaceDenied { namespace: NamespaceId::Pid(60), .. }
    )));
    assert_eq!(scan.entries.len(), 2);
    assert_eq!(proc.current_view()?, "host");
    Ok(())
}

#[test]
fn test_restores_after_error_inside_namespace() -> Result<()> {
    let proc = three_namespaces()?;
    let switch = FakeSwitch::new(&proc);
    // blue has no udp table and the transport set is explicit
    let features = FeatureSelection::new()
        .transports(&[Transport::Tcp, Transport::Udp])
        .namespaces(NamespaceSelection::Pids(vec![50]));

    let err = Netstat::with_switch(proc.config(), &switch)
        .run(&features, accept::all, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::SourceUnavailable { .. }));
    assert_eq!(switch.restored.get(), 1);
    assert_eq!(proc.current_view()?, "host");
    Ok(())
}

#[test]
fn test_restore_failure_is_fatal() -> Result<()> {
    let proc = three_namespaces()?;
    let switch = FakeSwitch::new(&proc).fail_restore();
    let features = tcp().namespaces(NamespaceSelection::All);

    let err = Netstat::with_switch(proc.config(), &switch)
        .run(&features, accept::all, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::NamespaceRestoreFailed { .. }));
    assert!(err.is_fatal());
    // Nothing after the first switched namespace was attempted
    assert_eq!(*switch.entered.borrow(), vec!["blue".to_string()]);
    Ok(())
}

#[test]
fn test_cancel_between_namespaces_keeps_finished_ones() -> Result<()> {
    let proc = three_namespaces()?;
    let cancel = CancellationToken::new();
    let switch = FakeSwitch::new(&proc).cancel_on_restore(cancel.clone());
    let features = tcp()
        .namespaces(NamespaceSelection::Pids(vec![50, 60]))
        .skip_host(true);

    let err = Netstat::with_switch(proc.config(), &switch)
        .run(&features, accept::all, &cancel)
        .unwrap_err();

    let Error::Cancelled { partial } = err else {
        panic!("expected cancellation, got {err}");
    };
    assert_eq!(partial.report.namespaces_scanned, vec![NamespaceId::Pid(50)]);
    let inodes: Vec<u64> = partial.entries.iter().map(|e| e.inode).collect();
    assert_eq!(inodes, vec![2]);
    assert_eq!(*switch.entered.borrow(), vec!["blue".to_string()]);
    assert_eq!(proc.current_view()?, "host");
    Ok(())
}

#[test]
fn test_namespace_attribution_rejects_foreign_owner() -> Result<()> {
    let proc = FakeProc::new()?;
    // The same inode number printed in two namespaces
    proc.host_table(
        Transport::Tcp,
        &[record("0100007F:0016", "00000000:0000", "0A", 0, 12345)],
    )?;
    proc.view_table(
        "blue",
        Transport::Tcp,
        &[record("0100007F:0016", "00000000:0000", "0A", 0, 12345)],
    )?;
    proc.process(42, "myproc", "blue", &[12345])?;

    let switch = FakeSwitch::new(&proc);
    let features = tcp()
        .namespaces(NamespaceSelection::All)
        .resolve_processes(true)
        .namespace_attribution(true);

    let scan = Netstat::with_switch(proc.config(), &switch).run(
        &features,
        accept::all,
        &CancellationToken::new(),
    )?;

    assert_eq!(scan.entries.len(), 2);
    assert_eq!(scan.entries[0].namespace, NamespaceId::Host);
    assert_eq!(scan.entries[0].process, None);
    assert_eq!(scan.entries[1].namespace, NamespaceId::Pid(42));
    assert_eq!(scan.entries[1].process, Some(Process::new(42, "myproc")));
    Ok(())
}
