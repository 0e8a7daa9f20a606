use anyhow::Result;
use ftserve::client::{request_file, request_listing, ClientRequest, ServerReply};
use ftserve::config::Timeouts;
use ftserve::data_channel::HostResolver;
use ftserve::fs_enum::{DirLister, DirectoryLister};
use ftserve::log::{TransferLog, TransferStatus};
use ftserve::session::bind_listener;
use ftserve::{Server, SessionError, SessionOutcome, SessionReport};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

fn write_file(path: &Path, size: usize) -> Result<Vec<u8>> {
    let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
    std::fs::write(path, &data)?;
    Ok(data)
}

fn timeouts() -> Timeouts {
    Timeouts {
        connect: Duration::from_millis(500),
        io: Some(Duration::from_secs(5)),
    }
}

// Serve exactly `sessions` clients on an ephemeral port, then hand back the reports
fn spawn_server(
    root: &Path,
    sessions: usize,
    transfer_log: Option<TransferLog>,
) -> Result<(SocketAddr, JoinHandle<Vec<SessionReport>>)> {
    let listener = bind_listener("127.0.0.1", 0)?;
    let mut server = Server::new(listener, root.to_path_buf()).with_timeouts(timeouts());
    if let Some(log) = transfer_log {
        server = server.with_transfer_log(log);
    }
    let addr = server.local_addr()?;
    Ok((addr, serve_sessions(server, sessions)))
}

fn serve_sessions(server: Server, sessions: usize) -> JoinHandle<Vec<SessionReport>> {
    std::thread::spawn(move || {
        (0..sessions)
            .map(|_| server.serve_one().expect("accept"))
            .collect()
    })
}

/// Names every client "client.test"; the first data leg goes to a host that
/// cannot be resolved.
struct FirstDialFails {
    dials: AtomicUsize,
}

impl HostResolver for FirstDialFails {
    fn resolve_client_hostname(&self, _addr: IpAddr) -> String {
        "client.test".to_string()
    }

    fn data_host(&self, addr: IpAddr) -> String {
        if self.dials.fetch_add(1, Ordering::SeqCst) == 0 {
            "no-such-host.invalid".to_string()
        } else {
            addr.to_string()
        }
    }
}

/// Lists a fixed set of names under `root`, whether or not they exist
struct FixedLister {
    root: PathBuf,
    names: Vec<String>,
}

impl DirectoryLister for FixedLister {
    fn list_entries(&self) -> io::Result<Vec<String>> {
        Ok(self.names.clone())
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

fn free_port() -> Result<u16> {
    let sock = TcpListener::bind("127.0.0.1:0")?;
    Ok(sock.local_addr()?.port())
}

#[test]
fn list_returns_directory_entries_in_order() -> Result<()> {
    let root = tempfile::tempdir()?;
    for name in ["alpha.txt", "beta.bin", "gamma"] {
        write_file(&root.path().join(name), 10)?;
    }
    std::fs::create_dir(root.path().join("subdir"))?;
    let expected = DirLister::new(root.path()).list_entries()?;

    let (addr, server) = spawn_server(root.path(), 1, None)?;
    let names = request_listing(&ClientRequest::list("127.0.0.1", addr.port(), 0))?;
    assert_eq!(names, expected);

    let reports = server.join().unwrap();
    assert!(matches!(reports[0].outcome, SessionOutcome::Listed { dropped: 0, .. }));
    assert!(reports[0].data_channel_opened);
    Ok(())
}

#[test]
fn list_is_truncated_to_bound() -> Result<()> {
    let root = tempfile::tempdir()?;
    for i in 0..80 {
        write_file(&root.path().join(format!("file_with_a_long_name_{:03}.dat", i)), 1)?;
    }
    let (addr, server) = spawn_server(root.path(), 1, None)?;
    let names = request_listing(&ClientRequest::list("127.0.0.1", addr.port(), 0))?;
    let joined = names.join(" ");
    assert!(joined.len() <= 1023);
    assert!(names.len() < 80);

    let reports = server.join().unwrap();
    match reports[0].outcome {
        SessionOutcome::Listed { bytes, dropped } => {
            assert_eq!(bytes as usize, joined.len());
            assert_eq!(dropped, 80 - names.len());
        }
        ref other => panic!("unexpected outcome {other:?}"),
    }
    Ok(())
}

#[test]
fn get_reconstructs_files_across_chunk_boundaries() -> Result<()> {
    let root = tempfile::tempdir()?;
    let sizes = [0usize, 5, 1023, 1024, 1025, 4096, 100_000];
    let mut files = Vec::new();
    for size in sizes {
        let name = format!("f{}.bin", size);
        files.push((name.clone(), write_file(&root.path().join(&name), size)?));
    }

    let (addr, server) = spawn_server(root.path(), files.len(), None)?;
    for (name, data) in &files {
        let mut out = Vec::new();
        let received = request_file(&ClientRequest::get("127.0.0.1", addr.port(), name, 0), &mut out)?;
        assert_eq!(received as usize, data.len(), "{name}");
        assert_eq!(&out, data, "{name}");
    }
    for report in server.join().unwrap() {
        assert!(matches!(report.outcome, SessionOutcome::Sent { .. }), "{:?}", report.outcome);
    }
    Ok(())
}

#[test]
fn missing_file_is_reported_on_control_only() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("present.txt"), 64)?;
    let (addr, server) = spawn_server(root.path(), 1, None)?;

    let mut out = Vec::new();
    let err = request_file(&ClientRequest::get("127.0.0.1", addr.port(), "absent.txt", 0), &mut out)
        .unwrap_err();
    let reply = err.downcast_ref::<ServerReply>().expect("server reply");
    assert_eq!(reply.0, "ERROR File not found");
    assert!(out.is_empty());

    let reports = server.join().unwrap();
    assert!(reports[0].data_channel_opened);
    assert!(matches!(
        reports[0].outcome,
        SessionOutcome::Failed(SessionError::FileNotFound(ref n)) if n == "absent.txt"
    ));
    Ok(())
}

#[test]
fn bad_verb_gets_error_and_no_data_connection() -> Result<()> {
    let root = tempfile::tempdir()?;
    let data_listener = TcpListener::bind("127.0.0.1:0")?;
    let data_port = data_listener.local_addr()?.port();
    let (addr, server) = spawn_server(root.path(), 1, None)?;

    let mut control = TcpStream::connect(addr)?;
    control.write_all(format!("{} -x file.txt", data_port).as_bytes())?;
    let mut reply = Vec::new();
    control.read_to_end(&mut reply)?;
    assert_eq!(reply, b"ERROR Incorrect Command");

    let reports = server.join().unwrap();
    assert!(!reports[0].data_channel_opened);
    assert!(matches!(reports[0].outcome, SessionOutcome::Failed(SessionError::IncorrectCommand(_))));

    data_listener.set_nonblocking(true)?;
    let err = data_listener.accept().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);
    Ok(())
}

#[test]
fn unreachable_data_port_does_not_stop_the_server() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("after.txt"), 32)?;
    let dead_port = free_port()?;
    let (addr, server) = spawn_server(root.path(), 2, None)?;

    // Nobody listens on dead_port: the server acknowledges, fails to dial, closes
    let mut control = TcpStream::connect(addr)?;
    control.write_all(format!("{} -l", dead_port).as_bytes())?;
    let mut reply = Vec::new();
    control.read_to_end(&mut reply)?;
    assert_eq!(reply, b"0");

    let names = request_listing(&ClientRequest::list("127.0.0.1", addr.port(), 0))?;
    assert_eq!(names, vec!["after.txt".to_string()]);

    let reports = server.join().unwrap();
    assert!(matches!(reports[0].outcome, SessionOutcome::Failed(SessionError::Connect { .. })));
    assert!(!reports[0].data_channel_opened);
    assert!(matches!(reports[1].outcome, SessionOutcome::Listed { .. }));
    Ok(())
}

#[test]
fn late_data_listener_is_still_reached() -> Result<()> {
    let root = tempfile::tempdir()?;
    let data = write_file(&root.path().join("late.txt"), 3000)?;
    let data_port = free_port()?;
    let (addr, server) = spawn_server(root.path(), 1, None)?;

    // Open the data listener only after the acknowledgment arrives
    let mut control = TcpStream::connect(addr)?;
    control.write_all(format!("{} -g late.txt", data_port).as_bytes())?;
    let mut ack = [0u8; 1];
    control.read_exact(&mut ack)?;
    assert_eq!(&ack, b"0");
    let listener = TcpListener::bind(("127.0.0.1", data_port))?;
    let (mut data_conn, _) = listener.accept()?;
    let mut received = Vec::new();
    data_conn.read_to_end(&mut received)?;
    assert_eq!(received, data);

    let mut trailer = Vec::new();
    control.read_to_end(&mut trailer)?;
    assert!(trailer.is_empty());
    server.join().unwrap();
    Ok(())
}

#[test]
fn consecutive_sessions_do_not_share_command_state() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("first.txt"), 100)?;
    let (addr, server) = spawn_server(root.path(), 2, None)?;

    let mut out = Vec::new();
    request_file(&ClientRequest::get("127.0.0.1", addr.port(), "first.txt", 0), &mut out)?;
    assert_eq!(out.len(), 100);

    // Second client asks for a Get with no filename; it must not inherit first.txt
    let data_listener = TcpListener::bind("127.0.0.1:0")?;
    let data_port = data_listener.local_addr()?.port();
    let mut control = TcpStream::connect(addr)?;
    control.write_all(format!("{} -g", data_port).as_bytes())?;
    let (mut data_conn, _) = data_listener.accept()?;
    let mut payload = Vec::new();
    data_conn.read_to_end(&mut payload)?;
    assert!(payload.is_empty());
    let mut reply = Vec::new();
    control.read_to_end(&mut reply)?;
    assert_eq!(reply, b"0ERROR File not found");

    let reports = server.join().unwrap();
    let second = reports[1].command.as_ref().unwrap();
    assert_eq!(second.filename, "");
    assert!(matches!(
        reports[1].outcome,
        SessionOutcome::Failed(SessionError::FileNotFound(ref n)) if n.is_empty()
    ));
    Ok(())
}

#[test]
fn transfer_log_records_each_session() -> Result<()> {
    let root = tempfile::tempdir()?;
    let logs = tempfile::tempdir()?;
    write_file(&root.path().join("x.bin"), 2048)?;
    let log_path = logs.path().join("audit.jsonl");
    let (addr, server) = spawn_server(root.path(), 3, Some(TransferLog::new(&log_path)))?;

    let mut out = Vec::new();
    request_file(&ClientRequest::get("127.0.0.1", addr.port(), "x.bin", 0), &mut out)?;
    assert!(request_file(&ClientRequest::get("127.0.0.1", addr.port(), "y.bin", 0), &mut out).is_err());
    let mut control = TcpStream::connect(addr)?;
    control.write_all(b"1234 --bogus")?;
    let mut reply = Vec::new();
    control.read_to_end(&mut reply)?;
    server.join().unwrap();

    let entries = TransferLog::new(&log_path).read_log()?;
    let statuses: Vec<TransferStatus> = entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![TransferStatus::Completed, TransferStatus::NotFound, TransferStatus::Rejected]
    );
    assert_eq!(entries[0].bytes_sent, 2048);
    assert_eq!(entries[0].filename.as_deref(), Some("x.bin"));
    Ok(())
}

#[test]
fn get_of_a_directory_entry_is_reported_on_control() -> Result<()> {
    let root = tempfile::tempdir()?;
    std::fs::create_dir(root.path().join("subdir"))?;
    let (addr, server) = spawn_server(root.path(), 1, None)?;

    let mut out = Vec::new();
    let err = request_file(&ClientRequest::get("127.0.0.1", addr.port(), "subdir", 0), &mut out)
        .unwrap_err();
    let reply = err.downcast_ref::<ServerReply>().expect("server reply");
    assert_eq!(reply.0, "ERROR File could not be read");
    assert!(out.is_empty());

    let reports = server.join().unwrap();
    assert!(matches!(
        reports[0].outcome,
        SessionOutcome::Failed(SessionError::Unreadable { ref name, .. }) if name == "subdir"
    ));
    Ok(())
}

#[test]
fn listed_but_missing_file_is_unreadable() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("real.txt"), 10)?;
    let lister = FixedLister {
        root: root.path().to_path_buf(),
        names: vec!["real.txt".into(), "ghost.txt".into()],
    };
    let server = Server::new(bind_listener("127.0.0.1", 0)?, root.path())
        .with_timeouts(timeouts())
        .with_lister(lister);
    let addr = server.local_addr()?;
    let handle = serve_sessions(server, 2);

    let names = request_listing(&ClientRequest::list("127.0.0.1", addr.port(), 0))?;
    assert_eq!(names, vec!["real.txt".to_string(), "ghost.txt".to_string()]);

    let mut out = Vec::new();
    let err = request_file(&ClientRequest::get("127.0.0.1", addr.port(), "ghost.txt", 0), &mut out)
        .unwrap_err();
    assert_eq!(err.downcast_ref::<ServerReply>().map(|r| r.0.as_str()), Some("ERROR File could not be read"));

    let reports = handle.join().unwrap();
    assert!(matches!(reports[1].outcome, SessionOutcome::Failed(SessionError::Unreadable { .. })));
    Ok(())
}

#[test]
fn resolver_names_the_client_and_a_failed_dial_is_survived() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_file(&root.path().join("kept.txt"), 16)?;
    let server = Server::new(bind_listener("127.0.0.1", 0)?, root.path())
        .with_timeouts(timeouts())
        .with_resolver(FirstDialFails {
            dials: AtomicUsize::new(0),
        });
    let addr = server.local_addr()?;
    let handle = serve_sessions(server, 2);

    // The server acknowledges, cannot reach the data host and hangs up; the
    // client notices the closed control connection instead of waiting it out
    let started = Instant::now();
    let err = request_listing(&ClientRequest::list("127.0.0.1", addr.port(), 0)).unwrap_err();
    assert!(err.downcast_ref::<ServerReply>().is_none(), "{err:#}");
    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());

    let names = request_listing(&ClientRequest::list("127.0.0.1", addr.port(), 0))?;
    assert_eq!(names, vec!["kept.txt".to_string()]);

    let reports = handle.join().unwrap();
    assert_eq!(reports[0].host, "client.test");
    assert!(!reports[0].data_channel_opened);
    assert!(matches!(reports[0].outcome, SessionOutcome::Failed(SessionError::Resolve { .. })));
    assert!(matches!(reports[1].outcome, SessionOutcome::Listed { .. }));
    Ok(())
}
