//! End-to-end tests for the command listener over a real TCP socket, driving
//! it the way an external controller would: one connection per request.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use dcc_hotload::config::EndpointConfig;
use dcc_hotload::hooks::{DccHook, DccKind, SoftwareHints};
use dcc_hotload::listener::{CommandListener, ListenerError};

struct MockHook {
    initialized: Arc<AtomicUsize>,
    uninitialized: Arc<AtomicUsize>,
}

impl DccHook for MockHook {
    fn app_name(&self) -> &str {
        "testapp"
    }

    fn hints(&self) -> SoftwareHints {
        SoftwareHints::default()
    }

    fn initialize(&self) -> anyhow::Result<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn uninitialize(&self) -> anyhow::Result<()> {
        self.uninitialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RunningListener {
    port: u16,
    initialized: Arc<AtomicUsize>,
    uninitialized: Arc<AtomicUsize>,
    handle: JoinHandle<Result<(), ListenerError>>,
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn start_listener() -> RunningListener {
    let port = free_port();
    let mut config = EndpointConfig::new(DccKind::Mayapy, "2024");
    config.port = port;

    let initialized = Arc::new(AtomicUsize::new(0));
    let uninitialized = Arc::new(AtomicUsize::new(0));
    let hook = MockHook {
        initialized: initialized.clone(),
        uninitialized: uninitialized.clone(),
    };

    let handle = thread::spawn(move || CommandListener::new(config, Box::new(hook)).serve());

    RunningListener {
        port,
        initialized,
        uninitialized,
        handle,
    }
}

/// Connect once the listener is up. Retrying here instead of probing with a
/// throwaway connection matters: a connection closed without data counts as
/// an empty read and stops the serve loop.
fn connect_when_ready(port: u16) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => return stream,
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("listener never came up on port {port}: {e}"),
        }
    }
}

/// One full request/response exchange on a fresh connection.
fn send(port: u16, payload: &str) -> String {
    let mut stream = connect_when_ready(port);
    stream.write_all(payload.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn shutdown_command_stops_listener() {
    let server = start_listener();

    let response = send(server.port, "__SHUTDOWN__");
    assert_eq!(response, "Script executed (no output).");

    server.handle.join().unwrap().unwrap();
    assert_eq!(server.initialized.load(Ordering::SeqCst), 1);
    assert_eq!(server.uninitialized.load(Ordering::SeqCst), 1);

    // The socket is closed; nobody is listening anymore.
    assert!(TcpStream::connect(("127.0.0.1", server.port)).is_err());
}

#[test]
fn print_command_returns_exact_output_section() {
    let server = start_listener();

    let response = send(server.port, "print(\"x\")");
    assert_eq!(response, "OUTPUT: \nx\n");

    // The listener keeps serving after a normal command.
    let response = send(server.port, "print(\"y\")");
    assert_eq!(response, "OUTPUT: \ny\n");

    send(server.port, "__SHUTDOWN__");
    server.handle.join().unwrap().unwrap();
}

#[test]
fn stderr_output_lands_in_errors_section() {
    let server = start_listener();

    let response = send(server.port, "eprint(\"warned\")");
    assert_eq!(response, "ERRORS: \nwarned\n");

    send(server.port, "__SHUTDOWN__");
    server.handle.join().unwrap().unwrap();
}

#[test]
fn execution_error_is_reported_and_listener_survives() {
    let server = start_listener();

    let response = send(server.port, "raise(\"boom\")");
    assert!(
        response.starts_with("EXECUTION ERROR: boom"),
        "unexpected response: {response}"
    );

    // A bad request never takes the server down.
    let response = send(server.port, "print(\"still here\")");
    assert_eq!(response, "OUTPUT: \nstill here\n");

    send(server.port, "__SHUTDOWN__");
    server.handle.join().unwrap().unwrap();
}

#[test]
fn execution_context_persists_across_connections() {
    let server = start_listener();

    let response = send(server.port, "greeting = \"hi\"");
    assert_eq!(response, "Script executed (no output).");

    let response = send(server.port, "print(greeting)");
    assert_eq!(response, "OUTPUT: \nhi\n");

    send(server.port, "__SHUTDOWN__");
    server.handle.join().unwrap().unwrap();
}

#[test]
fn shutdown_sentinel_embedded_in_command_still_executes_it() {
    let server = start_listener();

    let response = send(server.port, "print(\"bye\")\n__SHUTDOWN__");
    assert_eq!(response, "OUTPUT: \nbye\n");

    server.handle.join().unwrap().unwrap();
    assert!(TcpStream::connect(("127.0.0.1", server.port)).is_err());
}

#[test]
fn empty_payload_terminates_loop_and_tears_down_once() {
    let server = start_listener();

    // Peer closes without sending any data.
    let stream = connect_when_ready(server.port);
    drop(stream);

    server.handle.join().unwrap().unwrap();
    assert_eq!(server.uninitialized.load(Ordering::SeqCst), 1);
}
