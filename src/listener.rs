//! Command listener — the TCP serve loop embedded in the DCC process.
//!
//! Single-threaded, blocking, one connection at a time. Each accepted
//! connection is strictly one-shot: one fixed-size read, one response, close.
//! Payloads may carry the `__SHUTDOWN__` sentinel anywhere; the sentinel is
//! stripped, the remaining text is still executed and answered, and the loop
//! exits afterwards. The environment teardown path runs exactly once on every
//! exit route: shutdown directive, empty read, or external interrupt.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::EndpointConfig;
use crate::exec::{self, CapturedOutput, ExecutionContext};
use crate::hooks::DccHook;

/// Token that requests graceful listener termination when found anywhere in a
/// request payload.
pub const SHUTDOWN_SENTINEL: &str = "__SHUTDOWN__";

/// One fixed-size read per request; longer payloads are truncated. Protocol
/// limitation carried over from the wire format, not a buffer to grow.
const READ_BUFFER_SIZE: usize = 4096;

/// OS-level queue for connection attempts while a request is in flight.
const ACCEPT_BACKLOG: i32 = 5;

#[derive(thiserror::Error, Debug)]
pub enum ListenerError {
    #[error("invalid listen address '{addr}': {source}")]
    Address {
        addr: String,
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("environment initialization failed: {0}")]
    Initialize(#[source] anyhow::Error),

    #[error("socket error while serving: {0}")]
    Socket(#[from] std::io::Error),
}

/// Serves submitted command text against one persistent [`ExecutionContext`].
pub struct CommandListener {
    config: EndpointConfig,
    hook: Box<dyn DccHook>,
    context: ExecutionContext,
}

impl CommandListener {
    pub fn new(config: EndpointConfig, hook: Box<dyn DccHook>) -> Self {
        Self {
            config,
            hook,
            context: ExecutionContext::new(),
        }
    }

    /// Bind, initialize the environment, and serve until shutdown. Bind or
    /// initialize failures are fatal and return before any client is served;
    /// once serving has started, teardown runs on every exit path.
    pub fn serve(mut self) -> Result<(), ListenerError> {
        let listener = self.bind()?;
        self.hook.initialize().map_err(ListenerError::Initialize)?;
        install_interrupt_handler();
        tracing::info!("server listening on {}", self.config.addr());

        let outcome = self.serve_loop(&listener);
        self.stop(listener);
        outcome
    }

    fn bind(&self) -> Result<TcpListener, ListenerError> {
        let addr: SocketAddr = self.config.addr().parse().map_err(|source| {
            ListenerError::Address {
                addr: self.config.addr(),
                source,
            }
        })?;

        let bind = || -> std::io::Result<TcpListener> {
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
            socket.set_reuse_address(true)?;
            socket.bind(&addr.into())?;
            socket.listen(ACCEPT_BACKLOG)?;
            Ok(socket.into())
        };
        bind().map_err(|source| ListenerError::Bind {
            addr: self.config.addr(),
            source,
        })
    }

    fn serve_loop(&mut self, listener: &TcpListener) -> Result<(), ListenerError> {
        loop {
            if interrupted() {
                tracing::info!("interrupt received, stopping server");
                return Ok(());
            }

            let (mut conn, peer) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    tracing::info!("interrupt received, stopping server");
                    return Ok(());
                }
                Err(e) => return Err(ListenerError::Socket(e)),
            };
            tracing::info!("connection from {}", peer);

            let mut buf = [0u8; READ_BUFFER_SIZE];
            let read = match conn.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    tracing::info!("interrupt received, stopping server");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("failed to read from {}: {}", peer, e);
                    continue;
                }
            };
            if read == 0 {
                // Peer closed before sending anything; normal termination.
                tracing::info!("peer closed without sending data, stopping server");
                return Ok(());
            }

            let payload = String::from_utf8_lossy(&buf[..read]);
            let (script, shutdown) = strip_sentinel(&payload);
            if shutdown {
                tracing::info!(
                    "shutdown command received, stopping after the current request"
                );
            }

            let response = match exec::execute(&mut self.context, &script) {
                Ok(captured) => format_response(&captured),
                Err(failure) => format!("EXECUTION ERROR: {}", failure),
            };

            tracing::debug!("sending response ({} bytes)", response.len());
            if let Err(e) = conn.write_all(response.as_bytes()) {
                tracing::warn!("failed to send response to {}: {}", peer, e);
            }
            drop(conn);

            if shutdown {
                tracing::info!("shutting down server as requested");
                return Ok(());
            }
        }
    }

    /// Close the listening socket and tear down the environment. Runs exactly
    /// once; `serve` is the only caller and consumes `self` afterwards.
    fn stop(&mut self, listener: TcpListener) {
        tracing::info!("closing server socket");
        drop(listener);
        if let Err(e) = self.hook.uninitialize() {
            tracing::warn!("environment teardown failed: {:#}", e);
        }
    }
}

/// Detect and remove the shutdown sentinel. All occurrences are stripped and
/// the remaining text is trimmed; without the sentinel the payload passes
/// through untouched.
fn strip_sentinel(payload: &str) -> (String, bool) {
    if payload.contains(SHUTDOWN_SENTINEL) {
        let stripped = payload.replace(SHUTDOWN_SENTINEL, "").trim().to_string();
        (stripped, true)
    } else {
        (payload.to_string(), false)
    }
}

/// Assemble the response text from captured output.
fn format_response(captured: &CapturedOutput) -> String {
    if captured.is_empty() {
        return "Script executed (no output).".to_string();
    }
    let mut response = String::new();
    if !captured.stdout.is_empty() {
        response.push_str("OUTPUT: \n");
        response.push_str(&captured.stdout);
    }
    if !captured.stderr.is_empty() {
        response.push_str("ERRORS: \n");
        response.push_str(&captured.stderr);
    }
    response
}

// ─── Interrupt handling ──────────────────────────────────────

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Record SIGINT in a flag instead of letting the default handler kill the
/// process, so the serve loop can run its stop path. The blocking accept is
/// interrupted (EINTR) because SA_RESTART is not set.
#[cfg(unix)]
fn install_interrupt_handler() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

    extern "C" fn on_sigint(_: nix::libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    if let Err(e) = unsafe { sigaction(Signal::SIGINT, &action) } {
        tracing::warn!("failed to install SIGINT handler: {}", e);
    }
}

/// Record console Ctrl+C / Ctrl+Break in a flag; the supervisor delivers
/// CTRL_BREAK_EVENT to this process group on shutdown.
#[cfg(windows)]
fn install_interrupt_handler() {
    use winapi::um::consoleapi::SetConsoleCtrlHandler;

    unsafe extern "system" fn on_ctrl(_: u32) -> i32 {
        INTERRUPTED.store(true, Ordering::SeqCst);
        1
    }

    if unsafe { SetConsoleCtrlHandler(Some(on_ctrl), 1) } == 0 {
        tracing::warn!("failed to install console ctrl handler");
    }
}
