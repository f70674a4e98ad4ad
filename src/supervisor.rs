//! Process supervisor — launches the DCC in batch mode and relays interrupts.
//!
//! Resolves the executable through the capability hook, hands the child a
//! config snapshot via the bootstrap argument vector, and blocks until the
//! child exits. On Ctrl-C the supervisor relays a platform-appropriate
//! interrupt to the child so the listener's stop path runs; if the relay
//! fails, the child is terminated unconditionally. One child per supervisor
//! run — no pooling, no restart-on-crash.

use std::path::PathBuf;
use std::process::ExitStatus;

use tokio::process::{Child, Command};

use crate::bootstrap;
use crate::config::{EndpointConfig, SnapshotError};
use crate::hooks::{self, DiscoveryError};

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("failed to resolve own executable: {0}")]
    SelfPath(std::io::Error),

    #[error("failed to spawn '{path}': {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to wait for child process: {0}")]
    Wait(std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum SignalRelayError {
    #[error("child process already exited")]
    AlreadyExited,

    #[error("failed to deliver interrupt to pid {pid}: {reason}")]
    Deliver { pid: u32, reason: String },
}

pub struct Supervisor {
    config: EndpointConfig,
}

impl Supervisor {
    pub fn new(config: EndpointConfig) -> Self {
        Self { config }
    }

    /// Resolve, spawn, and wait for one DCC child process hosting the command
    /// listener. Returns the child's exit status.
    pub async fn launch(&self) -> Result<ExitStatus, SupervisorError> {
        let hook = hooks::create_hook(&self.config);
        let app_path = hook.locate_executable()?;
        let snapshot = self.config.encode_snapshot()?;

        tracing::info!(
            "launching {} {} from {} (listener on {})",
            self.config.dcc,
            self.config.version,
            app_path.display(),
            self.config.addr(),
        );

        let mut cmd = Command::new(&app_path);
        for arg in bootstrap::bootstrap_args(&snapshot) {
            cmd.arg(arg);
        }
        cmd.env(
            bootstrap::LISTENER_BIN_ENV,
            std::env::current_exe().map_err(SupervisorError::SelfPath)?,
        );
        apply_process_group_flags(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            path: app_path.clone(),
            source,
        })?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(SupervisorError::Wait)?;
                tracing::info!("child exited with {}", status);
                Ok(status)
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping server...");
                if let Err(e) = relay_interrupt(&child) {
                    tracing::warn!("{}, forcing termination", e);
                    if let Err(kill) = child.start_kill() {
                        tracing::warn!("failed to kill child: {}", kill);
                    }
                }
                let status = child.wait().await.map_err(SupervisorError::Wait)?;
                tracing::info!("child exited with {}", status);
                Ok(status)
            }
        }
    }
}

/// Put the child in its own process group on Windows so CTRL_BREAK_EVENT can
/// be targeted at it without hitting the supervisor's own console group.
#[cfg(windows)]
fn apply_process_group_flags(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(windows))]
fn apply_process_group_flags(_cmd: &mut Command) {}

/// Deliver a graceful interrupt to the child: a process-group break on
/// Windows, SIGINT elsewhere.
fn relay_interrupt(child: &Child) -> Result<(), SignalRelayError> {
    let pid = child.id().ok_or(SignalRelayError::AlreadyExited)?;

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| {
            SignalRelayError::Deliver {
                pid,
                reason: e.to_string(),
            }
        })?;
    }

    #[cfg(windows)]
    {
        use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

        if unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) } == 0 {
            return Err(SignalRelayError::Deliver {
                pid,
                reason: "GenerateConsoleCtrlEvent failed".to_string(),
            });
        }
    }

    tracing::info!("relayed interrupt to child pid {}", pid);
    Ok(())
}
