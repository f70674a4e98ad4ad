//! Capability providers ("hooks") — one per supported DCC family.
//!
//! A hook supplies executable discovery plus environment init/teardown for one
//! application family. The mapping from identity to hook is a static registry
//! keyed by [`DccKind`]; nothing is discovered by scanning loaded code.

mod hython;
mod mayapy;

pub use hython::HythonHook;
pub use mayapy::MayapyHook;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;

/// Identity of a supported DCC application family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DccKind {
    /// Maya's batch Python interpreter.
    Mayapy,
    /// Houdini's batch Python interpreter.
    Hython,
}

impl DccKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DccKind::Mayapy => "mayapy",
            DccKind::Hython => "hython",
        }
    }
}

impl fmt::Display for DccKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DccKind {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mayapy" => Ok(DccKind::Mayapy),
            "hython" => Ok(DccKind::Hython),
            other => Err(DiscoveryError::UnknownDcc(other.to_string())),
        }
    }
}

/// Build the hook for `config`'s DCC identity. Static table, resolved locally
/// in whichever process asks — the supervisor and the child both use this.
pub fn create_hook(config: &EndpointConfig) -> Box<dyn DccHook> {
    match config.dcc {
        DccKind::Mayapy => Box::new(MayapyHook::new(&config.version, config.custom_root.clone())),
        DccKind::Hython => Box::new(HythonHook::new(&config.version, config.custom_root.clone())),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("unknown DCC '{0}'")]
    UnknownDcc(String),

    #[error("unable to find the app '{app}' (searched {searched} locations)")]
    NotFound { app: String, searched: usize },
}

/// Per-OS ordered directory hints for locating a DCC install root.
#[derive(Debug, Clone, Default)]
pub struct SoftwareHints {
    pub windows: Vec<PathBuf>,
    pub darwin: Vec<PathBuf>,
    pub linux: Vec<PathBuf>,
}

impl SoftwareHints {
    /// Hints for the OS this process is running on.
    pub fn for_current_os(&self) -> &[PathBuf] {
        #[cfg(target_os = "windows")]
        return &self.windows;
        #[cfg(target_os = "macos")]
        return &self.darwin;
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        return &self.linux;
    }
}

/// Capability set for one DCC family: discovery plus environment lifecycle.
pub trait DccHook: Send {
    /// Executable name without any platform suffix.
    fn app_name(&self) -> &str;

    fn hints(&self) -> SoftwareHints;

    /// User-supplied root searched before the built-in hints.
    fn custom_root(&self) -> Option<&Path> {
        None
    }

    /// Bring up the DCC environment before the listener starts serving.
    fn initialize(&self) -> anyhow::Result<()>;

    /// Tear the environment back down; invoked exactly once on listener stop.
    fn uninitialize(&self) -> anyhow::Result<()>;

    /// Walk the custom root (if any) and then every hint in order, searching
    /// each recursively, and return the first executable found. Fails only
    /// after all locations are exhausted.
    fn locate_executable(&self) -> Result<PathBuf, DiscoveryError> {
        let name = platform_executable_name(self.app_name());
        let mut roots: Vec<PathBuf> = Vec::new();
        if let Some(root) = self.custom_root() {
            roots.push(root.to_path_buf());
        }
        roots.extend(self.hints().for_current_os().iter().cloned());

        for root in &roots {
            if let Some(found) = search_root(root, &name) {
                tracing::info!("found {} at {}", self.app_name(), found.display());
                return Ok(found);
            }
        }

        tracing::error!("unable to find the app {}", self.app_name());
        Err(DiscoveryError::NotFound {
            app: self.app_name().to_string(),
            searched: roots.len(),
        })
    }
}

fn platform_executable_name(app_name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{}.exe", app_name)
    } else {
        app_name.to_string()
    }
}

/// Recursively search one root directory for an executable file named `name`.
fn search_root(root: &Path, name: &str) -> Option<PathBuf> {
    let direct = root.join(name);
    if direct.is_file() {
        return Some(direct);
    }

    let pattern = format!("{}/**/{}", root.display(), name);
    glob::glob(&pattern)
        .ok()?
        .flatten()
        .find(|path| path.is_file())
}
