//! Hook for Maya's batch Python interpreter (`mayapy`).

use std::path::{Path, PathBuf};

use super::{DccHook, SoftwareHints};

pub struct MayapyHook {
    version: String,
    custom_root: Option<PathBuf>,
}

impl MayapyHook {
    pub fn new(version: impl Into<String>, custom_root: Option<PathBuf>) -> Self {
        Self {
            version: version.into(),
            custom_root,
        }
    }
}

impl DccHook for MayapyHook {
    fn app_name(&self) -> &str {
        "mayapy"
    }

    fn hints(&self) -> SoftwareHints {
        let v = &self.version;
        SoftwareHints {
            windows: vec![PathBuf::from(format!("C:/Program Files/Autodesk/Maya{v}"))],
            darwin: vec![PathBuf::from(format!("/Applications/Autodesk/maya{v}"))],
            linux: vec![
                PathBuf::from(format!("/usr/autodesk/maya{v}")),
                PathBuf::from(format!("/opt/autodesk/maya{v}")),
                PathBuf::from(format!("/opt/maya{v}")),
            ],
        }
    }

    fn custom_root(&self) -> Option<&Path> {
        self.custom_root.as_deref()
    }

    fn initialize(&self) -> anyhow::Result<()> {
        // maya.standalone bring-up is owned by the embedded runtime once the
        // batch interpreter is up; nothing to prepare on this side.
        tracing::info!("initializing Maya {} standalone environment", self.version);
        Ok(())
    }

    fn uninitialize(&self) -> anyhow::Result<()> {
        tracing::info!("uninitializing Maya {} standalone environment", self.version);
        Ok(())
    }
}
