//! Hook for Houdini's batch Python interpreter (`hython`).

use std::path::{Path, PathBuf};

use super::{DccHook, SoftwareHints};

pub struct HythonHook {
    version: String,
    custom_root: Option<PathBuf>,
}

impl HythonHook {
    pub fn new(version: impl Into<String>, custom_root: Option<PathBuf>) -> Self {
        Self {
            version: version.into(),
            custom_root,
        }
    }
}

impl DccHook for HythonHook {
    fn app_name(&self) -> &str {
        "hython"
    }

    fn hints(&self) -> SoftwareHints {
        let v = &self.version;
        SoftwareHints {
            windows: vec![PathBuf::from(format!(
                "C:/Program Files/Side Effects Software/Houdini {v}"
            ))],
            darwin: vec![PathBuf::from(format!(
                "/Applications/Houdini/Houdini {v}/Frameworks/Houdini.framework/Resources"
            ))],
            linux: vec![PathBuf::from(format!("/opt/hfs{v}"))],
        }
    }

    fn custom_root(&self) -> Option<&Path> {
        self.custom_root.as_deref()
    }

    fn initialize(&self) -> anyhow::Result<()> {
        tracing::info!("initializing Houdini {} environment", self.version);
        Ok(())
    }

    fn uninitialize(&self) -> anyhow::Result<()> {
        tracing::info!("uninitializing Houdini {} environment", self.version);
        Ok(())
    }
}
