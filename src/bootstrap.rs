//! Child-side bootstrap: the bridge between the supervisor's launch and the
//! listener's serve loop.
//!
//! The supervisor passes the DCC executable a short inline program plus the
//! config snapshot as an argument. The DCC's embedded interpreter runs the
//! program, which hands control to this binary's hidden `serve` entry with
//! the snapshot untouched. [`serve`] then reconstructs the listener through
//! the local hook registry — only configuration data ever crosses the process
//! boundary.

use crate::config::EndpointConfig;
use crate::hooks;
use crate::listener::CommandListener;

/// Environment variable through which the supervisor tells the bootstrap
/// program where this binary lives.
pub const LISTENER_BIN_ENV: &str = "DCC_HOTLOAD_BIN";

/// Inline program executed by the DCC's batch interpreter. It replaces the
/// interpreter process with the listener runtime, forwarding the snapshot
/// argument and inheriting the environment the DCC wrapper set up.
pub const BOOTSTRAP_PROGRAM: &str = "\
import os, sys
exe = os.environ['DCC_HOTLOAD_BIN']
os.execv(exe, [exe, 'serve', '--snapshot', sys.argv[1]])
";

/// Argument vector appended to the resolved DCC executable at launch.
pub fn bootstrap_args(snapshot: &str) -> [String; 3] {
    [
        "-c".to_string(),
        BOOTSTRAP_PROGRAM.to_string(),
        snapshot.to_string(),
    ]
}

/// Child-side entry: decode the snapshot, look the identity up in the local
/// registry, and run the listener's serve loop to completion.
pub fn serve(snapshot: &str) -> anyhow::Result<()> {
    let config = EndpointConfig::decode_snapshot(snapshot)?;
    tracing::info!(
        "bootstrapping {} {} listener on {}",
        config.dcc,
        config.version,
        config.addr(),
    );
    let hook = hooks::create_hook(&config);
    CommandListener::new(config, hook).serve()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::DccKind;

    #[test]
    fn test_bootstrap_args_shape() {
        let snapshot = EndpointConfig::new(DccKind::Hython, "20.5.445")
            .encode_snapshot()
            .unwrap();
        let args = bootstrap_args(&snapshot);
        assert_eq!(args[0], "-c");
        assert_eq!(args[1], BOOTSTRAP_PROGRAM);
        assert_eq!(args[2], snapshot);
    }

    #[test]
    fn test_bootstrap_program_forwards_snapshot_argument() {
        // The inline program must reference the binary env var and forward
        // the snapshot it was handed as argv[1].
        assert!(BOOTSTRAP_PROGRAM.contains(LISTENER_BIN_ENV));
        assert!(BOOTSTRAP_PROGRAM.contains("sys.argv[1]"));
    }

    #[test]
    fn test_serve_rejects_malformed_snapshot() {
        assert!(serve("definitely-not-a-snapshot").is_err());
    }
}
