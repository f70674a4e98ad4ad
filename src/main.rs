use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dcc_hotload::bootstrap;
use dcc_hotload::config::{EndpointConfig, DEFAULT_HOST, DEFAULT_PORT};
use dcc_hotload::hooks::DccKind;
use dcc_hotload::supervisor::Supervisor;

#[derive(Parser)]
#[command(name = "dcc-hotload", version)]
#[command(about = "TCP server to run a DCC in batch mode.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch a DCC in batch mode hosting the hotload command listener.
    Launch {
        /// The DCC to launch.
        #[arg(long, value_enum)]
        dcc: DccKind,

        /// The DCC version string. E.g. for Maya2024 -> 2024.
        #[arg(long, short = 'v')]
        version: String,

        /// DCC custom root path, searched before the built-in hints.
        #[arg(long = "custom-path")]
        custom_path: Option<PathBuf>,

        /// Host address the listener binds inside the DCC process.
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Port the listener binds inside the DCC process.
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Child-side re-entry used by the launch bootstrap. Not for direct use.
    #[command(hide = true)]
    Serve {
        /// Encoded config snapshot produced by the supervisor.
        #[arg(long)]
        snapshot: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::Launch {
            dcc,
            version,
            custom_path,
            host,
            port,
        } => {
            let mut config = EndpointConfig::new(dcc, version);
            config.host = host;
            config.port = port;
            config.custom_root = custom_path;

            let runtime = tokio::runtime::Runtime::new()?;
            let status = runtime.block_on(Supervisor::new(config).launch())?;
            if !status.success() {
                std::process::exit(status.code().unwrap_or(1));
            }
        }
        Command::Serve { snapshot } => bootstrap::serve(&snapshot)?,
    }

    Ok(())
}
