use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

pub mod app;
pub mod config;
pub mod logging;
pub mod render;

use app::{CommandStatus, ConsoleApp};
use config::CliConfig;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "SentinelStack operations console")]
pub struct SentinelCli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Exchange credentials for a session token and store it
    Login {
        #[arg(long, env = "SENTINEL_USERNAME")]
        username: String,
        #[arg(long, env = "SENTINEL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Drop the stored session token
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Render the view for a path (`/`, `/login`, `/dashboard`)
    Open {
        path: String,
        /// Stop after this many dashboard refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Watch live dashboard metrics
    Dashboard {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
        /// Print each snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = SentinelCli::parse();
    let config = CliConfig::from_env()?;
    logging::init_logging(&config.log_filter, cli.log_json);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let status = runtime.block_on(dispatch(cli.command, config))?;
    Ok(exit_code(status))
}

async fn dispatch(command: Commands, config: CliConfig) -> anyhow::Result<CommandStatus> {
    let json = matches!(command, Commands::Dashboard { json: true, .. });
    let mut app = ConsoleApp::new(config)?.with_json_output(json);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let status = app.execute(command, &mut out).await?;
    out.flush()?;
    Ok(status)
}

fn exit_code(status: CommandStatus) -> ExitCode {
    match status {
        CommandStatus::Ok => ExitCode::SUCCESS,
        CommandStatus::Failed => ExitCode::FAILURE,
        CommandStatus::NeedsLogin => ExitCode::from(2),
    }
}
