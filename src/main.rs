/*!
 * uplink-warden CLI
 */

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use uplink_warden::{
    config::{self, SettingsFile},
    error::{WardenError, EXIT_DOWN, EXIT_FATAL, EXIT_SUCCESS},
    logging, Watchdog,
};
use warden_sentinel::{ConnectivityProbe, PingProbe, PolicyHandle, PolicySource};

#[derive(Parser)]
#[command(name = "uplink-warden")]
#[command(version, about = "Power-cycle the modem when the internet stays down", long_about = None)]
struct Cli {
    /// Settings file (defaults to $UPLINK_WARDEN_CONFIG, then ./uplink-warden.toml)
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Directory for the rotating log file
    #[arg(long = "log-dir", value_name = "DIR", default_value = "logs", global = true)]
    log_dir: PathBuf,

    /// Verbose output (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the connectivity monitor until Ctrl-C (SIGHUP reloads settings)
    Run,

    /// Probe connectivity once; exit code 0 when up, 1 when down
    Probe,

    /// Run one manual reboot sequence in the foreground
    Reboot,

    /// Print the effective settings with secrets masked
    ShowConfig,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            e.downcast_ref::<WardenError>()
                .map(WardenError::exit_code)
                .unwrap_or(EXIT_FATAL)
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    let logs = logging::init_logging(Some(&cli.log_dir), cli.verbose)?;
    let settings_path = config::resolve_path(cli.config.as_deref());

    match cli.command {
        Commands::Run => {
            let watchdog = Watchdog::from_settings(&settings_path, logs)
                .with_context(|| format!("loading {}", settings_path.display()))?;
            serve(watchdog).await?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Probe => {
            let policy = load_policy(&settings_path)?;
            let up = PingProbe::new(policy).check().await;
            println!("{}", if up { "up" } else { "down" });
            Ok(if up { EXIT_SUCCESS } else { EXIT_DOWN })
        }
        Commands::Reboot => {
            let watchdog = Watchdog::from_settings(&settings_path, logs)
                .with_context(|| format!("loading {}", settings_path.display()))?;
            let handle = watchdog
                .trigger_manual_reboot()
                .into_handle()
                .context("reboot request was not accepted")?;
            let report = handle
                .wait()
                .await
                .context("reboot sequence ended without a report")?;
            println!("{}", report.summary());
            Ok(if report.outcome.is_success() {
                EXIT_SUCCESS
            } else {
                EXIT_DOWN
            })
        }
        Commands::ShowConfig => {
            let policy = SettingsFile::new(&settings_path).read()?;
            print!("{}", config::render(&policy)?);
            Ok(EXIT_SUCCESS)
        }
    }
}

fn load_policy(path: &std::path::Path) -> anyhow::Result<PolicyHandle> {
    let source = SettingsFile::new(path);
    let policy = source.load().map_err(WardenError::from)?;
    Ok(PolicyHandle::fixed(policy))
}

/// Monitor until Ctrl-C, reloading settings on SIGHUP
async fn serve(watchdog: Watchdog) -> anyhow::Result<()> {
    info!("{}", watchdog.status().await.summary());
    let monitor = watchdog.spawn_monitor();

    #[cfg(unix)]
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .context("installing SIGHUP handler")?;

    loop {
        #[cfg(unix)]
        let reload = hangup.recv();
        #[cfg(not(unix))]
        let reload = std::future::pending::<Option<()>>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                info!("Shutting down connectivity monitor.");
                break;
            }
            _ = reload => {
                info!("SIGHUP received, reloading configuration.");
                if let Err(e) = watchdog.reload() {
                    warn!("Keeping previous configuration: {}", e);
                }
            }
        }
    }

    monitor.abort();
    Ok(())
}
