/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Issuer session operations with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, subcommands, or shutdown handling
*/

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use issuer_session_cli::config::default_config_path;
use issuer_session_cli::{commands, AppContext, CliConfig, TerminalConfirmation, TerminalPopupHost};

#[derive(Parser, Debug)]
#[command(name = "issuer-session-cli", version, about = "Issuer wallet session and account linking")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", global = true)]
    config_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,
    /// Validate the configuration and exit
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default configuration file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Sign in with the local wallet key
    Login,
    /// Show the stored session and issuer profile
    Status,
    /// Rotate the token pair now
    Refresh,
    /// Forget the stored session
    Logout,
    /// Keep the session refreshed until interrupted
    KeepAlive,
    /// List linked accounts
    Links {
        #[arg(long)]
        json: bool,
    },
    /// Show the issuer score history
    History,
    /// Link a social account through the browser
    Link { provider: String },
    /// Disconnect a linked social account
    Unlink {
        provider: String,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(&args.log_level)?;

    let mut out = std::io::stdout();

    if let Command::Init { force } = args.command {
        let path = args
            .config_path
            .or_else(default_config_path)
            .context("could not determine config directory")?;
        return commands::init(&path, force, &mut out);
    }

    let config = CliConfig::load(args.config_path.as_deref()).context("load config")?;
    info!(api = %config.api_base_url, "configuration loaded");

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let ctx = AppContext::new(config)?;
    let shutdown = CancellationToken::new();

    match args.command {
        Command::Init { .. } => Ok(()),
        Command::Login => commands::login(&ctx, &mut out).await,
        Command::Status => commands::status(&ctx, &mut out).await,
        Command::Refresh => commands::refresh(&ctx, &mut out).await,
        Command::Logout => commands::logout(&ctx, &mut out),
        Command::KeepAlive => {
            setup_signal_handlers(shutdown.clone());
            commands::keep_alive(&ctx, shutdown, &mut out).await
        }
        Command::Links { json } => commands::links(&ctx, json, &mut out).await,
        Command::History => commands::history(&ctx, &mut out).await,
        Command::Link { provider } => {
            setup_signal_handlers(shutdown.clone());
            let host = Arc::new(TerminalPopupHost::new(true));
            commands::link(&ctx, &provider, host, shutdown, &mut out).await
        }
        Command::Unlink { provider, yes } => {
            let confirmation = TerminalConfirmation { assume_yes: yes };
            commands::unlink(&ctx, &provider, &confirmation, &mut out).await
        }
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(())
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
