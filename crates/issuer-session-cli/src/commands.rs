/*
[INPUT]:  AppContext, parsed subcommand arguments, output writer
[OUTPUT]: Session, profile and link operations rendered for the terminal
[POS]:    Command layer - one function per subcommand
[UPDATE]: When adding subcommands or changing their output
*/

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use console::style;
use issuer_session_adapter::link::{ChannelMessageSource, Confirmation};
use issuer_session_adapter::{
    LinkOutcome, LinkingOrchestrator, LoginOutcome, SessionError, SocialLink, UnlinkOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CliConfig;
use crate::context::AppContext;
use crate::terminal::TerminalPopupHost;

/// Write a default configuration file
pub fn init(path: &Path, force: bool, out: &mut dyn Write) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    std::fs::write(path, CliConfig::default().to_yaml()?)
        .with_context(|| format!("write {}", path.display()))?;
    writeln!(out, "Wrote {}", path.display())?;
    Ok(())
}

/// Challenge-response login with the local key
pub async fn login(ctx: &AppContext, out: &mut dyn Write) -> Result<()> {
    let (wallet, coordinator) = ctx.coordinator()?;
    writeln!(out, "Signing in as {}", style(wallet.address()).bold())?;

    match coordinator.connect().await {
        Ok(LoginOutcome::Authenticated(session)) => {
            writeln!(out, "{}", style("Logged in").green().bold())?;
            if let Some(expires_at) = session.expires_at {
                writeln!(out, "Access token expires {}", describe_expiry(expires_at))?;
            }
            Ok(())
        }
        Ok(LoginOutcome::InProgress) => {
            writeln!(out, "A login for this wallet is already in progress")?;
            Ok(())
        }
        Err(err) => Err(anyhow!(err.user_message()).context("login failed")),
    }
}

/// Show the stored session and the issuer profile
pub async fn status(ctx: &AppContext, out: &mut dyn Write) -> Result<()> {
    let Some(session) = ctx.session().session() else {
        writeln!(out, "Not logged in")?;
        return Ok(());
    };

    match session.expires_at {
        Some(expires_at) => writeln!(out, "Access token expires {}", describe_expiry(expires_at))?,
        None => writeln!(out, "Access token has no readable expiry")?,
    }

    match ctx.client.me().await {
        Ok(profile) => {
            if let Some(address) = profile.wallet_address.as_deref() {
                writeln!(out, "Wallet:  {address}")?;
            }
            if let Some(name) = profile.display_name.as_deref() {
                writeln!(out, "Name:    {name}")?;
            }
            if let Some(score) = profile.score {
                writeln!(out, "Score:   {score}")?;
            }
            Ok(())
        }
        Err(SessionError::SessionExpired | SessionError::Unauthorized) => {
            writeln!(out, "{}", style("Session expired, please log in again").yellow())?;
            Ok(())
        }
        Err(err) => Err(anyhow!(err).context("fetch issuer profile")),
    }
}

/// Rotate the token pair now
pub async fn refresh(ctx: &AppContext, out: &mut dyn Write) -> Result<()> {
    match ctx.client.refresh_session().await {
        Ok(_) => {
            writeln!(out, "{}", style("Session refreshed").green())?;
            if let Some(expires_at) = ctx.session().session().and_then(|s| s.expires_at) {
                writeln!(out, "Access token expires {}", describe_expiry(expires_at))?;
            }
            Ok(())
        }
        Err(SessionError::Unauthorized) => Err(anyhow!("Not logged in")),
        Err(err) => Err(anyhow!(err.user_message()).context("refresh failed")),
    }
}

/// Forget both tokens
pub fn logout(ctx: &AppContext, out: &mut dyn Write) -> Result<()> {
    let had_session = ctx.session().refresh_token().is_some();
    ctx.session().clear().context("clear session")?;
    if had_session {
        writeln!(out, "Logged out")?;
    } else {
        writeln!(out, "Not logged in")?;
    }
    Ok(())
}

/// Print linked identities, as a table or JSON
pub async fn links(ctx: &AppContext, json: bool, out: &mut dyn Write) -> Result<()> {
    let links = ctx
        .client
        .social_links()
        .await
        .map_err(|err| anyhow!(err.user_message()))
        .context("fetch linked accounts")?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&links)?)?;
        return Ok(());
    }
    if links.is_empty() {
        writeln!(out, "No linked accounts")?;
        return Ok(());
    }
    for link in &links {
        writeln!(out, "{}", render_link(link))?;
    }
    Ok(())
}

/// Score history, oldest first
pub async fn history(ctx: &AppContext, out: &mut dyn Write) -> Result<()> {
    let history = ctx
        .client
        .score_history()
        .await
        .map_err(|err| anyhow!(err.user_message()))
        .context("fetch score history")?;
    if history.is_empty() {
        writeln!(out, "No score history")?;
    }
    for point in &history {
        let score = point.score.to_string();
        match point.reason.as_deref() {
            Some(reason) => writeln!(out, "{}  {score:>8}  {reason}", point.recorded_at)?,
            None => writeln!(out, "{}  {score:>8}", point.recorded_at)?,
        }
    }
    Ok(())
}

/// Link `provider` through the browser.
///
/// The backend is polled until it lists the provider; pressing Enter makes
/// the orchestrator reconcile immediately. `shutdown` abandons the attempt.
pub async fn link(
    ctx: &AppContext,
    provider: &str,
    host: Arc<TerminalPopupHost>,
    shutdown: CancellationToken,
    out: &mut dyn Write,
) -> Result<()> {
    let orchestrator = Arc::new(orchestrator(ctx, host));
    if let Err(err) = orchestrator.refresh_links().await {
        warn!(error = %err, "could not load current links");
    }

    let watcher = {
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            orchestrator.shutdown();
        })
    };

    let outcome = orchestrator.start_link(provider).await;
    watcher.abort();

    match outcome {
        Ok(LinkOutcome::Linked(link)) => {
            info!(provider, "link completed");
            writeln!(out, "{} {}", style("Linked").green().bold(), render_link(&link))?;
            Ok(())
        }
        Ok(LinkOutcome::AlreadyLinked { notice }) => {
            writeln!(out, "{notice}")?;
            Ok(())
        }
        Ok(LinkOutcome::Cancelled | LinkOutcome::Superseded) => {
            writeln!(out, "{}", style("Linking cancelled").yellow())?;
            Ok(())
        }
        Err(err) => Err(anyhow!(err.user_message()).context(format!("link {provider}"))),
    }
}

/// Disconnect `provider` after confirmation
pub async fn unlink(
    ctx: &AppContext,
    provider: &str,
    confirmation: &dyn Confirmation,
    out: &mut dyn Write,
) -> Result<()> {
    let orchestrator = orchestrator(ctx, Arc::new(TerminalPopupHost::new(false)));
    match orchestrator.unlink(provider, confirmation).await {
        Ok(UnlinkOutcome::Unlinked) => writeln!(out, "Unlinked {provider}")?,
        Ok(UnlinkOutcome::Declined) => writeln!(out, "Kept {provider}")?,
        Err(err) => return Err(anyhow!(err.user_message()).context(format!("unlink {provider}"))),
    }
    Ok(())
}

/// Keep the session fresh until `shutdown` fires or the session ends
pub async fn keep_alive(ctx: &AppContext, shutdown: CancellationToken, out: &mut dyn Write) -> Result<()> {
    if ctx.session().refresh_token().is_none() {
        return Err(anyhow!("Not logged in"));
    }
    let refresh = ctx.config.refresh_config();
    writeln!(
        out,
        "Refreshing every {}s, press Ctrl-C to stop",
        refresh.interval.as_secs()
    )?;

    let mut scheduler = ctx.client.spawn_refresh_scheduler(refresh);
    tokio::select! {
        _ = shutdown.cancelled() => {
            scheduler.abort();
            writeln!(out, "Stopped")?;
        }
        _ = &mut scheduler => {
            writeln!(out, "{}", style("Session ended, please log in again").yellow())?;
        }
    }
    Ok(())
}

fn orchestrator(ctx: &AppContext, host: Arc<TerminalPopupHost>) -> LinkingOrchestrator {
    LinkingOrchestrator::new(
        ctx.client.clone(),
        host,
        Arc::new(ChannelMessageSource::new()),
        ctx.config.linking_config(),
    )
}

fn render_link(link: &SocialLink) -> String {
    let mut line = link.provider.clone();
    if let Some(username) = link.username.as_deref() {
        line.push_str(&format!("  @{username}"));
    }
    if let Some(linked_at) = link.linked_at.as_deref() {
        line.push_str(&format!("  since {linked_at}"));
    }
    line
}

fn describe_expiry(expires_at: DateTime<Utc>) -> String {
    let remaining = expires_at - Utc::now();
    let stamp = expires_at.format("%Y-%m-%d %H:%M:%S UTC");
    if remaining.num_seconds() <= 0 {
        format!("at {stamp} (expired)")
    } else {
        format!("at {stamp} (in {}m)", remaining.num_minutes())
    }
}
