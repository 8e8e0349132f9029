//! KCD Platform command-line client.
//!
//! Entry point wiring configuration, the session store and the controller.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::match_same_arms)]
#![allow(clippy::missing_fields_in_debug)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kcd_client::chat::ChatEvent;
use kcd_client::config::{AppConfig, ConfigArgs};
use kcd_client::theme::THEMES;
use kcd_client::{Channel, Controller, FileStore, Screen, ThemeId};

#[derive(Parser, Debug)]
#[command(name = "kcd", author, version, about = "KCD Platform client", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current screen, user and API base
    Status,
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "KCD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in with the demo account
    DemoLogin,
    /// Sign out and clear the stored session
    Logout,
    /// Fetch the signed-in user's profile
    Profile,
    /// Fetch the workspace and resolve its theme
    Workspace,
    /// Apply a theme (netflix, disney, google-play, salesforce)
    Theme {
        /// Theme id; omit to list themes
        id: Option<String>,
    },
    /// Chat commands
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
    /// Portfolio commands
    Portfolio {
        #[command(subcommand)]
        action: PortfolioAction,
    },
    /// Developer API base override
    ApiBase {
        #[command(subcommand)]
        action: ApiBaseAction,
    },
}

#[derive(Subcommand, Debug)]
enum ChatAction {
    /// Post a message
    Send {
        #[arg(long, default_value = "community")]
        channel: Channel,
        content: String,
    },
    /// Print a channel's history
    History {
        #[arg(long, default_value = "community")]
        channel: Channel,
    },
    /// Follow new messages until interrupted
    Tail {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum PortfolioAction {
    /// List uploaded assets
    List,
    /// Upload images or videos
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ApiBaseAction {
    /// Show the resolved bases
    Show,
    /// Persist an override
    Set { url: String },
    /// Remove the override
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::from_args(&cli.config).context("Configuration error")?;
    let store_path = config.session.store_path();
    info!(
        name: "config.loaded",
        store = %store_path.display(),
        mode = ?config.api.mode,
        "Configuration loaded"
    );

    let store = Arc::new(FileStore::open(store_path));
    let controller = Controller::new(config, store)?;
    controller.load();

    run(&controller, cli.command).await
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(ctl: &Controller, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Status => {
            println!("{}", render(ctl));
            let bases = ctl.resolver().candidates();
            println!("API bases: {}", bases.join(", "));
        }
        Command::Login { email, password } => {
            goto_login(ctl)?;
            let session = ctl
                .login(&email, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Signed in as {} ({})", session.display_name(), session.email());
        }
        Command::DemoLogin => {
            goto_login(ctl)?;
            let session = ctl
                .demo_login()
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Signed in as {} (demo)", session.display_name());
        }
        Command::Logout => {
            ctl.logout().await;
            println!("Signed out");
        }
        Command::Profile => {
            let profile = ctl.fetch_profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Workspace => {
            let ws = ctl.fetch_workspace().await?;
            println!("{} ({})", ws.name, ws.widgets.join(", "));
            if let (Some(role), Some(theme)) = (ctl.effective_role(), ctl.theme()) {
                println!("Role: {role}  Theme: {}", theme.info().label);
            }
        }
        Command::Theme { id: None } => {
            let current = ctl.theme();
            for theme in THEMES {
                let marker = if current == Some(theme.id) { "*" } else { " " };
                println!("{marker} {:<12} {}", theme.id.as_str(), theme.description);
            }
        }
        Command::Theme { id: Some(id) } => {
            let theme: ThemeId = id.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            if let Some(task) = ctl.set_theme(theme) {
                // The CLI exits right away, so give the update a chance to land.
                wait_for_theme_update(task, Duration::from_secs(5)).await;
            }
            println!("Theme set to {}", theme.info().label);
        }
        Command::Chat { action } => run_chat(ctl, action).await?,
        Command::Portfolio { action } => match action {
            PortfolioAction::List => {
                for asset in ctl.portfolio().await? {
                    println!("{:?}\t{}", asset.file_type, asset.file_url);
                }
            }
            PortfolioAction::Upload { files } => {
                let mut failed = 0;
                for result in ctl.upload_portfolio(&files).await? {
                    match result {
                        Ok(asset) => println!("uploaded {}", asset.file_url),
                        Err(e) => {
                            failed += 1;
                            eprintln!("{}", e.user_message());
                        }
                    }
                }
                if failed > 0 {
                    bail!("{failed} of {} uploads failed", files.len());
                }
            }
        },
        Command::ApiBase { action } => match action {
            ApiBaseAction::Show => {
                let resolver = ctl.resolver();
                println!("override:   {}", resolver.stored_override().unwrap_or_default());
                println!("primary:    {}", resolver.primary().unwrap_or_default());
                println!("candidates: {}", resolver.candidates().join(", "));
            }
            ApiBaseAction::Set { url } => {
                ctl.resolver().set_override(&url)?;
                println!("Override saved");
            }
            ApiBaseAction::Clear => {
                ctl.resolver().clear_override()?;
                println!("Override cleared");
            }
        },
    }
    Ok(())
}

async fn run_chat(ctl: &Controller, action: ChatAction) -> anyhow::Result<()> {
    match action {
        ChatAction::Send { channel, content } => {
            let msg = ctl.send_chat(channel, &content).await?;
            println!("[{}] #{} {}", msg.channel, msg.id, msg.content);
        }
        ChatAction::History { channel } => {
            for msg in ctl.chat_history(channel).await? {
                println!("{} {}: {}", msg.created_at.format("%H:%M"), msg.user_name, msg.content);
            }
        }
        ChatAction::Tail { seconds } => {
            let mut events = ctl.start_chat().await?;
            let log = ctl.chat_log();
            let mut printed = 0;
            let deadline =
                tokio::time::sleep(Duration::from_secs(seconds.unwrap_or(60 * 60 * 24 * 365)));
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(ChatEvent::Merged { .. }) => {
                            let guard = log.lock().map_err(|e| anyhow::anyhow!(e.to_string()))?;
                            for msg in guard.messages().iter().skip(printed) {
                                println!("[{}] {}: {}", msg.channel, msg.user_name, msg.content);
                            }
                            printed = guard.len();
                        }
                        Ok(ChatEvent::Transport(kind)) => eprintln!("transport: {kind:?}"),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            ctl.stop_chat().await;
        }
    }
    Ok(())
}

/// Wait for the background theme update; returns whether it finished.
async fn wait_for_theme_update(task: tokio::task::JoinHandle<()>, wait: Duration) -> bool {
    match tokio::time::timeout(wait, task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Theme update task failed");
            false
        }
        Err(_) => {
            tracing::debug!(
                wait_secs = wait.as_secs_f64(),
                "Theme update still pending at exit"
            );
            false
        }
    }
}

/// Walk the unauthenticated screens up to the login form.
fn goto_login(ctl: &Controller) -> anyhow::Result<()> {
    loop {
        match ctl.screen() {
            Screen::Login => return Ok(()),
            Screen::Splash => {
                ctl.finish_splash()?;
            }
            Screen::Home => {
                ctl.open_login()?;
            }
            Screen::Dashboard => bail!("Already signed in; run `kcd logout` first"),
            Screen::Loading => {
                ctl.load();
            }
        }
    }
}

/// Text rendering of the current screen.
fn render(ctl: &Controller) -> String {
    match ctl.screen() {
        Screen::Loading => "Loading...".to_string(),
        Screen::Splash => "Splash: not signed in".to_string(),
        Screen::Home => "Home: not signed in".to_string(),
        Screen::Login => "Login: enter your credentials".to_string(),
        Screen::Dashboard => match ctl.session() {
            Some(session) => format!(
                "Dashboard: {} <{}> role={}",
                session.display_name(),
                session.email(),
                session.effective_role()
            ),
            None => "Dashboard".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_theme_update_does_not_block_exit() {
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        assert!(!wait_for_theme_update(task, Duration::from_millis(20)).await);

        let task = tokio::spawn(async {});
        assert!(wait_for_theme_update(task, Duration::from_secs(1)).await);
    }
}
