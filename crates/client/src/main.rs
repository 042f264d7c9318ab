// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::error;

use porter::config::PorterConfig;
use porter::events::LogoutReason;
use porter::platform::Platform;
use porter::session::SessionPhase;
use porter::token::TokenStatus;

#[derive(Parser)]
#[command(name = "porter", about = "Session and SSO handoff client for the platform")]
struct Cli {
    #[command(flatten)]
    config: PorterConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password.
    Login {
        email: String,
        #[arg(long, env = "PORTER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show token and session status.
    Status,
    /// Print the current user.
    Whoami,
    /// Force a session refresh.
    Refresh,
    /// Sign out and clear local state.
    Logout,
    /// Produce a cross-app SSO redirect URL.
    Handoff {
        app: String,
        #[arg(long, default_value = "/")]
        return_url: String,
    },
    /// Run the session controller and print events as they happen.
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let platform = Platform::host(cli.config.state_dir.clone())?;
    let shutdown = CancellationToken::new();
    let stack = porter::assemble(cli.config, platform, shutdown.clone())?;

    match cli.command {
        Command::Login { email, password } => {
            let user = stack.client.login(&email, &password).await?;
            println!("signed in as {} <{}>", user.name, user.email);
        }
        Command::Status => {
            let status = match stack.tokens.status() {
                TokenStatus::Valid => "valid",
                TokenStatus::Warning => "expiring soon",
                TokenStatus::Expired => "expired or absent",
            };
            println!("token: {status}");
            if stack.tokens.remaining_ms() > 0 {
                println!("expires in: {}s", stack.tokens.remaining_ms() / 1_000);
            }
        }
        Command::Whoami => {
            let user = stack.client.current_user().await?;
            println!("{} <{}> (id {})", user.name, user.email, user.id);
        }
        Command::Refresh => {
            let user = stack.client.refresh_session().await?;
            println!(
                "session refreshed for {}; expires in {}s",
                user.email,
                stack.tokens.remaining_ms() / 1_000
            );
        }
        Command::Logout => {
            stack.controller.logout(LogoutReason::UserInitiated).await;
            println!("signed out");
        }
        Command::Handoff { app, return_url } => {
            let url = stack.sso.redirect_url(&app, &return_url).await?;
            println!("{url}");
        }
        Command::Watch => {
            let mut events = stack.controller.subscribe();
            stack.controller.start().await;
            match stack.controller.phase() {
                SessionPhase::Authenticated(user) => println!("session active for {}", user.email),
                SessionPhase::Loading => println!("checking session..."),
                SessionPhase::Unauthenticated => println!("no active session"),
            }
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        shutdown.cancel();
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) => println!("{}", serde_json::to_string(&event)?),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
            }
        }
    }
    Ok(())
}
