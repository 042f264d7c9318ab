// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end session lifecycle scenarios against the fake identity
//! backend: login, heartbeat-driven invalidation, proactive refresh, and
//! forced logout on expiry.

use porter::events::{LogoutReason, SessionEvent};
use porter::platform::KeyStore;
use porter::session::SessionPhase;
use porter_specs::{spec_host, wait_for, Identity};

#[tokio::test]
async fn login_then_server_side_invalidation_logs_out() -> anyhow::Result<()> {
    let identity = Identity::spawn().await?;
    identity.add_user("ada@example.com", "Ada", "correct horse");

    let host = spec_host(&identity.base_url, |config| {
        config.heartbeat_ms = 150;
        // Every heartbeat must be a real round-trip in this compressed
        // timeline.
        config.user_cache_ttl_ms = 0;
        config.error_cache_ttl_ms = 0;
        // Keep the other timers out of the way.
        config.refresh_poll_ms = 3_600_000;
        config.warning_poll_ms = 3_600_000;
    })?;
    let mut events = host.stack.controller.subscribe();

    host.stack.controller.start().await;
    assert_eq!(host.stack.controller.phase(), SessionPhase::Unauthenticated);

    let user = host.stack.controller.login("ada@example.com", "correct horse").await?;
    assert_eq!(user.name, "Ada");
    assert!(host.stack.tokens.token().is_some());
    assert_eq!(identity.live_sessions(), 1);

    // Heartbeats confirm the session server-side.
    let before = identity.me_calls();
    wait_for("heartbeat round-trips", || identity.me_calls() > before).await?;
    assert!(host.stack.controller.is_authenticated());

    // The server invalidates the session out from under the client; the
    // next heartbeat notices and forces a logout.
    identity.revoke_all_sessions();
    wait_for("forced logout", || !host.stack.controller.is_authenticated()).await?;

    let mut reason = None;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::LoggedOut { reason: r } = event {
            reason = Some(r);
        }
    }
    assert_eq!(reason, Some(LogoutReason::SessionInvalid));
    assert_eq!(host.stack.tokens.token(), None);
    assert_eq!(
        host.navigator.visited().last().map(String::as_str),
        Some("/login?reason=session_invalid")
    );

    host.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn warning_window_triggers_automatic_refresh() -> anyhow::Result<()> {
    let identity = Identity::spawn().await?;
    identity.add_user("ada@example.com", "Ada", "pw");
    // Tokens live 3s; the warning threshold covers the last 2s.
    identity.set_expires_in(3);

    let host = spec_host(&identity.base_url, |config| {
        config.token_threshold_secs = 2;
        config.warning_poll_ms = 200;
        config.heartbeat_ms = 3_600_000;
        config.refresh_poll_ms = 3_600_000;
    })?;
    let mut events = host.stack.controller.subscribe();

    host.stack.controller.start().await;
    host.stack.controller.login("ada@example.com", "pw").await?;
    let first_token = host.stack.tokens.token();

    // Within ~1.2s the token enters the warning window and the warning
    // timer refreshes it before any countdown shows.
    wait_for("automatic refresh", || identity.refresh_calls() >= 1).await?;
    wait_for("token rotation", || host.stack.tokens.token() != first_token).await?;
    assert!(host.stack.controller.is_authenticated());
    assert_eq!(host.stack.controller.warning_seconds(), None);

    let mut saw_refreshed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Refreshed { .. }) {
            saw_refreshed = true;
        }
    }
    assert!(saw_refreshed);

    host.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn expired_token_forces_logout_with_reason() -> anyhow::Result<()> {
    let identity = Identity::spawn().await?;
    identity.add_user("ada@example.com", "Ada", "pw");
    // 1s lifetime, no warning window: expiry lands directly.
    identity.set_expires_in(1);

    let host = spec_host(&identity.base_url, |config| {
        config.token_threshold_secs = 0;
        config.warning_poll_ms = 150;
        config.heartbeat_ms = 3_600_000;
        config.refresh_poll_ms = 3_600_000;
    })?;

    host.stack.controller.start().await;
    host.stack.controller.login("ada@example.com", "pw").await?;
    let _ = host.local.set("user_prefs", "{}");

    wait_for("forced logout", || !host.stack.controller.is_authenticated()).await?;

    assert_eq!(host.stack.tokens.token(), None);
    // The cleanup sweep ran on the way out.
    assert_eq!(host.local.get("user_prefs")?, None);
    assert_eq!(
        host.navigator.visited().last().map(String::as_str),
        Some("/login?reason=session_expired")
    );

    host.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn password_and_api_key_operations_share_the_session() -> anyhow::Result<()> {
    let identity = Identity::spawn().await?;

    let host = spec_host(&identity.base_url, |_| {})?;
    host.stack.controller.start().await;
    let user =
        host.stack.controller.register("new@example.com", "Newcomer", "first-pw").await?;
    assert_eq!(user.email, "new@example.com");

    // API keys round-trip.
    let created = host.stack.client.create_api_key("ci").await?;
    assert!(created.secret.starts_with("sk-"));
    let keys = host.stack.client.api_keys().await?;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].name, "ci");
    host.stack.client.revoke_api_key(&created.id).await?;
    assert!(host.stack.client.api_keys().await?.is_empty());

    // Password change applies immediately: the old password stops working.
    host.stack.client.change_password("first-pw", "second-pw").await?;
    host.stack.controller.logout(LogoutReason::UserInitiated).await;
    assert!(host.stack.controller.login("new@example.com", "first-pw").await.is_err());
    host.stack.controller.login("new@example.com", "second-pw").await?;
    assert!(host.stack.controller.is_authenticated());

    host.shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn transient_refresh_failures_are_retried() -> anyhow::Result<()> {
    let identity = Identity::spawn().await?;
    identity.add_user("ada@example.com", "Ada", "pw");

    let host = spec_host(&identity.base_url, |_| {})?;
    host.stack.controller.start().await;
    host.stack.controller.login("ada@example.com", "pw").await?;

    identity.fail_refreshes(2);
    let user = host.stack.client.refresh_session().await?;
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(identity.refresh_calls(), 3, "two rejected attempts plus the success");

    host.shutdown.cancel();
    Ok(())
}
