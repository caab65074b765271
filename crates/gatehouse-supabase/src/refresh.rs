//! Background session renewal.
//!
//! A ticker checks the stored session every `check_interval` and refreshes it
//! once it is within `refresh_margin` of expiry. An unreachable server is
//! retried on the next tick with the session kept; a rejected refresh token
//! drops the session and emits `SIGNED_OUT`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use gatehouse_types::AuthErrorCode;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::SupabaseAuthAdapter;
use crate::mappers::session_expiry;
use crate::types::GoTrueSession;

#[derive(Debug, Clone, Copy)]
pub struct AutoRefreshConfig {
    pub check_interval: Duration,
    pub refresh_margin: Duration,
    /// Consecutive unreachable attempts after which a warning is logged.
    pub warn_after: u32,
}

impl Default for AutoRefreshConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            refresh_margin: Duration::from_secs(60),
            warn_after: 3,
        }
    }
}

/// Running refresh loop. Dropping the handle stops it.
#[derive(Debug)]
pub struct AutoRefreshHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AutoRefreshHandle {
    /// Stops the loop and waits for it to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            tracing::warn!("Auto-refresh task ended abnormally: {err}");
        }
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Returns true once `session` expires within `margin` of `now`.
pub(crate) fn should_refresh(
    session: &GoTrueSession,
    margin: Duration,
    now: DateTime<Utc>,
) -> bool {
    let deadline = TimeDelta::from_std(margin)
        .ok()
        .and_then(|margin| now.checked_add_signed(margin));
    deadline.is_none_or(|deadline| session_expiry(session, now) <= deadline)
}

impl SupabaseAuthAdapter {
    /// Starts renewing the session in the background. Requires a Tokio
    /// runtime. The loop holds only a weak reference to the adapter and ends
    /// when the adapter is dropped.
    pub fn start_auto_refresh(self: &Arc<Self>, config: AutoRefreshConfig) -> AutoRefreshHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(Arc::downgrade(self), config, cancel.clone()));
        AutoRefreshHandle {
            cancel,
            task: Some(task),
        }
    }
}

async fn refresh_loop(
    adapter: Weak<SupabaseAuthAdapter>,
    config: AutoRefreshConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut failures = 0u32;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(adapter) = adapter.upgrade() else {
            break;
        };
        let due = |session: &GoTrueSession| {
            should_refresh(session, config.refresh_margin, Utc::now())
        };
        if !adapter.client.current_session().is_some_and(|s| due(&s)) {
            failures = 0;
            continue;
        }

        match adapter.refresh_stored_if(due).await {
            Ok(_) => {
                tracing::debug!("session refreshed in background");
                failures = 0;
            }
            Err(err) if err.code == AuthErrorCode::NetworkError => {
                failures += 1;
                if failures == config.warn_after {
                    tracing::warn!(attempts = failures, "Session refresh keeps failing: {err}");
                } else {
                    tracing::debug!(attempt = failures, "background refresh unavailable: {err}");
                }
            }
            Err(err) => {
                tracing::warn!("Background refresh failed: {err}");
                failures = 0;
            }
        }
    }
    tracing::debug!("auto-refresh stopped");
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn session_expiring_at(secs: i64) -> GoTrueSession {
        serde_json::from_value(json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_at": secs,
            "user": {"id": "u", "created_at": "2024-01-01T00:00:00Z"}
        }))
        .unwrap()
    }

    #[test]
    fn test_should_refresh_inside_margin() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let margin = Duration::from_secs(60);
        assert!(!should_refresh(
            &session_expiring_at(1_700_000_120),
            margin,
            now
        ));
        assert!(should_refresh(
            &session_expiring_at(1_700_000_030),
            margin,
            now
        ));
        assert!(should_refresh(
            &session_expiring_at(1_699_999_000),
            margin,
            now
        ));
    }
}
