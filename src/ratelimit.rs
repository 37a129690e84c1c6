//! Fixed-window rate limiting for mutating requests, keyed per client.
//!
//! Windows live in the durable store so counts survive process restarts;
//! only the reclamation timers are in-process. `check_limit` and `increment`
//! are two independent calls: concurrent requests from one client can both
//! pass the check before either increments, so the limit can be exceeded by
//! a small margin. This is an advisory abuse mitigation, not a hard quota.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::Store;
use crate::types::RateWindow;

pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

// Slack between a window expiring and its row being reclaimed.
const RECLAIM_GRACE: Duration = Duration::from_millis(500);

/// Snapshot of one client's window as seen by a limit check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    limit: u32,
    window: chrono::Duration,
    reclaimers: DashMap<String, JoinHandle<()>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, limit: u32, window: Duration) -> Self {
        Self {
            store,
            limit,
            window: chrono::Duration::from_std(window)
                .unwrap_or_else(|_| chrono::Duration::hours(1)),
            reclaimers: DashMap::new(),
        }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Reports whether the client may proceed. A missing or expired window
    /// reports optimistic pre-increment accounting (`remaining = limit - 1`)
    /// with a fresh `reset_at`; a live window is judged against its count.
    pub fn check_limit(&self, client_key: &str) -> Result<RateLimitStatus> {
        let now = Utc::now();
        match self.store.get_rate_window(client_key)? {
            Some(window) if window.reset_at > now => Ok(RateLimitStatus {
                allowed: window.count < self.limit,
                limit: self.limit,
                remaining: self.limit.saturating_sub(window.count),
                reset_at: window.reset_at,
            }),
            _ => Ok(RateLimitStatus {
                allowed: true,
                limit: self.limit,
                remaining: self.limit.saturating_sub(1),
                reset_at: now + self.window,
            }),
        }
    }

    /// Counts one mutation. Starts a fresh window (replacing any expired
    /// row) or increments the live one in place, leaving `reset_at` alone.
    pub fn increment(&self, client_key: &str) -> Result<()> {
        let now = Utc::now();
        match self.store.get_rate_window(client_key)? {
            Some(window) if window.reset_at > now => {
                self.store.increment_rate_window(client_key)
            }
            _ => {
                let reset_at = now + self.window;
                self.store.put_rate_window(&RateWindow {
                    client_key: client_key.to_string(),
                    count: 1,
                    reset_at,
                })?;
                self.schedule_reclaim(client_key, reset_at);
                Ok(())
            }
        }
    }

    /// Clears the client's window and cancels its scheduled reclamation.
    pub fn reset(&self, client_key: &str) -> Result<()> {
        if let Some((_, handle)) = self.reclaimers.remove(client_key) {
            handle.abort();
        }
        self.store.delete_rate_window(client_key)?;
        Ok(())
    }

    /// Read-only snapshot; `None` when the client has no live window.
    pub fn status(&self, client_key: &str) -> Result<Option<RateLimitStatus>> {
        let now = Utc::now();
        Ok(self.store.get_rate_window(client_key)?.and_then(|window| {
            (window.reset_at > now).then(|| RateLimitStatus {
                allowed: window.count < self.limit,
                limit: self.limit,
                remaining: self.limit.saturating_sub(window.count),
                reset_at: window.reset_at,
            })
        }))
    }

    /// Drops every expired row, for startup cleanup of windows whose
    /// reclamation timers died with the previous process.
    pub fn sweep_expired(&self) -> Result<usize> {
        self.store.delete_expired_rate_windows(Utc::now())
    }

    fn schedule_reclaim(&self, client_key: &str, reset_at: DateTime<Utc>) {
        let store = Arc::clone(&self.store);
        let key = client_key.to_string();
        let map_key = key.clone();
        let delay = (reset_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            + RECLAIM_GRACE;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.get_rate_window(&key) {
                // A newer window may have replaced the one this timer was
                // armed for; only reclaim once actually expired.
                Ok(Some(window)) if window.reset_at <= Utc::now() => {
                    if let Err(e) = store.delete_rate_window(&key) {
                        warn!("failed to reclaim rate window for {key}: {e}");
                    } else {
                        debug!("reclaimed expired rate window for {key}");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("failed to inspect rate window for {key}: {e}"),
            }
        });

        if let Some(previous) = self.reclaimers.insert(map_key, handle) {
            previous.abort();
        }
    }
}
