//! Fixed-window request limiter keyed by client identifier.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::error::RateLimitExceeded;

const WINDOW_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct RateLimitEntry {
    requests: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    /// `max_requests` per client per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::with_window(max_requests, WINDOW_DURATION)
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Counts a request for `client_id`, or rejects it when the window is full.
    pub fn check(&self, client_id: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&self, client_id: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let mut entries = self.entries.write();

        // expired windows are dropped so the table stays bounded by active clients
        let window = self.window;
        entries.retain(|_, entry| now.duration_since(entry.window_start) < window);

        let entry = entries.entry(client_id.to_string()).or_insert(RateLimitEntry {
            requests: 0,
            window_start: now,
        });

        if entry.requests >= self.max_requests {
            let elapsed = now.duration_since(entry.window_start);
            return Err(RateLimitExceeded {
                retry_after: window.saturating_sub(elapsed).max(Duration::from_secs(1)),
            });
        }

        entry.requests += 1;
        Ok(())
    }
}

/// First hop of `X-Forwarded-For`, else the peer address.
pub fn client_identifier(forwarded_for: Option<&str>, remote_addr: Option<&str>) -> String {
    if let Some(first) = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return first.to_string();
    }
    remote_addr.unwrap_or("unknown").to_string()
}
