//! Fixed-window request budgets for the embed read and reorder endpoints.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::AppError;

/// Windows are swept once the table grows past this many keys.
const SWEEP_THRESHOLD: usize = 4_096;

/// Who a reorder is charged to.
#[derive(Debug, Clone, Copy)]
pub enum ReorderCaller<'a> {
    User(&'a str),
    /// Anonymous reorders share one budget per database.
    Database(&'a str),
}

impl ReorderCaller<'_> {
    fn key(self) -> String {
        match self {
            Self::User(user_id) => format!("user:{user_id}"),
            Self::Database(database_ref) => format!("db:{database_ref}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetCounters {
    pub allowed: u64,
    pub limited: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub public_reads: BudgetCounters,
    pub reorders: BudgetCounters,
}

/// Per-endpoint budgets shared by every request handler.
pub struct GridRateLimits {
    public_reads: WindowBudget,
    reorders: WindowBudget,
}

impl GridRateLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            public_reads: WindowBudget::new(
                "public_read",
                config.public_read_rate_limit_per_window,
                config.rate_limit_window,
            ),
            reorders: WindowBudget::new(
                "reorder",
                config.reorder_rate_limit_per_window,
                config.rate_limit_window,
            ),
        }
    }

    /// Embed reads are budgeted per database, since they carry no identity.
    pub fn admit_public_read(&self, database_ref: &str) -> Result<(), AppError> {
        self.public_reads.admit(database_ref, Instant::now())
    }

    pub fn admit_reorder(&self, caller: ReorderCaller<'_>) -> Result<(), AppError> {
        self.reorders.admit(&caller.key(), Instant::now())
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            public_reads: self.public_reads.counters(),
            reorders: self.reorders.counters(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened_at: Instant,
    used: u32,
}

struct WindowBudget {
    label: &'static str,
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
    allowed: AtomicU64,
    limited: AtomicU64,
}

impl WindowBudget {
    fn new(label: &'static str, limit: u32, window: Duration) -> Self {
        Self {
            label,
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
            allowed: AtomicU64::new(0),
            limited: AtomicU64::new(0),
        }
    }

    fn admit(&self, key: &str, now: Instant) -> Result<(), AppError> {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, window| now.duration_since(window.opened_at) < self.window);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            opened_at: now,
            used: 0,
        });
        let elapsed = now.duration_since(window.opened_at);
        if elapsed >= self.window {
            *window = Window {
                opened_at: now,
                used: 0,
            };
        }

        if window.used < self.limit {
            window.used += 1;
            self.allowed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.limited.fetch_add(1, Ordering::Relaxed);
        let remaining = self.window.saturating_sub(elapsed);
        let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        tracing::warn!(
            endpoint = self.label,
            caller = caller_fingerprint(key),
            retry_after_secs,
            "Rate limit exceeded"
        );
        Err(AppError::too_many_requests(
            format!("Too many {} requests, slow down", self.label),
            retry_after_secs,
        ))
    }

    fn counters(&self) -> BudgetCounters {
        BudgetCounters {
            allowed: self.allowed.load(Ordering::Relaxed),
            limited: self.limited.load(Ordering::Relaxed),
        }
    }
}

/// Stable, non-reversible label for logging a caller key.
pub fn caller_fingerprint(caller: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    caller.hash(&mut hasher);
    hasher.finish()
}
