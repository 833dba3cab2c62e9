use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitWindow {
    Minute,
    Hour,
    Day,
}

impl LimitWindow {
    pub const ALL: [LimitWindow; 3] = [Self::Minute, Self::Hour, Self::Day];

    pub fn span(self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3_600),
            Self::Day => Duration::from_secs(86_400),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    pub minute: usize,
    pub hour: usize,
    pub day: usize,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            minute: 5,
            hour: 30,
            day: 100,
        }
    }
}

impl QuotaLimits {
    fn for_window(&self, window: LimitWindow) -> usize {
        match window {
            LimitWindow::Minute => self.minute,
            LimitWindow::Hour => self.hour,
            LimitWindow::Day => self.day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub reason: Option<String>,
    pub retry_after_secs: u64,
    pub limit_type: Option<LimitWindow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub minute: usize,
    pub hour: usize,
    pub day: usize,
    pub limits: QuotaLimits,
}

/// Sliding-window quotas per key. Only successful answers count against a key.
#[derive(Debug, Clone)]
pub struct QuotaLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    limits: QuotaLimits,
}

/// A slot held while a request is in flight. Dropping it without
/// [`QuotaReservation::commit`] gives the slot back.
#[derive(Debug)]
#[must_use = "an uncommitted reservation is released on drop"]
pub struct QuotaReservation {
    limiter: QuotaLimiter,
    key: String,
    stamp: Instant,
    committed: bool,
}

impl QuotaReservation {
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for QuotaReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter.release(&self.key, self.stamp);
        }
    }
}

impl QuotaLimiter {
    pub fn new(limits: QuotaLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            limits,
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    /// Checks every window and takes a slot in the same critical section.
    pub fn try_acquire(&self, key: &str) -> Result<QuotaReservation, QuotaDecision> {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn usage(&self, key: &str) -> QuotaUsage {
        self.usage_at(key, Instant::now())
    }

    fn try_acquire_at(&self, key: &str, now: Instant) -> Result<QuotaReservation, QuotaDecision> {
        let mut guard = self.inner.lock();
        if !guard.contains_key(key) {
            sweep(&mut guard, now);
        }

        let queue = guard.entry(key.to_string()).or_default();
        prune(queue, now);

        if let Some(decision) = self.exhausted_window(queue, now) {
            if queue.is_empty() {
                guard.remove(key);
            }
            return Err(decision);
        }

        queue.push_back(now);
        Ok(QuotaReservation {
            limiter: self.clone(),
            key: key.to_string(),
            stamp: now,
            committed: false,
        })
    }

    fn release(&self, key: &str, stamp: Instant) {
        let mut guard = self.inner.lock();
        let Some(queue) = guard.get_mut(key) else {
            return;
        };
        if let Some(position) = queue.iter().rposition(|held| *held == stamp) {
            queue.remove(position);
        }
        if queue.is_empty() {
            guard.remove(key);
        }
    }

    fn exhausted_window(&self, queue: &VecDeque<Instant>, now: Instant) -> Option<QuotaDecision> {
        LimitWindow::ALL.into_iter().find_map(|window| {
            let limit = self.limits.for_window(window);
            let mut in_window = queue
                .iter()
                .filter(|stamp| now.duration_since(**stamp) < window.span());
            let oldest = in_window.next()?;
            if 1 + in_window.count() < limit {
                return None;
            }

            let retry_after_secs = window
                .span()
                .saturating_sub(now.duration_since(*oldest))
                .as_secs()
                .max(1);

            Some(QuotaDecision {
                reason: Some(format!(
                    "You have reached the limit of {} requests per {}",
                    limit,
                    window.label()
                )),
                retry_after_secs,
                limit_type: Some(window),
            })
        })
    }

    fn usage_at(&self, key: &str, now: Instant) -> QuotaUsage {
        let mut guard = self.inner.lock();
        let mut counts = [0; 3];
        if let Some(queue) = guard.get_mut(key) {
            prune(queue, now);
            counts = LimitWindow::ALL.map(|window| {
                queue
                    .iter()
                    .filter(|stamp| now.duration_since(**stamp) < window.span())
                    .count()
            });
            if queue.is_empty() {
                guard.remove(key);
            }
        }

        QuotaUsage {
            minute: counts[0],
            hour: counts[1],
            day: counts[2],
            limits: self.limits,
        }
    }
}

// The day window is the widest, so anything older can go.
fn prune(queue: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = queue.front() {
        if now.duration_since(*front) >= LimitWindow::Day.span() {
            queue.pop_front();
        } else {
            break;
        }
    }
}

// Runs whenever a new key is about to be inserted, so the map never keeps idle keys
// longer than the widest window.
fn sweep(map: &mut HashMap<String, VecDeque<Instant>>, now: Instant) {
    map.retain(|_, queue| {
        prune(queue, now);
        !queue.is_empty()
    });
}
