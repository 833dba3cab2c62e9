use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// How a planning request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Answered,
    RejectedInput,
    BlockedPrompt,
    RateLimited,
    GeneratorFailure,
}

impl Outcome {
    const COUNT: usize = 5;

    fn slot(self) -> usize {
        match self {
            Self::Answered => 0,
            Self::RejectedInput => 1,
            Self::BlockedPrompt => 2,
            Self::RateLimited => 3,
            Self::GeneratorFailure => 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_total: AtomicU64,
    outcomes: [AtomicU64; Outcome::COUNT],
    total_latency_millis: AtomicU64,
    max_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeCounts {
    pub answered: u64,
    pub rejected_input: u64,
    pub blocked_prompt: u64,
    pub rate_limited: u64,
    pub generator_failure: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub outcomes: OutcomeCounts,
    pub avg_latency_millis: f64,
    pub max_latency_millis: u64,
}

impl AppMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, outcome: Outcome) {
        self.outcomes[outcome.slot()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.outcomes[outcome.slot()].load(Ordering::Relaxed)
    }

    pub fn observe_latency(&self, duration: Duration) {
        let millis = duration.as_millis() as u64;
        self.total_latency_millis.fetch_add(millis, Ordering::Relaxed);
        self.max_latency_millis.fetch_max(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            requests_total: requests,
            outcomes: OutcomeCounts {
                answered: self.count(Outcome::Answered),
                rejected_input: self.count(Outcome::RejectedInput),
                blocked_prompt: self.count(Outcome::BlockedPrompt),
                rate_limited: self.count(Outcome::RateLimited),
                generator_failure: self.count(Outcome::GeneratorFailure),
            },
            avg_latency_millis: if requests == 0 {
                0.0
            } else {
                latency as f64 / requests as f64
            },
            max_latency_millis: self.max_latency_millis.load(Ordering::Relaxed),
        }
    }
}

/// JSON logs on stderr, filtered by `VIAJE_LOG`, then `RUST_LOG`, then `<service>=info`.
/// Stdout stays free for command output.
pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_env("VIAJE_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| {
                EnvFilter::new(format!(
                    "{service_name}=info,viaje_api=info,viaje_assistant=info,tower_http=info"
                ))
            });

        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .init();
    });
}
