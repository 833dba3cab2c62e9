use std::env;

use viaje_assistant::{EnrichmentConfig, GeneratorConfig};

use crate::rate_limit::QuotaLimits;

const DEFAULT_BIND: &str = "0.0.0.0:5000";
const DEFAULT_ORIGINS: [&str; 4] = [
    "http://localhost:5500",
    "http://127.0.0.1:5500",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    /// `*` allows any origin.
    pub allowed_origins: Vec<String>,
    pub database_url: Option<String>,
    pub quota: QuotaLimits,
    pub generator: GeneratorConfig,
    pub enrichment: EnrichmentConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            allowed_origins: DEFAULT_ORIGINS.iter().map(ToString::to_string).collect(),
            database_url: None,
            quota: QuotaLimits::default(),
            generator: GeneratorConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind: env::var("VIAJE_BIND").unwrap_or(defaults.bind),
            allowed_origins: env::var("VIAJE_CORS_ORIGINS")
                .ok()
                .map(|value| parse_origins(&value))
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.allowed_origins),
            database_url: env::var("VIAJE_DATABASE_URL")
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            quota: QuotaLimits {
                minute: limit_from_env("VIAJE_REQUESTS_PER_MINUTE", defaults.quota.minute),
                hour: limit_from_env("VIAJE_REQUESTS_PER_HOUR", defaults.quota.hour),
                day: limit_from_env("VIAJE_REQUESTS_PER_DAY", defaults.quota.day),
            },
            generator: GeneratorConfig::from_env(),
            enrichment: EnrichmentConfig::from_env(),
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

fn limit_from_env(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub(crate) fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
