use std::str::FromStr;

pub const SERVICE_NAME: &str = "rectpack";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hard ceiling on expanded instances per request, whatever `MAX_INSTANCES` says.
pub const INSTANCE_CEILING: u64 = 5000;

/// Runtime settings read from environment variables. Unset or unparsable
/// values fall back to their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub log_level: String,
    /// Append logs here instead of stdout.
    pub log_file: Option<String>,
    pub max_body_bytes: usize,
    pub max_instances: u64,
    pub default_time_limit_ms: u64,
    pub default_restarts: u32,
    pub max_concurrent_jobs: usize,
    pub default_unit_scale: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            log_level: "info".to_string(),
            log_file: None,
            max_body_bytes: 5 * 1024 * 1024,
            max_instances: INSTANCE_CEILING,
            default_time_limit_ms: 800,
            default_restarts: 5,
            max_concurrent_jobs: 1,
            default_unit_scale: 100,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            port: parsed(&lookup, "PORT", d.port),
            log_level: lookup("LOG_LEVEL").unwrap_or(d.log_level),
            log_file: lookup("LOG_FILE").filter(|s| !s.is_empty()),
            max_body_bytes: parsed(&lookup, "MAX_BODY_BYTES", d.max_body_bytes),
            max_instances: parsed(&lookup, "MAX_INSTANCES", d.max_instances),
            default_time_limit_ms: parsed(&lookup, "DEFAULT_TIME_LIMIT_MS", d.default_time_limit_ms),
            default_restarts: parsed(&lookup, "DEFAULT_RESTARTS", d.default_restarts),
            max_concurrent_jobs: parsed(&lookup, "MAX_CONCURRENT_JOBS", d.max_concurrent_jobs).max(1),
            default_unit_scale: parsed(&lookup, "DEFAULT_UNIT_SCALE", d.default_unit_scale),
        }
    }

    /// Instance limit actually enforced.
    pub fn instance_limit(&self) -> u64 {
        self.max_instances.min(INSTANCE_CEILING)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
