pub mod advice;
pub mod catalog;
pub mod domain;
pub mod ingest;
pub mod llm;
pub mod scheduler;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    const DEFAULT_DATA_DIR: &str = ".";
    const DEFAULT_PROVIDERS_FILE: &str = "api.md";
    const DEFAULT_USER_CAPACITY_NTD: f64 = 20_000.0;
    const DEFAULT_MIN_INVESTMENT_NTD: f64 = 1_000.0;
    const DEFAULT_SCHEDULE_HOUR: u32 = 10;
    const DEFAULT_GRACE_MINUTES: i64 = 5;
    const DEFAULT_PROVIDER_DELAY_SECS: u64 = 2;
    const DEFAULT_RETENTION_DAYS: i64 = 30;
    const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;
    const DEFAULT_PROVIDER_MAX_TOKENS: u32 = 8000;
    const DEFAULT_PROVIDER_MAX_ATTEMPTS: u32 = 3;
    const DEFAULT_PROVIDER_RETRY_BASE_SECS: u64 = 5;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub data_dir: PathBuf,
        pub store_url: Option<String>,
        pub providers_file: PathBuf,
        pub user_capacity_ntd: f64,
        pub min_investment_ntd: f64,
        pub schedule_hour: u32,
        pub grace_minutes: i64,
        pub provider_delay: Duration,
        pub retention_days: i64,
        /// Per-attempt HTTP timeout for provider calls.
        pub provider_timeout: Duration,
        pub provider_max_tokens: u32,
        /// At least 1.
        pub provider_max_attempts: u32,
        /// Rate-limit backoff is `attempt * provider_retry_base`.
        pub provider_retry_base: Duration,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                data_dir: PathBuf::from(DEFAULT_DATA_DIR),
                store_url: None,
                providers_file: PathBuf::from(DEFAULT_PROVIDERS_FILE),
                user_capacity_ntd: DEFAULT_USER_CAPACITY_NTD,
                min_investment_ntd: DEFAULT_MIN_INVESTMENT_NTD,
                schedule_hour: DEFAULT_SCHEDULE_HOUR,
                grace_minutes: DEFAULT_GRACE_MINUTES,
                provider_delay: Duration::from_secs(DEFAULT_PROVIDER_DELAY_SECS),
                retention_days: DEFAULT_RETENTION_DAYS,
                provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
                provider_max_tokens: DEFAULT_PROVIDER_MAX_TOKENS,
                provider_max_attempts: DEFAULT_PROVIDER_MAX_ATTEMPTS,
                provider_retry_base: Duration::from_secs(DEFAULT_PROVIDER_RETRY_BASE_SECS),
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();
            let schedule_hour = env_parse("ADVICE_SCHEDULE_HOUR")?.unwrap_or(defaults.schedule_hour);
            anyhow::ensure!(
                schedule_hour < 24,
                "ADVICE_SCHEDULE_HOUR must be 0..=23 (got {schedule_hour})"
            );

            let user_capacity_ntd =
                env_parse("ADVICE_USER_CAPACITY_NTD")?.unwrap_or(defaults.user_capacity_ntd);
            anyhow::ensure!(
                user_capacity_ntd.is_finite() && user_capacity_ntd >= 0.0,
                "ADVICE_USER_CAPACITY_NTD must be a non-negative number (got {user_capacity_ntd})"
            );

            let provider_max_attempts = env_parse("PROVIDER_MAX_ATTEMPTS")?
                .unwrap_or(defaults.provider_max_attempts);
            anyhow::ensure!(
                provider_max_attempts >= 1,
                "PROVIDER_MAX_ATTEMPTS must be at least 1 (got {provider_max_attempts})"
            );

            Ok(Self {
                data_dir: std::env::var("ADVICE_DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data_dir),
                store_url: std::env::var("ADVICE_STORE_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                providers_file: std::env::var("ADVICE_PROVIDERS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.providers_file),
                user_capacity_ntd,
                min_investment_ntd: env_parse("ADVICE_MIN_INVESTMENT_NTD")?
                    .unwrap_or(defaults.min_investment_ntd),
                schedule_hour,
                grace_minutes: env_parse("ADVICE_GRACE_MINUTES")?.unwrap_or(defaults.grace_minutes),
                provider_delay: env_parse("ADVICE_PROVIDER_DELAY_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.provider_delay),
                retention_days: env_parse("ADVICE_RETENTION_DAYS")?
                    .unwrap_or(defaults.retention_days),
                provider_timeout: env_parse("PROVIDER_TIMEOUT_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.provider_timeout),
                provider_max_tokens: env_parse("PROVIDER_MAX_TOKENS")?
                    .unwrap_or(defaults.provider_max_tokens),
                provider_max_attempts,
                provider_retry_base: env_parse("PROVIDER_RETRY_BASE_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.provider_retry_base),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_store_url(&self) -> anyhow::Result<&str> {
            self.store_url
                .as_deref()
                .context("ADVICE_STORE_URL is required")
        }
    }

    fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match std::env::var(key) {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .with_context(|| format!("{key} is not valid: {raw}")),
            _ => Ok(None),
        }
    }

}
