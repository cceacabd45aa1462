/// Which heuristic drives the behavior sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorStrategyKind {
    /// Configured constant (placeholder until a real signal is agreed on).
    Fixed,
    /// Recency-decayed engagement activity.
    Recency,
}

impl std::str::FromStr for BehaviorStrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "recency" => Ok(Self::Recency),
            other => anyhow::bail!("unknown behavior score strategy '{}'", other),
        }
    }
}

/// Knobs consumed by the scoring pipeline.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub behavior_strategy: BehaviorStrategyKind,
    pub behavior_score_default: i32,
    pub intent_score_default: i32,
    /// Trailing window (days) for the engagement sub-score.
    pub engagement_window_days: i64,
    /// Half-life (days) used by the recency behavior strategy.
    pub recency_half_life_days: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            behavior_strategy: BehaviorStrategyKind::Fixed,
            behavior_score_default: 50,
            intent_score_default: 50,
            engagement_window_days: 30,
            recency_half_life_days: 7.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub prioritize_default_limit: usize,
    pub prioritize_max_limit: usize,
    /// 0 disables the prioritization cache.
    pub prioritize_cache_ttl_secs: u64,
    pub rescore_concurrency: usize,
    pub scoring: ScoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/lead_intent".to_string(),
            port: 3000,
            db_max_connections: 10,
            db_acquire_timeout_secs: 5,
            request_timeout_secs: 30,
            prioritize_default_limit: 50,
            prioritize_max_limit: 500,
            prioritize_cache_ttl_secs: 60,
            rescore_concurrency: 8,
            scoring: ScoringConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", name, raw)),
        _ => Ok(default),
    }
}

fn score_in_range(name: &str, value: i32) -> anyhow::Result<i32> {
    if !(0..=100).contains(&value) {
        anyhow::bail!("{} must be between 0 and 100", name);
    }
    Ok(value)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();
        let scoring_defaults = ScoringConfig::default();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: parse_env("PORT", defaults.port)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_acquire_timeout_secs: parse_env(
                "DB_ACQUIRE_TIMEOUT_SECS",
                defaults.db_acquire_timeout_secs,
            )?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            prioritize_default_limit: parse_env(
                "PRIORITIZE_DEFAULT_LIMIT",
                defaults.prioritize_default_limit,
            )?,
            prioritize_max_limit: parse_env("PRIORITIZE_MAX_LIMIT", defaults.prioritize_max_limit)?,
            prioritize_cache_ttl_secs: parse_env(
                "PRIORITIZE_CACHE_TTL_SECS",
                defaults.prioritize_cache_ttl_secs,
            )?,
            rescore_concurrency: parse_env("RESCORE_CONCURRENCY", defaults.rescore_concurrency)
                .and_then(|n: usize| {
                    if n == 0 {
                        anyhow::bail!("RESCORE_CONCURRENCY must be at least 1");
                    }
                    Ok(n)
                })?,
            scoring: ScoringConfig {
                behavior_strategy: parse_env(
                    "BEHAVIOR_SCORE_STRATEGY",
                    scoring_defaults.behavior_strategy,
                )?,
                behavior_score_default: score_in_range(
                    "BEHAVIOR_SCORE_DEFAULT",
                    parse_env(
                        "BEHAVIOR_SCORE_DEFAULT",
                        scoring_defaults.behavior_score_default,
                    )?,
                )?,
                intent_score_default: score_in_range(
                    "INTENT_SCORE_DEFAULT",
                    parse_env("INTENT_SCORE_DEFAULT", scoring_defaults.intent_score_default)?,
                )?,
                ..scoring_defaults
            },
        };

        if config.prioritize_default_limit > config.prioritize_max_limit {
            anyhow::bail!("PRIORITIZE_DEFAULT_LIMIT cannot exceed PRIORITIZE_MAX_LIMIT");
        }

        // Never log the full database URL, it carries credentials
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!(
            "Scoring: behavior={:?}/{} intent={}",
            config.scoring.behavior_strategy,
            config.scoring.behavior_score_default,
            config.scoring.intent_score_default
        );

        Ok(config)
    }
}
