use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Default user agent: upstream serves its JSON endpoints only to
/// browser-looking clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a
/// `HashMap` lookup.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let database_url = lookup("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
    let env = parse_environment(&or_default("PFDB_ENV", "development"))?;
    let log_level = or_default("PFDB_LOG_LEVEL", "info");
    let watchlist_path = PathBuf::from(or_default(
        "PFDB_WATCHLIST_PATH",
        "./config/watchlist.yaml",
    ));

    let db_max_connections = parse_u32("PFDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PFDB_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("PFDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let upstream_base_url = or_default("PFDB_UPSTREAM_BASE_URL", "https://www.instagram.com")
        .trim_end_matches('/')
        .to_string();
    let upstream_app_id = or_default("PFDB_UPSTREAM_APP_ID", "936619743392459");

    let scraper_request_timeout_secs = parse_u64("PFDB_SCRAPER_REQUEST_TIMEOUT_SECS", "10")?;
    let scraper_user_agent = or_default("PFDB_SCRAPER_USER_AGENT", DEFAULT_USER_AGENT);
    let scraper_max_retries = parse_u32("PFDB_SCRAPER_MAX_RETRIES", "1")?;
    let scraper_retry_backoff_base_ms = parse_u64("PFDB_SCRAPER_RETRY_BACKOFF_BASE_MS", "1000")?;

    let rate_limit_window_secs = parse_u64("PFDB_RATE_LIMIT_WINDOW_SECS", "60")?;
    let rate_limit_max_calls = parse_usize("PFDB_RATE_LIMIT_MAX_CALLS", "20")?;
    if rate_limit_window_secs == 0 || rate_limit_max_calls == 0 {
        return Err(ConfigError::Validation(
            "rate limit window and max calls must both be positive".to_string(),
        ));
    }

    let content_target = parse_usize("PFDB_CONTENT_TARGET", "40")?;

    let freshness_min_interval_secs = or_default("PFDB_FRESHNESS_MIN_INTERVAL_SECS", "14400")
        .parse::<i64>()
        .map_err(|e| invalid("PFDB_FRESHNESS_MIN_INTERVAL_SECS", e.to_string()))?;
    if freshness_min_interval_secs < 0 {
        return Err(invalid(
            "PFDB_FRESHNESS_MIN_INTERVAL_SECS",
            "must not be negative".to_string(),
        ));
    }
    let freshness_daily_quota = parse_u32("PFDB_FRESHNESS_DAILY_QUOTA", "6")?;
    let quota_utc_offset_minutes = or_default("PFDB_QUOTA_UTC_OFFSET_MINUTES", "0")
        .parse::<i32>()
        .map_err(|e| invalid("PFDB_QUOTA_UTC_OFFSET_MINUTES", e.to_string()))?;
    if !(-14 * 60..=14 * 60).contains(&quota_utc_offset_minutes) {
        return Err(invalid(
            "PFDB_QUOTA_UTC_OFFSET_MINUTES",
            "must be within +/- 840 minutes".to_string(),
        ));
    }

    let mirror_enabled = parse_bool("PFDB_MIRROR_ENABLED", "true")?;
    let mirror_inter_item_delay_ms = parse_u64("PFDB_MIRROR_INTER_ITEM_DELAY_MS", "1500")?;
    let mirror_timeout_secs = parse_u64("PFDB_MIRROR_TIMEOUT_SECS", "30")?;
    let asset_root = PathBuf::from(or_default("PFDB_ASSET_ROOT", "./data/assets"));
    let asset_public_base_url = or_default(
        "PFDB_ASSET_PUBLIC_BASE_URL",
        "http://localhost:8080/assets",
    )
    .trim_end_matches('/')
    .to_string();

    let max_concurrent_handles = parse_usize("PFDB_MAX_CONCURRENT_HANDLES", "2")?.max(1);
    let watch_schedule = or_default("PFDB_WATCH_SCHEDULE", "0 0 * * * *");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        watchlist_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        upstream_base_url,
        upstream_app_id,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        rate_limit_window_secs,
        rate_limit_max_calls,
        content_target,
        freshness_min_interval_secs,
        freshness_daily_quota,
        quota_utc_offset_minutes,
        mirror_enabled,
        mirror_inter_item_delay_ms,
        mirror_timeout_secs,
        asset_root,
        asset_public_base_url,
        max_concurrent_handles,
        watch_schedule,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PFDB_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
