use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
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
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    // Empty strings count as unset so `KEY=` in a .env file disables a collaborator.
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
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

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("LISTWATCH_ENV", "development"));

    let bind_addr = parse_addr("LISTWATCH_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("LISTWATCH_LOG_LEVEL", "info");
    let lists_path = PathBuf::from(or_default("LISTWATCH_LISTS_PATH", "./config/lists.yaml"));

    let db_max_connections = parse_u32("LISTWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("LISTWATCH_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("LISTWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let source_base_url = or_default(
        "LISTWATCH_SOURCE_BASE_URL",
        "https://twitter-api45.p.rapidapi.com",
    );
    let source_api_key = optional("LISTWATCH_SOURCE_API_KEY");
    let source_api_key_header = or_default("LISTWATCH_SOURCE_API_KEY_HEADER", "x-rapidapi-key");
    let source_page_delay_ms = parse_u64("LISTWATCH_SOURCE_PAGE_DELAY_MS", "1000")?;
    let source_max_pages = parse_usize("LISTWATCH_SOURCE_MAX_PAGES", "50")?;
    if source_max_pages == 0 {
        return Err(invalid(
            "LISTWATCH_SOURCE_MAX_PAGES",
            "must be at least 1".to_string(),
        ));
    }

    let llm_base_url = or_default("LISTWATCH_LLM_BASE_URL", "https://api.openai.com/v1");
    let llm_api_key = optional("OPENAI_API_KEY");
    let llm_model = or_default("LISTWATCH_LLM_MODEL", "gpt-4o-mini");

    let http_timeout_secs = parse_u64("LISTWATCH_HTTP_TIMEOUT_SECS", "30")?;
    let discord_webhook_url = optional("DISCORD_WEBHOOK_URL");
    let export_dir = PathBuf::from(or_default("LISTWATCH_EXPORT_DIR", "./exports"));
    let cycle_cron = or_default("LISTWATCH_CYCLE_CRON", "0 * * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        lists_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        source_base_url,
        source_api_key,
        source_api_key_header,
        source_page_delay_ms,
        source_max_pages,
        llm_base_url,
        llm_api_key,
        llm_model,
        http_timeout_secs,
        discord_webhook_url,
        export_dir,
        cycle_cron,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
