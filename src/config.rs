use std::env;
use std::time::Duration;

use crate::EngineError;

/// Environment variables read by the loader on every render.
pub const BASE_DIR_VAR: &str = "LAMB_BASE_DIR";
pub const CACHE_DIR_VAR: &str = "LAMB_CACHE_DIR";
pub const CACHE_TIME_VAR: &str = "LAMB_CACHE_TIME";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Root of the template tree.
    pub dir: String,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Render cache directory, `.cache` when unset.
    pub dir: Option<String>,
    /// Freshness window as a duration string, e.g. `5m` or `1h`.
    pub time: String,
}

/// Validates the configuration and publishes it to the process environment.
pub fn init(config: &Config) -> Result<(), EngineError> {
    if config.dir.is_empty() {
        return Err(EngineError::Config("missing config: dir".to_string()));
    }

    if let Some(cache) = &config.cache {
        if cache.time.is_empty() {
            return Err(EngineError::Config(
                "cache: missing config: time".to_string(),
            ));
        }
        if parse_duration(&cache.time).is_err() {
            return Err(EngineError::Config(
                "cache: time must be a valid duration".to_string(),
            ));
        }

        env::set_var(CACHE_DIR_VAR, cache.dir.as_deref().unwrap_or(".cache"));
        env::set_var(CACHE_TIME_VAR, &cache.time);
    }

    env::set_var(BASE_DIR_VAR, &config.dir);

    Ok(())
}

/// Parses a duration string made of `<number><unit>` segments, e.g. `300ms`,
/// `90s`, `1h30m`, `1.5h`. Units are `ns`, `us`, `ms`, `s`, `m` and `h`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0.0f64;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(digits);
        let value = number
            .parse::<f64>()
            .map_err(|_| format!("invalid number in duration '{input}'"))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let seconds = match unit {
            "ns" => 1e-9,
            "us" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration '{input}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };

        total += value * seconds;
        rest = tail;
    }

    Duration::try_from_secs_f64(total).map_err(|_| format!("duration '{input}' out of range"))
}
