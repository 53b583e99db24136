//! Layered configuration loading: defaults, then an optional YAML file, then
//! `ARIAS_*` environment overrides, then validation.

use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::Config;
use crate::validate::validate;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "ARIAS_";

/// Load configuration from `path` (when given) and the process environment.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, an override is
/// malformed, or the result fails validation.
pub fn load_config(path: Option<&Path>) -> ConfigResult<Config> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Like [`load_config`] with an injectable environment lookup.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, an override is
/// malformed, or the result fails validation.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> ConfigResult<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => Config::default(),
    };
    apply_env(&mut config, &lookup)?;
    validate(&config)?;
    Ok(config)
}

fn read_file(path: &Path) -> ConfigResult<Config> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Config::default());
    }
    debug!(path = %path.display(), "loaded configuration file");
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

struct Env<'a, F> {
    lookup: &'a F,
}

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, suffix: &str) -> Option<(String, String)> {
        let name = format!("{ENV_PREFIX}{suffix}");
        (self.lookup)(&name).map(|value| (name, value))
    }

    fn string(&self, suffix: &str, target: &mut String) {
        if let Some((_, value)) = self.get(suffix) {
            *target = value;
        }
    }

    fn optional(&self, suffix: &str, target: &mut Option<String>) {
        if let Some((_, value)) = self.get(suffix) {
            *target = (!value.is_empty()).then_some(value);
        }
    }

    fn flag(&self, suffix: &str, target: &mut bool) -> ConfigResult<()> {
        if let Some((name, value)) = self.get(suffix) {
            *target = parse_flag(&value).ok_or(ConfigError::InvalidEnv {
                name,
                value,
                reason: "expected a boolean",
            })?;
        }
        Ok(())
    }

    fn number<T: FromStr>(&self, suffix: &str, target: &mut T) -> ConfigResult<()> {
        if let Some((name, value)) = self.get(suffix) {
            *target = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name,
                value,
                reason: "expected a non-negative integer",
            })?;
        }
        Ok(())
    }

    fn parsed<T: FromStr>(
        &self,
        suffix: &str,
        target: &mut T,
        reason: &'static str,
    ) -> ConfigResult<()> {
        if let Some((name, value)) = self.get(suffix) {
            *target = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name, value, reason })?;
        }
        Ok(())
    }
}

fn apply_env<F>(config: &mut Config, lookup: &F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };
    env.string("SERVER_ADDR", &mut config.server_addr);

    env.string("ARIA2_URL", &mut config.aria2.url);
    env.optional("ARIA2_SECRET", &mut config.aria2.secret);
    env.optional("ARIA2_DOWNLOAD_DIR", &mut config.aria2.download_dir);

    env.parsed(
        "STORAGE_KIND",
        &mut config.storage.kind,
        "expected 'fs' or 'http'",
    )?;
    env.string("STORAGE_ROOT", &mut config.storage.root);
    env.optional("STORAGE_ENDPOINT", &mut config.storage.endpoint);
    env.optional("STORAGE_TOKEN", &mut config.storage.token);
    env.flag("STORAGE_COMPRESS", &mut config.storage.compress)?;

    env.string("DEFAULT_BUCKET", &mut config.default_bucket);
    env.flag("ALLOW_BUCKET_OVERRIDE", &mut config.allow_bucket_override)?;
    env.flag("ALLOW_NO_NAME", &mut config.allow_no_name)?;

    env.number("TASKS_MAX_CONCURRENT", &mut config.tasks.max_concurrent)?;
    env.number("TASKS_RETENTION_SECS", &mut config.tasks.retention_secs)?;
    env.number(
        "TASKS_PRUNE_INTERVAL_SECS",
        &mut config.tasks.prune_interval_secs,
    )?;
    env.number(
        "TASKS_CALLBACK_TIMEOUT_SECS",
        &mut config.tasks.callback_timeout_secs,
    )?;

    env.string("LOG_LEVEL", &mut config.logging.level);
    env.parsed(
        "LOG_FORMAT",
        &mut config.logging.format,
        "expected 'pretty' or 'json'",
    )?;
    Ok(())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
