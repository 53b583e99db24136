//! Configuration checks run after every layer has been applied.

use std::net::SocketAddr;

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Config, StorageKind};

/// Reject configurations the service cannot run with.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] naming the first offending field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.default_bucket.trim().is_empty() {
        return Err(ConfigError::invalid(
            "root",
            "default_bucket",
            None,
            "must not be empty",
        ));
    }
    if config.default_bucket.contains('/') {
        return Err(ConfigError::invalid(
            "root",
            "default_bucket",
            Some(&config.default_bucket),
            "must not contain '/'",
        ));
    }
    if config.server_addr.parse::<SocketAddr>().is_err() {
        return Err(ConfigError::invalid(
            "root",
            "server_addr",
            Some(&config.server_addr),
            "must be a socket address such as 0.0.0.0:7200",
        ));
    }

    match Url::parse(&config.aria2.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
        _ => {
            return Err(ConfigError::invalid(
                "aria2",
                "url",
                Some(&config.aria2.url),
                "must be a ws:// or wss:// url",
            ));
        }
    }

    match config.storage.kind {
        StorageKind::Fs if config.storage.root.trim().is_empty() => {
            return Err(ConfigError::invalid(
                "storage",
                "root",
                None,
                "required for the fs backend",
            ));
        }
        StorageKind::Http => {
            let Some(endpoint) = &config.storage.endpoint else {
                return Err(ConfigError::invalid(
                    "storage",
                    "endpoint",
                    None,
                    "required for the http backend",
                ));
            };
            if !Url::parse(endpoint).is_ok_and(|url| matches!(url.scheme(), "http" | "https")) {
                return Err(ConfigError::invalid(
                    "storage",
                    "endpoint",
                    Some(endpoint),
                    "must be an http:// or https:// url",
                ));
            }
        }
        StorageKind::Fs => {}
    }

    if config.tasks.max_concurrent == 0 {
        return Err(ConfigError::invalid(
            "tasks",
            "max_concurrent",
            Some("0"),
            "must be at least 1",
        ));
    }
    if config.tasks.prune_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "tasks",
            "prune_interval_secs",
            Some("0"),
            "must be at least 1",
        ));
    }
    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::invalid(
            "logging",
            "level",
            None,
            "must not be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            default_bucket: "media".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_with_bucket_are_valid() {
        assert!(validate(&valid()).is_ok());
        let mut secure = valid();
        secure.aria2.url = "wss://daemon.example:443/jsonrpc".to_string();
        assert!(validate(&secure).is_ok());
    }

    #[test]
    fn each_rule_names_its_field() {
        let cases: [(fn(&mut Config), &str); 8] = [
            (|c| c.default_bucket = "  ".to_string(), "default_bucket"),
            (|c| c.default_bucket = "a/b".to_string(), "default_bucket"),
            (|c| c.server_addr = ":7200".to_string(), "server_addr"),
            (|c| c.aria2.url = "http://localhost:6800/jsonrpc".to_string(), "url"),
            (
                |c| {
                    c.storage.kind = StorageKind::Http;
                    c.storage.endpoint = None;
                },
                "endpoint",
            ),
            (
                |c| {
                    c.storage.kind = StorageKind::Http;
                    c.storage.endpoint = Some("ftp://store".to_string());
                },
                "endpoint",
            ),
            (|c| c.tasks.max_concurrent = 0, "max_concurrent"),
            (|c| c.tasks.prune_interval_secs = 0, "prune_interval_secs"),
        ];
        for (mutate, expected) in cases {
            let mut config = valid();
            mutate(&mut config);
            match validate(&config) {
                Err(ConfigError::InvalidField { field, .. }) => assert_eq!(field, expected),
                other => panic!("{expected}: unexpected {other:?}"),
            }
        }
    }
}
