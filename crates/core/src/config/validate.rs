use regex_lite::Regex;

use super::{types::Config, ConfigError, DownloadBackendKind};

/// Validate configuration.
///
/// Everything rejected here would otherwise fail on the first cycle, so
/// problems surface at startup instead.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let crawler = &config.crawler;
    if crawler.threshold == 0 {
        return Err(invalid("crawler.threshold must be at least 1"));
    }
    if crawler.delay_secs == 0 {
        return Err(invalid("crawler.delay_secs must be at least 1"));
    }
    match reqwest::Url::parse(&crawler.base_url) {
        Ok(url) if url.has_host() => {}
        _ => {
            return Err(invalid(&format!(
                "crawler.base_url is not a valid URL: {:?}",
                crawler.base_url
            )))
        }
    }
    if !crawler.context_url.contains("{offset}") {
        return Err(invalid("crawler.context_url must contain {offset}"));
    }
    if !crawler.ignore_pattern.is_empty() {
        Regex::new(&crawler.ignore_pattern).map_err(|e| {
            invalid(&format!("crawler.ignore_pattern is invalid: {}", e))
        })?;
    }
    if let Some(meta) = &crawler.meta {
        for rule in &meta.rules {
            Regex::new(&rule.pattern).map_err(|e| {
                invalid(&format!("crawler.meta rule {:?} is invalid: {}", rule.name, e))
            })?;
        }
    }

    let download = &config.download;
    match download.backend {
        DownloadBackendKind::Transmission if download.transmission.is_none() => {
            return Err(invalid(
                "download.backend is transmission but [download.transmission] is missing",
            ));
        }
        DownloadBackendKind::QBittorrent if download.qbittorrent.is_none() => {
            return Err(invalid(
                "download.backend is qbittorrent but [download.qbittorrent] is missing",
            ));
        }
        _ => {}
    }

    if config.notify.queue_size == 0 {
        return Err(invalid("notify.queue_size must be at least 1"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
