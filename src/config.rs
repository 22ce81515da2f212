use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const API_BASE_URL_KEY: &str = "LEAGUE_API_BASE_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_UPLOAD_MAX_MB: u64 = 16;
const DEFAULT_POLL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub timeout: Duration,
    pub max_upload_bytes: u64,
    pub poll_interval: Duration,
    pub offline: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_upload_bytes: DEFAULT_UPLOAD_MAX_MB * 1024 * 1024,
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            offline: false,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let raw_url = env::var(API_BASE_URL_KEY)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = normalize_base_url(&raw_url)
            .with_context(|| format!("invalid {API_BASE_URL_KEY}"))?;

        let timeout_secs = env::var("LEAGUE_API_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, 120);
        let upload_mb = env::var("LEAGUE_UPLOAD_MAX_MB")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_UPLOAD_MAX_MB)
            .clamp(1, 64);
        let poll_secs = env::var("LEAGUE_POLL_SECS")
            .ok()
            .and_then(|val| val.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_SECS)
            .max(10);

        Ok(Self {
            api_base_url,
            timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes: upload_mb * 1024 * 1024,
            poll_interval: Duration::from_secs(poll_secs),
            offline: env_bool("LEAGUE_OFFLINE", false),
        })
    }

    /// Applies `--api-url` and `--offline` on top of the env-derived values.
    pub fn apply_args<I, S>(mut self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string())
            .collect::<Vec<_>>();
        for (idx, arg) in args.iter().enumerate() {
            if arg == "--offline" {
                self.offline = true;
                continue;
            }
            let value = if let Some(url) = arg.strip_prefix("--api-url=") {
                Some(url.to_string())
            } else if arg == "--api-url" {
                let Some(next) = args.get(idx + 1) else {
                    bail!("--api-url expects a value");
                };
                Some(next.clone())
            } else {
                None
            };
            if let Some(value) = value {
                self.api_base_url = normalize_base_url(&value)?;
            }
        }
        Ok(self)
    }
}

pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("api url is empty");
    }
    let url = Url::parse(trimmed).with_context(|| format!("not a valid url: {trimmed}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("unsupported url scheme: {}", url.scheme());
    }
    if url.host_str().is_none() {
        bail!("url has no host: {trimmed}");
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Replaces (or appends) `key=value` in the contents of a dotenv file, leaving every
/// other line untouched.
pub fn upsert_env_line(contents: &str, key: &str, value: &str) -> String {
    let new_line = format!("{key}={value}");
    let mut replaced = false;
    let mut lines = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim_start();
        let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let is_key = assignment
            .split_once('=')
            .is_some_and(|(name, _)| name.trim() == key);
        if is_key {
            if !replaced {
                lines.push(new_line.clone());
                replaced = true;
            }
            continue;
        }
        lines.push(line.to_string());
    }
    if !replaced {
        lines.push(new_line);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(val) => matches!(
            val.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
