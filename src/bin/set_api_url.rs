use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use league_feed::config::{self, API_BASE_URL_KEY};
use league_feed::logging;

const DEFAULT_ENV_FILE: &str = ".env.local";

fn main() -> Result<()> {
    logging::init_stderr_logger();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(raw_url) = args.iter().find(|arg| !arg.starts_with("--")) else {
        bail!("usage: set_api_url <url> [--env-file=<path>]");
    };
    let url = config::normalize_base_url(raw_url)?;
    let env_path = parse_env_file_arg(&args).unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE));

    let current = match fs::read_to_string(&env_path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("read {}", env_path.display()));
        }
    };
    let updated = config::upsert_env_line(&current, API_BASE_URL_KEY, &url);
    if updated == current {
        log::info!("{} already points at {url}", env_path.display());
        return Ok(());
    }
    fs::write(&env_path, updated).with_context(|| format!("write {}", env_path.display()))?;

    log::info!("wrote {API_BASE_URL_KEY}={url} to {}", env_path.display());
    println!("API URL set to {url}");
    println!("File: {}", env_path.display());
    Ok(())
}

fn parse_env_file_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .filter_map(|arg| arg.strip_prefix("--env-file="))
        .map(str::trim)
        .find(|path| !path.is_empty())
        .map(PathBuf::from)
}
