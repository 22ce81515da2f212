use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Article, MatchResult, Team};

pub const CACHE_DIR: &str = "league_feed";
const CACHE_FILE: &str = "cache.json";
const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheFile {
    version: u32,
    servers: HashMap<String, ServerCache>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ServerCache {
    #[serde(default)]
    articles: Vec<Article>,
    #[serde(default)]
    teams: Vec<Team>,
    #[serde(default)]
    results: Vec<MatchResult>,
    #[serde(default)]
    saved_at: Option<u64>,
}

/// Last successfully fetched contents of every collection for one server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CachedCollections {
    pub articles: Vec<Article>,
    pub teams: Vec<Team>,
    pub results: Vec<MatchResult>,
    pub saved_at: Option<SystemTime>,
}

impl CachedCollections {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty() && self.teams.is_empty() && self.results.is_empty()
    }
}

pub fn load_snapshot(base_url: &str) -> Option<CachedCollections> {
    let path = cache_path()?;
    load_snapshot_from(&path, base_url)
}

pub fn load_snapshot_from(path: &Path, base_url: &str) -> Option<CachedCollections> {
    let cache = load_cache_file(path)?;
    if cache.version != CACHE_VERSION {
        log::info!("ignoring cache version {} at {}", cache.version, path.display());
        return None;
    }
    let server = cache.servers.get(base_url)?;
    Some(CachedCollections {
        articles: server.articles.clone(),
        teams: server.teams.clone(),
        results: server.results.clone(),
        saved_at: server.saved_at.and_then(system_time_from_secs),
    })
}

pub fn save_snapshot(base_url: &str, snapshot: &CachedCollections) {
    let Some(path) = cache_path() else {
        return;
    };
    if let Err(err) = save_snapshot_to(&path, base_url, snapshot) {
        log::warn!("cache not saved: {err:#}");
    }
}

pub fn save_snapshot_to(path: &Path, base_url: &str, snapshot: &CachedCollections) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }

    let mut cache = load_cache_file(path)
        .filter(|cache| cache.version == CACHE_VERSION)
        .unwrap_or_default();
    cache.version = CACHE_VERSION;
    cache.servers.insert(
        base_url.to_string(),
        ServerCache {
            articles: snapshot.articles.clone(),
            teams: snapshot.teams.clone(),
            results: snapshot.results.clone(),
            saved_at: snapshot
                .saved_at
                .unwrap_or_else(SystemTime::now)
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs()),
        },
    );

    let json = serde_json::to_string(&cache).context("serialize cache")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
    Ok(())
}

fn load_cache_file(path: &Path) -> Option<CacheFile> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str::<CacheFile>(&raw).ok()
}

/// `$XDG_CACHE_HOME/league_feed`, falling back to `~/.cache/league_feed`.
pub fn cache_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn cache_path() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(CACHE_FILE))
}

fn system_time_from_secs(secs: u64) -> Option<SystemTime> {
    UNIX_EPOCH.checked_add(std::time::Duration::from_secs(secs))
}
