use std::fs;
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use league_feed::models::Team;
use league_feed::persist::{CachedCollections, load_snapshot_from, save_snapshot_to};

fn temp_cache(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("league_feed_persist_{}_{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir.join("cache.json")
}

fn team(id: u64, name: &str) -> Team {
    Team {
        id,
        name: name.to_string(),
        position: id as u32,
        games: 4,
        wins: 2,
        draws: 1,
        losses: 1,
        goals_for: 6,
        goals_against: 4,
        logo_url: None,
    }
}

fn snapshot(teams: Vec<Team>) -> CachedCollections {
    CachedCollections {
        teams,
        saved_at: Some(UNIX_EPOCH + Duration::from_secs(1_730_000_000)),
        ..CachedCollections::default()
    }
}

#[test]
fn saved_snapshot_loads_back_for_same_server() {
    let path = temp_cache("roundtrip");
    let saved = snapshot(vec![team(1, "UD Songo"), team(2, "Ferroviário")]);
    save_snapshot_to(&path, "http://localhost:8000", &saved).expect("cache should save");

    let loaded = load_snapshot_from(&path, "http://localhost:8000").expect("cache should load");
    assert_eq!(loaded, saved);
    assert!(!path.with_extension("json.tmp").exists());
}

#[test]
fn servers_are_cached_separately() {
    let path = temp_cache("servers");
    save_snapshot_to(&path, "http://a.local", &snapshot(vec![team(1, "A")])).expect("save a");
    save_snapshot_to(&path, "http://b.local", &snapshot(vec![team(2, "B")])).expect("save b");

    let a = load_snapshot_from(&path, "http://a.local").expect("a cached");
    let b = load_snapshot_from(&path, "http://b.local").expect("b cached");
    assert_eq!(a.teams[0].name, "A");
    assert_eq!(b.teams[0].name, "B");
    assert!(load_snapshot_from(&path, "http://c.local").is_none());
}

#[test]
fn other_versions_and_garbage_are_ignored() {
    let path = temp_cache("versions");
    fs::create_dir_all(path.parent().expect("parent")).expect("dir");

    fs::write(&path, r#"{"version": 99, "servers": {"http://a.local": {}}}"#).expect("write");
    assert!(load_snapshot_from(&path, "http://a.local").is_none());

    fs::write(&path, "not json").expect("write");
    assert!(load_snapshot_from(&path, "http://a.local").is_none());

    save_snapshot_to(&path, "http://a.local", &snapshot(vec![team(3, "C")]))
        .expect("unreadable cache is replaced");
    let loaded = load_snapshot_from(&path, "http://a.local").expect("fresh cache");
    assert_eq!(loaded.teams.len(), 1);
    assert!(loaded.articles.is_empty());
}

#[test]
fn empty_snapshot_reports_empty() {
    assert!(CachedCollections::default().is_empty());
    assert!(!snapshot(vec![team(1, "A")]).is_empty());
}
