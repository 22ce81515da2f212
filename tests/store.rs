use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

use league_feed::error::SyncError;
use league_feed::fake_api::FakeApi;
use league_feed::models::{MatchResult, Team};
use league_feed::store::{CollectionStore, LoadStatus};
use league_feed::transport::{ApiRequest, RequestKind, Transport};
use league_feed::upload::StagedImage;

const WAIT: Duration = Duration::from_secs(5);

fn team_json(id: u64, name: &str, position: u32) -> Value {
    json!({
        "id": id,
        "nome": name,
        "posicao": position,
        "jogos": 10,
        "vitorias": 5,
        "empates": 3,
        "derrotas": 2,
        "gols_pro": 12,
        "gols_contra": 8,
        "logo_url": null
    })
}

/// First list call parks until released and answers with two teams; every later call
/// answers immediately with one.
struct TwoResponses {
    calls: AtomicUsize,
    gate: Mutex<Option<Receiver<()>>>,
    entered: Mutex<Option<Sender<()>>>,
}

impl Transport for TwoResponses {
    fn send(&self, _request: &ApiRequest) -> Result<Value, SyncError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(entered) = self.entered.lock().expect("entered lock").take() {
                let _ = entered.send(());
            }
            let gate = self.gate.lock().expect("gate lock").take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            return Ok(json!([team_json(1, "Stale FC", 1), team_json(2, "Fresh FC", 2)]));
        }
        Ok(json!([team_json(2, "Fresh FC", 1)]))
    }

    fn upload(&self, _image: &StagedImage) -> Result<String, SyncError> {
        Err(SyncError::network("uploads not supported"))
    }
}

#[test]
fn load_replaces_contents_and_clears_status() {
    let api = FakeApi::seeded();
    let store = CollectionStore::<Team>::new();

    let teams = store.load(&api).expect("seeded teams should load");
    assert_eq!(teams.len(), 14);
    assert_eq!(teams[0].position, 1);
    assert_eq!(store.status(), LoadStatus::Idle);
    assert!(store.last_error().is_none());
    assert_eq!(store.snapshot().revision, 1);
}

#[test]
fn failed_load_keeps_previous_contents() {
    let api = FakeApi::seeded();
    let store = CollectionStore::<Team>::new();
    store.load(&api).expect("first load should succeed");

    api.fail_next(RequestKind::List, SyncError::network("connection reset"));
    let err = store.load(&api).expect_err("second load should fail");
    assert!(matches!(err, SyncError::Network { .. }));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.records.len(), 14);
    assert_eq!(snapshot.status, LoadStatus::Error);
    assert_eq!(snapshot.error, Some(err));

    store.load(&api).expect("third load should succeed");
    assert_eq!(store.status(), LoadStatus::Idle);
}

#[test]
fn concurrent_loads_share_one_request() {
    let api = Arc::new(FakeApi::seeded());
    let store = CollectionStore::<MatchResult>::new();
    let held = api.hold_next(RequestKind::List);

    let first = {
        let api = Arc::clone(&api);
        let store = store.clone();
        thread::spawn(move || store.load(api.as_ref()))
    };
    assert!(held.wait_entered(WAIT), "first load should reach the server");
    assert_eq!(store.status(), LoadStatus::Loading);

    let second = {
        let api = Arc::clone(&api);
        let store = store.clone();
        thread::spawn(move || store.load(api.as_ref()))
    };
    thread::sleep(Duration::from_millis(50));
    held.release();

    let a = first.join().expect("first loader").expect("first load");
    let b = second.join().expect("second loader").expect("second load");
    assert_eq!(a, b);
    assert_eq!(api.calls(RequestKind::List), 1);
}

#[test]
fn stale_refresh_response_is_discarded() {
    let (release_tx, release_rx) = mpsc::channel();
    let (entered_tx, entered_rx) = mpsc::channel();
    let api = Arc::new(TwoResponses {
        calls: AtomicUsize::new(0),
        gate: Mutex::new(Some(release_rx)),
        entered: Mutex::new(Some(entered_tx)),
    });
    let store = CollectionStore::<Team>::new();

    let stale = {
        let api = Arc::clone(&api);
        let store = store.clone();
        thread::spawn(move || store.refresh(api.as_ref()))
    };
    entered_rx
        .recv_timeout(WAIT)
        .expect("first refresh should reach the server");

    let newest = store.refresh(api.as_ref()).expect("newest refresh");
    assert_eq!(newest.len(), 1);
    release_tx.send(()).expect("release first response");

    let stale_view = stale.join().expect("stale loader").expect("stale refresh");
    assert_eq!(stale_view, newest);
    assert_eq!(store.len(), 1);
    assert!(store.get(1).is_none());
    assert!(store.get(2).is_some());
}

#[test]
fn upsert_and_remove_touch_one_record() {
    let api = FakeApi::seeded();
    let store = CollectionStore::<Team>::new();
    store.load(&api).expect("load");
    let before = store.snapshot().revision;

    let mut team = store.get(3).expect("team 3 exists");
    team.wins += 1;
    team.games += 1;
    store.upsert(team.clone());
    assert_eq!(store.get(3), Some(team));
    assert_eq!(store.len(), 14);

    store.remove(3);
    store.remove(3);
    assert!(store.get(3).is_none());
    assert_eq!(store.len(), 13);
    assert_eq!(store.snapshot().revision, before + 2);
}

#[test]
fn seed_hydrates_without_network() {
    let api = FakeApi::new();
    let store = CollectionStore::<Team>::new();
    let cached = FakeApi::seeded();
    let teams = CollectionStore::<Team>::new()
        .load(&cached)
        .expect("seeded teams");

    store.seed(teams.clone());
    assert_eq!(store.records(), teams);
    assert_eq!(store.status(), LoadStatus::Idle);
    assert_eq!(api.calls(RequestKind::List), 0);
}

/// First list call parks until released and then panics; later calls answer normally.
struct PanicsOnce {
    calls: AtomicUsize,
    gate: Mutex<Option<Receiver<()>>>,
    entered: Mutex<Option<Sender<()>>>,
}

impl Transport for PanicsOnce {
    fn send(&self, _request: &ApiRequest) -> Result<Value, SyncError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(entered) = self.entered.lock().expect("entered lock").take() {
                let _ = entered.send(());
            }
            let gate = self.gate.lock().expect("gate lock").take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            panic!("transport blew up mid-request");
        }
        Ok(json!([team_json(3, "Survivor FC", 1)]))
    }

    fn upload(&self, _image: &StagedImage) -> Result<String, SyncError> {
        Err(SyncError::network("uploads not supported"))
    }
}

#[test]
fn panicking_fetch_does_not_strand_joined_loads() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel();
    let transport = Arc::new(PanicsOnce {
        calls: AtomicUsize::new(0),
        gate: Mutex::new(Some(gate_rx)),
        entered: Mutex::new(Some(entered_tx)),
    });
    let store = CollectionStore::<Team>::new();

    let crashing = {
        let store = store.clone();
        let transport = Arc::clone(&transport);
        thread::spawn(move || store.load(transport.as_ref()))
    };
    entered_rx.recv_timeout(WAIT).expect("first fetch should start");

    let (done_tx, done_rx) = mpsc::channel();
    let joiner = {
        let store = store.clone();
        let transport = Arc::clone(&transport);
        thread::spawn(move || {
            let _ = done_tx.send(store.load(transport.as_ref()));
        })
    };
    drop(gate_tx);

    assert!(crashing.join().is_err(), "first fetch should panic");
    let outcome = done_rx
        .recv_timeout(WAIT)
        .expect("joined load should return instead of hanging");
    joiner.join().expect("joiner thread");
    match outcome {
        Ok(teams) => assert_eq!(teams[0].name, "Survivor FC"),
        Err(err) => assert!(matches!(err, SyncError::Network { .. })),
    }
    assert_ne!(store.status(), LoadStatus::Loading);

    let teams = store.load(transport.as_ref()).expect("later load fetches again");
    assert_eq!(teams[0].name, "Survivor FC");
}
