use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use league_feed::binder::{FormValues, bind};
use league_feed::models::{Team, TeamPayload};
use league_feed::store::{CollectionStore, decode_list};

fn team_form() -> FormValues {
    FormValues::new()
        .with("name", "UD Songo")
        .with("position", "1")
        .with("games", "18")
        .with("wins", "15")
        .with("draws", "2")
        .with("losses", "1")
        .with("goals_for", "40")
        .with("goals_against", "10")
}

fn sample_teams() -> Vec<Team> {
    let raw = serde_json::from_str(TEAMS_JSON).expect("valid fixture json");
    decode_list::<Team>(raw).expect("fixture decodes")
}

fn bench_bind_team_form(c: &mut Criterion) {
    let values = team_form();
    c.bench_function("bind_team_form", |b| {
        b.iter(|| {
            let payload = bind::<TeamPayload>(black_box(&values)).unwrap();
            black_box(payload.position);
        })
    });
}

fn bench_decode_team_list(c: &mut Criterion) {
    c.bench_function("decode_team_list", |b| {
        b.iter(|| {
            let raw = serde_json::from_str(black_box(TEAMS_JSON)).unwrap();
            let teams = decode_list::<Team>(raw).unwrap();
            black_box(teams.len());
        })
    });
}

fn bench_store_upsert(c: &mut Criterion) {
    let base = sample_teams();
    let store = CollectionStore::<Team>::new();
    let mut rows = Vec::new();
    for idx in 0..200u64 {
        let mut team = base[(idx as usize) % base.len()].clone();
        team.id = idx + 1;
        rows.push(team);
    }
    store.seed(rows);

    c.bench_function("store_upsert", |b| {
        let mut next = 0u64;
        b.iter(|| {
            next = (next + 37) % 250;
            let mut team = base[0].clone();
            team.id = next + 1;
            store.upsert(black_box(team));
            black_box(store.len());
        })
    });
}

criterion_group!(
    perf,
    bench_bind_team_form,
    bench_decode_team_list,
    bench_store_upsert
);
criterion_main!(perf);

static TEAMS_JSON: &str = include_str!("../tests/fixtures/teams.json");
