use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::SyncError;
use crate::models::{Article, Collection, MatchResult, RecordId, Role, Team, User};
use crate::transport::{ApiRequest, RequestKind, Transport};
use crate::upload::StagedImage;

pub const FAKE_UPLOAD_BASE: &str = "memory://league";

const ARTICLE_KEYS: [&str; 3] = ["titulo", "conteudo", "autor"];
const TEAM_KEYS: [&str; 8] = [
    "nome",
    "posicao",
    "jogos",
    "vitorias",
    "empates",
    "derrotas",
    "gols_pro",
    "gols_contra",
];
const RESULT_KEYS: [&str; 6] = [
    "ronda",
    "time_casa",
    "time_fora",
    "gols_casa",
    "gols_fora",
    "data_jogo",
];

#[derive(Debug, Clone)]
struct FakeUser {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
struct FakeState {
    articles: Vec<Article>,
    teams: Vec<Team>,
    results: Vec<MatchResult>,
    users: Vec<FakeUser>,
    next_id: RecordId,
    upload_seq: u64,
    calls: HashMap<RequestKind, usize>,
    failures: VecDeque<(RequestKind, SyncError)>,
}

struct PendingHold {
    kind: RequestKind,
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Handle on a request parked inside [`FakeApi`]. Dropping it lets the request go.
pub struct HeldRequest {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl HeldRequest {
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    pub fn release(self) {}
}

impl Drop for HeldRequest {
    fn drop(&mut self) {
        let _ = self.release.send(());
    }
}

/// In-memory league backend answering with the same JSON shapes as the real server,
/// including its ack-only creates and partial article updates. Backs the
/// offline mode and the test-suite; failures can be injected and requests parked.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
    holds: Mutex<Vec<PendingHold>>,
}

impl FakeApi {
    pub fn new() -> Self {
        let api = Self::default();
        api.lock().next_id = 1;
        api
    }

    pub fn seeded() -> Self {
        let api = Self::new();
        {
            let mut state = api.lock();
            let teams: [(&str, u32, [u32; 6]); 14] = [
                ("UD Songo", 1, [18, 15, 2, 1, 40, 10]),
                ("Ferroviário", 2, [18, 8, 6, 4, 15, 9]),
                ("Black Bulls", 3, [15, 8, 3, 4, 24, 16]),
                ("Ferroviário Beira", 4, [18, 6, 6, 6, 17, 15]),
                ("Ferroviário Lichingenda", 5, [18, 6, 6, 6, 17, 15]),
                ("Costa do Sol", 6, [16, 7, 5, 4, 20, 15]),
                ("Liga Muçulmana", 7, [16, 7, 4, 5, 18, 16]),
                ("Desportivo Nampula", 8, [16, 6, 6, 4, 19, 16]),
                ("Chibuto", 9, [16, 5, 7, 4, 16, 14]),
                ("Maxaquene", 10, [16, 5, 6, 5, 15, 16]),
                ("Textáfrica", 11, [16, 4, 8, 4, 14, 15]),
                ("Palmeiras", 12, [16, 4, 7, 5, 13, 16]),
                ("Estrela Vermelha", 13, [16, 3, 8, 5, 12, 18]),
                ("Nacala", 14, [16, 2, 5, 9, 11, 25]),
            ];
            for (name, position, [games, wins, draws, losses, gf, ga]) in teams {
                let id = state.take_id();
                state.teams.push(Team {
                    id,
                    name: name.to_string(),
                    position,
                    games,
                    wins,
                    draws,
                    losses,
                    goals_for: gf,
                    goals_against: ga,
                    logo_url: None,
                });
            }

            let results = [
                (19, "Desportivo Matola", "UD Songo", 0, 4, "2024-10-28"),
                (9, "ENH Vilankulo", "Baia de Pemba", 1, 0, "2024-10-28"),
                (18, "Ferroviario Beira", "Ferroviario Nampula", 2, 1, "2024-10-26"),
                (18, "Costa do Sol", "Desportivo Matola", 2, 1, "2024-10-25"),
                (10, "Baia de Pemba", "UD Songo", 0, 2, "2024-10-24"),
                (18, "Nacala", "Ferroviario Lichinga", 2, 2, "2024-10-24"),
            ];
            for (round, home, away, home_goals, away_goals, date) in results {
                let id = state.take_id();
                state.results.push(MatchResult {
                    id,
                    round,
                    home_team: home.to_string(),
                    away_team: away.to_string(),
                    home_goals,
                    away_goals,
                    match_date: date.to_string(),
                    home_logo: None,
                    away_logo: None,
                });
            }

            let id = state.take_id();
            state.articles.push(Article {
                id,
                title: "Season round-up".to_string(),
                body: "UD Songo keep their lead at the top of the table after a 4-0 away win."
                    .to_string(),
                author: "Newsroom".to_string(),
                image_url: None,
                created_at: Some("2024-10-28 18:00:00".to_string()),
            });

            for (email, name, role) in [
                ("admin@mozafut.com", "Administrador", Role::Admin),
                ("user@mozafut.com", "Usuário", Role::Standard),
            ] {
                let id = state.take_id();
                state.users.push(FakeUser {
                    user: User {
                        id,
                        email: email.to_string(),
                        name: name.to_string(),
                        phone: Some("+258 84 123 4567".to_string()),
                        role,
                    },
                    password: "123456".to_string(),
                });
            }
        }
        api
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next request of `kind` fail with `err` without touching any data.
    pub fn fail_next(&self, kind: RequestKind, err: SyncError) {
        self.lock().failures.push_back((kind, err));
    }

    /// Parks the next request of `kind` until the returned handle is released.
    pub fn hold_next(&self, kind: RequestKind) -> HeldRequest {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.holds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PendingHold {
                kind,
                entered: entered_tx,
                release: release_rx,
            });
        HeldRequest {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub fn calls(&self, kind: RequestKind) -> usize {
        self.lock().calls.get(&kind).copied().unwrap_or_default()
    }

    pub fn insert_team(&self, mut team: Team) -> RecordId {
        let mut state = self.lock();
        team.id = state.take_id();
        let id = team.id;
        state.teams.push(team);
        id
    }

    /// Edits stored data directly, as another client would.
    pub fn remove_direct(&self, collection: Collection, id: RecordId) {
        let mut state = self.lock();
        match collection {
            Collection::Articles => state.articles.retain(|a| a.id != id),
            Collection::Teams => state.teams.retain(|t| t.id != id),
            Collection::Results => state.results.retain(|r| r.id != id),
        }
    }

    fn enter(&self, kind: RequestKind) -> Result<(), SyncError> {
        *self.lock().calls.entry(kind).or_default() += 1;

        let hold = {
            let mut holds = self.holds.lock().unwrap_or_else(PoisonError::into_inner);
            holds
                .iter()
                .position(|hold| hold.kind == kind)
                .map(|idx| holds.remove(idx))
        };
        if let Some(hold) = hold {
            let _ = hold.entered.send(());
            let _ = hold.release.recv();
        }

        let mut state = self.lock();
        if let Some(idx) = state.failures.iter().position(|(k, _)| *k == kind) {
            if let Some((_, err)) = state.failures.remove(idx) {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl FakeState {
    fn take_id(&mut self) -> RecordId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        id
    }

    fn list(&self, collection: Collection) -> Result<Value, SyncError> {
        match collection {
            Collection::Articles => {
                let mut rows = self.articles.clone();
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
                to_value(&rows)
            }
            Collection::Teams => {
                let mut rows = self.teams.clone();
                rows.sort_by_key(|t| t.position);
                // Stored columns the client derives itself.
                let rows = rows
                    .iter()
                    .map(|team| {
                        let mut row = to_value(team)?;
                        if let Some(obj) = row.as_object_mut() {
                            obj.insert("diferenca_gols".to_string(), json!(team.goal_difference()));
                            obj.insert("pontos".to_string(), json!(team.points()));
                        }
                        Ok(row)
                    })
                    .collect::<Result<Vec<_>, SyncError>>()?;
                Ok(Value::Array(rows))
            }
            Collection::Results => {
                let mut rows = self.results.clone();
                rows.sort_by(|a, b| {
                    b.round
                        .cmp(&a.round)
                        .then_with(|| b.match_date.cmp(&a.match_date))
                });
                to_value(&rows)
            }
        }
    }

    fn create(&mut self, collection: Collection, body: &Value) -> Result<Value, SyncError> {
        require_keys(collection, body)?;
        let id = self.take_id();
        match collection {
            Collection::Articles => {
                let mut article: Article = with_id(body, id)?;
                article.created_at = Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string());
                let response = to_value(&article)?;
                self.articles.push(article);
                Ok(response)
            }
            Collection::Teams => {
                let team: Team = with_id(body, id)?;
                self.teams.push(team);
                Ok(json!({"message": "Team created", "id": id}))
            }
            Collection::Results => {
                let result: MatchResult = with_id(body, id)?;
                self.results.push(result);
                Ok(json!({"message": "Result created"}))
            }
        }
    }

    fn update(
        &mut self,
        collection: Collection,
        id: RecordId,
        body: &Value,
    ) -> Result<Value, SyncError> {
        match collection {
            Collection::Articles => {
                require_keys(collection, body)?;
                let idx = find(&self.articles, id, |a| a.id)?;
                // The image is only set on create; updates leave it and do not echo it.
                let mut article: Article = with_id(body, id)?;
                article.image_url = self.articles[idx].image_url.clone();
                article.created_at = self.articles[idx].created_at.clone();
                let response = json!({
                    "id": article.id,
                    "titulo": article.title,
                    "conteudo": article.body,
                    "autor": article.author,
                    "data_criacao": article.created_at,
                });
                self.articles[idx] = article;
                Ok(response)
            }
            Collection::Teams => {
                require_keys(collection, body)?;
                let idx = find(&self.teams, id, |t| t.id)?;
                self.teams[idx] = with_id(body, id)?;
                Ok(json!({"message": "Team updated"}))
            }
            Collection::Results => {
                if !body.as_object().is_some_and(|obj| !obj.is_empty()) {
                    return Err(SyncError::server(400, "No data provided"));
                }
                // Unknown ids are a silent no-op, as on the server.
                if let Ok(idx) = find(&self.results, id, |r| r.id) {
                    self.results[idx] = with_id(body, id)?;
                }
                Ok(json!({"message": "Result updated"}))
            }
        }
    }

    fn delete(&mut self, collection: Collection, id: RecordId) -> Result<Value, SyncError> {
        match collection {
            Collection::Articles => {
                let idx = find(&self.articles, id, |a| a.id)?;
                self.articles.remove(idx);
            }
            Collection::Teams => {
                let idx = find(&self.teams, id, |t| t.id)?;
                self.teams.remove(idx);
            }
            Collection::Results => self.results.retain(|r| r.id != id),
        }
        Ok(json!({"message": format!("{} deleted", collection.label())}))
    }

    fn login(&self, body: &Value) -> Result<Value, SyncError> {
        let email = str_field(body, "email");
        let password = str_field(body, "password");
        if email.is_empty() || password.is_empty() {
            return Err(SyncError::server(400, "Email and password are required"));
        }
        let user = self
            .users
            .iter()
            .find(|u| u.user.email == email && u.password == password)
            .ok_or_else(|| SyncError::server(401, "Invalid credentials"))?;
        Ok(json!({"success": true, "user": to_value(&user.user)?}))
    }

    fn register(&mut self, body: &Value) -> Result<Value, SyncError> {
        let email = str_field(body, "email");
        let password = str_field(body, "password");
        let name = str_field(body, "name");
        if email.is_empty() || password.is_empty() || name.is_empty() {
            return Err(SyncError::server(400, "Email, password and name are required"));
        }
        if self.users.iter().any(|u| u.user.email == email) {
            return Err(SyncError::server(400, "Email already registered"));
        }
        let id = self.take_id();
        let phone = str_field(body, "phone");
        self.users.push(FakeUser {
            user: User {
                id,
                email,
                name,
                phone: (!phone.is_empty()).then_some(phone),
                role: Role::Standard,
            },
            password,
        });
        Ok(json!({"success": true, "message": "Account created"}))
    }

    fn update_profile(&mut self, body: &Value) -> Result<Value, SyncError> {
        let id = body
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| SyncError::server(400, "User id is required"))?;
        if let Some(entry) = self.users.iter_mut().find(|u| u.user.id == id) {
            entry.user.name = str_field(body, "name");
            entry.user.email = str_field(body, "email");
            let phone = str_field(body, "phone");
            entry.user.phone = (!phone.is_empty()).then_some(phone);
        }
        Ok(json!({"success": true, "message": "Profile updated"}))
    }
}

impl Transport for FakeApi {
    fn send(&self, request: &ApiRequest) -> Result<Value, SyncError> {
        self.enter(request.kind())?;
        let mut state = self.lock();
        match request {
            ApiRequest::List(collection) => state.list(*collection),
            ApiRequest::Create { collection, body } => state.create(*collection, body),
            ApiRequest::Update {
                collection,
                id,
                body,
            } => state.update(*collection, *id, body),
            ApiRequest::Delete { collection, id } => state.delete(*collection, *id),
            ApiRequest::Login(body) => state.login(body),
            ApiRequest::Register(body) => state.register(body),
            ApiRequest::UpdateProfile(body) => state.update_profile(body),
        }
    }

    fn upload(&self, image: &StagedImage) -> Result<String, SyncError> {
        self.enter(RequestKind::Upload)?;
        if image.read_bytes().is_err() {
            return Err(SyncError::server(400, "No file sent"));
        }
        let mut state = self.lock();
        state.upload_seq += 1;
        Ok(format!(
            "{FAKE_UPLOAD_BASE}/uploads/{}_{}",
            state.upload_seq,
            image.file_name()
        ))
    }
}

fn require_keys(collection: Collection, body: &Value) -> Result<(), SyncError> {
    let keys: &[&str] = match collection {
        Collection::Articles => &ARTICLE_KEYS,
        Collection::Teams => &TEAM_KEYS,
        Collection::Results => &RESULT_KEYS,
    };
    let complete = body.is_object() && keys.iter().all(|key| body.get(*key).is_some());
    if !complete {
        return Err(SyncError::server(400, "Incomplete data"));
    }
    Ok(())
}

fn with_id<T: DeserializeOwned>(body: &Value, id: RecordId) -> Result<T, SyncError> {
    let mut body = body.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.insert("id".to_string(), json!(id));
    }
    serde_json::from_value(body).map_err(|err| SyncError::server(400, format!("Invalid data: {err}")))
}

fn find<T>(rows: &[T], id: RecordId, id_of: impl Fn(&T) -> RecordId) -> Result<usize, SyncError> {
    rows.iter()
        .position(|row| id_of(row) == id)
        .ok_or_else(|| SyncError::server(404, "Record not found"))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, SyncError> {
    serde_json::to_value(value).map_err(|err| SyncError::server(500, err.to_string()))
}

fn str_field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
