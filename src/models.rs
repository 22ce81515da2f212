use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub type RecordId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Articles,
    Teams,
    Results,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Articles, Collection::Teams, Collection::Results];

    pub fn path(self) -> &'static str {
        match self {
            Collection::Articles => "artigos",
            Collection::Teams => "equipes",
            Collection::Results => "resultados",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Collection::Articles => "article",
            Collection::Teams => "team",
            Collection::Results => "result",
        }
    }
}

/// Request body for one collection. A pending local image is carried outside the
/// serialized body and swapped for a permanent reference before sending.
pub trait Payload: Clone + Send + Sync + Serialize + 'static {
    fn pending_image(&self) -> Option<&Path> {
        None
    }

    fn attach_image(&mut self, _reference: String) {}
}

pub trait Resource:
    Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    type Payload: Payload;

    const COLLECTION: Collection;

    fn id(&self) -> RecordId;

    /// Builds the record from a confirmed id when the server answers with an ack
    /// instead of the full record. `previous` is the cached version, if any.
    fn from_payload(id: RecordId, payload: &Self::Payload, previous: Option<&Self>) -> Self;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: RecordId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "conteudo")]
    pub body: String,
    #[serde(rename = "autor")]
    pub author: String,
    #[serde(rename = "imagem_url", default)]
    pub image_url: Option<String>,
    #[serde(rename = "data_criacao", default)]
    pub created_at: Option<String>,
}

impl Article {
    pub fn created_at_parsed(&self) -> Option<NaiveDateTime> {
        let raw = self.created_at.as_deref()?.trim();
        const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
        FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.title.to_lowercase().contains(&needle)
            || self.body.to_lowercase().contains(&needle)
            || self.author.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticlePayload {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "conteudo")]
    pub body: String,
    #[serde(rename = "autor")]
    pub author: String,
    #[serde(rename = "imagem_url")]
    pub image_url: Option<String>,
    #[serde(skip)]
    pub pending_image: Option<PathBuf>,
}

impl Payload for ArticlePayload {
    fn pending_image(&self) -> Option<&Path> {
        self.pending_image.as_deref()
    }

    fn attach_image(&mut self, reference: String) {
        self.image_url = Some(reference);
        self.pending_image = None;
    }
}

impl Resource for Article {
    type Payload = ArticlePayload;

    const COLLECTION: Collection = Collection::Articles;

    fn id(&self) -> RecordId {
        self.id
    }

    fn from_payload(id: RecordId, payload: &ArticlePayload, previous: Option<&Self>) -> Self {
        Self {
            id,
            title: payload.title.clone(),
            body: payload.body.clone(),
            author: payload.author.clone(),
            image_url: payload
                .image_url
                .clone()
                .or_else(|| previous.and_then(|p| p.image_url.clone())),
            created_at: previous.and_then(|p| p.created_at.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: RecordId,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "posicao")]
    pub position: u32,
    #[serde(rename = "jogos")]
    pub games: u32,
    #[serde(rename = "vitorias")]
    pub wins: u32,
    #[serde(rename = "empates")]
    pub draws: u32,
    #[serde(rename = "derrotas")]
    pub losses: u32,
    #[serde(rename = "gols_pro")]
    pub goals_for: u32,
    #[serde(rename = "gols_contra")]
    pub goals_against: u32,
    #[serde(rename = "logo_url", default)]
    pub logo_url: Option<String>,
}

impl Team {
    pub fn goal_difference(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }

    pub fn points(&self) -> u32 {
        self.wins.saturating_mul(3).saturating_add(self.draws)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamPayload {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "posicao")]
    pub position: u32,
    #[serde(rename = "jogos")]
    pub games: u32,
    #[serde(rename = "vitorias")]
    pub wins: u32,
    #[serde(rename = "empates")]
    pub draws: u32,
    #[serde(rename = "derrotas")]
    pub losses: u32,
    #[serde(rename = "gols_pro")]
    pub goals_for: u32,
    #[serde(rename = "gols_contra")]
    pub goals_against: u32,
    #[serde(rename = "logo_url")]
    pub logo_url: Option<String>,
    #[serde(skip)]
    pub pending_logo: Option<PathBuf>,
}

impl Payload for TeamPayload {
    fn pending_image(&self) -> Option<&Path> {
        self.pending_logo.as_deref()
    }

    fn attach_image(&mut self, reference: String) {
        self.logo_url = Some(reference);
        self.pending_logo = None;
    }
}

impl Resource for Team {
    type Payload = TeamPayload;

    const COLLECTION: Collection = Collection::Teams;

    fn id(&self) -> RecordId {
        self.id
    }

    fn from_payload(id: RecordId, payload: &TeamPayload, _previous: Option<&Self>) -> Self {
        Self {
            id,
            name: payload.name.clone(),
            position: payload.position,
            games: payload.games,
            wins: payload.wins,
            draws: payload.draws,
            losses: payload.losses,
            goals_for: payload.goals_for,
            goals_against: payload.goals_against,
            logo_url: payload.logo_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: RecordId,
    #[serde(rename = "ronda")]
    pub round: u32,
    #[serde(rename = "time_casa")]
    pub home_team: String,
    #[serde(rename = "time_fora")]
    pub away_team: String,
    #[serde(rename = "gols_casa")]
    pub home_goals: u32,
    #[serde(rename = "gols_fora")]
    pub away_goals: u32,
    #[serde(rename = "data_jogo")]
    pub match_date: String,
    #[serde(rename = "logo_casa", default)]
    pub home_logo: Option<String>,
    #[serde(rename = "logo_fora", default)]
    pub away_logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResultPayload {
    #[serde(rename = "ronda")]
    pub round: u32,
    #[serde(rename = "time_casa")]
    pub home_team: String,
    #[serde(rename = "time_fora")]
    pub away_team: String,
    #[serde(rename = "gols_casa")]
    pub home_goals: u32,
    #[serde(rename = "gols_fora")]
    pub away_goals: u32,
    #[serde(rename = "data_jogo")]
    pub match_date: String,
    #[serde(rename = "logo_casa")]
    pub home_logo: Option<String>,
    #[serde(rename = "logo_fora")]
    pub away_logo: Option<String>,
    // Replaces the home logo once uploaded.
    #[serde(skip)]
    pub pending_home_logo: Option<PathBuf>,
}

impl Payload for MatchResultPayload {
    fn pending_image(&self) -> Option<&Path> {
        self.pending_home_logo.as_deref()
    }

    fn attach_image(&mut self, reference: String) {
        self.home_logo = Some(reference);
        self.pending_home_logo = None;
    }
}

impl Resource for MatchResult {
    type Payload = MatchResultPayload;

    const COLLECTION: Collection = Collection::Results;

    fn id(&self) -> RecordId {
        self.id
    }

    fn from_payload(id: RecordId, payload: &MatchResultPayload, _previous: Option<&Self>) -> Self {
        Self {
            id,
            round: payload.round,
            home_team: payload.home_team.clone(),
            away_team: payload.away_team.clone(),
            home_goals: payload.home_goals,
            away_goals: payload.away_goals,
            match_date: payload.match_date.clone(),
            home_logo: payload.home_logo.clone(),
            away_logo: payload.away_logo.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "user", alias = "standard")]
    Standard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(rename = "userType")]
    pub role: Role,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
