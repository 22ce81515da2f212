use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{FieldProblem, ValidationError};
use crate::models::{
    Article, ArticlePayload, MatchResult, MatchResultPayload, RecordId, Team, TeamPayload,
};

pub const DERIVED_FIELD: &str = "derived";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw text typed into a form, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues {
    values: BTreeMap<String, String>,
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn push_char(&mut self, field: &str, ch: char) {
        self.values.entry(field.to_string()).or_default().push(ch);
    }

    pub fn pop_char(&mut self, field: &str) {
        if let Some(value) = self.values.get_mut(field) {
            value.pop();
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn trimmed(&self, field: &str) -> Option<&str> {
        let value = self.get(field).trim();
        (!value.is_empty()).then_some(value)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer { min: i64 },
    Date,
    /// Local path of an image to upload before sending.
    ImagePath,
    /// Already-hosted reference, kept as is.
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

pub const fn text(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Text,
        required: true,
    }
}

pub const fn count(name: &'static str, label: &'static str, min: i64) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Integer { min },
        required: true,
    }
}

pub const fn optional(name: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind,
        required: false,
    }
}

/// Field values that passed the per-field checks.
#[derive(Debug)]
pub struct BoundFields<'a> {
    values: &'a FormValues,
    numbers: HashMap<&'static str, u32>,
}

impl BoundFields<'_> {
    pub fn text(&self, field: &str) -> String {
        self.values.get(field).trim().to_string()
    }

    pub fn optional_text(&self, field: &str) -> Option<String> {
        self.values.trimmed(field).map(|s| s.to_string())
    }

    pub fn optional_path(&self, field: &str) -> Option<PathBuf> {
        self.values.trimmed(field).map(PathBuf::from)
    }

    pub fn number(&self, field: &str) -> u32 {
        self.numbers.get(field).copied().unwrap_or_default()
    }
}

pub fn bind_fields<'a>(
    specs: &[FieldSpec],
    values: &'a FormValues,
) -> Result<BoundFields<'a>, ValidationError> {
    let mut errors = ValidationError::default();
    let mut numbers = HashMap::new();

    for spec in specs {
        let Some(raw) = values.trimmed(spec.name) else {
            if spec.required {
                errors.push(spec.name, FieldProblem::Missing);
            }
            continue;
        };
        match spec.kind {
            FieldKind::Integer { min } => match raw.parse::<i64>() {
                Ok(n) if n < min || n > i64::from(u32::MAX) => errors.push(
                    spec.name,
                    FieldProblem::OutOfRange {
                        min,
                        max: i64::from(u32::MAX),
                    },
                ),
                Ok(n) => {
                    numbers.insert(spec.name, u32::try_from(n).unwrap_or_default());
                }
                Err(_) => errors.push(spec.name, FieldProblem::NotANumber),
            },
            FieldKind::Date => {
                if NaiveDate::parse_from_str(raw, DATE_FORMAT).is_err() {
                    errors.push(
                        spec.name,
                        FieldProblem::InvalidFormat("expected a date like 2024-10-28".to_string()),
                    );
                }
            }
            FieldKind::Text | FieldKind::ImagePath | FieldKind::Reference => {}
        }
    }

    errors.into_result()?;
    Ok(BoundFields { values, numbers })
}

pub trait FormBinding: Sized {
    const FIELDS: &'static [FieldSpec];

    fn from_bound(fields: &BoundFields<'_>) -> Result<Self, ValidationError>;
}

pub fn bind<P: FormBinding>(values: &FormValues) -> Result<P, ValidationError> {
    let fields = bind_fields(P::FIELDS, values)?;
    P::from_bound(&fields)
}

impl FormBinding for ArticlePayload {
    const FIELDS: &'static [FieldSpec] = &[
        text("title", "Title"),
        text("body", "Body"),
        text("author", "Author"),
        optional("image", "Image file", FieldKind::ImagePath),
        optional("image_url", "Image URL", FieldKind::Reference),
    ];

    fn from_bound(fields: &BoundFields<'_>) -> Result<Self, ValidationError> {
        Ok(Self {
            title: fields.text("title"),
            body: fields.text("body"),
            author: fields.text("author"),
            image_url: fields.optional_text("image_url"),
            pending_image: fields.optional_path("image"),
        })
    }
}

impl FormBinding for TeamPayload {
    const FIELDS: &'static [FieldSpec] = &[
        text("name", "Name"),
        count("position", "Position", 1),
        count("games", "Games", 0),
        count("wins", "Wins", 0),
        count("draws", "Draws", 0),
        count("losses", "Losses", 0),
        count("goals_for", "Goals for", 0),
        count("goals_against", "Goals against", 0),
        optional("logo", "Logo file", FieldKind::ImagePath),
        optional("logo_url", "Logo URL", FieldKind::Reference),
    ];

    fn from_bound(fields: &BoundFields<'_>) -> Result<Self, ValidationError> {
        let games = fields.number("games");
        let wins = fields.number("wins");
        let draws = fields.number("draws");
        let losses = fields.number("losses");
        let decided = u64::from(wins) + u64::from(draws) + u64::from(losses);
        if decided > u64::from(games) {
            return Err(ValidationError::single(
                DERIVED_FIELD,
                FieldProblem::Derived(format!(
                    "wins + draws + losses ({decided}) exceeds games played ({games})"
                )),
            ));
        }
        Ok(Self {
            name: fields.text("name"),
            position: fields.number("position"),
            games,
            wins,
            draws,
            losses,
            goals_for: fields.number("goals_for"),
            goals_against: fields.number("goals_against"),
            logo_url: fields.optional_text("logo_url"),
            pending_logo: fields.optional_path("logo"),
        })
    }
}

impl FormBinding for MatchResultPayload {
    const FIELDS: &'static [FieldSpec] = &[
        count("round", "Round", 1),
        text("home_team", "Home team"),
        text("away_team", "Away team"),
        count("home_goals", "Home goals", 0),
        count("away_goals", "Away goals", 0),
        FieldSpec {
            name: "match_date",
            label: "Date (YYYY-MM-DD)",
            kind: FieldKind::Date,
            required: true,
        },
        optional("home_logo_file", "Home logo file", FieldKind::ImagePath),
        optional("home_logo", "Home logo URL", FieldKind::Reference),
        optional("away_logo", "Away logo URL", FieldKind::Reference),
    ];

    fn from_bound(fields: &BoundFields<'_>) -> Result<Self, ValidationError> {
        let home_team = fields.text("home_team");
        let away_team = fields.text("away_team");
        if home_team.to_lowercase() == away_team.to_lowercase() {
            return Err(ValidationError::single(
                DERIVED_FIELD,
                FieldProblem::Derived("home and away team must differ".to_string()),
            ));
        }
        Ok(Self {
            round: fields.number("round"),
            home_team,
            away_team,
            home_goals: fields.number("home_goals"),
            away_goals: fields.number("away_goals"),
            match_date: fields.text("match_date"),
            home_logo: fields.optional_text("home_logo"),
            away_logo: fields.optional_text("away_logo"),
            pending_home_logo: fields.optional_path("home_logo_file"),
        })
    }
}

/// League positions are unique within a standings snapshot. `editing` is the team
/// being edited, which may keep its own position.
pub fn check_unique_position(
    payload: &TeamPayload,
    standings: &[Team],
    editing: Option<RecordId>,
) -> Result<(), ValidationError> {
    let taken = standings
        .iter()
        .any(|team| team.position == payload.position && Some(team.id) != editing);
    if taken {
        return Err(ValidationError::single("position", FieldProblem::Duplicate));
    }
    Ok(())
}

impl From<&Article> for FormValues {
    fn from(article: &Article) -> Self {
        FormValues::new()
            .with("title", article.title.clone())
            .with("body", article.body.clone())
            .with("author", article.author.clone())
            .with("image_url", article.image_url.clone().unwrap_or_default())
    }
}

impl From<&Team> for FormValues {
    fn from(team: &Team) -> Self {
        FormValues::new()
            .with("name", team.name.clone())
            .with("position", team.position.to_string())
            .with("games", team.games.to_string())
            .with("wins", team.wins.to_string())
            .with("draws", team.draws.to_string())
            .with("losses", team.losses.to_string())
            .with("goals_for", team.goals_for.to_string())
            .with("goals_against", team.goals_against.to_string())
            .with("logo_url", team.logo_url.clone().unwrap_or_default())
    }
}

impl From<&MatchResult> for FormValues {
    fn from(result: &MatchResult) -> Self {
        FormValues::new()
            .with("round", result.round.to_string())
            .with("home_team", result.home_team.clone())
            .with("away_team", result.away_team.clone())
            .with("home_goals", result.home_goals.to_string())
            .with("away_goals", result.away_goals.to_string())
            .with("match_date", result.match_date.clone())
            .with("home_logo", result.home_logo.clone().unwrap_or_default())
            .with("away_logo", result.away_logo.clone().unwrap_or_default())
    }
}
