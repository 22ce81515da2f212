use std::collections::VecDeque;

use crate::auth::{self, Credentials, ProfileUpdate, Registration, Session};
use crate::binder::{
    FieldKind, FieldSpec, FormBinding, FormValues, bind, check_unique_position, text,
};
use crate::error::{SyncError, ValidationError};
use crate::models::{
    Article, ArticlePayload, Collection, MatchResult, MatchResultPayload, RecordId, Team,
    TeamPayload, User,
};
use crate::store::{LoadStatus, StoreSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    News,
    Results,
    Standings,
    Search,
    Profile,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Tab::News,
        Tab::Results,
        Tab::Standings,
        Tab::Search,
        Tab::Profile,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::News => "News",
            Tab::Results => "Results",
            Tab::Standings => "Standings",
            Tab::Search => "Search",
            Tab::Profile => "Profile",
        }
    }

    pub fn collection(self) -> Option<Collection> {
        match self {
            Tab::News | Tab::Search => Some(Collection::Articles),
            Tab::Results => Some(Collection::Results),
            Tab::Standings => Some(Collection::Teams),
            Tab::Profile => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormState {
    Closed,
    OpenForCreate,
    OpenForEdit(RecordId),
}

impl FormState {
    pub fn is_open(self) -> bool {
        !matches!(self, FormState::Closed)
    }

    pub fn editing(self) -> Option<RecordId> {
        match self {
            FormState::OpenForEdit(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Signup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthView {
    SignedOut {
        mode: AuthMode,
        error: Option<String>,
    },
    SignedIn(Session),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleView {
    List,
    Detail(RecordId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormTarget {
    Article,
    Team,
    Result,
    Profile,
    Login,
    Signup,
}

const LOGIN_FIELDS: &[FieldSpec] = &[text("email", "Email"), text("password", "Password")];
const SIGNUP_FIELDS: &[FieldSpec] = &[
    text("email", "Email"),
    text("password", "Password"),
    text("confirm_password", "Confirm password"),
];
const PROFILE_FIELDS: &[FieldSpec] = &[
    text("name", "Name"),
    text("email", "Email"),
    FieldSpec {
        name: "phone",
        label: "Phone",
        kind: FieldKind::Text,
        required: false,
    },
];

impl FormTarget {
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            FormTarget::Article => ArticlePayload::FIELDS,
            FormTarget::Team => TeamPayload::FIELDS,
            FormTarget::Result => MatchResultPayload::FIELDS,
            FormTarget::Profile => PROFILE_FIELDS,
            FormTarget::Login => LOGIN_FIELDS,
            FormTarget::Signup => SIGNUP_FIELDS,
        }
    }

    pub fn collection(self) -> Option<Collection> {
        match self {
            FormTarget::Article => Some(Collection::Articles),
            FormTarget::Team => Some(Collection::Teams),
            FormTarget::Result => Some(Collection::Results),
            FormTarget::Profile | FormTarget::Login | FormTarget::Signup => None,
        }
    }

    fn for_collection(collection: Collection) -> Self {
        match collection {
            Collection::Articles => FormTarget::Article,
            Collection::Teams => FormTarget::Team,
            Collection::Results => FormTarget::Result,
        }
    }
}

/// Text entry state for one form. Field values stay as typed until submit.
#[derive(Debug, Clone, PartialEq)]
pub struct FormEditor {
    pub target: FormTarget,
    pub state: FormState,
    pub values: FormValues,
    pub focus: usize,
    pub errors: Option<ValidationError>,
    pub notice: Option<String>,
    pub submitting: bool,
}

impl FormEditor {
    pub fn closed() -> Self {
        Self::open(FormTarget::Article, FormState::Closed, FormValues::new())
    }

    pub fn open(target: FormTarget, state: FormState, values: FormValues) -> Self {
        Self {
            target,
            state,
            values,
            focus: 0,
            errors: None,
            notice: None,
            submitting: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.target.fields()
    }

    pub fn focused_field(&self) -> Option<&'static FieldSpec> {
        self.fields().get(self.focus)
    }

    pub fn focus_next(&mut self) {
        let total = self.fields().len();
        if total > 0 {
            self.focus = (self.focus + 1) % total;
        }
    }

    pub fn focus_prev(&mut self) {
        let total = self.fields().len();
        if total == 0 {
            return;
        }
        self.focus = if self.focus == 0 {
            total - 1
        } else {
            self.focus - 1
        };
    }

    pub fn type_char(&mut self, ch: char) {
        if self.submitting {
            return;
        }
        if let Some(field) = self.focused_field() {
            self.values.push_char(field.name, ch);
        }
    }

    pub fn backspace(&mut self) {
        if self.submitting {
            return;
        }
        if let Some(field) = self.focused_field() {
            self.values.pop_char(field.name);
        }
    }

    pub fn field_error(&self, field: &str) -> Option<String> {
        self.errors
            .as_ref()
            .and_then(|errors| errors.for_field(field))
            .map(|err| err.reason())
    }

    fn fail(&mut self, errors: ValidationError) {
        self.focus_first_error(&errors);
        self.errors = Some(errors);
        self.notice = None;
        self.submitting = false;
    }

    fn focus_first_error(&mut self, errors: &ValidationError) {
        let Some(first) = errors.errors.first() else {
            return;
        };
        if let Some(idx) = self.fields().iter().position(|f| f.name == first.field) {
            self.focus = idx;
        }
    }

    fn start_submit(&mut self) {
        self.errors = None;
        self.notice = None;
        self.submitting = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    fn past_tense(self) -> &'static str {
        match self {
            MutationAction::Create => "created",
            MutationAction::Update => "updated",
            MutationAction::Delete => "deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub tab: Tab,
    pub articles: StoreSnapshot<Article>,
    pub teams: StoreSnapshot<Team>,
    pub results: StoreSnapshot<MatchResult>,
    pub selected: usize,
    pub article_view: ArticleView,
    pub auth: AuthView,
    pub auth_form: FormEditor,
    pub form: FormEditor,
    pub search: String,
    pub search_active: bool,
    pub pending_delete: Option<(Collection, RecordId)>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            tab: Tab::News,
            articles: StoreSnapshot::empty(),
            teams: StoreSnapshot::empty(),
            results: StoreSnapshot::empty(),
            selected: 0,
            article_view: ArticleView::List,
            auth: AuthView::SignedOut {
                mode: AuthMode::Login,
                error: None,
            },
            auth_form: FormEditor::open(
                FormTarget::Login,
                FormState::OpenForCreate,
                FormValues::new(),
            ),
            form: FormEditor::closed(),
            search: String::new(),
            search_active: false,
            pending_delete: None,
            logs: VecDeque::new(),
            help_overlay: false,
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        const MAX_LOGS: usize = 200;
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.auth {
            AuthView::SignedIn(session) => Some(session),
            AuthView::SignedOut { .. } => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.session().is_some_and(Session::is_admin)
    }

    pub fn set_tab(&mut self, tab: Tab) {
        if self.tab == tab {
            return;
        }
        self.tab = tab;
        self.selected = 0;
        self.article_view = ArticleView::List;
        self.pending_delete = None;
        self.search_active = tab == Tab::Search && self.search.is_empty();
    }

    pub fn status_of(&self, collection: Collection) -> LoadStatus {
        match collection {
            Collection::Articles => self.articles.status,
            Collection::Teams => self.teams.status,
            Collection::Results => self.results.status,
        }
    }

    pub fn error_of(&self, collection: Collection) -> Option<&SyncError> {
        match collection {
            Collection::Articles => self.articles.error.as_ref(),
            Collection::Teams => self.teams.error.as_ref(),
            Collection::Results => self.results.error.as_ref(),
        }
    }

    pub fn search_results(&self) -> Vec<&Article> {
        self.articles
            .records
            .iter()
            .filter(|article| article.matches_query(&self.search))
            .collect()
    }

    /// Teams in table order: league position, then points.
    pub fn standings(&self) -> Vec<&Team> {
        let mut teams = self.teams.records.iter().collect::<Vec<_>>();
        teams.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| b.points().cmp(&a.points()))
        });
        teams
    }

    fn visible_articles(&self) -> Vec<&Article> {
        match self.tab {
            Tab::Search => self.search_results(),
            _ => self.articles.records.iter().collect(),
        }
    }

    fn row_count(&self) -> usize {
        match self.tab {
            Tab::News | Tab::Search => self.visible_articles().len(),
            Tab::Results => self.results.records.len(),
            Tab::Standings => self.teams.records.len(),
            Tab::Profile => 0,
        }
    }

    pub fn select_next(&mut self) {
        let total = self.row_count();
        if total == 0 {
            self.selected = 0;
            return;
        }
        self.selected = (self.selected + 1) % total;
        self.pending_delete = None;
    }

    pub fn select_prev(&mut self) {
        let total = self.row_count();
        if total == 0 {
            self.selected = 0;
            return;
        }
        self.selected = if self.selected == 0 {
            total - 1
        } else {
            self.selected - 1
        };
        self.pending_delete = None;
    }

    pub fn clamp_selection(&mut self) {
        let total = self.row_count();
        if total == 0 {
            self.selected = 0;
        } else if self.selected >= total {
            self.selected = total - 1;
        }
    }

    pub fn selected_article(&self) -> Option<&Article> {
        if let ArticleView::Detail(id) = self.article_view {
            return self.articles.records.iter().find(|a| a.id == id);
        }
        if !matches!(self.tab, Tab::News | Tab::Search) {
            return None;
        }
        self.visible_articles().get(self.selected).copied()
    }

    pub fn selected_team(&self) -> Option<&Team> {
        if self.tab != Tab::Standings {
            return None;
        }
        self.standings().get(self.selected).copied()
    }

    pub fn selected_result(&self) -> Option<&MatchResult> {
        if self.tab != Tab::Results {
            return None;
        }
        self.results.records.get(self.selected)
    }

    fn selected_record(&self) -> Option<(Collection, RecordId)> {
        match self.tab {
            Tab::News | Tab::Search => self
                .selected_article()
                .map(|a| (Collection::Articles, a.id)),
            Tab::Results => self.selected_result().map(|r| (Collection::Results, r.id)),
            Tab::Standings => self.selected_team().map(|t| (Collection::Teams, t.id)),
            Tab::Profile => None,
        }
    }

    pub fn open_selected_article(&mut self) {
        if let Some(id) = self.selected_article().map(|a| a.id) {
            self.article_view = ArticleView::Detail(id);
        }
    }

    pub fn close_article(&mut self) {
        self.article_view = ArticleView::List;
    }

    pub fn begin_create(&mut self) -> bool {
        if !self.is_admin() {
            self.push_log("[WARN] Only administrators can add records");
            return false;
        }
        let Some(collection) = self.tab.collection() else {
            return false;
        };
        if self.tab == Tab::Search {
            return false;
        }
        self.pending_delete = None;
        self.form = FormEditor::open(
            FormTarget::for_collection(collection),
            FormState::OpenForCreate,
            FormValues::new(),
        );
        true
    }

    pub fn begin_edit(&mut self) -> bool {
        if self.tab == Tab::Profile {
            let Some(session) = self.session() else {
                return false;
            };
            let user = &session.user;
            let values = FormValues::new()
                .with("name", user.name.clone())
                .with("email", user.email.clone())
                .with("phone", user.phone.clone().unwrap_or_default());
            let id = user.id;
            self.form = FormEditor::open(FormTarget::Profile, FormState::OpenForEdit(id), values);
            return true;
        }
        if !self.is_admin() {
            self.push_log("[WARN] Only administrators can edit records");
            return false;
        }
        let prefill = match self.tab {
            Tab::News | Tab::Search => self
                .selected_article()
                .map(|a| (FormTarget::Article, a.id, FormValues::from(a))),
            Tab::Results => self
                .selected_result()
                .map(|r| (FormTarget::Result, r.id, FormValues::from(r))),
            Tab::Standings => self
                .selected_team()
                .map(|t| (FormTarget::Team, t.id, FormValues::from(t))),
            Tab::Profile => None,
        };
        let Some((target, id, values)) = prefill else {
            return false;
        };
        self.pending_delete = None;
        self.form = FormEditor::open(target, FormState::OpenForEdit(id), values);
        true
    }

    pub fn close_form(&mut self) {
        self.form = FormEditor::closed();
    }

    /// Binds the open form. On success the form is marked as submitting and the
    /// command to run is returned; on failure the field errors stay on the form.
    pub fn submit_form(&mut self) -> Option<ProviderCommand> {
        if !self.form.is_open() || self.form.submitting {
            return None;
        }
        let id = self.form.state.editing();
        let command = match self.form.target {
            FormTarget::Article => bind::<ArticlePayload>(&self.form.values)
                .map(|payload| ProviderCommand::SaveArticle { id, payload }),
            FormTarget::Team => bind::<TeamPayload>(&self.form.values)
                .and_then(|payload| {
                    check_unique_position(&payload, &self.teams.records, id)?;
                    Ok(payload)
                })
                .map(|payload| ProviderCommand::SaveTeam { id, payload }),
            FormTarget::Result => bind::<MatchResultPayload>(&self.form.values)
                .map(|payload| ProviderCommand::SaveResult { id, payload }),
            FormTarget::Profile => {
                let Some(session) = self.session().cloned() else {
                    return None;
                };
                let values = &self.form.values;
                auth::validate_profile(
                    values.get("name"),
                    values.get("email"),
                    values.get("phone"),
                )
                .map(|update| ProviderCommand::UpdateProfile { session, update })
            }
            FormTarget::Login | FormTarget::Signup => return None,
        };
        match command {
            Ok(command) => {
                self.form.start_submit();
                Some(command)
            }
            Err(errors) => {
                self.form.fail(errors);
                None
            }
        }
    }

    /// First press arms the delete, the second press on the same record sends it.
    pub fn request_delete(&mut self) -> Option<ProviderCommand> {
        if !self.is_admin() {
            self.push_log("[WARN] Only administrators can delete records");
            return None;
        }
        let (collection, id) = self.selected_record()?;
        if self.pending_delete == Some((collection, id)) {
            self.pending_delete = None;
            return Some(ProviderCommand::Delete { collection, id });
        }
        self.pending_delete = Some((collection, id));
        self.push_log(format!(
            "[WARN] Press x again to delete {} #{id}",
            collection.label()
        ));
        None
    }

    pub fn auth_mode(&self) -> Option<AuthMode> {
        match &self.auth {
            AuthView::SignedOut { mode, .. } => Some(*mode),
            AuthView::SignedIn(_) => None,
        }
    }

    pub fn toggle_auth_mode(&mut self) {
        let AuthView::SignedOut { mode, .. } = &self.auth else {
            return;
        };
        let (next, target) = match mode {
            AuthMode::Login => (AuthMode::Signup, FormTarget::Signup),
            AuthMode::Signup => (AuthMode::Login, FormTarget::Login),
        };
        let email = self.auth_form.values.get("email").to_string();
        self.auth = AuthView::SignedOut {
            mode: next,
            error: None,
        };
        self.auth_form = FormEditor::open(
            target,
            FormState::OpenForCreate,
            FormValues::new().with("email", email),
        );
    }

    pub fn submit_auth(&mut self) -> Option<ProviderCommand> {
        let mode = self.auth_mode()?;
        if self.auth_form.submitting {
            return None;
        }
        let values = &self.auth_form.values;
        let command = match mode {
            AuthMode::Login => auth::validate_login(values.get("email"), values.get("password"))
                .map(ProviderCommand::Login),
            AuthMode::Signup => auth::validate_signup(
                values.get("email"),
                values.get("password"),
                values.get("confirm_password"),
            )
            .map(ProviderCommand::Register),
        };
        match command {
            Ok(command) => {
                self.auth_form.start_submit();
                self.auth = AuthView::SignedOut { mode, error: None };
                Some(command)
            }
            Err(errors) => {
                self.auth_form.fail(errors);
                None
            }
        }
    }

    pub fn logout(&mut self) {
        if let Some(session) = self.session() {
            let email = session.user.email.clone();
            self.push_log(format!("[INFO] Signed out {email}"));
        }
        self.auth = AuthView::SignedOut {
            mode: AuthMode::Login,
            error: None,
        };
        self.auth_form =
            FormEditor::open(FormTarget::Login, FormState::OpenForCreate, FormValues::new());
        self.close_form();
        self.tab = Tab::News;
        self.selected = 0;
        self.article_view = ArticleView::List;
        self.pending_delete = None;
    }

    fn drop_missing_detail(&mut self) {
        if let ArticleView::Detail(id) = self.article_view
            && !self.articles.records.iter().any(|a| a.id == id)
        {
            self.article_view = ArticleView::List;
        }
    }

    fn finish_mutation(
        &mut self,
        collection: Collection,
        action: MutationAction,
        id: Option<RecordId>,
        error: Option<SyncError>,
    ) {
        let form_matches = self.form.is_open()
            && self.form.submitting
            && self.form.target.collection() == Some(collection);
        let subject = match id {
            Some(id) => format!("{} #{id}", collection.label()),
            None => collection.label().to_string(),
        };
        match error {
            None => {
                self.push_log(format!("[INFO] {subject} {}", action.past_tense()));
                if form_matches && action != MutationAction::Delete {
                    self.close_form();
                }
            }
            Some(err) => {
                self.push_log(format!("[WARN] {subject}: {}", err.user_message()));
                if form_matches && action != MutationAction::Delete {
                    self.form.submitting = false;
                    match err {
                        SyncError::Validation(errors) => self.form.fail(errors),
                        other => self.form.notice = Some(other.user_message()),
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    SetArticles(StoreSnapshot<Article>),
    SetTeams(StoreSnapshot<Team>),
    SetResults(StoreSnapshot<MatchResult>),
    MutationFinished {
        collection: Collection,
        action: MutationAction,
        id: Option<RecordId>,
        error: Option<SyncError>,
    },
    SignedIn(Session),
    AuthFailed(SyncError),
    SignedUp {
        email: String,
    },
    ProfileSaved(Result<User, SyncError>),
    Log(String),
}

#[derive(Debug, Clone)]
pub enum ProviderCommand {
    Load(Collection),
    RefreshAll,
    SaveArticle {
        id: Option<RecordId>,
        payload: ArticlePayload,
    },
    SaveTeam {
        id: Option<RecordId>,
        payload: TeamPayload,
    },
    SaveResult {
        id: Option<RecordId>,
        payload: MatchResultPayload,
    },
    Delete {
        collection: Collection,
        id: RecordId,
    },
    Login(Credentials),
    Register(Registration),
    UpdateProfile {
        session: Session,
        update: ProfileUpdate,
    },
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::SetArticles(snapshot) => {
            state.articles = snapshot;
            state.drop_missing_detail();
            state.clamp_selection();
        }
        Delta::SetTeams(snapshot) => {
            state.teams = snapshot;
            state.clamp_selection();
        }
        Delta::SetResults(snapshot) => {
            state.results = snapshot;
            state.clamp_selection();
        }
        Delta::MutationFinished {
            collection,
            action,
            id,
            error,
        } => state.finish_mutation(collection, action, id, error),
        Delta::SignedIn(session) => {
            state.push_log(format!("[INFO] Signed in as {}", session.user.name));
            state.auth = AuthView::SignedIn(session);
            state.auth_form =
                FormEditor::open(FormTarget::Login, FormState::OpenForCreate, FormValues::new());
            state.tab = Tab::News;
            state.selected = 0;
        }
        Delta::AuthFailed(err) => {
            state.auth_form.submitting = false;
            let message = err.user_message();
            state.push_log(format!("[WARN] {message}"));
            if let AuthView::SignedOut { mode, .. } = &state.auth {
                state.auth = AuthView::SignedOut {
                    mode: *mode,
                    error: Some(message),
                };
            }
            if let SyncError::Validation(errors) = err {
                state.auth_form.fail(errors);
            }
        }
        Delta::SignedUp { email } => {
            state.push_log(format!("[INFO] Account created for {email}, sign in to continue"));
            state.auth = AuthView::SignedOut {
                mode: AuthMode::Login,
                error: None,
            };
            state.auth_form = FormEditor::open(
                FormTarget::Login,
                FormState::OpenForCreate,
                FormValues::new().with("email", email),
            );
        }
        Delta::ProfileSaved(Ok(user)) => {
            if let AuthView::SignedIn(session) = &mut state.auth {
                session.user = user;
            }
            state.push_log("[INFO] Profile updated");
            if state.form.target == FormTarget::Profile {
                state.close_form();
            }
        }
        Delta::ProfileSaved(Err(err)) => {
            state.push_log(format!("[WARN] Profile: {}", err.user_message()));
            if state.form.target == FormTarget::Profile && state.form.is_open() {
                state.form.submitting = false;
                state.form.notice = Some(err.user_message());
            }
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}

/// Short team label for narrow table columns.
pub fn abbreviate_team_name(name: &str) -> String {
    const KNOWN: &[(&str, &str)] = &[
        ("Ferroviário", "Ferr."),
        ("Black Bulls", "B. Bulls"),
        ("Ferroviário Beira", "Ferr. Beira"),
        ("Ferroviário Lichingenda", "Ferr. Lich."),
        ("Costa do Sol", "C. Sol"),
        ("Liga Muçulmana", "L. Muçul."),
        ("Desportivo Nampula", "D. Nampula"),
        ("Maxaquene", "Maxaq."),
        ("Textáfrica", "Textáfr."),
        ("Estrela Vermelha", "E. Vermelha"),
        ("Desportivo Matola", "D. Matola"),
        ("ENH Vilankulo", "ENH Vil."),
        ("Baia de Pemba", "B. Pemba"),
        ("Ferroviario Nampula", "Ferr. Namp."),
    ];
    const MAX_CHARS: usize = 12;

    let name = name.trim();
    if let Some((_, short)) = KNOWN.iter().find(|(full, _)| *full == name) {
        return short.to_string();
    }
    let words = name.split_whitespace().collect::<Vec<_>>();
    if words.len() <= 2 {
        if name.chars().count() > MAX_CHARS {
            return format!("{}..", name.chars().take(MAX_CHARS).collect::<String>());
        }
        return name.to_string();
    }
    let initials = words
        .iter()
        .take(2)
        .filter_map(|word| word.chars().next())
        .map(String::from)
        .collect::<Vec<_>>();
    format!("{}.", initials.join("."))
}
