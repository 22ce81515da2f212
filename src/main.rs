use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use league_feed::config::ClientConfig;
use league_feed::fake_api::FakeApi;
use league_feed::logging;
use league_feed::models::Collection;
use league_feed::persist::{self, CachedCollections};
use league_feed::provider::{SyncContext, spawn_provider};
use league_feed::state::{
    AppState, ArticleView, AuthMode, FormEditor, FormState, FormTarget, ProviderCommand, Tab,
    abbreviate_team_name, apply_delta,
};
use league_feed::store::LoadStatus;
use league_feed::transport::{HttpTransport, Transport};

struct App {
    state: AppState,
    should_quit: bool,
    cmd_tx: mpsc::Sender<ProviderCommand>,
    source: String,
}

impl App {
    fn new(cmd_tx: mpsc::Sender<ProviderCommand>, source: String) -> Self {
        Self {
            state: AppState::new(),
            should_quit: false,
            cmd_tx,
            source,
        }
    }

    fn send(&mut self, command: ProviderCommand) {
        if self.cmd_tx.send(command).is_err() {
            self.state.push_log("[WARN] Sync worker unavailable");
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        if self.state.help_overlay {
            match key.code {
                KeyCode::Char('q') => self.should_quit = true,
                KeyCode::Char('?') | KeyCode::Esc => self.state.help_overlay = false,
                _ => {}
            }
            return;
        }
        if self.state.session().is_none() {
            self.on_auth_key(key);
            return;
        }
        if self.state.form.is_open() {
            self.on_form_key(key);
            return;
        }
        if self.state.search_active {
            self.on_search_key(key);
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = true,
            KeyCode::Char(ch @ '1'..='5') => {
                let idx = ch as usize - '1' as usize;
                self.state.set_tab(Tab::ALL[idx]);
            }
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char('n') => {
                self.state.begin_create();
            }
            KeyCode::Char('e') => {
                self.state.begin_edit();
            }
            KeyCode::Char('x') => {
                if let Some(command) = self.state.request_delete() {
                    self.send(command);
                }
            }
            KeyCode::Char('r') => {
                self.send(ProviderCommand::RefreshAll);
                self.state.push_log("[INFO] Refresh requested");
            }
            KeyCode::Char('/') => {
                self.state.set_tab(Tab::Search);
                self.state.search_active = true;
            }
            KeyCode::Char('o') if self.state.tab == Tab::Profile => self.state.logout(),
            KeyCode::Enter => {
                if matches!(self.state.tab, Tab::News | Tab::Search) {
                    self.state.open_selected_article();
                }
            }
            KeyCode::Esc => {
                self.state.pending_delete = None;
                self.state.close_article();
            }
            _ => {}
        }
    }

    fn on_auth_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::F(2) => self.state.toggle_auth_mode(),
            KeyCode::Enter => {
                if let Some(command) = self.state.submit_auth() {
                    self.send(command);
                }
            }
            _ => edit_form(&mut self.state.auth_form, key),
        }
    }

    fn on_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.state.close_form(),
            KeyCode::Enter => {
                if let Some(command) = self.state.submit_form() {
                    self.send(command);
                }
            }
            _ => edit_form(&mut self.state.form, key),
        }
    }

    fn on_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Enter => self.state.search_active = false,
            KeyCode::Backspace => {
                self.state.search.pop();
                self.state.selected = 0;
            }
            KeyCode::Char(ch) => {
                self.state.search.push(ch);
                self.state.selected = 0;
            }
            _ => {}
        }
    }
}

fn edit_form(form: &mut FormEditor, key: KeyEvent) {
    match key.code {
        KeyCode::Tab | KeyCode::Down => form.focus_next(),
        KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
        KeyCode::Backspace => form.backspace(),
        KeyCode::Char(ch) => form.type_char(ch),
        _ => {}
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let log_path = logging::init_file_logger();

    let config = ClientConfig::from_env()?
        .apply_args(std::env::args().skip(1))
        .context("invalid command-line arguments")?;
    let (transport, source): (Arc<dyn Transport>, String) = if config.offline {
        (Arc::new(FakeApi::seeded()), "offline sample data".to_string())
    } else {
        (
            Arc::new(HttpTransport::new(&config)?),
            config.api_base_url.clone(),
        )
    };
    log::info!("starting against {source}");

    let ctx = SyncContext::new(transport, config.max_upload_bytes);
    if !config.offline
        && let Some(cached) = persist::load_snapshot(&config.api_base_url)
    {
        ctx.articles.store().seed(cached.articles);
        ctx.teams.store().seed(cached.teams);
        ctx.results.store().seed(cached.results);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    spawn_provider(ctx.clone(), tx, cmd_rx, config.poll_interval);

    let mut app = App::new(cmd_tx, source);
    match &log_path {
        Ok(path) => app
            .state
            .push_log(format!("[INFO] Logging to {}", path.display())),
        Err(err) => app.state.push_log(format!("[WARN] File logging disabled: {err}")),
    }
    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if !config.offline {
        let snapshot = CachedCollections {
            articles: ctx.articles.store().records(),
            teams: ctx.teams.store().records(),
            results: ctx.results.store().records(),
            saved_at: None,
        };
        if !snapshot.is_empty() {
            persist::save_snapshot(&config.api_base_url, &snapshot);
        }
    }

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<league_feed::state::Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_lines(app))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    if app.state.session().is_some() {
        render_tab(frame, chunks[1], &app.state);
    } else {
        render_auth(frame, chunks[1], &app.state);
    }

    let console = Paragraph::new(console_text(&app.state))
        .block(Block::default().title("Console").borders(Borders::ALL));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(&app.state))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[3]);

    if app.state.form.is_open() {
        render_form(frame, frame.size(), &app.state.form);
    }
    if app.state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_lines(app: &App) -> Vec<Line<'static>> {
    let state = &app.state;
    let mut tabs = vec![Span::raw(" LEAGUE FEED ")];
    for (idx, tab) in Tab::ALL.iter().enumerate() {
        let label = format!(" {} {} ", idx + 1, tab.title());
        let style = if *tab == state.tab {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        tabs.push(Span::styled(label, style));
    }

    let who = match state.session() {
        Some(session) if session.is_admin() => format!("{} (admin)", session.user.name),
        Some(session) => session.user.name.clone(),
        None => "signed out".to_string(),
    };
    let status = state
        .tab
        .collection()
        .map(|c| status_label(state, c))
        .unwrap_or_default();
    vec![
        Line::from(tabs),
        Line::from(format!(" {} | {} {}", app.source, who, status)),
    ]
}

fn status_label(state: &AppState, collection: Collection) -> String {
    match state.status_of(collection) {
        LoadStatus::Loading => "| loading...".to_string(),
        LoadStatus::Error => match state.error_of(collection) {
            Some(err) => format!("| {}", err.user_message()),
            None => "| error".to_string(),
        },
        LoadStatus::Idle => String::new(),
    }
}

fn footer_text(state: &AppState) -> String {
    if state.session().is_none() {
        return "Tab/↑/↓ Field | Enter Submit | F2 Login/Sign up | Esc Quit".to_string();
    }
    if state.form.is_open() {
        return "Tab/↑/↓ Field | Enter Save | Esc Cancel".to_string();
    }
    if state.search_active {
        return "Type to search | Enter/Esc Done".to_string();
    }
    let mut keys = "1-5 Tabs | j/k Move | Enter Open | r Refresh | / Search".to_string();
    if state.is_admin() {
        keys.push_str(" | n New | e Edit | x Delete");
    }
    if state.tab == Tab::Profile {
        keys.push_str(" | e Edit profile | o Sign out");
    }
    keys.push_str(" | ? Help | q Quit");
    keys
}

fn render_tab(frame: &mut Frame, area: Rect, state: &AppState) {
    let lines = match state.tab {
        Tab::News => match state.article_view {
            ArticleView::Detail(_) => article_detail_lines(state),
            ArticleView::List => article_list_lines(state, area),
        },
        Tab::Search => {
            let mut lines = vec![Line::from(format!(
                "Search: {}{}",
                state.search,
                if state.search_active { "_" } else { "" }
            ))];
            match state.article_view {
                ArticleView::Detail(_) => lines.extend(article_detail_lines(state)),
                ArticleView::List if state.search.trim().is_empty() => {
                    lines.push(Line::from("Type a title, author or phrase"));
                }
                ArticleView::List => lines.extend(article_list_lines(state, area)),
            }
            lines
        }
        Tab::Results => result_lines(state, area),
        Tab::Standings => standings_lines(state, area),
        Tab::Profile => profile_lines(state),
    };
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(state.tab.title()).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn row_style(selected: bool) -> Style {
    if selected {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    }
}

fn article_list_lines(state: &AppState, area: Rect) -> Vec<Line<'static>> {
    let articles = if state.tab == Tab::Search {
        state.search_results()
    } else {
        state.articles.records.iter().collect()
    };
    if articles.is_empty() {
        return vec![Line::from("No articles")];
    }
    let visible = area.height.saturating_sub(3) as usize;
    let (start, end) = visible_range(state.selected, articles.len(), visible.max(1));
    articles[start..end]
        .iter()
        .enumerate()
        .map(|(offset, article)| {
            let idx = start + offset;
            let date = article
                .created_at_parsed()
                .map(|dt| dt.format("%d/%m/%Y").to_string())
                .unwrap_or_default();
            Line::styled(
                format!(
                    "{:<40} {:<18} {}",
                    truncate(&article.title, 40),
                    truncate(&article.author, 18),
                    date
                ),
                row_style(idx == state.selected),
            )
        })
        .collect()
}

fn article_detail_lines(state: &AppState) -> Vec<Line<'static>> {
    let Some(article) = state.selected_article() else {
        return vec![Line::from("Article no longer available")];
    };
    let mut lines = vec![
        Line::styled(
            article.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(format!(
            "by {} {}",
            article.author,
            article
                .created_at_parsed()
                .map(|dt| dt.format("on %d/%m/%Y %H:%M").to_string())
                .unwrap_or_default()
        )),
    ];
    if let Some(url) = &article.image_url {
        lines.push(Line::from(format!("image: {url}")));
    }
    lines.push(Line::from(""));
    lines.extend(article.body.lines().map(|line| Line::from(line.to_string())));
    lines.push(Line::from(""));
    lines.push(Line::from("Esc Back"));
    lines
}

fn result_lines(state: &AppState, area: Rect) -> Vec<Line<'static>> {
    let results = &state.results.records;
    if results.is_empty() {
        return vec![Line::from("No results")];
    }
    let visible = area.height.saturating_sub(2) as usize;
    let (start, end) = visible_range(state.selected, results.len(), visible.max(1));
    results[start..end]
        .iter()
        .enumerate()
        .map(|(offset, result)| {
            let idx = start + offset;
            Line::styled(
                format!(
                    "R{:<3} {:<11} {:>14} {:>2} - {:<2} {:<14}",
                    result.round,
                    result.match_date,
                    abbreviate_team_name(&result.home_team),
                    result.home_goals,
                    result.away_goals,
                    abbreviate_team_name(&result.away_team),
                ),
                row_style(idx == state.selected),
            )
        })
        .collect()
}

fn standings_lines(state: &AppState, area: Rect) -> Vec<Line<'static>> {
    let teams = state.standings();
    let mut lines = vec![Line::styled(
        format!(
            "{:>3} {:<14} {:>3} {:>3} {:>3} {:>3} {:>4} {:>4} {:>4} {:>4}",
            "#", "Team", "P", "W", "D", "L", "GF", "GA", "GD", "Pts"
        ),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    if teams.is_empty() {
        lines.push(Line::from("No teams"));
        return lines;
    }
    let visible = area.height.saturating_sub(3) as usize;
    let (start, end) = visible_range(state.selected, teams.len(), visible.max(1));
    for (offset, team) in teams[start..end].iter().enumerate() {
        let idx = start + offset;
        lines.push(Line::styled(
            format!(
                "{:>3} {:<14} {:>3} {:>3} {:>3} {:>3} {:>4} {:>4} {:>+4} {:>4}",
                team.position,
                abbreviate_team_name(&team.name),
                team.games,
                team.wins,
                team.draws,
                team.losses,
                team.goals_for,
                team.goals_against,
                team.goal_difference(),
                team.points(),
            ),
            row_style(idx == state.selected),
        ));
    }
    lines
}

fn profile_lines(state: &AppState) -> Vec<Line<'static>> {
    let Some(session) = state.session() else {
        return Vec::new();
    };
    let user = &session.user;
    vec![
        Line::from(format!("Name:  {}", user.name)),
        Line::from(format!("Email: {}", user.email)),
        Line::from(format!(
            "Phone: {}",
            user.phone.clone().unwrap_or_else(|| "-".to_string())
        )),
        Line::from(format!(
            "Role:  {}",
            if user.is_admin() { "administrator" } else { "member" }
        )),
        Line::from(""),
        Line::from(format!(
            "{} articles | {} results | {} teams",
            state.articles.records.len(),
            state.results.records.len(),
            state.teams.records.len()
        )),
    ]
}

fn form_lines(form: &FormEditor) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, field) in form.fields().iter().enumerate() {
        let raw = form.values.get(field.name);
        let value = if field.name.contains("password") {
            "*".repeat(raw.chars().count())
        } else {
            raw.to_string()
        };
        let focused = idx == form.focus;
        let marker = if focused { ">" } else { " " };
        let cursor = if focused && !form.submitting { "_" } else { "" };
        let required = if field.required { "*" } else { "" };
        let style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        let mut spans = vec![Span::styled(
            format!("{marker} {}{required}: {value}{cursor}", field.label),
            style,
        )];
        if let Some(reason) = form.field_error(field.name) {
            spans.push(Span::styled(
                format!("  {reason}"),
                Style::default().fg(Color::Red),
            ));
        }
        lines.push(Line::from(spans));
    }
    if let Some(reason) = form.field_error(league_feed::binder::DERIVED_FIELD) {
        lines.push(Line::styled(reason, Style::default().fg(Color::Red)));
    }
    if let Some(notice) = &form.notice {
        lines.push(Line::styled(notice.clone(), Style::default().fg(Color::Red)));
    }
    if form.submitting {
        lines.push(Line::from("Saving..."));
    }
    lines
}

fn form_title(form: &FormEditor) -> String {
    let subject = match form.target {
        FormTarget::Article => "article",
        FormTarget::Team => "team",
        FormTarget::Result => "result",
        FormTarget::Profile => "profile",
        FormTarget::Login => "sign in",
        FormTarget::Signup => "sign up",
    };
    match form.state {
        FormState::OpenForEdit(_) if form.target == FormTarget::Profile => "Edit profile".to_string(),
        FormState::OpenForEdit(id) => format!("Edit {subject} #{id}"),
        FormState::OpenForCreate | FormState::Closed => format!("New {subject}"),
    }
}

fn render_form(frame: &mut Frame, area: Rect, form: &FormEditor) {
    let popup_area = centered_rect(70, 70, area);
    frame.render_widget(Clear, popup_area);
    let widget = Paragraph::new(form_lines(form))
        .wrap(Wrap { trim: false })
        .block(Block::default().title(form_title(form)).borders(Borders::ALL));
    frame.render_widget(widget, popup_area);
}

fn render_auth(frame: &mut Frame, area: Rect, state: &AppState) {
    let popup_area = centered_rect(60, 70, area);
    let (title, hint) = match state.auth_mode() {
        Some(AuthMode::Signup) => ("Create account", "F2 Back to sign in"),
        _ => ("Sign in", "F2 Create an account"),
    };
    let mut lines = form_lines(&state.auth_form);
    if let league_feed::state::AuthView::SignedOut {
        error: Some(error), ..
    } = &state.auth
    {
        lines.push(Line::styled(error.clone(), Style::default().fg(Color::Red)));
    }
    if state.auth_form.submitting {
        lines.push(Line::from("Please wait..."));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(hint));
    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(widget, popup_area);
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No alerts yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(2)).collect::<String>();
    out.push_str("..");
    out
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "League Feed - Help",
        "",
        "Global:",
        "  1-5          News / Results / Standings / Search / Profile",
        "  j/k or ↑/↓   Move",
        "  Enter        Open article",
        "  Esc          Back",
        "  r            Refresh all",
        "  /            Search articles",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Administrators:",
        "  n            New record on the current tab",
        "  e            Edit selected record",
        "  x            Delete selected record (press twice)",
        "",
        "Profile:",
        "  e            Edit profile",
        "  o            Sign out",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
