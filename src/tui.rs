use crate::config::Config;
use crate::models::search::{cell_text, SearchResult, MIN_COLUMN_WIDTH};
use crate::session::{SearchRequest, SearchSession, SearchState};
use crate::utils::time_range::default_inputs;
use crossterm::{
    cursor::SetCursorStyle,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{error, info};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, BorderType, Borders, Clear, Padding, Paragraph, Row, Sparkline, Table, TableState,
        Wrap,
    },
    Frame, Terminal,
};
use serde_json::Value;
use std::time::{Duration, Instant};
use std::{error::Error, io, sync::Arc};
use syntect::highlighting::FontStyle;
use syntect::{
    easy::HighlightLines,
    highlighting::{Theme, ThemeSet},
    parsing::SyntaxSet,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

fn is_inside(rect: Rect, col: u16, row: u16) -> bool {
    col >= rect.x && col < rect.x + rect.width && row >= rect.y && row < rect.y + rect.height
}

#[derive(Clone)]
pub struct AppTheme {
    pub border: Color,
    pub text: Color,
    pub input_edit: Color,
    pub title_main: Color,
    pub title_secondary: Color,
    pub highlight: Color,
    pub active: Color,
    pub error: Color,
}

impl Default for AppTheme {
    fn default() -> Self {
        Self {
            border: Color::Green,
            text: Color::White,
            input_edit: Color::Yellow,
            title_main: Color::Green,
            title_secondary: Color::Cyan,
            highlight: Color::Magenta,
            active: Color::Green,
            error: Color::Red,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum InputMode {
    Normal,
    Editing,
    Help,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum InputField {
    Query,
    Earliest,
    Latest,
}

impl InputField {
    fn next(self) -> Self {
        match self {
            InputField::Query => InputField::Earliest,
            InputField::Earliest => InputField::Latest,
            InputField::Latest => InputField::Query,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ViewMode {
    RawEvents,
    Table,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ViewFocus {
    ContentList,
    ContentDetail,
}

#[derive(Debug, PartialEq)]
enum KeyAction {
    None,
    Search,
    Quit,
}

pub struct App {
    query: String,
    cursor_position: usize, // byte index into query
    input_scroll: u16,
    input_scroll_x: u16,
    earliest: String,
    latest: String,
    input_mode: InputMode,
    active_field: InputField,
    status_message: String,
    pub theme: AppTheme,

    session: SearchSession,
    search_state: Arc<Mutex<SearchState>>,
    search_task: Option<JoinHandle<()>>,

    pub view_mode: ViewMode,
    pub view_focus: ViewFocus,
    pub table_state: TableState,
    column_offset: usize,
    scroll_offset: u16,
    detail_scroll: u16,

    syntax_set: SyntaxSet,
    syntax_theme: Theme,
    cached_detail: Text<'static>,
    detail_for: Option<(String, usize)>,

    // Layout areas (for mouse interaction)
    query_area: Rect,
    earliest_area: Rect,
    latest_area: Rect,
    main_area: Rect,
    detail_area: Rect,
}

impl App {
    pub fn new(session: SearchSession) -> App {
        let theme_set = ThemeSet::load_defaults();
        let syntax_theme = theme_set
            .themes
            .get("base16-ocean.dark")
            .cloned()
            .unwrap_or_default();
        let (earliest, latest) = default_inputs();

        App {
            query: String::new(),
            cursor_position: 0,
            input_scroll: 0,
            input_scroll_x: 0,
            earliest,
            latest,
            input_mode: InputMode::Normal,
            active_field: InputField::Query,
            status_message: String::from("Press 'e' to edit the query, Enter to search, '?' for help."),
            theme: AppTheme::default(),
            session,
            search_state: Arc::new(Mutex::new(SearchState::default())),
            search_task: None,
            view_mode: ViewMode::Table,
            view_focus: ViewFocus::ContentList,
            table_state: TableState::default(),
            column_offset: 0,
            scroll_offset: 0,
            detail_scroll: 0,
            syntax_set: SyntaxSet::load_defaults_newlines(),
            syntax_theme,
            cached_detail: Text::default(),
            detail_for: None,
            query_area: Rect::default(),
            earliest_area: Rect::default(),
            latest_area: Rect::default(),
            main_area: Rect::default(),
            detail_area: Rect::default(),
        }
    }

    fn request(&self) -> SearchRequest {
        SearchRequest {
            query: self.query.clone(),
            earliest: self.earliest.clone(),
            latest: self.latest.clone(),
        }
    }

    fn search_running(&self) -> bool {
        self.search_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn start_search(&mut self) {
        if self.search_running() {
            self.status_message = String::from("A search is already running.");
            return;
        }

        let request = self.request();
        info!("Starting search for: {}", request.query);
        self.status_message = String::from("Search submitted.");
        self.table_state = TableState::default();
        self.column_offset = 0;
        self.scroll_offset = 0;
        self.detail_scroll = 0;
        self.detail_for = None;

        let session = self.session.clone();
        let state = self.search_state.clone();
        self.search_task = Some(tokio::spawn(async move {
            if let Err(e) = session.run(&request, &state).await {
                error!("Search for '{}' ended with: {}", request.query, e);
            }
        }));
    }

    async fn clear_results(&mut self) {
        if self.search_running() {
            self.status_message = String::from("Cannot clear while a search is running.");
            return;
        }
        *self.search_state.lock().await = SearchState::default();
        self.table_state = TableState::default();
        self.column_offset = 0;
        self.scroll_offset = 0;
        self.detail_for = None;
        self.status_message = String::from("Results cleared.");
    }

    fn edit(&mut self, field: InputField) {
        self.input_mode = InputMode::Editing;
        self.active_field = field;
        self.clamp_cursor();
        self.status_message = String::from(
            "Editing... Enter to search, Tab for next field, Esc to stop editing.",
        );
    }

    fn active_line_mut(&mut self) -> Option<&mut String> {
        match self.active_field {
            InputField::Query => None,
            InputField::Earliest => Some(&mut self.earliest),
            InputField::Latest => Some(&mut self.latest),
        }
    }

    // --- Cursor Logic (query editor) ---
    fn clamp_cursor(&mut self) {
        if self.cursor_position > self.query.len() {
            self.cursor_position = self.query.len();
        }
    }

    fn move_cursor_left(&mut self) {
        if self.cursor_position > 0 {
            let mut new_pos = self.cursor_position - 1;
            while new_pos > 0 && !self.query.is_char_boundary(new_pos) {
                new_pos -= 1;
            }
            self.cursor_position = new_pos;
        }
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.query.len() {
            let mut new_pos = self.cursor_position + 1;
            while new_pos < self.query.len() && !self.query.is_char_boundary(new_pos) {
                new_pos += 1;
            }
            self.cursor_position = new_pos;
        }
    }

    fn move_cursor_up(&mut self) {
        let text_before = &self.query[..self.cursor_position];
        if let Some(last_nl_idx) = text_before.rfind('\n') {
            let col = self.cursor_position - (last_nl_idx + 1);
            let prev_line_start = self.query[..last_nl_idx]
                .rfind('\n')
                .map(|i| i + 1)
                .unwrap_or(0);
            let prev_line_len = last_nl_idx - prev_line_start;
            self.cursor_position = prev_line_start + col.min(prev_line_len);
            self.snap_cursor_to_char();
        }
    }

    fn move_cursor_down(&mut self) {
        let line_start = self.query[..self.cursor_position]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let col = self.cursor_position - line_start;

        if let Some(next_nl_rel) = self.query[self.cursor_position..].find('\n') {
            let next_line_start = self.cursor_position + next_nl_rel + 1;
            let rest = &self.query[next_line_start..];
            let next_line_len = rest.find('\n').unwrap_or(rest.len());
            self.cursor_position = next_line_start + col.min(next_line_len);
            self.snap_cursor_to_char();
        }
    }

    // Column math is in bytes; step back onto a char boundary.
    fn snap_cursor_to_char(&mut self) {
        while self.cursor_position > 0 && !self.query.is_char_boundary(self.cursor_position) {
            self.cursor_position -= 1;
        }
    }

    fn insert_char(&mut self, c: char) {
        if let Some(line) = self.active_line_mut() {
            line.push(c);
            return;
        }
        self.clamp_cursor();
        self.query.insert(self.cursor_position, c);
        self.cursor_position += c.len_utf8();
    }

    fn delete_char(&mut self) {
        if let Some(line) = self.active_line_mut() {
            line.pop();
            return;
        }
        if self.cursor_position > 0 {
            self.move_cursor_left();
            self.query.remove(self.cursor_position);
        }
    }

    // --- Results navigation ---
    fn select_row(&mut self, index: usize, row_count: usize) {
        if row_count == 0 {
            return;
        }
        self.table_state.select(Some(index.min(row_count - 1)));
        self.detail_scroll = 0;
    }

    fn select_next(&mut self, row_count: usize) {
        let next = self.table_state.selected().map_or(0, |i| i + 1);
        self.select_row(next, row_count);
    }

    fn select_previous(&mut self, row_count: usize) {
        let prev = self.table_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.select_row(prev, row_count);
    }

    fn scroll_columns(&mut self, delta: isize, column_count: usize) {
        let max = column_count.saturating_sub(1) as isize;
        self.column_offset = (self.column_offset as isize + delta).clamp(0, max.max(0)) as usize;
    }

    fn toggle_view_mode(&mut self) {
        match self.view_mode {
            ViewMode::RawEvents => {
                self.view_mode = ViewMode::Table;
                self.table_state.select(Some(self.scroll_offset as usize));
            }
            ViewMode::Table => {
                self.view_mode = ViewMode::RawEvents;
                if let Some(idx) = self.table_state.selected() {
                    self.scroll_offset = idx.min(u16::MAX as usize) as u16;
                }
                self.view_focus = ViewFocus::ContentList;
            }
        }
        self.detail_for = None;
        self.status_message = format!("Switched to {:?} mode.", self.view_mode);
    }

    /// Re-renders the detail pane when the selected row or the result set changed.
    fn refresh_detail(&mut self, state: &SearchState) {
        if self.view_mode != ViewMode::Table {
            return;
        }
        let selected = self.table_state.selected().unwrap_or(0);
        let key = (state.job_id.clone().unwrap_or_default(), selected);
        if self.detail_for.as_ref() == Some(&key) && !state.loading {
            return;
        }
        self.cached_detail = match state.results.get(selected) {
            Some(row) => render_yaml_detail(&self.syntax_set, &self.syntax_theme, row),
            None => Text::from("Select an event..."),
        };
        if !state.loading {
            self.detail_for = Some(key);
        }
    }

    fn handle_key(&mut self, key: KeyEvent, state: &SearchState) -> KeyAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let row_count = state.results.len();

        match self.input_mode {
            InputMode::Help => {
                self.input_mode = InputMode::Normal;
                KeyAction::None
            }
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => KeyAction::Quit,
                KeyCode::Char('?') => {
                    self.input_mode = InputMode::Help;
                    KeyAction::None
                }
                KeyCode::Char('e') | KeyCode::Char('i') => {
                    self.edit(InputField::Query);
                    KeyAction::None
                }
                KeyCode::Char('f') => {
                    self.edit(InputField::Earliest);
                    KeyAction::None
                }
                KeyCode::Char('u') => {
                    self.edit(InputField::Latest);
                    KeyAction::None
                }
                KeyCode::Char('v') if ctrl => {
                    self.toggle_view_mode();
                    KeyAction::None
                }
                KeyCode::Tab => {
                    if self.view_mode == ViewMode::Table {
                        self.view_focus = match self.view_focus {
                            ViewFocus::ContentList => ViewFocus::ContentDetail,
                            ViewFocus::ContentDetail => ViewFocus::ContentList,
                        };
                    }
                    KeyAction::None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    match (self.view_mode, self.view_focus) {
                        (ViewMode::RawEvents, _) => {
                            self.scroll_offset = self.scroll_offset.saturating_add(1)
                        }
                        (ViewMode::Table, ViewFocus::ContentList) => self.select_next(row_count),
                        (ViewMode::Table, ViewFocus::ContentDetail) => {
                            self.detail_scroll = self.detail_scroll.saturating_add(1)
                        }
                    }
                    KeyAction::None
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    match (self.view_mode, self.view_focus) {
                        (ViewMode::RawEvents, _) => {
                            self.scroll_offset = self.scroll_offset.saturating_sub(1)
                        }
                        (ViewMode::Table, ViewFocus::ContentList) => {
                            self.select_previous(row_count)
                        }
                        (ViewMode::Table, ViewFocus::ContentDetail) => {
                            self.detail_scroll = self.detail_scroll.saturating_sub(1)
                        }
                    }
                    KeyAction::None
                }
                KeyCode::Left | KeyCode::Char('h') => {
                    self.scroll_columns(-1, state.columns.len());
                    KeyAction::None
                }
                KeyCode::Right | KeyCode::Char('l') => {
                    self.scroll_columns(1, state.columns.len());
                    KeyAction::None
                }
                KeyCode::Enter => KeyAction::Search,
                _ => KeyAction::None,
            },
            InputMode::Editing => match key.code {
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                    self.status_message = String::from("Stopped editing.");
                    KeyAction::None
                }
                KeyCode::Tab => {
                    self.active_field = self.active_field.next();
                    KeyAction::None
                }
                KeyCode::Enter
                    if self.active_field == InputField::Query
                        && key.modifiers.contains(KeyModifiers::SHIFT) =>
                {
                    self.insert_char('\n');
                    KeyAction::None
                }
                KeyCode::Char('j') if ctrl && self.active_field == InputField::Query => {
                    self.insert_char('\n');
                    KeyAction::None
                }
                KeyCode::Enter => {
                    self.input_mode = InputMode::Normal;
                    KeyAction::Search
                }
                KeyCode::Char(c) if !ctrl => {
                    if !c.is_control() {
                        self.insert_char(c);
                    }
                    KeyAction::None
                }
                KeyCode::Backspace => {
                    self.delete_char();
                    KeyAction::None
                }
                KeyCode::Left if self.active_field == InputField::Query => {
                    self.move_cursor_left();
                    KeyAction::None
                }
                KeyCode::Right if self.active_field == InputField::Query => {
                    self.move_cursor_right();
                    KeyAction::None
                }
                KeyCode::Up if self.active_field == InputField::Query => {
                    self.move_cursor_up();
                    KeyAction::None
                }
                KeyCode::Down if self.active_field == InputField::Query => {
                    self.move_cursor_down();
                    KeyAction::None
                }
                _ => KeyAction::None,
            },
        }
    }

    fn handle_click(&mut self, col: u16, row: u16) {
        if is_inside(self.query_area, col, row) {
            self.edit(InputField::Query);
        } else if is_inside(self.earliest_area, col, row) {
            self.edit(InputField::Earliest);
        } else if is_inside(self.latest_area, col, row) {
            self.edit(InputField::Latest);
        } else if is_inside(self.main_area, col, row) {
            self.input_mode = InputMode::Normal;
            self.view_focus = ViewFocus::ContentList;
        } else if is_inside(self.detail_area, col, row) {
            self.input_mode = InputMode::Normal;
            self.view_focus = ViewFocus::ContentDetail;
        }
    }
}

pub async fn run_app(config: Config) -> Result<(), Box<dyn Error>> {
    let session = crate::build_session(&config)?;
    info!(
        "Search jobs endpoint: '{}'",
        session.client().api().search_jobs_url()
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session);
    let res = run_loop(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        SetCursorStyle::DefaultUserShape
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{:?}", err);
    }

    Ok(())
}

async fn run_loop<B: Backend + io::Write>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<(), Box<dyn Error>>
where
    <B as Backend>::Error: 'static,
{
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();
    let search_state = app.search_state.clone();

    loop {
        let cursor_style = match app.input_mode {
            InputMode::Editing => SetCursorStyle::SteadyBar,
            _ => SetCursorStyle::DefaultUserShape,
        };
        let _ = execute!(terminal.backend_mut(), cursor_style);

        {
            // Held only while drawing; the search task never awaits I/O under it.
            let state = search_state.lock().await;
            app.refresh_detail(&state);
            terminal.draw(|f| ui(f, app, &state))?;
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let action = {
                        let state = search_state.lock().await;
                        app.handle_key(key, &state)
                    };
                    match action {
                        KeyAction::Quit => return Ok(()),
                        KeyAction::Search => app.start_search(),
                        KeyAction::None => {}
                    }
                    if key.code == KeyCode::Char('r')
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        app.clear_results().await;
                    }
                }
                Event::Mouse(mouse_event) => {
                    let state = search_state.lock().await;
                    let row_count = state.results.len();
                    match mouse_event.kind {
                        MouseEventKind::ScrollDown => match app.view_mode {
                            ViewMode::RawEvents => {
                                app.scroll_offset = app.scroll_offset.saturating_add(1)
                            }
                            ViewMode::Table => match app.view_focus {
                                ViewFocus::ContentList => app.select_next(row_count),
                                ViewFocus::ContentDetail => {
                                    app.detail_scroll = app.detail_scroll.saturating_add(1)
                                }
                            },
                        },
                        MouseEventKind::ScrollUp => match app.view_mode {
                            ViewMode::RawEvents => {
                                app.scroll_offset = app.scroll_offset.saturating_sub(1)
                            }
                            ViewMode::Table => match app.view_focus {
                                ViewFocus::ContentList => app.select_previous(row_count),
                                ViewFocus::ContentDetail => {
                                    app.detail_scroll = app.detail_scroll.saturating_sub(1)
                                }
                            },
                        },
                        MouseEventKind::Down(MouseButton::Left) => {
                            app.handle_click(mouse_event.column, mouse_event.row)
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

/// Expands string fields that themselves hold JSON, as event payloads often do.
fn recursive_json_parse(v: Value) -> Value {
    match v {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, val)| (k, recursive_json_parse(val)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.into_iter().map(recursive_json_parse).collect()),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => recursive_json_parse(parsed),
            _ => Value::String(s),
        },
        _ => v,
    }
}

fn syntect_style_to_ratatui(style: syntect::highlighting::Style) -> Style {
    let mut s = Style::default();

    if style.foreground.a > 0 {
        s = s.fg(Color::Rgb(
            style.foreground.r,
            style.foreground.g,
            style.foreground.b,
        ));
    }

    // Background is left to the terminal
    if style.font_style.contains(FontStyle::BOLD) {
        s = s.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        s = s.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        s = s.add_modifier(Modifier::UNDERLINED);
    }

    s
}

fn render_yaml_detail(syntax_set: &SyntaxSet, theme: &Theme, row: &SearchResult) -> Text<'static> {
    let parsed_value = recursive_json_parse(Value::Object(row.clone()));

    let yaml_str = serde_yaml::to_string(&parsed_value)
        .unwrap_or_else(|e| format!("Error converting to YAML: {}", e));

    let syntax = syntax_set
        .find_syntax_by_extension("yaml")
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text());
    let mut h = HighlightLines::new(syntax, theme);

    let lines: Vec<Line> = yaml_str
        .lines()
        .map(|line| {
            let ranges = h.highlight_line(line, syntax_set).unwrap_or_default();
            Line::from(
                ranges
                    .into_iter()
                    .map(|(style, text)| {
                        Span::styled(text.to_string(), syntect_style_to_ratatui(style))
                    })
                    .collect::<Vec<Span>>(),
            )
        })
        .collect();

    Text::from(lines)
}

fn field_block<'a>(title: &'a str, active: bool, theme: &AppTheme) -> Block<'a> {
    let color = if active { theme.input_edit } else { theme.title_main };
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(title)
        .border_style(Style::default().fg(color))
}

fn ui(f: &mut Frame, app: &mut App, state: &SearchState) {
    let header_height = 5; // 3 query lines + borders

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(header_height), // Query + time range + timeline
            Constraint::Length(1),             // Job status
            Constraint::Length(1),             // Error banner
            Constraint::Min(10),               // Results
            Constraint::Length(1),             // Footer
        ])
        .split(f.area());

    let header_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Length(20),
            Constraint::Percentage(20),
        ])
        .split(chunks[0]);

    // Earliest shares its bottom border with Latest's top border.
    let time_split = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Length(3)])
        .split(header_chunks[1]);

    app.query_area = header_chunks[0];
    app.earliest_area = time_split[0];
    app.latest_area = time_split[1];

    let editing = app.input_mode == InputMode::Editing;

    // --- Query editor ---
    let input_area_width = header_chunks[0].width.saturating_sub(2);
    let input_display_height = header_height.saturating_sub(2);

    let text_before = &app.query[..app.cursor_position.min(app.query.len())];
    let cursor_line_idx = text_before.matches('\n').count() as u16;
    let cursor_col_idx = match text_before.rfind('\n') {
        Some(nl) => text_before[nl + 1..].chars().count(),
        None => text_before.chars().count(),
    } as u16;

    if cursor_line_idx >= app.input_scroll + input_display_height {
        app.input_scroll = cursor_line_idx - input_display_height + 1;
    } else if cursor_line_idx < app.input_scroll {
        app.input_scroll = cursor_line_idx;
    }
    if cursor_col_idx >= app.input_scroll_x + input_area_width {
        app.input_scroll_x = cursor_col_idx - input_area_width + 1;
    } else if cursor_col_idx < app.input_scroll_x {
        app.input_scroll_x = cursor_col_idx;
    }

    let query_active = editing && app.active_field == InputField::Query;
    let query = Paragraph::new(app.query.as_str())
        .style(Style::default().fg(if query_active {
            app.theme.input_edit
        } else {
            app.theme.text
        }))
        .block(field_block("Query", query_active, &app.theme))
        .scroll((app.input_scroll, app.input_scroll_x));
    f.render_widget(query, header_chunks[0]);

    // --- Time range ---
    let earliest_active = editing && app.active_field == InputField::Earliest;
    let latest_active = editing && app.active_field == InputField::Latest;
    let earliest = Paragraph::new(app.earliest.as_str())
        .style(Style::default().fg(app.theme.text))
        .block(
            Block::default()
                .borders(Borders::TOP | Borders::LEFT | Borders::RIGHT)
                .border_type(BorderType::Rounded)
                .title("Earliest")
                .border_style(Style::default().fg(if earliest_active {
                    app.theme.input_edit
                } else {
                    app.theme.title_main
                })),
        );
    f.render_widget(earliest, app.earliest_area);
    let latest = Paragraph::new(app.latest.as_str())
        .style(Style::default().fg(app.theme.text))
        .block(field_block("Latest", latest_active, &app.theme));
    f.render_widget(latest, app.latest_area);

    // --- Timeline ---
    let spark_data = state
        .timeline
        .as_ref()
        .map(|t| t.counts())
        .unwrap_or_default();
    let timeline_title = match &state.timeline {
        Some(t) => format!("Timeline ({} events)", t.total_event_count),
        None => "Timeline".to_string(),
    };
    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .title(timeline_title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(app.theme.border)),
        )
        .data(&spark_data)
        .style(Style::default().fg(app.theme.highlight));
    f.render_widget(sparkline, header_chunks[2]);

    // --- Job status ---
    let status_line = match (&state.job_id, state.job_status) {
        (Some(job_id), Some(status)) => {
            let mut spans = vec![
                Span::styled("Job ID: ", Style::default().fg(app.theme.title_secondary)),
                Span::styled(job_id.clone(), Style::default().fg(app.theme.text)),
                Span::styled(" | Status: ", Style::default().fg(app.theme.title_secondary)),
                Span::styled(
                    status.to_string(),
                    Style::default()
                        .fg(app.theme.text)
                        .add_modifier(Modifier::BOLD),
                ),
            ];
            if state.loading {
                if let Some(elapsed) = state.elapsed() {
                    spans.push(Span::styled(
                        format!(" (Elapsed: {}s)", elapsed.as_secs()),
                        Style::default().fg(app.theme.text),
                    ));
                }
            }
            if !state.results.is_empty() {
                spans.push(Span::styled(
                    " | ",
                    Style::default().fg(app.theme.title_secondary),
                ));
                spans.push(Span::styled(
                    format!("{} events", state.results.len()),
                    Style::default().fg(app.theme.text),
                ));
            }
            Line::from(spans)
        }
        (None, Some(_)) if state.loading => Line::from("Creating search job..."),
        _ => Line::from(app.status_message.as_str()),
    };
    f.render_widget(
        Paragraph::new(status_line)
            .alignment(Alignment::Center)
            .style(Style::default().fg(app.theme.text)),
        chunks[1],
    );

    if let Some(err) = &state.error {
        f.render_widget(
            Paragraph::new(err.as_str())
                .alignment(Alignment::Center)
                .style(
                    Style::default()
                        .fg(app.theme.error)
                        .add_modifier(Modifier::BOLD),
                ),
            chunks[2],
        );
    }

    // --- Results ---
    let results_area = chunks[3];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(match app.view_mode {
            ViewMode::RawEvents => "Results (Raw)",
            ViewMode::Table => "Results",
        })
        .border_style(Style::default().fg(app.theme.border))
        .padding(Padding::new(1, 1, 0, 0));

    app.main_area = results_area;
    app.detail_area = Rect::default();

    if state.results.is_empty() {
        let placeholder = if state.loading {
            "Searching..."
        } else if state.has_searched() {
            "No results found"
        } else {
            "Enter a query and press Enter to search"
        };
        f.render_widget(
            Paragraph::new(placeholder)
                .alignment(Alignment::Center)
                .style(Style::default().fg(app.theme.text))
                .block(block),
            results_area,
        );
    } else {
        match app.view_mode {
            ViewMode::RawEvents => render_raw(f, app, state, results_area, block),
            ViewMode::Table => render_table(f, app, state, results_area, block),
        }
    }

    // --- Footer ---
    let hints = [
        (" e ", "Query  |  "),
        (" f/u ", "Time  |  "),
        (" Enter ", "Search  |  "),
        (" ←/→ ", "Columns  |  "),
        (" ^V ", "View  |  "),
        (" ^R ", "Clear  |  "),
        (" ? ", "Help  |  "),
        (" q ", "Quit"),
    ];
    let footer_spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, label)| {
            [
                Span::styled(*key, Style::default().fg(app.theme.title_main)),
                Span::styled(*label, Style::default().fg(app.theme.text)),
            ]
        })
        .collect();
    f.render_widget(
        Paragraph::new(Line::from(footer_spans)).alignment(Alignment::Center),
        chunks[4],
    );

    if app.input_mode == InputMode::Help {
        render_help(f, app);
    }

    // Cursor
    if editing {
        match app.active_field {
            InputField::Query => {
                let displayed_y = cursor_line_idx.saturating_sub(app.input_scroll);
                let displayed_x = cursor_col_idx.saturating_sub(app.input_scroll_x);
                if displayed_y < input_display_height && displayed_x < input_area_width {
                    f.set_cursor_position(Position::new(
                        header_chunks[0].x + 1 + displayed_x,
                        header_chunks[0].y + 1 + displayed_y,
                    ));
                }
            }
            InputField::Earliest => f.set_cursor_position(Position::new(
                app.earliest_area.x + 1 + app.earliest.chars().count() as u16,
                app.earliest_area.y + 1,
            )),
            InputField::Latest => f.set_cursor_position(Position::new(
                app.latest_area.x + 1 + app.latest.chars().count() as u16,
                app.latest_area.y + 1,
            )),
        }
    }
}

fn render_raw(f: &mut Frame, app: &App, state: &SearchState, area: Rect, block: Block) {
    let separator = "-".repeat(area.width.saturating_sub(6) as usize);
    let mut content = vec![];
    for (i, row) in state.results.iter().enumerate() {
        if i > 0 {
            content.push(Line::from(Span::styled(
                separator.clone(),
                Style::default().fg(app.theme.border),
            )));
        }
        for field in row.keys() {
            content.push(Line::from(vec![
                Span::styled(
                    format!("{}: ", field),
                    Style::default().fg(app.theme.highlight),
                ),
                Span::styled(cell_text(row, field), Style::default().fg(app.theme.text)),
            ]));
        }
    }
    let paragraph = Paragraph::new(content)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.scroll_offset, 0));
    f.render_widget(paragraph, area);
}

fn render_table(f: &mut Frame, app: &mut App, state: &SearchState, area: Rect, block: Block) {
    let focus_style = |focus: ViewFocus| {
        if app.view_focus == focus {
            Style::default().fg(app.theme.active)
        } else {
            Style::default().fg(app.theme.border)
        }
    };
    let table_border_style = focus_style(ViewFocus::ContentList);
    let detail_border_style = focus_style(ViewFocus::ContentDetail);

    f.render_widget(block.clone(), area);
    let inner_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(block.inner(area));
    app.main_area = inner_chunks[0];
    app.detail_area = inner_chunks[1];

    let visible = &state.columns[app.column_offset.min(state.columns.len())..];

    let header = Row::new(visible.iter().map(|c| c.header_name.clone()))
        .style(
            Style::default()
                .fg(app.theme.title_secondary)
                .add_modifier(Modifier::UNDERLINED),
        )
        .bottom_margin(1);

    let rows: Vec<Row> = state
        .results
        .iter()
        .map(|row| {
            Row::new(
                visible
                    .iter()
                    .map(|c| cell_text(row, &c.field).lines().next().unwrap_or("").to_string()),
            )
            .style(Style::default().fg(app.theme.text))
        })
        .collect();

    let widths: Vec<Constraint> = visible
        .iter()
        .map(|c| Constraint::Min(c.min_width.max(MIN_COLUMN_WIDTH)))
        .collect();

    let title = if app.column_offset > 0 {
        format!("« {} more", app.column_offset)
    } else {
        String::new()
    };
    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(Style::default().bg(app.theme.highlight).fg(Color::White))
        .highlight_symbol(">> ")
        .block(
            Block::default()
                .borders(Borders::RIGHT)
                .title(title)
                .border_style(table_border_style),
        );
    f.render_stateful_widget(table, inner_chunks[0], &mut app.table_state);

    let detail = Paragraph::new(app.cached_detail.clone())
        .block(
            Block::default()
                .borders(Borders::NONE)
                .border_style(detail_border_style)
                .padding(Padding::new(1, 0, 0, 0)),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0))
        .style(Style::default().fg(app.theme.text));
    f.render_widget(detail, inner_chunks[1]);
}

fn render_help(f: &mut Frame, app: &App) {
    let area = centered_rect(60, 70, f.area());
    f.render_widget(Clear, area);

    let shortcuts = [
        ("General", ""),
        ("?", "Show this Help"),
        ("q", "Quit"),
        ("", ""),
        ("Search Input", ""),
        ("e / i", "Edit Query"),
        ("f / u", "Edit Earliest / Latest Time"),
        ("Tab", "Next Input Field"),
        ("Enter", "Run Search"),
        ("Shift+Enter / Ctrl+j", "Newline in Query"),
        ("Esc", "Stop Editing"),
        ("", ""),
        ("Results", ""),
        ("j / k / Down / Up", "Select Row / Scroll"),
        ("h / l / Left / Right", "Scroll Columns"),
        ("Tab", "Toggle Table / Detail Focus"),
        ("Ctrl+v", "Toggle Raw / Table View"),
        ("Ctrl+r", "Clear Results"),
    ];

    let rows: Vec<Row> = shortcuts
        .iter()
        .map(|(k, d)| {
            let style = if d.is_empty() {
                Style::default()
                    .fg(app.theme.title_secondary)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(app.theme.text)
            };
            Row::new(vec![k.to_string(), d.to_string()]).style(style)
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(25), Constraint::Min(30)]).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Keyboard Shortcuts")
            .border_style(Style::default().fg(app.theme.title_main)),
    );
    f.render_widget(table, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::models::search::{column_defs, JobStatus};
    use crate::search::SearchClient;
    use crate::test_support::test_config;
    use ratatui::backend::TestBackend;
    use serde_json::json;

    fn app() -> App {
        let client = SearchClient::new(ApiClient::new(&test_config("http://localhost:1")).unwrap());
        App::new(SearchSession::new(
            client,
            Duration::from_secs(1),
            Duration::from_millis(10),
        ))
    }

    fn press(app: &mut App, code: KeyCode) -> KeyAction {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE), &SearchState::default())
    }

    fn type_str(app: &mut App, s: &str) {
        for c in s.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn screen(app: &mut App, state: &SearchState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| ui(f, app, state)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn finished_state() -> SearchState {
        let results: Vec<SearchResult> = vec![
            json!({"host": "web-1", "status": 200}).as_object().cloned().unwrap(),
            json!({"host": "web-2", "status": 503}).as_object().cloned().unwrap(),
        ];
        SearchState {
            columns: column_defs(&results),
            results,
            job_id: Some("job-7".to_string()),
            job_status: Some(JobStatus::Completed),
            ..SearchState::default()
        }
    }

    #[tokio::test]
    async fn editing_query_and_time_fields() {
        let mut app = app();
        assert_eq!(press(&mut app, KeyCode::Char('e')), KeyAction::None);
        type_str(&mut app, "héllo");
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.query, "hélo");

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.active_field, InputField::Earliest);
        for _ in 0..app.earliest.len() {
            press(&mut app, KeyCode::Backspace);
        }
        type_str(&mut app, "2024-01-01T00:00");
        assert_eq!(app.request().earliest, "2024-01-01T00:00");
        assert_eq!(app.request().query, "hélo");

        assert_eq!(press(&mut app, KeyCode::Enter), KeyAction::Search);
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[tokio::test]
    async fn newline_and_vertical_cursor_movement() {
        let mut app = app();
        press(&mut app, KeyCode::Char('e'));
        type_str(&mut app, "dataset=a");
        app.handle_key(
            KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT),
            &SearchState::default(),
        );
        type_str(&mut app, "| limit");
        press(&mut app, KeyCode::Up);
        type_str(&mut app, "X");
        assert_eq!(app.query, "datasetX=a\n| limit");
        press(&mut app, KeyCode::Down);
        assert_eq!(app.cursor_position, "datasetX=a\n| limit".len());
    }

    #[tokio::test]
    async fn normal_mode_keys() {
        let mut app = app();
        assert_eq!(press(&mut app, KeyCode::Char('?')), KeyAction::None);
        assert_eq!(app.input_mode, InputMode::Help);
        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(press(&mut app, KeyCode::Enter), KeyAction::Search);
        assert_eq!(press(&mut app, KeyCode::Char('q')), KeyAction::Quit);
    }

    #[tokio::test]
    async fn row_selection_and_column_scroll_are_clamped() {
        let mut app = app();
        let state = finished_state();
        for _ in 0..5 {
            app.handle_key(KeyEvent::new(KeyCode::Down, KeyModifiers::NONE), &state);
        }
        assert_eq!(app.table_state.selected(), Some(1));
        app.handle_key(KeyEvent::new(KeyCode::Up, KeyModifiers::NONE), &state);
        assert_eq!(app.table_state.selected(), Some(0));

        for _ in 0..5 {
            app.handle_key(KeyEvent::new(KeyCode::Right, KeyModifiers::NONE), &state);
        }
        assert_eq!(app.column_offset, 1);
        app.handle_key(KeyEvent::new(KeyCode::Left, KeyModifiers::NONE), &state);
        assert_eq!(app.column_offset, 0);
    }

    #[tokio::test]
    async fn placeholder_before_and_after_empty_search() {
        let mut app = app();
        let text = screen(&mut app, &SearchState::default());
        assert!(text.contains("Enter a query and press Enter to search"));

        let empty = SearchState {
            job_id: Some("job-0".to_string()),
            job_status: Some(JobStatus::Completed),
            ..SearchState::default()
        };
        let text = screen(&mut app, &empty);
        assert!(text.contains("No results found"));
        assert!(text.contains("job-0"));
    }

    #[tokio::test]
    async fn table_headers_come_from_first_row() {
        let mut app = app();
        let state = finished_state();
        app.refresh_detail(&state);
        let text = screen(&mut app, &state);
        assert!(text.contains("host"));
        assert!(text.contains("status"));
        assert!(text.contains("web-2"));
        assert!(text.contains("2 events"));
    }

    #[tokio::test]
    async fn error_banner_is_rendered() {
        let mut app = app();
        let state = SearchState {
            error: Some("Failed to create search job: Unauthorized".to_string()),
            job_status: Some(JobStatus::Failed),
            ..SearchState::default()
        };
        let text = screen(&mut app, &state);
        assert!(text.contains("Failed to create search job: Unauthorized"));
    }

    #[test]
    fn nested_json_strings_are_expanded() {
        let value = json!({"payload": "{\"user\":\"bob\"}", "count": "42", "plain": "text"});
        let parsed = recursive_json_parse(value);
        assert_eq!(parsed["payload"]["user"], "bob");
        assert_eq!(parsed["count"], "42");
        assert_eq!(parsed["plain"], "text");
    }
}
