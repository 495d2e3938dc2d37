/// CampusLink terminal client
/// Conversation list, scroll-preserving message window and a compose line
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use campuslink_core::api::HttpChatApi;
use campuslink_core::client::{ChatClient, Outcome};
use campuslink_core::compose::ComposeBox;
use campuslink_core::model::ChatEvent;
use campuslink_core::new_conversation::{NewConversationFlow, StartedConversation};
use campuslink_core::state::{ChatState, LoadStatus};
use campuslink_core::viewport::{
    Alignment as RowAlign, ListBody, MessageListView, MessageRow, OlderPageRequest,
    EMPTY_PLACEHOLDER,
};
use campuslink_core::Config;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type Client = ChatClient<HttpChatApi>;

/// Approximate pixel height of one terminal row
const ROW_PX: usize = 20;

/// Results reported back by spawned operations
enum UiMsg {
    Status(String),
    Submitted(ComposeBox),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Conversations,
    Messages,
    Compose,
}

struct Panes {
    conversations: Rect,
    messages: Rect,
    compose: Rect,
    status: Rect,
}

impl Panes {
    fn split(area: Rect) -> Self {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
            .split(area);
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)].as_ref())
            .split(rows[0]);
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
            .split(cols[1]);
        Self {
            conversations: cols[0],
            messages: right[0],
            compose: right[1],
            status: rows[1],
        }
    }
}

struct App {
    client: Client,
    tx: mpsc::UnboundedSender<UiMsg>,
    view: MessageListView,
    compose: ComposeBox,
    compose_busy: bool,
    focus: Focus,
    list_state: ListState,
    status: Option<String>,
}

impl App {
    fn new(client: Client, tx: mpsc::UnboundedSender<UiMsg>, view: MessageListView) -> Self {
        Self {
            client,
            tx,
            view,
            compose: ComposeBox::new(),
            compose_busy: false,
            focus: Focus::Conversations,
            list_state: ListState::default(),
            status: None,
        }
    }

    fn spawn_load_conversations(&self) {
        let client = self.client.clone();
        tokio::spawn(async move {
            // Failures arrive through the event channel
            let _ = client.load_conversations().await;
        });
    }

    fn spawn_open(&self, conversation_id: String) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Ok(Outcome::Applied(_)) = client.open_conversation(&conversation_id).await {
                let _ = client.mark_open_conversation_read().await;
            }
        });
    }

    fn spawn_older(&self, request: OlderPageRequest) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let _ = client
                .load_older_page(&request.conversation_id, request.cursor)
                .await;
        });
    }

    fn spawn_direct(&self, user_id: String) {
        let client = self.client.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut flow = NewConversationFlow::new();
            flow.select(user_id);
            let text = match flow.confirm(&client).await {
                Ok(Outcome::Applied(StartedConversation::Reused(id))) => {
                    format!("Opened existing conversation {}", id)
                }
                Ok(Outcome::Applied(StartedConversation::Created(summary))) => {
                    let viewer = client.read(|s| s.viewer_id().to_string()).await;
                    format!("Started a conversation with {}", summary.label(&viewer))
                }
                Ok(_) => return,
                Err(e) => e.user_message(),
            };
            let _ = tx.send(UiMsg::Status(text));
        });
    }

    fn submit(&mut self, state: &ChatState) {
        if self.compose_busy {
            return;
        }
        let draft = self.compose.draft().trim().to_string();
        if let Some(rest) = draft.strip_prefix("/dm").filter(|r| r.is_empty() || r.starts_with(' ')) {
            let user_id = rest.trim();
            if user_id.is_empty() {
                self.status = Some("Usage: /dm <user_id>".to_string());
            } else {
                self.spawn_direct(user_id.to_string());
                self.compose.clear();
            }
            return;
        }
        if !self.compose.can_submit(state) {
            return;
        }

        self.compose_busy = true;
        let client = self.client.clone();
        let tx = self.tx.clone();
        let mut compose = self.compose.clone();
        tokio::spawn(async move {
            // The draft survives a failed send
            let _ = compose.submit(&client).await;
            let _ = tx.send(UiMsg::Submitted(compose));
        });
    }

    fn handle_msg(&mut self, msg: UiMsg) {
        match msg {
            UiMsg::Status(text) => self.status = Some(text),
            UiMsg::Submitted(compose) => {
                self.compose = compose;
                self.compose_busy = false;
            }
        }
    }

    fn handle_event(&mut self, event: ChatEvent, state: &ChatState) {
        match event {
            ChatEvent::Error { context, message } => {
                self.status = Some(format!("{} failed: {}", context, message));
            }
            ChatEvent::ConversationCreated { conversation_id }
            | ChatEvent::ConversationOpened { conversation_id, .. } => {
                let idx = state
                    .conversations
                    .items
                    .iter()
                    .position(|c| c.id == conversation_id);
                if idx.is_some() {
                    self.list_state.select(idx);
                }
            }
            ChatEvent::ConversationsLoaded { count } => {
                if self.list_state.selected().is_none() && count > 0 {
                    self.list_state.select(Some(0));
                }
            }
            _ => {}
        }
    }

    fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1) as usize;
        self.list_state.select(Some(next));
    }

    fn scroll(&mut self, delta: isize, state: &ChatState) {
        if let Some(request) = self.view.scroll_by(delta, Instant::now(), state) {
            self.spawn_older(request);
        }
    }

    /// Returns true when the app should quit
    fn handle_key(&mut self, key: KeyEvent, state: &ChatState) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        if key.code == KeyCode::Tab {
            self.focus = match self.focus {
                Focus::Conversations => Focus::Messages,
                Focus::Messages => Focus::Compose,
                Focus::Compose => Focus::Conversations,
            };
            return false;
        }

        let page = self.view_page();
        match self.focus {
            Focus::Conversations => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return true,
                KeyCode::Up | KeyCode::Char('k') => {
                    self.move_selection(-1, state.conversations.items.len())
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.move_selection(1, state.conversations.items.len())
                }
                KeyCode::Char('r') => self.spawn_load_conversations(),
                KeyCode::Char('i') => self.focus = Focus::Compose,
                KeyCode::Enter => {
                    let selected = self
                        .list_state
                        .selected()
                        .and_then(|i| state.conversations.items.get(i));
                    if let Some(summary) = selected {
                        self.spawn_open(summary.id.clone());
                        self.focus = Focus::Compose;
                    }
                }
                _ => {}
            },
            Focus::Messages => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Esc => self.focus = Focus::Conversations,
                KeyCode::Up | KeyCode::Char('k') => self.scroll(-1, state),
                KeyCode::Down | KeyCode::Char('j') => self.scroll(1, state),
                KeyCode::PageUp => self.scroll(-page, state),
                KeyCode::PageDown => self.scroll(page, state),
                KeyCode::Home => self.scroll(-(self.view.offset() as isize), state),
                KeyCode::End => self.scroll(self.view.max_offset() as isize, state),
                KeyCode::Char('i') => self.focus = Focus::Compose,
                _ => {}
            },
            Focus::Compose => match key.code {
                KeyCode::Esc => self.focus = Focus::Messages,
                KeyCode::Enter => self.submit(state),
                KeyCode::Backspace if !self.compose_busy => self.compose.backspace(),
                KeyCode::Char(c) if !self.compose_busy => self.compose.push(c),
                KeyCode::PageUp => self.scroll(-page, state),
                KeyCode::PageDown => self.scroll(page, state),
                _ => {}
            },
        }
        false
    }

    fn view_page(&self) -> isize {
        self.view.viewport_height().max(1) as isize
    }

    fn draw<B: Backend>(&mut self, terminal: &mut Terminal<B>, state: &ChatState) -> io::Result<()> {
        let panes = Panes::split(terminal.size()?);

        // Measure first so the view can anchor before this frame is painted
        let inner_width = panes.messages.width.saturating_sub(2) as usize;
        let lines = message_lines(&self.view.body(state), inner_width);
        self.view
            .set_viewport_height(panes.messages.height.saturating_sub(2) as usize);
        self.view.sync(state, lines.len());
        let offset = self.view.offset().min(u16::MAX as usize) as u16;

        let viewer_id = state.viewer_id().to_string();
        let focus = self.focus;
        let border = |pane: Focus| {
            if focus == pane {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            }
        };

        let items: Vec<ListItem> = state
            .conversations
            .items
            .iter()
            .map(|c| {
                let mut lines = vec![Line::from(Span::styled(
                    c.label(&viewer_id),
                    Style::default().add_modifier(Modifier::BOLD),
                ))];
                let preview = c
                    .last_message
                    .as_ref()
                    .map(|m| m.content.clone())
                    .or_else(|| c.subtitle.clone())
                    .unwrap_or_default();
                lines.push(Line::from(Span::styled(
                    preview,
                    Style::default().fg(Color::DarkGray),
                )));
                ListItem::new(lines)
            })
            .collect();
        let list_title = match state.conversations.status {
            LoadStatus::Loading => " Conversations (loading…) ".to_string(),
            _ => format!(" Conversations ({}) ", items.len()),
        };

        let messages_title = {
            let name = state
                .open
                .conversation_id
                .as_deref()
                .and_then(|id| state.conversations.find(id))
                .map(|c| c.label(&viewer_id))
                .unwrap_or_else(|| "Messages".to_string());
            if state.open.loading_older {
                format!(" {} (loading older…) ", name)
            } else {
                format!(" {} ", name)
            }
        };

        let compose_title = if self.compose_busy || state.sending {
            " Sending… ".to_string()
        } else {
            " Message (Enter to send, /dm <user_id>) ".to_string()
        };
        let draft = self.compose.draft().to_string();
        let status = self
            .status
            .clone()
            .or_else(|| state.send_error.clone())
            .unwrap_or_else(|| " Tab: switch pane | Enter: open/send | q: quit".to_string());

        let list_state = &mut self.list_state;
        terminal.draw(|f| {
            let list = List::new(items)
                .block(
                    Block::default()
                        .title(list_title)
                        .borders(Borders::ALL)
                        .border_style(border(Focus::Conversations)),
                )
                .highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan));
            f.render_stateful_widget(list, panes.conversations, list_state);

            let messages = Paragraph::new(lines)
                .block(
                    Block::default()
                        .title(messages_title)
                        .borders(Borders::ALL)
                        .border_style(border(Focus::Messages)),
                )
                .scroll((offset, 0));
            f.render_widget(messages, panes.messages);

            let compose = Paragraph::new(draft).block(
                Block::default()
                    .title(compose_title)
                    .borders(Borders::ALL)
                    .border_style(border(Focus::Compose)),
            );
            f.render_widget(compose, panes.compose);

            let status = Paragraph::new(status).style(Style::default().fg(Color::Cyan));
            f.render_widget(status, panes.status);
        })?;
        Ok(())
    }
}

/// Hard-wrap on character count
fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for raw in text.lines() {
        let chars: Vec<char> = raw.chars().collect();
        if chars.is_empty() {
            out.push(String::new());
            continue;
        }
        for chunk in chars.chunks(width) {
            out.push(chunk.iter().collect());
        }
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

fn row_lines(row: &MessageRow, width: usize) -> Vec<Line<'static>> {
    let (align, name_style) = match row.align {
        RowAlign::Trailing => (
            Alignment::Right,
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ),
        RowAlign::Leading => (
            Alignment::Left,
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
    };
    let name = if row.own { "You".to_string() } else { row.sender_name.clone() };
    let mut header = vec![
        Span::styled(name, name_style),
        Span::styled(
            format!("  {}", row.created_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if let Some(glyph) = row.status_glyph {
        header.push(Span::styled(format!(" {}", glyph), Style::default().fg(Color::Cyan)));
    }

    let mut lines = vec![Line::from(header).alignment(align)];
    // Bubbles take at most three quarters of the pane
    let bubble = (width * 3 / 4).max(1);
    lines.extend(
        wrap(&row.content, bubble)
            .into_iter()
            .map(|l| Line::from(l).alignment(align)),
    );
    lines.push(Line::default());
    lines
}

fn message_lines(body: &ListBody, width: usize) -> Vec<Line<'static>> {
    let hint = |text: &str| {
        vec![Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(Color::DarkGray),
        ))
        .alignment(Alignment::Center)]
    };
    match body {
        ListBody::Closed => hint("Select a conversation"),
        ListBody::Loading => hint("Loading…"),
        ListBody::Empty => hint(EMPTY_PLACEHOLDER),
        ListBody::Rows(rows) => rows.iter().flat_map(|r| row_lines(r, width)).collect(),
    }
}

fn init_logging() -> anyhow::Result<PathBuf> {
    // Logs go to a file so they do not corrupt the screen
    let path = std::env::temp_dir().join("campuslink-tui.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let (config, _) = Config::from_args(args.get(1..).unwrap_or(&[]))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let log_path = init_logging()?;
    info!(base_url = %config.base_url, viewer = %config.viewer_id, "starting campuslink-tui");

    let client = ChatClient::new(Arc::new(HttpChatApi::new(&config)), config.viewer_id.clone());
    let events = client.subscribe();
    let (tx, rx) = mpsc::unbounded_channel::<UiMsg>();
    let mut app = App::new(client, tx, MessageListView::from_config(&config, ROW_PX));
    app.spawn_load_conversations();

    // TUI setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let res = run_app(&mut terminal, &mut app, events, rx).await;
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = res {
        warn!(error = %e, "tui loop failed");
        eprintln!("TUI error: {e} (log: {})", log_path.display());
    }
    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    mut events: broadcast::Receiver<ChatEvent>,
    mut rx: mpsc::UnboundedReceiver<UiMsg>,
) -> io::Result<()> {
    let mut last_redraw: Option<Instant> = None;

    loop {
        while let Ok(msg) = rx.try_recv() {
            app.handle_msg(msg);
        }

        let state = app.client.snapshot().await;
        loop {
            match events.try_recv() {
                Ok(event) => app.handle_event(event, &state),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        // Trailing edge of the throttled scroll trigger
        if let Some(request) = app.view.poll(Instant::now(), &state) {
            app.spawn_older(request);
        }

        if event::poll(Duration::from_millis(5))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key, &state) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll(-3, &state),
                    MouseEventKind::ScrollDown => app.scroll(3, &state),
                    _ => {}
                },
                _ => {}
            }
        }

        if last_redraw.map_or(true, |t| t.elapsed() >= Duration::from_millis(16)) {
            app.draw(terminal, &state)?;
            last_redraw = Some(Instant::now());
        }

        tokio::time::sleep(Duration::from_millis(8)).await;
    }
}
