//! skald-telemetry: terminal dashboard for a running skald world.
//!
//! Listens for the JSON snapshots a `DiagnosticsSystem` sends over UDP and
//! shows them in a tabbed ratatui view: entity pool, component containers,
//! groups and tags, per-callback timings, captured logs.
//!
//! Run a world with the `diagnostics` feature, then `cargo run -p skald-telemetry`.
//! Pass an address to listen somewhere other than `127.0.0.1:9100`.

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline};
use serde::Deserialize;

const DEFAULT_ADDRESS: &str = "127.0.0.1:9100";

// ── Wire types (must match skald::diag) ─────────────────────────────────

#[derive(Deserialize, Clone, Default)]
struct WorldSnapshot {
    tick: u64,
    elapsed_secs: f32,
    systems_us: f64,
    entity_pool: EntityPoolInfo,
    #[serde(default)]
    containers: Vec<ContainerInfo>,
    #[serde(default)]
    groups: Vec<GroupInfo>,
    #[serde(default)]
    tags: Vec<TagInfo>,
    #[serde(default)]
    callbacks: Vec<CallbackInfo>,
    #[serde(default)]
    logs: Vec<LogEntryInfo>,
}

#[derive(Deserialize, Clone, Default)]
struct EntityPoolInfo {
    total_slots: usize,
    free_count: usize,
    alive_count: usize,
    fragmentation_pct: f32,
}

#[derive(Deserialize, Clone, Default)]
struct ContainerInfo {
    name: String,
    persistent: bool,
    count: usize,
    mutated: usize,
    removed: usize,
}

#[derive(Deserialize, Clone, Default)]
struct GroupInfo {
    label: String,
    size: usize,
}

#[derive(Deserialize, Clone, Default)]
struct TagInfo {
    name: String,
    count: usize,
}

#[derive(Deserialize, Clone, Default)]
struct CallbackInfo {
    system: String,
    callback: String,
    phase: String,
    stage: usize,
    duration_us: f64,
}

#[derive(Deserialize, Clone, Default)]
struct LogEntryInfo {
    level: String,
    #[allow(dead_code)]
    target: String,
    message: String,
    timestamp_secs: f32,
}

// ── Tabs ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Overview,
    Components,
    Groups,
    Systems,
    Logs,
}

impl Tab {
    const ALL: [Tab; 5] = [
        Tab::Overview,
        Tab::Components,
        Tab::Groups,
        Tab::Systems,
        Tab::Logs,
    ];

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    fn label(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Components => "Components",
            Tab::Groups => "Groups & Tags",
            Tab::Systems => "Systems",
            Tab::Logs => "Logs",
        }
    }
}

// ── Log level filter ────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LogFilter {
    All,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogFilter {
    fn next(self) -> Self {
        match self {
            LogFilter::All => LogFilter::Debug,
            LogFilter::Debug => LogFilter::Info,
            LogFilter::Info => LogFilter::Warn,
            LogFilter::Warn => LogFilter::Error,
            LogFilter::Error => LogFilter::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogFilter::All => "ALL",
            LogFilter::Debug => "DEBUG+",
            LogFilter::Info => "INFO+",
            LogFilter::Warn => "WARN+",
            LogFilter::Error => "ERROR",
        }
    }

    fn passes(self, level: &str) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Debug => level != "TRACE",
            LogFilter::Info => matches!(level, "INFO" | "WARN" | "ERROR"),
            LogFilter::Warn => matches!(level, "WARN" | "ERROR"),
            LogFilter::Error => level == "ERROR",
        }
    }
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 1200;
const LOG_CAP: usize = 2000;

struct App {
    address: String,
    latest: WorldSnapshot,
    systems_history: VecDeque<u64>,
    entity_history: VecDeque<u64>,
    active_tab: Tab,
    paused: bool,
    connected: bool,

    // Components tab
    component_scroll: usize,

    // Logs tab
    log_entries: Vec<LogEntryInfo>,
    log_filter: LogFilter,
    log_auto_scroll: bool,
    log_scroll_offset: usize,
}

impl App {
    fn new(address: String) -> Self {
        Self {
            address,
            latest: WorldSnapshot::default(),
            systems_history: VecDeque::with_capacity(HISTORY_CAP),
            entity_history: VecDeque::with_capacity(HISTORY_CAP),
            active_tab: Tab::Overview,
            paused: false,
            connected: false,
            component_scroll: 0,
            log_entries: Vec::new(),
            log_filter: LogFilter::Info,
            log_auto_scroll: true,
            log_scroll_offset: 0,
        }
    }

    fn push_snapshot(&mut self, snap: WorldSnapshot) {
        if self.paused {
            return;
        }

        push_capped(&mut self.systems_history, snap.systems_us.round().max(0.0) as u64);
        push_capped(&mut self.entity_history, snap.entity_pool.alive_count as u64);

        self.log_entries.extend(snap.logs.iter().cloned());
        if self.log_entries.len() > LOG_CAP {
            let excess = self.log_entries.len() - LOG_CAP;
            self.log_entries.drain(..excess);
        }

        let rows = snap.containers.len();
        if rows > 0 && self.component_scroll >= rows {
            self.component_scroll = rows - 1;
        }

        self.latest = snap;
        self.connected = true;
    }

    fn filtered_logs(&self) -> Vec<&LogEntryInfo> {
        self.log_entries
            .iter()
            .filter(|e| self.log_filter.passes(&e.level))
            .collect()
    }

    fn log_counts(&self) -> (usize, usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0, 0);
        for entry in &self.log_entries {
            match entry.level.as_str() {
                "TRACE" => counts.0 += 1,
                "DEBUG" => counts.1 += 1,
                "INFO" => counts.2 += 1,
                "WARN" => counts.3 += 1,
                "ERROR" => counts.4 += 1,
                _ => {}
            }
        }
        counts
    }
}

fn push_capped(history: &mut VecDeque<u64>, value: u64) {
    if history.len() >= HISTORY_CAP {
        history.pop_front();
    }
    history.push_back(value);
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let socket = UdpSocket::bind(&address).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("cannot listen on {address} ({e}); is another skald-telemetry running?"),
        )
    })?;
    socket.set_nonblocking(true)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(address);
    let result = run(&mut terminal, &socket, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    socket: &UdpSocket,
    app: &mut App,
) -> io::Result<()> {
    let mut buf = [0u8; 65536];

    loop {
        // Drain all pending datagrams.
        while let Ok(n) = socket.recv(&mut buf) {
            if let Ok(snap) = serde_json::from_slice::<WorldSnapshot>(&buf[..n]) {
                app.push_snapshot(snap);
            }
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(app, key) {
                    return Ok(());
                }
            }
        }
    }
}

// ── Key handling ─────────────────────────────────────────────────────────

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,

        KeyCode::Char(c @ '1'..='5') => {
            let index = c as usize - '1' as usize;
            app.active_tab = Tab::ALL[index];
        }

        KeyCode::Tab => app.active_tab = app.active_tab.next(),
        KeyCode::BackTab => app.active_tab = app.active_tab.prev(),

        // Components tab keys.
        KeyCode::Up if app.active_tab == Tab::Components => {
            app.component_scroll = app.component_scroll.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Components => {
            if app.component_scroll + 1 < app.latest.containers.len() {
                app.component_scroll += 1;
            }
        }

        // Logs tab keys.
        KeyCode::Char('l') if app.active_tab == Tab::Logs => {
            app.log_filter = app.log_filter.next();
        }
        KeyCode::Char('g') if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = !app.log_auto_scroll;
        }
        KeyCode::Up if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset = app.log_scroll_offset.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll_offset += 1;
        }

        _ => {}
    }
    false
}

// ── UI rendering ─────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(1), // tab bar
            Constraint::Min(6),    // tab content
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_tab_bar(f, app, chunks[1]);

    match app.active_tab {
        Tab::Overview => draw_overview_tab(f, app, chunks[2]),
        Tab::Components => draw_components_tab(f, app, chunks[2]),
        Tab::Groups => draw_groups_tab(f, app, chunks[2]),
        Tab::Systems => draw_systems_tab(f, app, chunks[2]),
        Tab::Logs => draw_logs_tab(f, app, chunks[2]),
    }

    draw_help_bar(f, app, chunks[3]);
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let (status, status_color) = if app.paused {
        (" PAUSED ", Color::Yellow)
    } else if app.connected {
        (" LIVE ", Color::Green)
    } else {
        (" WAITING ", Color::DarkGray)
    };

    let text = Line::from(vec![
        Span::styled(
            format!(" {status} "),
            Style::default().bg(status_color).fg(Color::Black),
        ),
        Span::raw("  "),
        Span::styled("Tick: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.tick),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled("Entities: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{}", s.entity_pool.alive_count),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Systems: ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:.2}ms", s.systems_us / 1000.0),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled("Up: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format_uptime(s.elapsed_secs), Style::default().fg(Color::White)),
    ]);

    let block = Block::default()
        .title(format!(" skald-telemetry @ {} ", app.address))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_tab_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let num = format!(" {} ", i + 1);
        let label = format!("{} ", tab.label());
        if *tab == app.active_tab {
            spans.push(Span::styled(
                num,
                Style::default()
                    .bg(Color::Cyan)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                label,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::styled(num, Style::default().fg(Color::DarkGray)));
            spans.push(Span::styled(label, Style::default().fg(Color::DarkGray)));
        }
        spans.push(Span::raw("  "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Overview Tab ─────────────────────────────────────────────────────────

fn draw_overview_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Length(1), Constraint::Min(3)])
        .split(area);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let systems: Vec<u64> = app.systems_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&systems);
    draw_sparkline(
        f,
        halves[0],
        " Tick Time ",
        &systems,
        Color::Yellow,
        format!(
            "min: {:.2}ms  avg: {:.2}ms  max: {:.2}ms",
            lo / 1000.0,
            avg / 1000.0,
            hi / 1000.0
        ),
    );

    let entities: Vec<u64> = app.entity_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&entities);
    draw_sparkline(
        f,
        halves[1],
        " Live Entities ",
        &entities,
        Color::Green,
        format!("min: {lo:.0}  avg: {avg:.0}  max: {hi:.0}"),
    );

    draw_entity_pool_line(f, app, chunks[1]);
    draw_busiest(f, app, chunks[2]);
}

fn draw_sparkline(
    f: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    data: &[u64],
    color: Color,
    summary: String,
) {
    let block = Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 {
        return;
    }

    let spark_area = Rect {
        height: inner.height - 1,
        ..inner
    };
    let stats_area = Rect {
        y: inner.y + inner.height - 1,
        height: 1,
        ..inner
    };
    f.render_widget(
        Sparkline::default().data(data).style(Style::default().fg(color)),
        spark_area,
    );
    f.render_widget(
        Paragraph::new(Span::styled(summary, Style::default().fg(Color::DarkGray))),
        stats_area,
    );
}

fn draw_entity_pool_line(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let pool = &app.latest.entity_pool;
    let frag = pool.fragmentation_pct;
    let frag_color = if frag < 25.0 {
        Color::Green
    } else if frag < 50.0 {
        Color::Yellow
    } else {
        Color::Red
    };

    let bar = ratio_bar(pool.alive_count, pool.total_slots, 16);
    let spans = vec![
        Span::styled("  Pool: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", pool.total_slots), Style::default().fg(Color::White)),
        Span::styled(" slots  Free: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}", pool.free_count), Style::default().fg(Color::White)),
        Span::styled("  Frag: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{frag:.0}%"), Style::default().fg(frag_color)),
        Span::raw("  "),
        Span::styled(bar, Style::default().fg(frag_color)),
    ];
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// The containers with the most change tracking activity this tick.
fn draw_busiest(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Most Active Containers ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut active: Vec<&ContainerInfo> = app
        .latest
        .containers
        .iter()
        .filter(|c| c.mutated + c.removed > 0)
        .collect();
    if active.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled(
                "  Nothing changed this tick",
                Style::default().fg(Color::DarkGray),
            )),
            inner,
        );
        return;
    }
    active.sort_by(|a, b| (b.mutated + b.removed).cmp(&(a.mutated + a.removed)));

    let lines: Vec<Line> = active
        .iter()
        .take(inner.height as usize)
        .map(|c| {
            Line::from(vec![
                Span::styled(format!("  {:<32}", short_name(&c.name)), Style::default().fg(Color::White)),
                Span::styled(format!(" ~{:<6}", c.mutated), Style::default().fg(Color::Yellow)),
                Span::styled(format!(" -{:<6}", c.removed), Style::default().fg(Color::Red)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Components Tab ───────────────────────────────────────────────────────

fn draw_components_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let containers = &app.latest.containers;
    let block = Block::default()
        .title(format!(" Components ({}) ", containers.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if containers.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled(
                "  No component types registered",
                Style::default().fg(Color::DarkGray),
            )),
            inner,
        );
        return;
    }

    let max_count = containers.iter().map(|c| c.count).max().unwrap_or(0).max(1);
    let name_width = containers
        .iter()
        .map(|c| short_name(&c.name).len())
        .max()
        .unwrap_or(10)
        .min(36);
    let bar_width = inner.width.saturating_sub(name_width as u16 + 34) as usize;

    let mut lines = vec![Line::from(Span::styled(
        format!(
            "  {:name_width$} {:>8} {:>8} {:>8}  save",
            "type", "count", "mutated", "removed"
        ),
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
    ))];

    let visible = (inner.height as usize).saturating_sub(1);
    let offset = app.component_scroll.min(containers.len().saturating_sub(visible));
    for (row, c) in containers.iter().enumerate().skip(offset).take(visible) {
        let selected = row == app.component_scroll;
        let name_style = if selected {
            Style::default().fg(Color::Black).bg(Color::Cyan)
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:name_width$}", short_name(&c.name)), name_style),
            Span::styled(format!(" {:>8}", c.count), Style::default().fg(Color::White)),
            Span::styled(format!(" {:>8}", c.mutated), Style::default().fg(Color::Yellow)),
            Span::styled(format!(" {:>8}", c.removed), Style::default().fg(Color::Red)),
            Span::styled(
                if c.persistent { "   \u{2713}   " } else { "   \u{00b7}   " },
                Style::default().fg(Color::Green),
            ),
            Span::styled(ratio_bar(c.count, max_count, bar_width), Style::default().fg(Color::Cyan)),
        ]));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Groups & Tags Tab ────────────────────────────────────────────────────

fn draw_groups_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let groups = &app.latest.groups;
    let block = Block::default()
        .title(format!(" Groups ({}) ", groups.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(chunks[0]);
    f.render_widget(block, chunks[0]);
    let lines: Vec<Line> = groups
        .iter()
        .take(inner.height as usize)
        .map(|g| {
            Line::from(vec![
                Span::styled(format!(" {:>7} ", g.size), Style::default().fg(Color::Cyan)),
                Span::styled(g.label.clone(), Style::default().fg(Color::White)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);

    let tags = &app.latest.tags;
    let block = Block::default()
        .title(format!(" Tags ({}) ", tags.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(chunks[1]);
    f.render_widget(block, chunks[1]);
    let lines: Vec<Line> = tags
        .iter()
        .take(inner.height as usize)
        .map(|t| {
            let color = if t.name.starts_with('@') {
                Color::Magenta
            } else {
                Color::White
            };
            Line::from(vec![
                Span::styled(format!(" {:>7} ", t.count), Style::default().fg(Color::Cyan)),
                Span::styled(t.name.clone(), Style::default().fg(color)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Systems Tab ──────────────────────────────────────────────────────────

fn draw_systems_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(
            " Callback Timings (tick total {:.2}ms) ",
            app.latest.systems_us / 1000.0
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let callbacks = &app.latest.callbacks;
    if callbacks.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled(
                "  No callback timing data",
                Style::default().fg(Color::DarkGray),
            )),
            inner,
        );
        return;
    }

    // Callbacks arrive in execution order: phase, then stage.
    let max_dur = callbacks
        .iter()
        .map(|c| c.duration_us)
        .fold(1.0_f64, f64::max);
    let name_width = callbacks
        .iter()
        .map(|c| short_name(&c.system).len() + c.callback.len() + 2)
        .max()
        .unwrap_or(10)
        .min(48);
    let bar_max = inner.width.saturating_sub(name_width as u16 + 26) as usize;

    let mut lines: Vec<Line> = Vec::with_capacity(inner.height as usize);
    let mut last_phase: Option<&str> = None;
    for c in callbacks {
        if last_phase != Some(c.phase.as_str()) {
            lines.push(Line::from(Span::styled(
                format!(" {}", c.phase),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            last_phase = Some(c.phase.as_str());
        }

        let ms = c.duration_us / 1000.0;
        let bar_color = if ms < 2.0 {
            Color::Green
        } else if ms < 5.0 {
            Color::Yellow
        } else {
            Color::Red
        };
        let bar_len = ((c.duration_us / max_dur) * bar_max as f64).round() as usize;
        let name = format!("{}::{}", short_name(&c.system), c.callback);
        lines.push(Line::from(vec![
            Span::styled(format!("   s{:<2} ", c.stage), Style::default().fg(Color::DarkGray)),
            Span::styled(format!("{name:name_width$}"), Style::default().fg(Color::White)),
            Span::styled(format!(" {ms:>7.3}ms "), Style::default().fg(Color::DarkGray)),
            Span::styled("\u{2588}".repeat(bar_len.max(1)), Style::default().fg(bar_color)),
        ]));
    }

    let visible = inner.height as usize;
    let lines: Vec<Line> = lines.into_iter().take(visible).collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Logs Tab ─────────────────────────────────────────────────────────────

fn draw_logs_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let (t, d, i, w, e) = app.log_counts();
    let scroll_label = if app.log_auto_scroll { "auto" } else { "manual" };

    let block = Block::default()
        .title(format!(
            " Logs [{}]  T:{t} D:{d} I:{i} W:{w} E:{e}  scroll:{scroll_label} ",
            app.log_filter.label(),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let filtered = app.filtered_logs();
    if filtered.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled("  No log messages", Style::default().fg(Color::DarkGray))),
            inner,
        );
        return;
    }

    let visible = inner.height as usize;
    let total = filtered.len();
    let offset = if app.log_auto_scroll {
        total.saturating_sub(visible)
    } else {
        app.log_scroll_offset.min(total.saturating_sub(visible))
    };

    let lines: Vec<Line> = filtered
        .iter()
        .skip(offset)
        .take(visible)
        .map(|entry| {
            let level_color = match entry.level.as_str() {
                "TRACE" => Color::DarkGray,
                "DEBUG" => Color::Gray,
                "INFO" => Color::Cyan,
                "WARN" => Color::Yellow,
                "ERROR" => Color::Red,
                _ => Color::White,
            };
            Line::from(vec![
                Span::styled(
                    format!("  [{:>6.1}s] ", entry.timestamp_secs),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<5} ", entry.level),
                    Style::default().fg(level_color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(Color::White)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Help bar ─────────────────────────────────────────────────────────────

fn draw_help_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Cyan));
    let mut spans = vec![
        key(" [1-5]"),
        Span::raw(" tab  "),
        key("[Tab]"),
        Span::raw(" next  "),
    ];

    match app.active_tab {
        Tab::Components => {
            spans.push(key("[\u{2191}\u{2193}]"));
            spans.push(Span::raw(" select  "));
        }
        Tab::Logs => {
            spans.push(key("[l]"));
            spans.push(Span::raw(" filter  "));
            spans.push(key("[g]"));
            spans.push(Span::raw(" auto-scroll  "));
            spans.push(key("[\u{2191}\u{2193}]"));
            spans.push(Span::raw(" scroll  "));
        }
        Tab::Overview | Tab::Groups | Tab::Systems => {}
    }

    spans.push(key("[p]"));
    spans.push(Span::raw(" pause  "));
    spans.push(key("[q]"));
    spans.push(Span::raw(" quit"));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn stats(data: &[u64]) -> (f64, f64, f64) {
    let (Some(min), Some(max)) = (data.iter().min(), data.iter().max()) else {
        return (0.0, 0.0, 0.0);
    };
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (*min as f64, avg, *max as f64)
}

fn ratio_bar(part: usize, whole: usize, width: usize) -> String {
    let filled = if whole > 0 {
        ((part as f32 / whole as f32) * width as f32).round() as usize
    } else {
        0
    };
    let filled = filled.min(width);
    format!(
        "{}{}",
        "\u{2588}".repeat(filled),
        "\u{2591}".repeat(width - filled)
    )
}

/// `skald::components::Transformable` → `Transformable`, keeping generics readable.
fn short_name(type_name: &str) -> &str {
    let head = type_name.split('<').next().unwrap_or(type_name);
    match head.rfind("::") {
        Some(pos) => &type_name[pos + 2..],
        None => type_name,
    }
}

fn format_uptime(secs: f32) -> String {
    let total = secs as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_world_snapshot_json() {
        let json = r#"{
            "tick": 42, "elapsed_secs": 1.5, "systems_us": 830.0,
            "entity_pool": { "total_slots": 10, "free_count": 2, "alive_count": 8, "fragmentation_pct": 20.0 },
            "containers": [{ "name": "game::Health", "persistent": true, "count": 8, "mutated": 3, "removed": 0 }],
            "groups": [{ "label": "Health, Transformable", "size": 5 }],
            "tags": [{ "name": "@loading", "count": 1 }],
            "callbacks": [{ "system": "game::Regen", "callback": "regen", "phase": "tick", "stage": 0, "duration_us": 12.5 }],
            "logs": [{ "level": "WARN", "target": "game", "message": "low", "timestamp_secs": 1.0 }]
        }"#;
        let snap: WorldSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.tick, 42);
        assert_eq!(snap.entity_pool.alive_count, 8);
        assert_eq!(snap.containers[0].mutated, 3);
        assert_eq!(snap.callbacks[0].phase, "tick");

        let mut app = App::new(DEFAULT_ADDRESS.to_string());
        app.push_snapshot(snap);
        assert!(app.connected);
        assert_eq!(app.systems_history.back(), Some(&830));
        assert_eq!(app.log_counts(), (0, 0, 0, 1, 0));
    }

    #[test]
    fn paused_app_ignores_snapshots() {
        let mut app = App::new(DEFAULT_ADDRESS.to_string());
        app.paused = true;
        app.push_snapshot(WorldSnapshot {
            tick: 7,
            ..Default::default()
        });
        assert_eq!(app.latest.tick, 0);
        assert!(app.systems_history.is_empty());
    }

    #[test]
    fn log_filter_cycles_and_filters() {
        assert!(LogFilter::Info.passes("WARN"));
        assert!(!LogFilter::Info.passes("DEBUG"));
        assert!(LogFilter::Debug.passes("DEBUG"));
        assert!(!LogFilter::Error.passes("WARN"));
        let mut filter = LogFilter::All;
        for _ in 0..5 {
            filter = filter.next();
        }
        assert_eq!(filter, LogFilter::All);
    }

    #[test]
    fn tabs_wrap_in_both_directions() {
        assert_eq!(Tab::Logs.next(), Tab::Overview);
        assert_eq!(Tab::Overview.prev(), Tab::Logs);
        assert_eq!(Tab::Components.next(), Tab::Groups);
    }

    #[test]
    fn helpers() {
        assert_eq!(short_name("skald::components::Transformable"), "Transformable");
        assert_eq!(short_name("Plain"), "Plain");
        assert_eq!(stats(&[]), (0.0, 0.0, 0.0));
        assert_eq!(stats(&[2, 4, 6]), (2.0, 4.0, 6.0));
        assert_eq!(ratio_bar(1, 2, 4), "\u{2588}\u{2588}\u{2591}\u{2591}");
        assert_eq!(format_uptime(3725.0), "1h2m5s");
    }
}
