use std::{io::Stdout, sync::Arc, time::Duration};

use crossterm::{
    event::{
        self, DisableFocusChange, DisableMouseCapture, EnableFocusChange, EnableMouseCapture,
        Event, KeyCode, KeyEventKind, MouseEventKind,
    },
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, BorderType, Borders, Clear, Gauge, Paragraph},
    Frame, Terminal,
};

use crate::{
    config::{RefrainConfig, ThemeConfiguration},
    event::ControlEvent,
    model::SyncedLyricLine,
    playback::{LyricsStatus, StoreSnapshot},
    source::PlayerCommand,
    visibility::{self, HudGeometry, Point, VisibilityController, VisibilityState},
};

use super::{
    display::TrackFormatter,
    handler::{HudBackend, HudView},
};

type Term = Terminal<CrosstermBackend<Stdout>>;

const PANEL_WIDTH: u16 = 56;
const PANEL_HEIGHT: u16 = 14;

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalUiBackend;

impl TerminalUiBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl HudBackend for TerminalUiBackend {
    async fn run_backend(
        &mut self,
        view: HudView,
        control: flume::Sender<ControlEvent>,
        config: Arc<RefrainConfig>,
    ) -> anyhow::Result<()> {
        let formatter =
            TrackFormatter::new(&config.general.display, config.general.romanize_unicode)?;
        let hud = VisibilityController::start(config.general.idle_timeout());
        let mut terminal = setup_terminal()?;

        let result = self
            .tui_loop(&view, &control, &hud, &formatter, &config.theme, &mut terminal)
            .await;

        restore_terminal(&mut terminal)?;
        result
    }
}

impl TerminalUiBackend {
    async fn tui_loop(
        &self,
        view: &HudView,
        control: &flume::Sender<ControlEvent>,
        hud: &VisibilityController,
        formatter: &TrackFormatter,
        theme: &ThemeConfiguration,
        terminal: &mut Term,
    ) -> anyhow::Result<()> {
        Ok(loop {
            let snapshot = view.store.snapshot();
            let has_content = snapshot.info.has_content();
            let geometry = hud_geometry(terminal.size()?);
            let elapsed = snapshot.info.elapsed;
            let ui = UiState {
                snapshot: &snapshot,
                lyrics: LyricWindow {
                    previous: view.lyrics.previous_line(elapsed),
                    current: view.lyrics.current_line(elapsed),
                    next: view.lyrics.next_line(elapsed),
                },
                visibility: hud.state(),
                geometry: &geometry,
                formatter,
                theme,
            };
            terminal.draw(|frame| handle_ui(&ui, frame))?;

            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            let request = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char(' ') => Some(ControlEvent::Command(PlayerCommand::PlayPause)),
                    KeyCode::Char('n') => Some(ControlEvent::Command(PlayerCommand::Next)),
                    KeyCode::Char('p') => Some(ControlEvent::Command(PlayerCommand::Previous)),
                    KeyCode::Char('f') => Some(ControlEvent::ToggleFavorite),
                    KeyCode::Char('o') => Some(ControlEvent::OpenTrackUrl),
                    KeyCode::Char('r') => Some(ControlEvent::Refresh),
                    _ => None,
                },
                Event::Mouse(mouse) if mouse.kind == MouseEventKind::Moved => {
                    let point = Point {
                        x: f64::from(mouse.column) + 0.5,
                        y: f64::from(mouse.row) + 0.5,
                    };
                    hud.pointer_moved(point, &geometry, has_content);
                    None
                }
                Event::FocusGained => {
                    hud.pointer_entered();
                    None
                }
                Event::FocusLost => {
                    hud.pointer_left();
                    None
                }
                _ => None,
            };
            if let Some(request) = request {
                if control.send(request).is_err() {
                    break;
                }
            }
        })
    }
}

struct LyricWindow {
    previous: Option<SyncedLyricLine>,
    current: Option<SyncedLyricLine>,
    next: Option<SyncedLyricLine>,
}

struct UiState<'a> {
    snapshot: &'a StoreSnapshot,
    lyrics: LyricWindow,
    visibility: VisibilityState,
    geometry: &'a HudGeometry,
    formatter: &'a TrackFormatter,
    theme: &'a ThemeConfiguration,
}

impl UiState<'_> {
    fn text_color(&self) -> Color {
        if self.visibility.visible {
            self.theme.text_color.0
        } else {
            self.theme.faded_text_color.0
        }
    }

    /// Accent colors collapse to the faded color while the HUD is idle.
    fn accent(&self, color: Color) -> Color {
        if self.visibility.visible {
            color
        } else {
            self.theme.faded_text_color.0
        }
    }
}

/// Panel centred at the top of the terminal, in cell units.
fn hud_geometry(area: Rect) -> HudGeometry {
    let width = PANEL_WIDTH.min(area.width);
    let height = PANEL_HEIGHT.min(area.height);
    let x = area.x + (area.width - width) / 2;
    HudGeometry::fit(visibility::Rect::new(
        f64::from(x),
        f64::from(area.y),
        f64::from(width),
        f64::from(height),
    ))
}

/// Smallest cell rectangle covering `rect`, clipped to `bounds`.
fn to_cells(rect: visibility::Rect, bounds: Rect) -> Rect {
    let left = rect.x.floor().max(f64::from(bounds.left()));
    let top = rect.y.floor().max(f64::from(bounds.top()));
    let right = (rect.x + rect.width).ceil().min(f64::from(bounds.right()));
    let bottom = (rect.y + rect.height).ceil().min(f64::from(bounds.bottom()));
    if right <= left || bottom <= top {
        return Rect::new(bounds.x, bounds.y, 0, 0);
    }
    Rect::new(
        left as u16,
        top as u16,
        (right - left) as u16,
        (bottom - top) as u16,
    )
}

fn handle_ui(ui: &UiState, f: &mut Frame<CrosstermBackend<Stdout>>) {
    let size = f.size();
    if ui.visibility.expanded {
        let panel = to_cells(ui.geometry.panel, size);
        draw_panel(ui, f, panel);
    } else {
        let has_content = ui.snapshot.info.has_content();
        let mut pill = to_cells(ui.geometry.collapsed_region(has_content), size);
        // Room for the border plus one line of text.
        pill.height = pill.height.max(3).min(size.height);
        draw_pill(ui, f, pill);
    }
}

fn draw_pill(ui: &UiState, f: &mut Frame<CrosstermBackend<Stdout>>, area: Rect) {
    let info = &ui.snapshot.info;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .style(Style::default().bg(ui.theme.pill_color.0).fg(ui.text_color()));
    f.render_widget(Clear, area);

    let line = if info.has_content() {
        Line::from(vec![
            Span::raw(artwork_glyph(ui.snapshot)),
            Span::raw(" "),
            Span::styled(
                ui.formatter.title(info),
                Style::default().fg(ui.text_color()),
            ),
            Span::raw(" "),
            Span::styled(
                play_bars(info.is_playing),
                Style::default().fg(ui.accent(ui.theme.progress_color.0)),
            ),
        ])
    } else {
        Line::from(Span::raw("♪"))
    };
    f.render_widget(
        Paragraph::new(line).alignment(Alignment::Center).block(block),
        area,
    );
}

fn draw_panel(ui: &UiState, f: &mut Frame<CrosstermBackend<Stdout>>, area: Rect) {
    let info = &ui.snapshot.info;
    let text = ui.text_color();
    let faded = ui.theme.faded_text_color.0;

    let mut title = vec![Span::styled(
        format!(" {} ", info.source.label()),
        Style::default().fg(faded),
    )];
    if info.is_favorited {
        title.push(Span::styled(
            "★ ",
            Style::default().fg(ui.accent(ui.theme.favorite_color.0)),
        ));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(Line::from(title))
        .title_alignment(Alignment::Right)
        .style(Style::default().bg(ui.theme.pill_color.0).fg(text));
    let inner = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(inner);

    // Track info
    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            format!("{} {}", artwork_glyph(ui.snapshot), ui.formatter.title(info)),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            ui.formatter.subtitle(info),
            Style::default().fg(faded),
        )),
    ]);
    f.render_widget(header, layout[0]);

    // Lyrics
    let lyrics = Paragraph::new(lyric_lines(ui)).alignment(Alignment::Center);
    f.render_widget(lyrics, layout[2]);

    // Track progress
    if info.has_content() {
        let progress = Gauge::default()
            .gauge_style(
                Style::default()
                    .fg(ui.accent(ui.theme.progress_color.0))
                    .bg(ui.theme.pill_color.0),
            )
            .ratio(info.progress())
            .label(format!(
                "{} / {}",
                info.elapsed_formatted(),
                info.remaining_formatted()
            ));
        f.render_widget(progress, layout[3]);
    }
}

fn lyric_lines<'a>(ui: &UiState) -> Vec<Line<'a>> {
    let snapshot = ui.snapshot;
    let inactive = Style::default().fg(ui.accent(ui.theme.inactive_lyric_color.0));
    let status = |message: &str| vec![Line::from(Span::styled(message.to_owned(), inactive))];

    match snapshot.lyrics_status {
        LyricsStatus::Searching => return status("Searching lyrics…"),
        LyricsStatus::Missing => return status("No lyrics available"),
        LyricsStatus::Idle | LyricsStatus::Loaded => {}
    }
    let window = &ui.lyrics;
    if window.current.is_none() && window.next.is_none() {
        return Vec::new();
    }

    let text = |line: &Option<SyncedLyricLine>| {
        line.as_ref()
            .map(|line| ui.formatter.text(&line.text))
            .unwrap_or_default()
    };
    vec![
        Line::from(Span::styled(text(&window.previous), inactive)),
        Line::from(Span::styled(
            text(&window.current),
            Style::default()
                .fg(ui.accent(ui.theme.active_lyric_color.0))
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(text(&window.next), inactive)),
    ]
}

fn artwork_glyph(snapshot: &StoreSnapshot) -> &'static str {
    if snapshot.artwork.is_some() {
        "▣"
    } else {
        "♫"
    }
}

fn play_bars(is_playing: bool) -> &'static str {
    if is_playing {
        "▂▅▃"
    } else {
        "▁▁▁"
    }
}

fn setup_terminal() -> anyhow::Result<Term> {
    let mut stdout = std::io::stdout();
    enable_raw_mode()?;
    crossterm::execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange
    )?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Term) -> anyhow::Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        DisableFocusChange,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor().map_err(anyhow::Error::from)
}
