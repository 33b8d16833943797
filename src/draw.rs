use tui::backend::Backend;
use tui::layout::{Alignment, Constraint, Layout, Rect};
use tui::style::{Color, Modifier, Style};
use tui::text::{Line, Span};
use tui::widgets::{Block, BorderType, Borders, Cell, Gauge, Paragraph, Row, Table, Tabs};
use tui::{Frame, Terminal};
use tui_logger::TuiLoggerWidget;

use crate::app::{App, MenuItem};
use crate::state::app_state::{Feed, FeedKind, Fixture};
use crate::state::simulation::{ERROR_CHAR, LoadingState};
use crate::ui::layout::LayoutAreas;
use knockout_engine::{MatchStatus, Side, TournamentStatus};

static TABS: &[&str; 3] = &["Tournament", "Friendly", "Entrants"];

/// Fixtures plus a readable feed side by side.
const SIDE_BY_SIDE_WIDTH: u16 = 110;

/// Header plus seven fixtures plus borders.
const FIXTURES_HEIGHT: u16 = 10;

pub fn draw<B>(terminal: &mut Terminal<B>, app: &mut App)
where
    B: Backend,
{
    let current_size = terminal.size().unwrap_or_default();
    if current_size.width <= 10 || current_size.height <= 10 {
        return;
    }

    let mut layout = LayoutAreas::new(current_size);

    let result = terminal.draw(|f| {
        layout.update(f.area(), app.settings.full_screen, app.state.show_logs);

        if !app.settings.full_screen {
            draw_tabs(f, layout.tab_bar, app);
        }

        match app.state.active_tab {
            MenuItem::Tournament => draw_tournament(f, layout.main, app),
            MenuItem::Friendly => draw_friendly(f, layout.main, app),
            MenuItem::Entrants => draw_entrants(f, layout.main, app),
            MenuItem::Help => draw_help(f, layout.main),
        }

        if let Some(logs) = layout.logs {
            draw_logs(f, logs);
        }

        draw_loading_spinner(f, f.area(), app, app.state.loading);
    });
    if let Err(e) = result {
        log::error!("draw failed: {e}");
    }
}

pub fn default_border<'a>(color: Color) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
}

fn draw_tabs(f: &mut Frame, tab_bar: [Rect; 2], app: &App) {
    let style = Style::default().fg(Color::White);
    let border_type = BorderType::Rounded;

    let tab_index = match app.state.active_tab {
        MenuItem::Tournament => 0,
        MenuItem::Friendly => 1,
        MenuItem::Entrants => 2,
        MenuItem::Help => 0,
    };

    let titles: Vec<Line> = TABS.iter().map(|t| Line::from(*t)).collect();
    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::LEFT | Borders::BOTTOM | Borders::TOP)
                .border_type(border_type),
        )
        .highlight_style(Style::default().add_modifier(Modifier::UNDERLINED))
        .select(tab_index)
        .style(style);
    f.render_widget(tabs, tab_bar[0]);

    let help = Paragraph::new("Help: ? ")
        .alignment(Alignment::Right)
        .block(
            Block::default()
                .borders(Borders::RIGHT | Borders::BOTTOM | Borders::TOP)
                .border_type(border_type),
        )
        .style(style);
    f.render_widget(help, tab_bar[1]);
}

// ---------------------------------------------------------------------------
// Tournament tab
// ---------------------------------------------------------------------------

fn draw_tournament(f: &mut Frame, area: Rect, app: &App) {
    let tournament = &app.state.tournament;
    let Some(bracket) = tournament.bracket.as_ref() else {
        let msg = match app.state.last_error.as_deref() {
            Some(err) => format!("No tournament.\n{err}"),
            None => "No tournament yet.\n\ns  seed the entrants and kick off\nn  fresh draw".to_string(),
        };
        draw_placeholder(f, area, &msg);
        return;
    };

    let [header_area, body] = Layout::vertical([Constraint::Length(4), Constraint::Fill(1)]).areas(area);

    let header = default_border(Color::White).title(format!(" {} ", bracket.tournament.name));
    let header_inner = header.inner(header_area);
    f.render_widget(header, header_area);
    let [status_area, gauge_area] =
        Layout::horizontal([Constraint::Fill(1), Constraint::Length(24)]).areas(header_inner);
    let [status_line, hint_line] =
        Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).areas(status_area);

    let state = match (bracket.tournament.status, tournament.running) {
        (TournamentStatus::Completed, _) => Span::styled("completed", Style::default().fg(Color::Green)),
        (_, true) => Span::styled("playing", Style::default().fg(Color::Yellow)),
        (status, false) => Span::styled(status.as_str(), Style::default().fg(Color::Gray)),
    };
    let mut spans = vec![
        Span::styled(bracket.tournament.stage.label(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        state,
    ];
    if let Some(live) = &tournament.live {
        spans.push(Span::styled(
            format!("  {} {} {} {}'", live.home, live.score, live.away, live.minute),
            Style::default().fg(Color::Yellow),
        ));
    }
    if let Some(err) = &app.state.last_error {
        spans.push(Span::styled(format!("  {err}"), Style::default().fg(Color::Red)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), status_line);
    f.render_widget(
        Paragraph::new("s start/resume  n new draw  j/k scroll feed").style(Style::default().fg(Color::DarkGray)),
        hint_line,
    );

    let (done, total) = tournament.completed_matches();
    let ratio = if total == 0 { 0.0 } else { done as f64 / total as f64 };
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .ratio(ratio)
            .label(format!("{done}/{total} played")),
        gauge_area,
    );

    let (fixtures_area, feed_area) = if body.width >= SIDE_BY_SIDE_WIDTH {
        let [fixtures, feed] = Layout::horizontal([Constraint::Length(60), Constraint::Fill(1)]).areas(body);
        (fixtures, feed)
    } else {
        let [fixtures, feed] =
            Layout::vertical([Constraint::Length(FIXTURES_HEIGHT), Constraint::Fill(1)]).areas(body);
        (fixtures, feed)
    };
    draw_fixtures(f, fixtures_area, app);

    draw_feed(f, feed_area, " Live Feed ", &tournament.feed, "Press s to start the tournament");
}

fn draw_fixtures(f: &mut Frame, area: Rect, app: &App) {
    let tournament = &app.state.tournament;
    let title = match &tournament.champion {
        Some(name) => format!(" Fixtures | Champion: {name} "),
        None => " Fixtures ".to_string(),
    };

    let team_style = |fixture: &Fixture, side: Side| match fixture.winner {
        Some(w) if w == side => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        Some(_) => Style::default().fg(Color::DarkGray),
        None => Style::default().fg(Color::Gray),
    };
    let rows: Vec<Row> = tournament
        .fixtures(&app.state.entrants)
        .iter()
        .map(|fixture| {
            let score = fixture
                .score
                .map(|s| format!("{} - {}", s.home, s.away))
                .unwrap_or_else(|| "v".to_string());
            let status_style = match fixture.status {
                MatchStatus::InProgress => Style::default().fg(Color::Yellow),
                _ => Style::default().fg(Color::DarkGray),
            };
            Row::new(vec![
                Cell::from(fixture.label.clone()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(fixture.home.clone()).style(team_style(fixture, Side::Home)),
                Cell::from(score),
                Cell::from(fixture.away.clone()).style(team_style(fixture, Side::Away)),
                Cell::from(fixture.status_text()).style(status_style),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Fill(1),
            Constraint::Length(7),
            Constraint::Fill(1),
            Constraint::Length(9),
        ],
    )
    .header(
        Row::new(vec!["", "Home", "", "Away", ""]).style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(default_border(Color::DarkGray).title(title));
    f.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Friendly tab
// ---------------------------------------------------------------------------

fn draw_friendly(f: &mut Frame, area: Rect, app: &App) {
    let friendly = &app.state.friendly;
    let [picker_area, score_area, feed_area] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Length(5),
        Constraint::Fill(1),
    ])
    .areas(area);

    let block = default_border(Color::White).title(" Friendly ");
    let inner = block.inner(picker_area);
    f.render_widget(block, picker_area);

    let pick = |idx: usize| {
        app.state
            .entrants
            .get(idx)
            .map(|e| format!("{} ({})", e.name, e.rating))
            .unwrap_or_else(|| "-".to_string())
    };
    let picker_style = if friendly.running {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    };
    let lines = vec![
        Line::from(vec![
            Span::styled("Home ", Style::default().fg(Color::DarkGray)),
            Span::styled(format!("< {} >", pick(friendly.home_idx)), picker_style),
            Span::styled("   Away ", Style::default().fg(Color::DarkGray)),
            Span::styled(format!("< {} >", pick(friendly.away_idx)), picker_style),
        ]),
        Line::styled(
            "h/l home  [/] away  Enter kick off  x reset  j/k scroll",
            Style::default().fg(Color::DarkGray),
        ),
    ];
    f.render_widget(Paragraph::new(lines), inner);

    let block = default_border(Color::DarkGray).title(" Scoreboard ");
    let inner = block.inner(score_area);
    f.render_widget(block, score_area);
    let board = match &friendly.fixture {
        None => vec![Line::styled("Pick two teams and press Enter", Style::default().fg(Color::DarkGray))],
        Some((home, away)) => {
            let clock = if friendly.running {
                Span::styled(format!("{}'", friendly.minute), Style::default().fg(Color::Yellow))
            } else {
                Span::styled("FT", Style::default().fg(Color::Green))
            };
            let mut lines = vec![Line::from(vec![
                Span::styled(
                    format!("{home}  {}  {away}", friendly.score),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::raw("   "),
                clock,
            ])];
            if let Some(result) = &friendly.result {
                lines.push(Line::styled(result.as_str(), Style::default().fg(Color::Green)));
            }
            if let Some(err) = &app.state.last_error {
                lines.push(Line::styled(err.as_str(), Style::default().fg(Color::Red)));
            }
            lines
        }
    };
    f.render_widget(Paragraph::new(board).alignment(Alignment::Center), inner);

    draw_feed(f, feed_area, " Commentary ", &friendly.feed, "No match yet");
}

// ---------------------------------------------------------------------------
// Entrants tab
// ---------------------------------------------------------------------------

fn draw_entrants(f: &mut Frame, area: Rect, app: &App) {
    let block = default_border(Color::White).title(format!(" Entrants ({}) ", app.state.entrants.len()));

    let rows = app
        .state
        .entrants
        .iter()
        .enumerate()
        .skip(app.state.entrants_scroll as usize)
        .map(|(idx, e)| {
            let (status, color) = if e.eliminated {
                ("eliminated", Color::DarkGray)
            } else {
                ("in", Color::Green)
            };
            Row::new(vec![
                format!("{}", idx + 1),
                e.name.clone(),
                e.country.clone(),
                e.rating.to_string(),
                status.to_string(),
            ])
            .style(Style::default().fg(color))
        });

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Fill(1),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(12),
        ],
    )
    .header(
        Row::new(vec!["#", "Team", "Country", "Rating", "Status"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block);
    f.render_widget(table, area);
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

fn feed_style(kind: FeedKind) -> Style {
    match kind {
        FeedKind::Stage => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        FeedKind::Kickoff => Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        FeedKind::Commentary => Style::default().fg(Color::Gray),
        FeedKind::Goal => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        FeedKind::Whistle => Style::default().fg(Color::Magenta),
        FeedKind::Result => Style::default().fg(Color::Green),
        FeedKind::Champion => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        FeedKind::Warning => Style::default().fg(Color::Red),
    }
}

fn draw_feed(f: &mut Frame, area: Rect, title: &str, feed: &Feed, empty: &str) {
    let block = default_border(Color::DarkGray).title(title.to_string());
    let inner = block.inner(area);
    f.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }
    if feed.lines.is_empty() {
        f.render_widget(
            Paragraph::new(empty.to_string())
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center),
            inner,
        );
        return;
    }

    let visible = inner.height as usize;
    let end = feed.lines.len().saturating_sub(feed.scroll_offset as usize);
    let start = end.saturating_sub(visible);
    let lines: Vec<Line> = feed.lines[start..end]
        .iter()
        .map(|line| {
            Line::from(vec![
                Span::styled(format!("{} ", line.timestamp), Style::default().fg(Color::DarkGray)),
                Span::styled(line.text.as_str(), feed_style(line.kind)),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let block = default_border(Color::White).title(" Help ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let keys: &[(&str, &str)] = &[
        ("1 2 3", "Tournament, Friendly, Entrants"),
        ("s", "start or resume the tournament"),
        ("n", "new draw (clears eliminations)"),
        ("h / l", "previous / next home team"),
        ("[ / ]", "previous / next away team"),
        ("Enter", "kick off the friendly"),
        ("x", "reset the friendly"),
        ("j / k", "scroll the feed"),
        ("f", "toggle full screen"),
        ("\"", "toggle logs"),
        ("Esc", "close help"),
        ("q", "quit"),
    ];
    let lines: Vec<Line> = keys
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!("{key:>8}  "), Style::default().fg(Color::Yellow)),
                Span::raw(*what),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_logs(f: &mut Frame, area: Rect) {
    let logs = TuiLoggerWidget::default()
        .block(default_border(Color::DarkGray).title(" Logs "))
        .style_error(Style::default().fg(Color::Red))
        .style_warn(Style::default().fg(Color::Yellow))
        .style_info(Style::default().fg(Color::Gray))
        .style_debug(Style::default().fg(Color::DarkGray));
    f.render_widget(logs, area);
}

fn draw_placeholder(f: &mut Frame, area: Rect, msg: &str) {
    let block = default_border(Color::DarkGray);
    let inner = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(msg.to_string())
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center),
        inner,
    );
}

fn draw_loading_spinner(f: &mut Frame, area: Rect, app: &App, loading: LoadingState) {
    if !loading.is_loading && loading.spinner_char != ERROR_CHAR {
        return;
    }
    let style = match loading.spinner_char {
        ERROR_CHAR => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::White),
    };
    let spinner = Paragraph::new(loading.spinner_char.to_string())
        .alignment(Alignment::Right)
        .style(style);
    let area = if app.settings.full_screen {
        Rect::new(area.width.saturating_sub(3), area.height.saturating_sub(2), 1, 1)
    } else {
        Rect::new(area.width.saturating_sub(11), 1, 1, 1)
    };
    f.render_widget(spinner, area);
}
