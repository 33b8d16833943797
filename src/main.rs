mod app;
mod draw;
mod keys;
mod state;
mod ui;

use crate::app::App;
use crate::state::app_settings::AppSettings;
use crate::state::messages::{SimRequest, SimResponse, UiEvent};
use crate::state::simulation::{Commentary, SimulationWorker};
use anyhow::Context;
use crossterm::event::{self as crossterm_event, Event};
use crossterm::{cursor, execute, terminal};
use futures_util::StreamExt;
use knockout_engine::commentary::CommentarySource;
use knockout_engine::bracket::BracketEngine;
use knockout_engine::orchestrator::{Orchestrator, ProgressEvent};
use knockout_engine::store::{MemoryStore, TournamentStore};
use log::{error, info};
use std::io::Stdout;
use std::sync::Arc;
use std::{io, panic};
use tokio::sync::{Mutex, mpsc};
use tui::{Terminal, backend::CrosstermBackend};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Interactive,
    Headless,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(mode) = handle_cli_args() else {
        return Ok(());
    };

    let settings = AppSettings::load();
    let orchestrator = build_orchestrator(&settings).await?;

    if mode == Mode::Headless {
        return run_headless(orchestrator).await;
    }

    better_panic::install();

    let backend = CrosstermBackend::new(io::stdout());
    let terminal = Terminal::new(backend)?;

    setup_panic_hook();
    setup_terminal()?;

    let level = settings.log_level.unwrap_or(log::LevelFilter::Info);
    tui_logger::init_logger(level)?;
    tui_logger::set_default_level(level);

    let friendly_pace = settings.friendly_pace();
    let app = Arc::new(Mutex::new(App::new(settings)));

    let (ui_event_tx, ui_event_rx) = mpsc::channel::<UiEvent>(100);
    let (sim_req_tx, sim_req_rx) = mpsc::channel::<SimRequest>(100);
    let (sim_resp_tx, sim_resp_rx) = mpsc::channel::<SimResponse>(100);

    // Input handler thread
    let input_handler = tokio::spawn(input_handler_task(ui_event_tx.clone()));

    // Simulation thread
    let worker = SimulationWorker::new(orchestrator, friendly_pace, sim_req_rx, sim_resp_tx);
    let simulation_task = tokio::spawn(worker.run());

    // Load entrants and any bracket on startup
    let _ = ui_event_tx.send(UiEvent::AppStarted).await;

    main_ui_loop(terminal, app, ui_event_rx, sim_req_tx, sim_resp_rx).await;

    input_handler.abort();
    simulation_task.abort();

    Ok(())
}

/// `None` when the arguments were fully handled and the process should exit.
fn handle_cli_args() -> Option<Mode> {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        return Some(Mode::Interactive);
    };

    match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            None
        }
        "-V" | "--version" => {
            println!("knockout {}", env!("CARGO_PKG_VERSION"));
            None
        }
        "--headless" => Some(Mode::Headless),
        _ => {
            eprintln!("Unknown argument: {arg}\n\n{}", usage_text());
            std::process::exit(2);
        }
    }
}

fn usage_text() -> &'static str {
    "knockout - eight-team football knockout simulator

Usage:
  knockout               interactive terminal UI
  knockout --headless    play one tournament and print the progress
  knockout --help
  knockout --version

Environment (also read from .env.local and .env):
  GEMINI_API_KEY                     live commentary; canned lines without it
  KNOCKOUT_COMMENTARY_MODEL          model name (default gemini-1.5-flash-latest)
  KNOCKOUT_COMMENTARY_URL            API base URL override
  KNOCKOUT_COMMENTARY_TIMEOUT_SECS   per-request timeout (default 10)
  KNOCKOUT_ENTRANTS_JSON             entrants file instead of the built-in eight
  KNOCKOUT_MINUTE_MS                 friendly minute length (default 1000)
  KNOCKOUT_HALFTIME_SECS             friendly half-time break (default 5)
  KNOCKOUT_BULK_MINUTE_MS            tournament minute length (default 40)
  KNOCKOUT_LOG_LEVEL                 error, warn, info, debug or trace"
}

async fn build_orchestrator(settings: &AppSettings) -> anyhow::Result<Orchestrator<MemoryStore, Commentary>> {
    let engine = Arc::new(BracketEngine::new(MemoryStore::new()));
    for entrant in settings.load_entrants()? {
        let name = entrant.name.clone();
        engine
            .register(entrant)
            .await
            .with_context(|| format!("registering {name}"))?;
    }

    let commentator = settings.commentator();
    match commentator.inner() {
        CommentarySource::Gemini(_) => info!("commentary: gemini ({})", settings.commentary_model),
        source => info!("commentary: {}", source.name()),
    }
    Ok(Orchestrator::new(engine, Arc::new(commentator)).with_pace(settings.tournament_pace()))
}

async fn run_headless(orchestrator: Orchestrator<MemoryStore, Commentary>) -> anyhow::Result<()> {
    let engine = orchestrator.engine();
    let bracket = match engine.active_bracket().await? {
        Some(bracket) => bracket,
        None => {
            let entrants = engine.store().list_entrants().await?;
            engine.seed(&entrants).await?
        }
    };
    println!("{} ({})", bracket.tournament.name, bracket.tournament.id);

    let mut stream = orchestrator.run_tournament(&bracket.tournament.id);
    while let Some(event) = stream.next().await {
        match event {
            ProgressEvent::MatchEvent { .. } => println!("    {event}"),
            _ => println!("{event}"),
        }
    }
    Ok(())
}

async fn main_ui_loop(
    mut terminal: Terminal<CrosstermBackend<Stdout>>,
    app: Arc<Mutex<App>>,
    mut ui_events: mpsc::Receiver<UiEvent>,
    sim_requests: mpsc::Sender<SimRequest>,
    mut sim_responses: mpsc::Receiver<SimResponse>,
) {
    loop {
        tokio::select! {
            Some(ui_event) = ui_events.recv() => {
                if handle_ui_event(ui_event, &app, &sim_requests).await {
                    let mut app_guard = app.lock().await;
                    draw::draw(&mut terminal, &mut app_guard);
                }
            }

            Some(response) = sim_responses.recv() => {
                if handle_sim_response(response, &app).await {
                    let mut app_guard = app.lock().await;
                    draw::draw(&mut terminal, &mut app_guard);
                }
            }

            else => break,
        }
    }
}

async fn handle_ui_event(
    ui_event: UiEvent,
    app: &Arc<Mutex<App>>,
    sim_requests: &mpsc::Sender<SimRequest>,
) -> bool {
    match ui_event {
        UiEvent::AppStarted => {
            let _ = sim_requests.send(SimRequest::Load).await;
            true
        }
        UiEvent::KeyPressed(key_event) => {
            keys::handle_key_bindings(key_event, app, sim_requests).await;
            true
        }
        UiEvent::Resize => true,
    }
}

async fn handle_sim_response(response: SimResponse, app: &Arc<Mutex<App>>) -> bool {
    let mut guard = app.lock().await;
    match response {
        SimResponse::LoadingStateChanged { loading_state } => guard.on_loading_changed(loading_state),
        SimResponse::EntrantsLoaded { entrants } => guard.on_entrants_loaded(entrants),
        SimResponse::BracketLoaded { bracket } => guard.on_bracket_loaded(bracket),
        SimResponse::Progress { event } => guard.on_progress(event),
        SimResponse::TournamentStopped => guard.on_tournament_stopped(),
        SimResponse::FriendlyStarted { home, away } => guard.on_friendly_started(home, away),
        SimResponse::FriendlyEvent { event } => guard.on_friendly_event(event),
        SimResponse::FriendlyFinished { outcome } => guard.on_friendly_finished(outcome),
        SimResponse::FriendlyReset => guard.on_friendly_reset(),
        SimResponse::Error { message } => {
            error!("Simulation error: {message}");
            guard.on_error(message);
        }
    }
    true
}

async fn input_handler_task(ui_events: mpsc::Sender<UiEvent>) {
    loop {
        if let Ok(event) = crossterm_event::read() {
            let ui_event = match event {
                Event::Key(key_event) => Some(UiEvent::KeyPressed(key_event)),
                Event::Resize(_, _) => Some(UiEvent::Resize),
                _ => None,
            };

            if let Some(ui_event) = ui_event
                && ui_events.send(ui_event).await.is_err()
            {
                break;
            }
        }
    }
}

fn setup_terminal() -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, cursor::Hide)?;
    execute!(stdout, terminal::EnterAlternateScreen)?;
    execute!(stdout, terminal::Clear(terminal::ClearType::All))?;
    terminal::enable_raw_mode()
}

pub fn cleanup_terminal() {
    let mut stdout = io::stdout();
    let _ = execute!(stdout, cursor::MoveTo(0, 0));
    let _ = execute!(stdout, terminal::Clear(terminal::ClearType::All));
    let _ = execute!(stdout, terminal::LeaveAlternateScreen);
    let _ = execute!(stdout, cursor::Show);
    let _ = terminal::disable_raw_mode();
}

fn setup_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        cleanup_terminal();
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));
}
