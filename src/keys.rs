use crate::app::{App, MenuItem};
use crate::state::messages::SimRequest;
use crossterm::event::KeyCode::Char;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub async fn handle_key_bindings(
    key_event: KeyEvent,
    app: &Arc<Mutex<App>>,
    sim_requests: &mpsc::Sender<SimRequest>,
) {
    let mut guard = app.lock().await;
    let mut request = None;

    match (guard.state.active_tab, key_event.code, key_event.modifiers) {
        // Quit
        (_, Char('q'), _) | (_, Char('c'), KeyModifiers::CONTROL) => {
            crate::cleanup_terminal();
            std::process::exit(0);
        }

        // Tab switching
        (_, Char('1'), _) => guard.update_tab(MenuItem::Tournament),
        (_, Char('2'), _) => guard.update_tab(MenuItem::Friendly),
        (_, Char('3'), _) => guard.update_tab(MenuItem::Entrants),
        (_, Char('?'), _) => guard.update_tab(MenuItem::Help),
        (MenuItem::Help, KeyCode::Esc, _) => guard.exit_help(),

        // Tournament
        (MenuItem::Tournament, Char('s'), _) => request = Some(SimRequest::StartTournament),
        (MenuItem::Tournament, Char('n'), _) => {
            guard.on_new_tournament();
            request = Some(SimRequest::NewTournament);
        }

        // Friendly
        (MenuItem::Friendly, Char('h') | KeyCode::Left, _) => guard.friendly_home(false),
        (MenuItem::Friendly, Char('l') | KeyCode::Right, _) => guard.friendly_home(true),
        (MenuItem::Friendly, Char('['), _) => guard.friendly_away(false),
        (MenuItem::Friendly, Char(']'), _) => guard.friendly_away(true),
        (MenuItem::Friendly, KeyCode::Enter, _) => {
            request = guard
                .state
                .friendly_pick()
                .map(|(home_id, away_id)| SimRequest::KickOffFriendly { home_id, away_id });
        }
        (MenuItem::Friendly, Char('x'), _) => request = Some(SimRequest::ResetFriendly),

        // Scrolling
        (_, Char('k') | KeyCode::Up, _) => guard.scroll_up(),
        (_, Char('j') | KeyCode::Down, _) => guard.scroll_down(),

        // Global
        (_, Char('f'), _) => guard.toggle_full_screen(),
        (_, Char('"'), _) => guard.toggle_show_logs(),

        _ => {}
    }

    if let Some(request) = request {
        drop(guard);
        let _ = sim_requests.send(request).await;
    }
}
