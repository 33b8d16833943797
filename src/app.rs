use crate::state::app_settings::AppSettings;
use crate::state::app_state::AppState;
use crate::state::simulation::LoadingState;
use knockout_engine::clock::{MatchEvent, MatchOutcome};
use knockout_engine::orchestrator::ProgressEvent;
use knockout_engine::{Bracket, Entrant};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum MenuItem {
    #[default]
    Tournament,
    Friendly,
    Entrants,
    Help,
}

pub struct App {
    pub settings: AppSettings,
    pub state: AppState,
}

impl App {
    pub fn new(settings: AppSettings) -> Self {
        if let Some(level) = settings.log_level {
            log::set_max_level(level);
            tui_logger::set_default_level(level);
        }

        Self { state: AppState::new(), settings }
    }

    // -----------------------------------------------------------------------
    // Simulation response handlers, called from main_ui_loop
    // -----------------------------------------------------------------------

    pub fn on_loading_changed(&mut self, loading: LoadingState) {
        self.state.loading = loading;
    }

    pub fn on_entrants_loaded(&mut self, entrants: Vec<Entrant>) {
        let len = entrants.len();
        self.state.entrants = entrants;
        let friendly = &mut self.state.friendly;
        if friendly.home_idx >= len {
            friendly.home_idx = 0;
        }
        if friendly.away_idx >= len {
            friendly.away_idx = len.min(2).saturating_sub(1);
        }
    }

    pub fn on_bracket_loaded(&mut self, bracket: Bracket) {
        self.state.last_error = None;
        self.state.tournament.load(bracket);
    }

    pub fn on_progress(&mut self, event: ProgressEvent) {
        if let ProgressEvent::Warning(message) = &event {
            self.state.last_error = Some(message.clone());
        }
        self.state.tournament.running = true;
        self.state.tournament.apply(event);
    }

    pub fn on_tournament_stopped(&mut self) {
        self.state.tournament.stopped();
    }

    pub fn on_friendly_started(&mut self, home: String, away: String) {
        self.state.last_error = None;
        self.state.friendly.started(home, away);
    }

    pub fn on_friendly_event(&mut self, event: MatchEvent) {
        self.state.friendly.apply(event);
    }

    pub fn on_friendly_finished(&mut self, outcome: MatchOutcome) {
        self.state.friendly.finished(outcome);
    }

    pub fn on_friendly_reset(&mut self) {
        self.state.friendly.reset();
    }

    pub fn on_error(&mut self, message: String) {
        self.state.last_error = Some(message);
    }

    /// A fresh bracket is about to replace the current one.
    pub fn on_new_tournament(&mut self) {
        self.state.tournament.reset();
    }

    // -----------------------------------------------------------------------
    // Tab management
    // -----------------------------------------------------------------------

    pub fn update_tab(&mut self, next: MenuItem) {
        if self.state.active_tab == next {
            return;
        }
        self.state.previous_tab = self.state.active_tab;
        self.state.active_tab = next;
    }

    pub fn exit_help(&mut self) {
        if self.state.active_tab == MenuItem::Help {
            self.state.active_tab = self.state.previous_tab;
        }
    }

    pub fn toggle_show_logs(&mut self) {
        self.state.show_logs = !self.state.show_logs;
    }

    pub fn toggle_full_screen(&mut self) {
        self.settings.full_screen = !self.settings.full_screen;
    }

    // -----------------------------------------------------------------------
    // Friendly picks
    // -----------------------------------------------------------------------

    pub fn friendly_home(&mut self, forward: bool) {
        if !self.state.friendly.running {
            let len = self.state.entrants.len();
            self.state.friendly.cycle_home(len, forward);
        }
    }

    pub fn friendly_away(&mut self, forward: bool) {
        if !self.state.friendly.running {
            let len = self.state.entrants.len();
            self.state.friendly.cycle_away(len, forward);
        }
    }

    // -----------------------------------------------------------------------
    // Scrolling
    // -----------------------------------------------------------------------

    pub fn scroll_up(&mut self) {
        match self.state.active_tab {
            MenuItem::Tournament => self.state.tournament.feed.scroll_up(),
            MenuItem::Friendly => self.state.friendly.feed.scroll_up(),
            MenuItem::Entrants => {
                self.state.entrants_scroll = self.state.entrants_scroll.saturating_sub(1);
            }
            MenuItem::Help => {}
        }
    }

    pub fn scroll_down(&mut self) {
        match self.state.active_tab {
            MenuItem::Tournament => self.state.tournament.feed.scroll_down(),
            MenuItem::Friendly => self.state.friendly.feed.scroll_down(),
            MenuItem::Entrants => {
                let max = self.state.entrants.len().saturating_sub(1) as u16;
                self.state.entrants_scroll = (self.state.entrants_scroll + 1).min(max);
            }
            MenuItem::Help => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App { settings: AppSettings::default(), state: AppState::new() }
    }

    #[test]
    fn help_returns_to_the_previous_tab() {
        let mut app = app();
        app.update_tab(MenuItem::Friendly);
        app.update_tab(MenuItem::Help);
        app.exit_help();
        assert_eq!(app.state.active_tab, MenuItem::Friendly);
    }

    #[test]
    fn picks_are_frozen_while_a_friendly_runs() {
        let mut app = app();
        app.on_entrants_loaded(vec![
            Entrant::new("Mali", "ML"),
            Entrant::new("Zambia", "ZM"),
            Entrant::new("Tunisia", "TN"),
        ]);
        app.friendly_home(true);
        assert_eq!(app.state.friendly.home_idx, 1);

        app.on_friendly_started("Zambia".into(), "Zambia".into());
        app.friendly_home(true);
        assert_eq!(app.state.friendly.home_idx, 1);
    }

    #[test]
    fn warnings_surface_as_errors() {
        let mut app = app();
        app.on_progress(ProgressEvent::Warning("store offline".into()));
        assert_eq!(app.state.last_error.as_deref(), Some("store offline"));
        assert!(app.state.tournament.running);
        app.on_tournament_stopped();
        assert!(!app.state.tournament.running);
    }

    #[test]
    fn short_entrant_lists_clamp_the_pickers() {
        let mut app = app();
        app.state.friendly.home_idx = 5;
        app.state.friendly.away_idx = 6;
        app.on_entrants_loaded(vec![Entrant::new("Mali", "ML")]);
        assert_eq!(app.state.friendly.home_idx, 0);
        assert_eq!(app.state.friendly.away_idx, 0);
    }
}
