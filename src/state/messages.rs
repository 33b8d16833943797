use crate::state::simulation::LoadingState;
use crossterm::event::KeyEvent;
use knockout_engine::clock::{MatchEvent, MatchOutcome};
use knockout_engine::orchestrator::ProgressEvent;
use knockout_engine::{Bracket, Entrant};

#[derive(Debug, Clone)]
pub enum SimRequest {
    /// Entrants plus the active bracket, if there is one.
    Load,
    /// Play the active tournament onward from its current stage.
    StartTournament,
    /// Clear eliminations and seed a fresh tournament.
    NewTournament,
    KickOffFriendly { home_id: String, away_id: String },
    ResetFriendly,
}

#[derive(Debug)]
pub enum SimResponse {
    LoadingStateChanged { loading_state: LoadingState },
    EntrantsLoaded { entrants: Vec<Entrant> },
    BracketLoaded { bracket: Bracket },
    Progress { event: ProgressEvent },
    TournamentStopped,
    FriendlyStarted { home: String, away: String },
    FriendlyEvent { event: MatchEvent },
    FriendlyFinished { outcome: MatchOutcome },
    FriendlyReset,
    Error { message: String },
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    KeyPressed(KeyEvent),
    Resize,
    AppStarted,
}
