use crate::state::messages::{SimRequest, SimResponse};
use futures_util::StreamExt;
use knockout_engine::bracket::{BracketEngine, BracketError, BracketResult};
use knockout_engine::clock::{EventSink, MatchEvent, MinuteClock, Pace};
use knockout_engine::commentary::{CommentarySource, Timed};
use knockout_engine::orchestrator::{Orchestrator, ProgressEvent};
use knockout_engine::store::{MemoryStore, TournamentStore};
use knockout_engine::{Bracket, Entrant};
use log::{debug, error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SPINNER_CHARS: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
pub const ERROR_CHAR: char = '!';

pub type Commentary = Timed<CommentarySource>;
pub type Engine = BracketEngine<MemoryStore>;

#[derive(Debug, Copy, Clone)]
pub struct LoadingState {
    pub is_loading: bool,
    pub spinner_char: char,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self { is_loading: false, spinner_char: ' ' }
    }
}

/// Drives the header spinner while a tournament is being played.
#[derive(Clone)]
struct Spinner {
    responses: mpsc::Sender<SimResponse>,
    active: Arc<AtomicBool>,
}

impl Spinner {
    async fn start(&self) {
        if self.active.swap(true, Ordering::Relaxed) {
            return;
        }

        let mut loading_state = LoadingState { is_loading: true, spinner_char: SPINNER_CHARS[0] };
        let _ = self.responses.send(SimResponse::LoadingStateChanged { loading_state }).await;

        let responses = self.responses.clone();
        let active = self.active.clone();
        tokio::spawn(async move {
            let mut spinner_index = 1;
            let mut interval = tokio::time::interval(Duration::from_millis(33));
            loop {
                interval.tick().await;
                if !active.load(Ordering::Relaxed) {
                    break;
                }
                loading_state.spinner_char = SPINNER_CHARS[spinner_index];
                spinner_index = (spinner_index + 1) % SPINNER_CHARS.len();
                if responses
                    .send(SimResponse::LoadingStateChanged { loading_state })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    async fn stop(&self, is_ok: bool) {
        self.active.store(false, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(15)).await;

        let spinner_char = if is_ok { ' ' } else { ERROR_CHAR };
        let _ = self
            .responses
            .send(SimResponse::LoadingStateChanged {
                loading_state: LoadingState { is_loading: false, spinner_char },
            })
            .await;
    }
}

/// Forwards friendly match events to the UI as they happen.
struct FriendlyFeed {
    responses: mpsc::Sender<SimResponse>,
}

impl EventSink for FriendlyFeed {
    async fn emit(&mut self, event: MatchEvent) {
        if self.responses.send(SimResponse::FriendlyEvent { event }).await.is_err() {
            debug!("friendly feed closed");
        }
    }
}

pub struct SimulationWorker {
    orchestrator: Orchestrator<MemoryStore, Commentary>,
    friendly_pace: Pace,
    requests: mpsc::Receiver<SimRequest>,
    responses: mpsc::Sender<SimResponse>,
    spinner: Spinner,
    tournament_task: Option<JoinHandle<()>>,
    friendly_task: Option<JoinHandle<()>>,
}

impl SimulationWorker {
    pub fn new(
        orchestrator: Orchestrator<MemoryStore, Commentary>,
        friendly_pace: Pace,
        requests: mpsc::Receiver<SimRequest>,
        responses: mpsc::Sender<SimResponse>,
    ) -> Self {
        Self {
            orchestrator,
            friendly_pace,
            requests,
            spinner: Spinner { responses: responses.clone(), active: Arc::new(AtomicBool::new(false)) },
            responses,
            tournament_task: None,
            friendly_task: None,
        }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            debug!("simulation request: {request:?}");
            let result = match request {
                SimRequest::Load => self.handle_load().await,
                SimRequest::StartTournament => self.handle_start_tournament().await,
                SimRequest::NewTournament => self.handle_new_tournament().await,
                SimRequest::KickOffFriendly { home_id, away_id } => {
                    self.handle_kick_off(&home_id, &away_id).await
                }
                SimRequest::ResetFriendly => self.handle_reset_friendly().await,
            };

            if let Err(err) = result {
                error!("simulation request failed: {err}");
                if self.responses.send(SimResponse::Error { message: err.to_string() }).await.is_err() {
                    break;
                }
            }
        }

        for task in [self.tournament_task.take(), self.friendly_task.take()].into_iter().flatten() {
            task.abort();
        }
    }

    fn engine(&self) -> &Arc<Engine> {
        self.orchestrator.engine()
    }

    async fn send(&self, response: SimResponse) {
        if let Err(e) = self.responses.send(response).await {
            error!("Failed to send simulation response: {e}");
        }
    }

    async fn handle_load(&self) -> BracketResult<()> {
        let entrants = self.engine().store().list_entrants().await?;
        self.send(SimResponse::EntrantsLoaded { entrants }).await;
        if let Some(bracket) = self.engine().active_bracket().await? {
            self.send(SimResponse::BracketLoaded { bracket }).await;
        }
        Ok(())
    }

    async fn seed(&self) -> BracketResult<Bracket> {
        let entrants = self.engine().store().list_entrants().await?;
        let bracket = self.engine().seed(&entrants).await?;
        info!("seeded tournament {}", bracket.tournament.id);
        Ok(bracket)
    }

    fn tournament_running(&self) -> bool {
        self.tournament_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    async fn handle_start_tournament(&mut self) -> BracketResult<()> {
        if self.tournament_running() {
            debug!("tournament already running");
            return Ok(());
        }

        let bracket = match self.engine().active_bracket().await? {
            Some(bracket) => bracket,
            None => self.seed().await?,
        };
        let tournament_id = bracket.tournament.id.clone();
        self.send(SimResponse::BracketLoaded { bracket }).await;

        let mut stream = self.orchestrator.run_tournament(&tournament_id);
        let engine = Arc::clone(self.engine());
        let responses = self.responses.clone();
        let spinner = self.spinner.clone();
        spinner.start().await;

        self.tournament_task = Some(tokio::spawn(async move {
            let mut clean = true;
            while let Some(event) = stream.next().await {
                let refresh = matches!(
                    event,
                    ProgressEvent::MatchStarted { .. }
                        | ProgressEvent::MatchCompleted { .. }
                        | ProgressEvent::StageAdvanced { .. }
                );
                clean &= !matches!(event, ProgressEvent::Warning(_));
                if responses.send(SimResponse::Progress { event }).await.is_err() {
                    return;
                }
                if refresh && let Ok(bracket) = engine.bracket(&tournament_id).await {
                    let _ = responses.send(SimResponse::BracketLoaded { bracket }).await;
                }
            }
            spinner.stop(clean).await;
            let _ = responses.send(SimResponse::TournamentStopped).await;
        }));
        Ok(())
    }

    async fn handle_new_tournament(&mut self) -> BracketResult<()> {
        if let Some(task) = self.tournament_task.take() {
            task.abort();
            self.spinner.stop(true).await;
            self.send(SimResponse::TournamentStopped).await;
        }

        if let Some(unfinished) = self.engine().active_bracket().await? {
            self.engine().abandon(&unfinished.tournament.id).await?;
        }

        let store = self.engine().store();
        for mut entrant in store.list_entrants().await? {
            if entrant.eliminated {
                entrant.eliminated = false;
                store.update_entrant(entrant).await?;
            }
        }

        let bracket = self.seed().await?;
        let entrants = store.list_entrants().await?;
        self.send(SimResponse::EntrantsLoaded { entrants }).await;
        self.send(SimResponse::BracketLoaded { bracket }).await;
        Ok(())
    }

    async fn handle_kick_off(&mut self, home_id: &str, away_id: &str) -> BracketResult<()> {
        if home_id == away_id {
            return Err(BracketError::MatchNotPlayable {
                match_id: "friendly".into(),
                reason: "pick two different teams".into(),
            });
        }
        if let Some(task) = self.friendly_task.take() {
            task.abort();
        }

        let store = self.engine().store();
        let home: Entrant = store.get_entrant(home_id).await?;
        let away: Entrant = store.get_entrant(away_id).await?;
        info!("friendly: {} v {}", home.name, away.name);
        self.send(SimResponse::FriendlyStarted { home: home.name.clone(), away: away.name.clone() })
            .await;

        let commentator = Arc::clone(self.orchestrator.commentator());
        let pace = self.friendly_pace;
        let responses = self.responses.clone();
        self.friendly_task = Some(tokio::spawn(async move {
            let mut feed = FriendlyFeed { responses: responses.clone() };
            let outcome = MinuteClock::new(commentator.as_ref(), pace.pacer(), StdRng::from_entropy())
                .simulate_match(&home, &away, &mut feed)
                .await;
            let _ = responses.send(SimResponse::FriendlyFinished { outcome }).await;
        }));
        Ok(())
    }

    async fn handle_reset_friendly(&mut self) -> BracketResult<()> {
        if let Some(task) = self.friendly_task.take() {
            task.abort();
        }
        self.send(SimResponse::FriendlyReset).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knockout_engine::commentary::CannedCommentator;
    use knockout_engine::{Stage, TournamentStatus};

    async fn worker() -> (mpsc::Sender<SimRequest>, mpsc::Receiver<SimResponse>, Arc<Engine>) {
        let engine = Arc::new(BracketEngine::new(MemoryStore::new()));
        for (name, rating) in [
            ("Alpha", 1600),
            ("Bravo", 1500),
            ("Charlie", 1550),
            ("Delta", 1450),
            ("Echo", 1700),
            ("Foxtrot", 1400),
            ("Golf", 1650),
            ("Hotel", 1350),
        ] {
            engine.register(Entrant::new(name, "XX").with_rating(rating)).await.unwrap();
        }
        let commentary = Timed::new(
            CommentarySource::Canned(CannedCommentator::new()),
            Duration::from_secs(1),
        );
        let orchestrator =
            Orchestrator::new(Arc::clone(&engine), Arc::new(commentary)).with_pace(Pace::INSTANT);

        let (req_tx, req_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(256);
        tokio::spawn(SimulationWorker::new(orchestrator, Pace::INSTANT, req_rx, resp_tx).run());
        (req_tx, resp_rx, engine)
    }

    #[tokio::test]
    async fn start_plays_through_to_a_champion() {
        let (requests, mut responses, engine) = worker().await;
        requests.send(SimRequest::StartTournament).await.unwrap();

        let mut champion = None;
        while let Some(response) = responses.recv().await {
            match response {
                SimResponse::Progress { event: ProgressEvent::Champion { name, .. } } => {
                    champion = Some(name)
                }
                SimResponse::TournamentStopped => break,
                _ => {}
            }
        }

        let bracket = engine.active_bracket().await.unwrap();
        assert!(bracket.is_none(), "the only tournament is finished");
        assert!(champion.is_some());
    }

    #[tokio::test]
    async fn new_tournament_clears_eliminations() {
        let (requests, mut responses, engine) = worker().await;
        requests.send(SimRequest::StartTournament).await.unwrap();
        while let Some(response) = responses.recv().await {
            if matches!(response, SimResponse::TournamentStopped) {
                break;
            }
        }

        requests.send(SimRequest::NewTournament).await.unwrap();
        let bracket = loop {
            if let Some(SimResponse::BracketLoaded { bracket }) = responses.recv().await {
                break bracket;
            }
        };

        assert_eq!(bracket.tournament.stage, Stage::QuarterFinals);
        assert_eq!(bracket.tournament.status, TournamentStatus::Active);
        let entrants = engine.store().list_entrants().await.unwrap();
        assert!(entrants.iter().all(|e| !e.eliminated));
    }

    async fn next_bracket(responses: &mut mpsc::Receiver<SimResponse>) -> Bracket {
        loop {
            if let Some(SimResponse::BracketLoaded { bracket }) = responses.recv().await {
                return bracket;
            }
        }
    }

    #[tokio::test]
    async fn new_tournament_closes_the_unfinished_one() {
        let (requests, mut responses, engine) = worker().await;
        requests.send(SimRequest::NewTournament).await.unwrap();
        let first = next_bracket(&mut responses).await;

        requests.send(SimRequest::NewTournament).await.unwrap();
        let second = next_bracket(&mut responses).await;
        assert_ne!(first.tournament.id, second.tournament.id);

        let closed = engine.store().get_tournament(&first.tournament.id).await.unwrap();
        assert_eq!(closed.status, TournamentStatus::Completed);
        assert!(closed.champion.is_none());
        let active = engine.active_bracket().await.unwrap().unwrap();
        assert_eq!(active.tournament.id, second.tournament.id);
    }

    #[tokio::test]
    async fn friendly_streams_events_then_the_outcome() {
        let (requests, mut responses, engine) = worker().await;
        let entrants = engine.store().list_entrants().await.unwrap();
        requests
            .send(SimRequest::KickOffFriendly {
                home_id: entrants[0].id.clone(),
                away_id: entrants[1].id.clone(),
            })
            .await
            .unwrap();

        let mut events = 0;
        let outcome = loop {
            match responses.recv().await {
                Some(SimResponse::FriendlyEvent { .. }) => events += 1,
                Some(SimResponse::FriendlyFinished { outcome }) => break outcome,
                Some(_) => {}
                None => panic!("worker hung up"),
            }
        };
        assert_eq!(events, outcome.events.len());
        assert_eq!(outcome.minute, 90);
    }

    #[tokio::test]
    async fn a_team_cannot_play_itself() {
        let (requests, mut responses, engine) = worker().await;
        let id = engine.store().list_entrants().await.unwrap()[0].id.clone();
        requests
            .send(SimRequest::KickOffFriendly { home_id: id.clone(), away_id: id })
            .await
            .unwrap();

        match responses.recv().await {
            Some(SimResponse::Error { message }) => assert!(message.contains("two different teams")),
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
