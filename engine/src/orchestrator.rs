use crate::bracket::{BracketEngine, BracketResult};
use crate::clock::{ClockConfig, EventSink, MatchEvent, MinuteClock, Pace};
use crate::commentary::Commentator;
use crate::store::TournamentStore;
use crate::{Bracket, Match, Score, Stage};
use futures_util::Stream;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const PROGRESS_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted { stage: Stage },
    MatchStarted { match_id: String, home: String, away: String },
    MatchEvent { match_id: String, event: MatchEvent },
    MatchCompleted { match_id: String, home: String, away: String, score: Score, winner: String },
    /// `next` is `None` once the final has been closed.
    StageAdvanced { completed: Stage, next: Option<Stage> },
    Champion { tournament_id: String, name: String },
    Warning(String),
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::StageStarted { stage } => write!(f, "=== {} ===", stage.label()),
            ProgressEvent::MatchStarted { home, away, .. } => write!(f, "{home} v {away}"),
            ProgressEvent::MatchEvent { event, .. } => write!(f, "{event}"),
            ProgressEvent::MatchCompleted { home, away, score, winner, .. } => write!(
                f,
                "FT {home} {} - {} {away}. {winner} go through.",
                score.home, score.away
            ),
            ProgressEvent::StageAdvanced { completed, next: Some(next) } => {
                write!(f, "{} complete. Next up: {}.", completed.label(), next.label())
            }
            ProgressEvent::StageAdvanced { completed, next: None } => {
                write!(f, "{} complete.", completed.label())
            }
            ProgressEvent::Champion { name, .. } => write!(f, "{name} are the champions!"),
            ProgressEvent::Warning(msg) => write!(f, "Warning: {msg}"),
        }
    }
}

/// Live progress of one tournament run. Dropping it cancels the run.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<ProgressEvent>,
    task: JoinHandle<()>,
}

impl ProgressStream {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Orchestrator<S, C> {
    engine: Arc<BracketEngine<S>>,
    commentator: Arc<C>,
    pace: Pace,
    clock: ClockConfig,
}

impl<S, C> Clone for Orchestrator<S, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            commentator: Arc::clone(&self.commentator),
            pace: self.pace,
            clock: self.clock,
        }
    }
}

impl<S, C> Orchestrator<S, C>
where
    S: TournamentStore + 'static,
    C: Commentator + 'static,
{
    pub fn new(engine: Arc<BracketEngine<S>>, commentator: Arc<C>) -> Self {
        Self {
            engine,
            commentator,
            pace: Pace::bulk(Duration::from_millis(40)),
            clock: ClockConfig::default(),
        }
    }

    pub fn with_pace(mut self, pace: Pace) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_clock(mut self, clock: ClockConfig) -> Self {
        self.clock = clock;
        self
    }

    pub fn engine(&self) -> &Arc<BracketEngine<S>> {
        &self.engine
    }

    pub fn commentator(&self) -> &Arc<C> {
        &self.commentator
    }

    /// Play the tournament from its current stage to the end.
    pub fn run_tournament(&self, tournament_id: &str) -> ProgressStream {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let run = Run {
            engine: Arc::clone(&self.engine),
            commentator: Arc::clone(&self.commentator),
            pace: self.pace,
            clock: self.clock,
            tournament_id: tournament_id.to_owned(),
            tx,
        };
        let task = tokio::spawn(run.drive());
        ProgressStream { rx, task }
    }
}

struct Run<S, C> {
    engine: Arc<BracketEngine<S>>,
    commentator: Arc<C>,
    pace: Pace,
    clock: ClockConfig,
    tournament_id: String,
    tx: mpsc::Sender<ProgressEvent>,
}

impl<S: TournamentStore, C: Commentator> Run<S, C> {
    async fn drive(self) {
        info!("running tournament {}", self.tournament_id);
        if let Err(e) = self.play().await {
            warn!("tournament {} stopped: {e}", self.tournament_id);
            self.send(ProgressEvent::Warning(e.to_string())).await;
        }
    }

    async fn play(&self) -> BracketResult<()> {
        let mut bracket = self.engine.bracket(&self.tournament_id).await?;
        loop {
            if bracket.is_completed() {
                return self.announce_champion(&bracket).await;
            }

            let stage = bracket.tournament.stage;
            self.send(ProgressEvent::StageStarted { stage }).await;
            for m in self.engine.pending_matches(&self.tournament_id, stage).await? {
                if let Err(e) = self.play_match(&m).await {
                    warn!("{}: {e}", m.id);
                    self.send(ProgressEvent::Warning(e.to_string())).await;
                }
            }

            // Matches skipped above may still be on another run's clock.
            self.engine.wait_for_stage(&self.tournament_id, stage).await?;
            bracket = self.engine.advance_past(&self.tournament_id, stage).await?;
            if !bracket.is_completed() && bracket.tournament.stage == stage {
                self.send(ProgressEvent::Warning(format!(
                    "{} did not advance; stopping",
                    stage.label()
                )))
                .await;
                return Ok(());
            }
            let next = (!bracket.is_completed()).then_some(bracket.tournament.stage);
            self.send(ProgressEvent::StageAdvanced { completed: stage, next }).await;
        }
    }

    async fn play_match(&self, m: &Match) -> BracketResult<()> {
        let (home, away) = self.engine.fixture(m).await?;
        let claim = self.engine.begin_match(&m.id).await?;
        self.send(ProgressEvent::MatchStarted {
            match_id: m.id.clone(),
            home: home.name.clone(),
            away: away.name.clone(),
        })
        .await;

        let mut forward = Forward { match_id: &m.id, tx: &self.tx };
        let outcome = MinuteClock::new(self.commentator.as_ref(), self.pace.pacer(), StdRng::from_entropy())
            .with_config(self.clock)
            .simulate_match(&home, &away, &mut forward)
            .await;

        let log = outcome.events.iter().map(ToString::to_string).collect();
        let recorded = self
            .engine
            .record_claimed(claim, outcome.score, log)
            .await?;
        let winner = if recorded.winner.as_deref() == Some(home.id.as_str()) {
            home.name.clone()
        } else {
            away.name.clone()
        };
        self.send(ProgressEvent::MatchCompleted {
            match_id: m.id.clone(),
            home: home.name,
            away: away.name,
            score: recorded.score.unwrap_or(outcome.score),
            winner,
        })
        .await;
        Ok(())
    }

    async fn announce_champion(&self, bracket: &Bracket) -> BracketResult<()> {
        let Some(champion) = &bracket.tournament.champion else {
            self.send(ProgressEvent::Warning("tournament finished without a champion".into()))
                .await;
            return Ok(());
        };
        let champion = self
            .engine
            .resolve(&crate::EntrantRef::ById { id: champion.clone() })
            .await?;
        self.send(ProgressEvent::Champion {
            tournament_id: bracket.tournament.id.clone(),
            name: champion.name,
        })
        .await;
        Ok(())
    }

    async fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("progress receiver for {} dropped", self.tournament_id);
        }
    }
}

/// Tags clock events with their match id on the way to the progress stream.
struct Forward<'r> {
    match_id: &'r str,
    tx: &'r mpsc::Sender<ProgressEvent>,
}

impl EventSink for Forward<'_> {
    async fn emit(&mut self, event: MatchEvent) {
        let tagged = ProgressEvent::MatchEvent { match_id: self.match_id.to_owned(), event };
        if self.tx.send(tagged).await.is_err() {
            debug!("progress receiver dropped mid-match");
        }
    }
}
