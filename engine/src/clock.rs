use crate::commentary::{CommentaryKind, CommentaryRequest, CommentaryResult, Commentator};
use crate::{Entrant, Score, Settlement, Side, settle, tie_break};
use log::{debug, warn};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub const HALFTIME_MINUTE: u8 = 45;
pub const FULLTIME_MINUTE: u8 = 90;
pub const FALLBACK_LINE: &str = "The commentator seems to be having technical difficulties.";

// ---------------------------------------------------------------------------
// Events and run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchEventKind {
    System,
    Commentary,
    Goal,
    Halftime,
    Fulltime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub kind: MatchEventKind,
    pub minute: Option<u8>,
    pub text: String,
    /// Scoring side, for goals.
    pub side: Option<Side>,
}

impl MatchEvent {
    pub fn system(minute: Option<u8>, text: impl Into<String>) -> Self {
        Self { kind: MatchEventKind::System, minute, text: text.into(), side: None }
    }

    pub fn commentary(minute: u8, text: impl Into<String>) -> Self {
        Self { kind: MatchEventKind::Commentary, minute: Some(minute), text: text.into(), side: None }
    }

    pub fn goal(minute: u8, side: Side, team: &str) -> Self {
        Self {
            kind: MatchEventKind::Goal,
            minute: Some(minute),
            text: format!("GOAL! {team} scores!"),
            side: Some(side),
        }
    }

    pub fn halftime() -> Self {
        Self {
            kind: MatchEventKind::Halftime,
            minute: Some(HALFTIME_MINUTE),
            text: "Half-Time".into(),
            side: None,
        }
    }

    pub fn fulltime() -> Self {
        Self {
            kind: MatchEventKind::Fulltime,
            minute: Some(FULLTIME_MINUTE),
            text: "Full-Time".into(),
            side: None,
        }
    }
}

impl fmt::Display for MatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minute {
            Some(minute) => write!(f, "{minute}' {}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Setup,
    Playing,
    Halftime,
    Finished,
}

/// State of a single match run. Once `Finished` it is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRunState {
    pub minute: u8,
    pub phase: Phase,
    pub score: Score,
    pub commentary_pending: bool,
    /// Every phase entered, with the minute it was entered at.
    pub transitions: Vec<(Phase, u8)>,
}

impl Default for SimulationRunState {
    fn default() -> Self {
        Self {
            minute: 0,
            phase: Phase::Setup,
            score: Score::default(),
            commentary_pending: false,
            transitions: vec![(Phase::Setup, 0)],
        }
    }
}

impl SimulationRunState {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.transitions.push((phase, self.minute));
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Final score, including a tie-break goal if one was awarded.
    pub score: Score,
    pub winner: Side,
    pub tie_break: bool,
    pub events: Vec<MatchEvent>,
    pub transitions: Vec<(Phase, u8)>,
    pub minute: u8,
}

impl MatchOutcome {
    pub fn goals(&self) -> impl Iterator<Item = &MatchEvent> {
        self.events.iter().filter(|e| e.kind == MatchEventKind::Goal)
    }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Supplies the cadence of the clock.
pub trait Pacer: Send {
    fn next_minute(&mut self) -> impl Future<Output = ()> + Send;
    fn halftime_break(&mut self) -> impl Future<Output = ()> + Send;
}

/// Wall-clock pacing backed by a tokio interval.
#[derive(Debug)]
pub struct IntervalPacer {
    interval: Interval,
    halftime: Duration,
}

impl IntervalPacer {
    /// `minute` must be non-zero.
    pub fn new(minute: Duration, halftime: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + minute, minute);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, halftime }
    }
}

impl Pacer for IntervalPacer {
    async fn next_minute(&mut self) {
        self.interval.tick().await;
    }

    async fn halftime_break(&mut self) {
        tokio::time::sleep(self.halftime).await;
        self.interval.reset();
    }
}

/// No waiting at all; minutes pass as fast as the scheduler allows.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstantPacer;

impl Pacer for InstantPacer {
    async fn next_minute(&mut self) {
        tokio::task::yield_now().await;
    }

    async fn halftime_break(&mut self) {
        tokio::task::yield_now().await;
    }
}

/// Minute length and halftime pause; a zero minute means instant pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pace {
    pub minute: Duration,
    pub halftime: Duration,
}

impl Pace {
    pub const INSTANT: Pace = Pace { minute: Duration::ZERO, halftime: Duration::ZERO };

    pub fn interactive() -> Self {
        Self { minute: Duration::from_millis(1000), halftime: Duration::from_secs(5) }
    }

    /// Quick pacing for simulating a whole bracket; no halftime pause.
    pub fn bulk(minute: Duration) -> Self {
        Self { minute, halftime: Duration::ZERO }
    }

    pub fn pacer(&self) -> ClockPacer {
        if self.minute.is_zero() {
            ClockPacer::Instant(InstantPacer)
        } else {
            ClockPacer::Interval(IntervalPacer::new(self.minute, self.halftime))
        }
    }
}

#[derive(Debug)]
pub enum ClockPacer {
    Interval(IntervalPacer),
    Instant(InstantPacer),
}

impl Pacer for ClockPacer {
    async fn next_minute(&mut self) {
        match self {
            ClockPacer::Interval(p) => p.next_minute().await,
            ClockPacer::Instant(p) => p.next_minute().await,
        }
    }

    async fn halftime_break(&mut self) {
        match self {
            ClockPacer::Interval(p) => p.halftime_break().await,
            ClockPacer::Instant(p) => p.halftime_break().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Event sinks
// ---------------------------------------------------------------------------

/// Receives events live, as the clock produces them.
pub trait EventSink: Send {
    fn emit(&mut self, event: MatchEvent) -> impl Future<Output = ()> + Send;
}

impl EventSink for () {
    async fn emit(&mut self, _event: MatchEvent) {}
}

impl EventSink for mpsc::Sender<MatchEvent> {
    async fn emit(&mut self, event: MatchEvent) {
        // A gone receiver only means nobody is watching.
        if self.send(event).await.is_err() {
            debug!("match event receiver dropped");
        }
    }
}

struct Feed<'s, S> {
    sink: &'s mut S,
    log: Vec<MatchEvent>,
}

impl<S: EventSink> Feed<'_, S> {
    async fn push(&mut self, event: MatchEvent) {
        self.log.push(event.clone());
        self.sink.emit(event).await;
    }
}

// ---------------------------------------------------------------------------
// The clock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    /// Chance per minute that something happens at all.
    pub event_chance: f64,
    /// Chance that a happening is a goal.
    pub goal_chance: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { event_chance: 0.25, goal_chance: 0.15 }
    }
}

type Reply<'a> = Pin<Box<dyn Future<Output = (u8, CommentaryResult<String>)> + Send + 'a>>;

pub struct MinuteClock<'a, C, P, R> {
    commentator: &'a C,
    pacer: P,
    rng: R,
    config: ClockConfig,
}

impl<'a, C, P, R> MinuteClock<'a, C, P, R>
where
    C: Commentator,
    P: Pacer,
    R: Rng + Send,
{
    pub fn new(commentator: &'a C, pacer: P, rng: R) -> Self {
        Self { commentator, pacer, rng, config: ClockConfig::default() }
    }

    pub fn with_config(mut self, config: ClockConfig) -> Self {
        self.config = config;
        self
    }

    /// Play one match from kickoff to the final whistle.
    pub async fn simulate_match<S: EventSink>(
        mut self,
        home: &Entrant,
        away: &Entrant,
        sink: &mut S,
    ) -> MatchOutcome {
        let mut state = SimulationRunState::new();
        let mut feed = Feed { sink, log: Vec::new() };

        feed.push(MatchEvent::system(Some(0), "The match is about to begin!")).await;
        let mut in_flight = Some(self.request(CommentaryKind::Kickoff, &state, home, away));
        state.commentary_pending = true;
        state.enter(Phase::Playing);

        loop {
            tokio::select! {
                biased;
                (minute, reply) = next_reply(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    state.commentary_pending = false;
                    feed.push(reply_event(minute, reply)).await;
                }
                _ = self.pacer.next_minute() => {
                    state.minute += 1;
                    if state.minute == HALFTIME_MINUTE {
                        drain(&mut in_flight, &mut state, &mut feed).await;
                        feed.push(MatchEvent::halftime()).await;
                        state.enter(Phase::Halftime);
                        let request = self.request(CommentaryKind::Halftime, &state, home, away);
                        let ((minute, reply), ()) = tokio::join!(request, self.pacer.halftime_break());
                        feed.push(reply_event(minute, reply)).await;
                        state.enter(Phase::Playing);
                    } else if state.minute >= FULLTIME_MINUTE {
                        drain(&mut in_flight, &mut state, &mut feed).await;
                        break;
                    } else if in_flight.is_none() {
                        in_flight = self.roll(&mut state, home, away, &mut feed).await;
                        state.commentary_pending = in_flight.is_some();
                    }
                }
            }
        }

        feed.push(MatchEvent::fulltime()).await;
        let (minute, reply) = self.request(CommentaryKind::Fulltime, &state, home, away).await;
        feed.push(reply_event(minute, reply)).await;

        // At most one goal a minute, so the tally never nears the limit.
        let settlement = settle(state.score, home, away).unwrap_or(Settlement {
            score: state.score,
            winner: tie_break(home, away),
            tie_break: false,
        });
        if settlement.tie_break {
            let taker = match settlement.winner {
                Side::Home => home,
                Side::Away => away,
            };
            feed.push(MatchEvent::system(
                Some(FULLTIME_MINUTE),
                format!(
                    "Level at full-time. {} take the tie-break on rating: {}.",
                    taker.name, settlement.score
                ),
            ))
            .await;
        }
        state.score = settlement.score;
        state.enter(Phase::Finished);
        debug!(
            "{} v {} finished {} ({} events)",
            home.name,
            away.name,
            state.score,
            feed.log.len()
        );

        MatchOutcome {
            score: state.score,
            winner: settlement.winner,
            tie_break: settlement.tie_break,
            events: feed.log,
            transitions: state.transitions,
            minute: state.minute,
        }
    }

    /// Roll for a happening this minute; returns the commentary request it triggers.
    async fn roll<S: EventSink>(
        &mut self,
        state: &mut SimulationRunState,
        home: &Entrant,
        away: &Entrant,
        feed: &mut Feed<'_, S>,
    ) -> Option<Reply<'a>> {
        if self.rng.gen_range(0.0..1.0) >= self.config.event_chance {
            return None;
        }
        if self.rng.gen_range(0.0..1.0) < self.config.goal_chance {
            let side = if self.rng.gen_bool(0.5) { Side::Home } else { Side::Away };
            let team = match side {
                Side::Home => &home.name,
                Side::Away => &away.name,
            };
            state.score.bump(side);
            feed.push(MatchEvent::goal(state.minute, side, team)).await;
            Some(self.request(CommentaryKind::Goal, state, home, away))
        } else {
            Some(self.request(CommentaryKind::Event, state, home, away))
        }
    }

    fn request(
        &self,
        kind: CommentaryKind,
        state: &SimulationRunState,
        home: &Entrant,
        away: &Entrant,
    ) -> Reply<'a> {
        let commentator = self.commentator;
        let minute = state.minute;
        let request = CommentaryRequest {
            kind,
            home: home.name.clone(),
            away: away.name.clone(),
            score: state.score,
            minute,
        };
        Box::pin(async move { (minute, commentator.commentate(request).await) })
    }
}

async fn next_reply(in_flight: &mut Option<Reply<'_>>) -> (u8, CommentaryResult<String>) {
    match in_flight.as_mut() {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}

/// Wait out an outstanding request so its line lands before the whistle.
async fn drain<S: EventSink>(
    in_flight: &mut Option<Reply<'_>>,
    state: &mut SimulationRunState,
    feed: &mut Feed<'_, S>,
) {
    if let Some(reply) = in_flight.take() {
        let (minute, reply) = reply.await;
        feed.push(reply_event(minute, reply)).await;
    }
    state.commentary_pending = false;
}

fn reply_event(minute: u8, reply: CommentaryResult<String>) -> MatchEvent {
    match reply {
        Ok(text) if !text.trim().is_empty() => MatchEvent::commentary(minute, text),
        Ok(_) => MatchEvent::system(Some(minute), FALLBACK_LINE),
        Err(e) => {
            warn!("commentary failed at {minute}': {e}");
            MatchEvent::system(Some(minute), FALLBACK_LINE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commentary::{CannedCommentator, CommentaryError};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Slow(Duration);

    impl Commentator for Slow {
        async fn commentate(&self, request: CommentaryRequest) -> CommentaryResult<String> {
            tokio::time::sleep(self.0).await;
            Ok(format!("{} at {}", request.kind.as_str(), request.minute))
        }
    }

    struct Broken;

    impl Commentator for Broken {
        async fn commentate(&self, _request: CommentaryRequest) -> CommentaryResult<String> {
            Err(CommentaryError::Other("offline".into()))
        }
    }

    fn teams() -> (Entrant, Entrant) {
        (Entrant::new("Egypt", "EG"), Entrant::new("Ghana", "GH").with_rating(1600))
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[tokio::test]
    async fn phases_run_in_order_with_one_halftime() {
        let (home, away) = teams();
        let canned = CannedCommentator::new();
        let outcome = MinuteClock::new(&canned, InstantPacer, rng())
            .simulate_match(&home, &away, &mut ())
            .await;

        let phases: Vec<Phase> = outcome.transitions.iter().map(|(p, _)| *p).collect();
        assert_eq!(
            phases,
            vec![Phase::Setup, Phase::Playing, Phase::Halftime, Phase::Playing, Phase::Finished]
        );
        assert_eq!(outcome.transitions[2], (Phase::Halftime, HALFTIME_MINUTE));
        assert_eq!(outcome.minute, FULLTIME_MINUTE);

        let halftimes = outcome
            .events
            .iter()
            .filter(|e| e.kind == MatchEventKind::Halftime)
            .count();
        assert_eq!(halftimes, 1);
        assert_eq!(outcome.events[0].text, "The match is about to begin!");
        let fulltime = outcome
            .events
            .iter()
            .position(|e| e.kind == MatchEventKind::Fulltime)
            .unwrap();
        let halftime = outcome
            .events
            .iter()
            .position(|e| e.kind == MatchEventKind::Halftime)
            .unwrap();
        assert!(halftime < fulltime);
    }

    #[tokio::test]
    async fn winner_always_has_more_goals() {
        let (home, away) = teams();
        let canned = CannedCommentator::new();
        for seed in 0..20 {
            let outcome = MinuteClock::new(&canned, InstantPacer, StdRng::seed_from_u64(seed))
                .simulate_match(&home, &away, &mut ())
                .await;
            assert!(
                outcome.score.get(outcome.winner) > outcome.score.get(outcome.winner.other()),
                "seed {seed}: {} won by {:?}",
                outcome.score,
                outcome.winner
            );
        }
    }

    #[tokio::test]
    async fn every_open_minute_scores_when_goals_are_certain() {
        let (home, away) = teams();
        let canned = CannedCommentator::new();
        let outcome = MinuteClock::new(&canned, InstantPacer, rng())
            .with_config(ClockConfig { event_chance: 1.0, goal_chance: 1.0 })
            .simulate_match(&home, &away, &mut ())
            .await;

        // Minutes 1-44 and 46-89.
        assert_eq!(outcome.goals().count(), 88);
        assert!(outcome.goals().all(|g| g.text.starts_with("GOAL! ")));
    }

    #[tokio::test]
    async fn quiet_match_is_settled_by_rating() {
        let (home, away) = teams();
        let canned = CannedCommentator::new();
        let outcome = MinuteClock::new(&canned, InstantPacer, rng())
            .with_config(ClockConfig { event_chance: 0.0, goal_chance: 0.0 })
            .simulate_match(&home, &away, &mut ())
            .await;

        assert!(outcome.tie_break);
        assert_eq!(outcome.winner, Side::Away);
        assert_eq!(outcome.score, Score::new(0, 1));
        let last = outcome.events.last().unwrap();
        assert_eq!(last.kind, MatchEventKind::System);
        assert!(last.text.contains("Ghana take the tie-break"), "{}", last.text);
    }

    #[tokio::test]
    async fn commentator_outage_falls_back_and_finishes() {
        let (home, away) = teams();
        let outcome = MinuteClock::new(&Broken, InstantPacer, rng())
            .with_config(ClockConfig { event_chance: 1.0, goal_chance: 0.0 })
            .simulate_match(&home, &away, &mut ())
            .await;

        assert_eq!(outcome.minute, FULLTIME_MINUTE);
        assert!(outcome.events.iter().all(|e| e.kind != MatchEventKind::Commentary));
        let fallbacks = outcome.events.iter().filter(|e| e.text == FALLBACK_LINE).count();
        // Kickoff, every open minute, halftime, fulltime.
        assert_eq!(fallbacks, 1 + 88 + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_commentary_suppresses_rolls() {
        let (home, away) = teams();
        let slow = Slow(Duration::from_millis(4500));
        let started = Instant::now();
        let outcome = MinuteClock::new(&slow, Pace::interactive().pacer(), rng())
            .with_config(ClockConfig { event_chance: 1.0, goal_chance: 0.0 })
            .simulate_match(&home, &away, &mut ())
            .await;

        let first_half: Vec<u8> = outcome
            .events
            .iter()
            .filter(|e| e.kind == MatchEventKind::Commentary)
            .filter_map(|e| e.minute)
            .filter(|m| *m < HALFTIME_MINUTE)
            .collect();
        assert_eq!(first_half, vec![0, 5, 10, 15, 20, 25, 30, 35, 40]);
        assert!(started.elapsed() >= Duration::from_secs(95));
    }

    #[tokio::test]
    async fn events_reach_the_sink_live() {
        let (home, away) = teams();
        let canned = CannedCommentator::new();
        let (mut tx, mut rx) = mpsc::channel(256);
        let outcome = MinuteClock::new(&canned, InstantPacer, rng())
            .simulate_match(&home, &away, &mut tx)
            .await;
        drop(tx);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(received, outcome.events);
    }
}
