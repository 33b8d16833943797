use crate::app::MenuItem;
use crate::state::simulation::LoadingState;
use chrono::Local;
use knockout_engine::clock::{MatchEvent, MatchEventKind, MatchOutcome};
use knockout_engine::orchestrator::ProgressEvent;
use knockout_engine::{Bracket, Entrant, Match, MatchStatus, Score, Side, Slot};

const FEED_LIMIT: usize = 400;

// ---------------------------------------------------------------------------
// Scrolling text feed shared by the tournament and friendly tabs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Stage,
    Kickoff,
    Commentary,
    Goal,
    Whistle,
    Result,
    Champion,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedLine {
    pub timestamp: String,
    pub kind: FeedKind,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Feed {
    pub lines: Vec<FeedLine>,
    /// Lines scrolled back from the newest; 0 follows the feed.
    pub scroll_offset: u16,
}

impl Feed {
    pub fn push(&mut self, kind: FeedKind, text: impl Into<String>) {
        self.lines.push(FeedLine {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            kind,
            text: text.into(),
        });
        if self.lines.len() > FEED_LIMIT {
            let remove_count = self.lines.len() - FEED_LIMIT;
            self.lines.drain(0..remove_count);
        }
        // Keep the viewed line in place while scrolled back.
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.max_scroll());
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_offset = (self.scroll_offset + 1).min(self.max_scroll());
    }

    pub fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(1);
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_offset = 0;
    }

    fn max_scroll(&self) -> u16 {
        self.lines.len().saturating_sub(1).min(u16::MAX as usize) as u16
    }
}

fn event_kind(event: &MatchEvent) -> FeedKind {
    match event.kind {
        MatchEventKind::Goal => FeedKind::Goal,
        MatchEventKind::Halftime | MatchEventKind::Fulltime => FeedKind::Whistle,
        MatchEventKind::Commentary | MatchEventKind::System => FeedKind::Commentary,
    }
}

// ---------------------------------------------------------------------------
// Tournament tab
// ---------------------------------------------------------------------------

/// The match currently being played, as seen from its event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMatch {
    pub match_id: String,
    pub home: String,
    pub away: String,
    pub score: Score,
    pub minute: u8,
}

#[derive(Debug, Default)]
pub struct TournamentState {
    pub bracket: Option<Bracket>,
    pub feed: Feed,
    pub live: Option<LiveMatch>,
    pub running: bool,
    pub champion: Option<String>,
}

impl TournamentState {
    pub fn load(&mut self, bracket: Bracket) {
        let same = self.bracket.as_ref().is_some_and(|b| b.tournament.id == bracket.tournament.id);
        if !same {
            self.champion = None;
            self.live = None;
        }
        self.bracket = Some(bracket);
    }

    /// Forget everything about the previous tournament.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, event: ProgressEvent) {
        let line = event.to_string();
        match event {
            ProgressEvent::StageStarted { .. } => self.feed.push(FeedKind::Stage, line),
            ProgressEvent::MatchStarted { match_id, home, away } => {
                self.live = Some(LiveMatch { match_id, home, away, score: Score::default(), minute: 0 });
                self.feed.push(FeedKind::Kickoff, line);
            }
            ProgressEvent::MatchEvent { match_id, event } => {
                if let Some(live) = self.live.as_mut().filter(|l| l.match_id == match_id) {
                    if let Some(minute) = event.minute {
                        live.minute = minute;
                    }
                    if event.kind == MatchEventKind::Goal
                        && let Some(side) = event.side
                    {
                        live.score.bump(side);
                    }
                }
                self.feed.push(event_kind(&event), line);
            }
            ProgressEvent::MatchCompleted { match_id, .. } => {
                if self.live.as_ref().is_some_and(|l| l.match_id == match_id) {
                    self.live = None;
                }
                self.feed.push(FeedKind::Result, line);
            }
            ProgressEvent::StageAdvanced { .. } => self.feed.push(FeedKind::Stage, line),
            ProgressEvent::Champion { name, .. } => {
                self.champion = Some(name);
                self.feed.push(FeedKind::Champion, line);
            }
            ProgressEvent::Warning(_) => self.feed.push(FeedKind::Warning, line),
        }
    }

    pub fn stopped(&mut self) {
        self.running = false;
        self.live = None;
    }

    /// Completed matches out of the seven in the bracket.
    pub fn completed_matches(&self) -> (usize, usize) {
        let Some(bracket) = &self.bracket else {
            return (0, 0);
        };
        let done = bracket.matches.iter().filter(|m| m.status == MatchStatus::Completed).count();
        (done, bracket.matches.len())
    }
}

/// One row of the fixtures scoreboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub label: String,
    pub home: String,
    pub away: String,
    pub score: Option<Score>,
    pub status: MatchStatus,
    pub winner: Option<Side>,
    /// Minute of play while the match is live.
    pub minute: Option<u8>,
}

impl Fixture {
    pub fn new(m: &Match, entrants: &[Entrant], live: Option<&LiveMatch>) -> Self {
        let live = live.filter(|l| l.match_id == m.id);
        let winner = m.winner.as_deref().and_then(|id| {
            [Side::Home, Side::Away].into_iter().find(|&side| {
                m.side(side)
                    .entrant()
                    .is_some_and(|r| entrants.iter().any(|e| e.id == id && r.matches(e)))
            })
        });
        Self {
            label: format!("{}{}", m.stage.code().to_uppercase(), m.slot),
            home: slot_label(&m.home, entrants),
            away: slot_label(&m.away, entrants),
            score: live.map(|l| l.score).or(m.score),
            status: m.status,
            winner,
            minute: live.map(|l| l.minute),
        }
    }

    pub fn status_text(&self) -> String {
        match self.status {
            MatchStatus::Pending => "-".to_string(),
            MatchStatus::InProgress => match self.minute {
                Some(minute) => format!("LIVE {minute}'"),
                None => "LIVE".to_string(),
            },
            MatchStatus::Completed => "FT".to_string(),
        }
    }
}

impl TournamentState {
    /// Every match of the bracket, stage by stage.
    pub fn fixtures(&self, entrants: &[Entrant]) -> Vec<Fixture> {
        self.bracket
            .iter()
            .flat_map(|b| b.matches.iter())
            .map(|m| Fixture::new(m, entrants, self.live.as_ref()))
            .collect()
    }
}

/// Display name of a bracket slot.
pub fn slot_label(slot: &Slot, entrants: &[Entrant]) -> String {
    match slot {
        Slot::Entrant(r) => entrants
            .iter()
            .find(|e| r.matches(e))
            .map(|e| e.name.clone())
            .unwrap_or_else(|| r.to_string()),
        Slot::WinnerOf(match_id) => {
            let code = match_id.rsplit('-').next().unwrap_or(match_id);
            format!("Winner {}", code.to_uppercase())
        }
    }
}

// ---------------------------------------------------------------------------
// Friendly tab
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FriendlyState {
    pub home_idx: usize,
    pub away_idx: usize,
    pub fixture: Option<(String, String)>,
    pub running: bool,
    pub score: Score,
    pub minute: u8,
    pub feed: Feed,
    pub result: Option<String>,
}

impl FriendlyState {
    pub fn new() -> Self {
        Self { away_idx: 1, ..Self::default() }
    }

    pub fn cycle_home(&mut self, len: usize, forward: bool) {
        self.home_idx = cycle(self.home_idx, len, forward);
    }

    pub fn cycle_away(&mut self, len: usize, forward: bool) {
        self.away_idx = cycle(self.away_idx, len, forward);
    }

    pub fn started(&mut self, home: String, away: String) {
        self.feed.clear();
        self.feed.push(FeedKind::Kickoff, format!("{home} v {away}"));
        self.fixture = Some((home, away));
        self.running = true;
        self.score = Score::default();
        self.minute = 0;
        self.result = None;
    }

    pub fn apply(&mut self, event: MatchEvent) {
        if let Some(minute) = event.minute {
            self.minute = minute;
        }
        if event.kind == MatchEventKind::Goal
            && let Some(side) = event.side
        {
            self.score.bump(side);
        }
        self.feed.push(event_kind(&event), event.to_string());
    }

    pub fn finished(&mut self, outcome: MatchOutcome) {
        self.running = false;
        self.score = outcome.score;
        self.minute = outcome.minute;
        let winner = self.fixture.as_ref().map(|(home, away)| match outcome.winner {
            Side::Home => home.clone(),
            Side::Away => away.clone(),
        });
        let mut result = format!("Full-time {}", outcome.score);
        if let Some(winner) = winner {
            result.push_str(&format!(". {winner} win"));
            if outcome.tie_break {
                result.push_str(" on the tie-break");
            }
        }
        self.feed.push(FeedKind::Result, result.clone());
        self.result = Some(result);
    }

    pub fn reset(&mut self) {
        let (home_idx, away_idx) = (self.home_idx, self.away_idx);
        *self = Self { home_idx, away_idx, ..Self::default() };
    }
}

fn cycle(idx: usize, len: usize, forward: bool) -> usize {
    if len == 0 {
        return 0;
    }
    if forward { (idx + 1) % len } else { (idx + len - 1) % len }
}

// ---------------------------------------------------------------------------
// Root app state
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct AppState {
    pub active_tab: MenuItem,
    pub previous_tab: MenuItem,
    pub show_logs: bool,
    pub last_error: Option<String>,
    pub loading: LoadingState,
    pub entrants: Vec<Entrant>,
    pub entrants_scroll: u16,
    pub tournament: TournamentState,
    pub friendly: FriendlyState,
}

impl AppState {
    pub fn new() -> Self {
        Self { friendly: FriendlyState::new(), ..Self::default() }
    }

    /// Ids of the entrants picked for the friendly, when both picks exist.
    pub fn friendly_pick(&self) -> Option<(String, String)> {
        let home = self.entrants.get(self.friendly.home_idx)?;
        let away = self.entrants.get(self.friendly.away_idx)?;
        Some((home.id.clone(), away.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knockout_engine::{EntrantRef, Stage};

    fn started(tournament: &mut TournamentState) {
        tournament.apply(ProgressEvent::MatchStarted {
            match_id: "t-9-qf0".into(),
            home: "Morocco".into(),
            away: "Ghana".into(),
        });
    }

    #[test]
    fn live_match_follows_goals_and_minutes() {
        let mut tournament = TournamentState::default();
        started(&mut tournament);
        tournament.apply(ProgressEvent::MatchEvent {
            match_id: "t-9-qf0".into(),
            event: MatchEvent::goal(17, Side::Away, "Ghana"),
        });

        let live = tournament.live.as_ref().unwrap();
        assert_eq!(live.minute, 17);
        assert_eq!(live.score, Score::new(0, 1));
        assert_eq!(tournament.feed.lines.last().unwrap().kind, FeedKind::Goal);
    }

    #[test]
    fn completion_clears_the_live_match() {
        let mut tournament = TournamentState::default();
        started(&mut tournament);
        tournament.apply(ProgressEvent::MatchCompleted {
            match_id: "t-9-qf0".into(),
            home: "Morocco".into(),
            away: "Ghana".into(),
            score: Score::new(2, 1),
            winner: "Morocco".into(),
        });
        assert!(tournament.live.is_none());

        tournament.apply(ProgressEvent::Champion { tournament_id: "t-9".into(), name: "Morocco".into() });
        assert_eq!(tournament.champion.as_deref(), Some("Morocco"));
    }

    #[test]
    fn events_for_another_match_leave_the_scoreboard_alone() {
        let mut tournament = TournamentState::default();
        started(&mut tournament);
        tournament.apply(ProgressEvent::MatchEvent {
            match_id: "t-9-qf1".into(),
            event: MatchEvent::goal(3, Side::Home, "Senegal"),
        });
        assert_eq!(tournament.live.as_ref().unwrap().score, Score::default());
        assert_eq!(tournament.feed.lines.len(), 2);
    }

    #[test]
    fn scrolled_feed_stays_put_as_lines_arrive() {
        let mut feed = Feed::default();
        for i in 0..5 {
            feed.push(FeedKind::Commentary, format!("line {i}"));
        }
        feed.scroll_up();
        feed.scroll_up();
        feed.push(FeedKind::Commentary, "line 5");
        assert_eq!(feed.scroll_offset, 3);

        for _ in 0..10 {
            feed.scroll_down();
        }
        assert_eq!(feed.scroll_offset, 0);
    }

    #[test]
    fn feed_is_capped() {
        let mut feed = Feed::default();
        for i in 0..(FEED_LIMIT + 20) {
            feed.push(FeedKind::Commentary, format!("line {i}"));
        }
        assert_eq!(feed.lines.len(), FEED_LIMIT);
        assert_eq!(feed.lines[0].text, "line 20");
    }

    #[test]
    fn friendly_result_names_the_winner() {
        let mut friendly = FriendlyState::new();
        friendly.started("Egypt".into(), "Algeria".into());
        friendly.apply(MatchEvent::goal(60, Side::Home, "Egypt"));
        assert_eq!(friendly.score, Score::new(1, 0));

        friendly.finished(MatchOutcome {
            score: Score::new(1, 0),
            winner: Side::Home,
            tie_break: false,
            events: Vec::new(),
            transitions: Vec::new(),
            minute: 90,
        });
        assert!(!friendly.running);
        assert_eq!(friendly.result.as_deref(), Some("Full-time 1-0. Egypt win"));
    }

    #[test]
    fn pickers_wrap_around() {
        let mut friendly = FriendlyState::new();
        friendly.cycle_home(8, false);
        assert_eq!(friendly.home_idx, 7);
        friendly.cycle_away(8, true);
        assert_eq!(friendly.away_idx, 2);
        friendly.cycle_away(0, true);
        assert_eq!(friendly.away_idx, 0);
    }

    #[test]
    fn fixtures_follow_the_live_match() {
        let mut morocco = Entrant::new("Morocco", "MA");
        morocco.id = "e-1".into();
        let mut ghana = Entrant::new("Ghana", "GH");
        ghana.id = "e-2".into();
        let entrants = vec![morocco.clone(), ghana.clone()];

        let mut qf = Match::new(
            "t-9",
            Stage::QuarterFinals,
            0,
            Slot::Entrant(morocco.reference()),
            Slot::Entrant(ghana.reference()),
        );
        qf.status = MatchStatus::InProgress;
        let sf = Match::new(
            "t-9",
            Stage::SemiFinals,
            0,
            Slot::WinnerOf(qf.id.clone()),
            Slot::WinnerOf(knockout_engine::match_id("t-9", Stage::QuarterFinals, 1)),
        );
        let mut tournament = TournamentState {
            bracket: Some(Bracket::new(knockout_engine::Tournament::new("Cup"), vec![qf, sf])),
            ..TournamentState::default()
        };
        started(&mut tournament);
        tournament.apply(ProgressEvent::MatchEvent {
            match_id: "t-9-qf0".into(),
            event: MatchEvent::goal(63, Side::Home, "Morocco"),
        });

        let fixtures = tournament.fixtures(&entrants);
        assert_eq!(fixtures[0].label, "QF0");
        assert_eq!(fixtures[0].score, Some(Score::new(1, 0)));
        assert_eq!(fixtures[0].status_text(), "LIVE 63'");
        assert_eq!(fixtures[1].home, "Winner QF0");
        assert_eq!(fixtures[1].status_text(), "-");
    }

    #[test]
    fn completed_fixtures_name_the_winning_side() {
        let mut egypt = Entrant::new("Egypt", "EG");
        egypt.id = "e-6".into();
        let mut algeria = Entrant::new("Algeria", "DZ");
        algeria.id = "e-8".into();
        let entrants = vec![egypt.clone(), algeria.clone()];

        let mut m = Match::new(
            "t-9",
            Stage::Final,
            0,
            Slot::Entrant(egypt.reference()),
            Slot::Entrant(algeria.reference()),
        );
        m.status = MatchStatus::Completed;
        m.score = Some(Score::new(0, 2));
        m.winner = Some(algeria.id.clone());

        let fixture = Fixture::new(&m, &entrants, None);
        assert_eq!(fixture.winner, Some(Side::Away));
        assert_eq!(fixture.status_text(), "FT");
        assert_eq!(fixture.label, "F0");
    }

    #[test]
    fn slot_labels() {
        let mut ghana = Entrant::new("Ghana", "GH");
        ghana.id = "e-2".into();
        let entrants = vec![ghana];

        let by_id = Slot::Entrant(EntrantRef::ById { id: "e-2".into() });
        assert_eq!(slot_label(&by_id, &entrants), "Ghana");
        let by_name = Slot::Entrant(EntrantRef::ByName("Mali".into()));
        assert_eq!(slot_label(&by_name, &entrants), "Mali");
        let pending = Slot::WinnerOf(knockout_engine::match_id("t-9", Stage::QuarterFinals, 1));
        assert_eq!(slot_label(&pending, &entrants), "Winner QF1");
    }
}
