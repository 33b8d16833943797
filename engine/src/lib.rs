pub mod bracket;
pub mod client;
pub mod clock;
pub mod commentary;
pub mod gemini;
pub mod orchestrator;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_RATING: u32 = 1500;

// ---------------------------------------------------------------------------
// Entrants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrant {
    /// Assigned by the store on registration; empty until then.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default = "default_rating")]
    pub rating: u32,
    #[serde(default)]
    pub eliminated: bool,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
}

fn default_rating() -> u32 {
    DEFAULT_RATING
}

impl Entrant {
    pub fn new(name: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            country: country.into(),
            rating: DEFAULT_RATING,
            eliminated: false,
            registered_at: Utc::now(),
        }
    }

    pub fn with_rating(mut self, rating: u32) -> Self {
        self.rating = rating;
        self
    }

    pub fn reference(&self) -> EntrantRef {
        EntrantRef::ById { id: self.id.clone() }
    }
}

/// How a match record points at an entrant.
///
/// Older records hold the team name as a bare string, newer ones an object
/// carrying the id (a full entrant object deserializes as `ById` too). Either
/// form is resolved once, when the match is read, into a concrete [`Entrant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntrantRef {
    ById { id: String },
    ByName(String),
}

impl EntrantRef {
    pub fn matches(&self, entrant: &Entrant) -> bool {
        match self {
            EntrantRef::ById { id } => *id == entrant.id,
            EntrantRef::ByName(name) => name.eq_ignore_ascii_case(&entrant.name),
        }
    }
}

impl fmt::Display for EntrantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntrantRef::ById { id } => write!(f, "#{id}"),
            EntrantRef::ByName(name) => f.write_str(name),
        }
    }
}

/// One side of a fixture: either a known entrant or the winner of an earlier match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Entrant(EntrantRef),
    WinnerOf(String),
}

impl Slot {
    pub fn entrant(&self) -> Option<&EntrantRef> {
        match self {
            Slot::Entrant(r) => Some(r),
            Slot::WinnerOf(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Slot::Entrant(_))
    }
}

// ---------------------------------------------------------------------------
// Stage / status vocabulary
// ---------------------------------------------------------------------------

/// Bracket stages, ordered from first to last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    QuarterFinals,
    SemiFinals,
    Final,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::QuarterFinals, Stage::SemiFinals, Stage::Final];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::QuarterFinals => "quarter_finals",
            Stage::SemiFinals => "semi_finals",
            Stage::Final => "final",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::QuarterFinals => "Quarter Finals",
            Stage::SemiFinals => "Semi Finals",
            Stage::Final => "Final",
        }
    }

    /// Short code used in match ids.
    pub fn code(&self) -> &'static str {
        match self {
            Stage::QuarterFinals => "qf",
            Stage::SemiFinals => "sf",
            Stage::Final => "f",
        }
    }

    pub fn match_count(&self) -> usize {
        match self {
            Stage::QuarterFinals => 4,
            Stage::SemiFinals => 2,
            Stage::Final => 1,
        }
    }

    pub fn prev(self) -> Option<Self> {
        match self {
            Stage::QuarterFinals => None,
            Stage::SemiFinals => Some(Stage::QuarterFinals),
            Stage::Final => Some(Stage::SemiFinals),
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Stage::QuarterFinals => Some(Stage::SemiFinals),
            Stage::SemiFinals => Some(Stage::Final),
            Stage::Final => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    #[default]
    Setup,
    Active,
    Completed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Setup => "setup",
            TournamentStatus::Active => "active",
            TournamentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }
}

// ---------------------------------------------------------------------------
// Scores and the tie-break rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub home: u16,
    pub away: u16,
}

impl Score {
    pub fn new(home: u16, away: u16) -> Self {
        Self { home, away }
    }

    pub fn get(&self, side: Side) -> u16 {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    pub fn bump(&mut self, side: Side) {
        match side {
            Side::Home => self.home = self.home.saturating_add(1),
            Side::Away => self.away = self.away.saturating_add(1),
        }
    }

    /// One more goal for `side`, or `None` if the tally would overflow.
    pub fn checked_bump(self, side: Side) -> Option<Self> {
        match side {
            Side::Home => Some(Self { home: self.home.checked_add(1)?, ..self }),
            Side::Away => Some(Self { away: self.away.checked_add(1)?, ..self }),
        }
    }

    /// The side strictly ahead, or `None` when level.
    pub fn leader(&self) -> Option<Side> {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => Some(Side::Home),
            std::cmp::Ordering::Less => Some(Side::Away),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

/// Knockout ties cannot end level. The higher-rated entrant takes the
/// tie-break goal; on equal ratings the home side does.
pub fn tie_break(home: &Entrant, away: &Entrant) -> Side {
    if away.rating > home.rating { Side::Away } else { Side::Home }
}

/// A final score with a guaranteed winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub score: Score,
    pub winner: Side,
    pub tie_break: bool,
}

/// `None` when a level score has no room left for the tie-break goal.
pub fn settle(score: Score, home: &Entrant, away: &Entrant) -> Option<Settlement> {
    match score.leader() {
        Some(winner) => Some(Settlement { score, winner, tie_break: false }),
        None => {
            let winner = tie_break(home, away);
            let score = score.checked_bump(winner)?;
            Some(Settlement { score, winner, tie_break: true })
        }
    }
}

// ---------------------------------------------------------------------------
// Matches and tournaments
// ---------------------------------------------------------------------------

pub fn match_id(tournament_id: &str, stage: Stage, slot: usize) -> String {
    format!("{tournament_id}-{}{slot}", stage.code())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub tournament_id: String,
    pub stage: Stage,
    /// Position within the stage, 0-based, in bracket order.
    pub slot: usize,
    pub home: Slot,
    pub away: Slot,
    pub score: Option<Score>,
    pub status: MatchStatus,
    /// Entrant id of the winner; set together with `score` on completion.
    pub winner: Option<String>,
    #[serde(default)]
    pub commentary: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn new(tournament_id: &str, stage: Stage, slot: usize, home: Slot, away: Slot) -> Self {
        Self {
            id: match_id(tournament_id, stage, slot),
            tournament_id: tournament_id.to_owned(),
            stage,
            slot,
            home,
            away,
            score: None,
            status: MatchStatus::Pending,
            winner: None,
            commentary: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn side(&self, side: Side) -> &Slot {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.home.is_resolved() && self.away.is_resolved()
    }

    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub stage: Stage,
    pub status: TournamentStatus,
    /// Entrant id of the champion once the final has been advanced past.
    pub champion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            stage: Stage::QuarterFinals,
            status: TournamentStatus::Setup,
            champion: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A tournament together with all of its matches, ordered by stage then slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub tournament: Tournament,
    pub matches: Vec<Match>,
}

impl Bracket {
    pub fn new(tournament: Tournament, mut matches: Vec<Match>) -> Self {
        matches.sort_by_key(|m| (m.stage, m.slot));
        Self { tournament, matches }
    }

    pub fn stage_matches(&self, stage: Stage) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(move |m| m.stage == stage)
    }

    pub fn find_match(&self, match_id: &str) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == match_id)
    }

    pub fn is_stage_complete(&self, stage: Stage) -> bool {
        let mut matches = self.stage_matches(stage).peekable();
        matches.peek().is_some() && matches.all(Match::is_completed)
    }

    pub fn is_completed(&self) -> bool {
        self.tournament.status == TournamentStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_tokens_match_external_vocabulary() {
        let tokens: Vec<String> = Stage::ALL
            .iter()
            .map(|s| serde_json::to_string(s).unwrap())
            .collect();
        assert_eq!(tokens, vec!["\"quarter_finals\"", "\"semi_finals\"", "\"final\""]);
        assert_eq!(serde_json::to_string(&MatchStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(serde_json::to_string(&TournamentStatus::Setup).unwrap(), "\"setup\"");
    }

    #[test]
    fn stage_navigation() {
        assert_eq!(Stage::QuarterFinals.next(), Some(Stage::SemiFinals));
        assert_eq!(Stage::Final.next(), None);
        assert_eq!(Stage::QuarterFinals.prev(), None);
        assert_eq!(Stage::Final.prev(), Some(Stage::SemiFinals));
        let total: usize = Stage::ALL.iter().map(Stage::match_count).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn entrant_ref_accepts_bare_names_and_objects() {
        let by_name: EntrantRef = serde_json::from_str("\"Egypt\"").unwrap();
        assert_eq!(by_name, EntrantRef::ByName("Egypt".into()));

        let full_object = r#"{"id":"e-3","name":"Ghana","country":"GH","rating":1610}"#;
        let by_id: EntrantRef = serde_json::from_str(full_object).unwrap();
        assert_eq!(by_id, EntrantRef::ById { id: "e-3".into() });
    }

    #[test]
    fn entrant_ref_name_match_ignores_case() {
        let mut ghana = Entrant::new("Ghana", "GH");
        ghana.id = "e-3".into();
        assert!(EntrantRef::ByName("ghana".into()).matches(&ghana));
        assert!(ghana.reference().matches(&ghana));
        assert!(!EntrantRef::ById { id: "e-4".into() }.matches(&ghana));
    }

    #[test]
    fn entrant_defaults_rating_when_missing() {
        let entrant: Entrant = serde_json::from_str(r#"{"name":"Mali","country":"ML"}"#).unwrap();
        assert_eq!(entrant.rating, DEFAULT_RATING);
        assert!(!entrant.eliminated);
    }

    #[test]
    fn settle_keeps_decisive_scores() {
        let home = Entrant::new("A", "");
        let away = Entrant::new("B", "");
        let s = settle(Score::new(1, 3), &home, &away).unwrap();
        assert_eq!(s.winner, Side::Away);
        assert_eq!(s.score, Score::new(1, 3));
        assert!(!s.tie_break);
    }

    #[test]
    fn settle_awards_tie_break_goal_to_higher_rating() {
        let home = Entrant::new("A", "").with_rating(1400);
        let away = Entrant::new("B", "").with_rating(1600);
        let s = settle(Score::new(2, 2), &home, &away).unwrap();
        assert_eq!(s.winner, Side::Away);
        assert_eq!(s.score, Score::new(2, 3));
        assert!(s.tie_break);
    }

    #[test]
    fn settle_favours_home_on_equal_ratings() {
        let home = Entrant::new("A", "");
        let away = Entrant::new("B", "");
        let s = settle(Score::default(), &home, &away).unwrap();
        assert_eq!(s.winner, Side::Home);
        assert_eq!(s.score, Score::new(1, 0));
    }

    #[test]
    fn settle_refuses_a_tie_break_goal_past_the_tally_limit() {
        let home = Entrant::new("A", "");
        let away = Entrant::new("B", "");
        assert_eq!(settle(Score::new(u16::MAX, u16::MAX), &home, &away), None);
        let s = settle(Score::new(u16::MAX, 3), &home, &away).unwrap();
        assert_eq!(s.winner, Side::Home);
    }

    #[test]
    fn bump_stops_at_the_limit() {
        let mut score = Score::new(u16::MAX, 0);
        score.bump(Side::Home);
        assert_eq!(score, Score::new(u16::MAX, 0));
        assert_eq!(score.checked_bump(Side::Home), None);
        assert_eq!(score.checked_bump(Side::Away), Some(Score::new(u16::MAX, 1)));
    }
}
