use crate::{Entrant, Match, MatchStatus, Stage, Tournament, TournamentStatus};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    Conflict(String),
    /// The backing store could not be reached or refused the write. Retryable.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "Not found: {what}"),
            StoreError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "Store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Match query; empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchFilter {
    pub tournament_id: Option<String>,
    pub stage: Option<Stage>,
    pub statuses: Vec<MatchStatus>,
}

impl MatchFilter {
    pub fn tournament(id: impl Into<String>) -> Self {
        Self { tournament_id: Some(id.into()), ..Default::default() }
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn status(mut self, status: MatchStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn accepts(&self, m: &Match) -> bool {
        self.tournament_id.as_deref().is_none_or(|id| id == m.tournament_id)
            && self.stage.is_none_or(|s| s == m.stage)
            && (self.statuses.is_empty() || self.statuses.contains(&m.status))
    }
}

pub trait TournamentStore: Send + Sync {
    // Entrants, in registration order.
    fn list_entrants(&self) -> impl Future<Output = StoreResult<Vec<Entrant>>> + Send;
    fn get_entrant(&self, id: &str) -> impl Future<Output = StoreResult<Entrant>> + Send;
    /// Registers an entrant and returns it with its assigned id.
    fn create_entrant(&self, entrant: Entrant) -> impl Future<Output = StoreResult<Entrant>> + Send;
    fn update_entrant(&self, entrant: Entrant) -> impl Future<Output = StoreResult<Entrant>> + Send;
    fn delete_entrant(&self, id: &str) -> impl Future<Output = StoreResult<()>> + Send;

    // Matches
    fn create_match(&self, m: Match) -> impl Future<Output = StoreResult<Match>> + Send;
    fn get_match(&self, id: &str) -> impl Future<Output = StoreResult<Match>> + Send;
    fn update_match(&self, m: Match) -> impl Future<Output = StoreResult<Match>> + Send;
    fn list_matches(&self, filter: &MatchFilter) -> impl Future<Output = StoreResult<Vec<Match>>> + Send;

    // Tournaments
    fn create_tournament(&self, t: Tournament) -> impl Future<Output = StoreResult<Tournament>> + Send;
    fn get_tournament(&self, id: &str) -> impl Future<Output = StoreResult<Tournament>> + Send;
    fn update_tournament(&self, t: Tournament) -> impl Future<Output = StoreResult<Tournament>> + Send;
    /// Most recently created tournament whose status is `active`.
    fn active_tournament(&self) -> impl Future<Output = StoreResult<Option<Tournament>>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    entrants: Vec<Entrant>,
    matches: Vec<Match>,
    tournaments: Vec<Tournament>,
    next_id: u64,
    failing_matches: Vec<String>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later write to `match_id` fail as if the backend were down.
    pub fn fail_match_writes(&self, match_id: &str) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.failing_matches.push(match_id.to_owned());
        }
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

impl TournamentStore for MemoryStore {
    async fn list_entrants(&self) -> StoreResult<Vec<Entrant>> {
        Ok(self.tables()?.entrants.clone())
    }

    async fn get_entrant(&self, id: &str) -> StoreResult<Entrant> {
        self.tables()?
            .entrants
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("entrant {id}")))
    }

    async fn create_entrant(&self, mut entrant: Entrant) -> StoreResult<Entrant> {
        let mut tables = self.tables()?;
        if tables
            .entrants
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(&entrant.name))
        {
            return Err(StoreError::Conflict(format!("entrant {} already registered", entrant.name)));
        }
        entrant.id = tables.next_id("e");
        tables.entrants.push(entrant.clone());
        Ok(entrant)
    }

    async fn update_entrant(&self, entrant: Entrant) -> StoreResult<Entrant> {
        let mut tables = self.tables()?;
        let slot = tables
            .entrants
            .iter_mut()
            .find(|e| e.id == entrant.id)
            .ok_or_else(|| StoreError::NotFound(format!("entrant {}", entrant.id)))?;
        *slot = entrant.clone();
        Ok(entrant)
    }

    async fn delete_entrant(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let before = tables.entrants.len();
        tables.entrants.retain(|e| e.id != id);
        if tables.entrants.len() == before {
            return Err(StoreError::NotFound(format!("entrant {id}")));
        }
        Ok(())
    }

    async fn create_match(&self, m: Match) -> StoreResult<Match> {
        let mut tables = self.tables()?;
        if tables.matches.iter().any(|existing| existing.id == m.id) {
            return Err(StoreError::Conflict(format!("match {} already exists", m.id)));
        }
        tables.matches.push(m.clone());
        Ok(m)
    }

    async fn get_match(&self, id: &str) -> StoreResult<Match> {
        self.tables()?
            .matches
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match {id}")))
    }

    async fn update_match(&self, m: Match) -> StoreResult<Match> {
        let mut tables = self.tables()?;
        if tables.failing_matches.contains(&m.id) {
            return Err(StoreError::Unavailable(format!("write to match {} failed", m.id)));
        }
        let slot = tables
            .matches
            .iter_mut()
            .find(|existing| existing.id == m.id)
            .ok_or_else(|| StoreError::NotFound(format!("match {}", m.id)))?;
        *slot = m.clone();
        Ok(m)
    }

    async fn list_matches(&self, filter: &MatchFilter) -> StoreResult<Vec<Match>> {
        let mut matches: Vec<Match> = self
            .tables()?
            .matches
            .iter()
            .filter(|m| filter.accepts(m))
            .cloned()
            .collect();
        matches.sort_by_key(|m| (m.stage, m.slot));
        Ok(matches)
    }

    async fn create_tournament(&self, mut t: Tournament) -> StoreResult<Tournament> {
        let mut tables = self.tables()?;
        t.id = tables.next_id("t");
        tables.tournaments.push(t.clone());
        Ok(t)
    }

    async fn get_tournament(&self, id: &str) -> StoreResult<Tournament> {
        self.tables()?
            .tournaments
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tournament {id}")))
    }

    async fn update_tournament(&self, t: Tournament) -> StoreResult<Tournament> {
        let mut tables = self.tables()?;
        let slot = tables
            .tournaments
            .iter_mut()
            .find(|existing| existing.id == t.id)
            .ok_or_else(|| StoreError::NotFound(format!("tournament {}", t.id)))?;
        *slot = t.clone();
        Ok(t)
    }

    async fn active_tournament(&self) -> StoreResult<Option<Tournament>> {
        Ok(self
            .tables()?
            .tournaments
            .iter()
            .rev()
            .find(|t| t.status == TournamentStatus::Active)
            .cloned())
    }
}
