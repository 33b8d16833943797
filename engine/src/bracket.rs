use crate::store::{MatchFilter, StoreError, TournamentStore};
use crate::{
    Bracket, Entrant, EntrantRef, Match, MatchStatus, Score, Side, Slot, Stage, Tournament,
    TournamentStatus, match_id, settle,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard};

pub const MIN_ENTRANTS: usize = 8;
pub const DEFAULT_TOURNAMENT_NAME: &str = "Knockout Cup";

pub type BracketResult<T> = Result<T, BracketError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketError {
    InsufficientEntrants { minimum: usize, actual: usize },
    MatchNotPlayable { match_id: String, reason: String },
    StageIncomplete { stage: Stage, outstanding: usize },
    NotFound(String),
    Store(StoreError),
}

impl BracketError {
    fn not_playable(match_id: &str, reason: impl Into<String>) -> Self {
        BracketError::MatchNotPlayable { match_id: match_id.to_owned(), reason: reason.into() }
    }

    fn poisoned(what: &str) -> Self {
        BracketError::Store(StoreError::Unavailable(format!("{what} poisoned")))
    }
}

impl fmt::Display for BracketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketError::InsufficientEntrants { minimum, actual } => {
                write!(f, "Need at least {minimum} entrants, have {actual}")
            }
            BracketError::MatchNotPlayable { match_id, reason } => {
                write!(f, "Match {match_id} cannot be played: {reason}")
            }
            BracketError::StageIncomplete { stage, outstanding } => {
                write!(f, "{} still has {outstanding} unfinished match(es)", stage.label())
            }
            BracketError::NotFound(what) => write!(f, "Not found: {what}"),
            BracketError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BracketError {}

impl From<StoreError> for BracketError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => BracketError::NotFound(what),
            other => BracketError::Store(other),
        }
    }
}

/// Matches somebody in this process is currently playing.
#[derive(Debug, Default)]
struct Claims {
    held: Mutex<HashSet<String>>,
    released: Notify,
}

impl Claims {
    fn holds(&self, match_id: &str) -> BracketResult<bool> {
        let held = self.held.lock().map_err(|_| BracketError::poisoned("claim table"))?;
        Ok(held.contains(match_id))
    }
}

/// The exclusive right to play one match, handed out by
/// [`BracketEngine::begin_match`]. Dropping it frees the match for the next
/// caller; the match itself stays `in_progress` until a result is recorded.
#[derive(Debug)]
pub struct MatchClaim {
    game: Match,
    claims: Arc<Claims>,
}

impl MatchClaim {
    pub fn game(&self) -> &Match {
        &self.game
    }
}

impl Drop for MatchClaim {
    fn drop(&mut self) {
        if let Ok(mut held) = self.claims.held.lock() {
            held.remove(&self.game.id);
        }
        self.claims.released.notify_waiters();
    }
}

pub struct BracketEngine<S> {
    store: S,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    claims: Arc<Claims>,
}

impl<S: TournamentStore> BracketEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            claims: Arc::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn lock(&self, tournament_id: &str) -> BracketResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| BracketError::poisoned("lock table"))?;
            locks.entry(tournament_id.to_owned()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Finished tournaments take no more mutations worth serializing.
    fn forget_lock(&self, tournament_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(tournament_id);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn bracket(&self, tournament_id: &str) -> BracketResult<Bracket> {
        let tournament = self.store.get_tournament(tournament_id).await?;
        let matches = self
            .store
            .list_matches(&MatchFilter::tournament(tournament_id))
            .await?;
        Ok(Bracket::new(tournament, matches))
    }

    pub async fn active_bracket(&self) -> BracketResult<Option<Bracket>> {
        match self.store.active_tournament().await? {
            Some(t) => Ok(Some(self.bracket(&t.id).await?)),
            None => Ok(None),
        }
    }

    /// Resolved matches of `stage` that have not been completed yet.
    pub async fn pending_matches(&self, tournament_id: &str, stage: Stage) -> BracketResult<Vec<Match>> {
        let filter = MatchFilter::tournament(tournament_id)
            .stage(stage)
            .status(MatchStatus::Pending)
            .status(MatchStatus::InProgress);
        let matches = self.store.list_matches(&filter).await?;
        Ok(matches.into_iter().filter(Match::is_resolved).collect())
    }

    pub async fn resolve(&self, entrant: &EntrantRef) -> BracketResult<Entrant> {
        match entrant {
            EntrantRef::ById { id } => Ok(self.store.get_entrant(id).await?),
            EntrantRef::ByName(_) => self
                .store
                .list_entrants()
                .await?
                .into_iter()
                .find(|e| entrant.matches(e))
                .ok_or_else(|| BracketError::NotFound(format!("entrant {entrant}"))),
        }
    }

    /// Both entrants of a match; fails while either side is still a `WinnerOf`.
    pub async fn fixture(&self, m: &Match) -> BracketResult<(Entrant, Entrant)> {
        let (Slot::Entrant(home), Slot::Entrant(away)) = (&m.home, &m.away) else {
            return Err(BracketError::not_playable(&m.id, "a side is still undecided"));
        };
        Ok((self.resolve(home).await?, self.resolve(away).await?))
    }

    /// Wait until no match of `stage` is claimed by another caller.
    pub async fn wait_for_stage(&self, tournament_id: &str, stage: Stage) -> BracketResult<()> {
        let ids: Vec<String> = (0..stage.match_count())
            .map(|slot| match_id(tournament_id, stage, slot))
            .collect();
        loop {
            let released = self.claims.released.notified();
            let mut claimed = false;
            for id in &ids {
                claimed |= self.claims.holds(id)?;
            }
            if !claimed {
                return Ok(());
            }
            released.await;
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub async fn register(&self, entrant: Entrant) -> BracketResult<Entrant> {
        Ok(self.store.create_entrant(entrant).await?)
    }

    pub async fn seed(&self, entrants: &[Entrant]) -> BracketResult<Bracket> {
        self.seed_named(DEFAULT_TOURNAMENT_NAME, entrants).await
    }

    /// Create a tournament from the first eight distinct registered
    /// entrants, paired in order.
    pub async fn seed_named(&self, name: &str, entrants: &[Entrant]) -> BracketResult<Bracket> {
        let mut field: Vec<Entrant> = Vec::with_capacity(MIN_ENTRANTS);
        for entrant in entrants {
            let known = self.registered(entrant).await?;
            if !field.iter().any(|e| e.id == known.id) {
                field.push(known);
            }
        }
        if field.len() < MIN_ENTRANTS {
            return Err(BracketError::InsufficientEntrants {
                minimum: MIN_ENTRANTS,
                actual: field.len(),
            });
        }

        let mut tournament = self.store.create_tournament(Tournament::new(name)).await?;
        let tid = tournament.id.clone();

        let mut matches = Vec::with_capacity(7);
        for (slot, pair) in field[..MIN_ENTRANTS].chunks(2).enumerate() {
            matches.push(Match::new(
                &tid,
                Stage::QuarterFinals,
                slot,
                Slot::Entrant(pair[0].reference()),
                Slot::Entrant(pair[1].reference()),
            ));
        }
        for stage in [Stage::SemiFinals, Stage::Final] {
            let Some(feeder) = stage.prev() else { continue };
            for slot in 0..stage.match_count() {
                matches.push(Match::new(
                    &tid,
                    stage,
                    slot,
                    Slot::WinnerOf(match_id(&tid, feeder, 2 * slot)),
                    Slot::WinnerOf(match_id(&tid, feeder, 2 * slot + 1)),
                ));
            }
        }
        for m in &matches {
            self.store.create_match(m.clone()).await?;
        }

        tournament.stage = Stage::QuarterFinals;
        tournament.status = TournamentStatus::Active;
        let tournament = self.store.update_tournament(tournament).await?;
        info!("seeded {} ({}) with {} matches", tournament.name, tid, matches.len());

        Ok(Bracket::new(tournament, matches))
    }

    /// The stored entrant behind a seeding candidate, by id or else by name.
    async fn registered(&self, entrant: &Entrant) -> BracketResult<Entrant> {
        let reference = if entrant.id.is_empty() {
            EntrantRef::ByName(entrant.name.clone())
        } else {
            entrant.reference()
        };
        self.resolve(&reference)
            .await
            .map_err(|_| BracketError::NotFound(format!("entrant {} is not registered", entrant.name)))
    }

    /// Claim a match and mark it started. An `in_progress` match nobody holds
    /// (left over from an interrupted run) can be claimed again.
    pub async fn begin_match(&self, match_id: &str) -> BracketResult<MatchClaim> {
        let tournament_id = self.store.get_match(match_id).await?.tournament_id;
        let _guard = self.lock(&tournament_id).await?;

        let m = self.store.get_match(match_id).await?;
        self.ensure_playable(&m)?;
        let mut claim = self.claim(m)?;
        if claim.game.status != MatchStatus::InProgress {
            let mut started = claim.game.clone();
            started.status = MatchStatus::InProgress;
            claim.game = self.store.update_match(started).await?;
        }
        Ok(claim)
    }

    fn claim(&self, m: Match) -> BracketResult<MatchClaim> {
        let mut held = self.claims.held.lock().map_err(|_| BracketError::poisoned("claim table"))?;
        if !held.insert(m.id.clone()) {
            return Err(BracketError::not_playable(&m.id, "already being played"));
        }
        Ok(MatchClaim { game: m, claims: Arc::clone(&self.claims) })
    }

    pub async fn record_result(&self, match_id: &str, home: u16, away: u16) -> BracketResult<Match> {
        self.record_result_with_log(match_id, Score::new(home, away), Vec::new())
            .await
    }

    /// Complete a match nobody is playing. Level scores are settled by the
    /// tie-break rule.
    pub async fn record_result_with_log(
        &self,
        match_id: &str,
        score: Score,
        commentary: Vec<String>,
    ) -> BracketResult<Match> {
        self.complete(match_id, score, commentary, None).await
    }

    /// Complete the match behind `claim` and release it.
    pub async fn record_claimed(
        &self,
        claim: MatchClaim,
        score: Score,
        commentary: Vec<String>,
    ) -> BracketResult<Match> {
        self.complete(&claim.game.id, score, commentary, Some(&claim)).await
    }

    async fn complete(
        &self,
        match_id: &str,
        score: Score,
        commentary: Vec<String>,
        holder: Option<&MatchClaim>,
    ) -> BracketResult<Match> {
        let tournament_id = self.store.get_match(match_id).await?.tournament_id;
        let _guard = self.lock(&tournament_id).await?;

        let mut m = self.store.get_match(match_id).await?;
        self.ensure_playable(&m)?;
        if holder.is_none() && self.claims.holds(match_id)? {
            return Err(BracketError::not_playable(match_id, "already being played"));
        }
        let (home, away) = self.fixture(&m).await?;
        let settlement = settle(score, &home, &away)
            .ok_or_else(|| BracketError::not_playable(match_id, format!("score {score} is out of range")))?;
        let winner = match settlement.winner {
            Side::Home => home,
            Side::Away => away,
        };

        m.score = Some(settlement.score);
        m.winner = Some(winner.id.clone());
        m.status = MatchStatus::Completed;
        m.completed_at = Some(Utc::now());
        if !commentary.is_empty() {
            m.commentary = commentary;
        }
        let m = self.store.update_match(m).await?;
        debug!("{} finished {}, {} through", m.id, settlement.score, winner.name);
        Ok(m)
    }

    /// Close the current stage: eliminate its losers and fill the next stage,
    /// or crown the champion after the final.
    pub async fn advance_stage(&self, tournament_id: &str) -> BracketResult<Bracket> {
        self.advance(tournament_id, None).await
    }

    /// Like [`advance_stage`](Self::advance_stage), but a no-op once the
    /// tournament has already moved past `stage`.
    pub async fn advance_past(&self, tournament_id: &str, stage: Stage) -> BracketResult<Bracket> {
        self.advance(tournament_id, Some(stage)).await
    }

    async fn advance(&self, tournament_id: &str, past: Option<Stage>) -> BracketResult<Bracket> {
        let _guard = self.lock(tournament_id).await?;
        let bracket = self.bracket(tournament_id).await?;
        if bracket.is_completed() {
            return Ok(bracket);
        }

        let stage = bracket.tournament.stage;
        if past.is_some_and(|past| stage > past) {
            return Ok(bracket);
        }
        let outstanding = bracket.stage_matches(stage).filter(|m| !m.is_completed()).count();
        if outstanding > 0 {
            if already_advanced(&bracket, stage) {
                return Ok(bracket);
            }
            return Err(BracketError::StageIncomplete { stage, outstanding });
        }

        for m in bracket.stage_matches(stage) {
            self.eliminate_loser(m).await?;
        }

        let mut tournament = bracket.tournament.clone();
        match stage.next() {
            Some(next) => {
                for m in bracket.stage_matches(next) {
                    let mut m = m.clone();
                    m.home = resolve_slot(&bracket, &m.home)?;
                    m.away = resolve_slot(&bracket, &m.away)?;
                    self.store.update_match(m).await?;
                }
                tournament.stage = next;
                info!("{tournament_id}: {} complete, on to the {}", stage.label(), next.label());
            }
            None => {
                let champion = bracket
                    .stage_matches(stage)
                    .find_map(|m| m.winner.clone())
                    .ok_or_else(|| BracketError::NotFound(format!("winner of the {tournament_id} final")))?;
                info!("{tournament_id}: champion {champion}");
                tournament.status = TournamentStatus::Completed;
                tournament.champion = Some(champion);
                tournament.completed_at = Some(Utc::now());
            }
        }
        let tournament = self.store.update_tournament(tournament).await?;
        if tournament.status == TournamentStatus::Completed {
            self.forget_lock(tournament_id);
        }

        self.bracket(tournament_id).await
    }

    /// Close an unfinished tournament without a champion. Matches left
    /// `in_progress` go back to `pending`.
    pub async fn abandon(&self, tournament_id: &str) -> BracketResult<Bracket> {
        let guard = self.lock(tournament_id).await?;
        let bracket = self.bracket(tournament_id).await?;
        if bracket.is_completed() {
            return Ok(bracket);
        }

        for m in bracket.matches.iter().filter(|m| m.status == MatchStatus::InProgress) {
            let mut m = m.clone();
            m.status = MatchStatus::Pending;
            self.store.update_match(m).await?;
        }
        let mut tournament = bracket.tournament;
        warn!("{tournament_id}: abandoned in the {}", tournament.stage.label());
        tournament.status = TournamentStatus::Completed;
        tournament.completed_at = Some(Utc::now());
        self.store.update_tournament(tournament).await?;
        drop(guard);
        self.forget_lock(tournament_id);

        self.bracket(tournament_id).await
    }

    fn ensure_playable(&self, m: &Match) -> BracketResult<()> {
        if m.is_completed() {
            return Err(BracketError::not_playable(&m.id, "already completed"));
        }
        if !m.is_resolved() {
            return Err(BracketError::not_playable(&m.id, "a side is still undecided"));
        }
        Ok(())
    }

    async fn eliminate_loser(&self, m: &Match) -> BracketResult<()> {
        let (home, away) = self.fixture(m).await?;
        let mut loser = if m.winner.as_deref() == Some(home.id.as_str()) { away } else { home };
        if !loser.eliminated {
            loser.eliminated = true;
            self.store.update_entrant(loser).await?;
        }
        Ok(())
    }
}

/// A previous advance already filled `stage` and none of its matches has
/// finished since.
fn already_advanced(bracket: &Bracket, stage: Stage) -> bool {
    stage.prev().is_some_and(|prev| bracket.is_stage_complete(prev))
        && bracket.stage_matches(stage).all(|m| !m.is_completed())
}

fn resolve_slot(bracket: &Bracket, slot: &Slot) -> BracketResult<Slot> {
    match slot {
        Slot::Entrant(_) => Ok(slot.clone()),
        Slot::WinnerOf(feeder) => bracket
            .find_match(feeder)
            .and_then(|m| m.winner.clone())
            .map(|id| Slot::Entrant(EntrantRef::ById { id }))
            .ok_or_else(|| BracketError::NotFound(format!("winner of {feeder}"))),
    }
}
