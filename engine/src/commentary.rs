use crate::Score;
use crate::client::GeminiCommentator;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub type CommentaryResult<T> = Result<T, CommentaryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentaryKind {
    Kickoff,
    Goal,
    Event,
    Halftime,
    Fulltime,
}

impl CommentaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentaryKind::Kickoff => "kickoff",
            CommentaryKind::Goal => "goal",
            CommentaryKind::Event => "event",
            CommentaryKind::Halftime => "halftime",
            CommentaryKind::Fulltime => "fulltime",
        }
    }
}

/// Everything a commentator gets to see about the match at the moment of the call.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentaryRequest {
    pub kind: CommentaryKind,
    pub home: String,
    pub away: String,
    pub score: Score,
    pub minute: u8,
}

impl CommentaryRequest {
    /// "Egypt 1 - 0 Ghana"
    pub fn scoreline(&self) -> String {
        format!("{} {} - {} {}", self.home, self.score.home, self.score.away, self.away)
    }

    /// Prompt text for a text-generation backend.
    pub fn prompt(&self) -> String {
        let score = self.scoreline();
        let (home, away, minute) = (&self.home, &self.away, self.minute);
        match self.kind {
            CommentaryKind::Kickoff => format!(
                "Write a short, lively opening line of football commentary for {home} against {away}. \
                 The stadium is buzzing. Keep it under 30 words."
            ),
            CommentaryKind::Goal => format!(
                "Write one dramatic line of football commentary describing a goal. \
                 The score is now {score} after {minute} minutes. Keep it under 30 words."
            ),
            CommentaryKind::Event => format!(
                "Write one short line of football commentary for {home} against {away}, \
                 {score} after {minute} minutes. Mention a near miss, a save, a piece of skill \
                 or the rising tension. Keep it under 25 words."
            ),
            CommentaryKind::Halftime => format!(
                "Write a brief half-time summary with the score at {score}. Say which side has \
                 the momentum and what the other must change after the break."
            ),
            CommentaryKind::Fulltime => format!(
                "Write a closing line of commentary for a knockout football match that finished \
                 {score}. Sum up the result and the key moments."
            ),
        }
    }
}

#[derive(Debug)]
pub enum CommentaryError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    Empty(String),
    Timeout(Duration),
    Other(String),
}

impl fmt::Display for CommentaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentaryError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            CommentaryError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            CommentaryError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            CommentaryError::Empty(msg) => write!(f, "Empty commentary: {msg}"),
            CommentaryError::Timeout(limit) => {
                write!(f, "Commentary timed out after {}ms", limit.as_millis())
            }
            CommentaryError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for CommentaryError {}

/// Text-generation capability consulted by the minute clock.
///
/// Calls may be slow and may fail; the clock treats any error as a
/// commentator outage and carries on with the match.
pub trait Commentator: Send + Sync {
    fn commentate(
        &self,
        request: CommentaryRequest,
    ) -> impl Future<Output = CommentaryResult<String>> + Send;
}

// ---------------------------------------------------------------------------
// Offline commentator
// ---------------------------------------------------------------------------

/// Canned lines used when no text-generation backend is configured.
#[derive(Debug, Default)]
pub struct CannedCommentator {
    turn: AtomicUsize,
}

impl CannedCommentator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&self, request: &CommentaryRequest) -> String {
        let turn = self.turn.fetch_add(1, Ordering::Relaxed);
        let score = request.scoreline();
        let (home, away, minute) = (&request.home, &request.away, request.minute);
        match request.kind {
            CommentaryKind::Kickoff => match turn % 2 {
                0 => format!("{home} and {away} get us underway in front of a full house."),
                _ => format!("The whistle goes and {home} take on {away}. Knockout football, no second chances."),
            },
            CommentaryKind::Goal => match turn % 3 {
                0 => format!("Into the bottom corner! {score} on {minute} minutes."),
                1 => format!("What a finish! It's {score} and the stadium erupts."),
                _ => format!("The keeper had no chance. {score}."),
            },
            CommentaryKind::Event => match turn % 4 {
                0 => format!("Off the post! {away} survive a scare on {minute} minutes."),
                1 => format!("Superb save to keep it {score}."),
                2 => format!("{home} knock it about patiently, probing for an opening."),
                _ => format!("A crunching tackle in midfield and tempers are rising, {minute} minutes gone."),
            },
            CommentaryKind::Halftime => format!("Half-time, {score}. Plenty for both managers to think about."),
            CommentaryKind::Fulltime => format!("It's all over: {score}."),
        }
    }
}

impl Commentator for CannedCommentator {
    async fn commentate(&self, request: CommentaryRequest) -> CommentaryResult<String> {
        Ok(self.line(&request))
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Puts an upper bound on how long one commentary call may take.
#[derive(Debug)]
pub struct Timed<C> {
    inner: C,
    limit: Duration,
}

impl<C> Timed<C> {
    pub fn new(inner: C, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Commentator> Commentator for Timed<C> {
    async fn commentate(&self, request: CommentaryRequest) -> CommentaryResult<String> {
        match tokio::time::timeout(self.limit, self.inner.commentate(request)).await {
            Ok(result) => result,
            Err(_) => Err(CommentaryError::Timeout(self.limit)),
        }
    }
}

/// Commentator chosen at startup from configuration.
#[derive(Debug)]
pub enum CommentarySource {
    Gemini(GeminiCommentator),
    Canned(CannedCommentator),
}

impl CommentarySource {
    pub fn name(&self) -> &'static str {
        match self {
            CommentarySource::Gemini(_) => "gemini",
            CommentarySource::Canned(_) => "canned",
        }
    }
}

impl Commentator for CommentarySource {
    async fn commentate(&self, request: CommentaryRequest) -> CommentaryResult<String> {
        match self {
            CommentarySource::Gemini(c) => c.commentate(request).await,
            CommentarySource::Canned(c) => c.commentate(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_source_reports_its_name() {
        let timed = Timed::new(CommentarySource::Canned(CannedCommentator::new()), Duration::from_secs(1));
        assert_eq!(timed.inner().name(), "canned");
    }

    fn request(kind: CommentaryKind) -> CommentaryRequest {
        CommentaryRequest {
            kind,
            home: "Egypt".into(),
            away: "Ghana".into(),
            score: Score::new(2, 1),
            minute: 63,
        }
    }

    struct Stalled;

    impl Commentator for Stalled {
        async fn commentate(&self, _request: CommentaryRequest) -> CommentaryResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    #[test]
    fn scoreline_reads_home_first() {
        assert_eq!(request(CommentaryKind::Goal).scoreline(), "Egypt 2 - 1 Ghana");
    }

    #[test]
    fn goal_prompt_carries_score_and_minute() {
        let prompt = request(CommentaryKind::Goal).prompt();
        assert!(prompt.contains("Egypt 2 - 1 Ghana"), "prompt: {prompt}");
        assert!(prompt.contains("63 minutes"), "prompt: {prompt}");
    }

    #[test]
    fn kickoff_prompt_names_both_teams() {
        let prompt = request(CommentaryKind::Kickoff).prompt();
        assert!(prompt.contains("Egypt") && prompt.contains("Ghana"));
    }

    #[test]
    fn canned_lines_rotate() {
        let canned = CannedCommentator::new();
        let first = canned.line(&request(CommentaryKind::Event));
        let second = canned.line(&request(CommentaryKind::Event));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn canned_commentator_never_fails() {
        let canned = CannedCommentator::new();
        let text = canned.commentate(request(CommentaryKind::Fulltime)).await.unwrap();
        assert_eq!(text, "It's all over: Egypt 2 - 1 Ghana.");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_turns_a_stall_into_a_timeout() {
        let timed = Timed::new(Stalled, Duration::from_secs(10));
        let err = timed.commentate(request(CommentaryKind::Event)).await.unwrap_err();
        assert!(matches!(err, CommentaryError::Timeout(d) if d == Duration::from_secs(10)));
    }
}
