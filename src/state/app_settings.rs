use anyhow::Context;
use knockout_engine::Entrant;
use knockout_engine::client::{DEFAULT_MODEL, GeminiCommentator};
use knockout_engine::clock::Pace;
use knockout_engine::commentary::{CannedCommentator, CommentarySource, Timed};
use log::LevelFilter;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ENTRANTS: &str = include_str!("../../data/default_entrants.json");

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub full_screen: bool,
    pub log_level: Option<LevelFilter>,
    pub entrants_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub commentary_model: String,
    pub commentary_url: Option<String>,
    pub commentary_timeout: Duration,
    /// Real-time length of one simulated minute for friendlies.
    pub minute: Duration,
    pub halftime: Duration,
    /// Minute length when playing through a whole tournament.
    pub bulk_minute: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            full_screen: false,
            log_level: Some(LevelFilter::Info),
            entrants_path: None,
            api_key: None,
            commentary_model: DEFAULT_MODEL.to_owned(),
            commentary_url: None,
            commentary_timeout: Duration::from_secs(10),
            minute: Duration::from_millis(1000),
            halftime: Duration::from_secs(5),
            bulk_minute: Duration::from_millis(40),
        }
    }
}

impl AppSettings {
    /// Settings from the process environment, after `.env.local` and `.env`.
    pub fn load() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let millis = |key: &str, fallback: Duration| {
            var(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };
        let secs = |key: &str, fallback: Duration| {
            var(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            full_screen: false,
            log_level: var("KNOCKOUT_LOG_LEVEL")
                .and_then(|v| v.parse::<LevelFilter>().ok())
                .or(defaults.log_level),
            entrants_path: var("KNOCKOUT_ENTRANTS_JSON").map(PathBuf::from),
            api_key: var("GEMINI_API_KEY"),
            commentary_model: var("KNOCKOUT_COMMENTARY_MODEL").unwrap_or(defaults.commentary_model),
            commentary_url: var("KNOCKOUT_COMMENTARY_URL"),
            commentary_timeout: secs("KNOCKOUT_COMMENTARY_TIMEOUT_SECS", defaults.commentary_timeout),
            minute: millis("KNOCKOUT_MINUTE_MS", defaults.minute),
            halftime: secs("KNOCKOUT_HALFTIME_SECS", defaults.halftime),
            bulk_minute: millis("KNOCKOUT_BULK_MINUTE_MS", defaults.bulk_minute),
        }
    }

    pub fn friendly_pace(&self) -> Pace {
        Pace { minute: self.minute, halftime: self.halftime }
    }

    pub fn tournament_pace(&self) -> Pace {
        Pace::bulk(self.bulk_minute)
    }

    /// Gemini when an API key is configured, canned lines otherwise.
    pub fn commentator(&self) -> Timed<CommentarySource> {
        let source = match &self.api_key {
            Some(key) => {
                let mut gemini = GeminiCommentator::new(key.clone())
                    .with_model(self.commentary_model.clone())
                    .with_timeout(self.commentary_timeout);
                if let Some(url) = &self.commentary_url {
                    gemini = gemini.with_base_url(url.clone());
                }
                CommentarySource::Gemini(gemini)
            }
            None => CommentarySource::Canned(CannedCommentator::new()),
        };
        // Slack on top of the HTTP timeout covers connection setup.
        Timed::new(source, self.commentary_timeout + Duration::from_secs(2))
    }

    pub fn load_entrants(&self) -> anyhow::Result<Vec<Entrant>> {
        match &self.entrants_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading entrants from {}", path.display()))?;
                parse_entrants(&raw).with_context(|| format!("parsing {}", path.display()))
            }
            None => parse_entrants(DEFAULT_ENTRANTS).context("parsing built-in entrants"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntrantsFile {
    List(Vec<Entrant>),
    Wrapped { entrants: Vec<Entrant> },
}

fn parse_entrants(raw: &str) -> anyhow::Result<Vec<Entrant>> {
    let entrants = match serde_json::from_str::<EntrantsFile>(raw)? {
        EntrantsFile::List(list) | EntrantsFile::Wrapped { entrants: list } => list,
    };
    Ok(entrants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> AppSettings {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppSettings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(settings(&[]), AppSettings::default());
    }

    #[test]
    fn pacing_and_level_are_read() {
        let s = settings(&[
            ("KNOCKOUT_MINUTE_MS", "250"),
            ("KNOCKOUT_HALFTIME_SECS", "0"),
            ("KNOCKOUT_BULK_MINUTE_MS", "0"),
            ("KNOCKOUT_LOG_LEVEL", "debug"),
        ]);
        assert_eq!(s.friendly_pace().minute, Duration::from_millis(250));
        assert_eq!(s.friendly_pace().halftime, Duration::ZERO);
        assert_eq!(s.tournament_pace(), Pace::INSTANT);
        assert_eq!(s.log_level, Some(LevelFilter::Debug));
    }

    #[test]
    fn garbage_values_fall_back() {
        let s = settings(&[("KNOCKOUT_MINUTE_MS", "fast"), ("KNOCKOUT_LOG_LEVEL", "loud")]);
        assert_eq!(s.minute, Duration::from_millis(1000));
        assert_eq!(s.log_level, Some(LevelFilter::Info));
    }

    #[test]
    fn blank_api_key_means_canned_commentary() {
        let s = settings(&[("GEMINI_API_KEY", "   ")]);
        assert_eq!(s.api_key, None);
    }

    #[test]
    fn built_in_entrants_fill_a_bracket() {
        let entrants = AppSettings::default().load_entrants().unwrap();
        assert_eq!(entrants.len(), 8);
        assert!(entrants.iter().all(|e| e.rating > 0 && !e.name.is_empty()));
    }

    #[test]
    fn wrapped_entrant_files_are_accepted() {
        let raw = r#"{"entrants":[{"name":"Mali"},{"name":"Zambia","country":"ZM","rating":1500}]}"#;
        let entrants = parse_entrants(raw).unwrap();
        assert_eq!(entrants.len(), 2);
        assert_eq!(entrants[0].name, "Mali");
    }
}
