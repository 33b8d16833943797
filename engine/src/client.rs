use crate::commentary::{CommentaryError, CommentaryRequest, CommentaryResult, Commentator};
use crate::gemini::{GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use log::debug;
use reqwest::Client;
use std::time::Duration;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Commentary backed by the Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiCommentator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    generation: GenerationConfig,
}

impl GeminiCommentator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("knockout/0.1 (match commentary)")
                .build()
                .unwrap_or_default(),
            base_url: GEMINI_BASE.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// Send one prompt and return the generated text flattened to a single line.
    pub async fn generate(&self, prompt: &str) -> CommentaryResult<String> {
        let url = self.endpoint();
        let body = GenerateContentRequest::from_prompt(prompt, self.generation);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CommentaryError::Network(e, url.clone()))?;

        let raw: GenerateContentResponse = response
            .error_for_status()
            .map_err(|e| CommentaryError::Api(e, url.clone()))?
            .json()
            .await
            .map_err(|e| CommentaryError::Parsing(e, url.clone()))?;

        if let Some(reason) = raw.block_reason() {
            return Err(CommentaryError::Empty(format!("prompt blocked: {reason}")));
        }

        let text = raw
            .first_text()
            .ok_or_else(|| CommentaryError::Empty(format!("no candidates from {url}")))?;
        Ok(single_line(&text))
    }
}

impl Commentator for GeminiCommentator {
    async fn commentate(&self, request: CommentaryRequest) -> CommentaryResult<String> {
        debug!("requesting {} commentary at {}'", request.kind.as_str(), request.minute);
        self.generate(&request.prompt()).await
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Score;
    use crate::commentary::CommentaryKind;
    use mockito::Matcher;

    const PATH: &str = "/v1beta/models/test-model:generateContent";

    fn request() -> CommentaryRequest {
        CommentaryRequest {
            kind: CommentaryKind::Goal,
            home: "Egypt".into(),
            away: "Ghana".into(),
            score: Score::new(1, 0),
            minute: 12,
        }
    }

    fn commentator(server: &mockito::Server) -> GeminiCommentator {
        GeminiCommentator::new("secret")
            .with_model("test-model")
            .with_base_url(server.url())
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("  What a\n strike!\n"), "What a strike!");
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let c = GeminiCommentator::new("k")
            .with_model("m")
            .with_base_url("http://localhost:9/");
        assert_eq!(c.endpoint(), "http://localhost:9/v1beta/models/m:generateContent");
    }

    #[tokio::test]
    async fn returns_first_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "secret")
            .match_body(Matcher::Regex("Egypt 1 - 0 Ghana".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"  Top corner!\nUnstoppable."}]}}]}"#)
            .create_async()
            .await;

        let text = commentator(&server).commentate(request()).await.unwrap();
        assert_eq!(text, "Top corner! Unstoppable.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(503)
            .create_async()
            .await;

        let err = commentator(&server).commentate(request()).await.unwrap_err();
        assert!(matches!(err, CommentaryError::Api(_, _)), "got {err}");
    }

    #[tokio::test]
    async fn empty_candidates_map_to_empty_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let err = commentator(&server).commentate(request()).await.unwrap_err();
        assert!(matches!(err, CommentaryError::Empty(_)), "got {err}");
    }

    #[tokio::test]
    async fn blocked_prompt_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let err = commentator(&server).commentate(request()).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"), "got {err}");
    }
}
