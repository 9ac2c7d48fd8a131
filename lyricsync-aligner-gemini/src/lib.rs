use async_trait::async_trait;
use lyricsync_core::{
    parse_alignment_json, AlignedLine, AlignmentRequest, CoreError, GeminiConfig, LyricsAligner,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "lyricsync::aligner::gemini";
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Connect timeout for HTTP requests
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest error body echoed back in error messages
const MAX_ERROR_BODY_CHARS: usize = 300;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
    response_schema: Value,
}

/// Response from the `generateContent` endpoint.
/// Fields we don't use are ignored by serde.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Schema the model must follow: one object per lyric line
fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "time": { "type": "STRING", "description": "Start time as [mm:ss.xx]" },
                "text": { "type": "STRING", "description": "The lyric line, verbatim" },
                "confidence": { "type": "NUMBER", "description": "Confidence from 0 to 1" }
            },
            "required": ["time", "text", "confidence"],
            "propertyOrdering": ["time", "text", "confidence"]
        }
    })
}

/// Instructions plus the numbered lyric lines
fn build_prompt(request: &AlignmentRequest) -> String {
    let mut prompt = String::from(
        "You are aligning song lyrics to the attached audio recording.\n\
         For every lyric line below, estimate the moment the singer starts it.\n\
         Return exactly one entry per line, in the same order, with the text copied verbatim.\n\
         Never skip a line: if you are unsure, give your best guess and a low confidence.\n\
         Times use the format [mm:ss.xx]. Confidence is a number between 0 and 1.\n\nLyrics:\n",
    );
    for (i, line) in request.lyric_lines().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, line);
    }
    prompt
}

/// Gemini multimodal aligner
pub struct GeminiAligner {
    client: ClientWithMiddleware,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiAligner {
    /// Create an aligner from config, with retries on transient failures.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is available or the HTTP client cannot
    /// be created.
    pub fn new(config: &GeminiConfig) -> Result<Self, CoreError> {
        let api_key = config.resolved_api_key()?;

        let base_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("LyricSync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Wrap with retry middleware (exponential backoff)
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: GEMINI_API_URL.to_string(),
        })
    }

    /// Point the aligner at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_request(request: &AlignmentRequest) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: request.media_type.clone(),
                            data: request.audio_base64.clone(),
                        },
                    },
                    Part::Text {
                        text: build_prompt(request),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        }
    }

    /// Pull the JSON payload out of a response and validate it
    fn parse_response(&self, response: GenerateResponse) -> Result<Vec<AlignedLine>, CoreError> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CoreError::AlignerFailed {
                provider: self.name().to_string(),
                reason: format!("request blocked: {reason}"),
            });
        }

        let candidate = response
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .ok_or_else(|| CoreError::MalformedAlignment {
                reason: "response has no candidates".to_string(),
            })?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                warn!(target: LOG_TARGET, "Gemini finished with reason {}", reason);
            }
        }

        let text: String = candidate
            .content
            .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CoreError::MalformedAlignment {
                reason: "response has no text".to_string(),
            });
        }

        parse_alignment_json(&text)
    }
}

#[async_trait]
impl LyricsAligner for GeminiAligner {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn align(&self, request: &AlignmentRequest) -> Result<Vec<AlignedLine>, CoreError> {
        info!(
            target: LOG_TARGET,
            "Requesting alignment from {} ({}, {} base64 chars, {} lyric lines)",
            self.model,
            request.media_type,
            request.audio_base64.len(),
            request.lyric_lines().count()
        );

        let body = Self::build_request(request);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let snippet: String = error_text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(target: LOG_TARGET, "Gemini returned status {}: {}", status, snippet);
            return Err(CoreError::AlignerFailed {
                provider: self.name().to_string(),
                reason: format!("status {status}: {snippet}"),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        let lines = self.parse_response(parsed)?;
        debug!(target: LOG_TARGET, "Gemini returned {} aligned lines", lines.len());
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligner() -> GeminiAligner {
        GeminiAligner::new(&GeminiConfig {
            api_key: "test-key".to_string(),
            ..GeminiConfig::default()
        })
        .unwrap()
    }

    fn request() -> AlignmentRequest {
        AlignmentRequest {
            audio_base64: "AQID".to_string(),
            media_type: "audio/wav".to_string(),
            lyrics: "first line\n\nsecond line\n".to_string(),
        }
    }

    fn response(json: &str) -> GenerateResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_endpoint() {
        let aligner = aligner().with_base_url("http://localhost:9000/");
        assert_eq!(
            aligner.endpoint(),
            "http://localhost:9000/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(GeminiAligner::build_request(&request())).unwrap();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "audio/wav");
        assert_eq!(parts[0]["inlineData"]["data"], "AQID");
        let prompt = parts[1]["text"].as_str().unwrap();
        assert!(prompt.contains("1. first line\n2. second line\n"));

        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "ARRAY");
        assert_eq!(
            config["responseSchema"]["items"]["required"],
            json!(["time", "text", "confidence"])
        );
    }

    #[test]
    fn test_parse_response_success() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "[{\"time\":\"[00:05.00]\",\"text\":\"hello\",\"confidence\":0.9},"}, {"text": "{\"time\":\"[00:10.50]\",\"text\":\"world\",\"confidence\":0.4}]"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 12}
        }"#;
        let lines = aligner().parse_response(response(body)).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].time, "[00:05.00]");
        assert_eq!(lines[1].text, "world");
        assert!((lines[1].confidence - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_response_blocked() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = aligner().parse_response(response(body)).unwrap_err();
        assert!(matches!(err, CoreError::AlignerFailed { .. }));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let err = aligner().parse_response(response("{}")).unwrap_err();
        assert!(matches!(err, CoreError::MalformedAlignment { .. }));
    }

    #[test]
    fn test_parse_response_without_text() {
        let body = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        let err = aligner().parse_response(response(body)).unwrap_err();
        assert!(matches!(err, CoreError::MalformedAlignment { .. }));
    }

    #[test]
    fn test_parse_response_schema_mismatch() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "Sure! Here are your timings."}]}}]}"#;
        let err = aligner().parse_response(response(body)).unwrap_err();
        assert!(matches!(err, CoreError::MalformedAlignment { .. }));
    }

    #[test]
    fn test_missing_api_key() {
        // Only meaningful when the environment does not supply a key
        if std::env::var(lyricsync_core::GEMINI_API_KEY_ENV).is_ok() {
            return;
        }
        let result = GeminiAligner::new(&GeminiConfig::default());
        assert!(matches!(result, Err(CoreError::ConfigMissingField { .. })));
    }
}
