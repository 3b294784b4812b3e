use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::capability::{GenerationCapability, GenerationRequest, ProgressReporter};
use crate::config::GeminiConfig;
use crate::error::ProviderError;
use crate::form::FileHandle;
use crate::results::GenerationResult;
use crate::schema::ServiceKind;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("Other: {0}")]
    Other(String),
}

impl From<GeminiError> for ProviderError {
    fn from(err: GeminiError) -> Self {
        ProviderError::new(err.to_string())
    }
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" || key == "bytesBase64Encoded" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn preview(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut value) => {
            truncate_base64_in_json(&mut value);
            value.to_string()
        }
        Err(_) if body.len() > 300 => format!("{}...", body.chars().take(300).collect::<String>()),
        Err(_) => body.to_string(),
    }
}

fn data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Image and video generation against the Gemini API. With the demo key, images are SVG placeholders.
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self { client: Client::new(), config }
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<String, GeminiError> {
        info!("🔗 Making request to: {}", url);

        let response = self
            .client
            .post(url)
            .query(&[("key", &self.config.api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        read_body(response).await
    }

    async fn get_json(&self, url: &str) -> Result<String, GeminiError> {
        let response = self
            .client
            .get(url)
            .query(&[("key", &self.config.api_key)])
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        read_body(response).await
    }

    pub async fn generate_images(
        &self,
        prompt: &str,
        file_input: Option<&FileHandle>,
    ) -> Result<Vec<GenerationResult>, GeminiError> {
        if self.config.is_demo() {
            info!("Using demo mode - no real images generated");
            return Ok(vec![GenerationResult::image(data_url("image/svg+xml", &placeholder_svg(prompt)))]);
        }

        let mut parts = Vec::new();
        if let Some(file) = file_input {
            parts.push(json!({
                "inlineData": {
                    "mimeType": file.mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(&file.bytes),
                }
            }));
        }
        parts.push(json!({ "text": prompt }));

        let request_body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            }
        });

        let url = format!("{}/models/{}:generateContent", self.config.base_url, self.config.image_model);
        let response_text = self.post_json(&url, &request_body).await?;
        info!("📥 Raw Gemini API response: {}", preview(&response_text));

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;

        if let Some(reason) = parsed.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
            warn!("🚫 Prompt blocked: {}", reason);
            return Err(GeminiError::Rejected(format!("The request was blocked by the provider ({reason}).")));
        }

        let images: Vec<GenerationResult> = extract_images(&parsed)
            .map(|inline| GenerationResult::image(data_url(&inline.mime_type, &inline.data)))
            .collect();
        if images.is_empty() {
            let text = extract_text(&parsed);
            info!("⚠️ No image data found in API response");
            return Err(GeminiError::Rejected(match text {
                Some(text) => format!("No image was generated: {}", text),
                None => "No image was generated.".to_string(),
            }));
        }

        info!("🖼️ Extracted {} image(s) from API response", images.len());
        Ok(images)
    }

    pub async fn generate_video(
        &self,
        prompt: &str,
        file_input: Option<&FileHandle>,
        progress: &ProgressReporter,
    ) -> Result<Vec<GenerationResult>, GeminiError> {
        progress.report("Starting video generation...");
        if self.config.is_demo() {
            info!("Using demo mode - video generation unavailable");
            return Err(GeminiError::Rejected(
                "Video generation is unavailable in demo mode; set GEMINI_API_KEY.".to_string(),
            ));
        }

        let mut instance = json!({ "prompt": prompt });
        if let Some(file) = file_input {
            instance["image"] = json!({
                "bytesBase64Encoded": base64::engine::general_purpose::STANDARD.encode(&file.bytes),
                "mimeType": file.mime_type,
            });
        }
        let request_body = json!({
            "instances": [instance],
            "parameters": { "aspectRatio": "16:9", "sampleCount": 1 }
        });

        let url = format!("{}/models/{}:predictLongRunning", self.config.base_url, self.config.video_model);
        let started: Operation = serde_json::from_str(&self.post_json(&url, &request_body).await?)
            .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;
        info!("🎬 Video operation started: {}", started.name);
        progress.report("Video generation started, this can take a few minutes...");

        let mut operation = started;
        let mut polls = 0;
        while !operation.done {
            if polls >= self.config.max_polls {
                error!("⌛ Video operation {} still running after {} polls", operation.name, polls);
                return Err(GeminiError::Rejected("Video generation timed out.".to_string()));
            }
            tokio::time::sleep(self.config.poll_interval).await;
            polls += 1;
            progress.report(format!("Checking video generation status ({})...", polls));

            let url = format!("{}/{}", self.config.base_url, operation.name);
            operation = serde_json::from_str(&self.get_json(&url).await?)
                .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;
        }

        if let Some(err) = operation.error {
            return Err(GeminiError::Rejected(err.message));
        }

        let uris: Vec<String> = operation
            .response
            .map(|r| r.generate_video_response.generated_samples)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sample| sample.video.and_then(|v| v.uri))
            .collect();
        if uris.is_empty() {
            return Err(GeminiError::Rejected("No video was generated.".to_string()));
        }

        progress.report("Downloading video...");
        let mut videos = Vec::with_capacity(uris.len());
        for uri in uris {
            let bytes = self
                .client
                .get(&uri)
                .query(&[("key", &self.config.api_key)])
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| GeminiError::Http(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| GeminiError::Http(e.to_string()))?;
            info!("📦 Downloaded video ({} bytes)", bytes.len());
            videos.push(GenerationResult::video(data_url(
                "video/mp4",
                &base64::engine::general_purpose::STANDARD.encode(&bytes),
            )));
        }
        Ok(videos)
    }
}

#[async_trait]
impl GenerationCapability for GeminiClient {
    async fn generate(
        &self,
        request: GenerationRequest,
        progress: ProgressReporter,
    ) -> Result<Vec<GenerationResult>, ProviderError> {
        let prompt = format!("{}{}", service_instruction(request.service), request.prompt);
        let file = request.file_input.as_ref();

        let outcome = match request.service {
            ServiceKind::RealisticPhoto => match file {
                Some(file) => self.generate_images(&prompt, Some(file)).await,
                None => Err(GeminiError::Rejected("A reference image is required for this service.".to_string())),
            },
            ServiceKind::PhotoshopImage => self.generate_images(&prompt, file).await,
            ServiceKind::VeoVideo => self.generate_video(&prompt, file, &progress).await,
        };

        outcome.map_err(|e| {
            error!("❌ {:?} generation failed: {}", request.service, e);
            e.into()
        })
    }
}

fn service_instruction(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::RealisticPhoto => {
            "Create an ultra-realistic professional photo shoot of the subject in the reference image, keeping their identity unchanged. "
        }
        ServiceKind::PhotoshopImage => "Create or edit a high-quality image. ",
        ServiceKind::VeoVideo => "",
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, GeminiError> {
    let status = response.status();
    info!("📥 Response status: {}", status);

    let body = response.text().await.map_err(|e| GeminiError::Http(e.to_string()))?;
    if !status.is_success() {
        error!("❌ API Error response: {}", preview(&body));
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        return Err(GeminiError::Api { status: status.as_u16(), message });
    }
    Ok(body)
}

fn placeholder_svg(prompt: &str) -> String {
    let colors = ["#FFD700", "#3B82F6", "#10B981", "#8B5CF6", "#EF4444"];
    let color = colors[prompt.len() % colors.len()];
    let caption: String = prompt.chars().take(48).collect::<String>().replace('&', "&amp;").replace('<', "&lt;");

    let svg = format!(r#"<svg width="512" height="512" xmlns="http://www.w3.org/2000/svg">
            <defs>
                <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
                    <stop offset="0%" style="stop-color:#111827;stop-opacity:1" />
                    <stop offset="100%" style="stop-color:{};stop-opacity:0.6" />
                </linearGradient>
            </defs>
            <rect width="512" height="512" fill="url(#grad)" />
            <text x="256" y="240" font-family="Arial, sans-serif" font-size="28" font-weight="bold"
                  text-anchor="middle" fill="white">LUXIA Studio</text>
            <text x="256" y="290" font-family="Arial, sans-serif" font-size="14"
                  text-anchor="middle" fill="white" opacity="0.8">{}</text>
        </svg>"#, color, caption);

    base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    #[allow(dead_code)]
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_images(resp: &GeminiResponse) -> impl Iterator<Item = &InlineData> {
    resp.candidates.iter().flat_map(|c| &c.content.parts).filter_map(|p| match p {
        Part::Inline { inline_data } => Some(inline_data),
        _ => None,
    })
}

fn extract_text(resp: &GeminiResponse) -> Option<String> {
    let text: Vec<&str> = resp
        .candidates
        .iter()
        .flat_map(|c| &c.content.parts)
        .filter_map(|p| match p {
            Part::Text { text } => Some(text.trim()),
            _ => None,
        })
        .filter(|t| !t.is_empty())
        .collect();
    (!text.is_empty()).then(|| text.join(" "))
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    #[serde(default)]
    generate_video_response: VideoResponse,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    #[serde(default)]
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::MediaKind;
    use pretty_assertions::assert_eq;

    fn demo_client() -> GeminiClient {
        GeminiClient::new(GeminiConfig::default())
    }

    #[test]
    fn extracts_every_inline_image_in_order() {
        let body = r#"{"candidates": [{"content": {"parts": [
            {"text": "Here you go"},
            {"inlineData": {"mimeType": "image/png", "data": "AAA"}},
            {"inlineData": {"mimeType": "image/jpeg", "data": "BBB"}}
        ]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(body).unwrap();
        let urls: Vec<String> = extract_images(&parsed).map(|i| data_url(&i.mime_type, &i.data)).collect();
        assert_eq!(urls, vec!["data:image/png;base64,AAA", "data:image/jpeg;base64,BBB"]);
        assert_eq!(extract_text(&parsed), Some("Here you go".to_string()));
    }

    #[test]
    fn parses_finished_video_operation() {
        let body = r#"{"name": "models/veo/operations/42", "done": true, "response": {
            "generateVideoResponse": {"generatedSamples": [{"video": {"uri": "https://files.invalid/v1"}}]}
        }}"#;
        let op: Operation = serde_json::from_str(body).unwrap();
        assert!(op.done);
        let uri = op.response.unwrap().generate_video_response.generated_samples[0].video.as_ref().unwrap().uri.clone();
        assert_eq!(uri.as_deref(), Some("https://files.invalid/v1"));
    }

    #[test]
    fn truncates_large_base64_in_logs() {
        let body = format!(r#"{{"inlineData": {{"data": "{}"}}}}"#, "A".repeat(500));
        let logged = preview(&body);
        assert!(logged.contains("[truncated 450 chars]"));
    }

    #[tokio::test]
    async fn demo_mode_returns_placeholder_image() {
        let request = GenerationRequest { service: ServiceKind::PhotoshopImage, prompt: "a fox".into(), file_input: None };
        let results = demo_client().generate(request, ProgressReporter::silent()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, MediaKind::Image);
        assert!(results[0].url.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn realistic_photo_requires_reference_image() {
        let request = GenerationRequest { service: ServiceKind::RealisticPhoto, prompt: "portrait".into(), file_input: None };
        let err = demo_client().generate(request, ProgressReporter::silent()).await.unwrap_err();
        assert_eq!(err.to_string(), "A reference image is required for this service.");
    }

    #[tokio::test]
    async fn demo_video_reports_progress_then_fails() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let request = GenerationRequest { service: ServiceKind::VeoVideo, prompt: "waves".into(), file_input: None };
        let err = demo_client().generate(request, reporter).await.unwrap_err();
        assert!(err.to_string().contains("demo mode"));
        assert_eq!(rx.recv().await.as_deref(), Some("Starting video generation..."));
    }
}
