use std::path::PathBuf;
use std::time::Duration;

pub const DEMO_API_KEY: &str = "DEMO_KEY";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub image_model: String,
    pub video_model: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl GeminiConfig {
    pub fn is_demo(&self) -> bool {
        self.api_key == DEMO_API_KEY
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: DEMO_API_KEY.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            image_model: "gemini-2.5-flash-image-preview".to_string(),
            video_model: "veo-2.0-generate-001".to_string(),
            poll_interval: Duration::from_secs(10),
            max_polls: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub catalog_path: Option<PathBuf>,
    pub gemini: GeminiConfig,
}

impl AppConfig {
    /// Reads the process environment; call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = GeminiConfig::default();
        let text = |key: &str, default: String| lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default);

        let gemini = GeminiConfig {
            api_key: text("GEMINI_API_KEY", defaults.api_key),
            base_url: text("GEMINI_API_BASE", defaults.base_url),
            image_model: text("GEMINI_IMAGE_MODEL", defaults.image_model),
            video_model: text("GEMINI_VIDEO_MODEL", defaults.video_model),
            poll_interval: lookup("VEO_POLL_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            max_polls: lookup("VEO_MAX_POLLS").and_then(|v| v.parse().ok()).unwrap_or(defaults.max_polls),
        };

        Self {
            port: lookup("PORT").and_then(|v| v.parse().ok()).unwrap_or(8080),
            catalog_path: lookup("SERVICE_CATALOG").filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            gemini,
        }
    }
}
