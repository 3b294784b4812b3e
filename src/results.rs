use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DOWNLOAD_PREFIX: &str = "luxia-studio-result";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "png",
            MediaKind::Video => "mp4",
        }
    }
}

/// One produced artifact. `url` is either remote or a self-contained `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub kind: MediaKind,
    pub url: String,
}

impl GenerationResult {
    pub fn image(url: impl Into<String>) -> Self {
        Self { kind: MediaKind::Image, url: url.into() }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self { kind: MediaKind::Video, url: url.into() }
    }

    pub fn download_name(&self, at: DateTime<Utc>) -> String {
        download_name(self.kind, at)
    }
}

pub fn download_name(kind: MediaKind, at: DateTime<Utc>) -> String {
    format!("{}-{}.{}", DOWNLOAD_PREFIX, at.timestamp_millis(), kind.extension())
}

/// Ordered results of one completed generation, in provider order. Empty means "nothing yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultSet(Vec<GenerationResult>);

impl ResultSet {
    pub fn new(results: Vec<GenerationResult>) -> Self {
        Self(results)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GenerationResult> {
        self.0.iter()
    }

    /// Results paired with the filename a download started at `at` would use.
    pub fn presented(&self, at: DateTime<Utc>) -> Vec<PresentedResult> {
        self.0
            .iter()
            .map(|r| PresentedResult { kind: r.kind, url: r.url.clone(), download_name: r.download_name(at) })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a GenerationResult;
    type IntoIter = std::slice::Iter<'a, GenerationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedResult {
    pub kind: MediaKind,
    pub url: String,
    pub download_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn download_name_uses_kind_extension() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(download_name(MediaKind::Image, at), "luxia-studio-result-1700000000123.png");
        assert_eq!(download_name(MediaKind::Video, at), "luxia-studio-result-1700000000123.mp4");
    }

    #[test]
    fn download_name_is_deterministic() {
        let at = Utc.timestamp_millis_opt(42).unwrap();
        let result = GenerationResult::video("https://example.invalid/v.mp4");
        assert_eq!(result.download_name(at), result.download_name(at));
    }

    #[test]
    fn presented_keeps_provider_order() {
        let set = ResultSet::new(vec![GenerationResult::image("data:a"), GenerationResult::image("data:b")]);
        let at = Utc.timestamp_millis_opt(7).unwrap();
        let urls: Vec<_> = set.presented(at).into_iter().map(|p| p.url).collect();
        assert_eq!(urls, vec!["data:a", "data:b"]);
        assert_eq!(set.len(), 2);
    }
}
