//! Response Mapping
//!
//! Interprets a declarative [`ResponseMappingSpec`] against a raw
//! [`crate::transport::TransportOutcome`] and produces one
//! [`NormalizedContent`] value.
//!
//! # Modes
//!
//! | Mode             | Reads                         | Produces                     |
//! |------------------|-------------------------------|------------------------------|
//! | `text`           | `text_path` (or whole body)   | [`NormalizedContent::Text`]  |
//! | `binary`         | raw bytes                     | one data-URI media item      |
//! | `json_base64`    | `base64_path`, `mime_path`    | data-URI media item(s)       |
//! | `image_urls`     | `urls_path`                   | image URL media items        |
//! | `audio_data_url` | `data_url_path`               | data-URI media item(s)       |
//! | `raw_json`       | whole body                    | [`NormalizedContent::Json`]  |
//!
//! Every variant carries a display `title` and `summary`, so callers can show
//! a result without a second rendering stage.

mod mapper;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use mapper::{data_uri, map_response, media_from_bytes, media_from_urls, mime_essence};
pub(crate) use mapper::pick_mime;

/// How a response body becomes content
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Extract a string
    #[default]
    Text,
    /// Wrap raw bytes as a data URI
    Binary,
    /// Base64 payload inside JSON
    JsonBase64,
    /// List of image URLs inside JSON
    ImageUrls,
    /// Existing data URI inside JSON
    AudioDataUrl,
    /// Pass the JSON through
    RawJson,
}

impl ResponseMode {
    /// Whether the transport should keep the body as raw bytes
    #[must_use]
    pub fn wants_binary(self) -> bool {
        matches!(self, Self::Binary)
    }
}

/// Declarative response mapping
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMappingSpec {
    /// Mapping mode
    pub mode: ResponseMode,
    /// Hint for the media kind (`image`, `audio`, `video`...)
    pub result_type: Option<String>,
    /// Fallback MIME type
    pub content_type: Option<String>,
    /// Named path expressions (`text_path`, `urls_path`, ...)
    pub extract: BTreeMap<String, String>,
}

impl ResponseMappingSpec {
    /// Create a spec for a mode with no extraction paths
    #[must_use]
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Builder-style extraction path
    #[must_use]
    pub fn with_extract(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.extract.insert(name.into(), path.into());
        self
    }

    /// Look up a non-empty extraction path
    #[must_use]
    pub fn path(&self, name: &str) -> Option<&str> {
        self.extract
            .get(name)
            .map(String::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Broad media category, used by display layers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image
    Image,
    /// Audio clip
    Audio,
    /// Video clip
    Video,
    /// Anything else
    File,
}

impl MediaKind {
    /// Classify from a `result_type` hint, falling back to the MIME type
    #[must_use]
    pub fn classify(result_type: Option<&str>, mime: Option<&str>) -> Self {
        let from_hint = result_type.and_then(|hint| match hint.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Some(Self::Image),
            "audio" | "music" | "speech" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        });
        if let Some(kind) = from_hint {
            return kind;
        }
        match mime.map(str::to_ascii_lowercase) {
            Some(m) if m.starts_with("image/") => Self::Image,
            Some(m) if m.starts_with("audio/") => Self::Audio,
            Some(m) if m.starts_with("video/") => Self::Video,
            _ => Self::File,
        }
    }

    /// Display noun
    #[must_use]
    pub fn noun(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio clip",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

/// One piece of media: a remote URL or an inline data URI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Media category
    pub kind: MediaKind,
    /// MIME type, when known
    pub mime: Option<String>,
    /// `https://...` or `data:<mime>;base64,...`
    pub url: String,
}

impl MediaItem {
    /// Whether the payload is inline
    #[must_use]
    pub fn is_data_uri(&self) -> bool {
        self.url.starts_with("data:")
    }
}

/// Provider-independent result of a profile invocation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedContent {
    /// Plain text
    Text {
        /// Display title
        title: String,
        /// One-line summary
        summary: String,
        /// Extracted text
        text: String,
    },
    /// Images, audio, video or files
    Media {
        /// Display title
        title: String,
        /// One-line summary
        summary: String,
        /// Items, possibly empty
        items: Vec<MediaItem>,
    },
    /// Decoded JSON passed through
    Json {
        /// Display title
        title: String,
        /// One-line summary
        summary: String,
        /// Pretty-printed JSON
        text: String,
        /// Structured payload
        data: Value,
    },
    /// Async job finished without a download step
    JobStatus {
        /// Display title
        title: String,
        /// One-line summary
        summary: String,
        /// Provider job identifier
        job_id: String,
        /// Terminal status as reported
        status: String,
        /// Result URL, if the poll response carried one
        result_url: Option<String>,
    },
}

impl NormalizedContent {
    /// Display title
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Text { title, .. }
            | Self::Media { title, .. }
            | Self::Json { title, .. }
            | Self::JobStatus { title, .. } => title,
        }
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            Self::Text { summary, .. }
            | Self::Media { summary, .. }
            | Self::Json { summary, .. }
            | Self::JobStatus { summary, .. } => summary,
        }
    }

    /// Text body for text and JSON content
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } | Self::Json { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Media items (empty for non-media content)
    #[must_use]
    pub fn media(&self) -> &[MediaItem] {
        match self {
            Self::Media { items, .. } => items,
            _ => &[],
        }
    }
}
