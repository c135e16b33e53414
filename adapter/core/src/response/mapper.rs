//! Response mapper implementation

use base64::Engine as _;
use serde_json::Value;

use super::{MediaItem, MediaKind, NormalizedContent, ResponseMappingSpec, ResponseMode};
use crate::error::{EngineError, EngineResult};
use crate::template::{get_by_path, get_str, get_string_list};
use crate::transport::TransportOutcome;

const STEP: &str = "response";
const FALLBACK_MIME: &str = "application/octet-stream";
const SUMMARY_CHARS: usize = 120;

/// Map a successful outcome into normalized content
///
/// # Errors
///
/// - [`EngineError::Config`] when the mode needs an extraction path the mapping
///   does not declare
/// - [`EngineError::Extraction`] when a required payload is missing from the
///   response
pub fn map_response(
    outcome: &TransportOutcome,
    spec: &ResponseMappingSpec,
) -> EngineResult<NormalizedContent> {
    match spec.mode {
        ResponseMode::Text => Ok(map_text(outcome, spec)),
        ResponseMode::Binary => {
            let bytes = outcome.bytes().ok_or_else(|| {
                EngineError::extraction(STEP, "<body>", "expected a binary body, got JSON")
            })?;
            let mime = pick_mime(outcome.content_type.as_deref(), spec.content_type.as_deref());
            Ok(media_from_bytes(bytes, &mime, spec.result_type.as_deref(), title_of(outcome, spec)))
        }
        ResponseMode::JsonBase64 => map_json_base64(outcome, spec),
        ResponseMode::ImageUrls => map_image_urls(outcome, spec),
        ResponseMode::AudioDataUrl => map_data_urls(outcome, spec),
        ResponseMode::RawJson => {
            let data = json_of(outcome).clone();
            let text = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
            let summary = match &data {
                Value::Object(map) => format!("JSON object with {} field(s)", map.len()),
                Value::Array(items) => format!("JSON array with {} item(s)", items.len()),
                other => truncate_chars(&other.to_string(), SUMMARY_CHARS),
            };
            Ok(NormalizedContent::Json {
                title: title_of(outcome, spec).unwrap_or_else(|| "JSON response".to_string()),
                summary,
                text,
                data,
            })
        }
    }
}

/// Build a `data:` URI
#[must_use]
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// MIME type without parameters (`audio/mpeg; charset=x` → `audio/mpeg`)
#[must_use]
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Wrap raw bytes as a single inline media item
#[must_use]
pub fn media_from_bytes(
    bytes: &[u8],
    mime: &str,
    result_type: Option<&str>,
    title: Option<String>,
) -> NormalizedContent {
    let kind = MediaKind::classify(result_type, Some(mime));
    NormalizedContent::Media {
        title: title.unwrap_or_else(|| default_title(kind)),
        summary: format!("Received {} ({mime}, {})", kind.noun(), human_size(bytes.len())),
        items: vec![MediaItem {
            kind,
            mime: Some(mime.to_string()),
            url: data_uri(mime, bytes),
        }],
    }
}

/// Wrap remote URLs as media items
#[must_use]
pub fn media_from_urls(
    urls: Vec<String>,
    kind: MediaKind,
    mime: Option<&str>,
    title: Option<String>,
) -> NormalizedContent {
    let summary = match urls.len() {
        0 => format!("No {} returned", plural(kind.noun(), 2)),
        n => format!("Generated {n} {}", plural(kind.noun(), n)),
    };
    NormalizedContent::Media {
        title: title.unwrap_or_else(|| default_title(kind)),
        summary,
        items: urls
            .into_iter()
            .map(|url| MediaItem {
                kind,
                mime: mime.map(str::to_string),
                url,
            })
            .collect(),
    }
}

fn map_text(outcome: &TransportOutcome, spec: &ResponseMappingSpec) -> NormalizedContent {
    let json = json_of(outcome);
    let extracted = spec
        .path("text_path")
        .and_then(|path| get_by_path(json, path))
        .and_then(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        });

    let text = match extracted {
        Some(text) => text,
        None => match &outcome.undecoded {
            Some(raw) => raw.clone(),
            None => json.to_string(),
        },
    };

    let summary = if text.trim().is_empty() {
        "Empty response".to_string()
    } else {
        truncate_chars(text.trim(), SUMMARY_CHARS)
    };

    NormalizedContent::Text {
        title: title_of(outcome, spec).unwrap_or_else(|| "Text response".to_string()),
        summary,
        text,
    }
}

fn map_json_base64(
    outcome: &TransportOutcome,
    spec: &ResponseMappingSpec,
) -> EngineResult<NormalizedContent> {
    let path = required_path(spec, "base64_path")?;
    let json = json_of(outcome);

    let payloads = get_string_list(json, path);
    if payloads.is_empty() {
        return Err(EngineError::extraction(
            STEP,
            path,
            format!("no base64 payload in response {}", json),
        ));
    }

    let mime = spec
        .path("mime_path")
        .and_then(|p| get_str(json, p))
        .or_else(|| spec.content_type.clone())
        .map(|m| mime_essence(&m))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| FALLBACK_MIME.to_string());

    let kind = MediaKind::classify(spec.result_type.as_deref(), Some(&mime));
    let items: Vec<MediaItem> = payloads
        .into_iter()
        .map(|payload| {
            let url = if payload.starts_with("data:") {
                payload
            } else {
                format!("data:{mime};base64,{}", payload.trim())
            };
            MediaItem {
                kind,
                mime: Some(mime.clone()),
                url,
            }
        })
        .collect();

    Ok(NormalizedContent::Media {
        title: title_of(outcome, spec).unwrap_or_else(|| default_title(kind)),
        summary: format!("Generated {} {} ({mime})", items.len(), plural(kind.noun(), items.len())),
        items,
    })
}

fn map_image_urls(
    outcome: &TransportOutcome,
    spec: &ResponseMappingSpec,
) -> EngineResult<NormalizedContent> {
    let path = required_path(spec, "urls_path")?;
    let urls = get_string_list(json_of(outcome), path);
    let kind = MediaKind::classify(spec.result_type.as_deref().or(Some("image")), None);
    Ok(media_from_urls(
        urls,
        kind,
        spec.content_type.as_deref(),
        title_of(outcome, spec),
    ))
}

fn map_data_urls(
    outcome: &TransportOutcome,
    spec: &ResponseMappingSpec,
) -> EngineResult<NormalizedContent> {
    let path = required_path(spec, "data_url_path")?;
    let json = json_of(outcome);
    let urls: Vec<String> = get_string_list(json, path)
        .into_iter()
        .filter(|u| u.starts_with("data:"))
        .collect();
    if urls.is_empty() {
        return Err(EngineError::extraction(
            STEP,
            path,
            format!("no data URI in response {}", json),
        ));
    }

    let hint = spec.result_type.as_deref().or(Some("audio"));
    let items: Vec<MediaItem> = urls
        .into_iter()
        .map(|url| {
            let mime = data_uri_mime(&url).or_else(|| spec.content_type.clone());
            MediaItem {
                kind: MediaKind::classify(hint, mime.as_deref()),
                mime,
                url,
            }
        })
        .collect();
    let kind = items.first().map_or(MediaKind::Audio, |i| i.kind);
    let mime_label = items
        .first()
        .and_then(|i| i.mime.clone())
        .unwrap_or_else(|| "unknown type".to_string());

    Ok(NormalizedContent::Media {
        title: title_of(outcome, spec).unwrap_or_else(|| default_title(kind)),
        summary: format!("Received {} {} ({mime_label})", items.len(), plural(kind.noun(), items.len())),
        items,
    })
}

fn required_path<'a>(spec: &'a ResponseMappingSpec, name: &str) -> EngineResult<&'a str> {
    spec.path(name).ok_or_else(|| {
        EngineError::config(format!(
            "response mode '{:?}' requires extract.{name}",
            spec.mode
        ))
    })
}

fn json_of(outcome: &TransportOutcome) -> &Value {
    static EMPTY: Value = Value::Null;
    outcome.json().unwrap_or(&EMPTY)
}

fn title_of(outcome: &TransportOutcome, spec: &ResponseMappingSpec) -> Option<String> {
    let path = spec.path("title_path")?;
    get_str(outcome.json()?, path).filter(|t| !t.trim().is_empty())
}

/// Prefer a specific response content type, then the declared one
pub(crate) fn pick_mime(response: Option<&str>, declared: Option<&str>) -> String {
    let response = response.map(mime_essence).filter(|m| !m.is_empty());
    let declared = declared.map(mime_essence).filter(|m| !m.is_empty());
    match (response, declared) {
        (Some(r), Some(d)) if r == FALLBACK_MIME => d,
        (Some(r), _) => r,
        (None, Some(d)) => d,
        (None, None) => FALLBACK_MIME.to_string(),
    }
}

fn data_uri_mime(url: &str) -> Option<String> {
    let header = url.strip_prefix("data:")?.split(',').next()?;
    let mime = header.split(';').next()?.trim();
    (!mime.is_empty()).then(|| mime.to_ascii_lowercase())
}

fn default_title(kind: MediaKind) -> String {
    match kind {
        MediaKind::Image => "Image result",
        MediaKind::Audio => "Audio result",
        MediaKind::Video => "Video result",
        MediaKind::File => "File result",
    }
    .to_string()
}

fn plural(noun: &str, n: usize) -> String {
    if n == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

fn human_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
